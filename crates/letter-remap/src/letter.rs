//! Drive letters and their normalization.
//!
//! Tags and operators spell letters in several ways (`E`, `e:`, `E:\`). Everything is
//! normalized into a [`DriveLetter`] before it's compared or used, and it always renders
//! with the trailing separator (`E:`).

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Separator that follows a drive letter.
pub const SEPARATOR: char = ':';

/// Letters that are never assigned or used as scratch space: A and B for removable media, C for boot.
pub const RESERVED: [char; 3] = ['A', 'B', 'C'];

/// A single mount letter, stored uppercase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DriveLetter(char);

/// Error for strings that don't name a drive letter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LetterError {
    /// Input was empty or whitespace.
    Empty,
    /// Input isn't a single ASCII letter with an optional separator.
    Invalid(String),
}

impl fmt::Display for LetterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "Drive letter is empty"),
            Self::Invalid(input) => write!(f, "Not a drive letter: {:?}", input),
        }
    }
}

impl std::error::Error for LetterError {}

impl DriveLetter {
    /// Builds a letter from a char, case-insensitively.
    pub fn new(c: char) -> Result<Self, LetterError> {
        if c.is_ascii_alphabetic() {
            Ok(Self(c.to_ascii_uppercase()))
        } else {
            Err(LetterError::Invalid(c.to_string()))
        }
    }

    /// Parses `E`, `e`, `E:` or `E:\`, ignoring surrounding whitespace.
    pub fn parse(input: &str) -> Result<Self, LetterError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(LetterError::Empty);
        }
        let rest = trimmed.strip_suffix('\\').unwrap_or(trimmed);
        let rest = rest.strip_suffix(SEPARATOR).unwrap_or(rest);

        let mut chars = rest.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) if c.is_ascii_alphabetic() => Ok(Self(c.to_ascii_uppercase())),
            _ => Err(LetterError::Invalid(input.to_string())),
        }
    }

    /// The bare letter, without separator.
    pub fn as_char(self) -> char {
        self.0
    }

    /// Returns true for A, B and C.
    pub fn is_reserved(self) -> bool {
        RESERVED.contains(&self.0)
    }

    /// All letters that may be assigned, D through Z, in ascending order.
    pub fn assignable() -> impl Iterator<Item = DriveLetter> {
        ('A'..='Z').map(DriveLetter).filter(|l| !l.is_reserved())
    }
}

impl fmt::Display for DriveLetter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.0, SEPARATOR)
    }
}

impl std::str::FromStr for DriveLetter {
    type Err = LetterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for DriveLetter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DriveLetter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
