//! Tag lookup collaborator.

use crate::volume::VolumeId;
use std::collections::HashMap;
use std::fmt;

/// Default tag holding the desired drive letter.
pub const DEFAULT_LETTER_TAG: &str = "DriveLetter";
/// Default tag holding the desired volume label.
pub const DEFAULT_LABEL_TAG: &str = "DriveLabel";

/// Names of the two tags read per volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagNames {
    pub letter: String,
    pub label: String,
}

impl Default for TagNames {
    fn default() -> Self {
        Self {
            letter: DEFAULT_LETTER_TAG.to_string(),
            label: DEFAULT_LABEL_TAG.to_string(),
        }
    }
}

/// Error from the tag service. Callers treat it as "no tag".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagLookupError {
    /// The service couldn't be reached or timed out.
    Unavailable(String),
    /// The service answered with something unparseable.
    InvalidResponse(String),
}

impl fmt::Display for TagLookupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable(msg) => write!(f, "Tag service unavailable: {}", msg),
            Self::InvalidResponse(msg) => write!(f, "Invalid tag service response: {}", msg),
        }
    }
}

impl std::error::Error for TagLookupError {}

/// Key-value lookup of a volume's tags.
pub trait TagLookup {
    fn lookup_tag(&self, volume_id: &VolumeId, tag: &str) -> Result<Option<String>, TagLookupError>;
}

/// Tags held in memory. Volumes marked unavailable fail every lookup.
#[derive(Debug, Default)]
pub struct StaticTags {
    tags: HashMap<(VolumeId, String), String>,
    unavailable: Vec<VolumeId>,
}

impl StaticTags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tag(mut self, volume_id: &str, tag: &str, value: &str) -> Self {
        self.tags
            .insert((VolumeId::new(volume_id), tag.to_string()), value.to_string());
        self
    }

    /// Shorthand for the two default tags.
    pub fn with_volume(self, volume_id: &str, label: &str, letter: &str) -> Self {
        self.with_tag(volume_id, DEFAULT_LABEL_TAG, label)
            .with_tag(volume_id, DEFAULT_LETTER_TAG, letter)
    }

    pub fn with_unavailable(mut self, volume_id: &str) -> Self {
        self.unavailable.push(VolumeId::new(volume_id));
        self
    }
}

impl TagLookup for StaticTags {
    fn lookup_tag(&self, volume_id: &VolumeId, tag: &str) -> Result<Option<String>, TagLookupError> {
        if self.unavailable.contains(volume_id) {
            return Err(TagLookupError::Unavailable(format!("no route to tags of {}", volume_id)));
        }
        Ok(self.tags.get(&(volume_id.clone(), tag.to_string())).cloned())
    }
}
