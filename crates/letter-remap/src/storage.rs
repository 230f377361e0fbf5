//! Storage-management and topology collaborators.
//!
//! The remapper only needs two mutating primitives, both single-volume: give a volume a new
//! letter, give a volume a new label. There's no atomic two-way swap, which is why swaps go
//! through a scratch letter. Read queries (`find_by_label`, `find_by_letter`, current letter
//! and label) are answered from the [`Topology`] snapshot.
//!
//! Implementations:
//! - `InMemoryStorage`: a volume table in memory, for tests and planning
//! - `DryRunStorage`: accepts and logs every mutation without touching anything
//! - The agent's Windows backend, which drives the OS storage cmdlets

use crate::ignore_poison::IgnorePoison;
use crate::letter::DriveLetter;
use crate::volume::{Topology, Volume, VolumeId};
use log::info;
use serde::Serialize;
use std::fmt;
use std::sync::Mutex;

/// Error from a single storage mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Another volume already holds the letter.
    LetterInUse { letter: DriveLetter, holder: VolumeId },
    /// The volume disappeared from the system.
    NotFound(VolumeId),
    /// The storage API rejected the change.
    Rejected(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LetterInUse { letter, holder } => write!(f, "{} is already in use by {}", letter, holder),
            Self::NotFound(id) => write!(f, "Volume not found: {}", id),
            Self::Rejected(msg) => write!(f, "Storage API rejected the change: {}", msg),
        }
    }
}

impl std::error::Error for StorageError {}

/// Error from enumerating the current topology.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    EnumerationFailure(String),
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EnumerationFailure(msg) => write!(f, "Couldn't enumerate volumes: {}", msg),
        }
    }
}

impl std::error::Error for ResolveError {}

/// Produces the ordered list of currently visible volumes. Purely observational.
pub trait TopologyResolver {
    fn resolve(&self) -> Result<Topology, ResolveError>;
}

/// Single-volume mutation primitives.
///
/// `volume` is the record as it was before the change, so backends can address it by its
/// current letter or locator.
pub trait StorageManager {
    fn set_letter(&self, volume: &Volume, letter: DriveLetter) -> Result<(), StorageError>;

    fn set_label(&self, volume: &Volume, label: &str) -> Result<(), StorageError>;
}

/// One applied change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum Mutation {
    Relabel {
        volume: VolumeId,
        from: Option<String>,
        to: String,
    },
    Move {
        volume: VolumeId,
        from: Option<DriveLetter>,
        to: DriveLetter,
    },
}

impl fmt::Display for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Relabel { volume, from, to } => {
                write!(f, "relabel {} {:?} -> {:?}", volume, from.as_deref().unwrap_or(""), to)
            }
            Self::Move { volume, from, to } => match from {
                Some(from) => write!(f, "move {} {} -> {}", volume, from, to),
                None => write!(f, "move {} (no letter) -> {}", volume, to),
            },
        }
    }
}

/// A mutation the in-memory backend should refuse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Any letter change of this volume.
    MoveOf(VolumeId),
    /// Any letter change onto this letter.
    MoveTo(DriveLetter),
    /// Any relabel of this volume.
    RelabelOf(VolumeId),
}

#[derive(Debug, Default)]
struct InMemoryState {
    volumes: Vec<Volume>,
    applied: Vec<Mutation>,
    faults: Vec<Fault>,
    collisions_refused: usize,
}

/// Volume table held in memory.
///
/// Behaves like the OS primitive: a letter held by another volume is refused. Every change
/// that goes through is recorded.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    state: Mutex<InMemoryState>,
}

impl InMemoryStorage {
    pub fn new(volumes: Vec<Volume>) -> Self {
        Self {
            state: Mutex::new(InMemoryState {
                volumes,
                ..InMemoryState::default()
            }),
        }
    }

    /// Makes matching mutations fail with `StorageError::Rejected`.
    pub fn inject_fault(&self, fault: Fault) {
        self.state.lock_ignore_poison().faults.push(fault);
    }

    pub fn clear_faults(&self) {
        self.state.lock_ignore_poison().faults.clear();
    }

    /// Changes applied so far, in order.
    pub fn applied(&self) -> Vec<Mutation> {
        self.state.lock_ignore_poison().applied.clone()
    }

    /// Forgets the recorded changes, keeping the volume table.
    pub fn clear_applied(&self) {
        self.state.lock_ignore_poison().applied.clear();
    }

    /// How many letter changes were refused because the letter was taken.
    pub fn collisions_refused(&self) -> usize {
        self.state.lock_ignore_poison().collisions_refused
    }

    pub fn snapshot(&self) -> Topology {
        Topology::new(self.state.lock_ignore_poison().volumes.clone())
    }
}

impl TopologyResolver for InMemoryStorage {
    fn resolve(&self) -> Result<Topology, ResolveError> {
        Ok(self.snapshot())
    }
}

impl StorageManager for InMemoryStorage {
    fn set_letter(&self, volume: &Volume, letter: DriveLetter) -> Result<(), StorageError> {
        let mut state = self.state.lock_ignore_poison();

        let faulted = state.faults.iter().any(|fault| match fault {
            Fault::MoveOf(id) => id == &volume.id,
            Fault::MoveTo(to) => *to == letter,
            Fault::RelabelOf(_) => false,
        });
        if faulted {
            return Err(StorageError::Rejected(format!("injected fault moving {} to {}", volume.id, letter)));
        }

        let holder = state
            .volumes
            .iter()
            .find(|v| v.letter == Some(letter) && v.id != volume.id)
            .map(|v| v.id.clone());
        if let Some(holder) = holder {
            state.collisions_refused += 1;
            return Err(StorageError::LetterInUse { letter, holder });
        }

        let target = state
            .volumes
            .iter_mut()
            .find(|v| v.id == volume.id)
            .ok_or_else(|| StorageError::NotFound(volume.id.clone()))?;
        let from = target.letter.replace(letter);
        state.applied.push(Mutation::Move {
            volume: volume.id.clone(),
            from,
            to: letter,
        });
        Ok(())
    }

    fn set_label(&self, volume: &Volume, label: &str) -> Result<(), StorageError> {
        let mut state = self.state.lock_ignore_poison();

        if state
            .faults
            .iter()
            .any(|fault| matches!(fault, Fault::RelabelOf(id) if id == &volume.id))
        {
            return Err(StorageError::Rejected(format!("injected fault relabelling {}", volume.id)));
        }

        let target = state
            .volumes
            .iter_mut()
            .find(|v| v.id == volume.id)
            .ok_or_else(|| StorageError::NotFound(volume.id.clone()))?;
        let from = target.label.replace(label.to_string());
        state.applied.push(Mutation::Relabel {
            volume: volume.id.clone(),
            from,
            to: label.to_string(),
        });
        Ok(())
    }
}

/// Accepts every mutation and only logs it.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunStorage;

impl StorageManager for DryRunStorage {
    fn set_letter(&self, volume: &Volume, letter: DriveLetter) -> Result<(), StorageError> {
        info!("[dry run] would move {} to {}", volume, letter);
        Ok(())
    }

    fn set_label(&self, volume: &Volume, label: &str) -> Result<(), StorageError> {
        info!("[dry run] would relabel {} to {:?}", volume, label);
        Ok(())
    }
}
