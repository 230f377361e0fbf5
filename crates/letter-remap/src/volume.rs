//! Volume model and the per-pass topology snapshot.
//!
//! A [`Topology`] is captured once at the start of a pass. The remapper mutates the live
//! system through a [`StorageManager`](crate::StorageManager) and mirrors each successful
//! mutation into the snapshot, so its idea of "current" state stays consistent within the
//! pass without re-querying the system.

use crate::letter::DriveLetter;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Conventional maximum length of a volume label.
pub const MAX_LABEL_LEN: usize = 32;

/// Stable identifier of a volume's backing store (an EBS volume ID for candidates).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VolumeId(String);

impl VolumeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VolumeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a volume takes part in remapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeRole {
    /// Attached cloud block storage, eligible for tag-driven remapping.
    Candidate,
    /// The volume the OS booted from. Never moved or relabelled.
    Boot,
    /// Anything else (instance store, removable media). May be displaced, never tagged.
    Unmanaged,
}

/// One mounted logical volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    pub id: VolumeId,
    /// Backend-specific locator (for example a volume GUID path). Opaque to the remapper.
    pub device_path: String,
    pub letter: Option<DriveLetter>,
    pub label: Option<String>,
    pub role: VolumeRole,
}

impl Volume {
    pub fn new(id: impl Into<String>, role: VolumeRole) -> Self {
        let id = VolumeId::new(id);
        Self {
            device_path: id.as_str().to_string(),
            id,
            letter: None,
            label: None,
            role,
        }
    }

    pub fn with_letter(mut self, letter: DriveLetter) -> Self {
        self.letter = Some(letter);
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_device_path(mut self, path: impl Into<String>) -> Self {
        self.device_path = path.into();
        self
    }

    pub fn is_candidate(&self) -> bool {
        self.role == VolumeRole::Candidate
    }

    /// Key that finds this volume again before it's mutated: label if set, else letter, else ID.
    pub fn key(&self) -> VolumeKey {
        match (&self.label, self.letter) {
            (Some(label), _) if !label.is_empty() => VolumeKey::Label(label.clone()),
            (_, Some(letter)) => VolumeKey::Letter(letter),
            _ => VolumeKey::Id(self.id.clone()),
        }
    }
}

impl fmt::Display for Volume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)?;
        if let Some(letter) = self.letter {
            write!(f, " ({})", letter)?;
        }
        if let Some(label) = &self.label {
            write!(f, " \"{}\"", label)?;
        }
        Ok(())
    }
}

/// Lookup key captured before a mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VolumeKey {
    Label(String),
    Letter(DriveLetter),
    Id(VolumeId),
}

/// Ordered snapshot of every visible volume.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    volumes: Vec<Volume>,
}

impl Topology {
    pub fn new(volumes: Vec<Volume>) -> Self {
        Self { volumes }
    }

    pub fn volumes(&self) -> &[Volume] {
        &self.volumes
    }

    pub fn len(&self) -> usize {
        self.volumes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.volumes.is_empty()
    }

    pub fn candidates(&self) -> impl Iterator<Item = &Volume> {
        self.volumes.iter().filter(|v| v.is_candidate())
    }

    pub fn by_id(&self, id: &VolumeId) -> Option<&Volume> {
        self.volumes.iter().find(|v| &v.id == id)
    }

    /// First volume carrying `label`, in enumeration order.
    pub fn find_by_label(&self, label: &str) -> Option<&Volume> {
        self.volumes.iter().find(|v| v.label.as_deref() == Some(label))
    }

    pub fn find_by_letter(&self, letter: DriveLetter) -> Option<&Volume> {
        self.volumes.iter().find(|v| v.letter == Some(letter))
    }

    pub fn locate(&self, key: &VolumeKey) -> Option<&Volume> {
        match key {
            VolumeKey::Label(label) => self.find_by_label(label),
            VolumeKey::Letter(letter) => self.find_by_letter(*letter),
            VolumeKey::Id(id) => self.by_id(id),
        }
    }

    pub fn occupied_letters(&self) -> BTreeSet<DriveLetter> {
        self.volumes.iter().filter_map(|v| v.letter).collect()
    }

    pub fn is_occupied(&self, letter: DriveLetter) -> bool {
        self.find_by_letter(letter).is_some()
    }

    /// Letters held by more than one volume. Empty for any state the OS accepts.
    pub fn letter_collisions(&self) -> Vec<DriveLetter> {
        let mut seen = BTreeSet::new();
        let mut collisions = BTreeSet::new();
        for letter in self.volumes.iter().filter_map(|v| v.letter) {
            if !seen.insert(letter) {
                collisions.insert(letter);
            }
        }
        collisions.into_iter().collect()
    }

    /// Mirrors a completed letter change. Returns false if the volume is unknown.
    pub fn set_letter(&mut self, id: &VolumeId, letter: Option<DriveLetter>) -> bool {
        match self.volumes.iter_mut().find(|v| &v.id == id) {
            Some(volume) => {
                volume.letter = letter;
                true
            }
            None => false,
        }
    }

    /// Mirrors a completed relabel. Returns false if the volume is unknown.
    pub fn set_label(&mut self, id: &VolumeId, label: Option<String>) -> bool {
        match self.volumes.iter_mut().find(|v| &v.id == id) {
            Some(volume) => {
                volume.label = label;
                true
            }
            None => false,
        }
    }
}

impl FromIterator<Volume> for Topology {
    fn from_iter<T: IntoIterator<Item = Volume>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
