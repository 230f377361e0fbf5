//! The letter remapper.
//!
//! A pass runs in two phases over a [`Topology`] captured at pass start:
//!
//! 1. Relabel: every tagged volume whose label differs from its `DriveLabel` tag is renamed in
//!    place. Labels don't collide, so this never touches letters.
//! 2. Letters: for each `(label, letter)` pair, the volume holding the label is moved to the
//!    letter. If another volume sits there, it's parked on the scratch letter first and then
//!    moved into the letter the target gave up:
//!
//!    ```text
//!    displaced -> scratch, target -> desired, displaced -> vacated
//!    ```
//!
//! Every change is a single-volume, single-letter call applied immediately, so no two volumes
//! ever hold the same letter. Pairs are independent: a failure is recorded and the pass moves
//! on, nothing is rolled back. Every step compares against current state first, so a second
//! pass over a converged system changes nothing.

use crate::assignment::{DesiredAssignment, VolumeTags};
use crate::letter::DriveLetter;
use crate::scratch::ScratchLetter;
use crate::storage::{Mutation, StorageError, StorageManager};
use crate::volume::{Topology, Volume, VolumeId, VolumeRole};
use log::{debug, error, info, warn};
use serde::{Serialize, Serializer};
use std::fmt;

/// Why one step of a pass didn't happen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemapError {
    /// A swap needed a parking spot and none was free. Only this pair is affected.
    NoScratchLetterAvailable { label: String, letter: DriveLetter },
    /// The storage API refused a single change.
    MutationFailure {
        volume: VolumeId,
        attempted: Mutation,
        error: StorageError,
    },
    /// The change would have moved the boot volume.
    ProtectedVolume { volume: VolumeId, letter: DriveLetter },
}

impl fmt::Display for RemapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoScratchLetterAvailable { label, letter } => {
                write!(f, "No free scratch letter to swap {:?} into {}", label, letter)
            }
            Self::MutationFailure { attempted, error, .. } => {
                write!(f, "Couldn't {}: {}", attempted, error)
            }
            Self::ProtectedVolume { volume, letter } => {
                write!(f, "Refusing to move boot volume {} for {}", volume, letter)
            }
        }
    }
}

impl std::error::Error for RemapError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::MutationFailure { error, .. } => Some(error),
            _ => None,
        }
    }
}

impl Serialize for RemapError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Outcome of one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemapReport {
    /// Scratch letter in effect at the end of the pass.
    pub scratch: Option<DriveLetter>,
    /// Changes applied, in order.
    pub mutations: Vec<Mutation>,
    /// Desired labels that no volume carries.
    pub missing_labels: Vec<String>,
    pub failures: Vec<RemapError>,
}

impl RemapReport {
    pub fn is_converged(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn moves(&self) -> impl Iterator<Item = &Mutation> {
        self.mutations.iter().filter(|m| matches!(m, Mutation::Move { .. }))
    }
}

/// Drives a topology toward a desired assignment through a storage backend.
pub struct Remapper<'a> {
    storage: &'a dyn StorageManager,
}

impl<'a> Remapper<'a> {
    pub fn new(storage: &'a dyn StorageManager) -> Self {
        Self { storage }
    }

    /// Runs one pass. `topology` is updated as changes succeed.
    pub fn run(
        &self,
        topology: &mut Topology,
        desired: &DesiredAssignment,
        scratch: Option<DriveLetter>,
    ) -> RemapReport {
        let mut report = RemapReport {
            scratch,
            ..RemapReport::default()
        };

        match scratch {
            Some(letter) => debug!("Scratch letter for this pass: {}", letter),
            None => warn!("No scratch letter is free; swaps will fail"),
        }

        for tags in desired.tagged() {
            if let Err(e) = self.relabel(topology, tags, &mut report) {
                error!("{}", e);
                report.failures.push(e);
            }
        }

        for (label, letter) in desired.pairs() {
            if let Err(e) = self.converge(topology, label, *letter, &mut report) {
                error!("{}", e);
                report.failures.push(e);
            }
        }

        info!(
            "Remap pass done: {} change(s), {} failure(s)",
            report.mutations.len(),
            report.failures.len()
        );
        report
    }

    fn relabel(&self, topology: &mut Topology, tags: &VolumeTags, report: &mut RemapReport) -> Result<(), RemapError> {
        let Some(known) = topology.by_id(&tags.volume_id) else {
            debug!("Tagged volume {} is not in the topology", tags.volume_id);
            return Ok(());
        };
        if known.label.as_deref() == Some(tags.label.as_str()) {
            return Ok(());
        }

        // Both label and letter may change during the pass; find the volume by what it is now.
        let key = known.key();
        let target = match topology.locate(&key) {
            Some(found) if found.id == tags.volume_id => found.clone(),
            _ => {
                debug!("{:?} matches another volume; addressing {} by ID", key, tags.volume_id);
                known.clone()
            }
        };

        if target.role == VolumeRole::Boot {
            return Ok(());
        }

        let attempted = Mutation::Relabel {
            volume: target.id.clone(),
            from: target.label.clone(),
            to: tags.label.clone(),
        };
        self.storage
            .set_label(&target, &tags.label)
            .map_err(|error| RemapError::MutationFailure {
                volume: target.id.clone(),
                attempted: attempted.clone(),
                error,
            })?;

        info!("Relabelled {} to {:?}", target, tags.label);
        topology.set_label(&target.id, Some(tags.label.clone()));
        report.mutations.push(attempted);
        Ok(())
    }

    fn converge(
        &self,
        topology: &mut Topology,
        label: &str,
        letter: DriveLetter,
        report: &mut RemapReport,
    ) -> Result<(), RemapError> {
        let Some(target) = topology.find_by_label(label).cloned() else {
            debug!("No volume is labelled {:?}; skipping {}", label, letter);
            report.missing_labels.push(label.to_string());
            return Ok(());
        };
        if target.letter == Some(letter) {
            debug!("{} is already at {}", target, letter);
            return Ok(());
        }
        if target.role == VolumeRole::Boot {
            return Err(RemapError::ProtectedVolume {
                volume: target.id,
                letter,
            });
        }

        let vacated = target.letter;
        let mut parked = None;

        if let Some(displaced) = topology.find_by_letter(letter).cloned() {
            if displaced.role == VolumeRole::Boot {
                return Err(RemapError::ProtectedVolume {
                    volume: displaced.id,
                    letter,
                });
            }
            let scratch = self
                .scratch_for(topology, report)
                .ok_or_else(|| RemapError::NoScratchLetterAvailable {
                    label: label.to_string(),
                    letter,
                })?;
            self.move_to(topology, &displaced, scratch, report)?;
            parked = Some(displaced.id);
        }

        self.move_to(topology, &target, letter, report)?;

        if let Some(id) = parked {
            match (vacated, topology.by_id(&id).cloned()) {
                (Some(vacated), Some(displaced)) => self.move_to(topology, &displaced, vacated, report)?,
                (None, Some(displaced)) => {
                    warn!("{} had no letter to hand over; {} stays parked", target.id, displaced);
                }
                (_, None) => {}
            }
        }

        Ok(())
    }

    /// The pass's scratch letter, re-derived if something now sits on it.
    fn scratch_for(&self, topology: &Topology, report: &mut RemapReport) -> Option<DriveLetter> {
        let current = report.scratch?;
        if !topology.is_occupied(current) {
            return Some(current);
        }
        let next = ScratchLetter::choose(topology);
        match next {
            Some(next) => debug!("Scratch letter {} is taken, using {}", current, next),
            None => warn!("Scratch letter {} is taken and no other letter is free", current),
        }
        report.scratch = next;
        next
    }

    fn move_to(
        &self,
        topology: &mut Topology,
        volume: &Volume,
        letter: DriveLetter,
        report: &mut RemapReport,
    ) -> Result<(), RemapError> {
        let attempted = Mutation::Move {
            volume: volume.id.clone(),
            from: volume.letter,
            to: letter,
        };

        if let Some(holder) = topology.find_by_letter(letter).filter(|v| v.id != volume.id) {
            return Err(RemapError::MutationFailure {
                volume: volume.id.clone(),
                attempted,
                error: StorageError::LetterInUse {
                    letter,
                    holder: holder.id.clone(),
                },
            });
        }

        self.storage
            .set_letter(volume, letter)
            .map_err(|error| RemapError::MutationFailure {
                volume: volume.id.clone(),
                attempted: attempted.clone(),
                error,
            })?;

        info!("Moved {} to {}", volume, letter);
        topology.set_letter(&volume.id, Some(letter));
        report.mutations.push(attempted);
        Ok(())
    }
}
