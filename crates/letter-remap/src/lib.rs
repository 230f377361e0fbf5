//! Deterministic, idempotent drive-letter remapping.
//!
//! Volumes come back in arbitrary order at every boot. Each one should carry a label from its
//! tags and sit at the letter its tags ask for, but a letter can only be held by one volume at
//! a time. This crate computes the desired mapping and converges to it one single-volume change
//! at a time, parking displaced volumes on a scratch letter during swaps.
//!
//! ```
//! use letter_remap::{
//!     DesiredAssignment, DriveLetter, InMemoryStorage, Remapper, ScratchLetter, StaticTags, TagNames,
//!     TopologyResolver, Volume, VolumeRole,
//! };
//!
//! let e = DriveLetter::parse("E").unwrap();
//! let f = DriveLetter::parse("F").unwrap();
//! let storage = InMemoryStorage::new(vec![
//!     Volume::new("vol-a", VolumeRole::Candidate).with_letter(e).with_label("DATA"),
//!     Volume::new("vol-b", VolumeRole::Candidate).with_letter(f).with_label("LOGS"),
//! ]);
//! let tags = StaticTags::new().with_volume("vol-a", "DATA", "F").with_volume("vol-b", "LOGS", "E:");
//!
//! let mut topology = storage.resolve().unwrap();
//! let desired = DesiredAssignment::from_tags(&topology, &tags, &TagNames::default());
//! let scratch = ScratchLetter::choose(&topology);
//! let report = Remapper::new(&storage).run(&mut topology, &desired, scratch);
//!
//! assert!(report.is_converged());
//! assert_eq!(storage.snapshot().find_by_label("LOGS").unwrap().letter, Some(e));
//! ```

pub mod assignment;
mod ignore_poison;
pub mod letter;
pub mod remap;
pub mod scratch;
pub mod storage;
pub mod tags;
pub mod volume;

pub use assignment::{DesiredAssignment, VolumeTags};
pub use ignore_poison::IgnorePoison;
pub use letter::{DriveLetter, LetterError};
pub use remap::{RemapError, RemapReport, Remapper};
pub use scratch::ScratchLetter;
pub use storage::{
    DryRunStorage, Fault, InMemoryStorage, Mutation, ResolveError, StorageError, StorageManager, TopologyResolver,
};
pub use tags::{StaticTags, TagLookup, TagLookupError, TagNames};
pub use volume::{Topology, Volume, VolumeId, VolumeKey, VolumeRole};
