//! Desired label → letter mapping, built from volume tags.

use crate::letter::DriveLetter;
use crate::tags::{TagLookup, TagNames};
use crate::volume::{MAX_LABEL_LEN, Topology, Volume, VolumeId};
use log::{debug, warn};
use serde::Serialize;

/// Both tags of one candidate volume, normalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeTags {
    pub volume_id: VolumeId,
    pub label: String,
    pub letter: DriveLetter,
}

/// Desired mapping for one pass.
///
/// Each label maps to exactly one letter. Inserting a label that's already present overwrites
/// its letter (last tag wins) but keeps its first position, so pairs are always processed
/// in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DesiredAssignment {
    tagged: Vec<VolumeTags>,
    pairs: Vec<(String, DriveLetter)>,
}

impl DesiredAssignment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up the label and letter tags of every candidate volume.
    ///
    /// Lookup failures, blank values, unparseable letters and reserved letters all count as
    /// "no tag" for that volume; none of them abort the build.
    pub fn from_tags(topology: &Topology, lookup: &dyn TagLookup, names: &TagNames) -> Self {
        let mut assignment = Self::new();

        for volume in topology.candidates() {
            let Some(label) = read_tag(lookup, volume, &names.label) else {
                continue;
            };
            let Some(raw_letter) = read_tag(lookup, volume, &names.letter) else {
                continue;
            };

            let letter = match DriveLetter::parse(&raw_letter) {
                Ok(letter) if letter.is_reserved() => {
                    warn!("Ignoring {} tag of {}: {} is reserved", names.letter, volume.id, letter);
                    continue;
                }
                Ok(letter) => letter,
                Err(e) => {
                    warn!("Ignoring {} tag of {}: {}", names.letter, volume.id, e);
                    continue;
                }
            };

            if label.chars().count() > MAX_LABEL_LEN {
                warn!(
                    "Label {:?} of {} is longer than {} characters, the file system may refuse it",
                    label, volume.id, MAX_LABEL_LEN
                );
            }

            debug!("{} wants label {:?} at {}", volume.id, label, letter);
            assignment.insert_tags(VolumeTags {
                volume_id: volume.id.clone(),
                label,
                letter,
            });
        }

        assignment
    }

    /// Records a tagged volume and its label → letter pair.
    pub fn insert_tags(&mut self, tags: VolumeTags) {
        self.insert(&tags.label, tags.letter);
        self.tagged.push(tags);
    }

    /// Inserts or overwrites a label → letter pair.
    pub fn insert(&mut self, label: &str, letter: DriveLetter) {
        if let Some((_, existing)) = self.pairs.iter_mut().find(|(l, _)| l == label) {
            if *existing != letter {
                warn!("Label {:?} is tagged twice; {} replaces {}", label, letter, existing);
            }
            *existing = letter;
            return;
        }
        if let Some((other, _)) = self.pairs.iter().find(|(_, l)| *l == letter) {
            warn!("Labels {:?} and {:?} both want {}; the later one wins the letter", other, label, letter);
        }
        self.pairs.push((label.to_string(), letter));
    }

    /// Label → letter pairs in processing order.
    pub fn pairs(&self) -> &[(String, DriveLetter)] {
        &self.pairs
    }

    /// Per-volume tags, in enumeration order.
    pub fn tagged(&self) -> &[VolumeTags] {
        &self.tagged
    }

    pub fn letter_for(&self, label: &str) -> Option<DriveLetter> {
        self.pairs.iter().find(|(l, _)| l == label).map(|(_, letter)| *letter)
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }
}

fn read_tag(lookup: &dyn TagLookup, volume: &Volume, tag: &str) -> Option<String> {
    match lookup.lookup_tag(&volume.id, tag) {
        Ok(Some(value)) if !value.trim().is_empty() => Some(value.trim().to_string()),
        Ok(_) => None,
        Err(e) => {
            warn!("Couldn't read tag {} of {}: {}", tag, volume.id, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags::StaticTags;
    use crate::volume::VolumeRole;

    fn letter(s: &str) -> DriveLetter {
        DriveLetter::parse(s).unwrap()
    }

    fn topology() -> Topology {
        Topology::new(vec![
            Volume::new("boot", VolumeRole::Boot).with_letter(letter("C")),
            Volume::new("vol-a", VolumeRole::Candidate).with_letter(letter("E")),
            Volume::new("vol-b", VolumeRole::Candidate).with_letter(letter("F")),
            Volume::new("ephemeral0", VolumeRole::Unmanaged).with_letter(letter("G")),
        ])
    }

    #[test]
    fn test_from_tags_reads_candidates_only() {
        let tags = StaticTags::new()
            .with_volume("vol-a", "DATA", "F")
            .with_volume("boot", "SYSTEM", "D")
            .with_volume("ephemeral0", "SCRATCH", "H");

        let assignment = DesiredAssignment::from_tags(&topology(), &tags, &TagNames::default());
        assert_eq!(assignment.pairs(), &[("DATA".to_string(), letter("F:"))]);
        assert_eq!(assignment.tagged().len(), 1);
        assert_eq!(assignment.tagged()[0].volume_id.as_str(), "vol-a");
    }

    #[test]
    fn test_missing_either_tag_skips_volume() {
        let tags = StaticTags::new()
            .with_tag("vol-a", "DriveLabel", "DATA")
            .with_tag("vol-b", "DriveLetter", "H");

        let assignment = DesiredAssignment::from_tags(&topology(), &tags, &TagNames::default());
        assert!(assignment.is_empty());
    }

    #[test]
    fn test_lookup_failure_counts_as_untagged() {
        let tags = StaticTags::new()
            .with_volume("vol-a", "DATA", "H")
            .with_volume("vol-b", "LOGS", "I")
            .with_unavailable("vol-a");

        let assignment = DesiredAssignment::from_tags(&topology(), &tags, &TagNames::default());
        assert_eq!(assignment.pairs(), &[("LOGS".to_string(), letter("I"))]);
    }

    #[test]
    fn test_letters_are_normalized() {
        let tags = StaticTags::new().with_volume("vol-a", " DATA ", " h:\\ ");
        let assignment = DesiredAssignment::from_tags(&topology(), &tags, &TagNames::default());
        assert_eq!(assignment.letter_for("DATA"), Some(letter("H:")));
    }

    #[test]
    fn test_invalid_and_reserved_letters_are_ignored() {
        let tags = StaticTags::new()
            .with_volume("vol-a", "DATA", "HH")
            .with_volume("vol-b", "LOGS", "C:");
        let assignment = DesiredAssignment::from_tags(&topology(), &tags, &TagNames::default());
        assert!(assignment.is_empty());
    }

    #[test]
    fn test_duplicate_label_last_wins_in_first_position() {
        let tags = StaticTags::new()
            .with_volume("vol-a", "DATA", "H")
            .with_volume("vol-b", "DATA", "I");

        let assignment = DesiredAssignment::from_tags(&topology(), &tags, &TagNames::default());
        assert_eq!(assignment.pairs(), &[("DATA".to_string(), letter("I"))]);
        assert_eq!(assignment.tagged().len(), 2);
    }

    #[test]
    fn test_custom_tag_names() {
        let tags = StaticTags::new()
            .with_tag("vol-a", "Mount", "Q")
            .with_tag("vol-a", "Name", "ARCHIVE");
        let names = TagNames {
            letter: "Mount".to_string(),
            label: "Name".to_string(),
        };

        let assignment = DesiredAssignment::from_tags(&topology(), &tags, &names);
        assert_eq!(assignment.letter_for("ARCHIVE"), Some(letter("Q")));
    }
}
