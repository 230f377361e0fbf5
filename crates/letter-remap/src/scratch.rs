//! Scratch letter selection.

use crate::letter::DriveLetter;
use crate::volume::Topology;

/// Parking spot for a volume displaced during a swap.
pub struct ScratchLetter;

impl ScratchLetter {
    /// Lowest assignable letter no volume currently holds.
    ///
    /// The letter may also be some pair's destination; the remapper picks another one if it's
    /// taken by the time a swap needs it. `None` only when all assignable letters are held.
    pub fn choose(topology: &Topology) -> Option<DriveLetter> {
        let occupied = topology.occupied_letters();
        DriveLetter::assignable().find(|letter| !occupied.contains(letter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::{Volume, VolumeRole};

    fn letter(s: &str) -> DriveLetter {
        DriveLetter::parse(s).unwrap()
    }

    #[test]
    fn test_picks_lowest_free_non_reserved() {
        let topology = Topology::new(vec![
            Volume::new("boot", VolumeRole::Boot).with_letter(letter("C")),
            Volume::new("vol-a", VolumeRole::Candidate).with_letter(letter("D")),
            Volume::new("vol-b", VolumeRole::Candidate).with_letter(letter("F")),
        ]);
        assert_eq!(ScratchLetter::choose(&topology), Some(letter("E")));
    }

    #[test]
    fn test_last_free_letter() {
        let topology: Topology = DriveLetter::assignable()
            .filter(|l| l.as_char() != 'Z')
            .map(|l| Volume::new(format!("vol-{}", l.as_char()), VolumeRole::Candidate).with_letter(l))
            .collect();
        assert_eq!(ScratchLetter::choose(&topology), Some(letter("Z")));
    }

    #[test]
    fn test_none_when_all_assignable_letters_taken() {
        let topology: Topology = DriveLetter::assignable()
            .map(|l| Volume::new(format!("vol-{}", l.as_char()), VolumeRole::Candidate).with_letter(l))
            .collect();
        assert_eq!(topology.len(), 23);
        assert_eq!(ScratchLetter::choose(&topology), None);
    }
}
