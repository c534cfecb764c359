use rand::Rng;
use rand::distr::{Distribution, StandardUniform};
use std::fmt;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum NoteType {
    Don,
    Ka,
}

impl NoteType {
    pub const fn as_str(self) -> &'static str {
        match self {
            NoteType::Don => "don",
            NoteType::Ka => "ka",
        }
    }
}

impl fmt::Display for NoteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Fair coin per note. No streak limits or balancing.
impl Distribution<NoteType> for StandardUniform {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> NoteType {
        if rng.random::<bool>() { NoteType::Don } else { NoteType::Ka }
    }
}

/// The notes of one run. Fixed once generated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sequence {
    notes: Box<[NoteType]>,
}

impl Sequence {
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.notes.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    #[inline(always)]
    pub fn get(&self, index: usize) -> Option<NoteType> {
        self.notes.get(index).copied()
    }

    pub fn notes(&self) -> &[NoteType] {
        &self.notes
    }
}

impl From<Vec<NoteType>> for Sequence {
    fn from(notes: Vec<NoteType>) -> Self {
        Self { notes: notes.into_boxed_slice() }
    }
}

/// Draws `len` notes independently. The caller validates `len`.
pub fn generate<R: Rng + ?Sized>(rng: &mut R, len: usize) -> Sequence {
    let notes: Vec<NoteType> = (0..len).map(|_| rng.random()).collect();
    Sequence::from(notes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn generated_sequence_has_requested_length() {
        let mut rng = StdRng::seed_from_u64(7);
        for len in [10, 11, 100, 257, 999] {
            let seq = generate(&mut rng, len);
            assert_eq!(seq.len(), len);
            assert!(seq.notes().iter().all(|n| matches!(n, NoteType::Don | NoteType::Ka)));
        }
    }

    #[test]
    fn both_note_types_show_up_in_a_long_run() {
        let mut rng = StdRng::seed_from_u64(42);
        let seq = generate(&mut rng, 999);
        let dons = seq.notes().iter().filter(|n| **n == NoteType::Don).count();
        // 999 fair coin flips landing outside 300..700 would be absurdly unlikely.
        assert!((300..700).contains(&dons), "dons={dons}");
    }

    #[test]
    fn same_seed_same_sequence() {
        let a = generate(&mut StdRng::seed_from_u64(3), 64);
        let b = generate(&mut StdRng::seed_from_u64(3), 64);
        assert_eq!(a, b);
    }

    #[test]
    fn get_past_the_end_is_none() {
        let seq = Sequence::from(vec![NoteType::Don, NoteType::Ka]);
        assert_eq!(seq.get(1), Some(NoteType::Ka));
        assert_eq!(seq.get(2), None);
        assert_eq!(NoteType::Ka.to_string(), "ka");
    }
}
