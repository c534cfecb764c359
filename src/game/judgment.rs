use crate::game::note::NoteType;
use std::time::Duration;

/// Time added to the run clock for every wrong key.
pub const MISS_PENALTY: Duration = Duration::from_millis(500);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HitResult {
    Hit,
    Miss,
    /// Key not bound to any note, or nothing is being judged right now.
    Ignored,
}

/// Judges one resolved key press against the note under the cursor.
///
/// There is no timing window: the only question is whether the pressed
/// note type is the expected one. With no expected note (run already
/// complete) the press is ignored.
#[inline(always)]
pub fn judge(pressed: Option<NoteType>, expected: Option<NoteType>) -> HitResult {
    match (pressed, expected) {
        (Some(p), Some(e)) if p == e => HitResult::Hit,
        (Some(_), Some(_)) => HitResult::Miss,
        _ => HitResult::Ignored,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_note_is_a_hit() {
        assert_eq!(judge(Some(NoteType::Don), Some(NoteType::Don)), HitResult::Hit);
        assert_eq!(judge(Some(NoteType::Ka), Some(NoteType::Ka)), HitResult::Hit);
    }

    #[test]
    fn wrong_note_is_a_miss() {
        assert_eq!(judge(Some(NoteType::Ka), Some(NoteType::Don)), HitResult::Miss);
        assert_eq!(judge(Some(NoteType::Don), Some(NoteType::Ka)), HitResult::Miss);
    }

    #[test]
    fn unmapped_key_or_finished_run_is_ignored() {
        assert_eq!(judge(None, Some(NoteType::Don)), HitResult::Ignored);
        assert_eq!(judge(Some(NoteType::Don), None), HitResult::Ignored);
        assert_eq!(judge(None, None), HitResult::Ignored);
    }
}
