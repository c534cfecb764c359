use crate::game::note::NoteType;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

pub const SPACE_KEY: &str = " ";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Slot {
    DonLeft = 0,
    DonRight = 1,
    KaLeft = 2,
    KaRight = 3,
}

impl Slot {
    pub const ALL: [Slot; 4] = [Slot::DonLeft, Slot::DonRight, Slot::KaLeft, Slot::KaRight];

    #[inline(always)]
    pub const fn note(self) -> NoteType {
        match self {
            Slot::DonLeft | Slot::DonRight => NoteType::Don,
            Slot::KaLeft | Slot::KaRight => NoteType::Ka,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Slot::DonLeft => "don_left",
            Slot::DonRight => "don_right",
            Slot::KaLeft => "ka_left",
            Slot::KaRight => "ka_right",
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RebindError {
    #[error("key {key:?} is already assigned to {existing}")]
    Conflict { key: String, existing: Slot },
    #[error("key {0:?} cannot be bound")]
    InvalidKey(String),
}

/// Canonical form of a raw key name: one lowercase printable character, or a
/// single space for the space bar. Named keys (Shift, Enter, ArrowLeft...) are
/// not bindable and yield `None`.
pub fn normalize_key(raw: &str) -> Option<String> {
    if raw == SPACE_KEY || raw.eq_ignore_ascii_case("space") {
        return Some(SPACE_KEY.to_string());
    }
    let mut chars = raw.chars();
    let c = chars.next()?;
    if chars.next().is_some() || c.is_control() || c.is_whitespace() {
        return None;
    }
    // Some capitals lowercase to several chars (U+0130 -> "i\u{307}").
    let mut lower = c.to_lowercase();
    let c = lower.next()?;
    if lower.next().is_some() {
        return None;
    }
    Some(c.to_string())
}

/// Label for showing a bound key to the player.
pub fn key_label(key: &str) -> String {
    if key == SPACE_KEY {
        "SPACE".to_string()
    } else {
        key.to_uppercase()
    }
}

/// Which raw key drives each of the four drum slots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyBinding {
    pub don_left: String,
    pub don_right: String,
    pub ka_left: String,
    pub ka_right: String,
}

impl Default for KeyBinding {
    fn default() -> Self {
        Self {
            don_left: "f".to_string(),
            don_right: "j".to_string(),
            ka_left: "d".to_string(),
            ka_right: "k".to_string(),
        }
    }
}

impl KeyBinding {
    pub fn get(&self, slot: Slot) -> &str {
        match slot {
            Slot::DonLeft => &self.don_left,
            Slot::DonRight => &self.don_right,
            Slot::KaLeft => &self.ka_left,
            Slot::KaRight => &self.ka_right,
        }
    }

    fn slot_mut(&mut self, slot: Slot) -> &mut String {
        match slot {
            Slot::DonLeft => &mut self.don_left,
            Slot::DonRight => &mut self.don_right,
            Slot::KaLeft => &mut self.ka_left,
            Slot::KaRight => &mut self.ka_right,
        }
    }

    /// Assigns `raw_key` to `slot`. Leaves the binding untouched on error.
    pub fn rebind(&mut self, slot: Slot, raw_key: &str) -> Result<(), RebindError> {
        let Some(key) = normalize_key(raw_key) else {
            warn!("Refusing to bind {:?} to {}: not a bindable key.", raw_key, slot);
            return Err(RebindError::InvalidKey(raw_key.to_string()));
        };
        if let Some(existing) = Slot::ALL
            .into_iter()
            .find(|s| *s != slot && self.get(*s) == key)
        {
            warn!("Key {:?} already bound to {}; {} unchanged.", key, existing, slot);
            return Err(RebindError::Conflict { key, existing });
        }
        info!("Bound {} to {}.", slot, key_label(&key));
        *self.slot_mut(slot) = key;
        Ok(())
    }

    /// A table read back from storage is usable only if every slot holds a
    /// bindable key and no key is shared.
    pub fn is_valid(&self) -> bool {
        let mut seen: Vec<&str> = Vec::with_capacity(Slot::ALL.len());
        for slot in Slot::ALL {
            let key = self.get(slot);
            if normalize_key(key).as_deref() != Some(key) || seen.contains(&key) {
                return false;
            }
            seen.push(key);
        }
        true
    }
}

/// Inverse of a [`KeyBinding`]: raw key to the note it plays.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyMap {
    map: HashMap<String, NoteType>,
}

impl KeyMap {
    pub fn from_binding(binding: &KeyBinding) -> Self {
        let map = Slot::ALL
            .into_iter()
            .map(|slot| (binding.get(slot).to_string(), slot.note()))
            .collect();
        Self { map }
    }

    #[inline(always)]
    pub fn resolve(&self, raw_key: &str) -> Option<NoteType> {
        let key = normalize_key(raw_key)?;
        self.map.get(&key).copied()
    }
}

/// One-shot capture of the next key press for a rebinding. A new request
/// replaces the pending one.
#[derive(Debug, Default)]
pub struct KeyCapture {
    pending: Option<Slot>,
}

impl KeyCapture {
    /// Starts waiting for a key for `slot`; returns the capture it superseded.
    pub fn await_next_key(&mut self, slot: Slot) -> Option<Slot> {
        self.pending.replace(slot)
    }

    pub fn cancel(&mut self) -> Option<Slot> {
        self.pending.take()
    }

    #[inline(always)]
    pub fn is_waiting(&self) -> bool {
        self.pending.is_some()
    }

    pub fn waiting_for(&self) -> Option<Slot> {
        self.pending
    }

    /// Hands the key to the pending capture, consuming it.
    pub fn offer(&mut self, raw_key: &str) -> Option<(Slot, String)> {
        self.pending.take().map(|slot| (slot, raw_key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_accepts_single_chars_and_space() {
        assert_eq!(normalize_key("F").as_deref(), Some("f"));
        assert_eq!(normalize_key("j").as_deref(), Some("j"));
        assert_eq!(normalize_key(";").as_deref(), Some(";"));
        assert_eq!(normalize_key(" ").as_deref(), Some(" "));
        assert_eq!(normalize_key("Space").as_deref(), Some(" "));
    }

    #[test]
    fn normalize_rejects_named_and_control_keys() {
        for raw in ["Shift", "Enter", "ArrowLeft", "", "\t", "\n", "ab"] {
            assert_eq!(normalize_key(raw), None, "{raw:?}");
        }
    }

    #[test]
    fn default_map_resolves_both_hands() {
        let map = KeyMap::from_binding(&KeyBinding::default());
        assert_eq!(map.resolve("f"), Some(NoteType::Don));
        assert_eq!(map.resolve("J"), Some(NoteType::Don));
        assert_eq!(map.resolve("d"), Some(NoteType::Ka));
        assert_eq!(map.resolve("k"), Some(NoteType::Ka));
        assert_eq!(map.resolve("x"), None);
        assert_eq!(map.resolve("Escape"), None);
    }

    #[test]
    fn rebind_moves_a_slot_to_a_free_key() {
        let mut binding = KeyBinding::default();
        binding.rebind(Slot::KaLeft, "S").unwrap();
        assert_eq!(binding.ka_left, "s");
        let map = KeyMap::from_binding(&binding);
        assert_eq!(map.resolve("s"), Some(NoteType::Ka));
        assert_eq!(map.resolve("d"), None);
    }

    #[test]
    fn rebind_conflict_leaves_binding_unchanged() {
        let mut binding = KeyBinding::default();
        let before = binding.clone();
        let err = binding.rebind(Slot::KaLeft, "F").unwrap_err();
        assert_eq!(
            err,
            RebindError::Conflict { key: "f".to_string(), existing: Slot::DonLeft }
        );
        assert_eq!(binding, before);
    }

    #[test]
    fn rebinding_a_slot_to_its_own_key_is_fine() {
        let mut binding = KeyBinding::default();
        assert!(binding.rebind(Slot::DonRight, "j").is_ok());
        assert_eq!(binding, KeyBinding::default());
    }

    #[test]
    fn invalid_key_is_rejected_without_mutation() {
        let mut binding = KeyBinding::default();
        assert_eq!(
            binding.rebind(Slot::DonLeft, "Control"),
            Err(RebindError::InvalidKey("Control".to_string()))
        );
        assert_eq!(binding, KeyBinding::default());
    }

    #[test]
    fn capitals_with_multi_char_lowercase_are_not_bindable() {
        assert_eq!(normalize_key("\u{130}"), None);
        assert_eq!(normalize_key("Ä").as_deref(), Some("ä"));

        let mut binding = KeyBinding::default();
        assert_eq!(
            binding.rebind(Slot::DonLeft, "\u{130}"),
            Err(RebindError::InvalidKey("\u{130}".to_string()))
        );
        assert_eq!(binding, KeyBinding::default());
    }

    #[test]
    fn no_sequence_of_rebinds_shares_a_key() {
        let mut binding = KeyBinding::default();
        let attempts = [
            (Slot::DonLeft, "k"),
            (Slot::DonLeft, "a"),
            (Slot::KaRight, "a"),
            (Slot::KaRight, " "),
            (Slot::DonRight, "space"),
            (Slot::KaLeft, "f"),
            (Slot::DonRight, "f"),
        ];
        for (slot, key) in attempts {
            let _ = binding.rebind(slot, key);
            assert!(binding.is_valid(), "{binding:?}");
        }
        assert_eq!(binding.don_left, "a");
        assert_eq!(binding.don_right, "j");
        assert_eq!(binding.ka_left, "f");
        assert_eq!(binding.ka_right, " ");
    }

    #[test]
    fn space_binding_round_trips_through_json() {
        let mut binding = KeyBinding::default();
        binding.rebind(Slot::KaRight, " ").unwrap();
        let json = serde_json::to_string(&binding).unwrap();
        let back: KeyBinding = serde_json::from_str(&json).unwrap();
        assert_eq!(back.ka_right, " ");
        assert_eq!(key_label(&back.ka_right), "SPACE");
    }

    #[test]
    fn partial_json_fills_missing_slots_with_defaults() {
        let back: KeyBinding = serde_json::from_str(r#"{"don_left":"g"}"#).unwrap();
        assert_eq!(back.don_left, "g");
        assert_eq!(back.ka_right, "k");
        assert!(back.is_valid());
    }

    #[test]
    fn duplicated_table_is_invalid() {
        let bad = KeyBinding {
            don_left: "f".into(),
            don_right: "f".into(),
            ka_left: "d".into(),
            ka_right: "k".into(),
        };
        assert!(!bad.is_valid());
        let shouty = KeyBinding { don_left: "F".into(), ..KeyBinding::default() };
        assert!(!shouty.is_valid());
    }

    #[test]
    fn capture_is_single_use_and_supersedable() {
        let mut capture = KeyCapture::default();
        assert_eq!(capture.offer("x"), None);
        assert_eq!(capture.await_next_key(Slot::DonLeft), None);
        assert_eq!(capture.await_next_key(Slot::KaRight), Some(Slot::DonLeft));
        assert_eq!(capture.offer("q"), Some((Slot::KaRight, "q".to_string())));
        assert!(!capture.is_waiting());
        capture.await_next_key(Slot::KaLeft);
        assert_eq!(capture.cancel(), Some(Slot::KaLeft));
        assert_eq!(capture.offer("q"), None);
    }
}
