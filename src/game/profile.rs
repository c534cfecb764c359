use crate::core::input::{KeyBinding, KeyMap, RebindError, Slot};
use crate::core::store::{
    ANIMATION_SPEED_KEY, HISPEED_KEY, KEY_CONFIG_KEY, NOTES_COUNT_KEY, Store, VOLUME_KEY,
};
use crate::game::scores::Ranking;
use log::{info, warn};
use std::str::FromStr;

pub const HISPEED_MIN: f32 = 0.1;
pub const HISPEED_MAX: f32 = 5.0;
pub const HISPEED_STEP: f32 = 0.1;
pub const NOTE_COUNT_MIN: usize = 10;
pub const NOTE_COUNT_MAX: usize = 999;
pub const VOLUME_MIN: f32 = 0.0;
pub const VOLUME_MAX: f32 = 1.0;
pub const ANIMATION_DURATION_MIN: f32 = 0.0;
pub const ANIMATION_DURATION_MAX: f32 = 0.3;

/// Player-facing settings. Every setter clamps instead of rejecting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Settings {
    hi_speed: f32,
    note_count: usize,
    volume: f32,
    /// Seconds the note lane takes to slide one note.
    animation_duration: f32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            hi_speed: 1.0,
            note_count: 100,
            volume: 0.25,
            animation_duration: 0.1,
        }
    }
}

#[inline(always)]
fn round_to(value: f32, places: i32) -> f32 {
    let scale = 10f32.powi(places);
    (value * scale).round() / scale
}

fn clamp_finite(value: f32, min: f32, max: f32, fallback: f32) -> f32 {
    if value.is_finite() { value.clamp(min, max) } else { fallback }
}

impl Settings {
    pub fn hi_speed(&self) -> f32 {
        self.hi_speed
    }

    pub fn note_count(&self) -> usize {
        self.note_count
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn animation_duration(&self) -> f32 {
        self.animation_duration
    }

    pub fn set_hi_speed(&mut self, value: f32) {
        let clamped = clamp_finite(value, HISPEED_MIN, HISPEED_MAX, self.hi_speed);
        self.hi_speed = round_to(clamped, 1);
    }

    pub fn set_note_count(&mut self, value: i64) {
        self.note_count = value.clamp(NOTE_COUNT_MIN as i64, NOTE_COUNT_MAX as i64) as usize;
    }

    pub fn set_volume(&mut self, value: f32) {
        self.volume = clamp_finite(value, VOLUME_MIN, VOLUME_MAX, self.volume);
    }

    pub fn set_animation_duration(&mut self, value: f32) {
        let clamped = clamp_finite(
            value,
            ANIMATION_DURATION_MIN,
            ANIMATION_DURATION_MAX,
            self.animation_duration,
        );
        self.animation_duration = round_to(clamped, 2);
    }

    /// Reads every setting from the store; absent or garbled values fall back
    /// to their defaults before clamping.
    pub fn load(store: &dyn Store) -> Self {
        let mut settings = Self::default();
        if let Some(v) = parse_value::<f32>(store, HISPEED_KEY) {
            settings.set_hi_speed(v);
        }
        if let Some(v) = parse_value::<i64>(store, NOTES_COUNT_KEY) {
            settings.set_note_count(v);
        }
        if let Some(v) = parse_value::<f32>(store, VOLUME_KEY) {
            settings.set_volume(v);
        }
        if let Some(v) = parse_value::<f32>(store, ANIMATION_SPEED_KEY) {
            settings.set_animation_duration(v);
        }
        settings
    }
}

fn parse_value<T: FromStr>(store: &dyn Store, key: &str) -> Option<T> {
    let raw = store.get(key)?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("Ignoring saved value {:?} for '{}'.", raw, key);
            None
        }
    }
}

fn load_binding(store: &dyn Store) -> KeyBinding {
    let Some(json) = store.get(KEY_CONFIG_KEY) else {
        return KeyBinding::default();
    };
    match serde_json::from_str::<KeyBinding>(&json) {
        Ok(binding) if binding.is_valid() => binding,
        Ok(binding) => {
            warn!("Saved key config {:?} is unusable, using defaults.", binding);
            KeyBinding::default()
        }
        Err(e) => {
            warn!("Saved key config is unreadable ({}), using defaults.", e);
            KeyBinding::default()
        }
    }
}

/// Everything about the player that outlives a run, plus the store it lives in.
pub struct Profile<S: Store> {
    store: S,
    settings: Settings,
    binding: KeyBinding,
    keymap: KeyMap,
    ranking: Ranking,
}

impl<S: Store> Profile<S> {
    pub fn load(store: S) -> Self {
        let settings = Settings::load(&store);
        let binding = load_binding(&store);
        let keymap = KeyMap::from_binding(&binding);
        let ranking = Ranking::load(&store);
        info!(
            "Profile loaded: hi-speed {:.1}, {} notes, volume {:.2}, {} ranked scores.",
            settings.hi_speed,
            settings.note_count,
            settings.volume,
            ranking.entries().len()
        );
        Self { store, settings, binding, keymap, ranking }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn binding(&self) -> &KeyBinding {
        &self.binding
    }

    pub fn keymap(&self) -> &KeyMap {
        &self.keymap
    }

    pub fn ranking(&self) -> &Ranking {
        &self.ranking
    }

    #[cfg(test)]
    pub fn store(&self) -> &S {
        &self.store
    }

    fn save(&mut self, key: &str, value: &str) {
        if let Err(e) = self.store.set(key, value) {
            warn!("Failed to save '{}': {}", key, e);
        }
    }

    pub fn set_hi_speed(&mut self, value: f32) -> f32 {
        self.settings.set_hi_speed(value);
        let v = format!("{:.1}", self.settings.hi_speed);
        self.save(HISPEED_KEY, &v);
        self.settings.hi_speed
    }

    pub fn nudge_hi_speed(&mut self, steps: i32) -> f32 {
        self.set_hi_speed(self.settings.hi_speed + HISPEED_STEP * steps as f32)
    }

    pub fn set_note_count(&mut self, value: i64) -> usize {
        self.settings.set_note_count(value);
        let v = self.settings.note_count.to_string();
        self.save(NOTES_COUNT_KEY, &v);
        self.settings.note_count
    }

    pub fn set_volume(&mut self, value: f32) -> f32 {
        self.settings.set_volume(value);
        let v = self.settings.volume.to_string();
        self.save(VOLUME_KEY, &v);
        self.settings.volume
    }

    pub fn set_animation_duration(&mut self, value: f32) -> f32 {
        self.settings.set_animation_duration(value);
        let v = format!("{:.2}", self.settings.animation_duration);
        self.save(ANIMATION_SPEED_KEY, &v);
        self.settings.animation_duration
    }

    fn apply_binding(&mut self, binding: KeyBinding) {
        self.keymap = KeyMap::from_binding(&binding);
        self.binding = binding;
        match serde_json::to_string(&self.binding) {
            Ok(json) => self.save(KEY_CONFIG_KEY, &json),
            Err(e) => warn!("Failed to encode key config: {}", e),
        }
    }

    pub fn rebind(&mut self, slot: Slot, raw_key: &str) -> Result<&KeyBinding, RebindError> {
        let mut next = self.binding.clone();
        next.rebind(slot, raw_key)?;
        self.apply_binding(next);
        Ok(&self.binding)
    }

    pub fn reset_bindings(&mut self) {
        info!("Key config reset to defaults.");
        self.apply_binding(KeyBinding::default());
    }

    /// Puts a score on the board and persists it.
    pub fn submit_score(&mut self, score: u64) -> Option<usize> {
        self.ranking.submit(score, &mut self.store)
    }

    pub fn reset_ranking(&mut self) {
        self.ranking.reset(&mut self.store);
    }
}
