use crate::core::audio::{Audio, SoundKey};
use crate::core::input::{KeyBinding, RebindError, Slot};
use crate::core::store::Store;
use crate::game::judgment::{self, HitResult, MISS_PENALTY};
use crate::game::note::{self, NoteType, Sequence};
use crate::game::profile::{Profile, Settings};
use crate::game::scores::{self, ClearResult};
use log::{debug, info};
use rand::rngs::StdRng;
use std::time::{Duration, Instant};

pub const COUNTDOWN_TICKS: u8 = 3;
pub const COUNTDOWN_INTERVAL: Duration = Duration::from_millis(500);
/// Display refresh while a run is live. Purely cosmetic.
pub const REFRESH_INTERVAL: Duration = Duration::from_millis(10);

/// Identity of one start request. Wakeups carry it so a superseded run can
/// never be touched by its leftover timer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RunId(u64);

/// The single pending timer of the engine. The front-end sleeps until `due`
/// and hands it back through [`Engine::on_timer`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Wakeup {
    pub run: RunId,
    pub due: Instant,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PhaseKind {
    Idle,
    Starting,
    Active,
}

#[derive(Debug)]
struct Countdown {
    /// Number currently on screen: 3, 2, then 1.
    shown: u8,
}

#[derive(Debug)]
struct RunState {
    sequence: Sequence,
    cursor: usize,
    miss_count: u32,
    started_at: Instant,
    penalty: Duration,
    // Penalty that could not be folded into `started_at` because the instant
    // would have underflowed.
    unapplied_penalty: Duration,
}

impl RunState {
    fn new(sequence: Sequence, now: Instant) -> Self {
        Self {
            sequence,
            cursor: 0,
            miss_count: 0,
            started_at: now,
            penalty: Duration::ZERO,
            unapplied_penalty: Duration::ZERO,
        }
    }

    #[inline(always)]
    fn expected(&self) -> Option<NoteType> {
        self.sequence.get(self.cursor)
    }

    #[inline(always)]
    fn is_complete(&self) -> bool {
        self.cursor >= self.sequence.len()
    }

    /// Wall time since the start instant, misses included.
    fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started_at) + self.unapplied_penalty
    }

    fn apply_miss_penalty(&mut self) {
        self.miss_count += 1;
        self.penalty += MISS_PENALTY;
        match self.started_at.checked_sub(MISS_PENALTY) {
            Some(earlier) => self.started_at = earlier,
            None => self.unapplied_penalty += MISS_PENALTY,
        }
    }
}

#[derive(Debug)]
enum Phase {
    Idle,
    Starting(Countdown),
    Active(RunState),
}

/// Result of the most recent cleared run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Clear {
    pub result: ClearResult,
    /// Board position the score landed on, if it was ranked at all.
    pub rank: Option<usize>,
}

/// Read-only view for whatever draws the game.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Snapshot {
    pub phase: PhaseKind,
    pub countdown: Option<u8>,
    pub cursor: usize,
    pub remaining: usize,
    pub note_count: usize,
    pub miss_count: u32,
    pub elapsed_seconds: f64,
    pub penalty: Duration,
    /// 0.0 to 1.0 through the sequence.
    pub progress: f32,
    pub hi_speed: f32,
}

pub struct Engine<S: Store, A: Audio> {
    profile: Profile<S>,
    audio: A,
    rng: StdRng,
    phase: Phase,
    run_id: u64,
    timer: Option<Wakeup>,
    last_clear: Option<Clear>,
}

impl<S: Store, A: Audio> Engine<S, A> {
    pub fn new(profile: Profile<S>, mut audio: A, rng: StdRng) -> Self {
        audio.set_volume(profile.settings().volume());
        Self {
            profile,
            audio,
            rng,
            phase: Phase::Idle,
            run_id: 0,
            timer: None,
            last_clear: None,
        }
    }

    pub fn phase(&self) -> PhaseKind {
        match self.phase {
            Phase::Idle => PhaseKind::Idle,
            Phase::Starting(_) => PhaseKind::Starting,
            Phase::Active(_) => PhaseKind::Active,
        }
    }

    #[inline(always)]
    pub fn is_live(&self) -> bool {
        !matches!(self.phase, Phase::Idle)
    }

    #[inline(always)]
    fn current_run(&self) -> RunId {
        RunId(self.run_id)
    }

    pub fn settings(&self) -> &Settings {
        self.profile.settings()
    }

    pub fn binding(&self) -> &KeyBinding {
        self.profile.binding()
    }

    pub fn ranking(&self) -> &[scores::RankingEntry] {
        self.profile.ranking().entries()
    }

    pub fn last_clear(&self) -> Option<&Clear> {
        self.last_clear.as_ref()
    }

    pub fn next_wakeup(&self) -> Option<Wakeup> {
        self.timer
    }

    /// Begins the countdown. Does nothing while a run is already starting or
    /// active; use [`Engine::restart`] to replace it.
    pub fn start(&mut self, now: Instant) -> bool {
        if self.is_live() {
            debug!("Start ignored: a run is already {:?}.", self.phase());
            return false;
        }
        self.run_id += 1;
        self.last_clear = None;
        self.phase = Phase::Starting(Countdown { shown: COUNTDOWN_TICKS });
        self.timer = Some(Wakeup { run: self.current_run(), due: now + COUNTDOWN_INTERVAL });
        self.audio.play(SoundKey::Countdown);
        info!(
            "Run {} starting with {} notes.",
            self.run_id,
            self.profile.settings().note_count()
        );
        debug!("Countdown {}", COUNTDOWN_TICKS);
        true
    }

    /// Drops whatever run is live without the cancel sound and starts over.
    pub fn restart(&mut self, now: Instant) -> bool {
        if self.is_live() {
            info!("Run {} restarted.", self.run_id);
            self.tear_down();
        }
        self.start(now)
    }

    /// The start key. Idle starts a run and Active starts it over; a
    /// countdown in progress is left to finish.
    pub fn request_start(&mut self, now: Instant) -> bool {
        match self.phase {
            Phase::Idle => self.start(now),
            Phase::Active(_) => self.restart(now),
            Phase::Starting(_) => {
                debug!("Start ignored during the countdown.");
                false
            }
        }
    }

    /// Abandons the live run (countdown included). No score is computed.
    pub fn interrupt(&mut self, play_cancel_signal: bool) -> bool {
        if !self.is_live() {
            return false;
        }
        if let Phase::Active(run) = &self.phase {
            info!(
                "Run {} interrupted at note {}/{}.",
                self.run_id,
                run.cursor,
                run.sequence.len()
            );
        } else {
            info!("Run {} interrupted during the countdown.", self.run_id);
        }
        self.tear_down();
        if play_cancel_signal {
            self.audio.play(SoundKey::Cancel);
        }
        true
    }

    fn tear_down(&mut self) {
        self.phase = Phase::Idle;
        self.timer = None;
    }

    /// Judges one key press. Only the active phase judges anything; during
    /// the countdown every key is ignored.
    pub fn on_input(&mut self, raw_key: &str, now: Instant) -> HitResult {
        let Phase::Active(run) = &mut self.phase else {
            return HitResult::Ignored;
        };
        let pressed = self.profile.keymap().resolve(raw_key);
        let result = judgment::judge(pressed, run.expected());

        match result {
            HitResult::Hit => {
                run.cursor += 1;
                if let Some(note) = pressed {
                    self.audio.play(match note {
                        NoteType::Don => SoundKey::Don,
                        NoteType::Ka => SoundKey::Ka,
                    });
                }
                debug!("Hit {}/{}", run.cursor, run.sequence.len());
            }
            HitResult::Miss => {
                run.apply_miss_penalty();
                self.audio.play(SoundKey::Miss);
                info!(
                    "Miss at note {} ({} misses, +{:.1}s).",
                    run.cursor + 1,
                    run.miss_count,
                    run.penalty.as_secs_f64()
                );
            }
            HitResult::Ignored => {}
        }

        if run.is_complete() {
            self.finish(now);
        }
        result
    }

    fn finish(&mut self, now: Instant) {
        let Phase::Active(run) = std::mem::replace(&mut self.phase, Phase::Idle) else {
            return;
        };
        self.timer = None;

        let result = scores::compute(run.sequence.len(), run.miss_count, run.elapsed(now));
        self.audio.play(SoundKey::Clear);
        info!(
            "Run {} cleared in {:.2}s: {:.2} notes/s, {:.1}% accuracy, score {}.",
            self.run_id,
            result.elapsed_seconds,
            result.rate,
            result.accuracy * 100.0,
            result.score
        );

        let rank = if result.qualifies_for_ranking() {
            self.profile.submit_score(result.score)
        } else {
            debug!("{} notes is too short for the ranking.", result.note_count);
            None
        };
        self.last_clear = Some(Clear { result, rank });
    }

    /// Fires `wakeup` if it is still the engine's pending timer and is due.
    /// Anything left over from an earlier run or an already fired tick is
    /// ignored. Returns whether it fired.
    pub fn on_timer(&mut self, wakeup: Wakeup, now: Instant) -> bool {
        if self.timer != Some(wakeup) || now < wakeup.due {
            return false;
        }
        let run = wakeup.run;
        let countdown_done = match &mut self.phase {
            Phase::Idle => {
                self.timer = None;
                false
            }
            Phase::Starting(countdown) if countdown.shown > 1 => {
                countdown.shown -= 1;
                debug!("Countdown {}", countdown.shown);
                self.audio.play(SoundKey::Countdown);
                self.timer = Some(Wakeup { run, due: wakeup.due + COUNTDOWN_INTERVAL });
                false
            }
            Phase::Starting(_) => true,
            Phase::Active(_) => {
                let next = wakeup.due + REFRESH_INTERVAL;
                let due = if next > now { next } else { now + REFRESH_INTERVAL };
                self.timer = Some(Wakeup { run, due });
                false
            }
        };
        if countdown_done {
            self.activate(now);
        }
        true
    }

    /// Fires every timer that is due at `now`. Returns whether any fired.
    pub fn update(&mut self, now: Instant) -> bool {
        let mut fired = false;
        while let Some(wakeup) = self.timer {
            if wakeup.due > now || !self.on_timer(wakeup, now) {
                break;
            }
            fired = true;
        }
        fired
    }

    fn activate(&mut self, now: Instant) {
        let count = self.profile.settings().note_count();
        let sequence = note::generate(&mut self.rng, count);
        self.phase = Phase::Active(RunState::new(sequence, now));
        self.timer = Some(Wakeup { run: self.current_run(), due: now + REFRESH_INTERVAL });
        info!("Run {} is live.", self.run_id);
    }

    pub fn snapshot(&self, now: Instant) -> Snapshot {
        let hi_speed = self.profile.settings().hi_speed();
        let configured = self.profile.settings().note_count();
        match &self.phase {
            Phase::Active(run) => {
                let total = run.sequence.len();
                Snapshot {
                    phase: PhaseKind::Active,
                    countdown: None,
                    cursor: run.cursor,
                    remaining: total - run.cursor,
                    note_count: total,
                    miss_count: run.miss_count,
                    elapsed_seconds: run.elapsed(now).as_secs_f64(),
                    penalty: run.penalty,
                    progress: if run.sequence.is_empty() { 0.0 } else { run.cursor as f32 / total as f32 },
                    hi_speed,
                }
            }
            phase => Snapshot {
                phase: self.phase(),
                countdown: match phase {
                    Phase::Starting(c) => Some(c.shown),
                    _ => None,
                },
                cursor: 0,
                remaining: configured,
                note_count: configured,
                miss_count: 0,
                elapsed_seconds: 0.0,
                penalty: Duration::ZERO,
                progress: 0.0,
                hi_speed,
            },
        }
    }

    /// Up to `n` notes starting at the cursor. Empty outside a live run.
    pub fn upcoming(&self, n: usize) -> &[NoteType] {
        match &self.phase {
            Phase::Active(run) => {
                let notes = run.sequence.notes();
                let end = (run.cursor + n).min(notes.len());
                &notes[run.cursor..end]
            }
            _ => &[],
        }
    }

    pub fn nudge_hi_speed(&mut self, steps: i32) -> f32 {
        self.profile.nudge_hi_speed(steps)
    }

    /// Refused (returns `None`) while a run is starting or active, since the
    /// sequence length is fixed for the run.
    pub fn set_note_count(&mut self, value: i64) -> Option<usize> {
        if self.is_live() {
            info!("Note count is locked while a run is live.");
            return None;
        }
        Some(self.profile.set_note_count(value))
    }

    pub fn set_volume(&mut self, value: f32) -> f32 {
        let volume = self.profile.set_volume(value);
        self.audio.set_volume(volume);
        volume
    }

    pub fn set_animation_duration(&mut self, value: f32) -> f32 {
        self.profile.set_animation_duration(value)
    }

    pub fn rebind(&mut self, slot: Slot, raw_key: &str) -> Result<&KeyBinding, RebindError> {
        self.profile.rebind(slot, raw_key)
    }

    pub fn reset_bindings(&mut self) {
        self.profile.reset_bindings();
    }

    pub fn reset_ranking(&mut self) {
        self.profile.reset_ranking();
    }

    #[cfg(test)]
    fn audio(&self) -> &A {
        &self.audio
    }

    #[cfg(test)]
    fn store(&self) -> &S {
        self.profile.store()
    }
}
