use crate::config::{Config, WINDOW_TITLE};
use crate::core::audio::SfxPlayer;
use crate::core::input::{KeyBinding, KeyCapture, SPACE_KEY, Slot, key_label};
use crate::core::store::Store;
use crate::game::gameplay::{Clear, Engine, PhaseKind, Snapshot};
use crate::game::note::NoteType;
use log::{error, info, warn};
use std::{error::Error, sync::Arc, time::Instant};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{ElementState, KeyEvent, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{Key, NamedKey},
    window::Window,
};

const NOTE_COUNT_STEP: i64 = 10;
const VOLUME_STEP: f32 = 0.05;
const ANIMATION_STEP: f32 = 0.01;

pub type GameEngine = Engine<Box<dyn Store>, SfxPlayer>;

/// How many notes fit on the lane at a given hi-speed. Faster scroll spreads
/// notes further apart, so fewer are visible.
fn visible_notes(hi_speed: f32) -> usize {
    ((6.0 / hi_speed).ceil() as usize).clamp(1, 30)
}

fn progress_bar(progress: f32) -> String {
    const WIDTH: usize = 10;
    let filled = ((progress.clamp(0.0, 1.0) * WIDTH as f32).round() as usize).min(WIDTH);
    format!("[{}{}]", "#".repeat(filled), "-".repeat(WIDTH - filled))
}

fn keys_text(binding: &KeyBinding) -> String {
    format!(
        "don {} {} / ka {} {}",
        key_label(binding.get(Slot::DonLeft)),
        key_label(binding.get(Slot::DonRight)),
        key_label(binding.get(Slot::KaLeft)),
        key_label(binding.get(Slot::KaRight))
    )
}

fn lane_text(notes: &[NoteType]) -> String {
    notes.iter().map(|n| n.as_str()).collect::<Vec<_>>().join(" ")
}

fn clear_text(clear: &Clear) -> String {
    let r = &clear.result;
    let mut text = format!(
        "CLEAR {:.2}s | {:.2} notes/s | {:.1}% | score {}",
        r.elapsed_seconds,
        r.rate,
        r.accuracy * 100.0,
        r.score
    );
    match clear.rank {
        Some(0) => text.push_str(" | NEW RECORD"),
        Some(pos) => text.push_str(&format!(" | rank #{}", pos + 1)),
        None if !r.qualifies_for_ranking() => text.push_str(" | unranked"),
        None => {}
    }
    text
}

/// Readable name for a key that has no character, e.g. `Enter` or `F3`.
fn captured_label(key: &Key) -> String {
    match key {
        Key::Named(named) => format!("{:?}", named),
        Key::Character(s) => s.to_string(),
        _ => "unknown key".to_string(),
    }
}

/// The window title doubles as the whole display.
fn render_title(
    snap: &Snapshot,
    upcoming: &[NoteType],
    binding: &KeyBinding,
    last_clear: Option<&Clear>,
    best: Option<u64>,
    capture: Option<Slot>,
    notice: Option<&str>,
) -> String {
    let body = if let Some(slot) = capture {
        format!("press a key for {} (Esc cancels)", slot)
    } else {
        match snap.phase {
            PhaseKind::Idle => {
                let mut text = format!(
                    "Enter to start | {} notes | hi-speed {:.1} | {}",
                    snap.note_count,
                    snap.hi_speed,
                    keys_text(binding)
                );
                if let Some(best) = best {
                    text.push_str(&format!(" | best {}", best));
                }
                if let Some(clear) = last_clear {
                    text.push_str(" | ");
                    text.push_str(&clear_text(clear));
                }
                text
            }
            PhaseKind::Starting => format!("{}...", snap.countdown.unwrap_or(0)),
            PhaseKind::Active => format!(
                "{:.2}s | {} {}/{} | miss {} (+{:.1}s) | {} left | {}",
                snap.elapsed_seconds,
                progress_bar(snap.progress),
                snap.cursor,
                snap.note_count,
                snap.miss_count,
                snap.penalty.as_secs_f64(),
                snap.remaining,
                lane_text(upcoming)
            ),
        }
    };
    match notice {
        Some(n) => format!("{} | {} | {}", WINDOW_TITLE, body, n),
        None => format!("{} | {}", WINDOW_TITLE, body),
    }
}

pub struct App {
    window: Option<Arc<Window>>,
    engine: GameEngine,
    capture: KeyCapture,
    notice: Option<String>,
    last_title: String,
    window_width: u32,
    window_height: u32,
}

impl App {
    fn new(engine: GameEngine, config: &Config) -> Self {
        Self {
            window: None,
            engine,
            capture: KeyCapture::default(),
            notice: None,
            last_title: String::new(),
            window_width: config.window_width,
            window_height: config.window_height,
        }
    }

    fn refresh_title(&mut self, now: Instant) {
        let Some(window) = &self.window else { return };
        let snap = self.engine.snapshot(now);
        let title = render_title(
            &snap,
            self.engine.upcoming(visible_notes(snap.hi_speed)),
            self.engine.binding(),
            self.engine.last_clear(),
            self.engine.ranking().first().map(|e| e.score),
            self.capture.waiting_for(),
            self.notice.as_deref(),
        );
        if title != self.last_title {
            window.set_title(&title);
            self.last_title = title;
        }
    }

    fn finish_capture(&mut self, key: &Key) {
        if let Key::Named(NamedKey::Escape) = key {
            if let Some(slot) = self.capture.cancel() {
                self.notice = Some(format!("{} unchanged", slot));
            }
            return;
        }
        let raw = match key {
            Key::Character(s) => s.to_string(),
            Key::Named(NamedKey::Space) => SPACE_KEY.to_string(),
            other => captured_label(other),
        };
        let Some((slot, raw)) = self.capture.offer(&raw) else { return };
        self.notice = Some(match self.engine.rebind(slot, &raw) {
            Ok(binding) => format!("{} = {}", slot, key_label(binding.get(slot))),
            Err(e) => e.to_string(),
        });
    }

    fn handle_key_press(&mut self, event: &KeyEvent, now: Instant) {
        if self.capture.is_waiting() {
            if !event.repeat {
                self.finish_capture(&event.logical_key);
            }
            return;
        }

        match &event.logical_key {
            Key::Named(NamedKey::Enter) if !event.repeat => {
                self.notice = None;
                self.engine.request_start(now);
            }
            Key::Named(NamedKey::Escape) => {
                self.engine.interrupt(true);
            }
            Key::Named(NamedKey::ArrowUp) => {
                let v = self.engine.nudge_hi_speed(1);
                self.notice = Some(format!("hi-speed {:.1}", v));
            }
            Key::Named(NamedKey::ArrowDown) => {
                let v = self.engine.nudge_hi_speed(-1);
                self.notice = Some(format!("hi-speed {:.1}", v));
            }
            Key::Named(NamedKey::PageUp) => self.step_note_count(NOTE_COUNT_STEP),
            Key::Named(NamedKey::PageDown) => self.step_note_count(-NOTE_COUNT_STEP),
            Key::Named(NamedKey::F6) => self.step_volume(-VOLUME_STEP),
            Key::Named(NamedKey::F7) => self.step_volume(VOLUME_STEP),
            Key::Named(NamedKey::F9) => self.step_animation(-ANIMATION_STEP),
            Key::Named(NamedKey::F10) => self.step_animation(ANIMATION_STEP),
            Key::Named(named @ (NamedKey::F1 | NamedKey::F2 | NamedKey::F3 | NamedKey::F4)) => {
                let slot = match named {
                    NamedKey::F1 => Slot::DonLeft,
                    NamedKey::F2 => Slot::DonRight,
                    NamedKey::F3 => Slot::KaLeft,
                    _ => Slot::KaRight,
                };
                self.capture.await_next_key(slot);
                self.notice = None;
            }
            Key::Named(NamedKey::F5) => {
                self.engine.reset_bindings();
                self.notice = Some("keys reset".to_string());
            }
            Key::Named(NamedKey::F8) => {
                self.engine.reset_ranking();
                self.notice = Some("ranking cleared".to_string());
            }
            Key::Named(NamedKey::Space) if !event.repeat => {
                self.engine.on_input(SPACE_KEY, now);
            }
            Key::Character(s) if !event.repeat => {
                self.engine.on_input(s, now);
            }
            _ => {}
        }
    }

    fn step_note_count(&mut self, delta: i64) {
        let current = self.engine.settings().note_count() as i64;
        self.notice = Some(match self.engine.set_note_count(current + delta) {
            Some(count) => format!("{} notes", count),
            None => "note count is locked during a run".to_string(),
        });
    }

    fn step_volume(&mut self, delta: f32) {
        let v = self.engine.set_volume(self.engine.settings().volume() + delta);
        self.notice = Some(format!("volume {:.0}%", v * 100.0));
    }

    fn step_animation(&mut self, delta: f32) {
        let current = self.engine.settings().animation_duration();
        let v = self.engine.set_animation_duration(current + delta);
        self.notice = Some(format!("animation {:.2}s", v));
    }

    fn init_window(&mut self, event_loop: &ActiveEventLoop) -> Result<(), Box<dyn Error>> {
        let window_attributes = Window::default_attributes()
            .with_title(WINDOW_TITLE)
            .with_resizable(true)
            .with_inner_size(PhysicalSize::new(self.window_width, self.window_height));
        let window = Arc::new(event_loop.create_window(window_attributes)?);
        self.window = Some(window);
        info!("Starting event loop...");
        Ok(())
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            if let Err(e) = self.init_window(event_loop) {
                error!("Failed to create window: {}", e);
                event_loop.exit();
                return;
            }
            self.refresh_title(Instant::now());
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        let Some(window) = self.window.as_ref() else { return };
        if window_id != window.id() {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested. Shutting down.");
                event_loop.exit();
            }
            WindowEvent::KeyboardInput { event: key_event, .. } => {
                if key_event.state == ElementState::Pressed {
                    let now = Instant::now();
                    self.handle_key_press(&key_event, now);
                    self.refresh_title(now);
                }
            }
            WindowEvent::Focused(false) if self.capture.is_waiting() => {
                warn!("Focus lost while waiting for a key; capture cancelled.");
                self.capture.cancel();
                self.refresh_title(Instant::now());
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let now = Instant::now();
        if self.engine.update(now) {
            self.refresh_title(now);
        }
        match self.engine.next_wakeup() {
            Some(wakeup) => event_loop.set_control_flow(ControlFlow::WaitUntil(wakeup.due)),
            None => event_loop.set_control_flow(ControlFlow::Wait),
        }
    }
}

pub fn run(engine: GameEngine, config: &Config) -> Result<(), Box<dyn Error>> {
    let event_loop = EventLoop::new()?;
    let mut app = App::new(engine, config);
    event_loop.run_app(&mut app)?;
    Ok(())
}
