use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use lewton::inside_ogg::OggStreamReader;
use log::{debug, error, info, warn};
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc::{channel, sync_channel, Receiver, Sender, SyncSender};
use std::sync::Arc;
use std::thread;
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SoundKey {
    Don,
    Ka,
    Miss,
    Clear,
    Countdown,
    Cancel,
}

impl SoundKey {
    pub const ALL: [SoundKey; 6] = [
        SoundKey::Don,
        SoundKey::Ka,
        SoundKey::Miss,
        SoundKey::Clear,
        SoundKey::Countdown,
        SoundKey::Cancel,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            SoundKey::Don => "don",
            SoundKey::Ka => "ka",
            SoundKey::Miss => "miss",
            SoundKey::Clear => "clear",
            SoundKey::Countdown => "countdown",
            SoundKey::Cancel => "cancel",
        }
    }
}

impl fmt::Display for SoundKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SoundKey {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SoundKey::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("'{}' is not a sound key", s))
    }
}

/// What the game needs from a sound backend. Calls never block.
pub trait Audio {
    /// Starts `key`, cutting off any instance of it that is still playing.
    fn play(&mut self, key: SoundKey);
    fn set_volume(&mut self, volume: f32);
}

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("no audio output device")]
    NoDevice,
    #[error("audio output config: {0}")]
    Config(#[from] cpal::DefaultStreamConfigError),
    #[error("could not build audio stream: {0}")]
    Stream(#[from] cpal::BuildStreamError),
    #[error("could not start audio stream: {0}")]
    Play(#[from] cpal::PlayStreamError),
    #[error("ogg decode failed: {0}")]
    Decode(#[from] lewton::VorbisError),
    #[error("sound file: {0}")]
    Io(#[from] std::io::Error),
    #[error("audio engine already initialized")]
    AlreadyInitialized,
    #[error("audio thread exited during startup")]
    ThreadGone,
}

enum AudioCommand {
    Play(SoundKey, Arc<Vec<i16>>),
}

static ENGINE: OnceCell<AudioEngine> = OnceCell::new();

struct AudioEngine {
    command_sender: Sender<AudioCommand>,
    sounds: HashMap<SoundKey, Arc<Vec<i16>>>,
    master_volume: Arc<AtomicU32>,
}

/// Handle the game holds; forwards to the global engine. Silent when the
/// engine never came up.
#[derive(Debug, Default, Clone, Copy)]
pub struct SfxPlayer;

impl Audio for SfxPlayer {
    fn play(&mut self, key: SoundKey) {
        play_sfx(key);
    }

    fn set_volume(&mut self, volume: f32) {
        set_master_volume(volume);
    }
}

/// Opens the default output device and loads every sound in `sounds`.
/// A sound that fails to load is skipped with a warning.
pub fn init(sounds: &HashMap<SoundKey, PathBuf>, volume: f32) -> Result<(), AudioError> {
    if ENGINE.get().is_some() {
        return Err(AudioError::AlreadyInitialized);
    }

    let master_volume = Arc::new(AtomicU32::new(volume.clamp(0.0, 1.0).to_bits()));
    let (command_sender, command_receiver) = channel();
    let (ready_tx, ready_rx) = sync_channel(1);
    let volume_for_thread = master_volume.clone();

    thread::spawn(move || {
        audio_manager_thread(command_receiver, volume_for_thread, ready_tx);
    });
    let (out_hz, out_ch) = ready_rx.recv().map_err(|_| AudioError::ThreadGone)??;

    let mut loaded = HashMap::new();
    for (key, path) in sounds {
        match load_sfx(path, out_hz, out_ch) {
            Ok(data) => {
                debug!("Loaded sound '{}' from {}", key, path.display());
                loaded.insert(*key, Arc::new(data));
            }
            Err(e) => warn!("Failed to load sound '{}' ({}): {}", key, path.display(), e),
        }
    }

    info!(
        "Audio engine initialized ({} Hz, {} ch, {} sounds).",
        out_hz,
        out_ch,
        loaded.len()
    );
    ENGINE
        .set(AudioEngine { command_sender, sounds: loaded, master_volume })
        .map_err(|_| AudioError::AlreadyInitialized)
}

pub fn play_sfx(key: SoundKey) {
    let Some(engine) = ENGINE.get() else { return };
    if let Some(data) = engine.sounds.get(&key) {
        let _ = engine.command_sender.send(AudioCommand::Play(key, data.clone()));
    }
}

pub fn set_master_volume(volume: f32) {
    if let Some(engine) = ENGINE.get() {
        engine
            .master_volume
            .store(volume.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }
}

struct Voice {
    key: SoundKey,
    data: Arc<Vec<i16>>,
    cursor: usize,
}

/// Owns the cpal stream; the stream stays alive as long as this thread runs.
/// Reports the device rate and channel count once the stream is playing.
fn audio_manager_thread(
    command_receiver: Receiver<AudioCommand>,
    master_volume: Arc<AtomicU32>,
    ready: SyncSender<Result<(u32, usize), AudioError>>,
) {
    let (voice_sender, voice_receiver) = channel::<Voice>();
    let stream = match open_stream(voice_receiver, master_volume) {
        Ok((stream, format)) => {
            let _ = ready.send(Ok(format));
            stream
        }
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    while let Ok(AudioCommand::Play(key, data)) = command_receiver.recv() {
        let _ = voice_sender.send(Voice { key, data, cursor: 0 });
    }
    drop(stream);
}

fn open_stream(
    voice_receiver: Receiver<Voice>,
    master_volume: Arc<AtomicU32>,
) -> Result<(Stream, (u32, usize)), AudioError> {
    let host = cpal::default_host();
    let device = host.default_output_device().ok_or(AudioError::NoDevice)?;
    let stream_config: StreamConfig = device.default_output_config()?.into();
    let format = (stream_config.sample_rate.0, stream_config.channels as usize);

    let mut voices: Vec<Voice> = Vec::new();
    let stream = device.build_output_stream(
        &stream_config,
        move |data: &mut [f32], _| {
            for voice in voice_receiver.try_iter() {
                admit_voice(&mut voices, voice);
            }
            let gain = f32::from_bits(master_volume.load(Ordering::Relaxed));
            mix_voices(data, &mut voices, gain);
        },
        |err| error!("Audio stream error: {}", err),
        None,
    )?;
    stream.play()?;
    Ok((stream, format))
}

fn admit_voice(voices: &mut Vec<Voice>, voice: Voice) {
    voices.retain(|v| v.key != voice.key);
    voices.push(voice);
}

fn mix_voices(out: &mut [f32], voices: &mut Vec<Voice>, gain: f32) {
    out.iter_mut().for_each(|s| *s = 0.0);
    voices.retain_mut(|voice| {
        let n = (voice.data.len() - voice.cursor).min(out.len());
        for (o, s) in out.iter_mut().zip(&voice.data[voice.cursor..voice.cursor + n]) {
            *o += f32::from(*s) / 32768.0;
        }
        voice.cursor += n;
        voice.cursor < voice.data.len()
    });
    out.iter_mut().for_each(|s| *s = (*s * gain).clamp(-1.0, 1.0));
}

fn load_sfx(path: &Path, out_hz: u32, out_ch: usize) -> Result<Vec<i16>, AudioError> {
    let file = File::open(path)?;
    let mut ogg = OggStreamReader::new(BufReader::new(file))?;
    let in_ch = ogg.ident_hdr.audio_channels as usize;
    let in_hz = ogg.ident_hdr.audio_sample_rate;

    let mut pcm = Vec::new();
    while let Some(pkt) = ogg.read_dec_packet_itl()? {
        pcm.extend_from_slice(&pkt);
    }
    Ok(resample_linear(&pcm, in_hz, in_ch, out_hz, out_ch))
}

/// Converts interleaved PCM to the device layout. Output channel `c` takes
/// input channel `c % in_ch`; rates are bridged by linear interpolation.
fn resample_linear(input: &[i16], in_hz: u32, in_ch: usize, out_hz: u32, out_ch: usize) -> Vec<i16> {
    if in_ch == 0 || out_ch == 0 || in_hz == 0 || out_hz == 0 {
        return Vec::new();
    }
    let in_frames = input.len() / in_ch;
    if in_frames == 0 {
        return Vec::new();
    }
    let out_frames = (in_frames as u64 * u64::from(out_hz)).div_ceil(u64::from(in_hz)) as usize;
    let step = f64::from(in_hz) / f64::from(out_hz);

    let mut out = Vec::with_capacity(out_frames * out_ch);
    for frame in 0..out_frames {
        let pos = frame as f64 * step;
        let i = (pos.floor() as usize).min(in_frames - 1);
        let j = (i + 1).min(in_frames - 1);
        let t = (pos - i as f64) as f32;
        for c in 0..out_ch {
            let src = c % in_ch;
            let a = f32::from(input[i * in_ch + src]);
            let b = f32::from(input[j * in_ch + src]);
            out.push((a + (b - a) * t).round() as i16);
        }
    }
    out
}
