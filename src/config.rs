use crate::core::audio::SoundKey;
use configparser::ini::Ini;
use log::{LevelFilter, info, warn};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const CONFIG_PATH: &str = "sprintaiko.ini";
pub const WINDOW_TITLE: &str = "sprintaiko";

const OPTIONS: &str = "Options";
const SOUNDS: &str = "Sounds";

const DEFAULT_SAVE_PATH: &str = "save/sprintaiko.json";
const DEFAULT_SOUND_DIR: &str = "assets/sounds";
const DEFAULT_WINDOW_WIDTH: u32 = 960;
const DEFAULT_WINDOW_HEIGHT: u32 = 240;

/// Launch-time options. Gameplay settings live in the save file instead.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub log_level: LevelFilter,
    /// Off keeps settings and scores in memory for this session only.
    pub save_progress: bool,
    pub save_path: PathBuf,
    pub sound_dir: PathBuf,
    pub window_width: u32,
    pub window_height: u32,
    /// Sounds the player swapped out. Anything missing uses the stock file.
    pub custom_sounds: HashMap<SoundKey, PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: LevelFilter::Info,
            save_progress: true,
            save_path: PathBuf::from(DEFAULT_SAVE_PATH),
            sound_dir: PathBuf::from(DEFAULT_SOUND_DIR),
            window_width: DEFAULT_WINDOW_WIDTH,
            window_height: DEFAULT_WINDOW_HEIGHT,
            custom_sounds: HashMap::new(),
        }
    }
}

impl Config {
    /// File to load for every sound key.
    pub fn sound_paths(&self) -> HashMap<SoundKey, PathBuf> {
        SoundKey::ALL
            .into_iter()
            .map(|key| {
                let path = self
                    .custom_sounds
                    .get(&key)
                    .cloned()
                    .unwrap_or_else(|| self.sound_dir.join(format!("{}.ogg", key.as_str())));
                (key, path)
            })
            .collect()
    }
}

static CONFIG: Lazy<Mutex<Config>> = Lazy::new(|| Mutex::new(Config::default()));

fn create_default_file(path: &Path) -> Result<(), std::io::Error> {
    info!("Config file not found, creating '{}' with defaults.", path.display());
    let defaults = Config::default();
    let mut conf = Ini::new();
    conf.set(OPTIONS, "LogLevel", Some(defaults.log_level.to_string()));
    conf.set(OPTIONS, "SaveProgress", Some("1".to_string()));
    conf.set(OPTIONS, "SavePath", Some(DEFAULT_SAVE_PATH.to_string()));
    conf.set(OPTIONS, "SoundDir", Some(DEFAULT_SOUND_DIR.to_string()));
    conf.set(OPTIONS, "WindowWidth", Some(defaults.window_width.to_string()));
    conf.set(OPTIONS, "WindowHeight", Some(defaults.window_height.to_string()));
    for key in SoundKey::ALL {
        conf.set(SOUNDS, key.as_str(), Some(String::new()));
    }
    conf.write(path)
}

fn parse_dimension(conf: &Ini, key: &str, default: u32) -> u32 {
    match conf.get(OPTIONS, key) {
        Some(raw) => match raw.trim().parse::<u32>() {
            Ok(v) if v > 0 => v,
            _ => {
                warn!("Invalid {} '{}', using {}.", key, raw, default);
                default
            }
        },
        None => default,
    }
}

/// Reads the config at `path`, writing a default one first if it is missing.
/// Unreadable values fall back to their defaults.
pub fn load_from(path: &Path) -> Config {
    if !path.exists() {
        if let Err(e) = create_default_file(path) {
            warn!("Failed to create default config file: {}", e);
            return Config::default();
        }
    }

    let mut config = Config::default();
    let mut conf = Ini::new();
    if let Err(e) = conf.load(path) {
        warn!("Failed to load '{}' ({}), using defaults.", path.display(), e);
        return config;
    }

    if let Some(raw) = conf.get(OPTIONS, "LogLevel") {
        match raw.trim().parse::<LevelFilter>() {
            Ok(level) => config.log_level = level,
            Err(_) => warn!("Invalid LogLevel '{}', using Info.", raw),
        }
    }
    if let Some(raw) = conf.get(OPTIONS, "SaveProgress") {
        match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => config.save_progress = true,
            "0" | "false" | "no" | "off" => config.save_progress = false,
            _ => warn!("Invalid SaveProgress '{}', saving stays on.", raw),
        }
    }
    if let Some(raw) = conf.get(OPTIONS, "SavePath").filter(|s| !s.trim().is_empty()) {
        config.save_path = PathBuf::from(raw.trim());
    }
    if let Some(raw) = conf.get(OPTIONS, "SoundDir").filter(|s| !s.trim().is_empty()) {
        config.sound_dir = PathBuf::from(raw.trim());
    }
    config.window_width = parse_dimension(&conf, "WindowWidth", DEFAULT_WINDOW_WIDTH);
    config.window_height = parse_dimension(&conf, "WindowHeight", DEFAULT_WINDOW_HEIGHT);

    for key in SoundKey::ALL {
        if let Some(raw) = conf.get(SOUNDS, key.as_str()).filter(|s| !s.trim().is_empty()) {
            info!("Using custom {} sound '{}'.", key, raw.trim());
            config.custom_sounds.insert(key, PathBuf::from(raw.trim()));
        }
    }

    info!("Config loaded from '{}'.", path.display());
    config
}

pub fn load() {
    let config = load_from(Path::new(CONFIG_PATH));
    *CONFIG.lock().unwrap_or_else(|e| e.into_inner()) = config;
}

pub fn get() -> Config {
    CONFIG.lock().unwrap_or_else(|e| e.into_inner()).clone()
}
