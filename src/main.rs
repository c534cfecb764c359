use crate::core::audio::{self, SfxPlayer};
use crate::core::store::{JsonFileStore, MemoryStore, Store};
use crate::game::gameplay::Engine;
use crate::game::profile::Profile;
use log::{LevelFilter, error, info};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::error::Error;

mod app;
mod config;
mod core;
mod game;

fn main() -> Result<(), Box<dyn Error>> {
    // Everything passes the logger itself; the config decides the level below.
    env_logger::Builder::from_default_env()
        .filter_level(LevelFilter::Trace)
        .init();
    log::set_max_level(LevelFilter::Info);

    info!("sprintaiko starting...");
    config::load();
    let config = config::get();
    log::set_max_level(config.log_level);

    let store: Box<dyn Store> = if config.save_progress {
        let store = JsonFileStore::open(&config.save_path);
        info!("Saving progress to '{}'.", store.path().display());
        Box::new(store)
    } else {
        info!("SaveProgress is off; nothing will be written.");
        Box::new(MemoryStore::new())
    };
    let profile = Profile::load(store);

    if let Err(e) = audio::init(&config.sound_paths(), profile.settings().volume()) {
        error!("Audio disabled: {}", e);
    }

    let engine = Engine::new(profile, SfxPlayer, StdRng::from_os_rng());
    if let Err(e) = app::run(engine, &config) {
        error!("Application exited with error: {}", e);
        return Err(e);
    }

    info!("Application exited gracefully.");
    Ok(())
}
