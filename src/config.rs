//! Runtime configuration for the demultiplexer core.
//!
//! The only tunable this core exposes is the minimum run length of
//! consecutive `0x47` sync bytes the [`crate::ts::sync`] state machine
//! requires to lock or resynchronize. Everything else about the demux is
//! instance state, not configuration (there is no persisted state, no other
//! environment variables, and no CLI at this layer).

use lazy_static::lazy_static;
use std::env;
use std::fs::File;
use std::io::Read;
use std::sync::RwLock;

lazy_static! {
    static ref CONFIG: RwLock<DemuxConfig> = RwLock::new(DemuxConfig::load());
}

/// Tunables for the demultiplexer core.
#[derive(Debug, Clone, Copy)]
pub struct DemuxConfig {
    /// Minimum number of consecutive sync bytes, spaced 188 bytes apart,
    /// required before `Sync`/`Scan` consider themselves locked.
    pub sync_run_len: usize,
}

impl Default for DemuxConfig {
    fn default() -> Self {
        DemuxConfig { sync_run_len: 5 }
    }
}

impl DemuxConfig {
    fn load() -> Self {
        let mut config = DemuxConfig::default();

        if let Ok(val) = env::var("MPEGTS_DEMUX_SYNC_RUN") {
            if let Ok(n) = val.parse() {
                config.sync_run_len = n;
            }
        }

        for path in ["./mpegts_demux.toml", "./demux_config.toml"] {
            if let Ok(mut file) = File::open(path) {
                let mut content = String::new();
                if file.read_to_string(&mut content).is_ok() {
                    if let Some(line) = content
                        .lines()
                        .find(|line| line.trim_start().starts_with("sync_run_len"))
                    {
                        if let Some(value) = line.split('=').nth(1) {
                            if let Ok(n) = value.trim().parse() {
                                config.sync_run_len = n;
                            }
                        }
                    }
                }
            }
        }

        config
    }

    /// Reloads configuration from the environment and config file.
    pub fn reload() {
        let new_config = DemuxConfig::load();
        if let Ok(mut config) = CONFIG.write() {
            *config = new_config;
        }
    }
}

/// Returns the currently configured sync run length.
pub fn sync_run_len() -> usize {
    CONFIG.read().unwrap().sync_run_len
}
