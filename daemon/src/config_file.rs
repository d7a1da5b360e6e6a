//! Loads the engine's `Config` from a TOML file at daemon startup, falling
//! back to `Config::default()` when the file does not exist. A single
//! typed config is injected once at process start rather than reloaded at
//! runtime.

use anyhow::{Context, Result};
use uds_bootloader_engine::Config;

pub fn load_or_default(path: &str) -> Result<Config> {
    match std::fs::read_to_string(path) {
        Ok(text) => {
            let config: Config = toml::from_str(&text)
                .with_context(|| format!("failed to parse TOML config at {path}"))?;
            Ok(config)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(path, "no config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => Err(e).with_context(|| format!("failed to read config file {path}")),
    }
}
