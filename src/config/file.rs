//! TOML configuration file loading
//!
//! Supports `~/.config/voice-turn/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::PathBuf;

use serde::Deserialize;

use crate::Result;
use crate::relay::RelayMode;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct VoiceTurnConfigFile {
    /// Client session settings
    #[serde(default)]
    pub client: ClientFileConfig,

    /// Speech detector tuning
    #[serde(default)]
    pub detector: DetectorFileConfig,

    /// Relay server settings
    #[serde(default)]
    pub server: ServerFileConfig,
}

#[derive(Debug, Default, Deserialize)]
pub struct ClientFileConfig {
    /// Relay endpoint (e.g. "ws://localhost:8000/call/v1/")
    pub url: Option<String>,

    /// Let speech interrupt playback
    pub barge_in: Option<bool>,

    /// Delay before reconnecting after the channel closes
    pub reconnect_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DetectorFileConfig {
    pub energy_threshold: Option<f32>,
    pub min_speech_ms: Option<u64>,
    pub silence_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    /// WebSocket route
    pub path: Option<String>,
    pub mode: Option<RelayMode>,
}

/// Parse config file contents
///
/// # Errors
///
/// Returns error if the content is not valid TOML for this schema
pub fn parse_config_file(content: &str) -> Result<VoiceTurnConfigFile> {
    Ok(toml::from_str(content)?)
}

/// Load the TOML config file from the standard path
///
/// Returns `VoiceTurnConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> VoiceTurnConfigFile {
    let Some(path) = config_file_path() else {
        return VoiceTurnConfigFile::default();
    };

    if !path.exists() {
        return VoiceTurnConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match parse_config_file(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                VoiceTurnConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            VoiceTurnConfigFile::default()
        }
    }
}

/// Return the config file path
///
/// `VOICE_TURN_CONFIG` if set, otherwise `~/.config/voice-turn/config.toml`.
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("VOICE_TURN_CONFIG") {
        return Some(PathBuf::from(path));
    }

    directories::BaseDirs::new().map(|d| d.config_dir().join("voice-turn").join("config.toml"))
}
