//! Configuration management for the voice turn client and relay
//!
//! Priority: environment variable → config file → built-in default. CLI flags
//! are applied on top by the binary.

pub mod file;

use std::time::Duration;

use crate::relay::RelayMode;
use crate::voice::DetectorConfig;
use crate::{Error, Result};

use self::file::VoiceTurnConfigFile;

const DEFAULT_URL: &str = "ws://localhost:8000/call/v1/";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_PATH: &str = "/call/v1/";

/// Full configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub client: ClientConfig,
    pub server: ServerConfig,
}

/// Client session configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Relay endpoint
    pub url: String,

    /// Let speech interrupt playback
    pub barge_in: bool,

    /// Reconnect after this delay when the channel closes; `None` ends the session
    pub reconnect: Option<Duration>,

    pub detector: DetectorConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            barge_in: true,
            reconnect: None,
            detector: DetectorConfig::default(),
        }
    }
}

/// Relay server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// WebSocket route
    pub path: String,
    pub mode: RelayMode,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            path: DEFAULT_PATH.to_string(),
            mode: RelayMode::default(),
        }
    }
}

impl ServerConfig {
    /// `host:port` for binding
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Config {
    /// Load configuration from the environment and the config file
    ///
    /// # Errors
    ///
    /// Returns error if the resulting configuration is invalid
    pub fn load() -> Result<Self> {
        let file = file::load_config_file();
        let config = Self::from_sources(&file, |key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Merge an env lookup over a parsed config file over defaults
    pub fn from_sources(file: &VoiceTurnConfigFile, env: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let detector_defaults = defaults.client.detector;

        let detector = DetectorConfig {
            energy_threshold: parse_env(&env, "VOICE_TURN_ENERGY_THRESHOLD")
                .or(file.detector.energy_threshold)
                .unwrap_or(detector_defaults.energy_threshold),
            min_speech: parse_env(&env, "VOICE_TURN_MIN_SPEECH_MS")
                .or(file.detector.min_speech_ms)
                .map_or(detector_defaults.min_speech, Duration::from_millis),
            trailing_silence: parse_env(&env, "VOICE_TURN_SILENCE_MS")
                .or(file.detector.silence_ms)
                .map_or(detector_defaults.trailing_silence, Duration::from_millis),
        };

        let client = ClientConfig {
            url: env("VOICE_TURN_URL")
                .or_else(|| file.client.url.clone())
                .unwrap_or(defaults.client.url),
            barge_in: parse_env(&env, "VOICE_TURN_BARGE_IN")
                .or(file.client.barge_in)
                .unwrap_or(defaults.client.barge_in),
            reconnect: file.client.reconnect_secs.map(Duration::from_secs),
            detector,
        };

        let server = ServerConfig {
            host: env("VOICE_TURN_HOST")
                .or_else(|| file.server.host.clone())
                .unwrap_or(defaults.server.host),
            port: parse_env(&env, "VOICE_TURN_PORT")
                .or(file.server.port)
                .unwrap_or(defaults.server.port),
            path: file.server.path.clone().unwrap_or(defaults.server.path),
            mode: parse_env(&env, "VOICE_TURN_RELAY_MODE")
                .or(file.server.mode)
                .unwrap_or(defaults.server.mode),
        };

        Self { client, server }
    }

    /// Check values that would otherwise fail at connect or bind time
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first invalid field
    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.client.url)
            .map_err(|e| Error::Config(format!("invalid url {}: {e}", self.client.url)))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(Error::Config(format!(
                "url scheme must be ws or wss, got {}",
                url.scheme()
            )));
        }

        let detector = &self.client.detector;
        if !(detector.energy_threshold.is_finite() && detector.energy_threshold > 0.0) {
            return Err(Error::Config("energy threshold must be positive".to_string()));
        }
        if detector.min_speech.is_zero() || detector.trailing_silence.is_zero() {
            return Err(Error::Config(
                "speech and silence durations must be positive".to_string(),
            ));
        }

        if self.client.reconnect.is_some_and(|delay| delay.is_zero()) {
            return Err(Error::Config("reconnect delay must be positive".to_string()));
        }

        if self.server.port == 0 {
            return Err(Error::Config("server port must not be 0".to_string()));
        }
        if !self.server.path.starts_with('/') {
            return Err(Error::Config(format!(
                "server path must start with '/', got {}",
                self.server.path
            )));
        }

        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let value = env(key)?;
    match value.parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            tracing::warn!(key, value = %value, "ignoring unparseable environment value");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::config::file::parse_config_file;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let config = Config::from_sources(&VoiceTurnConfigFile::default(), env_of(&[]));
        config.validate().unwrap();

        assert_eq!(config.client.url, "ws://localhost:8000/call/v1/");
        assert!(config.client.barge_in);
        assert_eq!(config.server.bind_addr(), "0.0.0.0:8000");
        assert_eq!(config.server.path, "/call/v1/");
        assert_eq!(config.server.mode, RelayMode::Echo);
        assert_eq!(config.client.detector.min_speech, Duration::from_millis(300));
    }

    #[test]
    fn file_overrides_defaults() {
        let file = parse_config_file("[server]\nport = 9100\nmode = \"ack\"").unwrap();
        let config = Config::from_sources(&file, env_of(&[]));

        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.mode, RelayMode::Ack);
    }

    #[test]
    fn env_overrides_file() {
        let file = parse_config_file(
            "[client]\nurl = \"ws://file/\"\nbarge_in = true\n[detector]\nsilence_ms = 900",
        )
        .unwrap();
        let config = Config::from_sources(
            &file,
            env_of(&[
                ("VOICE_TURN_URL", "wss://env/"),
                ("VOICE_TURN_BARGE_IN", "false"),
                ("VOICE_TURN_SILENCE_MS", "250"),
            ]),
        );

        assert_eq!(config.client.url, "wss://env/");
        assert!(!config.client.barge_in);
        assert_eq!(
            config.client.detector.trailing_silence,
            Duration::from_millis(250)
        );
    }

    #[test]
    fn unparseable_env_falls_back() {
        let config = Config::from_sources(
            &VoiceTurnConfigFile::default(),
            env_of(&[("VOICE_TURN_PORT", "not-a-port")]),
        );
        assert_eq!(config.server.port, 8000);
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config = Config::default();
        config.client.url = "http://localhost:8000/".to_string();
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = Config::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.client.detector.energy_threshold = 0.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.server.path = "call".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_reconnect_delay() {
        let file = parse_config_file("[client]\nreconnect_secs = 0").unwrap();
        let config = Config::from_sources(&file, env_of(&[]));
        assert_eq!(config.client.reconnect, Some(Duration::ZERO));
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = Config::default();
        config.client.reconnect = Some(Duration::from_secs(2));
        config.validate().unwrap();
    }
}
