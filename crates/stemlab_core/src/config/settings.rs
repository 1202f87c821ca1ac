//! Settings struct with TOML-based sections.
//!
//! Settings are organized into logical sections that map to TOML tables.
//! Every field has a serde default, so partial files load cleanly.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::logging::LogLevel;
use crate::sampling::DEFAULT_OUTPUT_SAMPLES;

/// Root settings structure containing all configuration sections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Sound-tools server settings.
    #[serde(default)]
    pub server: ServerSettings,

    /// Job session settings.
    #[serde(default)]
    pub jobs: JobSettings,

    /// Envelope extraction settings.
    #[serde(default)]
    pub sampling: SamplingSettings,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Which server to talk to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Origin all endpoints and result paths resolve against.
    #[serde(default = "default_origin")]
    pub origin: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            origin: default_origin(),
        }
    }
}

fn default_origin() -> String {
    "https://127.0.0.1:8080".to_string()
}

/// Timeouts applied by job sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSettings {
    /// Seconds allowed for the event channel to open.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Seconds allowed between job events before the session gives up.
    #[serde(default = "default_event_timeout_secs")]
    pub event_timeout_secs: u64,
}

impl JobSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn event_timeout(&self) -> Duration {
        Duration::from_secs(self.event_timeout_secs)
    }
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            event_timeout_secs: default_event_timeout_secs(),
        }
    }
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_event_timeout_secs() -> u64 {
    120
}

/// Envelope extraction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingSettings {
    /// Number of points in a waveform envelope.
    #[serde(default = "default_output_samples")]
    pub output_samples: usize,
}

impl Default for SamplingSettings {
    fn default() -> Self {
        Self {
            output_samples: default_output_samples(),
        }
    }
}

fn default_output_samples() -> usize {
    DEFAULT_OUTPUT_SAMPLES
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Default level when RUST_LOG is not set.
    #[serde(default)]
    pub level: LogLevel,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_sections() {
        let settings: Settings = toml::from_str("").unwrap();
        assert_eq!(settings.server.origin, "https://127.0.0.1:8080");
        assert_eq!(settings.jobs.event_timeout_secs, 120);
        assert_eq!(settings.sampling.output_samples, DEFAULT_OUTPUT_SAMPLES);
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let settings: Settings = toml::from_str(
            r#"
            [jobs]
            event_timeout_secs = 30
            "#,
        )
        .unwrap();
        assert_eq!(settings.jobs.event_timeout_secs, 30);
        assert_eq!(settings.jobs.connect_timeout_secs, 10);
        assert_eq!(settings.jobs.event_timeout(), Duration::from_secs(30));
    }
}
