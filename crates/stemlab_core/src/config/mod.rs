//! Configuration management.
//!
//! This module provides:
//! - TOML-based configuration with logical sections
//! - Atomic file writes (write to temp, then rename)
//! - Serde defaults so partial files load cleanly
//!
//! # Example
//!
//! ```no_run
//! use stemlab_core::config::ConfigManager;
//!
//! let mut config = ConfigManager::new(".config/stemlab.toml");
//! config.load_or_create().unwrap();
//! println!("Server origin: {}", config.settings().server.origin);
//! ```

mod manager;
mod settings;

pub use manager::{ConfigError, ConfigManager, ConfigResult};
pub use settings::{JobSettings, LoggingSettings, SamplingSettings, ServerSettings, Settings};
