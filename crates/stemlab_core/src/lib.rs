//! StemLab Core - synchronized multi-track playback and sound-tools client.
//!
//! This crate contains all business logic with zero UI dependencies:
//! the multi-track synchronization engine, the asynchronous job protocol
//! against a sound-tools server, and the envelope utility feeding waveform
//! displays.
//!
//! # Wiring
//!
//! Construct the pieces once at startup and pass references to consumers;
//! there are no ambient singletons.
//!
//! ```no_run
//! use std::sync::Arc;
//! use stemlab_core::api::{JobListeners, JobRequest, JobSession, ToolsApi};
//! use stemlab_core::engine::{AudioOutput, SyncEngine, TrackLoader};
//!
//! # async fn wire() -> Result<(), Box<dyn std::error::Error>> {
//! let api = Arc::new(ToolsApi::new("https://127.0.0.1:8080")?);
//! let output = AudioOutput::open_default()?;
//! let factory = Arc::new(output.handle_factory(api.cookies()));
//! let loader = TrackLoader::new(SyncEngine::new(), api, factory);
//!
//! loader.register_available().await?;
//! loader.engine().play(|position| println!("at {:?}", position));
//!
//! let outcome = JobSession::new(&loader)
//!     .run(
//!         JobRequest::VocalRemove { track: "song.mp3".into() },
//!         JobListeners::new().on_finished(|| println!("done")),
//!     )
//!     .await?;
//! println!("added {:?}", outcome.added);
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod engine;
pub mod logging;
pub mod models;
pub mod sampling;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_returns_value() {
        assert!(!version().is_empty());
    }
}
