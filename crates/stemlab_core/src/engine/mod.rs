//! Multi-track synchronization engine.
//!
//! This module owns the set of loaded tracks and keeps every enabled track
//! aligned to the reference track (the longest enabled one) across
//! enable/disable/play/pause transitions.
//!
//! # Architecture
//!
//! ```text
//! TrackLoader ──register──▶ SyncEngine ──drives──▶ PlaybackHandle (trait)
//!      │                        │                        ▲
//!      │ probes kind,           │ emits EngineEvent      │ rodio backend
//!      ▼ derives names          ▼ to subscribers         │
//!   ToolsApi               UI / observers          AudioOutput
//! ```
//!
//! The engine is purely synchronous state; all I/O (probing, fetching,
//! decoding) lives in the loader and the playback backend.

mod handle;
mod loader;
mod playback;
mod registry;
#[cfg(test)]
pub(crate) mod testing;
mod track;

pub use handle::{
    ErrorObserver, HandleFactory, PlaybackError, PlaybackHandle, PlaybackResult, PositionObserver,
};
pub use loader::{LoaderError, LoaderResult, TrackLoader};
pub use playback::{AudioOutput, RodioHandle, RodioHandleFactory};
pub use registry::{
    EngineError, EngineEvent, EngineResult, RemovalReason, SubscriberId, SyncEngine, TrackInfo,
};
pub use track::{format_timestamp, shorten_middle, Track, TrackId, TrackSource};
