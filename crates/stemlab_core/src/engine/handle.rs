//! Playback handle abstraction.
//!
//! The engine never talks to an audio backend directly; it drives tracks
//! through the [`PlaybackHandle`] trait and learns about asynchronous
//! failures through the error observer each handle exposes. A backend that
//! can no longer produce audio reports it once through that observer, which
//! is what drives track auto-removal in the registry.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use super::track::TrackSource;

/// Errors a playback backend can report.
#[derive(Error, Debug)]
pub enum PlaybackError {
    /// No usable audio output device/stream.
    #[error("Audio output unavailable: {0}")]
    OutputUnavailable(String),

    /// The source bytes could not be fetched or read.
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    /// The source bytes could not be decoded as audio.
    #[error("Failed to decode media: {0}")]
    DecodeFailed(String),

    /// The backend could not seek this source.
    #[error("Seek failed: {0}")]
    SeekFailed(String),
}

/// Result type for playback operations.
pub type PlaybackResult<T> = Result<T, PlaybackError>;

/// Observer invoked with the playhead position as a playing handle advances.
pub type PositionObserver = Arc<dyn Fn(Duration) + Send + Sync>;

/// Observer invoked once when a handle becomes unusable.
pub type ErrorObserver = Arc<dyn Fn() + Send + Sync>;

/// Exclusively owned handle to one playable resource.
///
/// Implementations must not invoke a registered observer synchronously from
/// inside any of these methods; observers may re-enter the registry, which
/// holds its state lock while calling in here.
pub trait PlaybackHandle: Send {
    /// Initialize the handle for a playback session, rewound to zero.
    ///
    /// Expensive (decoding, buffering). Callers guard idempotence via
    /// [`super::track::Track::prepare`]; implementations may assume at most
    /// one successful call per session.
    fn prepare(&mut self) -> PlaybackResult<()>;

    /// Start or resume playback, initializing lazily if `prepare` was never
    /// called.
    fn play(&mut self) -> PlaybackResult<()>;

    /// Pause playback. No-op when not playing.
    fn pause(&mut self);

    /// Move the playhead. Valid before preparation; the position is applied
    /// once the handle initializes.
    fn seek(&mut self, position: Duration) -> PlaybackResult<()>;

    /// Current playhead position.
    fn position(&self) -> Duration;

    /// Total duration, if the backend knows it yet.
    fn duration(&self) -> Option<Duration>;

    /// Set the output volume, where `1.0` is unity gain.
    fn set_volume(&mut self, volume: f32);

    /// Register (or clear) the observer notified as the playhead advances.
    fn set_position_observer(&mut self, observer: Option<PositionObserver>);

    /// Register (or clear) the observer notified when the handle becomes
    /// unusable. A handle that already failed must notify the new observer
    /// immediately (from its own context, not this call).
    fn set_error_observer(&mut self, observer: Option<ErrorObserver>);
}

/// Creates playback handles for newly registered sources.
pub trait HandleFactory: Send + Sync {
    /// Create a handle for `source`. The handle may begin loading in the
    /// background immediately.
    fn create(&self, source: &TrackSource, media_kind: &str)
        -> PlaybackResult<Box<dyn PlaybackHandle>>;
}
