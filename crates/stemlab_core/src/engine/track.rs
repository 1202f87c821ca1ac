//! A single loaded audio source with its playback handle and identity.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use super::handle::{PlaybackHandle, PlaybackResult};

/// Unique track identifier, stable for the lifetime of the track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackId(pub u64);

impl std::fmt::Display for TrackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "track#{}", self.0)
    }
}

/// Where a track's bytes live.
#[derive(Debug, Clone)]
pub enum TrackSource {
    /// Served by the sound-tools origin (or any other HTTP source).
    Remote(Url),
    /// A file on the local machine.
    Local(PathBuf),
}

impl std::fmt::Display for TrackSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackSource::Remote(url) => write!(f, "{}", url),
            TrackSource::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

/// One loaded audio source.
///
/// The track is the sole owner of its playback handle; dropping the track
/// releases the underlying resource.
pub struct Track {
    id: TrackId,
    name: String,
    media_kind: String,
    source: TrackSource,
    handle: Box<dyn PlaybackHandle>,
    prepared: bool,
    volume: f32,
}

impl Track {
    pub(crate) fn new(
        id: TrackId,
        name: String,
        media_kind: String,
        source: TrackSource,
        handle: Box<dyn PlaybackHandle>,
    ) -> Self {
        Self {
            id,
            name,
            media_kind,
            source,
            handle,
            prepared: false,
            volume: 1.0,
        }
    }

    pub fn id(&self) -> TrackId {
        self.id
    }

    /// Display/reference name, unique within the registry.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    /// Content-type of the underlying source.
    pub fn media_kind(&self) -> &str {
        &self.media_kind
    }

    pub fn source(&self) -> &TrackSource {
        &self.source
    }

    /// Initialize the handle for playback, rewound to zero. Repeated calls
    /// are no-ops.
    pub fn prepare(&mut self) -> PlaybackResult<()> {
        if self.prepared {
            return Ok(());
        }
        self.handle.prepare()?;
        self.prepared = true;
        Ok(())
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared
    }

    pub(crate) fn handle(&self) -> &dyn PlaybackHandle {
        self.handle.as_ref()
    }

    pub(crate) fn handle_mut(&mut self) -> &mut dyn PlaybackHandle {
        self.handle.as_mut()
    }

    /// Total duration, zero while the backend does not know it yet.
    pub fn duration(&self) -> Duration {
        self.handle.duration().unwrap_or(Duration::ZERO)
    }

    /// Current playhead position.
    pub fn position(&self) -> Duration {
        self.handle.position()
    }

    /// Playhead progress in `[0, 1]`; zero while the duration is unknown.
    pub fn progress(&self) -> f64 {
        let duration = self.duration();
        if duration.is_zero() {
            return 0.0;
        }
        (self.position().as_secs_f64() / duration.as_secs_f64()).clamp(0.0, 1.0)
    }

    /// Set playback volume, clamped to `[0, 1]`.
    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
        self.handle.set_volume(self.volume);
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Name shortened with a middle ellipsis for narrow displays.
    pub fn shortened_name(&self, max_len: usize) -> String {
        shorten_middle(&self.name, max_len)
    }

    /// Current position as an `h:mm:ss.ss` label.
    pub fn position_label(&self) -> String {
        format_timestamp(self.position())
    }
}

impl std::fmt::Debug for Track {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Track")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("media_kind", &self.media_kind)
            .field("prepared", &self.prepared)
            .finish()
    }
}

/// Shorten `name` to at most roughly `max_len` characters, keeping both ends.
pub fn shorten_middle(name: &str, max_len: usize) -> String {
    let chars: Vec<char> = name.chars().collect();
    if chars.len() <= max_len {
        return name.to_string();
    }
    let half = max_len / 2;
    let head: String = chars[..half].iter().collect();
    let tail: String = chars[chars.len() - half..].iter().collect();
    format!("{}...{}", head, tail)
}

/// Format a position as `h:mm:ss.ss`.
pub fn format_timestamp(position: Duration) -> String {
    let total = position.as_secs_f64();
    let hours = (total / 3600.0).floor() as u64;
    let minutes = ((total / 60.0).floor() as u64) % 60;
    let seconds = total % 60.0;
    format!("{}:{:02}:{:05.2}", hours, minutes, seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shorten_keeps_short_names() {
        assert_eq!(shorten_middle("song.mp3", 15), "song.mp3");
    }

    #[test]
    fn shorten_keeps_both_ends() {
        let shortened = shorten_middle("a_very_long_recording_name.wav", 15);
        assert_eq!(shortened, "a_very_...ame.wav");
        assert!(shortened.len() < "a_very_long_recording_name.wav".len());
    }

    #[test]
    fn timestamp_formats_hours_minutes_seconds() {
        assert_eq!(format_timestamp(Duration::ZERO), "0:00:00.00");
        assert_eq!(format_timestamp(Duration::from_secs_f64(61.5)), "0:01:01.50");
        assert_eq!(format_timestamp(Duration::from_secs(3723)), "1:02:03.00");
    }
}
