//! Inert playback stubs for tests that exercise registration and routing
//! rather than transport behavior.

use std::time::Duration;

use super::handle::{
    ErrorObserver, HandleFactory, PlaybackHandle, PlaybackResult, PositionObserver,
};
use super::track::TrackSource;

pub(crate) struct StubHandle {
    duration: Duration,
    position: Duration,
}

impl StubHandle {
    pub(crate) fn new(duration: Duration) -> Self {
        Self {
            duration,
            position: Duration::ZERO,
        }
    }
}

impl PlaybackHandle for StubHandle {
    fn prepare(&mut self) -> PlaybackResult<()> {
        Ok(())
    }

    fn play(&mut self) -> PlaybackResult<()> {
        Ok(())
    }

    fn pause(&mut self) {}

    fn seek(&mut self, position: Duration) -> PlaybackResult<()> {
        self.position = position;
        Ok(())
    }

    fn position(&self) -> Duration {
        self.position
    }

    fn duration(&self) -> Option<Duration> {
        Some(self.duration)
    }

    fn set_volume(&mut self, _volume: f32) {}

    fn set_position_observer(&mut self, _observer: Option<PositionObserver>) {}

    fn set_error_observer(&mut self, _observer: Option<ErrorObserver>) {}
}

pub(crate) struct StubFactory;

impl HandleFactory for StubFactory {
    fn create(
        &self,
        _source: &TrackSource,
        _media_kind: &str,
    ) -> PlaybackResult<Box<dyn PlaybackHandle>> {
        Ok(Box::new(StubHandle::new(Duration::from_secs(10))))
    }
}
