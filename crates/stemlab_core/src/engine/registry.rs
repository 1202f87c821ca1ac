//! Track registry and synchronization engine.
//!
//! Owns the ordered set of loaded tracks, the enabled/disabled partition,
//! the reference track defining the shared playhead, and the global
//! transport state. All mutations run as one read-modify-write transition
//! under a single lock, so the invariants hold for every observable state:
//!
//! - the reference track is the longest-duration enabled track, or none
//!   when no track is enabled;
//! - a disabled track is never the reference;
//! - every enabled track is re-aligned to the reference position at each
//!   enable/disable/play transition.
//!
//! State changes are fanned out to registered subscribers after the lock is
//! released, so subscribers are free to call back into the engine.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;

use crate::models::TransportState;

use super::handle::{PlaybackHandle, PositionObserver};
use super::track::{Track, TrackId, TrackSource};

/// Errors from registry operations.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The referenced track is not in the registry.
    #[error("Unknown track: {0}")]
    UnknownTrack(TrackId),

    /// Another track already uses this display name.
    #[error("Track name already in use: '{0}'")]
    DuplicateName(String),
}

/// Result type for registry operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Why a track left the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RemovalReason {
    /// The playback handle reported an unrecoverable error.
    LoadFailure,
    /// A caller removed the track.
    Explicit,
}

/// Mutation notifications emitted to subscribers.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    TrackAdded {
        id: TrackId,
        name: String,
    },
    TrackRemoved {
        id: TrackId,
        name: String,
        reason: RemovalReason,
    },
    TrackRenamed {
        id: TrackId,
        old_name: String,
        new_name: String,
    },
    TrackEnabled {
        id: TrackId,
        name: String,
    },
    TrackDisabled {
        id: TrackId,
        name: String,
    },
    TransportChanged {
        state: TransportState,
    },
}

/// Handle returned by [`SyncEngine::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriberId(u64);

/// Read-only view of one track, for UIs and diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct TrackInfo {
    pub id: TrackId,
    pub name: String,
    pub media_kind: String,
    pub duration_secs: f64,
    pub position_secs: f64,
    pub enabled: bool,
    pub prepared: bool,
}

type Subscriber = Arc<dyn Fn(&EngineEvent) + Send + Sync>;

/// The multi-track synchronization engine.
///
/// Cheap to clone; clones share the same underlying registry.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    state: Mutex<EngineState>,
    subscribers: Mutex<Vec<(u64, Subscriber)>>,
    next_subscriber: AtomicU64,
    next_track: AtomicU64,
}

#[derive(Default)]
struct EngineState {
    tracks: Vec<Track>,
    disabled: HashSet<TrackId>,
    reference: Option<TrackId>,
    transport: TransportState,
    position_observer: Option<PositionObserver>,
}

impl EngineState {
    fn index_of(&self, id: TrackId) -> Option<usize> {
        self.tracks.iter().position(|t| t.id() == id)
    }

    fn track(&self, id: TrackId) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id() == id)
    }

    fn track_mut(&mut self, id: TrackId) -> Option<&mut Track> {
        self.tracks.iter_mut().find(|t| t.id() == id)
    }

    /// Shared playhead position: the reference track's position, or zero
    /// when no track is enabled.
    fn current_position(&self) -> Duration {
        self.reference
            .and_then(|id| self.track(id))
            .map(|t| t.position())
            .unwrap_or(Duration::ZERO)
    }

    /// Longest-duration enabled track; ties keep the earliest-registered.
    fn find_reference(&self) -> Option<TrackId> {
        let mut best: Option<(TrackId, Duration)> = None;
        for track in &self.tracks {
            if self.disabled.contains(&track.id()) {
                continue;
            }
            let duration = track.duration();
            match best {
                Some((_, longest)) if duration <= longest => {}
                _ => best = Some((track.id(), duration)),
            }
        }
        best.map(|(id, _)| id)
    }

    /// Recompute the reference and move the position observer onto it.
    fn update_reference(&mut self) {
        if let Some(old) = self.reference {
            if let Some(track) = self.track_mut(old) {
                track.handle_mut().set_position_observer(None);
            }
        }
        self.reference = self.find_reference();
        if let Some(observer) = self.position_observer.clone() {
            if let Some(id) = self.reference {
                if let Some(track) = self.track_mut(id) {
                    track.handle_mut().set_position_observer(Some(observer));
                }
            }
        }
    }

    /// Seek every enabled track to the current reference position.
    fn sync_enabled_to_reference(&mut self) {
        let position = self.current_position();
        let disabled = self.disabled.clone();
        for track in self.tracks.iter_mut() {
            if disabled.contains(&track.id()) {
                continue;
            }
            if let Err(e) = track.handle_mut().seek(position) {
                tracing::warn!("Failed to align '{}': {}", track.name(), e);
            }
        }
    }
}

impl SyncEngine {
    /// Create an empty engine.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(EngineInner {
                state: Mutex::new(EngineState::default()),
                subscribers: Mutex::new(Vec::new()),
                next_subscriber: AtomicU64::new(1),
                next_track: AtomicU64::new(1),
            }),
        }
    }

    /// Register a mutation subscriber. Events are delivered after the
    /// mutation commits, outside the state lock.
    pub fn subscribe(
        &self,
        subscriber: impl Fn(&EngineEvent) + Send + Sync + 'static,
    ) -> SubscriberId {
        let id = self.inner.next_subscriber.fetch_add(1, Ordering::Relaxed);
        self.inner
            .subscribers
            .lock()
            .push((id, Arc::new(subscriber)));
        SubscriberId(id)
    }

    /// Remove a subscriber. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut subscribers = self.inner.subscribers.lock();
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id.0);
        subscribers.len() != before
    }

    /// Add a track built around an existing playback handle.
    ///
    /// The display name must be unique. The engine arms the handle's error
    /// observer so a handle that later becomes unusable is removed
    /// automatically (observable through [`EngineEvent::TrackRemoved`]).
    pub fn insert(
        &self,
        name: impl Into<String>,
        media_kind: impl Into<String>,
        source: TrackSource,
        handle: Box<dyn PlaybackHandle>,
    ) -> EngineResult<TrackId> {
        let name = name.into();
        let id = TrackId(self.inner.next_track.fetch_add(1, Ordering::Relaxed));

        let mut state = self.inner.state.lock();
        if state.tracks.iter().any(|t| t.name() == name) {
            return Err(EngineError::DuplicateName(name));
        }
        let mut track = Track::new(id, name.clone(), media_kind.into(), source, handle);
        let weak = Arc::downgrade(&self.inner);
        track
            .handle_mut()
            .set_error_observer(Some(Arc::new(move || remove_for_failure(&weak, id))));
        state.tracks.push(track);
        state.update_reference();
        drop(state);

        tracing::info!("Registered track '{}' ({})", name, id);
        self.inner.emit(&[EngineEvent::TrackAdded { id, name }]);
        Ok(id)
    }

    /// Remove a track and release its handle.
    pub fn remove(&self, id: TrackId) -> EngineResult<()> {
        remove_track(&self.inner, id, RemovalReason::Explicit)
            .then_some(())
            .ok_or(EngineError::UnknownTrack(id))
    }

    /// Exclude a track from synchronized transport.
    ///
    /// No-op when already disabled. The reference is recomputed before the
    /// track is snapped and paused: disabling the current reference changes
    /// what "current position" means for everyone else.
    pub fn disable(&self, id: TrackId) -> EngineResult<()> {
        let mut state = self.inner.state.lock();
        let name = match state.track(id) {
            Some(track) => track.name().to_string(),
            None => return Err(EngineError::UnknownTrack(id)),
        };
        if state.disabled.contains(&id) {
            return Ok(());
        }

        state.disabled.insert(id);
        state.update_reference();
        let position = state.current_position();
        if let Some(track) = state.track_mut(id) {
            if let Err(e) = track.handle_mut().seek(position) {
                tracing::warn!("Failed to snap '{}' on disable: {}", name, e);
            }
            track.handle_mut().pause();
        }
        drop(state);

        self.inner.emit(&[EngineEvent::TrackDisabled { id, name }]);
        Ok(())
    }

    /// Bring a track back into synchronized transport.
    ///
    /// No-op when not disabled. The track is seeked to the shared playhead,
    /// the reference is recomputed, every enabled track is re-aligned, and
    /// if the transport is playing the track starts immediately so it
    /// rejoins in sync. While the transport is idle nothing starts playing.
    pub fn enable(&self, id: TrackId) -> EngineResult<()> {
        let mut state = self.inner.state.lock();
        let name = match state.track(id) {
            Some(track) => track.name().to_string(),
            None => return Err(EngineError::UnknownTrack(id)),
        };
        if !state.disabled.remove(&id) {
            return Ok(());
        }

        let position = state.current_position();
        if let Some(track) = state.track_mut(id) {
            if let Err(e) = track.handle_mut().seek(position) {
                tracing::warn!("Failed to seek '{}' on enable: {}", name, e);
            }
        }
        state.update_reference();
        state.sync_enabled_to_reference();

        let playing = state.transport == TransportState::Playing;
        let mut failed = false;
        if playing {
            if let Some(track) = state.track_mut(id) {
                if let Err(e) = track.handle_mut().play() {
                    tracing::warn!("Failed to start '{}' on enable: {}", name, e);
                    failed = true;
                }
            }
        }
        drop(state);

        self.inner.emit(&[EngineEvent::TrackEnabled { id, name }]);
        if failed {
            remove_track(&self.inner, id, RemovalReason::LoadFailure);
        }
        Ok(())
    }

    /// Whether a track is currently excluded from transport.
    pub fn is_disabled(&self, id: TrackId) -> bool {
        self.inner.state.lock().disabled.contains(&id)
    }

    /// Start synchronized playback of every enabled track.
    ///
    /// `on_position` is attached to whatever becomes the reference track and
    /// follows the reference as it changes. All enabled tracks are prepared
    /// before any play command is issued, keeping start skew small when one
    /// prepare is slow. A track that fails either pass is removed through
    /// the load-failure path.
    pub fn play(&self, on_position: impl Fn(Duration) + Send + Sync + 'static) {
        let mut state = self.inner.state.lock();
        state.position_observer = Some(Arc::new(on_position));
        state.update_reference();

        let disabled = state.disabled.clone();
        let mut failed: Vec<TrackId> = Vec::new();
        for track in state.tracks.iter_mut() {
            if disabled.contains(&track.id()) {
                continue;
            }
            if let Err(e) = track.prepare() {
                tracing::warn!("Failed to prepare '{}': {}", track.name(), e);
                failed.push(track.id());
            }
        }
        for track in state.tracks.iter_mut() {
            let id = track.id();
            if disabled.contains(&id) || failed.contains(&id) {
                continue;
            }
            if let Err(e) = track.handle_mut().play() {
                tracing::warn!("Failed to play '{}': {}", track.name(), e);
                failed.push(id);
            }
        }

        let changed = state.transport != TransportState::Playing;
        state.transport = TransportState::Playing;
        drop(state);

        if changed {
            self.inner.emit(&[EngineEvent::TransportChanged {
                state: TransportState::Playing,
            }]);
        }
        for id in failed {
            remove_track(&self.inner, id, RemovalReason::LoadFailure);
        }
    }

    /// Pause every enabled track. Disabled tracks are left untouched.
    pub fn stop(&self) {
        self.halt(false);
    }

    /// Pause every enabled track and rewind it to zero.
    pub fn reset(&self) {
        self.halt(true);
    }

    fn halt(&self, rewind: bool) {
        let mut state = self.inner.state.lock();
        let disabled = state.disabled.clone();
        for track in state.tracks.iter_mut() {
            if disabled.contains(&track.id()) {
                continue;
            }
            track.handle_mut().pause();
            if rewind {
                if let Err(e) = track.handle_mut().seek(Duration::ZERO) {
                    tracing::warn!("Failed to rewind '{}': {}", track.name(), e);
                }
            }
        }
        let changed = state.transport != TransportState::Idle;
        state.transport = TransportState::Idle;
        drop(state);

        if changed {
            self.inner.emit(&[EngineEvent::TransportChanged {
                state: TransportState::Idle,
            }]);
        }
    }

    /// Number of registered tracks.
    pub fn len(&self) -> usize {
        self.inner.state.lock().tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.state.lock().tracks.is_empty()
    }

    /// Shared playhead position (zero when no track is enabled).
    pub fn current_position(&self) -> Duration {
        self.inner.state.lock().current_position()
    }

    /// The track currently defining the shared playhead.
    pub fn reference_track(&self) -> Option<TrackId> {
        self.inner.state.lock().reference
    }

    pub fn transport(&self) -> TransportState {
        self.inner.state.lock().transport
    }

    /// Look a track up by display name.
    pub fn find_by_name(&self, name: &str) -> Option<TrackId> {
        self.inner
            .state
            .lock()
            .tracks
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.id())
    }

    pub fn track_name(&self, id: TrackId) -> Option<String> {
        self.inner
            .state
            .lock()
            .track(id)
            .map(|t| t.name().to_string())
    }

    /// Source location and media kind of a track.
    pub fn source_of(&self, id: TrackId) -> Option<(TrackSource, String)> {
        self.inner
            .state
            .lock()
            .track(id)
            .map(|t| (t.source().clone(), t.media_kind().to_string()))
    }

    /// Rename a track in place, keeping names unique.
    pub fn rename(&self, id: TrackId, new_name: impl Into<String>) -> EngineResult<()> {
        let new_name = new_name.into();
        let mut state = self.inner.state.lock();
        let old_name = match state.track(id) {
            Some(track) => track.name().to_string(),
            None => return Err(EngineError::UnknownTrack(id)),
        };
        if old_name == new_name {
            return Ok(());
        }
        if state
            .tracks
            .iter()
            .any(|t| t.id() != id && t.name() == new_name)
        {
            return Err(EngineError::DuplicateName(new_name));
        }
        if let Some(track) = state.track_mut(id) {
            track.set_name(new_name.clone());
        }
        drop(state);

        tracing::info!("Renamed track '{}' -> '{}'", old_name, new_name);
        self.inner.emit(&[EngineEvent::TrackRenamed {
            id,
            old_name,
            new_name,
        }]);
        Ok(())
    }

    /// Set a track's volume, clamped to `[0, 1]`.
    pub fn set_volume(&self, id: TrackId, volume: f32) -> EngineResult<()> {
        let mut state = self.inner.state.lock();
        let track = state
            .track_mut(id)
            .ok_or(EngineError::UnknownTrack(id))?;
        track.set_volume(volume);
        Ok(())
    }

    /// Read-only snapshot of every track, in registration order.
    pub fn snapshot(&self) -> Vec<TrackInfo> {
        let state = self.inner.state.lock();
        state
            .tracks
            .iter()
            .map(|t| TrackInfo {
                id: t.id(),
                name: t.name().to_string(),
                media_kind: t.media_kind().to_string(),
                duration_secs: t.duration().as_secs_f64(),
                position_secs: t.position().as_secs_f64(),
                enabled: !state.disabled.contains(&t.id()),
                prepared: t.is_prepared(),
            })
            .collect()
    }
}

impl Default for SyncEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineInner {
    /// Deliver events outside the state lock. The subscriber list is cloned
    /// first so a subscriber may (un)subscribe from inside its callback.
    fn emit(&self, events: &[EngineEvent]) {
        let subscribers: Vec<Subscriber> = self
            .subscribers
            .lock()
            .iter()
            .map(|(_, s)| s.clone())
            .collect();
        for event in events {
            tracing::debug!(?event, "engine event");
            for subscriber in &subscribers {
                subscriber(event);
            }
        }
    }
}

/// Entry point for handle error observers: silent auto-removal.
fn remove_for_failure(inner: &Weak<EngineInner>, id: TrackId) {
    if let Some(inner) = inner.upgrade() {
        remove_track(&inner, id, RemovalReason::LoadFailure);
    }
}

fn remove_track(inner: &Arc<EngineInner>, id: TrackId, reason: RemovalReason) -> bool {
    let mut state = inner.state.lock();
    let Some(index) = state.index_of(id) else {
        return false;
    };
    let track = state.tracks.remove(index);
    let name = track.name().to_string();
    drop(track); // releases the playback handle
    state.disabled.remove(&id);
    state.update_reference();
    drop(state);

    if reason == RemovalReason::LoadFailure {
        tracing::warn!("Track '{}' became unusable, removed", name);
    }
    inner.emit(&[EngineEvent::TrackRemoved { id, name, reason }]);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::handle::{ErrorObserver, PlaybackError, PlaybackResult};
    use std::sync::Mutex as StdMutex;

    #[derive(Debug, Clone, PartialEq)]
    enum Command {
        Prepare,
        Play,
        Pause,
        Seek(Duration),
    }

    /// Shared command log so tests can assert cross-track ordering.
    type Recorder = Arc<StdMutex<Vec<(String, Command)>>>;

    /// Test-side grip on a handle that has been boxed into the engine.
    #[derive(Clone)]
    struct TestHandle {
        label: String,
        recorder: Recorder,
        duration: Arc<StdMutex<Option<Duration>>>,
        position: Arc<StdMutex<Duration>>,
        error_observer: Arc<StdMutex<Option<ErrorObserver>>>,
        position_observer: Arc<StdMutex<Option<PositionObserver>>>,
        fail_prepare: Arc<StdMutex<bool>>,
    }

    impl TestHandle {
        fn new(label: &str, duration_secs: u64, recorder: Recorder) -> Self {
            Self {
                label: label.to_string(),
                recorder,
                duration: Arc::new(StdMutex::new(Some(Duration::from_secs(duration_secs)))),
                position: Arc::new(StdMutex::new(Duration::ZERO)),
                error_observer: Arc::new(StdMutex::new(None)),
                position_observer: Arc::new(StdMutex::new(None)),
                fail_prepare: Arc::new(StdMutex::new(false)),
            }
        }

        fn boxed(&self) -> Box<dyn PlaybackHandle> {
            Box::new(FakeHandle(self.clone()))
        }

        fn set_position(&self, position: Duration) {
            *self.position.lock().unwrap() = position;
        }

        fn commands(&self) -> Vec<Command> {
            self.recorder
                .lock()
                .unwrap()
                .iter()
                .filter(|(label, _)| *label == self.label)
                .map(|(_, c)| c.clone())
                .collect()
        }

        fn fire_error(&self) {
            let observer = self.error_observer.lock().unwrap().clone();
            observer.expect("error observer armed")();
        }

        fn has_position_observer(&self) -> bool {
            self.position_observer.lock().unwrap().is_some()
        }
    }

    struct FakeHandle(TestHandle);

    impl FakeHandle {
        fn record(&self, command: Command) {
            self.0
                .recorder
                .lock()
                .unwrap()
                .push((self.0.label.clone(), command));
        }
    }

    impl PlaybackHandle for FakeHandle {
        fn prepare(&mut self) -> PlaybackResult<()> {
            if *self.0.fail_prepare.lock().unwrap() {
                return Err(PlaybackError::DecodeFailed("bad data".into()));
            }
            self.record(Command::Prepare);
            Ok(())
        }

        fn play(&mut self) -> PlaybackResult<()> {
            self.record(Command::Play);
            Ok(())
        }

        fn pause(&mut self) {
            self.record(Command::Pause);
        }

        fn seek(&mut self, position: Duration) -> PlaybackResult<()> {
            self.record(Command::Seek(position));
            *self.0.position.lock().unwrap() = position;
            Ok(())
        }

        fn position(&self) -> Duration {
            *self.0.position.lock().unwrap()
        }

        fn duration(&self) -> Option<Duration> {
            *self.0.duration.lock().unwrap()
        }

        fn set_volume(&mut self, _volume: f32) {}

        fn set_position_observer(&mut self, observer: Option<PositionObserver>) {
            *self.0.position_observer.lock().unwrap() = observer;
        }

        fn set_error_observer(&mut self, observer: Option<ErrorObserver>) {
            *self.0.error_observer.lock().unwrap() = observer;
        }
    }

    /// Engine with one fake track per duration, named t0, t1, ...
    fn engine_with(durations: &[u64]) -> (SyncEngine, Vec<TrackId>, Vec<TestHandle>) {
        let engine = SyncEngine::new();
        let recorder: Recorder = Arc::new(StdMutex::new(Vec::new()));
        let mut ids = Vec::new();
        let mut handles = Vec::new();
        for (i, secs) in durations.iter().enumerate() {
            let handle = TestHandle::new(&format!("t{}", i), *secs, recorder.clone());
            let id = engine
                .insert(
                    format!("t{}", i),
                    "audio/wav",
                    TrackSource::Local(format!("/tmp/t{}.wav", i).into()),
                    handle.boxed(),
                )
                .unwrap();
            ids.push(id);
            handles.push(handle);
        }
        (engine, ids, handles)
    }

    #[test]
    fn reference_is_longest_enabled() {
        let (engine, ids, _) = engine_with(&[10, 30, 20]);
        assert_eq!(engine.reference_track(), Some(ids[1]));
    }

    #[test]
    fn insert_recomputes_reference() {
        let (engine, ids, handles) = engine_with(&[10]);
        assert_eq!(engine.reference_track(), Some(ids[0]));

        let longer = TestHandle::new("t9", 99, handles[0].recorder.clone());
        let id = engine
            .insert(
                "t9",
                "audio/wav",
                TrackSource::Local("/tmp/t9.wav".into()),
                longer.boxed(),
            )
            .unwrap();
        assert_eq!(engine.reference_track(), Some(id));
    }

    #[test]
    fn duplicate_name_rejected() {
        let (engine, _, handles) = engine_with(&[10]);
        let dup = TestHandle::new("dup", 5, handles[0].recorder.clone());
        let err = engine
            .insert(
                "t0",
                "audio/wav",
                TrackSource::Local("/tmp/dup.wav".into()),
                dup.boxed(),
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::DuplicateName(_)));
        assert_eq!(engine.len(), 1);
    }

    #[test]
    fn disable_recomputes_reference_before_snapping() {
        let (engine, ids, handles) = engine_with(&[30, 10]);
        assert_eq!(engine.reference_track(), Some(ids[0]));

        // The shorter track sits at 2s; once t0 is disabled it becomes the
        // reference, so t0 must be snapped to 2s, not to its own position.
        handles[1].set_position(Duration::from_secs(2));
        handles[0].set_position(Duration::from_secs(7));
        engine.disable(ids[0]).unwrap();

        assert_eq!(engine.reference_track(), Some(ids[1]));
        assert_eq!(
            handles[0].commands(),
            vec![Command::Seek(Duration::from_secs(2)), Command::Pause]
        );
    }

    #[test]
    fn disable_is_idempotent() {
        let (engine, ids, handles) = engine_with(&[10]);
        engine.disable(ids[0]).unwrap();
        let commands_before = handles[0].commands().len();
        engine.disable(ids[0]).unwrap();
        assert_eq!(handles[0].commands().len(), commands_before);
    }

    #[test]
    fn disabling_last_enabled_leaves_no_reference() {
        let (engine, ids, _) = engine_with(&[10]);
        engine.disable(ids[0]).unwrap();
        assert_eq!(engine.reference_track(), None);
        assert_eq!(engine.current_position(), Duration::ZERO);
    }

    #[test]
    fn enable_while_idle_does_not_play() {
        let (engine, ids, handles) = engine_with(&[10, 20]);
        engine.disable(ids[0]).unwrap();
        engine.enable(ids[0]).unwrap();
        assert!(!handles[0].commands().contains(&Command::Play));
        assert_eq!(engine.transport(), TransportState::Idle);
    }

    #[test]
    fn enable_while_playing_seeks_and_plays() {
        let (engine, ids, handles) = engine_with(&[10, 20]);
        engine.disable(ids[0]).unwrap();
        engine.play(|_| {});
        handles[1].set_position(Duration::from_secs(4));

        engine.enable(ids[0]).unwrap();
        let commands = handles[0].commands();
        assert!(commands.contains(&Command::Seek(Duration::from_secs(4))));
        assert_eq!(commands.last(), Some(&Command::Play));
    }

    #[test]
    fn reenabling_only_track_restores_reference_and_playback() {
        let (engine, ids, handles) = engine_with(&[10]);
        engine.play(|_| {});
        engine.disable(ids[0]).unwrap();
        assert_eq!(engine.reference_track(), None);

        engine.enable(ids[0]).unwrap();
        assert_eq!(engine.reference_track(), Some(ids[0]));
        assert_eq!(handles[0].commands().last(), Some(&Command::Play));
    }

    #[test]
    fn play_prepares_all_before_playing_any() {
        let (engine, ids, handles) = engine_with(&[10, 20, 30]);
        engine.disable(ids[2]).unwrap();
        engine.play(|_| {});

        let log = handles[0].recorder.lock().unwrap().clone();
        let transport: Vec<&(String, Command)> = log
            .iter()
            .filter(|(_, c)| matches!(c, Command::Prepare | Command::Play))
            .collect();
        let first_play = transport
            .iter()
            .position(|(_, c)| *c == Command::Play)
            .unwrap();
        assert!(transport[..first_play]
            .iter()
            .all(|(_, c)| *c == Command::Prepare));

        // Exactly one play per enabled track, none for the disabled one.
        for handle in &handles[..2] {
            let plays = handle
                .commands()
                .iter()
                .filter(|c| **c == Command::Play)
                .count();
            assert_eq!(plays, 1);
        }
        assert!(!handles[2].commands().contains(&Command::Play));
        assert_eq!(engine.transport(), TransportState::Playing);
    }

    #[test]
    fn prepare_happens_once_across_sessions() {
        let (engine, _, handles) = engine_with(&[10, 20]);
        engine.play(|_| {});
        engine.stop();
        engine.play(|_| {});

        for handle in &handles {
            let prepares = handle
                .commands()
                .iter()
                .filter(|c| **c == Command::Prepare)
                .count();
            assert_eq!(prepares, 1);
        }
    }

    #[test]
    fn stop_and_reset_touch_only_enabled_tracks() {
        let (engine, ids, handles) = engine_with(&[10, 20]);
        engine.disable(ids[0]).unwrap();
        let disabled_commands = handles[0].commands();

        engine.play(|_| {});
        engine.stop();
        assert_eq!(engine.transport(), TransportState::Idle);
        assert_eq!(handles[0].commands(), disabled_commands);

        engine.reset();
        let commands = handles[1].commands();
        assert!(commands.contains(&Command::Seek(Duration::ZERO)));
        assert_eq!(handles[0].commands(), disabled_commands);
    }

    #[test]
    fn disable_enable_round_trip_restores_reference() {
        let (engine, ids, _) = engine_with(&[10, 30, 20]);
        let original = engine.reference_track();
        engine.disable(ids[1]).unwrap();
        assert_eq!(engine.reference_track(), Some(ids[2]));
        engine.enable(ids[1]).unwrap();
        assert_eq!(engine.reference_track(), original);
        assert!(!engine.is_disabled(ids[1]));
    }

    #[test]
    fn position_observer_follows_reference() {
        let (engine, ids, handles) = engine_with(&[30, 10]);
        engine.play(|_| {});
        assert!(handles[0].has_position_observer());
        assert!(!handles[1].has_position_observer());

        engine.disable(ids[0]).unwrap();
        assert!(!handles[0].has_position_observer());
        assert!(handles[1].has_position_observer());
    }

    #[test]
    fn handle_error_removes_track_and_notifies() {
        let (engine, ids, handles) = engine_with(&[30, 10]);
        let removed: Arc<StdMutex<Vec<(TrackId, RemovalReason)>>> =
            Arc::new(StdMutex::new(Vec::new()));
        let seen = removed.clone();
        engine.subscribe(move |event| {
            if let EngineEvent::TrackRemoved { id, reason, .. } = event {
                seen.lock().unwrap().push((*id, *reason));
            }
        });

        handles[0].fire_error();

        assert_eq!(engine.len(), 1);
        assert_eq!(engine.reference_track(), Some(ids[1]));
        assert_eq!(
            *removed.lock().unwrap(),
            vec![(ids[0], RemovalReason::LoadFailure)]
        );
    }

    #[test]
    fn failing_prepare_removes_track_on_play() {
        let (engine, ids, handles) = engine_with(&[10, 20]);
        *handles[0].fail_prepare.lock().unwrap() = true;

        engine.play(|_| {});

        assert_eq!(engine.len(), 1);
        assert!(!handles[0].commands().contains(&Command::Play));
        assert_eq!(engine.reference_track(), Some(ids[1]));
    }

    #[test]
    fn rename_enforces_uniqueness() {
        let (engine, ids, _) = engine_with(&[10, 20]);
        assert!(matches!(
            engine.rename(ids[0], "t1"),
            Err(EngineError::DuplicateName(_))
        ));
        engine.rename(ids[0], "vocals.wav").unwrap();
        assert_eq!(engine.track_name(ids[0]).as_deref(), Some("vocals.wav"));
        assert_eq!(engine.find_by_name("t0"), None);
    }

    #[test]
    fn subscribers_receive_events_until_unsubscribed() {
        let engine = SyncEngine::new();
        let count = Arc::new(StdMutex::new(0usize));
        let seen = count.clone();
        let sub = engine.subscribe(move |_| *seen.lock().unwrap() += 1);

        let recorder: Recorder = Arc::new(StdMutex::new(Vec::new()));
        let handle = TestHandle::new("t0", 10, recorder);
        engine
            .insert(
                "t0",
                "audio/wav",
                TrackSource::Local("/tmp/t0.wav".into()),
                handle.boxed(),
            )
            .unwrap();
        assert_eq!(*count.lock().unwrap(), 1);

        assert!(engine.unsubscribe(sub));
        engine.play(|_| {});
        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[test]
    fn snapshot_reports_membership() {
        let (engine, ids, handles) = engine_with(&[10, 20]);
        handles[1].set_position(Duration::from_secs(3));
        engine.disable(ids[0]).unwrap();

        let infos = engine.snapshot();
        assert_eq!(infos.len(), 2);
        assert!(!infos[0].enabled);
        assert!(infos[1].enabled);
        assert_eq!(infos[1].duration_secs, 20.0);
        assert_eq!(infos[1].position_secs, 3.0);
    }
}
