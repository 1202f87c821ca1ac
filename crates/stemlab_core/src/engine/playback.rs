//! rodio-backed playback handles.
//!
//! Each handle preloads its source bytes on a background thread as soon as
//! it is created, so a slow download never stalls the registry. A source
//! that cannot be fetched or decoded flips the handle into a failed state
//! and notifies the error observer, which is what drives auto-removal.
//!
//! The preload thread always signals the load condvar before invoking the
//! error observer: a `prepare()` blocked on the load must be released
//! before the observer re-enters the registry.

use std::io::Cursor;
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use reqwest::cookie::Jar;
use reqwest::Url;
use rodio::mixer::Mixer;
use rodio::{Decoder, OutputStream, OutputStreamBuilder, Sink, Source};

use super::handle::{
    ErrorObserver, HandleFactory, PlaybackError, PlaybackHandle, PlaybackResult, PositionObserver,
};
use super::track::TrackSource;

/// How often the poller reports the playhead to the position observer.
const POSITION_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Owns the audio output stream; must outlive every handle it fed.
pub struct AudioOutput {
    stream: OutputStream,
}

impl AudioOutput {
    /// Open the default output device.
    pub fn open_default() -> PlaybackResult<Self> {
        let stream = OutputStreamBuilder::from_default_device()
            .map_err(|e| PlaybackError::OutputUnavailable(e.to_string()))?
            .open_stream_or_fallback()
            .map_err(|e| PlaybackError::OutputUnavailable(e.to_string()))?;
        Ok(Self { stream })
    }

    /// Factory creating handles on this output.
    ///
    /// `cookies` is the jar shared with the HTTP client, so remote fetches
    /// carry the sound-tools session cookie.
    pub fn handle_factory(&self, cookies: Arc<Jar>) -> RodioHandleFactory {
        RodioHandleFactory {
            mixer: self.stream.mixer().clone(),
            cookies,
        }
    }
}

/// Creates [`RodioHandle`]s for registered sources.
pub struct RodioHandleFactory {
    mixer: Mixer,
    cookies: Arc<Jar>,
}

impl HandleFactory for RodioHandleFactory {
    fn create(
        &self,
        source: &TrackSource,
        _media_kind: &str,
    ) -> PlaybackResult<Box<dyn PlaybackHandle>> {
        Ok(Box::new(RodioHandle::spawn(
            self.mixer.clone(),
            source.clone(),
            self.cookies.clone(),
        )))
    }
}

/// Decoded bytes shared between the decoder and the duration probe.
#[derive(Clone)]
struct SharedBytes(Arc<Vec<u8>>);

impl AsRef<[u8]> for SharedBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

enum Load {
    Pending,
    Ready(SharedBytes),
    Failed(String),
}

struct HandleShared {
    load: Mutex<Load>,
    loaded: Condvar,
    duration: Mutex<Option<Duration>>,
    position_observer: Mutex<Option<PositionObserver>>,
    error_observer: Mutex<Option<ErrorObserver>>,
    failed: Mutex<bool>,
}

impl HandleShared {
    fn new() -> Self {
        Self {
            load: Mutex::new(Load::Pending),
            loaded: Condvar::new(),
            duration: Mutex::new(None),
            position_observer: Mutex::new(None),
            error_observer: Mutex::new(None),
            failed: Mutex::new(false),
        }
    }
}

/// Playback handle backed by a rodio sink.
pub struct RodioHandle {
    mixer: Mixer,
    shared: Arc<HandleShared>,
    sink: Option<Arc<Sink>>,
    pending_seek: Duration,
    volume: f32,
}

impl RodioHandle {
    fn spawn(mixer: Mixer, source: TrackSource, cookies: Arc<Jar>) -> Self {
        let shared = Arc::new(HandleShared::new());
        let preload_shared = shared.clone();
        thread::spawn(move || preload(preload_shared, source, cookies));
        Self {
            mixer,
            shared,
            sink: None,
            pending_seek: Duration::ZERO,
            volume: 1.0,
        }
    }

    /// Block until the preload thread finished, either way.
    fn wait_ready(&self) -> PlaybackResult<SharedBytes> {
        let mut load = self.shared.load.lock();
        loop {
            match &*load {
                Load::Ready(bytes) => return Ok(bytes.clone()),
                Load::Failed(message) => {
                    return Err(PlaybackError::SourceUnavailable(message.clone()))
                }
                Load::Pending => self.shared.loaded.wait(&mut load),
            }
        }
    }
}

impl PlaybackHandle for RodioHandle {
    fn prepare(&mut self) -> PlaybackResult<()> {
        if self.sink.is_some() {
            return Ok(());
        }
        let bytes = self.wait_ready()?;
        let source = Decoder::new(Cursor::new(bytes))
            .map_err(|e| PlaybackError::DecodeFailed(e.to_string()))?;

        let sink = Sink::connect_new(&self.mixer);
        sink.set_volume(self.volume);
        sink.append(source);
        sink.pause();
        if !self.pending_seek.is_zero() {
            if let Err(e) = sink.try_seek(self.pending_seek) {
                tracing::warn!("Deferred seek failed: {}", e);
            }
        }

        let sink = Arc::new(sink);
        spawn_position_poller(Arc::downgrade(&sink), Arc::downgrade(&self.shared));
        self.sink = Some(sink);
        Ok(())
    }

    fn play(&mut self) -> PlaybackResult<()> {
        if self.sink.is_none() {
            self.prepare()?;
        }
        if let Some(sink) = &self.sink {
            sink.play();
        }
        Ok(())
    }

    fn pause(&mut self) {
        if let Some(sink) = &self.sink {
            sink.pause();
        }
    }

    fn seek(&mut self, position: Duration) -> PlaybackResult<()> {
        match &self.sink {
            Some(sink) => sink
                .try_seek(position)
                .map_err(|e| PlaybackError::SeekFailed(e.to_string())),
            None => {
                // Applied once the sink exists.
                self.pending_seek = position;
                Ok(())
            }
        }
    }

    fn position(&self) -> Duration {
        self.sink
            .as_ref()
            .map(|s| s.get_pos())
            .unwrap_or(self.pending_seek)
    }

    fn duration(&self) -> Option<Duration> {
        *self.shared.duration.lock()
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume;
        if let Some(sink) = &self.sink {
            sink.set_volume(volume);
        }
    }

    fn set_position_observer(&mut self, observer: Option<PositionObserver>) {
        *self.shared.position_observer.lock() = observer;
    }

    fn set_error_observer(&mut self, observer: Option<ErrorObserver>) {
        let already_failed = *self.shared.failed.lock();
        if already_failed {
            if let Some(observer) = observer.clone() {
                thread::spawn(move || observer());
            }
        }
        *self.shared.error_observer.lock() = observer;
    }
}

/// Fetch, probe, and publish the source bytes.
fn preload(shared: Arc<HandleShared>, source: TrackSource, cookies: Arc<Jar>) {
    let fetched = match &source {
        TrackSource::Local(path) => std::fs::read(path).map_err(|e| e.to_string()),
        TrackSource::Remote(url) => fetch_remote(url, cookies),
    };
    let outcome = fetched.and_then(|bytes| {
        let bytes = SharedBytes(Arc::new(bytes));
        probe_duration(&bytes).map(|duration| (bytes, duration))
    });

    match outcome {
        Ok((bytes, duration)) => {
            *shared.duration.lock() = Some(duration);
            *shared.load.lock() = Load::Ready(bytes);
            shared.loaded.notify_all();
        }
        Err(message) => {
            tracing::warn!("Failed to load '{}': {}", source, message);
            *shared.failed.lock() = true;
            *shared.load.lock() = Load::Failed(message);
            shared.loaded.notify_all();
            let observer = shared.error_observer.lock().clone();
            if let Some(observer) = observer {
                observer();
            }
        }
    }
}

fn fetch_remote(url: &Url, cookies: Arc<Jar>) -> Result<Vec<u8>, String> {
    let client = reqwest::blocking::Client::builder()
        .cookie_provider(cookies)
        .build()
        .map_err(|e| e.to_string())?;
    let response = client
        .get(url.clone())
        .send()
        .and_then(|r| r.error_for_status())
        .map_err(|e| e.to_string())?;
    response
        .bytes()
        .map(|b| b.to_vec())
        .map_err(|e| e.to_string())
}

/// Decode once up front to learn the duration, counting frames when the
/// container does not declare one.
fn probe_duration(bytes: &SharedBytes) -> Result<Duration, String> {
    let decoder = Decoder::new(Cursor::new(bytes.clone())).map_err(|e| e.to_string())?;
    if let Some(duration) = decoder.total_duration() {
        return Ok(duration);
    }
    let channels = decoder.channels().max(1) as u64;
    let rate = decoder.sample_rate().max(1) as u64;
    let frames = decoder.count() as u64 / channels;
    Ok(Duration::from_secs_f64(frames as f64 / rate as f64))
}

fn spawn_position_poller(sink: Weak<Sink>, shared: Weak<HandleShared>) {
    thread::spawn(move || loop {
        thread::sleep(POSITION_POLL_INTERVAL);
        let Some(sink) = sink.upgrade() else { return };
        let Some(shared) = shared.upgrade() else { return };
        if sink.is_paused() || sink.empty() {
            continue;
        }
        let observer = shared.position_observer.lock().clone();
        if let Some(observer) = observer {
            observer(sink.get_pos());
        }
    });
}
