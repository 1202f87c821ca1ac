//! Track registration: source resolution, content-kind probing, and handle
//! creation, feeding the registry.

use std::path::Path;
use std::sync::Arc;

use reqwest::Url;
use thiserror::Error;
use uuid::Uuid;

use crate::api::{ApiError, ToolsApi, DEFAULT_MEDIA_KIND};

use super::handle::{HandleFactory, PlaybackError};
use super::registry::{EngineError, SyncEngine};
use super::track::{TrackId, TrackSource};

/// Errors from track registration.
#[derive(Error, Debug)]
pub enum LoaderError {
    /// The source is neither an absolute URL nor resolvable against the
    /// origin.
    #[error("Unresolvable source URL '{0}'")]
    BadSource(String),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Playback(#[from] PlaybackError),

    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Result type for registration operations.
pub type LoaderResult<T> = Result<T, LoaderError>;

/// Registers new tracks with the engine.
///
/// Splits the I/O half of registration (probing, resolution, handle
/// creation) from the registry's state transitions.
pub struct TrackLoader {
    engine: SyncEngine,
    api: Arc<ToolsApi>,
    factory: Arc<dyn HandleFactory>,
}

impl TrackLoader {
    pub fn new(engine: SyncEngine, api: Arc<ToolsApi>, factory: Arc<dyn HandleFactory>) -> Self {
        Self {
            engine,
            api,
            factory,
        }
    }

    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    pub fn api(&self) -> &ToolsApi {
        &self.api
    }

    /// Register a track from a URL (absolute, or relative to the origin).
    ///
    /// Without an explicit name one is derived from the URL's final path
    /// segment and uniquified; a URL that defeats name derivation falls
    /// back to a randomized placeholder rather than failing. The content
    /// kind comes from a headers-only probe and degrades to a generic
    /// binary kind when the probe fails or reports nothing.
    pub async fn register_from_url(
        &self,
        source: &str,
        name: Option<String>,
    ) -> LoaderResult<TrackId> {
        let url = self.resolve_source(source)?;
        let name = match name {
            Some(explicit) => explicit,
            None => {
                let base = derive_name(&url).unwrap_or_else(placeholder_name);
                self.uniquify(base)
            }
        };
        let media_kind = self.api.probe_media_kind(&url).await;
        let source = TrackSource::Remote(url);
        let handle = self.factory.create(&source, &media_kind)?;
        Ok(self.engine.insert(name, media_kind, source, handle)?)
    }

    /// Register a track from a local file. Synchronous: the content kind
    /// follows the file extension, no probe needed.
    pub fn register_from_local_file(&self, path: impl AsRef<Path>) -> LoaderResult<TrackId> {
        let path = path.as_ref();
        let base = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(placeholder_name);
        let name = self.uniquify(base);
        let media_kind = media_kind_for(path).to_string();
        let source = TrackSource::Local(path.to_path_buf());
        let handle = self.factory.create(&source, &media_kind)?;
        Ok(self.engine.insert(name, media_kind, source, handle)?)
    }

    /// Register every file the server lists as available. Files that fail
    /// to register are skipped with a warning.
    pub async fn register_available(&self) -> LoaderResult<Vec<TrackId>> {
        let filenames = self.api.fetch_available().await?;
        let mut ids = Vec::with_capacity(filenames.len());
        for filename in filenames {
            let url = self.api.completed_request_url(&filename)?;
            match self.register_from_url(url.as_str(), None).await {
                Ok(id) => ids.push(id),
                Err(e) => tracing::warn!("Skipping available file '{}': {}", filename, e),
            }
        }
        Ok(ids)
    }

    fn resolve_source(&self, source: &str) -> LoaderResult<Url> {
        Url::parse(source)
            .or_else(|_| self.api.origin().join(source))
            .map_err(|_| LoaderError::BadSource(source.to_string()))
    }

    /// Derived names get a numeric suffix instead of colliding.
    fn uniquify(&self, base: String) -> String {
        if self.engine.find_by_name(&base).is_none() {
            return base;
        }
        let mut n = 2;
        loop {
            let candidate = format!("{} ({})", base, n);
            if self.engine.find_by_name(&candidate).is_none() {
                return candidate;
            }
            n += 1;
        }
    }
}

/// Final non-empty path segment of the URL, if any.
fn derive_name(url: &Url) -> Option<String> {
    url.path_segments()?
        .filter(|s| !s.is_empty())
        .last()
        .map(|s| s.to_string())
}

fn placeholder_name() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("audio-{}", &suffix[..8])
}

/// Content kind by extension, for local files.
fn media_kind_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("wav") => "audio/wav",
        Some("mp3") => "audio/mpeg",
        Some("flac") => "audio/flac",
        Some("ogg") => "audio/ogg",
        Some("m4a") => "audio/mp4",
        _ => DEFAULT_MEDIA_KIND,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::StubFactory;

    fn loader() -> TrackLoader {
        let api = Arc::new(ToolsApi::new("https://127.0.0.1:9").unwrap());
        TrackLoader::new(SyncEngine::new(), api, Arc::new(StubFactory))
    }

    #[test]
    fn derives_name_from_url_path() {
        let url = Url::parse("https://127.0.0.1:8080/completedrequests/song.mp3").unwrap();
        assert_eq!(derive_name(&url).as_deref(), Some("song.mp3"));
    }

    #[test]
    fn derive_name_skips_trailing_slash() {
        let url = Url::parse("https://example.com/media/").unwrap();
        assert_eq!(derive_name(&url).as_deref(), Some("media"));
        let root = Url::parse("https://example.com/").unwrap();
        assert_eq!(derive_name(&root), None);
    }

    #[test]
    fn placeholder_names_are_randomized() {
        let a = placeholder_name();
        let b = placeholder_name();
        assert!(a.starts_with("audio-"));
        assert_ne!(a, b);
    }

    #[test]
    fn media_kind_follows_extension() {
        assert_eq!(media_kind_for(Path::new("/tmp/a.WAV")), "audio/wav");
        assert_eq!(media_kind_for(Path::new("/tmp/a.mp3")), "audio/mpeg");
        assert_eq!(media_kind_for(Path::new("/tmp/a.bin")), DEFAULT_MEDIA_KIND);
        assert_eq!(media_kind_for(Path::new("/tmp/noext")), DEFAULT_MEDIA_KIND);
    }

    #[test]
    fn local_registration_uniquifies_names() {
        let loader = loader();
        let first = loader.register_from_local_file("/tmp/take.wav").unwrap();
        let second = loader.register_from_local_file("/tmp/other/take.wav").unwrap();

        let engine = loader.engine();
        assert_eq!(engine.track_name(first).as_deref(), Some("take.wav"));
        assert_eq!(engine.track_name(second).as_deref(), Some("take.wav (2)"));
    }

    #[test]
    fn relative_sources_resolve_against_origin() {
        let loader = loader();
        let url = loader.resolve_source("/completedrequests/mix.wav").unwrap();
        assert_eq!(
            url.as_str(),
            "https://127.0.0.1:9/completedrequests/mix.wav"
        );
    }
}
