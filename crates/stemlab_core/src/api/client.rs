//! HTTP client bound to one sound-tools origin.
//!
//! All requests share one cookie jar: the availability listing doubles as
//! the credential-establishing handshake, and the cookie it sets is what
//! the event channel and media fetches authenticate with.

use std::sync::Arc;

use reqwest::cookie::{CookieStore, Jar};
use reqwest::{header, Client, Url};
use thiserror::Error;

/// Listing + credential handshake endpoint.
pub const INFO_PATH: &str = "/soundtools/v1/info";
/// Persistent event channel endpoint.
pub const EVENTS_PATH: &str = "/soundtools/v1/events";
/// Combine-two-tracks job endpoint.
pub const COMBINE_PATH: &str = "/soundtools/v1/simple/combine";
/// Vocal-removal job endpoint.
pub const VOCAL_REMOVER_PATH: &str = "/soundtools/v1/vocalremover";
/// Where finished server-side files are served from.
pub const COMPLETED_REQUESTS_PREFIX: &str = "/completedrequests/";

/// Fallback content kind when a probe reports nothing.
pub const DEFAULT_MEDIA_KIND: &str = "application/octet-stream";

/// Errors from API operations.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

/// Client for one sound-tools origin.
pub struct ToolsApi {
    origin: Url,
    http: Client,
    cookies: Arc<Jar>,
}

impl ToolsApi {
    /// Create a client for `origin` (e.g. `https://127.0.0.1:8080`).
    pub fn new(origin: &str) -> ApiResult<Self> {
        let origin =
            Url::parse(origin).map_err(|e| ApiError::InvalidUrl(format!("{}: {}", origin, e)))?;
        let cookies = Arc::new(Jar::default());
        let http = Client::builder().cookie_provider(cookies.clone()).build()?;
        Ok(Self {
            origin,
            http,
            cookies,
        })
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    /// The cookie jar shared by every request to this origin.
    pub fn cookies(&self) -> Arc<Jar> {
        self.cookies.clone()
    }

    /// Resolve a server-relative path against the origin.
    pub fn resolve(&self, path: &str) -> ApiResult<Url> {
        self.origin
            .join(path)
            .map_err(|e| ApiError::InvalidUrl(format!("{}: {}", path, e)))
    }

    /// URL of one finished server-side file.
    pub fn completed_request_url(&self, filename: &str) -> ApiResult<Url> {
        self.resolve(&format!("{}{}", COMPLETED_REQUESTS_PREFIX, filename))
    }

    /// `ws(s)` URL of the event channel.
    pub fn events_url(&self) -> ApiResult<Url> {
        let mut url = self.resolve(EVENTS_PATH)?;
        let scheme = match url.scheme() {
            "https" => "wss",
            "http" => "ws",
            other => {
                return Err(ApiError::InvalidUrl(format!(
                    "Unsupported origin scheme '{}'",
                    other
                )))
            }
        };
        url.set_scheme(scheme)
            .map_err(|_| ApiError::InvalidUrl(format!("Cannot derive {} URL", scheme)))?;
        Ok(url)
    }

    /// Credential-establishing handshake. The body is discarded; the
    /// Set-Cookie response is what matters.
    pub async fn establish_session(&self) -> ApiResult<()> {
        self.http
            .get(self.resolve(INFO_PATH)?)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Filenames available under the completed-requests path. Also
    /// establishes credentials.
    pub async fn fetch_available(&self) -> ApiResult<Vec<String>> {
        let names = self
            .http
            .get(self.resolve(INFO_PATH)?)
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<String>>()
            .await?;
        Ok(names)
    }

    /// Probe the content kind of a media URL with a headers-only request.
    ///
    /// Never fails: a missing header or a failed probe degrades to
    /// [`DEFAULT_MEDIA_KIND`].
    pub async fn probe_media_kind(&self, url: &Url) -> String {
        match self.http.head(url.clone()).send().await {
            Ok(response) => response
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
                .unwrap_or_else(|| DEFAULT_MEDIA_KIND.to_string()),
            Err(e) => {
                tracing::debug!("Content-kind probe failed for {}: {}", url, e);
                DEFAULT_MEDIA_KIND.to_string()
            }
        }
    }

    /// Download a source's raw bytes (credentialed).
    pub async fn fetch_source_bytes(&self, url: &Url) -> ApiResult<Vec<u8>> {
        let bytes = self
            .http
            .get(url.clone())
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        Ok(bytes.to_vec())
    }

    /// Submit a combine job for two previously registered track names.
    pub async fn submit_combine(&self, first: &str, second: &str) -> ApiResult<()> {
        self.http
            .post(self.resolve(COMBINE_PATH)?)
            .query(&[("a", first), ("b", second)])
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Submit a vocal-removal job carrying the raw source bytes.
    pub async fn submit_vocal_remove(&self, media_kind: &str, body: Vec<u8>) -> ApiResult<()> {
        self.http
            .post(self.resolve(VOCAL_REMOVER_PATH)?)
            .header(header::CONTENT_TYPE, media_kind)
            .body(body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Cookie header value for the event-channel upgrade, once the
    /// handshake has run.
    pub(crate) fn cookie_header(&self) -> Option<String> {
        self.cookies
            .cookies(&self.origin)
            .and_then(|v| v.to_str().map(str::to_string).ok())
    }
}
