//! One job session: submit a processing request, interpret its event
//! stream, and merge the results back into the engine.
//!
//! # State machine
//!
//! ```text
//! Connecting --(channel opens)--> [submit request]
//! Submitted  --(received)-------> Received   fires started notification
//! Received   --(complete)-------> Completed  routes results, fires finished
//! (any)      --(error | unknown)-> Errored   closes channel
//! (any)      --(channel closes)--> Errored   terminal
//! ```
//!
//! Credentials are established before the channel opens, and the request is
//! submitted only after the channel reports open, so no event for the job
//! can be missed. One channel per session; the session closes it at the
//! first terminal event and never retries. A bounded per-event timeout
//! turns a silent stall into a terminal error.

use std::time::Duration;

use reqwest::Url;
use thiserror::Error;
use tokio::time::timeout;

use crate::config::JobSettings;
use crate::engine::{TrackId, TrackLoader, TrackSource};
use crate::models::{ChannelState, JobState};

use super::channel::EventChannel;
use super::client::{ApiError, ToolsApi};
use super::dto::{ResultFile, ServerEvent};

/// Errors ending a job session.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Credential handshake failed: {0}")]
    Handshake(#[source] ApiError),

    #[error("Failed to open event channel: {0}")]
    Connect(String),

    #[error("Timed out opening event channel")]
    ConnectTimedOut,

    #[error("Could not read job input: {0}")]
    SourceUnavailable(String),

    #[error("Job submission failed: {0}")]
    Submit(#[source] ApiError),

    #[error("Event channel closed before the job finished")]
    ChannelClosed,

    #[error("Malformed channel message: {0}")]
    Protocol(String),

    #[error("Server reported an error: {0}")]
    Server(String),

    #[error("Unrecognized event '{0}' ended the session")]
    Unexpected(String),

    #[error("No job event within {0:?}")]
    TimedOut(Duration),

    #[error("Unknown track '{0}'")]
    UnknownTrack(String),
}

/// What to run server-side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobRequest {
    /// Mix two registered tracks into one new file. The server identifies
    /// them by display name.
    Combine { first: String, second: String },
    /// Split the vocals out of one registered track. Uploads the track's
    /// raw bytes; on completion the track is renamed to the
    /// server-confirmed filename.
    VocalRemove { track: String },
}

impl JobRequest {
    fn describe(&self) -> &'static str {
        match self {
            JobRequest::Combine { .. } => "combine",
            JobRequest::VocalRemove { .. } => "vocal-remove",
        }
    }
}

/// Optional notifications; each fires at most once per session.
#[derive(Default)]
pub struct JobListeners {
    started: Option<Box<dyn FnMut() + Send>>,
    finished: Option<Box<dyn FnMut() + Send>>,
    started_fired: bool,
    finished_fired: bool,
}

impl JobListeners {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called once when the server acknowledges the request.
    pub fn on_processing_started(mut self, f: impl FnMut() + Send + 'static) -> Self {
        self.started = Some(Box::new(f));
        self
    }

    /// Called once after a completed job's results are merged in.
    pub fn on_finished(mut self, f: impl FnMut() + Send + 'static) -> Self {
        self.finished = Some(Box::new(f));
        self
    }

    fn notify_started(&mut self) {
        if !self.started_fired {
            self.started_fired = true;
            if let Some(f) = &mut self.started {
                f();
            }
        }
    }

    fn notify_finished(&mut self) {
        if !self.finished_fired {
            self.finished_fired = true;
            if let Some(f) = &mut self.finished {
                f();
            }
        }
    }
}

/// Summary of a completed job.
#[derive(Debug, Default)]
pub struct JobOutcome {
    /// Old and new name of the renamed original, if any.
    pub renamed: Option<(String, String)>,
    /// Display names of the newly registered tracks.
    pub added: Vec<String>,
}

/// Channel abstraction so the event loop is testable without a server.
pub(crate) trait JobChannel {
    async fn next_event(&mut self) -> Option<Result<ServerEvent, SessionError>>;
    async fn send_stop(&mut self) -> Result<(), SessionError>;
    async fn close(&mut self);
}

/// Gathered before any I/O so the submission step is a single call.
enum Submission {
    Combine { first: String, second: String },
    Upload { media_kind: String, bytes: Vec<u8> },
}

/// One request/response/event exchange with the processing server.
pub struct JobSession<'a> {
    loader: &'a TrackLoader,
    channel_state: ChannelState,
    job_state: JobState,
    connect_timeout: Duration,
    event_timeout: Duration,
}

impl<'a> JobSession<'a> {
    pub fn new(loader: &'a TrackLoader) -> Self {
        Self::with_settings(loader, &JobSettings::default())
    }

    pub fn with_settings(loader: &'a TrackLoader, settings: &JobSettings) -> Self {
        Self {
            loader,
            channel_state: ChannelState::Connecting,
            job_state: JobState::Submitted,
            connect_timeout: settings.connect_timeout(),
            event_timeout: settings.event_timeout(),
        }
    }

    pub fn channel_state(&self) -> ChannelState {
        self.channel_state
    }

    pub fn job_state(&self) -> JobState {
        self.job_state
    }

    /// Run the job to its terminal state and merge the results.
    pub async fn run(
        mut self,
        request: JobRequest,
        mut listeners: JobListeners,
    ) -> Result<JobOutcome, SessionError> {
        let api = self.loader.api();
        let engine = self.loader.engine();
        tracing::info!("Starting {} job", request.describe());

        // Resolve tracks and gather upload bytes before anything opens.
        let mut original: Option<(TrackId, String)> = None;
        let submission = match &request {
            JobRequest::Combine { first, second } => {
                for name in [first, second] {
                    if engine.find_by_name(name).is_none() {
                        return Err(SessionError::UnknownTrack(name.clone()));
                    }
                }
                Submission::Combine {
                    first: first.clone(),
                    second: second.clone(),
                }
            }
            JobRequest::VocalRemove { track } => {
                let id = engine
                    .find_by_name(track)
                    .ok_or_else(|| SessionError::UnknownTrack(track.clone()))?;
                let (source, media_kind) = engine
                    .source_of(id)
                    .ok_or_else(|| SessionError::UnknownTrack(track.clone()))?;
                let bytes = fetch_source(api, &source).await?;
                original = Some((id, track.clone()));
                Submission::Upload { media_kind, bytes }
            }
        };

        // Credentials before the channel, channel before the request: no
        // event for this job can be missed.
        api.establish_session()
            .await
            .map_err(SessionError::Handshake)?;
        let events_url = api
            .events_url()
            .map_err(|e| SessionError::Connect(e.to_string()))?;
        let mut channel = match timeout(
            self.connect_timeout,
            EventChannel::connect(&events_url, api.cookie_header()),
        )
        .await
        {
            Ok(connected) => connected?,
            Err(_) => return Err(SessionError::ConnectTimedOut),
        };
        self.channel_state = ChannelState::Open;

        match submission {
            Submission::Combine { first, second } => api
                .submit_combine(&first, &second)
                .await
                .map_err(SessionError::Submit)?,
            Submission::Upload { media_kind, bytes } => api
                .submit_vocal_remove(&media_kind, bytes)
                .await
                .map_err(SessionError::Submit)?,
        }

        let files = self.drive(&mut channel, &mut listeners).await?;
        let plan = plan_completion(
            api.origin(),
            original.as_ref().map(|(_, name)| name.as_str()),
            &files,
        );
        let outcome = self.execute_plan(original, plan).await;
        listeners.notify_finished();
        Ok(outcome)
    }

    /// Consume channel events until a terminal one. Closes the channel on
    /// every terminal path; `complete` hands its descriptors back.
    pub(crate) async fn drive<C: JobChannel>(
        &mut self,
        channel: &mut C,
        listeners: &mut JobListeners,
    ) -> Result<Vec<ResultFile>, SessionError> {
        loop {
            let event = match timeout(self.event_timeout, channel.next_event()).await {
                Err(_) => {
                    tracing::warn!("No job event within {:?}, abandoning", self.event_timeout);
                    let _ = channel.send_stop().await;
                    channel.close().await;
                    self.channel_state = ChannelState::Closed;
                    self.job_state = JobState::Errored;
                    return Err(SessionError::TimedOut(self.event_timeout));
                }
                Ok(None) => {
                    self.channel_state = ChannelState::Closed;
                    self.job_state = JobState::Errored;
                    return Err(SessionError::ChannelClosed);
                }
                Ok(Some(Err(e))) => {
                    channel.close().await;
                    self.channel_state = ChannelState::Closed;
                    self.job_state = JobState::Errored;
                    return Err(e);
                }
                Ok(Some(Ok(event))) => event,
            };

            match event {
                ServerEvent::Received => {
                    // Keeps the channel open; a duplicate ack is a no-op.
                    if self.job_state == JobState::Submitted {
                        self.job_state = JobState::Received;
                        tracing::info!("Server started processing");
                        listeners.notify_started();
                    }
                }
                ServerEvent::Complete(files) => {
                    self.job_state = JobState::Completed;
                    channel.close().await;
                    self.channel_state = ChannelState::Closed;
                    tracing::info!("Job completed with {} result file(s)", files.len());
                    return Ok(files);
                }
                ServerEvent::Error(message) => {
                    self.job_state = JobState::Errored;
                    channel.close().await;
                    self.channel_state = ChannelState::Closed;
                    return Err(SessionError::Server(
                        message.unwrap_or_else(|| "unspecified".to_string()),
                    ));
                }
                ServerEvent::Unrecognized(name) => {
                    self.job_state = JobState::Errored;
                    channel.close().await;
                    self.channel_state = ChannelState::Closed;
                    return Err(SessionError::Unexpected(name));
                }
            }
        }
    }

    /// Apply a completion plan: rename the original in place, register the
    /// byproducts. Individual failures are logged, not fatal.
    async fn execute_plan(
        &self,
        original: Option<(TrackId, String)>,
        plan: CompletionPlan,
    ) -> JobOutcome {
        let engine = self.loader.engine();
        let mut outcome = JobOutcome::default();

        if let Some(new_name) = plan.rename_original_to {
            if let Some((id, old_name)) = original {
                match engine.rename(id, new_name.clone()) {
                    Ok(()) => outcome.renamed = Some((old_name, new_name)),
                    Err(e) => tracing::warn!("Could not rename original: {}", e),
                }
            }
        }
        for url in plan.register {
            match self.loader.register_from_url(url.as_str(), None).await {
                Ok(id) => {
                    if let Some(name) = engine.track_name(id) {
                        outcome.added.push(name);
                    }
                }
                Err(e) => tracing::warn!("Could not register result {}: {}", url, e),
            }
        }
        outcome
    }
}

/// Decide what a completion payload means: which descriptor renames the
/// caller's input and which become new tracks at the session origin.
#[derive(Debug, Default, PartialEq)]
pub(crate) struct CompletionPlan {
    pub rename_original_to: Option<String>,
    pub register: Vec<Url>,
}

pub(crate) fn plan_completion(
    origin: &Url,
    original: Option<&str>,
    files: &[ResultFile],
) -> CompletionPlan {
    let mut plan = CompletionPlan::default();
    for file in files {
        if original.is_some() && file.is_original() {
            match file_name_of(&file.path) {
                Some(name) => plan.rename_original_to = Some(name.to_string()),
                None => tracing::warn!("Original result without a file name: '{}'", file.path),
            }
        } else {
            match origin.join(&file.path) {
                Ok(url) => plan.register.push(url),
                Err(e) => tracing::warn!("Unresolvable result path '{}': {}", file.path, e),
            }
        }
    }
    plan
}

/// Final path segment of a server path.
pub(crate) fn file_name_of(path: &str) -> Option<&str> {
    path.rsplit('/').next().filter(|s| !s.is_empty())
}

async fn fetch_source(api: &ToolsApi, source: &TrackSource) -> Result<Vec<u8>, SessionError> {
    match source {
        TrackSource::Remote(url) => api
            .fetch_source_bytes(url)
            .await
            .map_err(|e| SessionError::SourceUnavailable(e.to_string())),
        TrackSource::Local(path) => tokio::fs::read(path)
            .await
            .map_err(|e| SessionError::SourceUnavailable(e.to_string())),
    }
}
