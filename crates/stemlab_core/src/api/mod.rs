//! Client for the sound-tools processing API.
//!
//! Three pieces, mirroring the protocol:
//! - [`ToolsApi`]: plain HTTP against one origin (listing, probing,
//!   submissions), with the shared cookie jar that carries the session
//!   credential;
//! - [`EventChannel`]: the persistent message channel job events arrive on;
//! - [`JobSession`]: the per-job state machine tying the two together and
//!   merging results back into the engine.

mod channel;
mod client;
mod dto;
mod session;

pub use channel::EventChannel;
pub use client::{
    ApiError, ApiResult, ToolsApi, COMBINE_PATH, COMPLETED_REQUESTS_PREFIX, DEFAULT_MEDIA_KIND,
    EVENTS_PATH, INFO_PATH, VOCAL_REMOVER_PATH,
};
pub use dto::{ClientEvent, EventEnvelope, ResultFile, ServerEvent};
pub use session::{JobListeners, JobOutcome, JobRequest, JobSession, SessionError};
