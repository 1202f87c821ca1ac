//! Core status enums shared between the engine and the API layers.

mod enums;

pub use enums::{ChannelState, JobState, TransportState};
