//! Decode runtime: sample access, decode sessions and the stack orchestrator

pub mod errors;
pub mod events;
pub mod sample;
pub mod session;
pub mod snapshot;
pub mod stack;

pub use errors::{DecodeError, DecodeResult};
pub use events::{DecodeEvent, EventBroadcaster};
pub use sample::{ChannelData, LogicChunk, SampleBlock};
pub use session::{AnnotationCallback, DecodeSession};
pub use snapshot::{LogicData, LogicSnapshot, SampleSnapshot, SignalSource, StaticSignalSource};
pub use stack::{DEFAULT_MAX_CHUNK_SIZE, DecodeStack, DecodeState};
