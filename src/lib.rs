//! Streaming protocol decode engine for captured logic samples
//!
//! A [`DecodeStack`] runs an ordered chain of protocol decoders over a logic
//! capture on a background thread, feeding them bounded chunks of sample
//! data, and collects the annotations they emit into per-row stores that
//! viewers can query while decoding is still in progress.
//!
//! # Architecture
//!
//! - **Decoders**: pluggable [`DecoderDescriptor`] / [`DecoderInstance`]
//!   pairs; the first channel-consuming decoder reads samples, the ones below
//!   it consume [`ProtocolData`] forwarded from above
//! - **Snapshots**: capture storage behind [`SampleSnapshot`], located per
//!   signal through a [`SignalSource`]
//! - **Rows**: each decoder's annotation classes map to [`Row`]s, each row
//!   owning a thread-safe [`AnnotationStore`]
//! - **Stack**: decode lifecycle, chunked feed loop, progress events and the
//!   query API
//!
//! # Example
//!
//! ```no_run
//! use decode_stack::{DecodeStack, Decoder, LogicData, LogicSnapshot, StaticSignalSource};
//! # use decode_stack::{DecoderDescriptor, DecoderInstance, DecoderOptions};
//! # struct Uart;
//! # impl DecoderDescriptor for Uart {
//! #     fn id(&self) -> &str { "uart" }
//! #     fn create_instance(&self, _: &DecoderOptions) -> Result<Box<dyn DecoderInstance>, String> { Err("".into()) }
//! # }
//! use std::sync::Arc;
//!
//! let snapshot = Arc::new(LogicSnapshot::new(1000).with_channel(0, [true; 1000]));
//! let source = StaticSignalSource::new(LogicData::new(snapshot, 1_000_000), 1);
//!
//! let mut stack = DecodeStack::new(Arc::new(source));
//! stack.push(Decoder::new(Arc::new(Uart)).with_channel("rx", 0));
//! stack.begin_decode();
//! stack.wait_decode();
//! for row in stack.rows() {
//!     println!("{}: {} annotations", row, stack.get_annotation_subset(&row, 0, 1000).len());
//! }
//! ```

pub mod decode;
pub mod runtime;

pub use decode::{
    Annotation, AnnotationClass, AnnotationRowSpec, AnnotationStore, ChannelSpec, Decoder,
    DecoderDescriptor, DecoderInstance, DecoderKey, DecoderOptions, DecoderOutput,
    MIN_SPAN_DEFAULT, ProtocolData, RawAnnotation, Row, RowRegistry,
};
pub use runtime::{
    ChannelData, DEFAULT_MAX_CHUNK_SIZE, DecodeError, DecodeEvent, DecodeResult, DecodeStack,
    DecodeState, LogicChunk, LogicData, LogicSnapshot, SampleBlock, SampleSnapshot, SignalSource,
    StaticSignalSource,
};
