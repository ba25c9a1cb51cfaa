//! Decoder interface, annotations and row storage
//!
//! - **Decoders**: [`DecoderDescriptor`] describes a protocol decoder,
//!   [`Decoder`] binds it to signals inside a stack
//! - **Annotations**: labeled sample intervals emitted by decoders
//! - **Rows**: [`RowRegistry`] routes each annotation class to a row and owns
//!   one [`AnnotationStore`] per row

pub mod annotation;
pub mod decoder;
pub mod registry;
pub mod row;
pub mod store;

pub use annotation::{Annotation, RawAnnotation};
pub use decoder::{
    AnnotationClass, AnnotationRowSpec, ChannelSpec, Decoder, DecoderDescriptor, DecoderInstance,
    DecoderKey, DecoderOptions, DecoderOutput, ProtocolData,
};
pub use registry::RowRegistry;
pub use row::Row;
pub use store::{AnnotationStore, MIN_SPAN_DEFAULT};
