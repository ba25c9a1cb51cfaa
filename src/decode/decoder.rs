//! Pluggable decoder interface and per-stack decoder configuration
//!
//! A [`DecoderDescriptor`] describes a protocol decoder: its channels, the
//! annotation classes it emits and how those classes group into rows. The
//! stack creates one [`DecoderInstance`] per decode run from each configured
//! [`Decoder`], and feeds sample chunks to the first instance that consumes
//! channels. Instances further down the stack receive the [`ProtocolData`]
//! forwarded by the one above them.

use super::annotation::RawAnnotation;
use crate::runtime::sample::LogicChunk;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Stable identity of a decoder type, derived from its descriptor id
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DecoderKey(Arc<str>);

impl DecoderKey {
    pub fn new(id: &str) -> Self {
        Self(Arc::from(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DecoderKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A logic channel a decoder reads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSpec {
    pub id: String,
    pub name: String,
}

impl ChannelSpec {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// An output class; its position in the decoder's class list is its id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationClass {
    pub name: String,
    pub desc: String,
}

impl AnnotationClass {
    pub fn new(name: impl Into<String>, desc: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            desc: desc.into(),
        }
    }
}

/// A named sub-row grouping some of a decoder's annotation classes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationRowSpec {
    pub id: String,
    pub desc: String,
    pub classes: Vec<u32>,
}

impl AnnotationRowSpec {
    pub fn new(id: impl Into<String>, desc: impl Into<String>, classes: Vec<u32>) -> Self {
        Self {
            id: id.into(),
            desc: desc.into(),
            classes,
        }
    }
}

/// Decoder options, passed to instance creation
pub type DecoderOptions = BTreeMap<String, String>;

/// Data passed from a decoder to the one stacked below it
#[derive(Clone)]
pub struct ProtocolData {
    pub start_sample: u64,
    pub end_sample: u64,
    pub payload: Arc<dyn Any + Send + Sync>,
}

impl ProtocolData {
    pub fn new<T: Any + Send + Sync>(start_sample: u64, end_sample: u64, payload: T) -> Self {
        Self {
            start_sample,
            end_sample,
            payload: Arc::new(payload),
        }
    }

    /// Downcast the payload to a concrete type
    pub fn get<T: Any>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }
}

impl fmt::Debug for ProtocolData {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ProtocolData[{}..{}]", self.start_sample, self.end_sample)
    }
}

/// Everything a decoder instance emits during one call
#[derive(Debug, Default)]
pub struct DecoderOutput {
    pub(crate) annotations: Vec<RawAnnotation>,
    pub(crate) forwarded: Vec<ProtocolData>,
}

impl DecoderOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit an annotation of class `class` over `[start, end)`
    pub fn annotate(&mut self, start: u64, end: u64, class: u32, texts: Vec<String>) {
        self.annotations
            .push(RawAnnotation::new(start, end, class, texts));
    }

    /// Forward data to the next decoder in the stack
    pub fn forward(&mut self, data: ProtocolData) {
        self.forwarded.push(data);
    }

    pub fn annotations(&self) -> &[RawAnnotation] {
        &self.annotations
    }

    pub fn forwarded(&self) -> &[ProtocolData] {
        &self.forwarded
    }
}

/// Static description of a protocol decoder
pub trait DecoderDescriptor: Send + Sync {
    /// Unique decoder id; rows are keyed by it
    fn id(&self) -> &str;

    /// Human readable name, used in row titles
    fn name(&self) -> &str {
        self.id()
    }

    /// Channels that must be bound before decoding
    fn channels(&self) -> Vec<ChannelSpec> {
        Vec::new()
    }

    fn optional_channels(&self) -> Vec<ChannelSpec> {
        Vec::new()
    }

    fn annotation_classes(&self) -> Vec<AnnotationClass> {
        Vec::new()
    }

    /// Sub-rows; empty means all classes go to a single default row
    fn annotation_rows(&self) -> Vec<AnnotationRowSpec> {
        Vec::new()
    }

    /// Create a fresh instance for one decode run
    fn create_instance(&self, options: &DecoderOptions) -> Result<Box<dyn DecoderInstance>, String>;
}

/// A running decoder, owned by one decode session
///
/// Errors are plain messages; the stack surfaces them as the last error.
pub trait DecoderInstance: Send {
    /// Called once before the first chunk
    fn start(&mut self, _samplerate: u64) -> Result<(), String> {
        Ok(())
    }

    /// Decode a chunk of logic samples (channel-consuming decoders)
    fn decode(&mut self, _chunk: &LogicChunk<'_>, _out: &mut DecoderOutput) -> Result<(), String> {
        Ok(())
    }

    /// Decode data forwarded by the decoder above (stacked decoders)
    fn decode_stacked(&mut self, _data: &ProtocolData, _out: &mut DecoderOutput) -> Result<(), String> {
        Ok(())
    }
}

/// A decoder as configured in a stack: descriptor, channel bindings,
/// options and decode region
#[derive(Clone)]
pub struct Decoder {
    descriptor: Arc<dyn DecoderDescriptor>,
    key: DecoderKey,
    bindings: BTreeMap<String, u16>,
    options: DecoderOptions,
    decode_start: u64,
    decode_end: u64,
}

impl Decoder {
    pub fn new(descriptor: Arc<dyn DecoderDescriptor>) -> Self {
        let key = DecoderKey::new(descriptor.id());
        Self {
            descriptor,
            key,
            bindings: BTreeMap::new(),
            options: DecoderOptions::new(),
            decode_start: 0,
            decode_end: u64::MAX,
        }
    }

    /// Bind decoder channel `channel_id` to signal `signal_index` (builder pattern)
    pub fn with_channel(mut self, channel_id: impl Into<String>, signal_index: u16) -> Self {
        self.set_channel(channel_id, signal_index);
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Restrict decoding to samples `[start, end]`
    pub fn with_decode_region(mut self, start: u64, end: u64) -> Self {
        self.set_decode_region(start, end);
        self
    }

    pub fn set_channel(&mut self, channel_id: impl Into<String>, signal_index: u16) {
        self.bindings.insert(channel_id.into(), signal_index);
    }

    pub fn unset_channel(&mut self, channel_id: &str) {
        self.bindings.remove(channel_id);
    }

    pub fn set_decode_region(&mut self, start: u64, end: u64) {
        self.decode_start = start;
        self.decode_end = end;
    }

    pub fn descriptor(&self) -> &Arc<dyn DecoderDescriptor> {
        &self.descriptor
    }

    pub fn key(&self) -> &DecoderKey {
        &self.key
    }

    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    pub fn options(&self) -> &DecoderOptions {
        &self.options
    }

    pub fn decode_start(&self) -> u64 {
        self.decode_start
    }

    pub fn decode_end(&self) -> u64 {
        self.decode_end
    }

    /// Whether the decoder reads logic channels at all
    pub fn has_probes(&self) -> bool {
        !self.descriptor.channels().is_empty() || !self.descriptor.optional_channels().is_empty()
    }

    /// Whether every required channel is bound
    pub fn have_required_probes(&self) -> bool {
        self.descriptor
            .channels()
            .iter()
            .all(|ch| self.bindings.contains_key(&ch.id))
    }

    /// Signal index per decoder channel, required channels first
    pub fn channel_map(&self) -> Vec<Option<u16>> {
        self.descriptor
            .channels()
            .iter()
            .chain(self.descriptor.optional_channels().iter())
            .map(|ch| self.bindings.get(&ch.id).copied())
            .collect()
    }

    /// First bound signal in channel declaration order
    pub fn first_bound_signal(&self) -> Option<u16> {
        self.channel_map().into_iter().flatten().next()
    }

    pub fn create_instance(&self) -> Result<Box<dyn DecoderInstance>, String> {
        self.descriptor.create_instance(&self.options)
    }
}

impl fmt::Debug for Decoder {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Decoder")
            .field("id", &self.key)
            .field("bindings", &self.bindings)
            .field("decode_start", &self.decode_start)
            .field("decode_end", &self.decode_end)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Probe;

    impl DecoderDescriptor for Probe {
        fn id(&self) -> &str {
            "probe"
        }

        fn channels(&self) -> Vec<ChannelSpec> {
            vec![ChannelSpec::new("clk", "CLK"), ChannelSpec::new("data", "DATA")]
        }

        fn optional_channels(&self) -> Vec<ChannelSpec> {
            vec![ChannelSpec::new("cs", "CS#")]
        }

        fn create_instance(&self, _options: &DecoderOptions) -> Result<Box<dyn DecoderInstance>, String> {
            Err("not needed".to_string())
        }
    }

    #[test]
    fn test_required_probes() {
        let dec = Decoder::new(Arc::new(Probe)).with_channel("clk", 3);
        assert!(!dec.have_required_probes());
        let dec = dec.with_channel("data", 1);
        assert!(dec.have_required_probes());
        assert!(dec.has_probes());
    }

    #[test]
    fn test_channel_map_order() {
        let dec = Decoder::new(Arc::new(Probe))
            .with_channel("data", 1)
            .with_channel("cs", 7);
        assert_eq!(dec.channel_map(), vec![None, Some(1), Some(7)]);
        assert_eq!(dec.first_bound_signal(), Some(1));
    }

    #[test]
    fn test_defaults_cover_whole_capture() {
        let dec = Decoder::new(Arc::new(Probe));
        assert_eq!(dec.decode_start(), 0);
        assert_eq!(dec.decode_end(), u64::MAX);
        assert_eq!(dec.key().as_str(), "probe");
        assert_eq!(dec.name(), "probe");
    }

    #[test]
    fn test_protocol_data_downcast() {
        let data = ProtocolData::new(4, 9, 0xA5u8);
        assert_eq!(data.get::<u8>(), Some(&0xA5));
        assert!(data.get::<u16>().is_none());
    }
}
