//! Per-run decoder session
//!
//! A session owns one instance of every decoder in the stack, linked in
//! stack order. Sample chunks go to the first instance that consumes logic
//! channels; the protocol data it forwards is fed to the instance below it,
//! and so on down the stack. Annotations are handed to the registered
//! callback as soon as the instance that produced them returns, on the
//! caller's thread.

use super::errors::{DecodeError, DecodeResult, INSTANCE_FAILED};
use super::sample::{ChannelData, LogicChunk};
use crate::decode::{Decoder, DecoderInstance, DecoderKey, DecoderOutput, ProtocolData, RawAnnotation};
use tracing::{debug, trace, warn};

/// Callback receiving every annotation emitted during a session
pub type AnnotationCallback = Box<dyn FnMut(&DecoderKey, RawAnnotation) + Send>;

struct SessionInstance {
    key: DecoderKey,
    has_probes: bool,
    instance: Box<dyn DecoderInstance>,
}

/// Decoder instances for a single decode run
pub struct DecodeSession {
    samplerate: u64,
    instances: Vec<SessionInstance>,
    callback: Option<AnnotationCallback>,
    started: bool,
}

impl DecodeSession {
    pub fn new(samplerate: u64) -> Self {
        Self {
            samplerate,
            instances: Vec::new(),
            callback: None,
            started: false,
        }
    }

    /// Instantiate `decoder` and stack it below the previous instance
    pub fn add_instance(&mut self, decoder: &Decoder) -> DecodeResult {
        let instance = decoder.create_instance().map_err(|e| {
            warn!("[{}] Instance creation failed: {}", decoder.key(), e);
            DecodeError::DecoderFailure(INSTANCE_FAILED.to_string())
        })?;

        debug!(
            "[{}] Instance created at stack position {}",
            decoder.key(),
            self.instances.len()
        );
        self.instances.push(SessionInstance {
            key: decoder.key().clone(),
            has_probes: decoder.has_probes(),
            instance,
        });
        Ok(())
    }

    /// Register the annotation callback, replacing any previous one
    pub fn on_annotation(&mut self, callback: impl FnMut(&DecoderKey, RawAnnotation) + Send + 'static) {
        self.callback = Some(Box::new(callback));
    }

    pub fn num_instances(&self) -> usize {
        self.instances.len()
    }

    pub fn samplerate(&self) -> u64 {
        self.samplerate
    }

    /// Start every instance in stack order
    pub fn start(&mut self) -> DecodeResult {
        for inst in &mut self.instances {
            inst.instance
                .start(self.samplerate)
                .map_err(DecodeError::DecoderFailure)?;
        }
        self.started = true;
        debug!(
            "Session started: {} instances at {} Hz",
            self.instances.len(),
            self.samplerate
        );
        Ok(())
    }

    /// Feed samples `[start, end)` through the stack
    pub fn send(&mut self, start: u64, end: u64, channels: &[Option<ChannelData>]) -> DecodeResult {
        if !self.started {
            return Err(DecodeError::DecoderFailure("Session not started".to_string()));
        }
        let Some(logic_index) = self.instances.iter().position(|i| i.has_probes) else {
            return Ok(());
        };

        let chunk = LogicChunk::new(start, end, channels);
        trace!("Session send [{}, {})", start, end);

        let mut pending: Vec<ProtocolData> = Vec::new();
        for (pos, inst) in self.instances.iter_mut().enumerate().skip(logic_index) {
            let mut out = DecoderOutput::new();
            if pos == logic_index {
                inst.instance
                    .decode(&chunk, &mut out)
                    .map_err(DecodeError::DecoderFailure)?;
            } else {
                for data in &pending {
                    inst.instance
                        .decode_stacked(data, &mut out)
                        .map_err(DecodeError::DecoderFailure)?;
                }
            }

            if let Some(callback) = self.callback.as_mut() {
                for ann in out.annotations {
                    callback(&inst.key, ann);
                }
            }
            pending = out.forwarded;
            if pending.is_empty() {
                break;
            }
        }
        Ok(())
    }
}

impl Drop for DecodeSession {
    fn drop(&mut self) {
        debug!("Session destroyed ({} instances)", self.instances.len());
    }
}
