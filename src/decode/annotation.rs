//! Annotation values produced by decoders

use crate::runtime::errors::DecodeResult;
use std::fmt;

/// Annotation as emitted by a decoder, before it is stored
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawAnnotation {
    pub start_sample: u64,
    pub end_sample: u64,
    /// Index into the decoder's annotation classes
    pub class: u32,
    /// Display texts, longest first
    pub texts: Vec<String>,
}

impl RawAnnotation {
    pub fn new(start_sample: u64, end_sample: u64, class: u32, texts: Vec<String>) -> Self {
        Self {
            start_sample,
            end_sample,
            class,
            texts,
        }
    }
}

/// A labeled interval `[start_sample, end_sample)` over the sample axis
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Annotation {
    start_sample: u64,
    end_sample: u64,
    format: u32,
    texts: Vec<String>,
}

impl Annotation {
    pub fn new(start_sample: u64, end_sample: u64, format: u32, texts: Vec<String>) -> Self {
        Self {
            start_sample,
            end_sample: end_sample.max(start_sample),
            format,
            texts,
        }
    }

    /// Build an annotation from a decoder's raw output.
    ///
    /// The text list is moved into an exactly-sized allocation; failing to
    /// get it reports `OutOfMemory` instead of aborting the process.
    pub fn try_from_raw(raw: RawAnnotation) -> DecodeResult<Self> {
        let mut texts = Vec::new();
        texts.try_reserve_exact(raw.texts.len())?;
        texts.extend(raw.texts);
        Ok(Self::new(raw.start_sample, raw.end_sample, raw.class, texts))
    }

    pub fn start_sample(&self) -> u64 {
        self.start_sample
    }

    pub fn end_sample(&self) -> u64 {
        self.end_sample
    }

    /// Annotation class id
    pub fn format(&self) -> u32 {
        self.format
    }

    pub fn texts(&self) -> &[String] {
        &self.texts
    }

    /// Number of samples covered
    pub fn span(&self) -> u64 {
        self.end_sample - self.start_sample
    }

    /// Whether the annotation overlaps the range `(start, end]`
    #[inline]
    pub fn overlaps(&self, start: u64, end: u64) -> bool {
        self.end_sample > start && self.start_sample <= end
    }
}

impl fmt::Display for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Annotation[{}..{}, class={}, {}]",
            self.start_sample,
            self.end_sample,
            self.format,
            self.texts.first().map(String::as_str).unwrap_or("")
        )
    }
}
