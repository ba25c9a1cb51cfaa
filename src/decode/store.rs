//! Per-row annotation store
//!
//! Written by the decode thread, read concurrently by viewers. Each store
//! has its own lock so a writer appending to one row never stalls readers of
//! another.

use super::annotation::Annotation;
use crate::runtime::errors::DecodeResult;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Span reported by [`AnnotationStore::min_span`] before any nonzero span was seen
pub const MIN_SPAN_DEFAULT: u64 = 10;

struct Inner {
    annotations: Vec<Annotation>,
    max_span: u64,
    /// u64::MAX until a nonzero span is pushed
    min_span: u64,
}

impl Inner {
    fn new() -> Self {
        Self {
            annotations: Vec::new(),
            max_span: 0,
            min_span: u64::MAX,
        }
    }
}

/// Thread-safe, append-mostly annotation container for one row
pub struct AnnotationStore {
    inner: RwLock<Inner>,
}

impl AnnotationStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::new()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an annotation and fold its span into the statistics.
    ///
    /// On allocation failure nothing is modified.
    pub fn push(&self, annotation: Annotation) -> DecodeResult {
        let mut inner = self.write();
        inner.annotations.try_reserve(1)?;

        let span = annotation.span();
        inner.annotations.push(annotation);
        inner.max_span = inner.max_span.max(span);
        if span != 0 {
            inner.min_span = inner.min_span.min(span);
        }
        Ok(())
    }

    /// End sample of the last appended annotation, or 0 if empty
    pub fn max_sample(&self) -> u64 {
        self.read()
            .annotations
            .last()
            .map(Annotation::end_sample)
            .unwrap_or(0)
    }

    /// Largest span pushed so far
    pub fn max_span(&self) -> u64 {
        self.read().max_span
    }

    /// Smallest nonzero span pushed so far, [`MIN_SPAN_DEFAULT`] if none
    pub fn min_span(&self) -> u64 {
        match self.read().min_span {
            u64::MAX => MIN_SPAN_DEFAULT,
            span => span,
        }
    }

    /// All annotations overlapping `(start, end]`
    pub fn subset_in_range(&self, start: u64, end: u64) -> Vec<Annotation> {
        self.read()
            .annotations
            .iter()
            .filter(|a| a.overlaps(start, end))
            .cloned()
            .collect()
    }

    /// Number of leading annotations starting at or before `start`
    pub fn index_of_first_at_or_after(&self, start: u64) -> u64 {
        self.read()
            .annotations
            .iter()
            .take_while(|a| a.start_sample() <= start)
            .count() as u64
    }

    pub fn get(&self, index: u64) -> Option<Annotation> {
        let inner = self.read();
        usize::try_from(index)
            .ok()
            .and_then(|i| inner.annotations.get(i))
            .cloned()
    }

    pub fn len(&self) -> u64 {
        self.read().annotations.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.read().annotations.is_empty()
    }

    /// Drop all annotations and reset the statistics
    pub fn clear(&self) {
        *self.write() = Inner::new();
    }
}

impl Default for AnnotationStore {
    fn default() -> Self {
        Self::new()
    }
}
