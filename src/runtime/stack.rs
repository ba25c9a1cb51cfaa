//! Decoder stack orchestration
//!
//! A [`DecodeStack`] owns an ordered chain of configured decoders, the row
//! registry their output lands in, and at most one background decode thread.
//! The thread pulls block-bounded windows from the capture snapshot, feeds
//! them to the decoder chain chunk by chunk, and appends the resulting
//! annotations to the row stores. Viewers query the stores concurrently.
//!
//! ## Locking
//!
//! - Each row store has its own lock; the decode thread holds at most one.
//! - Lock order is registry, then store.
//! - Decode counters, state, last error and mark index sit behind a separate
//!   status lock that is never held while taking a registry or store lock.
//! - Stop and out-of-memory flags are atomics, checked once per chunk.
//! - Decode runs of all stacks in the process are serialized.

use super::errors::{CHANNEL_NOT_ENABLED, DecodeError, MISSING_CHANNELS};
use super::events::{DecodeEvent, EventBroadcaster};
use super::sample::ChannelData;
use super::session::DecodeSession;
use super::snapshot::{SampleSnapshot, SignalSource};
use crate::decode::{Annotation, Decoder, DecoderKey, RawAnnotation, Row, RowRegistry};
use crossbeam_channel::Receiver;
use lazy_static::lazy_static;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, trace, warn};

/// Largest number of samples handed to the decoder chain in one step
pub const DEFAULT_MAX_CHUNK_SIZE: u64 = 4096;

lazy_static! {
    /// Serializes decode runs across every stack in the process
    static ref GLOBAL_DECODE_LOCK: Mutex<()> = Mutex::new(());
}

/// Lifecycle state of a stack's decode thread
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DecodeState {
    #[default]
    Stopped,
    Running,
}

#[derive(Default)]
struct DecodeStatus {
    state: DecodeState,
    samples_decoded: u64,
    samplerate: u64,
    error: Option<DecodeError>,
    mark_index: Option<u64>,
    snapshot: Option<Arc<dyn SampleSnapshot>>,
}

/// State shared between a stack and its decode thread
struct StackShared {
    registry: RwLock<RowRegistry>,
    status: Mutex<DecodeStatus>,
    stop: AtomicBool,
    no_memory: AtomicBool,
    events: EventBroadcaster,
}

impl StackShared {
    fn status(&self) -> MutexGuard<'_, DecodeStatus> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn registry(&self) -> RwLockReadGuard<'_, RowRegistry> {
        self.registry.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn registry_mut(&self) -> RwLockWriteGuard<'_, RowRegistry> {
        self.registry.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_error(&self, err: DecodeError) {
        self.status().error = Some(err);
    }

    fn stopping(&self) -> bool {
        self.stop.load(Ordering::Acquire) || self.no_memory.load(Ordering::Acquire)
    }

    /// Store one annotation emitted by `decoder`
    fn annotation_callback(&self, decoder: &DecoderKey, raw: RawAnnotation) {
        if self.no_memory.load(Ordering::Acquire) {
            return;
        }

        let annotation = match Annotation::try_from_raw(raw) {
            Ok(annotation) => annotation,
            Err(_) => {
                warn!("[{}] Out of memory, discarding decoder output", decoder);
                self.no_memory.store(true, Ordering::Release);
                return;
            }
        };

        let registry = self.registry();
        let store = match registry.store_for(decoder, annotation.format()) {
            Ok(store) => store,
            Err(e) => {
                warn!("{}", e);
                debug_assert!(false, "{}", e);
                return;
            }
        };

        if store.push(annotation).is_err() {
            warn!("[{}] Out of memory, discarding decoder output", decoder);
            self.no_memory.store(true, Ordering::Release);
        }
    }
}

/// Returns the stack to `Stopped` and announces the end of a run
struct RunGuard<'a> {
    shared: &'a StackShared,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.shared.status().state = DecodeState::Stopped;
        self.shared.events.send(DecodeEvent::Done);
    }
}

/// Everything the decode thread needs for one run
struct DecodeRun {
    shared: Arc<StackShared>,
    decoders: Vec<Decoder>,
    snapshot: Arc<dyn SampleSnapshot>,
    samplerate: u64,
    max_chunk_size: u64,
}

impl DecodeRun {
    fn run(self) {
        let _serial = GLOBAL_DECODE_LOCK
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let _guard = RunGuard {
            shared: &self.shared,
        };

        if self.shared.stop.load(Ordering::Acquire) {
            debug!("Decode cancelled before start");
            return;
        }

        let sample_count = self.snapshot.sample_count();
        let mut session = DecodeSession::new(self.samplerate);
        for dec in &self.decoders {
            if let Err(e) = session.add_instance(dec) {
                self.shared.set_error(e);
                return;
            }
        }

        let decode_start = self
            .decoders
            .iter()
            .map(Decoder::decode_start)
            .max()
            .unwrap_or(0);
        let decode_end = self
            .decoders
            .iter()
            .map(Decoder::decode_end)
            .min()
            .unwrap_or(u64::MAX)
            .min(sample_count.saturating_sub(1));

        let shared = Arc::clone(&self.shared);
        session.on_annotation(move |key, raw| shared.annotation_callback(key, raw));

        if let Err(e) = session.start() {
            error!("Failed to start decode session: {}", e);
            self.shared.set_error(e);
            return;
        }

        info!(
            "Decoding samples {}..{} of {} at {} Hz",
            decode_start, decode_end, sample_count, self.samplerate
        );
        self.decode_data(&mut session, decode_start, decode_end);

        let samples_decoded = self.shared.status().samples_decoded;
        info!("Decode finished: {} samples decoded", samples_decoded);
    }

    /// Feed `[decode_start, decode_end)` to the session chunk by chunk
    fn decode_data(&self, session: &mut DecodeSession, decode_start: u64, decode_end: u64) {
        let Some(logic) = self.decoders.iter().find(|d| d.has_probes()) else {
            debug!("No decoder in the stack consumes logic channels");
            return;
        };
        let channel_map = logic.channel_map();

        let notify_cnt = (decode_end.saturating_sub(decode_start) + 1) / 100;
        let mut last_cnt = 0;
        let mut chunks = 0u64;
        let mut i = decode_start;

        while !self.shared.stopping() && i < decode_end {
            let mut chunk_end = decode_end.min(i.saturating_add(self.max_chunk_size));
            let mut channels = Vec::with_capacity(channel_map.len());

            for signal in &channel_map {
                let Some(signal) = *signal else {
                    channels.push(None);
                    continue;
                };

                let block = if self.snapshot.has_data(signal) {
                    self.snapshot.get_samples(i, chunk_end, signal)
                } else {
                    None
                };
                let Some(block) = block else {
                    warn!("[{}] Signal {} has no data at sample {}", logic.key(), signal, i);
                    self.shared
                        .set_error(DecodeError::DataUnavailable(CHANNEL_NOT_ENABLED.to_string()));
                    return;
                };

                chunk_end = chunk_end.min(block.end_position());
                let initial = block.get_bit(i).unwrap_or(false);
                channels.push(Some(ChannelData { block, initial }));
            }

            if chunk_end <= i {
                warn!("[{}] Empty sample window at {}", logic.key(), i);
                self.shared
                    .set_error(DecodeError::DataUnavailable(CHANNEL_NOT_ENABLED.to_string()));
                return;
            }

            trace!("Chunk {}: [{}, {})", chunks, i, chunk_end);
            if let Err(e) = session.send(i, chunk_end, &channels) {
                error!("Decoder rejected samples [{}, {}): {}", i, chunk_end, e);
                self.shared.set_error(e);
                break;
            }
            i = chunk_end;
            chunks += 1;

            let samples_decoded = i - decode_start + 1;
            self.shared.status().samples_decoded = samples_decoded;

            if i - last_cnt > notify_cnt {
                last_cnt = i;
                self.shared
                    .events
                    .send(DecodeEvent::Progress { samples_decoded });
            }
        }

        debug!(
            "Feed loop exited after {} chunks (stop={}, out_of_memory={})",
            chunks,
            self.shared.stop.load(Ordering::Acquire),
            self.shared.no_memory.load(Ordering::Acquire)
        );
    }
}

/// An ordered chain of decoders plus the annotations they produced
///
/// Configuration methods take `&mut self`; decode control and all queries
/// take `&self`, so a stack shared behind an `Arc` can be polled from viewer
/// threads while its decode thread runs.
pub struct DecodeStack {
    shared: Arc<StackShared>,
    source: Arc<dyn SignalSource>,
    decoders: Vec<Decoder>,
    worker: Mutex<Option<JoinHandle<()>>>,
    options_changed: AtomicBool,
    max_chunk_size: u64,
}

impl DecodeStack {
    /// Create an empty stack reading logic data through `source`
    pub fn new(source: Arc<dyn SignalSource>) -> Self {
        Self {
            shared: Arc::new(StackShared {
                registry: RwLock::new(RowRegistry::new()),
                status: Mutex::new(DecodeStatus::default()),
                stop: AtomicBool::new(false),
                no_memory: AtomicBool::new(false),
                events: EventBroadcaster::new(),
            }),
            source,
            decoders: Vec::new(),
            worker: Mutex::new(None),
            options_changed: AtomicBool::new(false),
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
        }
    }

    /// Limit the number of samples fed per step (builder pattern)
    pub fn with_max_chunk_size(mut self, max_chunk_size: u64) -> Self {
        self.max_chunk_size = max_chunk_size.max(1);
        self
    }

    pub fn max_chunk_size(&self) -> u64 {
        self.max_chunk_size
    }

    fn worker(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a decoder to the bottom of the stack
    pub fn push(&mut self, decoder: Decoder) {
        self.stop_decode();
        debug!("Pushing decoder {}", decoder.key());
        self.decoders.push(decoder);
        self.rebuild_rows();
    }

    /// Remove the decoder at `index`, returning it
    pub fn remove(&mut self, index: usize) -> Option<Decoder> {
        if index >= self.decoders.len() {
            return None;
        }
        self.stop_decode();
        let removed = self.decoders.remove(index);
        debug!("Removed decoder {}", removed.key());
        self.rebuild_rows();
        Some(removed)
    }

    fn rebuild_rows(&self) {
        self.shared.registry_mut().rebuild(&self.decoders);
        self.options_changed.store(true, Ordering::Release);
    }

    pub fn decoders(&self) -> &[Decoder] {
        &self.decoders
    }

    /// Subscribe to progress and completion events
    pub fn subscribe(&self) -> Receiver<DecodeEvent> {
        self.shared.events.subscribe()
    }

    /// Start a background decode if the configuration changed since the last one
    pub fn begin_decode(&self) {
        if !self.options_changed.swap(false, Ordering::AcqRel) {
            debug!("Decoder options unchanged, not restarting decode");
            return;
        }

        self.stop_decode();
        self.init();

        if let Some(dec) = self.decoders.iter().find(|d| !d.have_required_probes()) {
            debug!("[{}] Required channels not bound", dec.key());
            self.shared
                .set_error(DecodeError::Configuration(MISSING_CHANNELS.to_string()));
            return;
        }

        let Some(signal) = self.decoders.iter().find_map(Decoder::first_bound_signal) else {
            debug!("No decoder has a bound channel, nothing to decode");
            return;
        };
        let Some(data) = self.source.logic_data(signal) else {
            debug!("No logic data for signal {}", signal);
            return;
        };
        if data.snapshot.is_empty() || data.samplerate == 0 {
            debug!("Capture is empty or has no sample rate, nothing to decode");
            return;
        }

        // Held until the handle is stored so a concurrent stop sees either
        // no run at all or the spawned one.
        let mut worker = self.worker();
        {
            let mut status = self.shared.status();
            status.snapshot = Some(Arc::clone(&data.snapshot));
            status.samplerate = data.samplerate;
            status.state = DecodeState::Running;
        }
        self.shared.stop.store(false, Ordering::Release);

        let run = DecodeRun {
            shared: Arc::clone(&self.shared),
            decoders: self.decoders.clone(),
            snapshot: data.snapshot,
            samplerate: data.samplerate,
            max_chunk_size: self.max_chunk_size,
        };

        match thread::Builder::new()
            .name("decode".to_string())
            .spawn(move || run.run())
        {
            Ok(handle) => *worker = Some(handle),
            Err(e) => {
                error!("Failed to spawn decode thread: {}", e);
                let mut status = self.shared.status();
                status.error = Some(DecodeError::DecoderFailure(e.to_string()));
                status.state = DecodeState::Stopped;
            }
        }
    }

    /// Stop the decode thread and wait for it to exit
    pub fn stop_decode(&self) {
        let mut worker = self.worker();
        self.shared.stop.store(true, Ordering::Release);
        if let Some(handle) = worker.take() {
            debug!("Stopping decode thread");
            if handle.join().is_err() {
                error!("Decode thread panicked");
            }
        }
        self.shared.status().state = DecodeState::Stopped;
    }

    /// Wait for the current decode to finish on its own
    pub fn wait_decode(&self) {
        let handle = self.worker().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("Decode thread panicked");
            }
        }
    }

    /// Mark the capture as finished and decode it
    pub fn on_frame_ended(&self) {
        self.options_changed.store(true, Ordering::Release);
        self.begin_decode();
    }

    /// Drop all decoded output and reset counters, error and mark index
    pub fn clear(&self) {
        self.init();
    }

    fn init(&self) {
        {
            let mut status = self.shared.status();
            status.samples_decoded = 0;
            status.error = None;
            status.mark_index = None;
        }
        self.shared.registry().clear_stores();
        self.shared.no_memory.store(false, Ordering::Release);
    }

    pub fn decode_state(&self) -> DecodeState {
        self.shared.status().state
    }

    pub fn samples_decoded(&self) -> u64 {
        self.shared.status().samples_decoded
    }

    /// Samples in the capture of the last decode, 0 before the first one
    pub fn sample_count(&self) -> u64 {
        let snapshot = self.shared.status().snapshot.clone();
        snapshot.map(|s| s.sample_count()).unwrap_or(0)
    }

    pub fn sample_rate(&self) -> u64 {
        self.shared.status().samplerate
    }

    /// Rows of the stack in row order
    pub fn rows(&self) -> Vec<Row> {
        self.shared.registry().rows()
    }

    /// Largest end sample over all rows
    pub fn max_sample_count(&self) -> u64 {
        self.shared
            .registry()
            .iter()
            .map(|(_, store)| store.max_sample())
            .max()
            .unwrap_or(0)
    }

    pub fn has_annotations(&self, row: &Row) -> bool {
        self.shared
            .registry()
            .store(row)
            .is_some_and(|store| store.max_sample() != 0)
    }

    /// Annotations of `row` overlapping `(start, end]`
    pub fn get_annotation_subset(&self, row: &Row, start: u64, end: u64) -> Vec<Annotation> {
        self.shared
            .registry()
            .store(row)
            .map(|store| store.subset_in_range(start, end))
            .unwrap_or_default()
    }

    /// Number of annotations of `row` starting at or before `start`
    pub fn get_annotation_index(&self, row: &Row, start: u64) -> u64 {
        self.shared
            .registry()
            .store(row)
            .map(|store| store.index_of_first_at_or_after(start))
            .unwrap_or(0)
    }

    /// Largest annotation span of `row`
    pub fn get_max_annotation(&self, row: &Row) -> u64 {
        self.shared
            .registry()
            .store(row)
            .map(|store| store.max_span())
            .unwrap_or(0)
    }

    /// Smallest nonzero annotation span of `row`
    pub fn get_min_annotation(&self, row: &Row) -> u64 {
        self.shared
            .registry()
            .store(row)
            .map(|store| store.min_span())
            .unwrap_or(0)
    }

    /// Number of rows shown in the list view
    pub fn list_rows_size(&self) -> usize {
        self.shared.registry().listed().count()
    }

    /// Annotation count of the longest listed row
    pub fn list_annotation_size(&self) -> u64 {
        self.shared
            .registry()
            .listed()
            .map(|(_, store)| store.len())
            .max()
            .unwrap_or(0)
    }

    pub fn list_annotation_size_of(&self, row_index: usize) -> u64 {
        self.shared
            .registry()
            .listed()
            .nth(row_index)
            .map(|(_, store)| store.len())
            .unwrap_or(0)
    }

    pub fn list_annotation(&self, row_index: usize, item_index: u64) -> Option<Annotation> {
        self.shared
            .registry()
            .listed()
            .nth(row_index)
            .and_then(|(_, store)| store.get(item_index))
    }

    pub fn list_row_title(&self, row_index: usize) -> Option<String> {
        self.shared
            .registry()
            .listed()
            .nth(row_index)
            .map(|(row, _)| row.title())
    }

    pub fn get_rows_gshow(&self) -> BTreeMap<Row, bool> {
        self.shared.registry().global_show_map()
    }

    pub fn set_rows_gshow(&self, row: &Row, show: bool) {
        self.shared.registry_mut().set_global_show(row, show);
    }

    pub fn get_rows_lshow(&self) -> BTreeMap<Row, bool> {
        self.shared.registry().list_show_map()
    }

    pub fn set_rows_lshow(&self, row: &Row, show: bool) {
        self.shared.registry_mut().set_list_show(row, show);
    }

    /// Text of the last error, empty if the last run succeeded
    pub fn error_message(&self) -> String {
        self.shared
            .status()
            .error
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default()
    }

    pub fn last_error(&self) -> Option<DecodeError> {
        self.shared.status().error.clone()
    }

    pub fn options_changed(&self) -> bool {
        self.options_changed.load(Ordering::Acquire)
    }

    pub fn set_options_changed(&self, changed: bool) {
        self.options_changed.store(changed, Ordering::Release);
    }

    /// Whether the last run ran out of memory and discarded output
    pub fn out_of_memory(&self) -> bool {
        self.shared.no_memory.load(Ordering::Acquire)
    }

    pub fn mark_index(&self) -> Option<u64> {
        self.shared.status().mark_index
    }

    pub fn set_mark_index(&self, index: Option<u64>) {
        self.shared.status().mark_index = index;
    }
}

impl Drop for DecodeStack {
    fn drop(&mut self) {
        self.stop_decode();
    }
}
