//! Sample snapshot interfaces and an in-memory logic snapshot
//!
//! The decode stack never owns capture storage. It reads windows through
//! [`SampleSnapshot`] and locates the snapshot for a decoder's channels
//! through [`SignalSource`].

use super::sample::SampleBlock;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Captured logic samples, read in block-sized windows
pub trait SampleSnapshot: Send + Sync {
    /// Total number of samples captured
    fn sample_count(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.sample_count() == 0
    }

    /// Whether `channel` was enabled during capture
    fn has_data(&self, channel: u16) -> bool;

    /// Contiguous samples of `channel` starting at `start`.
    ///
    /// The returned block covers `start` but may end before `end`.
    /// Returns None if the channel has no data or `start` is past the capture.
    fn get_samples(&self, start: u64, end: u64, channel: u16) -> Option<SampleBlock>;

    /// Level of `channel` at `position` (false when unavailable)
    fn get_sample(&self, position: u64, channel: u16) -> bool;
}

/// Logic data backing a signal: its snapshot and the capture sample rate
#[derive(Clone)]
pub struct LogicData {
    pub snapshot: Arc<dyn SampleSnapshot>,
    /// Sample rate in Hz
    pub samplerate: u64,
}

impl LogicData {
    pub fn new(snapshot: Arc<dyn SampleSnapshot>, samplerate: u64) -> Self {
        Self {
            snapshot,
            samplerate,
        }
    }
}

impl fmt::Debug for LogicData {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("LogicData")
            .field("sample_count", &self.snapshot.sample_count())
            .field("samplerate", &self.samplerate)
            .finish()
    }
}

/// Resolves a signal index to the logic data it is captured in
pub trait SignalSource: Send + Sync {
    fn logic_data(&self, signal_index: u16) -> Option<LogicData>;
}

/// Signal source where every signal below `num_signals` shares one capture
pub struct StaticSignalSource {
    data: LogicData,
    num_signals: u16,
}

impl StaticSignalSource {
    pub fn new(data: LogicData, num_signals: u16) -> Self {
        Self { data, num_signals }
    }
}

impl SignalSource for StaticSignalSource {
    fn logic_data(&self, signal_index: u16) -> Option<LogicData> {
        (signal_index < self.num_signals).then(|| self.data.clone())
    }
}

/// In-memory snapshot storing packed LSB-first blocks per channel
///
/// All channels share the same block structure, like a capture file: block
/// `n` of every channel starts at `n * samples_per_block`.
pub struct LogicSnapshot {
    sample_count: u64,
    samples_per_block: u64,
    channels: BTreeMap<u16, Vec<Arc<[u8]>>>,
}

impl LogicSnapshot {
    /// Samples per block when none is given
    pub const DEFAULT_BLOCK_SIZE: u64 = 1 << 16;

    /// Create an empty snapshot of `sample_count` samples
    pub fn new(sample_count: u64) -> Self {
        Self::with_block_size(sample_count, Self::DEFAULT_BLOCK_SIZE)
    }

    /// Create an empty snapshot with a custom block size.
    ///
    /// The block size is rounded up to a whole number of bytes.
    pub fn with_block_size(sample_count: u64, samples_per_block: u64) -> Self {
        let samples_per_block = samples_per_block.max(8).div_ceil(8) * 8;
        Self {
            sample_count,
            samples_per_block,
            channels: BTreeMap::new(),
        }
    }

    /// Add a channel (builder pattern)
    pub fn with_channel(mut self, index: u16, bits: impl IntoIterator<Item = bool>) -> Self {
        self.add_channel(index, bits);
        self
    }

    /// Add or replace a channel's samples.
    ///
    /// Bits past `sample_count` are ignored; missing bits read as low.
    pub fn add_channel(&mut self, index: u16, bits: impl IntoIterator<Item = bool>) {
        let bytes_per_block = (self.samples_per_block / 8) as usize;
        let total_bytes = self.sample_count.div_ceil(8) as usize;
        let mut packed = vec![0u8; total_bytes];
        for (i, bit) in bits.into_iter().take(self.sample_count as usize).enumerate() {
            if bit {
                packed[i / 8] |= 1 << (i % 8);
            }
        }

        let blocks = packed
            .chunks(bytes_per_block.max(1))
            .map(Arc::<[u8]>::from)
            .collect();
        self.channels.insert(index, blocks);
    }

    pub fn samples_per_block(&self) -> u64 {
        self.samples_per_block
    }

    /// Indices of all channels holding data
    pub fn channels(&self) -> Vec<u16> {
        self.channels.keys().copied().collect()
    }
}

impl SampleSnapshot for LogicSnapshot {
    fn sample_count(&self) -> u64 {
        self.sample_count
    }

    fn has_data(&self, channel: u16) -> bool {
        self.channels.contains_key(&channel)
    }

    fn get_samples(&self, start: u64, _end: u64, channel: u16) -> Option<SampleBlock> {
        if start >= self.sample_count {
            return None;
        }
        let block_num = start / self.samples_per_block;
        let data = self.channels.get(&channel)?.get(block_num as usize)?;
        let block_start = block_num * self.samples_per_block;
        let num_samples = self.samples_per_block.min(self.sample_count - block_start);
        Some(SampleBlock::new(
            Arc::clone(data),
            block_start,
            num_samples as usize,
        ))
    }

    fn get_sample(&self, position: u64, channel: u16) -> bool {
        self.get_samples(position, position + 1, channel)
            .and_then(|block| block.get_bit(position))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(n: usize, half_period: usize) -> Vec<bool> {
        (0..n).map(|i| (i / half_period) % 2 == 1).collect()
    }

    #[test]
    fn test_block_windows_are_block_bounded() {
        let snap = LogicSnapshot::with_block_size(100, 32).with_channel(0, square(100, 4));
        assert_eq!(snap.samples_per_block(), 32);

        let first = snap.get_samples(5, 100, 0).unwrap();
        assert_eq!(first.start_position, 0);
        assert_eq!(first.end_position(), 32);

        let last = snap.get_samples(97, 100, 0).unwrap();
        assert_eq!(last.start_position, 96);
        assert_eq!(last.num_samples, 4);
        assert!(snap.get_samples(100, 101, 0).is_none());
    }

    #[test]
    fn test_get_sample_matches_input() {
        let bits = square(64, 3);
        let snap = LogicSnapshot::with_block_size(64, 16).with_channel(2, bits.clone());
        for (i, bit) in bits.iter().enumerate() {
            assert_eq!(snap.get_sample(i as u64, 2), *bit, "sample {}", i);
        }
    }

    #[test]
    fn test_missing_channel_has_no_data() {
        let snap = LogicSnapshot::new(10).with_channel(0, [true; 10]);
        assert!(snap.has_data(0));
        assert!(!snap.has_data(1));
        assert!(snap.get_samples(0, 10, 1).is_none());
        assert!(!snap.get_sample(3, 1));
    }

    #[test]
    fn test_block_size_rounds_to_bytes() {
        assert_eq!(LogicSnapshot::with_block_size(10, 3).samples_per_block(), 8);
        assert_eq!(LogicSnapshot::with_block_size(10, 9).samples_per_block(), 16);
    }

    #[test]
    fn test_static_source_limits_signal_index() {
        let snap: Arc<dyn SampleSnapshot> = Arc::new(LogicSnapshot::new(8));
        let source = StaticSignalSource::new(LogicData::new(snap, 1_000_000), 4);
        assert!(source.logic_data(3).is_some());
        assert!(source.logic_data(4).is_none());
        assert!(LogicSnapshot::new(0).is_empty());
    }
}
