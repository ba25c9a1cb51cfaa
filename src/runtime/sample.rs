//! Packed logic sample windows handed to decoders

use std::fmt;
use std::sync::Arc;

/// A contiguous run of packed-bit samples from a single channel
///
/// Snapshots store logic data in fixed-size blocks. A read returns the block
/// covering the requested start position, so a window may end before the
/// position the caller asked for; the feed loop shrinks its chunk to the
/// shortest window across all channels.
///
/// ## Bit Packing Format
///
/// LSB-first within each byte: bit N is at `data[N/8] >> (N%8) & 1`, where N
/// is counted from `start_position`.
#[derive(Clone, Debug)]
pub struct SampleBlock {
    /// Packed bit data (LSB-first). Shared via Arc so snapshots hand out windows without copying.
    pub data: Arc<[u8]>,
    /// Position of the first sample in this block (0-based, global sample index)
    pub start_position: u64,
    /// Number of valid samples in this block
    pub num_samples: usize,
}

impl SampleBlock {
    /// Create a new SampleBlock
    pub fn new(data: Arc<[u8]>, start_position: u64, num_samples: usize) -> Self {
        Self {
            data,
            start_position,
            num_samples,
        }
    }

    /// O(1) bit lookup: get the boolean value at a given position within this block.
    ///
    /// `position` is a global sample index. Returns None outside
    /// `[self.start_position, self.end_position())`.
    #[inline]
    pub fn get_bit(&self, position: u64) -> Option<bool> {
        if !self.contains(position) {
            return None;
        }
        let local = (position - self.start_position) as usize;
        let byte = *self.data.get(local / 8)?;
        Some((byte >> (local % 8)) & 1 == 1)
    }

    /// Whether `position` falls inside this block
    #[inline]
    pub fn contains(&self, position: u64) -> bool {
        position >= self.start_position && position < self.end_position()
    }

    /// The position one past the last valid sample in this block
    #[inline]
    pub fn end_position(&self) -> u64 {
        self.start_position + self.num_samples as u64
    }
}

impl fmt::Display for SampleBlock {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "SampleBlock[start={}, samples={}, bytes={}]",
            self.start_position,
            self.num_samples,
            self.data.len()
        )
    }
}

/// Sample data for one decoder channel within a chunk
#[derive(Clone, Debug)]
pub struct ChannelData {
    /// Window holding the chunk's samples for this channel
    pub block: SampleBlock,
    /// Channel level at the first sample of the chunk
    pub initial: bool,
}

/// A bounded window of per-channel sample data fed to a decoder in one step
///
/// Channels are indexed in the decoder's declaration order: required
/// channels first, then optional ones. Unbound optional channels are `None`.
pub struct LogicChunk<'a> {
    start: u64,
    end: u64,
    channels: &'a [Option<ChannelData>],
}

impl<'a> LogicChunk<'a> {
    pub fn new(start: u64, end: u64, channels: &'a [Option<ChannelData>]) -> Self {
        Self {
            start,
            end,
            channels,
        }
    }

    /// First sample position of the chunk
    pub fn start(&self) -> u64 {
        self.start
    }

    /// One past the last sample position of the chunk
    pub fn end(&self) -> u64 {
        self.end
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Whether the decoder channel at `channel` is bound to a signal
    pub fn is_bound(&self, channel: usize) -> bool {
        matches!(self.channels.get(channel), Some(Some(_)))
    }

    /// Level of `channel` at the chunk start
    pub fn initial(&self, channel: usize) -> Option<bool> {
        self.channels.get(channel)?.as_ref().map(|c| c.initial)
    }

    /// Level of `channel` at global sample `position`
    ///
    /// Returns None for unbound channels and positions outside the chunk.
    pub fn sample(&self, channel: usize, position: u64) -> Option<bool> {
        if position < self.start || position >= self.end {
            return None;
        }
        self.channels.get(channel)?.as_ref()?.block.get_bit(position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(bits: &[bool], start: u64) -> SampleBlock {
        let mut data = vec![0u8; bits.len().div_ceil(8)];
        for (i, &b) in bits.iter().enumerate() {
            if b {
                data[i / 8] |= 1 << (i % 8);
            }
        }
        SampleBlock::new(Arc::from(data), start, bits.len())
    }

    #[test]
    fn test_get_bit_lsb_first() {
        let b = block(&[true, false, false, true, false, false, false, false, true], 100);
        assert_eq!(b.get_bit(100), Some(true));
        assert_eq!(b.get_bit(101), Some(false));
        assert_eq!(b.get_bit(103), Some(true));
        assert_eq!(b.get_bit(108), Some(true));
        assert_eq!(b.get_bit(109), None);
        assert_eq!(b.get_bit(99), None);
        assert_eq!(b.end_position(), 109);
    }

    #[test]
    fn test_chunk_bounds_and_unbound_channels() {
        let channels = vec![
            Some(ChannelData {
                block: block(&[false, true, true, false], 0),
                initial: false,
            }),
            None,
        ];
        let chunk = LogicChunk::new(1, 3, &channels);
        assert_eq!(chunk.len(), 2);
        assert!(chunk.is_bound(0));
        assert!(!chunk.is_bound(1));
        assert_eq!(chunk.sample(0, 0), None);
        assert_eq!(chunk.sample(0, 1), Some(true));
        assert_eq!(chunk.sample(0, 3), None);
        assert_eq!(chunk.sample(1, 1), None);
        assert_eq!(chunk.initial(0), Some(false));
    }
}
