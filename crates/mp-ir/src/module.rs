//! Structural module data: samples, patterns, orders.

use alloc::{vec, vec::Vec};
use arrayvec::ArrayString;

use crate::note::Note;
use crate::quirks::EffectQuirks;

/// Every pattern holds exactly 64 rows.
pub const ROWS_PER_PATTERN: usize = 64;

/// The order list region is a fixed 128 bytes on disk.
pub const MAX_ORDERS: usize = 128;

/// A sampled instrument and its raw 8-bit signed PCM data.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Sample {
    /// Sample name (fixed-width, space/zero padded on disk)
    pub name: ArrayString<22>,
    /// Raw finetune nibble (0..15); row index into the period table
    pub finetune: u8,
    /// Default volume (0..64)
    pub volume: u8,
    /// Loop start in bytes (word-derived, always even)
    pub loop_start: u32,
    /// Loop length in bytes; 0 = no loop
    pub loop_len: u32,
    /// Signed 8-bit PCM
    pub data: Vec<i8>,
}

impl Sample {
    /// Length of the sample in frames (bytes for 8-bit PCM).
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the sample has no data.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns true if the sample has a loop region.
    pub fn has_loop(&self) -> bool {
        self.loop_len > 0
    }

    /// Loop end offset (exclusive). Meaningful only when `has_loop()`.
    pub fn loop_end(&self) -> u32 {
        self.loop_start + self.loop_len
    }

    /// Finetune as the signed -8..=7 value the nibble encodes.
    pub fn finetune_signed(&self) -> i8 {
        if self.finetune > 7 {
            self.finetune as i8 - 16
        } else {
            self.finetune as i8
        }
    }
}

/// 64 rows of one [`Note`] per channel, stored row-major.
#[derive(Clone, Debug, PartialEq)]
pub struct Pattern {
    channels: usize,
    cells: Vec<Note>,
}

impl Pattern {
    /// Create an empty pattern for the given channel count.
    pub fn new(channels: usize) -> Self {
        Self {
            channels,
            cells: vec![Note::default(); ROWS_PER_PATTERN * channels],
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn cell(&self, row: usize, channel: usize) -> &Note {
        &self.cells[row * self.channels + channel]
    }

    pub fn cell_mut(&mut self, row: usize, channel: usize) -> &mut Note {
        &mut self.cells[row * self.channels + channel]
    }

    /// All notes of one row, one per channel.
    pub fn row(&self, row: usize) -> &[Note] {
        &self.cells[row * self.channels..(row + 1) * self.channels]
    }
}

/// A fully parsed module: samples, patterns, order list, metadata.
///
/// Immutable after parsing; playback holds it behind `Arc` and only
/// reads, so song metadata can be inspected concurrently.
#[derive(Clone, Debug, PartialEq)]
pub struct Module {
    pub title: ArrayString<20>,
    pub samples: Vec<Sample>,
    pub patterns: Vec<Pattern>,
    /// Active order list: up to 128 pattern indices.
    pub orders: Vec<u8>,
    /// Restart position from the order header. Retained, but playback
    /// stops at order-list exhaustion rather than looping to it.
    pub restart: u8,
    pub channels: usize,
    pub quirks: EffectQuirks,
}

impl Module {
    /// Look up a sample by its 1-based pattern cell index.
    /// Index 0 ("no sample") and out-of-range slots return None.
    pub fn sample(&self, index: u8) -> Option<&Sample> {
        index.checked_sub(1).and_then(|i| self.samples.get(i as usize))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_indexing_is_row_major() {
        let mut pat = Pattern::new(4);
        pat.cell_mut(1, 2).period = 428;
        assert_eq!(pat.cell(1, 2).period, 428);
        assert_eq!(pat.row(1)[2].period, 428);
        assert_eq!(pat.row(0)[2].period, 0);
    }

    #[test]
    fn finetune_nibble_sign_extends() {
        let mut s = Sample::default();
        s.finetune = 7;
        assert_eq!(s.finetune_signed(), 7);
        s.finetune = 8;
        assert_eq!(s.finetune_signed(), -8);
        s.finetune = 15;
        assert_eq!(s.finetune_signed(), -1);
        s.finetune = 0;
        assert_eq!(s.finetune_signed(), 0);
    }

    #[test]
    fn sample_lookup_is_one_based() {
        let module = Module {
            title: ArrayString::new(),
            samples: vec![Sample::default()],
            patterns: Vec::new(),
            orders: Vec::new(),
            restart: 0,
            channels: 4,
            quirks: EffectQuirks::empty(),
        };
        assert!(module.sample(0).is_none());
        assert!(module.sample(1).is_some());
        assert!(module.sample(2).is_none());
    }
}
