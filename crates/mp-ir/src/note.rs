//! Packed pattern cell decoding.

/// One pattern cell: what a single channel plays on a single row.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Note {
    /// 12-bit hardware period; 0 = no note.
    pub period: u16,
    /// 1-based sample slot; 0 = no sample change.
    pub sample: u8,
    /// Effect command (4-bit).
    pub effect: u8,
    /// Effect argument.
    pub argument: u8,
}

impl Note {
    /// Decode a big-endian packed cell.
    ///
    /// Cell layout (as stored on disk):
    /// byte 0 = sample high nibble | period bits 8..11,
    /// byte 1 = period bits 0..7,
    /// byte 2 = sample low nibble | effect command,
    /// byte 3 = effect argument.
    pub fn from_packed(cell: u32) -> Self {
        Self {
            period: ((cell >> 16) & 0x0FFF) as u16,
            sample: (((cell >> 24) & 0xF0) | ((cell >> 12) & 0x0F)) as u8,
            effect: ((cell >> 8) & 0x0F) as u8,
            argument: (cell & 0xFF) as u8,
        }
    }

    /// Re-encode into the packed big-endian cell form.
    /// Inverse of [`Note::from_packed`] for in-range fields.
    pub fn pack(&self) -> u32 {
        ((self.sample as u32 & 0xF0) << 24)
            | ((self.period as u32 & 0x0FFF) << 16)
            | ((self.sample as u32 & 0x0F) << 12)
            | ((self.effect as u32 & 0x0F) << 8)
            | self.argument as u32
    }

    /// True when the cell carries no note, sample, or effect.
    pub fn is_empty(&self) -> bool {
        self.period == 0 && self.sample == 0 && self.effect == 0 && self.argument == 0
    }
}
