//! Staged MOD module parser.
//!
//! Fixed-offset layout, big-endian throughout:
//!
//! | Field          | Offset        | Size            |
//! |----------------|---------------|-----------------|
//! | Title          | 0             | 20              |
//! | Sample headers | 20            | 30 x N          |
//! | Order count    | after samples | 1               |
//! | Restart byte   | +1            | 1               |
//! | Order region   | +2            | 128             |
//! | Format tag     | +130          | 4 (extended)    |
//! | Pattern data   | next          | 1024 x patterns |
//! | Sample PCM     | after that    | sum of lengths  |
//!
//! N is 15 for legacy (Ultimate Soundtracker era) files, 31 when a
//! printable 4-byte format tag is present at offset 1080.

use arrayvec::ArrayString;
use mp_ir::{quirks, Module, Note, Pattern, Sample, TrackerQuirks, MAX_ORDERS, ROWS_PER_PATTERN};

use crate::LoadError;

const TAG_OFFSET: usize = 1080;
const LEGACY_SAMPLES: usize = 15;
const EXTENDED_SAMPLES: usize = 31;

/// Byte cursor over the module stream.
struct Reader<'a> {
    data: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    fn bytes(&mut self, n: usize) -> Option<&'a [u8]> {
        if n > self.data.len() {
            return None;
        }
        let (head, tail) = self.data.split_at(n);
        self.data = tail;
        Some(head)
    }

    fn array<const N: usize>(&mut self) -> Option<&'a [u8; N]> {
        let (head, tail) = self.data.split_first_chunk()?;
        self.data = tail;
        Some(head)
    }

    fn u8(&mut self) -> Option<u8> {
        let (&byte, tail) = self.data.split_first()?;
        self.data = tail;
        Some(byte)
    }

    fn u16_be(&mut self) -> Option<u16> {
        self.array().copied().map(u16::from_be_bytes)
    }

    fn u32_be(&mut self) -> Option<u32> {
        self.array().copied().map(u32::from_be_bytes)
    }
}

/// Parse a module from raw bytes.
pub fn load_module(data: &[u8]) -> Result<Module, LoadError> {
    let extended = is_extended(data);
    let sample_count = if extended { EXTENDED_SAMPLES } else { LEGACY_SAMPLES };

    let mut reader = Reader::new(data);

    // Stage 1: title.
    let title = fixed_string::<20>(reader.bytes(20).ok_or(LoadError::Header)?);

    // Stage 2: sample headers. PCM lengths are known here; the data
    // itself sits after the patterns.
    let mut samples = Vec::with_capacity(sample_count);
    let mut pcm_lengths = Vec::with_capacity(sample_count);
    for _ in 0..sample_count {
        let (sample, length) = parse_sample_header(&mut reader).ok_or(LoadError::SampleHeader)?;
        samples.push(sample);
        pcm_lengths.push(length);
    }

    // Stage 3: order count, restart byte, fixed 128-byte order region.
    // The whole region is consumed; only the first `order_count`
    // entries are active, and the pattern count is derived from the
    // active entries alone.
    let order_count = reader.u8().ok_or(LoadError::OrderList)? as usize;
    let restart = reader.u8().ok_or(LoadError::OrderList)?;
    let region = reader.bytes(MAX_ORDERS).ok_or(LoadError::OrderList)?;
    let orders: Vec<u8> = region[..order_count.min(MAX_ORDERS)].to_vec();
    let pattern_count = orders.iter().copied().max().map_or(0, |max| max as usize + 1);

    // Stage 4: format tag (extended files only). Unknown tags are a
    // diagnostic, not a failure; they fall back to the legacy default.
    let quirks = if extended {
        let tag = reader.array::<4>().ok_or(LoadError::Header)?;
        match quirks::resolve(tag) {
            Some(q) => q,
            None => {
                log::warn!(
                    "unknown format tag {:?}; assuming 4 channels",
                    String::from_utf8_lossy(tag)
                );
                TrackerQuirks::default()
            }
        }
    } else {
        TrackerQuirks::default()
    };

    // Stage 5: pattern cells.
    let mut patterns = Vec::with_capacity(pattern_count);
    for _ in 0..pattern_count {
        patterns.push(parse_pattern(&mut reader, quirks.channels)?);
    }

    // Stage 6: sample PCM, concatenated in slot order.
    for (sample, length) in samples.iter_mut().zip(pcm_lengths) {
        if length == 0 {
            continue;
        }
        let pcm = reader.bytes(length).ok_or(LoadError::SampleData)?;
        sample.data = pcm.iter().map(|&b| b as i8).collect();
    }

    Ok(Module {
        title,
        samples,
        patterns,
        orders,
        restart,
        channels: quirks.channels,
        quirks: quirks.effects,
    })
}

/// Extended files carry a printable 4-byte tag at offset 1080.
fn is_extended(data: &[u8]) -> bool {
    data.get(TAG_OFFSET..TAG_OFFSET + 4)
        .is_some_and(|tag| tag.iter().all(|&b| (32..=126).contains(&b)))
}

/// One 30-byte sample header. Lengths and loop fields are stored in
/// words and doubled to bytes, so they are always even.
fn parse_sample_header(reader: &mut Reader) -> Option<(Sample, usize)> {
    let name = fixed_string::<22>(reader.bytes(22)?);
    let length = reader.u16_be()? as usize * 2;
    let finetune = reader.u8()? & 0x0F;
    let volume = reader.u8()?.min(64);
    let mut loop_start = reader.u16_be()? as u32 * 2;
    let mut loop_len = reader.u16_be()? as u32 * 2;

    // A one-word loop is the stock "no loop" marker.
    if loop_len <= 2 {
        loop_len = 0;
    }
    // Clamp loop bounds into the sample (common in real files).
    if loop_start as usize >= length {
        loop_start = 0;
        loop_len = 0;
    } else if loop_start as usize + loop_len as usize > length {
        loop_len = length as u32 - loop_start;
    }

    let sample = Sample {
        name,
        finetune,
        volume,
        loop_start,
        loop_len,
        data: Vec::new(),
    };
    Some((sample, length))
}

fn parse_pattern(reader: &mut Reader, channels: usize) -> Result<Pattern, LoadError> {
    let mut pattern = Pattern::new(channels);
    for row in 0..ROWS_PER_PATTERN {
        for channel in 0..channels {
            let cell = reader.u32_be().ok_or(LoadError::Pattern)?;
            *pattern.cell_mut(row, channel) = Note::from_packed(cell);
        }
    }
    Ok(pattern)
}

/// Fixed-width text field: stops at the first NUL, drops control
/// bytes, trims trailing padding spaces.
fn fixed_string<const N: usize>(raw: &[u8]) -> ArrayString<N> {
    let mut text = ArrayString::new();
    for &byte in raw {
        if byte == 0 {
            break;
        }
        if byte.is_ascii() && !byte.is_ascii_control() {
            let _ = text.try_push(byte as char);
        }
    }
    while text.ends_with(' ') {
        text.pop();
    }
    text
}
