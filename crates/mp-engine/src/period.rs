//! Amiga period table and period-to-increment conversion.
//!
//! ProTracker stores pitch as Paula period values. Each sample carries
//! a finetune nibble selecting one of 16 detuned copies of the 36-note
//! period table. The table is generated from the NTSC master clock
//! rather than embedded as literals; a handful of entries that the
//! derivation rounds the wrong way get patched afterwards to match the
//! values ProTracker actually shipped.

use libm::pow;

/// Paula NTSC master clock in Hz.
const NTSC_CLOCK: f64 = 3_579_545.0;

/// Reference period: C-1 at finetune 0.
const REF_PERIOD_PT: f64 = 856.0;

/// Notes per finetune row (three octaves).
pub const NOTES: usize = 36;

/// Finetune rows: 0..=7 are finetunes 0..+7, 8..=15 are -8..-1.
pub const FINETUNES: usize = 16;

/// Lowest allowed period (highest pitch, B-3).
pub const PERIOD_MIN: u16 = 113;

/// Highest allowed period (lowest pitch, C-1).
pub const PERIOD_MAX: u16 = 856;

/// Clamp a period to the playable range.
pub fn clamp_period(period: u16) -> u16 {
    period.clamp(PERIOD_MIN, PERIOD_MAX)
}

/// Convert a period to a 16.16 fixed-point sample increment.
///
/// The playback frequency of a period is `NTSC_CLOCK / period`; the
/// increment is that frequency resampled to the output rate.
pub fn period_to_increment(period: u16, sample_rate: u32) -> u32 {
    if period == 0 || sample_rate == 0 {
        return 0;
    }
    let freq = NTSC_CLOCK / period as f64;
    (freq * 65536.0 / sample_rate as f64) as u32
}

/// The 16x36 finetuned period table.
pub struct PeriodTable {
    periods: [[u16; NOTES]; FINETUNES],
}

fn pow2(x: f64) -> f64 {
    pow(2.0, x)
}

fn round(x: f64) -> u16 {
    (x + 0.5) as u16
}

impl PeriodTable {
    /// Generate the table from the NTSC clock.
    ///
    /// Rows 1..=7 and 9..=15 step down from a starting period one
    /// semitone above C-1, detuned by eighths of a semitone per row.
    /// Row 0 is rebuilt against the Ultimate Soundtracker reference
    /// rate (with the lowest nine entries taken as exact octave
    /// doublings), and row 8 (finetune -8) is row 0 shifted by one
    /// semitone. Nine entries still round one off from the shipped
    /// ProTracker table and are patched by hand.
    pub fn new() -> Self {
        let ref_period_ust = NTSC_CLOCK / 523.3 / 8.0;
        let ust_to_pt_ratio = ref_period_ust / REF_PERIOD_PT;
        let semitone_step = pow2(-1.0 / 12.0);
        let tune_step = pow2(-1.0 / 8.0 / 12.0);

        let mut periods = [[0u16; NOTES]; FINETUNES];
        let mut p1 = REF_PERIOD_PT / semitone_step;
        for t in 0..8 {
            let mut p2 = p1;
            for n in 0..NOTES {
                periods[t + 8][n] = round(p2);
                p2 *= semitone_step;
                periods[t][n] = round(p2);
                if t == 0 {
                    periods[0][n] = round(p2 * ust_to_pt_ratio);
                }
            }
            p1 *= tune_step;
        }
        // Octave-halved periods for finetune 0 are exact doublings.
        for n in 0..9 {
            periods[0][n] = periods[0][n + 12] * 2;
        }
        // Finetune -8 is finetune 0 shifted one semitone down.
        for n in 1..NOTES {
            periods[8][n] = periods[0][n - 1];
        }
        // Entries the derivation rounds the wrong way.
        periods[1][4] -= 1;
        periods[1][22] += 1;
        periods[1][24] += 1;
        periods[2][23] += 1;
        periods[4][9] += 1;
        periods[7][24] += 1;
        periods[9][6] -= 1;
        periods[9][26] -= 1;
        periods[12][34] -= 1;

        Self { periods }
    }

    /// Column of `period` in the finetune-0 row, if it is a table note.
    pub fn note_index(&self, period: u16) -> Option<usize> {
        (0..NOTES).find(|&n| self.periods[0][n] == period)
    }

    /// Period at a finetune row and note column (column clamped).
    pub fn period_at(&self, finetune: u8, index: usize) -> u16 {
        self.periods[(finetune & 0x0F) as usize][index.min(NOTES - 1)]
    }

    /// Map a stored note period to its finetuned equivalent.
    ///
    /// `period` must be a finetune-0 table value (which is what note
    /// cells contain); anything else returns 0.
    pub fn correct_period(&self, period: u16, finetune: u8) -> u16 {
        match self.note_index(period) {
            Some(n) => self.period_at(finetune, n),
            None => 0,
        }
    }
}

impl Default for PeriodTable {
    fn default() -> Self {
        Self::new()
    }
}
