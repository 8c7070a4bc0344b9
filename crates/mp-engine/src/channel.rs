//! Per-channel playback state.

use mp_ir::Sample;

use crate::period::{clamp_period, period_to_increment, PERIOD_MAX, PERIOD_MIN};

/// Mixing and effect state for a single tracker channel.
///
/// A note cell latches its period, sample and volume here; effects then
/// mutate the live values between rows. The cursor into sample data is
/// 16.16 fixed-point with 48 integer bits, so long samples never wrap.
#[derive(Clone, Debug, Default)]
pub struct ChannelState {
    /// Cursor into sample data (16.16 fixed-point)
    pub position: u64,
    /// Per-output-frame cursor step (16.16 fixed-point)
    pub increment: u32,
    /// Is the channel currently playing?
    pub playing: bool,

    /// 1-based index of the latched sample (0 = none yet)
    pub latched_sample: u8,
    /// Finetune row of the latched sample (0..15)
    pub finetune: u8,
    /// Table column of the latched note, for arpeggio re-entry
    pub note_col: Option<usize>,

    /// Current period, already finetune-corrected
    pub live_period: u16,
    /// Current volume (0..64)
    pub volume: u8,
    /// Effect command of the current row
    pub effect: u8,
    /// Effect argument of the current row
    pub argument: u8,

    /// Tone portamento destination period
    pub target_period: u16,
    /// Tone portamento speed (remembered across rows)
    pub porta_speed: u8,

    /// Vibrato speed (remembered across rows)
    pub vibrato_speed: u8,
    /// Vibrato depth (remembered across rows)
    pub vibrato_depth: u8,
    /// Vibrato table position (6-bit, half cycle per 32 steps)
    pub vibrato_phase: u8,

    /// Per-tick period offset from vibrato or arpeggio
    pub period_offset: i16,

    /// Has the cursor entered the sample's loop region?
    pub in_loop: bool,
    /// Completed loop passes
    pub loop_count: u32,
}

impl ChannelState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restart sample playback from the top.
    pub fn trigger(&mut self) {
        self.position = 0;
        self.playing = true;
        self.period_offset = 0;
        self.vibrato_phase = 0;
        self.in_loop = false;
        self.loop_count = 0;
    }

    pub fn set_volume(&mut self, volume: u8) {
        self.volume = volume.min(64);
    }

    /// Add a signed delta to the volume, clamping to 0..64.
    pub fn slide_volume(&mut self, delta: i16) {
        self.volume = (self.volume as i16 + delta).clamp(0, 64) as u8;
    }

    /// Add a signed delta to the live period, clamping to the playable
    /// range. Silent channels (period 0) are left untouched.
    pub fn slide_period(&mut self, delta: i32) {
        if self.live_period == 0 {
            return;
        }
        self.live_period = (self.live_period as i32 + delta)
            .clamp(PERIOD_MIN as i32, PERIOD_MAX as i32) as u16;
    }

    /// Step the live period toward the tone portamento target.
    pub fn tone_porta_step(&mut self) {
        if self.target_period == 0 || self.live_period == 0 {
            return;
        }
        let speed = self.porta_speed as u16;
        if self.live_period < self.target_period {
            self.live_period = (self.live_period + speed).min(self.target_period);
        } else {
            self.live_period = self
                .live_period
                .saturating_sub(speed)
                .max(self.target_period);
        }
    }

    /// Recompute the increment from the live period plus the per-tick
    /// vibrato/arpeggio offset.
    pub fn update_increment(&mut self, sample_rate: u32) {
        if self.live_period == 0 {
            self.increment = 0;
            return;
        }
        let effective =
            clamp_period((self.live_period as i32 + self.period_offset as i32).max(1) as u16);
        self.increment = period_to_increment(effective, sample_rate);
    }

    /// Read the next sample value and advance the cursor.
    ///
    /// Returns the 8-bit PCM value scaled to 16-bit, before volume.
    /// Looped samples wrap the cursor back into the loop region;
    /// one-shot samples stop the channel at the end of data.
    pub fn next_value(&mut self, sample: &Sample) -> i16 {
        if !self.playing || sample.is_empty() {
            return 0;
        }
        let index = (self.position >> 16) as usize;
        let value = match sample.data.get(index) {
            Some(v) => (*v as i16) << 8,
            None => 0,
        };
        self.position += self.increment as u64;

        let frame = self.position >> 16;
        if sample.has_loop() {
            if frame >= sample.loop_end() as u64 {
                let base = (sample.loop_start as u64) << 16;
                let span = (sample.loop_len as u64) << 16;
                self.position = base + (self.position - base) % span;
                self.in_loop = true;
                self.loop_count += 1;
            }
        } else if frame >= sample.len() as u64 {
            self.playing = false;
        }
        value
    }
}
