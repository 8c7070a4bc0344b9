//! Tick/row/order playback state machine.
//!
//! Playback is pull-based: each [`Sequencer::tick`] call runs one
//! tracker tick (row latching on tick 0, per-tick effects after) and
//! returns the rendered frames for it. `None` marks the end of the
//! song, either because the order list ran out or because a stop was
//! requested; a stop always lands on a tick boundary so the audio
//! backend never sees a partial chunk.

use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

use mp_ir::{Module, Note, ROWS_PER_PATTERN};

use crate::channel::ChannelState;
use crate::frame::Frame;
use crate::mixer::{render_tick, MixMode};
use crate::period::PeriodTable;

/// Default ticks per row (speed).
pub const DEFAULT_TICKS_PER_ROW: u32 = 6;

/// Default tempo in BPM.
pub const DEFAULT_BPM: u32 = 125;

/// ProTracker vibrato waveform: half a sine cycle over 32 steps.
const VIBRATO_TABLE: [u8; 32] = [
    0, 24, 49, 74, 97, 120, 141, 161, 180, 197, 212, 224, 235, 244, 250, 253, 255, 253, 250, 244,
    235, 224, 212, 197, 180, 161, 141, 120, 97, 74, 49, 24,
];

/// Where playback currently is in the song.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Position {
    pub order: usize,
    pub pattern: usize,
    pub row: usize,
}

/// Row-transition request collected from tick-0 effects.
#[derive(Clone, Copy, Debug, Default)]
enum Flow {
    /// Next row, or next order after row 63
    #[default]
    Advance,
    /// Next order, starting at the given row
    Break(usize),
    /// Jump to an order position, row 0
    Jump(usize),
    /// Re-enter the current pattern at the given row
    Loop(usize),
}

/// Steps a module through playback one tick at a time.
pub struct Sequencer {
    module: Arc<Module>,
    periods: PeriodTable,
    channels: Vec<ChannelState>,
    sample_rate: u32,
    mix: MixMode,

    ticks_per_row: u32,
    bpm: u32,
    tick: u32,
    order: usize,
    row: usize,
    flow: Flow,

    /// Loop target row set by E60
    loop_row: usize,
    /// Remaining pattern-loop passes
    loop_count: u32,

    finished: bool,
    stop_requested: bool,
}

impl Sequencer {
    pub fn new(module: Arc<Module>, sample_rate: u32) -> Self {
        let channels = vec![ChannelState::new(); module.channels];
        Self {
            module,
            periods: PeriodTable::new(),
            channels,
            sample_rate,
            mix: MixMode::default(),
            ticks_per_row: DEFAULT_TICKS_PER_ROW,
            bpm: DEFAULT_BPM,
            tick: 0,
            order: 0,
            row: 0,
            flow: Flow::Advance,
            loop_row: 0,
            loop_count: 0,
            finished: false,
            stop_requested: false,
        }
    }

    pub fn with_mix_mode(mut self, mix: MixMode) -> Self {
        self.mix = mix;
        self
    }

    /// Request a stop; the next `tick` call returns `None`.
    pub fn stop(&mut self) {
        self.stop_requested = true;
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn position(&self) -> Position {
        let pattern = self.module.orders.get(self.order).copied().unwrap_or(0) as usize;
        Position {
            order: self.order,
            pattern,
            row: self.row,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Output frames rendered per tick at the current tempo.
    pub fn samples_per_tick(&self) -> usize {
        (self.sample_rate as u64 * 5 / (self.bpm as u64 * 2)) as usize
    }

    /// Run one tick and render its frames. `None` when playback is over.
    pub fn tick(&mut self) -> Option<Vec<Frame>> {
        if self.stop_requested {
            self.finished = true;
        }
        if self.finished || self.order >= self.module.orders.len() {
            self.finished = true;
            return None;
        }

        if self.tick == 0 {
            self.flow = self.latch_row();
        } else {
            self.process_effects();
        }
        for channel in &mut self.channels {
            channel.update_increment(self.sample_rate);
        }
        let samples = self.samples_per_tick();
        let frames = render_tick(&mut self.channels, &self.module, samples, self.mix);

        self.tick += 1;
        if self.tick >= self.ticks_per_row {
            self.tick = 0;
            self.advance_row();
        }
        Some(frames)
    }

    /// Latch the current row into the channels and collect flow control.
    ///
    /// When several channels request a transition on the same row the
    /// rightmost one wins.
    fn latch_row(&mut self) -> Flow {
        let module = Arc::clone(&self.module);
        let pattern_index = module.orders[self.order] as usize;
        let pattern = match module.patterns.get(pattern_index) {
            Some(p) => p,
            None => return Flow::Advance,
        };
        let mut flow = Flow::Advance;
        for index in 0..self.channels.len() {
            let note = *pattern.cell(self.row, index);
            if let Some(requested) = self.latch_cell(index, &note, &module) {
                flow = requested;
            }
        }
        flow
    }

    fn latch_cell(&mut self, index: usize, note: &Note, module: &Module) -> Option<Flow> {
        if note.sample != 0 {
            let channel = &mut self.channels[index];
            channel.latched_sample = note.sample;
            if let Some(sample) = module.sample(note.sample) {
                channel.volume = sample.volume.min(64);
                channel.finetune = sample.finetune;
            }
        }

        {
            let channel = &mut self.channels[index];
            channel.effect = note.effect;
            channel.argument = note.argument;
            channel.period_offset = 0;
        }

        if note.period != 0 {
            let finetune = self.channels[index].finetune;
            let corrected = self.periods.correct_period(note.period, finetune);
            let column = self.periods.note_index(note.period);
            let channel = &mut self.channels[index];
            if note.effect == 0x3 || note.effect == 0x5 {
                // Tone portamento: the note sets the target without
                // retriggering the sample.
                if corrected != 0 {
                    channel.target_period = corrected;
                }
            } else {
                channel.live_period = corrected;
                channel.note_col = column;
                channel.trigger();
                if corrected == 0 {
                    channel.playing = false;
                }
            }
        }

        self.apply_tick0_effect(index)
    }

    fn apply_tick0_effect(&mut self, index: usize) -> Option<Flow> {
        let effect = self.channels[index].effect;
        let argument = self.channels[index].argument;
        match effect {
            0x3 => {
                if argument != 0 {
                    self.channels[index].porta_speed = argument;
                }
                None
            }
            0x4 => {
                let channel = &mut self.channels[index];
                if argument >> 4 != 0 {
                    channel.vibrato_speed = argument >> 4;
                }
                if argument & 0x0F != 0 {
                    channel.vibrato_depth = argument & 0x0F;
                }
                None
            }
            0xB => Some(Flow::Jump(argument as usize)),
            0xC => {
                self.channels[index].set_volume(argument);
                None
            }
            0xD => {
                // Argument is BCD: high nibble tens, low nibble ones.
                let row = (argument >> 4) as usize * 10 + (argument & 0x0F) as usize;
                Some(Flow::Break(row.min(ROWS_PER_PATTERN - 1)))
            }
            0xE => self.apply_extended_tick0(index),
            0xF => {
                if argument != 0 {
                    if argument < 0x20 {
                        self.ticks_per_row = argument as u32;
                    } else {
                        self.bpm = argument as u32;
                    }
                }
                None
            }
            _ => None,
        }
    }

    fn apply_extended_tick0(&mut self, index: usize) -> Option<Flow> {
        let argument = self.channels[index].argument;
        let value = argument & 0x0F;
        match argument >> 4 {
            0x1 => {
                self.channels[index].slide_period(-(value as i32));
                None
            }
            0x2 => {
                self.channels[index].slide_period(value as i32);
                None
            }
            0x6 => self.pattern_loop(value),
            0xA => {
                self.channels[index].slide_volume(value as i16);
                None
            }
            0xB => {
                self.channels[index].slide_volume(-(value as i16));
                None
            }
            0xC => {
                if value == 0 {
                    self.channels[index].volume = 0;
                }
                None
            }
            _ => None,
        }
    }

    /// E60 marks the loop start; E6x jumps back x times.
    fn pattern_loop(&mut self, count: u8) -> Option<Flow> {
        if count == 0 {
            self.loop_row = self.row;
            return None;
        }
        if self.loop_count == 0 {
            self.loop_count = count as u32;
            return Some(Flow::Loop(self.loop_row));
        }
        self.loop_count -= 1;
        if self.loop_count > 0 {
            Some(Flow::Loop(self.loop_row))
        } else {
            None
        }
    }

    /// Per-tick effects, run on every tick after the first of a row.
    fn process_effects(&mut self) {
        for index in 0..self.channels.len() {
            let effect = self.channels[index].effect;
            let argument = self.channels[index].argument;
            match effect {
                0x0 if argument != 0 => self.arpeggio(index, argument),
                0x1 => self.channels[index].slide_period(-(argument as i32)),
                0x2 => self.channels[index].slide_period(argument as i32),
                0x3 => self.channels[index].tone_porta_step(),
                0x4 => self.vibrato(index),
                0x5 => {
                    self.channels[index].tone_porta_step();
                    self.volume_slide(index, argument);
                }
                0x6 => {
                    self.vibrato(index);
                    self.volume_slide(index, argument);
                }
                0xA => self.volume_slide(index, argument),
                0xE => {
                    let value = (argument & 0x0F) as u32;
                    match argument >> 4 {
                        0x9 => {
                            if value != 0 && self.tick % value == 0 {
                                self.channels[index].trigger();
                            }
                        }
                        0xC => {
                            if self.tick == value {
                                self.channels[index].volume = 0;
                            }
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
        }
    }

    /// Arpeggio re-enters the period table at the latched note's column
    /// plus the cycling semitone offset, on the channel's finetune row.
    fn arpeggio(&mut self, index: usize, argument: u8) {
        let semitones = match self.tick % 3 {
            0 => 0,
            1 => (argument >> 4) as usize,
            _ => (argument & 0x0F) as usize,
        };
        let channel = &mut self.channels[index];
        let column = match channel.note_col {
            Some(c) => c,
            None => return,
        };
        if channel.live_period == 0 {
            return;
        }
        let effective = self.periods.period_at(channel.finetune, column + semitones);
        channel.period_offset = effective as i16 - channel.live_period as i16;
    }

    fn vibrato(&mut self, index: usize) {
        let channel = &mut self.channels[index];
        let step = (channel.vibrato_phase & 31) as usize;
        let mut delta = (VIBRATO_TABLE[step] as i32 * channel.vibrato_depth as i32) >> 7;
        if channel.vibrato_phase & 32 != 0 {
            delta = -delta;
        }
        channel.period_offset = delta as i16;
        channel.vibrato_phase = (channel.vibrato_phase + channel.vibrato_speed) & 63;
    }

    /// Axy: high nibble slides up, else low nibble slides down.
    fn volume_slide(&mut self, index: usize, argument: u8) {
        let up = (argument >> 4) as i16;
        let down = (argument & 0x0F) as i16;
        if up != 0 {
            self.channels[index].slide_volume(up);
        } else {
            self.channels[index].slide_volume(-down);
        }
    }

    fn advance_row(&mut self) {
        match core::mem::take(&mut self.flow) {
            Flow::Advance => {
                self.row += 1;
                if self.row >= ROWS_PER_PATTERN {
                    self.next_order(self.order + 1, 0);
                }
            }
            Flow::Loop(row) => self.row = row,
            Flow::Break(row) => self.next_order(self.order + 1, row),
            Flow::Jump(order) => self.next_order(order, 0),
        }
    }

    /// Enter a new order position. Pattern-loop state does not survive
    /// an order change.
    fn next_order(&mut self, order: usize, row: usize) {
        self.order = order;
        self.row = row;
        self.loop_row = 0;
        self.loop_count = 0;
        if self.order >= self.module.orders.len() {
            self.finished = true;
        }
    }

    #[cfg(test)]
    pub(crate) fn channel(&self, index: usize) -> Option<&ChannelState> {
        self.channels.get(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mp_ir::{EffectQuirks, Pattern, Sample};

    const SAMPLE_RATE: u32 = 44100;

    fn empty_module(patterns: usize, orders: &[u8]) -> Module {
        Module {
            title: Default::default(),
            samples: vec![
                Sample {
                    data: vec![64i8; 2000],
                    volume: 64,
                    loop_start: 0,
                    loop_len: 2000,
                    ..Default::default()
                };
                1
            ],
            patterns: (0..patterns).map(|_| Pattern::new(4)).collect(),
            orders: orders.to_vec(),
            restart: 0,
            channels: 4,
            quirks: EffectQuirks::empty(),
        }
    }

    fn set_cell(
        module: &mut Module,
        pattern: usize,
        row: usize,
        channel: usize,
        period: u16,
        sample: u8,
        effect: u8,
        argument: u8,
    ) {
        *module.patterns[pattern].cell_mut(row, channel) = Note {
            period,
            sample,
            effect,
            argument,
        };
    }

    fn sequencer(module: Module) -> Sequencer {
        Sequencer::new(Arc::new(module), SAMPLE_RATE)
    }

    #[test]
    fn empty_module_renders_exact_tick_count() {
        // 64 rows, 6 ticks per row, one order: 384 chunks of
        // 44100 * 5 / 250 = 882 frames, all silent.
        let mut seq = sequencer(empty_module(1, &[0]));
        let mut chunks = 0;
        while let Some(frames) = seq.tick() {
            assert_eq!(frames.len(), 882);
            assert!(frames.iter().all(Frame::is_silent));
            chunks += 1;
        }
        assert_eq!(chunks, 384);
        assert!(seq.is_finished());
        assert!(seq.tick().is_none());
    }

    #[test]
    fn note_latch_produces_audio() {
        let mut module = empty_module(1, &[0]);
        set_cell(&mut module, 0, 0, 0, 428, 1, 0, 0);
        let mut seq = sequencer(module);
        let frames = seq.tick().unwrap();
        assert!(frames.iter().any(|f| !f.is_silent()));
    }

    #[test]
    fn finetune_correction_applies_at_latch() {
        let mut module = empty_module(1, &[0]);
        module.samples[0].finetune = 8;
        set_cell(&mut module, 0, 0, 0, 856, 1, 0, 0);
        let mut seq = sequencer(module);
        seq.tick();
        assert_eq!(seq.channel(0).unwrap().live_period, 907);
    }

    #[test]
    fn set_volume_effect() {
        let mut module = empty_module(1, &[0]);
        set_cell(&mut module, 0, 0, 0, 428, 1, 0xC, 0x20);
        let mut seq = sequencer(module);
        seq.tick();
        assert_eq!(seq.channel(0).unwrap().volume, 0x20);
    }

    #[test]
    fn volume_slide_moves_per_tick() {
        let mut module = empty_module(1, &[0]);
        set_cell(&mut module, 0, 0, 0, 428, 1, 0xA, 0x02);
        let mut seq = sequencer(module);
        seq.tick();
        assert_eq!(seq.channel(0).unwrap().volume, 64);
        seq.tick();
        assert_eq!(seq.channel(0).unwrap().volume, 62);
        seq.tick();
        assert_eq!(seq.channel(0).unwrap().volume, 60);
    }

    #[test]
    fn speed_effect_shortens_rows() {
        let mut module = empty_module(1, &[0]);
        set_cell(&mut module, 0, 0, 0, 0, 0, 0xF, 0x03);
        let mut seq = sequencer(module);
        let mut chunks = 0;
        while seq.tick().is_some() {
            chunks += 1;
        }
        assert_eq!(chunks, 64 * 3);
    }

    #[test]
    fn bpm_effect_changes_chunk_size() {
        let mut module = empty_module(1, &[0]);
        set_cell(&mut module, 0, 0, 0, 0, 0, 0xF, 250);
        let mut seq = sequencer(module);
        let frames = seq.tick().unwrap();
        // 44100 * 5 / (250 * 2)
        assert_eq!(frames.len(), 441);
    }

    #[test]
    fn pattern_break_lands_on_target_row() {
        let mut module = empty_module(2, &[0, 1]);
        // Argument 0x13 is BCD for row 13.
        set_cell(&mut module, 0, 0, 0, 0, 0, 0xD, 0x13);
        let mut seq = sequencer(module);
        for _ in 0..6 {
            seq.tick();
        }
        assert_eq!(
            seq.position(),
            Position {
                order: 1,
                pattern: 1,
                row: 13
            }
        );
    }

    #[test]
    fn position_jump_moves_to_order() {
        let mut module = empty_module(2, &[0, 1]);
        set_cell(&mut module, 0, 0, 0, 0, 0, 0xB, 0x01);
        let mut seq = sequencer(module);
        for _ in 0..6 {
            seq.tick();
        }
        assert_eq!(
            seq.position(),
            Position {
                order: 1,
                pattern: 1,
                row: 0
            }
        );
    }

    #[test]
    fn jump_past_order_list_finishes() {
        let mut module = empty_module(1, &[0]);
        set_cell(&mut module, 0, 0, 0, 0, 0, 0xB, 0x05);
        let mut seq = sequencer(module);
        for _ in 0..6 {
            assert!(seq.tick().is_some());
        }
        assert!(seq.tick().is_none());
    }

    #[test]
    fn pattern_loop_replays_rows() {
        let mut module = empty_module(1, &[0]);
        set_cell(&mut module, 0, 0, 0, 0, 0, 0xE, 0x60);
        set_cell(&mut module, 0, 1, 0, 0, 0, 0xE, 0x62);
        let mut seq = sequencer(module);
        let mut chunks = 0;
        while seq.tick().is_some() {
            chunks += 1;
        }
        // Rows 0 and 1 play three times: 64 + 4 extra rows.
        assert_eq!(chunks, 68 * 6);
    }

    #[test]
    fn note_cut_zeroes_volume_mid_row() {
        let mut module = empty_module(1, &[0]);
        set_cell(&mut module, 0, 0, 0, 428, 1, 0xE, 0xC2);
        let mut seq = sequencer(module);
        seq.tick();
        assert_eq!(seq.channel(0).unwrap().volume, 64);
        seq.tick();
        assert_eq!(seq.channel(0).unwrap().volume, 64);
        seq.tick();
        assert_eq!(seq.channel(0).unwrap().volume, 0);
    }

    #[test]
    fn retrigger_restarts_sample() {
        let mut module = empty_module(1, &[0]);
        set_cell(&mut module, 0, 0, 0, 428, 1, 0xE, 0x93);
        let mut seq = sequencer(module);
        seq.tick();
        assert!(seq.channel(0).unwrap().position > 0);
        seq.tick();
        seq.tick();
        // Tick 3 is a multiple of the retrigger interval; the cursor
        // restarted and has advanced one tick at most.
        let after_three = seq.channel(0).unwrap().position;
        seq.tick();
        let after_retrigger = seq.channel(0).unwrap().position;
        assert!(after_retrigger < after_three);
    }

    #[test]
    fn arpeggio_offsets_by_table_column() {
        let mut module = empty_module(1, &[0]);
        set_cell(&mut module, 0, 0, 0, 428, 1, 0x0, 0x37);
        let mut seq = sequencer(module);
        seq.tick();
        assert_eq!(seq.channel(0).unwrap().period_offset, 0);
        seq.tick();
        // Three semitones above 428 is 360.
        assert_eq!(seq.channel(0).unwrap().period_offset, 360 - 428);
        seq.tick();
        // Seven semitones above 428 is 285.
        assert_eq!(seq.channel(0).unwrap().period_offset, 285 - 428);
    }

    #[test]
    fn arpeggio_clamps_at_table_top() {
        // 113 is the highest note (column 35); both nibble offsets run
        // past the table and pin to the same top entry, so the offset
        // stays zero instead of muting.
        let mut module = empty_module(1, &[0]);
        set_cell(&mut module, 0, 0, 0, 113, 1, 0x0, 0x37);
        let mut seq = sequencer(module);
        for _ in 0..4 {
            seq.tick();
            let channel = seq.channel(0).unwrap();
            assert!(channel.playing);
            assert_eq!(channel.period_offset, 0);
        }
    }

    #[test]
    fn vibrato_oscillates_around_zero() {
        // 4x8: speed 15, depth 8. Phase walks 0, 15, 30, 45, 60 across
        // the five effect ticks; entries past step 32 negate, so the
        // offset swings positive then negative within the row.
        let mut module = empty_module(1, &[0]);
        set_cell(&mut module, 0, 0, 0, 428, 1, 0x4, 0xF8);
        let mut seq = sequencer(module);
        seq.tick();
        assert_eq!(seq.channel(0).unwrap().period_offset, 0);
        seq.tick();
        // Phase 0: table peak not reached yet, offset stays zero.
        assert_eq!(seq.channel(0).unwrap().period_offset, 0);
        seq.tick();
        // Phase 15: 253 * 8 >> 7.
        assert_eq!(seq.channel(0).unwrap().period_offset, 15);
        seq.tick();
        assert_eq!(seq.channel(0).unwrap().period_offset, 3);
        seq.tick();
        // Phase 45 is in the negated half cycle.
        assert_eq!(seq.channel(0).unwrap().period_offset, -15);
        seq.tick();
        assert_eq!(seq.channel(0).unwrap().period_offset, -6);
    }

    #[test]
    fn vibrato_parameters_persist_across_rows() {
        // Row 0 sets speed 4 / depth 8; row 1 continues with 400,
        // which must reuse the remembered nibbles and running phase.
        let mut module = empty_module(1, &[0]);
        set_cell(&mut module, 0, 0, 0, 428, 1, 0x4, 0x48);
        set_cell(&mut module, 0, 1, 0, 0, 0, 0x4, 0x00);
        let mut seq = sequencer(module);
        for _ in 0..6 {
            seq.tick();
        }
        // Row 1 tick 0: latch clears the transient offset but keeps
        // the nibble memory.
        seq.tick();
        let channel = seq.channel(0).unwrap();
        assert_eq!(channel.vibrato_speed, 4);
        assert_eq!(channel.vibrato_depth, 8);
        assert_eq!(channel.period_offset, 0);
        seq.tick();
        // Phase carried over from row 0 (5 ticks at speed 4 = 20):
        // 235 * 8 >> 7.
        assert_eq!(seq.channel(0).unwrap().period_offset, 14);
    }

    #[test]
    fn tone_porta_approaches_target_without_retrigger() {
        let mut module = empty_module(1, &[0]);
        set_cell(&mut module, 0, 0, 0, 856, 1, 0, 0);
        set_cell(&mut module, 0, 1, 0, 428, 0, 0x3, 0x30);
        let mut seq = sequencer(module);
        for _ in 0..6 {
            seq.tick();
        }
        let position_before = seq.channel(0).unwrap().position;
        for _ in 0..6 {
            seq.tick();
        }
        let channel = seq.channel(0).unwrap();
        assert_eq!(channel.target_period, 428);
        // Five sliding ticks at speed 0x30.
        assert_eq!(channel.live_period, 856 - 5 * 0x30);
        assert!(channel.position > position_before, "no retrigger");
    }

    #[test]
    fn stop_lands_on_tick_boundary() {
        let mut module = empty_module(1, &[0]);
        set_cell(&mut module, 0, 0, 0, 428, 1, 0, 0);
        let mut seq = sequencer(module);
        assert!(seq.tick().is_some());
        seq.stop();
        assert!(seq.tick().is_none());
        assert!(seq.is_finished());
    }
}
