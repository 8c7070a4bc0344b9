//! Per-tick PCM rendering.

use alloc::vec;
use alloc::vec::Vec;

use mp_ir::Module;

use crate::channel::ChannelState;
use crate::frame::Frame;

/// How channels are placed in the stereo field.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MixMode {
    /// All channels centered.
    #[default]
    Mono,
    /// Amiga hard panning: channels 1 and 4 of each group of four go
    /// left, channels 2 and 3 go right.
    AmigaStereo,
}

impl MixMode {
    fn weights(&self, channel: usize) -> (bool, bool) {
        match self {
            MixMode::Mono => (true, true),
            MixMode::AmigaStereo => match channel & 3 {
                0 | 3 => (true, false),
                _ => (false, true),
            },
        }
    }
}

/// Render one tick's worth of frames from the channel states.
///
/// Each channel contributes `sample_value * volume / 64`; channel sums
/// accumulate in 32 bits and clamp to the 16-bit frame on output.
pub fn render_tick(
    channels: &mut [ChannelState],
    module: &Module,
    frames: usize,
    mix: MixMode,
) -> Vec<Frame> {
    let mut left = vec![0i32; frames];
    let mut right = vec![0i32; frames];

    for (index, channel) in channels.iter_mut().enumerate() {
        if !channel.playing {
            continue;
        }
        let sample = match module.sample(channel.latched_sample) {
            Some(s) => s,
            None => continue,
        };
        let (to_left, to_right) = mix.weights(index);
        let volume = channel.volume.min(64) as i32;
        for i in 0..frames {
            if !channel.playing {
                break;
            }
            let value = (channel.next_value(sample) as i32 * volume) >> 6;
            if to_left {
                left[i] += value;
            }
            if to_right {
                right[i] += value;
            }
        }
    }

    left.into_iter()
        .zip(right)
        .map(|(l, r)| Frame {
            left: l.clamp(-32768, 32767) as i16,
            right: r.clamp(-32768, 32767) as i16,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mp_ir::{EffectQuirks, Sample};

    fn module_with_sample(value: i8, len: usize) -> Module {
        Module {
            title: Default::default(),
            samples: vec![Sample {
                data: vec![value; len],
                volume: 64,
                ..Default::default()
            }],
            patterns: Vec::new(),
            orders: Vec::new(),
            restart: 0,
            channels: 4,
            quirks: EffectQuirks::empty(),
        }
    }

    fn playing_channel() -> ChannelState {
        let mut ch = ChannelState::new();
        ch.trigger();
        ch.latched_sample = 1;
        ch.volume = 64;
        ch.increment = 1 << 16;
        ch
    }

    #[test]
    fn idle_channels_render_silence() {
        let module = module_with_sample(64, 16);
        let mut channels = vec![ChannelState::new(); 4];
        let frames = render_tick(&mut channels, &module, 8, MixMode::Mono);
        assert_eq!(frames.len(), 8);
        assert!(frames.iter().all(Frame::is_silent));
    }

    #[test]
    fn mono_mix_sums_channels_into_both_sides() {
        let module = module_with_sample(32, 16);
        let mut channels = vec![playing_channel(), playing_channel()];
        let frames = render_tick(&mut channels, &module, 4, MixMode::Mono);
        // Two channels of 32 << 8 at full volume.
        let expected = (32i16 << 8) * 2;
        assert!(frames.iter().all(|f| f.left == expected && f.right == expected));
    }

    #[test]
    fn amiga_stereo_pans_hard() {
        let module = module_with_sample(32, 16);
        let mut channels = vec![
            playing_channel(),
            playing_channel(),
            playing_channel(),
            playing_channel(),
        ];
        let frames = render_tick(&mut channels, &module, 4, MixMode::AmigaStereo);
        let expected = (32i16 << 8) * 2;
        assert!(frames.iter().all(|f| f.left == expected && f.right == expected));

        let mut only_first = vec![playing_channel()];
        let frames = render_tick(&mut only_first, &module, 4, MixMode::AmigaStereo);
        assert!(frames.iter().all(|f| f.left == 32i16 << 8 && f.right == 0));
    }

    #[test]
    fn volume_scales_output() {
        let module = module_with_sample(64, 16);
        let mut channels = vec![playing_channel()];
        channels[0].volume = 32;
        let frames = render_tick(&mut channels, &module, 2, MixMode::Mono);
        assert_eq!(frames[0].left, (64i32 << 8) as i16 / 2);
    }

    #[test]
    fn sum_clamps_to_sixteen_bits() {
        let module = module_with_sample(127, 16);
        let mut channels = vec![playing_channel(); 4];
        let frames = render_tick(&mut channels, &module, 2, MixMode::Mono);
        assert_eq!(frames[0].left, 32767);
    }

    #[test]
    fn channel_past_sample_end_goes_quiet() {
        let module = module_with_sample(64, 2);
        let mut channels = vec![playing_channel()];
        let frames = render_tick(&mut channels, &module, 6, MixMode::Mono);
        assert_ne!(frames[0].left, 0);
        assert_ne!(frames[1].left, 0);
        assert!(frames[2..].iter().all(Frame::is_silent));
        assert!(!channels[0].playing);
    }
}
