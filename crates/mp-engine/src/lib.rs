//! Playback engine for the modplay tracker player.
//!
//! Steps a parsed module through the tick/row/order state machine and
//! renders each tick into stereo PCM frames.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod channel;
mod frame;
mod mixer;
mod period;
mod sequencer;

pub use channel::ChannelState;
pub use frame::Frame;
pub use mixer::MixMode;
pub use period::{clamp_period, period_to_increment, PeriodTable, PERIOD_MAX, PERIOD_MIN};
pub use sequencer::{Position, Sequencer, DEFAULT_BPM, DEFAULT_TICKS_PER_ROW};
