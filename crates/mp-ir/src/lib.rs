//! Parsed-module data model for the modplay tracker player.
//!
//! The format parser (mp-formats) emits these types and the playback
//! engine (mp-engine) consumes them. A `Module` is built once by the
//! parser and is immutable afterwards.
//!
//! Designed to be `no_std` compatible with the `alloc` crate.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod module;
mod note;
pub mod quirks;

pub use module::{Module, Pattern, Sample, MAX_ORDERS, ROWS_PER_PATTERN};
pub use note::Note;
pub use quirks::{EffectQuirks, TrackerQuirks};
