//! MOD format parsing for the modplay tracker player.
//!
//! Parses ProTracker-family module files into the mp-ir structures.

mod loader;

pub use loader::load_module;

use core::fmt;

/// Which loading stage failed.
///
/// Parsing fails fast: the first failing stage aborts the load and no
/// partially constructed module escapes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadError {
    /// Signature/title region truncated or unreadable
    Header,
    /// Sample header table truncated
    SampleHeader,
    /// Order count/restart/order region truncated
    OrderList,
    /// Pattern cell data truncated
    Pattern,
    /// Sample PCM data truncated
    SampleData,
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            LoadError::Header => "header",
            LoadError::SampleHeader => "sample headers",
            LoadError::OrderList => "order list",
            LoadError::Pattern => "pattern data",
            LoadError::SampleData => "sample data",
        };
        write!(f, "module load failed at {}", stage)
    }
}

impl std::error::Error for LoadError {}
