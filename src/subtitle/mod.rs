pub mod cue;
pub mod srt;

pub use cue::{build_cues, validate_cues};
pub use srt::{format_srt, format_timestamp};

use std::time::Duration;

/// One timed subtitle entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitleCue {
    /// 1-based position in the cue sequence.
    pub index: usize,
    pub start: Duration,
    pub end: Duration,
    pub text: String,
}
