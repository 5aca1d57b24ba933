//! Cue timing for transcripts without per-line timestamps.
//!
//! The playable duration is split evenly across the non-empty lines: with
//! `D` milliseconds and `N` lines, line `i` covers `[i*D/N, (i+1)*D/N)`.
//! Integer milliseconds keep the result exact and deterministic.

use std::time::Duration;

use super::SubtitleCue;
use crate::error::{Result, SubtitlerError};
use crate::translate::TranslatedTranscript;

/// Allocate timestamps to the transcript's non-empty lines.
///
/// An empty transcript yields no cues.
pub fn build_cues(
    transcript: &TranslatedTranscript,
    video_duration: Duration,
) -> Result<Vec<SubtitleCue>> {
    let lines: Vec<&str> = transcript
        .lines
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect();

    if lines.is_empty() {
        return Ok(Vec::new());
    }

    let total_ms = video_duration.as_millis();
    let count = lines.len() as u128;

    let cues: Vec<SubtitleCue> = lines
        .into_iter()
        .enumerate()
        .map(|(i, text)| {
            let i = i as u128;
            let start = i * total_ms / count;
            let end = ((i + 1) * total_ms / count).min(total_ms);
            SubtitleCue {
                index: i as usize + 1,
                start: millis(start),
                end: millis(end),
                text: text.to_string(),
            }
        })
        .collect();

    validate_cues(&cues, video_duration)?;
    Ok(cues)
}

fn millis(ms: u128) -> Duration {
    Duration::from_millis(ms as u64)
}

/// Check numbering, ordering and bounds of a cue sequence.
pub fn validate_cues(cues: &[SubtitleCue], video_duration: Duration) -> Result<()> {
    let mut previous_end = Duration::ZERO;

    for (i, cue) in cues.iter().enumerate() {
        if cue.index != i + 1 {
            return Err(SubtitlerError::CueBuild(format!(
                "Cue {} has sequence number {}",
                i + 1,
                cue.index
            )));
        }
        if cue.start >= cue.end {
            return Err(SubtitlerError::CueBuild(format!(
                "Cue {} is empty ({:?} >= {:?}); {} cues do not fit in {:?}",
                cue.index,
                cue.start,
                cue.end,
                cues.len(),
                video_duration
            )));
        }
        if cue.start < previous_end {
            return Err(SubtitlerError::CueBuild(format!(
                "Cue {} overlaps the previous cue",
                cue.index
            )));
        }
        previous_end = cue.end;
    }

    if previous_end > video_duration {
        return Err(SubtitlerError::CueBuild(format!(
            "Last cue ends at {:?}, after the video ({:?})",
            previous_end, video_duration
        )));
    }

    Ok(())
}
