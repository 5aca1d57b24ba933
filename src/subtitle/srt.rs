// SRT subtitle format
use super::SubtitleCue;
use std::time::Duration;

/// Serialize cues as SRT: blocks of index, timing line and text, separated
/// by a blank line.
pub fn format_srt(cues: &[SubtitleCue]) -> String {
    cues.iter()
        .map(|cue| {
            format!(
                "{}\n{} --> {}\n{}\n",
                cue.index,
                format_timestamp(cue.start),
                format_timestamp(cue.end),
                cue_text(&cue.text)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// A blank line ends an SRT block, so drop blank lines inside the text.
fn cue_text(text: &str) -> String {
    text.lines()
        .map(str::trim_end)
        .filter(|l| !l.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// `HH:MM:SS,mmm`
pub fn format_timestamp(d: Duration) -> String {
    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    let millis = d.subsec_millis();
    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, seconds, millis)
}
