//! Subtitle composition through ffmpeg.
//!
//! Cues are burned into the picture with the `subtitles` filter and the
//! original audio is copied through unchanged, including under every cue.
//! No soft subtitle track is written. When there are no cues the streams are
//! copied without re-encoding.

use std::ffi::OsString;
use std::path::Path;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::command::{run_tool, stderr_tail};
use crate::error::{Result, SubtitlerError};

use super::{VideoAsset, VideoComposer};

/// Escape a path for use as the `subtitles` filter's filename.
///
/// The value is escaped once for the filter option and once more for the
/// filtergraph, following ffmpeg's quoting rules.
pub fn escape_filter_path(path: &Path) -> String {
    let raw = path.to_string_lossy();

    let mut option = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '\\' | '\'' | ':') {
            option.push('\\');
        }
        option.push(c);
    }

    let mut graph = String::with_capacity(option.len());
    for c in option.chars() {
        if matches!(c, '\\' | '\'' | '[' | ']' | ',' | ';') {
            graph.push('\\');
        }
        graph.push(c);
    }
    graph
}

/// ffmpeg arguments for writing `dest` from `input`.
pub fn compose_args(input: &Path, subtitles: Option<&Path>, dest: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-nostdin".into(), "-y".into(), "-i".into(), input.into()];
    args.extend(["-map", "0:v:0", "-map", "0:a?"].iter().map(OsString::from));

    match subtitles {
        Some(srt) => {
            args.push("-vf".into());
            args.push(format!("subtitles={}", escape_filter_path(srt)).into());
            args.extend(["-c:a", "copy"].iter().map(OsString::from));
        }
        None => {
            args.extend(["-c", "copy"].iter().map(OsString::from));
        }
    }

    args.extend(["-f", "mp4"].iter().map(OsString::from));
    args.push(dest.into());
    args
}

/// Burns subtitles into the video with the ffmpeg CLI.
pub struct FfmpegComposer {
    ffmpeg: String,
}

impl FfmpegComposer {
    pub fn new(ffmpeg: impl Into<String>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
        }
    }
}

impl Default for FfmpegComposer {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

#[async_trait]
impl VideoComposer for FfmpegComposer {
    async fn compose(
        &self,
        video: &VideoAsset,
        subtitles: Option<&Path>,
        dest: &Path,
    ) -> Result<()> {
        match subtitles {
            Some(srt) => info!("Burning {} into {}", srt.display(), video.path.display()),
            None => info!("No cues, copying {} without overlay", video.path.display()),
        }

        let output = run_tool(&self.ffmpeg, compose_args(&video.path, subtitles, dest))
            .await
            .map_err(|e| SubtitlerError::Compose(format!("Failed to run FFmpeg: {e}")))?;

        if !output.status.success() {
            return Err(SubtitlerError::Compose(format!(
                "FFmpeg exited with {}: {}",
                output.status,
                stderr_tail(&output)
            )));
        }

        let written = tokio::fs::metadata(dest)
            .await
            .map(|m| m.len())
            .unwrap_or(0);
        if written == 0 {
            return Err(SubtitlerError::Compose(
                "FFmpeg produced no output".to_string(),
            ));
        }

        debug!("Composed {} bytes to {}", written, dest.display());
        Ok(())
    }
}
