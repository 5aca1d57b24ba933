use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::command::{run_tool, stderr_tail};
use crate::error::{Result, SubtitlerError};

use super::{VideoAsset, VideoProbe};

/// Reads duration and frame rate with ffprobe.
pub struct FfprobeProbe {
    ffprobe: String,
}

impl FfprobeProbe {
    pub fn new(ffprobe: impl Into<String>) -> Self {
        Self {
            ffprobe: ffprobe.into(),
        }
    }
}

impl Default for FfprobeProbe {
    fn default() -> Self {
        Self::new("ffprobe")
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    r_frame_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Parse an ffprobe rational like `30000/1001`.
pub fn parse_frame_rate(value: &str) -> Option<f64> {
    let (num, den) = match value.split_once('/') {
        Some((n, d)) => (n.trim().parse::<f64>().ok()?, d.trim().parse::<f64>().ok()?),
        None => (value.trim().parse::<f64>().ok()?, 1.0),
    };
    if den == 0.0 || num <= 0.0 {
        return None;
    }
    Some(num / den)
}

fn parse_probe_output(input: &Path, stdout: &[u8]) -> Result<VideoAsset> {
    let parsed: ProbeOutput = serde_json::from_slice(stdout)
        .map_err(|e| SubtitlerError::Input(format!("Unparseable ffprobe output: {e}")))?;

    let stream = parsed.streams.first().ok_or_else(|| {
        SubtitlerError::Input(format!("{} has no video stream", input.display()))
    })?;

    let duration_str = parsed
        .format
        .and_then(|f| f.duration)
        .ok_or_else(|| SubtitlerError::Input("ffprobe reported no duration".to_string()))?;

    let duration_secs: f64 = duration_str.trim().parse().map_err(|e| {
        SubtitlerError::Input(format!("Failed to parse duration '{}': {e}", duration_str.trim()))
    })?;

    if !duration_secs.is_finite() || duration_secs <= 0.0 {
        return Err(SubtitlerError::Input(format!(
            "Video duration must be positive, got {duration_secs}"
        )));
    }

    Ok(VideoAsset {
        path: input.to_path_buf(),
        duration: Duration::from_secs_f64(duration_secs),
        frame_rate: stream.r_frame_rate.as_deref().and_then(parse_frame_rate),
    })
}

#[async_trait]
impl VideoProbe for FfprobeProbe {
    async fn probe(&self, input: &Path) -> Result<VideoAsset> {
        if !input.is_file() {
            return Err(SubtitlerError::Input(format!(
                "File not found: {}",
                input.display()
            )));
        }

        let mut args: Vec<std::ffi::OsString> = [
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "format=duration:stream=r_frame_rate",
            "-of",
            "json",
        ]
        .iter()
        .map(Into::into)
        .collect();
        args.push(input.into());

        let output = run_tool(&self.ffprobe, args)
            .await
            .map_err(|e| SubtitlerError::Input(format!("Failed to run FFprobe: {e}")))?;

        if !output.status.success() {
            return Err(SubtitlerError::Input(format!(
                "FFprobe failed: {}",
                stderr_tail(&output)
            )));
        }

        let asset = parse_probe_output(input, &output.stdout)?;
        debug!(
            "Probed {}: {:.2}s at {:?} fps",
            input.display(),
            asset.duration.as_secs_f64(),
            asset.frame_rate
        );
        Ok(asset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frame_rate() {
        assert_eq!(parse_frame_rate("25/1"), Some(25.0));
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert_eq!(parse_frame_rate("24"), Some(24.0));
        assert_eq!(parse_frame_rate("0/0"), None);
        assert_eq!(parse_frame_rate("abc"), None);
    }

    #[test]
    fn test_parse_probe_output() {
        let json = br#"{
            "programs": [],
            "streams": [{"r_frame_rate": "30/1"}],
            "format": {"duration": "10.500000"}
        }"#;
        let asset = parse_probe_output(Path::new("clip.mp4"), json).unwrap();
        assert_eq!(asset.duration, Duration::from_millis(10_500));
        assert_eq!(asset.frame_rate, Some(30.0));
    }

    #[test]
    fn test_parse_probe_output_without_video_stream() {
        let json = br#"{"streams": [], "format": {"duration": "3.0"}}"#;
        let result = parse_probe_output(Path::new("song.mp3"), json);
        assert!(matches!(result, Err(SubtitlerError::Input(_))));
    }

    #[test]
    fn test_parse_probe_output_zero_duration() {
        let json = br#"{"streams": [{"r_frame_rate": "25/1"}], "format": {"duration": "0.0"}}"#;
        assert!(parse_probe_output(Path::new("x.mp4"), json).is_err());
    }

    #[tokio::test]
    async fn test_probe_missing_file() {
        let probe = FfprobeProbe::default();
        let result = probe.probe(Path::new("/nonexistent/clip.mp4")).await;
        match result {
            Err(SubtitlerError::Input(msg)) => assert!(msg.contains("nonexistent")),
            other => panic!("Expected Input error, got: {other:?}"),
        }
    }
}
