use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use hound::{SampleFormat, WavReader};
use tracing::{debug, info};

use crate::command::{run_tool, stderr_tail};
use crate::error::{Result, SubtitlerError};
use crate::video::VideoAsset;

use super::{AudioArtifact, AudioExtractor, AudioFormat, TRANSCRIPTION_FORMAT};

/// Arguments for converting `input` to the transcription WAV at `output`.
pub fn extraction_args(input: &Path, output: &Path) -> Vec<std::ffi::OsString> {
    let mut args: Vec<std::ffi::OsString> = ["-nostdin", "-y", "-i"]
        .iter()
        .map(Into::into)
        .collect();
    args.push(input.into());
    args.extend(
        [
            "-vn".to_string(),
            "-acodec".to_string(),
            "pcm_s16le".to_string(),
            "-ar".to_string(),
            TRANSCRIPTION_FORMAT.sample_rate.to_string(),
            "-ac".to_string(),
            TRANSCRIPTION_FORMAT.channels.to_string(),
            "-f".to_string(),
            "wav".to_string(),
        ]
        .into_iter()
        .map(Into::into),
    );
    args.push(output.into());
    args
}

/// Read the header of a WAV file.
pub fn read_wav_info(path: &Path) -> Result<(AudioFormat, Duration)> {
    let reader = WavReader::open(path)?;
    let spec = reader.spec();
    if spec.sample_format != SampleFormat::Int {
        return Err(SubtitlerError::ExtractionTool(
            "Extracted audio is not integer PCM".to_string(),
        ));
    }
    let format = AudioFormat {
        sample_rate: spec.sample_rate,
        bits_per_sample: spec.bits_per_sample,
        channels: spec.channels,
    };
    let duration = if spec.sample_rate == 0 {
        Duration::ZERO
    } else {
        Duration::from_secs_f64(reader.duration() as f64 / spec.sample_rate as f64)
    };
    Ok((format, duration))
}

/// Audio extraction through the ffmpeg CLI.
pub struct FfmpegExtractor {
    ffmpeg: String,
}

impl FfmpegExtractor {
    pub fn new(ffmpeg: impl Into<String>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
        }
    }
}

impl Default for FfmpegExtractor {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

#[async_trait]
impl AudioExtractor for FfmpegExtractor {
    async fn extract(&self, video: &VideoAsset, dest: &Path) -> Result<AudioArtifact> {
        if let Err(e) = tokio::fs::File::open(&video.path).await {
            return Err(SubtitlerError::UnreadableInput(format!(
                "{}: {e}",
                video.path.display()
            )));
        }

        info!("Extracting audio from {}", video.path.display());

        let output = run_tool(&self.ffmpeg, extraction_args(&video.path, dest))
            .await
            .map_err(|e| SubtitlerError::ExtractionTool(format!("Failed to run FFmpeg: {e}")))?;

        if !output.status.success() {
            return Err(SubtitlerError::ExtractionTool(format!(
                "FFmpeg exited with {}: {}",
                output.status,
                stderr_tail(&output)
            )));
        }

        if !tokio::fs::try_exists(dest).await.unwrap_or(false) {
            return Err(SubtitlerError::ExtractionTool(
                "Output file was not created".to_string(),
            ));
        }

        let wav_path = dest.to_path_buf();
        let (format, duration) = tokio::task::spawn_blocking(move || read_wav_info(&wav_path))
            .await?
            .map_err(|e| SubtitlerError::ExtractionTool(format!("Unreadable WAV output: {e}")))?;

        if format != TRANSCRIPTION_FORMAT {
            return Err(SubtitlerError::ExtractionTool(format!(
                "Extracted audio is {:?}, expected {:?}",
                format, TRANSCRIPTION_FORMAT
            )));
        }

        debug!("Extracted {:.1}s of audio", duration.as_secs_f64());
        info!("Audio extracted to {}", dest.display());

        Ok(AudioArtifact {
            path: dest.to_path_buf(),
            format,
            duration,
        })
    }
}
