pub mod chunk;
pub mod extract;
pub mod silence;

pub use chunk::{plan_upload, split_wav};
pub use extract::FfmpegExtractor;
pub use silence::{detect_silence, is_silent, DEFAULT_SILENCE_THRESHOLD};

use crate::error::Result;
use crate::video::VideoAsset;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// PCM layout of an extracted audio artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    pub channels: u16,
}

/// The format the transcription service expects: 16kHz, 16-bit, mono WAV.
pub const TRANSCRIPTION_FORMAT: AudioFormat = AudioFormat {
    sample_rate: 16_000,
    bits_per_sample: 16,
    channels: 1,
};

/// An extracted audio file owned by a job.
#[derive(Debug, Clone)]
pub struct AudioArtifact {
    pub path: PathBuf,
    pub format: AudioFormat,
    pub duration: Duration,
}

#[async_trait]
pub trait AudioExtractor: Send + Sync {
    /// Write the video's audio track to `dest` in [`TRANSCRIPTION_FORMAT`].
    async fn extract(&self, video: &VideoAsset, dest: &Path) -> Result<AudioArtifact>;
}
