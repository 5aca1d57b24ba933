pub mod retry;
pub mod whisper;

pub use retry::{transcribe_chunks, transcribe_with_retry, RetryPolicy};
pub use whisper::{WhisperClient, WhisperModel};

use crate::audio::AudioArtifact;
use crate::error::Result;
use async_trait::async_trait;

/// Ordered transcript lines in the spoken language.
///
/// Line order is the temporal order reported by the service. An empty
/// transcript is what silence produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript {
    pub lines: Vec<String>,
    pub language: String,
}

impl Transcript {
    pub fn new(lines: Vec<String>, language: impl Into<String>) -> Self {
        Self {
            lines,
            language: language.into(),
        }
    }

    pub fn empty(language: impl Into<String>) -> Self {
        Self::new(Vec::new(), language)
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe speech in `language` (ISO 639-1) from the audio artifact.
    async fn transcribe(&self, audio: &AudioArtifact, language: &str) -> Result<Transcript>;
    fn name(&self) -> &'static str;

    /// Largest audio file accepted in one request. Longer recordings are
    /// split into chunks below this size.
    fn max_upload_bytes(&self) -> Option<u64> {
        None
    }
}
