use crate::job::JobId;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SubtitlerError {
    #[error("Invalid input: {0}")]
    Input(String),

    #[error("Unreadable input: {0}")]
    UnreadableInput(String),

    #[error("Extraction tool failed: {0}")]
    ExtractionTool(String),

    #[error("Transcription failed: {0}")]
    Transcription(String),

    #[error("Translation failed: {0}")]
    Translation(String),

    #[error("Cue building failed: {0}")]
    CueBuild(String),

    #[error("Compose failed: {0}")]
    Compose(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("API error ({status}): {message}")]
    ApiStatus { status: u16, message: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl SubtitlerError {
    /// Whether a retry of the same call could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SubtitlerError::ApiStatus { status, .. } => *status >= 500 || *status == 429,
            SubtitlerError::Http(e) => !e.is_builder() && !e.is_decode(),
            SubtitlerError::Timeout(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, SubtitlerError>;

/// The pipeline stage an error was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Setup,
    Probe,
    Extract,
    Transcribe,
    Translate,
    BuildCues,
    Compose,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Setup => "setup",
            Stage::Probe => "probe",
            Stage::Extract => "extract",
            Stage::Transcribe => "transcribe",
            Stage::Translate => "translate",
            Stage::BuildCues => "build-cues",
            Stage::Compose => "compose",
        };
        f.write_str(name)
    }
}

/// Caller-facing classification of a pipeline failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Setup,
    Input,
    Extraction,
    Transcription,
    Translation,
    CueBuild,
    Compose,
    Cancelled,
}

/// A stage failure, tagged with the job and stage it happened in.
#[derive(Error, Debug)]
#[error("job {job_id} failed during {stage}: {source}")]
pub struct PipelineError {
    pub job_id: JobId,
    pub stage: Stage,
    #[source]
    pub source: SubtitlerError,
}

impl PipelineError {
    pub fn new(job_id: JobId, stage: Stage, source: SubtitlerError) -> Self {
        Self {
            job_id,
            stage,
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        if matches!(self.source, SubtitlerError::Cancelled) {
            return ErrorKind::Cancelled;
        }
        match self.stage {
            Stage::Setup => ErrorKind::Setup,
            Stage::Probe => ErrorKind::Input,
            Stage::Extract => ErrorKind::Extraction,
            Stage::Transcribe => ErrorKind::Transcription,
            Stage::Translate => ErrorKind::Translation,
            Stage::BuildCues => ErrorKind::CueBuild,
            Stage::Compose => ErrorKind::Compose,
        }
    }
}
