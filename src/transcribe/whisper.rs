use crate::audio::{detect_silence, AudioArtifact, DEFAULT_SILENCE_THRESHOLD};
use crate::config::Config;
use crate::error::{Result, SubtitlerError};
use crate::transcribe::{Transcriber, Transcript};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use tokio::fs;
use tracing::{debug, info};

/// OpenAI API base URL.
const OPENAI_BASE_URL: &str = "https://api.openai.com";

/// Transcription endpoint path.
const TRANSCRIPTIONS_PATH: &str = "/v1/audio/transcriptions";

/// Maximum file size for Whisper API (25 MB).
pub const MAX_FILE_SIZE: u64 = 25 * 1024 * 1024;

/// Whisper model variants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WhisperModel {
    #[default]
    #[serde(rename = "whisper-1")]
    Whisper1,
    #[serde(rename = "gpt-4o-transcribe")]
    Gpt4oTranscribe,
    #[serde(rename = "gpt-4o-mini-transcribe")]
    Gpt4oMiniTranscribe,
}

impl WhisperModel {
    fn as_str(&self) -> &'static str {
        match self {
            WhisperModel::Whisper1 => "whisper-1",
            WhisperModel::Gpt4oTranscribe => "gpt-4o-transcribe",
            WhisperModel::Gpt4oMiniTranscribe => "gpt-4o-mini-transcribe",
        }
    }
}

impl FromStr for WhisperModel {
    type Err = SubtitlerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "whisper-1" => Ok(WhisperModel::Whisper1),
            "gpt-4o-transcribe" => Ok(WhisperModel::Gpt4oTranscribe),
            "gpt-4o-mini-transcribe" => Ok(WhisperModel::Gpt4oMiniTranscribe),
            other => Err(SubtitlerError::Config(format!(
                "Unknown Whisper model '{other}'"
            ))),
        }
    }
}

/// OpenAI Whisper API client.
///
/// Holds only connection settings; the spoken language is passed per call.
pub struct WhisperClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: WhisperModel,
    silence_threshold: f32,
    max_upload_bytes: u64,
}

impl WhisperClient {
    /// Create a new Whisper client with the given API key.
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: OPENAI_BASE_URL.to_string(),
            model: WhisperModel::default(),
            silence_threshold: DEFAULT_SILENCE_THRESHOLD,
            max_upload_bytes: MAX_FILE_SIZE,
        }
    }

    /// Client with the key, model and limits from `config`.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.openai_api_key.clone().unwrap_or_default())
            .with_model(config.whisper_model)
            .with_silence_threshold(config.silence_threshold)
            .with_max_upload_bytes(config.max_upload_bytes)
    }

    /// Set the model to use.
    pub fn with_model(mut self, model: WhisperModel) -> Self {
        self.model = model;
        self
    }

    /// Point the client at a different API host.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// RMS level below which audio is treated as silence.
    pub fn with_silence_threshold(mut self, threshold: f32) -> Self {
        self.silence_threshold = threshold;
        self
    }

    /// Largest file sent in one request.
    pub fn with_max_upload_bytes(mut self, bytes: u64) -> Self {
        self.max_upload_bytes = bytes;
        self
    }

    /// Build the multipart form for the API request.
    async fn build_form(&self, audio_path: &Path, language: &str) -> Result<Form> {
        let file_bytes = fs::read(audio_path).await?;
        let file_name = audio_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audio.wav")
            .to_string();

        let file_part = Part::bytes(file_bytes)
            .file_name(file_name)
            .mime_str("audio/wav")?;

        Ok(Form::new()
            .part("file", file_part)
            .text("model", self.model.as_str())
            .text("response_format", "verbose_json")
            .text("timestamp_granularities[]", "segment")
            .text("language", language.to_string()))
    }

    /// Make the API request.
    async fn call_api(&self, form: Form) -> Result<WhisperResponse> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, TRANSCRIPTIONS_PATH))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        debug!("Whisper API response status: {}", status);

        if status.is_success() {
            let body = response.text().await?;
            debug!("Whisper API response: {}", truncate(&body, 500));
            let parsed: WhisperResponse = serde_json::from_str(&body)?;
            return Ok(parsed);
        }

        // Handle error responses
        let error_body = response.text().await.unwrap_or_default();

        let message = match serde_json::from_str::<ApiErrorResponse>(&error_body) {
            Ok(api_error) => format!("{} ({})", api_error.error.message, api_error.error.r#type),
            Err(_) => error_body,
        };

        Err(SubtitlerError::ApiStatus {
            status: status.as_u16(),
            message,
        })
    }
}

/// Convert a Whisper API response into transcript lines.
fn parse_response(response: WhisperResponse, language: &str) -> Transcript {
    let lines: Vec<String> = match response.segments {
        Some(segments) => segments
            .into_iter()
            .map(|seg| seg.text.trim().to_string())
            .filter(|text| !text.is_empty())
            .collect(),
        None => {
            let text = response.text.trim();
            if text.is_empty() {
                Vec::new()
            } else {
                vec![text.to_string()]
            }
        }
    };

    Transcript::new(lines, language)
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[async_trait]
impl Transcriber for WhisperClient {
    async fn transcribe(&self, audio: &AudioArtifact, language: &str) -> Result<Transcript> {
        debug!("Transcribing {:?} with Whisper", audio.path);

        if detect_silence(&audio.path, self.silence_threshold).await? {
            info!("Audio is silent, skipping transcription request");
            return Ok(Transcript::empty(language));
        }

        let metadata = fs::metadata(&audio.path).await?;
        if metadata.len() > self.max_upload_bytes {
            return Err(SubtitlerError::Transcription(format!(
                "File too large for Whisper API: {} bytes (max {} bytes)",
                metadata.len(),
                self.max_upload_bytes
            )));
        }

        let form = self.build_form(&audio.path, language).await?;
        let response = self.call_api(form).await?;
        let transcript = parse_response(response, language);

        debug!("Whisper returned {} lines", transcript.lines.len());

        Ok(transcript)
    }

    fn name(&self) -> &'static str {
        "OpenAI Whisper"
    }

    fn max_upload_bytes(&self) -> Option<u64> {
        Some(self.max_upload_bytes)
    }
}

// API response types

#[derive(Debug, Deserialize)]
struct WhisperResponse {
    #[serde(default)]
    text: String,
    #[serde(default)]
    segments: Option<Vec<WhisperSegment>>,
}

#[derive(Debug, Deserialize)]
struct WhisperSegment {
    text: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
    #[serde(default)]
    r#type: String,
}
