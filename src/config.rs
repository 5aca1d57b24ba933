use crate::audio::DEFAULT_SILENCE_THRESHOLD;
use crate::error::{Result, SubtitlerError};
use crate::transcribe::whisper::MAX_FILE_SIZE;
use crate::transcribe::WhisperModel;
use crate::translate::same_language;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Smallest upload limit that still holds a useful amount of audio.
const MIN_UPLOAD_BYTES: u64 = 64 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub openai_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    /// Language spoken in the input videos.
    pub source_language: String,
    /// Language subtitles are translated into when none is given.
    pub target_language: String,
    /// Root for per-job workspaces (defaults to the system temp dir).
    pub temp_dir: Option<PathBuf>,
    /// Upper bound for every external call.
    pub stage_timeout_secs: u64,
    pub transcription_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub translation_concurrency: usize,
    pub whisper_model: WhisperModel,
    /// RMS level below which extracted audio counts as silence.
    pub silence_threshold: f32,
    /// Audio larger than this is split before upload.
    pub max_upload_bytes: u64,
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            gemini_api_key: None,
            source_language: "en".to_string(),
            target_language: "es".to_string(),
            temp_dir: None,
            stage_timeout_secs: 600,
            transcription_attempts: 3,
            retry_base_delay_ms: 1000,
            translation_concurrency: 4,
            whisper_model: WhisperModel::default(),
            silence_threshold: DEFAULT_SILENCE_THRESHOLD,
            max_upload_bytes: MAX_FILE_SIZE,
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        // Load from config file if it exists
        if let Some(config_path) = Self::config_file_path() {
            if config_path.exists() {
                let contents = std::fs::read_to_string(&config_path)?;
                config = toml::from_str::<Config>(&contents).map_err(|e| {
                    SubtitlerError::Config(format!("{}: {e}", config_path.display()))
                })?;
            }
        }

        config.apply_env();
        Ok(config)
    }

    /// Override fields from environment variables.
    pub fn apply_env(&mut self) {
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            self.openai_api_key = Some(key);
        }
        if let Ok(key) = std::env::var("GEMINI_API_KEY") {
            self.gemini_api_key = Some(key);
        }
        if let Ok(lang) = std::env::var("SUBTITLER_SOURCE_LANGUAGE") {
            self.source_language = lang;
        }
        if let Ok(lang) = std::env::var("SUBTITLER_TARGET_LANGUAGE") {
            self.target_language = lang;
        }
        if let Ok(dir) = std::env::var("SUBTITLER_TEMP_DIR") {
            self.temp_dir = Some(PathBuf::from(dir));
        }
        if let Ok(secs) = std::env::var("SUBTITLER_STAGE_TIMEOUT_SECS") {
            if let Ok(s) = secs.parse() {
                self.stage_timeout_secs = s;
            }
        }
        if let Ok(attempts) = std::env::var("SUBTITLER_TRANSCRIPTION_ATTEMPTS") {
            if let Ok(a) = attempts.parse() {
                self.transcription_attempts = a;
            }
        }
        if let Ok(concurrency) = std::env::var("SUBTITLER_TRANSLATION_CONCURRENCY") {
            if let Ok(c) = concurrency.parse() {
                self.translation_concurrency = c;
            }
        }
        if let Ok(model) = std::env::var("SUBTITLER_WHISPER_MODEL") {
            if let Ok(m) = model.parse() {
                self.whisper_model = m;
            }
        }
        if let Ok(threshold) = std::env::var("SUBTITLER_SILENCE_THRESHOLD") {
            if let Ok(t) = threshold.parse() {
                self.silence_threshold = t;
            }
        }
        if let Ok(path) = std::env::var("SUBTITLER_FFMPEG") {
            self.ffmpeg_path = path;
        }
        if let Ok(path) = std::env::var("SUBTITLER_FFPROBE") {
            self.ffprobe_path = path;
        }
    }

    /// Check that a job translating `source` into `target` can run.
    pub fn validate(&self, source: &str, target: &str) -> Result<()> {
        if self.openai_api_key.is_none() {
            return Err(SubtitlerError::Config(
                "OPENAI_API_KEY not set. Export it with: export OPENAI_API_KEY=sk-...".to_string(),
            ));
        }

        if !same_language(source, target) && self.gemini_api_key.is_none() {
            return Err(SubtitlerError::Config(
                "GEMINI_API_KEY not set. Get one at https://aistudio.google.com/apikey".to_string(),
            ));
        }

        if self.stage_timeout_secs == 0 {
            return Err(SubtitlerError::Config(
                "Stage timeout must be greater than 0".to_string(),
            ));
        }

        if self.transcription_attempts == 0 {
            return Err(SubtitlerError::Config(
                "Transcription attempts must be greater than 0".to_string(),
            ));
        }

        if self.translation_concurrency == 0 {
            return Err(SubtitlerError::Config(
                "Translation concurrency must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.silence_threshold) {
            return Err(SubtitlerError::Config(format!(
                "Silence threshold must be between 0 and 1, got {}",
                self.silence_threshold
            )));
        }

        if self.max_upload_bytes < MIN_UPLOAD_BYTES {
            return Err(SubtitlerError::Config(format!(
                "Upload limit must be at least {MIN_UPLOAD_BYTES} bytes"
            )));
        }

        Ok(())
    }

    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_secs)
    }

    pub fn temp_root(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    fn config_file_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("subtitler").join("config.toml"))
    }
}
