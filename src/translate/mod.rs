pub mod gemini;

pub use gemini::GeminiTranslator;

use crate::error::{Result, SubtitlerError};
use crate::transcribe::Transcript;
use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, info};

/// A transcript translated line by line.
///
/// Always has exactly as many lines as the transcript it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslatedTranscript {
    pub lines: Vec<String>,
    pub language: String,
}

#[async_trait]
pub trait Translator: Send + Sync {
    /// Translate one line of text from `source` to `target`.
    async fn translate(&self, text: &str, source: &str, target: &str) -> Result<String>;
    fn name(&self) -> &'static str;
}

/// Translator used when no translation service is configured.
///
/// Jobs whose target equals the source language never call it.
pub struct Unconfigured;

#[async_trait]
impl Translator for Unconfigured {
    async fn translate(&self, _text: &str, source: &str, target: &str) -> Result<String> {
        Err(SubtitlerError::Config(format!(
            "No translation service configured for {source} -> {target}"
        )))
    }

    fn name(&self) -> &'static str {
        "unconfigured"
    }
}

/// Compare language tags by primary subtag, ignoring case (`en-US` == `en`).
pub fn same_language(a: &str, b: &str) -> bool {
    fn primary(tag: &str) -> &str {
        tag.trim().split(['-', '_']).next().unwrap_or("")
    }
    primary(a).eq_ignore_ascii_case(primary(b))
}

/// Translate every transcript line into `target`.
///
/// Lines are translated independently, up to `concurrency` at a time, and
/// reassembled in order. Blank lines pass through. If any line fails the
/// whole translation fails.
pub async fn translate_transcript(
    translator: &dyn Translator,
    transcript: &Transcript,
    target: &str,
    concurrency: usize,
) -> Result<TranslatedTranscript> {
    if same_language(&transcript.language, target) {
        debug!(
            "Source and target language are both {}, skipping translation",
            target
        );
        return Ok(TranslatedTranscript {
            lines: transcript.lines.clone(),
            language: transcript.language.clone(),
        });
    }

    info!(
        "Translating {} lines {} -> {} with {}",
        transcript.lines.len(),
        transcript.language,
        target,
        translator.name()
    );

    let source = transcript.language.as_str();
    let lines: Vec<String> = stream::iter(transcript.lines.iter().enumerate())
        .map(|(i, line)| async move {
            if line.trim().is_empty() {
                return Ok(line.clone());
            }
            translator
                .translate(line, source, target)
                .await
                .map(|t| t.trim().to_string())
                .map_err(|e| SubtitlerError::Translation(format!("line {}: {e}", i + 1)))
        })
        .buffered(concurrency.max(1))
        .try_collect()
        .await?;

    if lines.len() != transcript.lines.len() {
        return Err(SubtitlerError::Translation(format!(
            "Expected {} translated lines, got {}",
            transcript.lines.len(),
            lines.len()
        )));
    }

    Ok(TranslatedTranscript {
        lines,
        language: target.to_string(),
    })
}
