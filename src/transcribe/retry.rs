use crate::audio::AudioArtifact;
use crate::error::{Result, SubtitlerError};
use crate::transcribe::{Transcriber, Transcript};
use std::time::Duration;
use tracing::{debug, warn};

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles after each failure.
    pub base_delay: Duration,
    /// Upper bound for a single attempt.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            attempt_timeout: Duration::from_secs(600),
        }
    }
}

impl RetryPolicy {
    /// Delay before `attempt` (0-based). The first attempt is not delayed.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            Duration::ZERO
        } else {
            self.base_delay.saturating_mul(2u32.saturating_pow(attempt - 1))
        }
    }
}

/// Transcribe with retry logic.
///
/// Transient failures (network errors, timeouts, 5xx and 429 responses) are
/// retried up to the policy's attempt count; anything else fails at once.
pub async fn transcribe_with_retry(
    transcriber: &dyn Transcriber,
    audio: &AudioArtifact,
    language: &str,
    policy: &RetryPolicy,
) -> Result<Transcript> {
    let attempts = policy.max_attempts.max(1);
    let mut last_error = None;

    for attempt in 0..attempts {
        let delay = policy.delay_before(attempt);
        if !delay.is_zero() {
            debug!("Retry attempt {} after {:?} delay", attempt, delay);
            tokio::time::sleep(delay).await;
        }

        let result = match tokio::time::timeout(
            policy.attempt_timeout,
            transcriber.transcribe(audio, language),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(SubtitlerError::Timeout(policy.attempt_timeout)),
        };

        match result {
            Ok(transcript) => return Ok(transcript),
            Err(e) if e.is_retryable() => {
                warn!(
                    "{} attempt {}/{} failed: {}",
                    transcriber.name(),
                    attempt + 1,
                    attempts,
                    e
                );
                last_error = Some(e);
            }
            Err(e) => return Err(SubtitlerError::Transcription(e.to_string())),
        }
    }

    let cause = last_error
        .map(|e| e.to_string())
        .unwrap_or_else(|| "unknown error".to_string());
    Err(SubtitlerError::Transcription(format!(
        "{} failed after {} attempts: {}",
        transcriber.name(),
        attempts,
        cause
    )))
}

/// Transcribe consecutive chunks of one recording and join their lines.
///
/// Chunks are sent one at a time in order, each with its own retries, so
/// the joined lines keep the recording's temporal order. Any chunk failing
/// fails the whole transcript.
pub async fn transcribe_chunks(
    transcriber: &dyn Transcriber,
    chunks: &[AudioArtifact],
    language: &str,
    policy: &RetryPolicy,
) -> Result<Transcript> {
    let mut lines = Vec::new();
    for (i, chunk) in chunks.iter().enumerate() {
        if chunks.len() > 1 {
            debug!("Transcribing chunk {}/{}", i + 1, chunks.len());
        }
        let part = transcribe_with_retry(transcriber, chunk, language, policy).await?;
        lines.extend(part.lines);
    }
    Ok(Transcript::new(lines, language))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::TRANSCRIPTION_FORMAT;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails with the given status until `succeed_on` calls have been made.
    struct FlakyTranscriber {
        calls: AtomicU32,
        succeed_on: u32,
        status: u16,
    }

    impl FlakyTranscriber {
        fn new(succeed_on: u32, status: u16) -> Self {
            Self {
                calls: AtomicU32::new(0),
                succeed_on,
                status,
            }
        }
    }

    #[async_trait]
    impl Transcriber for FlakyTranscriber {
        async fn transcribe(&self, _audio: &AudioArtifact, language: &str) -> Result<Transcript> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call >= self.succeed_on {
                Ok(Transcript::new(vec!["ok".to_string()], language))
            } else {
                Err(SubtitlerError::ApiStatus {
                    status: self.status,
                    message: "flaky".to_string(),
                })
            }
        }

        fn name(&self) -> &'static str {
            "Flaky"
        }
    }

    struct SlowTranscriber;

    #[async_trait]
    impl Transcriber for SlowTranscriber {
        async fn transcribe(&self, _audio: &AudioArtifact, language: &str) -> Result<Transcript> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Transcript::empty(language))
        }

        fn name(&self) -> &'static str {
            "Slow"
        }
    }

    fn audio() -> AudioArtifact {
        AudioArtifact {
            path: PathBuf::from("/tmp/audio.wav"),
            format: TRANSCRIPTION_FORMAT,
            duration: Duration::from_secs(1),
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            attempt_timeout: Duration::from_secs(5),
        }
    }

    /// Returns the chunk's file name as its only line.
    struct EchoTranscriber;

    #[async_trait]
    impl Transcriber for EchoTranscriber {
        async fn transcribe(&self, audio: &AudioArtifact, language: &str) -> Result<Transcript> {
            let name = audio
                .path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            if name == "broken" {
                return Err(SubtitlerError::ApiStatus {
                    status: 400,
                    message: "bad audio".to_string(),
                });
            }
            Ok(Transcript::new(vec![name], language))
        }

        fn name(&self) -> &'static str {
            "Echo"
        }
    }

    fn chunk(name: &str) -> AudioArtifact {
        AudioArtifact {
            path: PathBuf::from(format!("/tmp/{name}.wav")),
            ..audio()
        }
    }

    #[tokio::test]
    async fn test_chunks_are_joined_in_order() {
        let chunks = vec![chunk("first"), chunk("second"), chunk("third")];
        let transcript = transcribe_chunks(&EchoTranscriber, &chunks, "en", &fast_policy(1))
            .await
            .unwrap();
        assert_eq!(transcript.lines, vec!["first", "second", "third"]);
        assert_eq!(transcript.language, "en");
    }

    #[tokio::test]
    async fn test_failed_chunk_fails_transcript() {
        let chunks = vec![chunk("first"), chunk("broken"), chunk("third")];
        let result = transcribe_chunks(&EchoTranscriber, &chunks, "en", &fast_policy(1)).await;
        assert!(matches!(result, Err(SubtitlerError::Transcription(_))));
    }

    #[test]
    fn test_backoff_increases() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_before(0), Duration::ZERO);
        assert_eq!(policy.delay_before(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_before(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_before(3), Duration::from_millis(4000));
    }

    #[tokio::test]
    async fn test_recovers_from_transient_failure() {
        let transcriber = FlakyTranscriber::new(3, 503);
        let transcript = transcribe_with_retry(&transcriber, &audio(), "en", &fast_policy(3))
            .await
            .unwrap();
        assert_eq!(transcript.lines, vec!["ok"]);
        assert_eq!(transcriber.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let transcriber = FlakyTranscriber::new(10, 500);
        let result = transcribe_with_retry(&transcriber, &audio(), "en", &fast_policy(3)).await;
        assert!(matches!(result, Err(SubtitlerError::Transcription(_))));
        assert_eq!(transcriber.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let transcriber = FlakyTranscriber::new(10, 401);
        let result = transcribe_with_retry(&transcriber, &audio(), "en", &fast_policy(3)).await;
        assert!(result.is_err());
        assert_eq!(transcriber.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_timeout_counts_as_failure() {
        let policy = RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(10),
            attempt_timeout: Duration::from_millis(50),
        };
        let result = transcribe_with_retry(&SlowTranscriber, &audio(), "en", &policy).await;
        match result {
            Err(SubtitlerError::Transcription(msg)) => assert!(msg.contains("2 attempts")),
            other => panic!("Expected Transcription error, got: {other:?}"),
        }
    }
}
