//! Mock API tests for the transcription and translation clients.
//!
//! A local wiremock server stands in for the OpenAI and Gemini endpoints.

use std::path::{Path, PathBuf};
use std::time::Duration;
use subtitler::audio::{AudioArtifact, TRANSCRIPTION_FORMAT};
use subtitler::transcribe::{transcribe_with_retry, RetryPolicy, Transcriber, WhisperClient};
use subtitler::translate::{GeminiTranslator, Translator};
use subtitler::SubtitlerError;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn write_wav(dir: &Path, name: &str, amplitude: f32) -> AudioArtifact {
    let path: PathBuf = dir.join(name);
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 16000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec).unwrap();
    for i in 0..8000 {
        let t = i as f32 / 16000.0;
        let sample = (t * 440.0 * 2.0 * std::f32::consts::PI).sin() * amplitude;
        writer.write_sample((sample * i16::MAX as f32) as i16).unwrap();
    }
    writer.finalize().unwrap();

    AudioArtifact {
        path,
        format: TRANSCRIPTION_FORMAT,
        duration: Duration::from_millis(500),
    }
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
        attempt_timeout: Duration::from_secs(5),
    }
}

// ============================================================================
// Whisper API Mock Tests
// ============================================================================

mod whisper_tests {
    use super::*;

    const TRANSCRIPTIONS: &str = "/v1/audio/transcriptions";

    fn segments_body() -> serde_json::Value {
        serde_json::json!({
            "text": "Hello world. Goodbye.",
            "segments": [
                { "text": " Hello world." },
                { "text": " Goodbye. " }
            ]
        })
    }

    #[tokio::test]
    async fn test_transcribes_segments_into_lines() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TRANSCRIPTIONS))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(segments_body()))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let audio = write_wav(dir.path(), "speech.wav", 0.5);
        let client = WhisperClient::new("test-key".to_string()).with_base_url(server.uri());

        let transcript = client.transcribe(&audio, "en").await.unwrap();
        assert_eq!(transcript.lines, vec!["Hello world.", "Goodbye."]);
        assert_eq!(transcript.language, "en");
    }

    #[tokio::test]
    async fn test_silent_audio_skips_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TRANSCRIPTIONS))
            .respond_with(ResponseTemplate::new(200).set_body_json(segments_body()))
            .expect(0)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let audio = write_wav(dir.path(), "silence.wav", 0.0);
        let client = WhisperClient::new("test-key".to_string()).with_base_url(server.uri());

        let transcript = client.transcribe(&audio, "en").await.unwrap();
        assert!(transcript.is_empty());
    }

    #[tokio::test]
    async fn test_long_silence_over_upload_limit_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TRANSCRIPTIONS))
            .respond_with(ResponseTemplate::new(200).set_body_json(segments_body()))
            .expect(0)
            .mount(&server)
            .await;

        // Fourteen minutes of 16 kHz mono silence.
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("long_silence.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for _ in 0..14 * 60 * 16000 {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();
        assert!(std::fs::metadata(&path).unwrap().len() > 25 * 1024 * 1024);

        let audio = AudioArtifact {
            path,
            format: TRANSCRIPTION_FORMAT,
            duration: Duration::from_secs(14 * 60),
        };
        let client = WhisperClient::new("test-key".to_string()).with_base_url(server.uri());

        let transcript = client.transcribe(&audio, "en").await.unwrap();
        assert!(transcript.is_empty());
    }

    #[tokio::test]
    async fn test_oversized_speech_is_rejected_before_upload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TRANSCRIPTIONS))
            .respond_with(ResponseTemplate::new(200).set_body_json(segments_body()))
            .expect(0)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let audio = write_wav(dir.path(), "speech.wav", 0.5);
        let client = WhisperClient::new("test-key".to_string())
            .with_base_url(server.uri())
            .with_max_upload_bytes(1024);

        let result = client.transcribe(&audio, "en").await;
        assert!(matches!(result, Err(SubtitlerError::Transcription(_))));
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TRANSCRIPTIONS))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream error"))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(TRANSCRIPTIONS))
            .respond_with(ResponseTemplate::new(200).set_body_json(segments_body()))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let audio = write_wav(dir.path(), "speech.wav", 0.5);
        let client = WhisperClient::new("test-key".to_string()).with_base_url(server.uri());

        let transcript = transcribe_with_retry(&client, &audio, "en", &fast_retry())
            .await
            .unwrap();
        assert_eq!(transcript.lines.len(), 2);
    }

    #[tokio::test]
    async fn test_unauthorized_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TRANSCRIPTIONS))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": { "message": "Incorrect API key provided", "type": "invalid_request_error" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let audio = write_wav(dir.path(), "speech.wav", 0.5);
        let client = WhisperClient::new("bad-key".to_string()).with_base_url(server.uri());

        let err = transcribe_with_retry(&client, &audio, "en", &fast_retry())
            .await
            .unwrap_err();
        match err {
            SubtitlerError::Transcription(msg) => assert!(msg.contains("Incorrect API key")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_exhausted_retries_report_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TRANSCRIPTIONS))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let audio = write_wav(dir.path(), "speech.wav", 0.5);
        let client = WhisperClient::new("test-key".to_string()).with_base_url(server.uri());

        let err = transcribe_with_retry(&client, &audio, "en", &fast_retry())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("after 3 attempts"));
    }
}

// ============================================================================
// Gemini API Mock Tests
// ============================================================================

mod gemini_tests {
    use super::*;

    const GENERATE: &str = "/v1beta/models/gemini-2.0-flash:generateContent";

    #[tokio::test]
    async fn test_translates_line() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE))
            .and(header("x-goog-api-key", "gemini-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [
                    { "content": { "parts": [ { "text": "  hola mundo\n" } ] } }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let translator =
            GeminiTranslator::new("gemini-key".to_string()).with_base_url(server.uri());
        let translated = translator.translate("hello world", "en", "es").await.unwrap();
        assert_eq!(translated, "hola mundo");
    }

    #[tokio::test]
    async fn test_error_status_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE))
            .respond_with(ResponseTemplate::new(429).set_body_string("quota exceeded"))
            .mount(&server)
            .await;

        let translator =
            GeminiTranslator::new("gemini-key".to_string()).with_base_url(server.uri());
        let err = translator.translate("hello", "en", "es").await.unwrap_err();
        match err {
            SubtitlerError::ApiStatus { status, message } => {
                assert_eq!(status, 429);
                assert!(message.contains("quota"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_candidates_are_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": []
            })))
            .mount(&server)
            .await;

        let translator =
            GeminiTranslator::new("gemini-key".to_string()).with_base_url(server.uri());
        let err = translator.translate("hello", "en", "es").await.unwrap_err();
        assert!(matches!(err, SubtitlerError::Api(_)));
    }

    #[tokio::test]
    async fn test_custom_model_changes_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-1.5-pro:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [ { "content": { "parts": [ { "text": "bonjour" } ] } } ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let translator = GeminiTranslator::new("gemini-key".to_string())
            .with_model("gemini-1.5-pro")
            .with_base_url(server.uri());
        assert_eq!(translator.translate("hello", "en", "fr").await.unwrap(), "bonjour");
    }
}
