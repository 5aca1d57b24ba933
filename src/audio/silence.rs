use std::path::Path;

use hound::WavReader;
use tracing::debug;

use crate::error::Result;

/// RMS energy (0.0 to 1.0) below which a window counts as silence.
pub const DEFAULT_SILENCE_THRESHOLD: f32 = 0.01;

/// Analysis window: 100ms at 16kHz.
const WINDOW_SIZE: usize = 1600;

/// Calculate RMS (Root Mean Square) energy of a sample window.
fn calculate_rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f64 = samples
        .iter()
        .map(|&s| {
            let normalized = s as f64 / i16::MAX as f64;
            normalized * normalized
        })
        .sum();

    (sum_squares / samples.len() as f64).sqrt() as f32
}

/// Whether a WAV file contains no window louder than `threshold`.
///
/// An empty file is silent.
pub fn is_silent(audio_path: &Path, threshold: f32) -> Result<bool> {
    let reader = WavReader::open(audio_path)?;
    let spec = reader.spec();

    let samples: Vec<i16> = match spec.sample_format {
        hound::SampleFormat::Int if spec.bits_per_sample <= 16 => reader
            .into_samples::<i16>()
            .collect::<std::result::Result<_, _>>()?,
        hound::SampleFormat::Int => reader
            .into_samples::<i32>()
            .map(|s| s.map(|v| (v >> (spec.bits_per_sample - 16)) as i16))
            .collect::<std::result::Result<_, _>>()?,
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .map(|s| s.map(|v| (v * i16::MAX as f32) as i16))
            .collect::<std::result::Result<_, _>>()?,
    };

    if samples.is_empty() {
        debug!("Audio has no samples");
        return Ok(true);
    }

    let loudest = samples
        .chunks(WINDOW_SIZE)
        .map(calculate_rms)
        .fold(0.0f32, f32::max);

    debug!("Loudest window RMS: {:.4}", loudest);
    Ok(loudest < threshold)
}

/// [`is_silent`] on the blocking thread pool.
pub async fn detect_silence(audio_path: &Path, threshold: f32) -> Result<bool> {
    let path = audio_path.to_path_buf();
    tokio::task::spawn_blocking(move || is_silent(&path, threshold)).await?
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{SampleFormat, WavSpec, WavWriter};

    fn write_wav(path: &Path, samples: impl IntoIterator<Item = i16>) {
        let spec = WavSpec {
            channels: 1,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(path, spec).unwrap();
        for s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_calculate_rms_silence() {
        let samples = vec![0i16; 100];
        assert_eq!(calculate_rms(&samples), 0.0);
    }

    #[test]
    fn test_calculate_rms_loud() {
        let samples = vec![i16::MAX; 100];
        let rms = calculate_rms(&samples);
        assert!((rms - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_empty_wav_is_silent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.wav");
        write_wav(&path, std::iter::empty());
        assert!(is_silent(&path, DEFAULT_SILENCE_THRESHOLD).unwrap());
    }

    #[test]
    fn test_zero_wav_is_silent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zeros.wav");
        write_wav(&path, std::iter::repeat(0i16).take(16_000));
        assert!(is_silent(&path, DEFAULT_SILENCE_THRESHOLD).unwrap());
    }

    #[test]
    fn test_tone_is_not_silent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        // A short burst in otherwise quiet audio.
        let samples = (0..32_000).map(|i| {
            if (16_000..17_600).contains(&i) {
                if i % 2 == 0 { 8000 } else { -8000 }
            } else {
                0
            }
        });
        write_wav(&path, samples);
        assert!(!is_silent(&path, DEFAULT_SILENCE_THRESHOLD).unwrap());
    }

    #[tokio::test]
    async fn test_detect_silence_off_thread() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zeros.wav");
        write_wav(&path, std::iter::repeat(0i16).take(16_000));
        assert!(detect_silence(&path, DEFAULT_SILENCE_THRESHOLD).await.unwrap());
        assert!(detect_silence(Path::new("/nonexistent/a.wav"), DEFAULT_SILENCE_THRESHOLD)
            .await
            .is_err());
    }

    #[test]
    fn test_missing_file_is_error() {
        assert!(is_silent(Path::new("/nonexistent/a.wav"), DEFAULT_SILENCE_THRESHOLD).is_err());
    }
}
