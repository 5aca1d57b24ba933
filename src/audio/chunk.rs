//! Splitting extracted audio into uploads that fit a service's size limit.

use std::ops::Range;
use std::path::{Path, PathBuf};
use std::time::Duration;

use hound::{SampleFormat, WavReader, WavWriter};
use tracing::{debug, info};

use crate::error::{Result, SubtitlerError};

use super::{AudioArtifact, AudioFormat};

/// Room reserved for the RIFF header of each chunk.
const WAV_HEADER_SIZE: u64 = 128;

fn bytes_per_frame(format: AudioFormat) -> u64 {
    u64::from(format.bits_per_sample / 8).max(1) * u64::from(format.channels).max(1)
}

/// Estimate the file size of a PCM WAV holding `frames` frames.
pub fn estimate_wav_size(format: AudioFormat, frames: u64) -> u64 {
    WAV_HEADER_SIZE + frames * bytes_per_frame(format)
}

/// Split `total_frames` into consecutive frame ranges whose WAV files stay
/// within `max_bytes`.
pub fn plan_chunks(
    format: AudioFormat,
    total_frames: u64,
    max_bytes: u64,
) -> Result<Vec<Range<u64>>> {
    let frames_per_chunk = max_bytes.saturating_sub(WAV_HEADER_SIZE) / bytes_per_frame(format);
    if frames_per_chunk == 0 {
        return Err(SubtitlerError::Transcription(format!(
            "Upload limit of {max_bytes} bytes cannot hold any audio"
        )));
    }

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < total_frames {
        let end = (start + frames_per_chunk).min(total_frames);
        chunks.push(start..end);
        start = end;
    }
    Ok(chunks)
}

/// Write each frame range of `source` to the matching destination.
///
/// Chunks keep the source's format, so every chunk is a valid upload on its
/// own.
pub fn write_chunks(
    source: &Path,
    ranges: &[Range<u64>],
    dests: &[PathBuf],
) -> Result<Vec<AudioArtifact>> {
    if ranges.len() != dests.len() {
        return Err(SubtitlerError::Transcription(format!(
            "{} chunk ranges for {} destinations",
            ranges.len(),
            dests.len()
        )));
    }

    let mut reader = WavReader::open(source)?;
    let spec = reader.spec();
    if spec.sample_format != SampleFormat::Int || spec.bits_per_sample != 16 {
        return Err(SubtitlerError::Transcription(format!(
            "Cannot split {}-bit {:?} audio",
            spec.bits_per_sample, spec.sample_format
        )));
    }
    let format = AudioFormat {
        sample_rate: spec.sample_rate,
        bits_per_sample: spec.bits_per_sample,
        channels: spec.channels,
    };
    let channels = u64::from(spec.channels);
    let mut samples = reader.samples::<i16>();

    let mut artifacts = Vec::with_capacity(ranges.len());
    for (range, dest) in ranges.iter().zip(dests) {
        let mut writer = WavWriter::create(dest, spec)?;
        let mut written = 0u64;
        for _ in 0..(range.end - range.start) * channels {
            match samples.next() {
                Some(sample) => {
                    writer.write_sample(sample?)?;
                    written += 1;
                }
                None => break,
            }
        }
        writer.finalize()?;

        let frames = written / channels.max(1);
        let nanos = frames * 1_000_000_000 / u64::from(spec.sample_rate.max(1));
        debug!("Wrote chunk {:?} ({} frames)", dest, frames);
        artifacts.push(AudioArtifact {
            path: dest.clone(),
            format,
            duration: Duration::from_nanos(nanos),
        });
    }

    Ok(artifacts)
}

/// Plan upload chunks for `audio`, or `None` when the file already fits.
pub async fn plan_upload(
    audio: &AudioArtifact,
    max_bytes: u64,
) -> Result<Option<Vec<Range<u64>>>> {
    let size = tokio::fs::metadata(&audio.path).await?.len();
    if size <= max_bytes {
        return Ok(None);
    }

    let path = audio.path.clone();
    let total_frames = tokio::task::spawn_blocking(move || {
        WavReader::open(&path).map(|reader| u64::from(reader.duration()))
    })
    .await??;

    let ranges = plan_chunks(audio.format, total_frames, max_bytes)?;
    info!(
        "Audio is {} bytes, over the {} byte upload limit; splitting into {} chunks",
        size,
        max_bytes,
        ranges.len()
    );
    Ok(Some(ranges))
}

/// [`write_chunks`] on the blocking thread pool.
pub async fn split_wav(
    audio: &AudioArtifact,
    ranges: Vec<Range<u64>>,
    dests: Vec<PathBuf>,
) -> Result<Vec<AudioArtifact>> {
    let source = audio.path.clone();
    tokio::task::spawn_blocking(move || write_chunks(&source, &ranges, &dests)).await?
}
