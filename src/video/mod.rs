pub mod compose;
pub mod probe;

pub use compose::{escape_filter_path, FfmpegComposer};
pub use probe::{parse_frame_rate, FfprobeProbe};

use crate::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The input video. Never modified by the pipeline.
#[derive(Debug, Clone)]
pub struct VideoAsset {
    pub path: PathBuf,
    pub duration: Duration,
    pub frame_rate: Option<f64>,
}

#[async_trait]
pub trait VideoProbe: Send + Sync {
    async fn probe(&self, input: &Path) -> Result<VideoAsset>;
}

#[async_trait]
pub trait VideoComposer: Send + Sync {
    /// Write `video` with `subtitles` (an SRT file) applied to `dest`.
    ///
    /// `None` means there are no cues; the output is the source video
    /// without an overlay.
    async fn compose(&self, video: &VideoAsset, subtitles: Option<&Path>, dest: &Path)
        -> Result<()>;
}
