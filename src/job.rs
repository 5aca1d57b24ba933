//! Per-request job state and the job-scoped workspace that owns every
//! intermediate artifact.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

/// Unique identifier that namespaces a job's files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Extracting,
    Transcribing,
    Translating,
    BuildingCues,
    Composing,
    Done,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed | JobStatus::Cancelled)
    }
}

/// One video-in/video-out request.
///
/// Everything except the status is fixed at construction, so a job can be
/// shared with observers while it runs.
#[derive(Debug)]
pub struct Job {
    id: JobId,
    input: PathBuf,
    source_language: String,
    target_language: String,
    output_dir: PathBuf,
    status: watch::Sender<JobStatus>,
    cancel: CancellationToken,
}

impl Job {
    pub fn new(
        input: impl Into<PathBuf>,
        source_language: impl Into<String>,
        target_language: impl Into<String>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        let (status, _) = watch::channel(JobStatus::Pending);
        Self {
            id: JobId::new(),
            input: input.into(),
            source_language: source_language.into(),
            target_language: target_language.into(),
            output_dir: output_dir.into(),
            status,
            cancel: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn source_language(&self) -> &str {
        &self.source_language
    }

    pub fn target_language(&self) -> &str {
        &self.target_language
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn status(&self) -> JobStatus {
        *self.status.borrow()
    }

    /// Watch status transitions.
    pub fn subscribe(&self) -> watch::Receiver<JobStatus> {
        self.status.subscribe()
    }

    pub(crate) fn set_status(&self, status: JobStatus) {
        debug!("Job {} -> {:?}", self.id, status);
        self.status.send_replace(status);
    }

    /// Token that cancels this job when triggered.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Final output path: `<stem>.<lang>.<job id>.mp4` inside the output dir.
    pub fn output_path(&self) -> PathBuf {
        let stem = self
            .input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "video".to_string());
        self.output_dir
            .join(format!("{}.{}.{}.mp4", stem, self.target_language, self.id))
    }

    /// Staging path the composer writes to before the final rename.
    pub fn staging_path(&self) -> PathBuf {
        self.output_dir.join(format!(".{}.partial.mp4", self.id))
    }
}

/// An artifact that could not be removed during cleanup.
#[derive(Debug)]
pub struct CleanupWarning {
    pub path: PathBuf,
    pub error: io::Error,
}

/// Job-scoped temporary directory and the artifacts registered in it.
///
/// Cleanup removes exactly the registered artifacts and then the directory
/// itself if it is empty. It runs at most once; dropping an uncleaned
/// workspace cleans it.
#[derive(Debug)]
pub struct Workspace {
    dir: PathBuf,
    artifacts: Vec<PathBuf>,
    cleaned: bool,
}

impl Workspace {
    pub fn create(temp_root: &Path, job_id: JobId) -> io::Result<Self> {
        let dir = temp_root.join(format!("subtitler-{job_id}"));
        std::fs::create_dir_all(&dir)?;
        debug!("Using workspace directory: {:?}", dir);
        Ok(Self {
            dir,
            artifacts: Vec::new(),
            cleaned: false,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Reserve a path inside the workspace and register it for cleanup.
    pub fn artifact(&mut self, name: &str) -> PathBuf {
        let path = self.dir.join(name);
        self.register(path.clone());
        path
    }

    /// Register a path (possibly outside the workspace) for cleanup.
    pub fn register(&mut self, path: PathBuf) {
        if !self.artifacts.contains(&path) {
            self.artifacts.push(path);
        }
    }

    pub fn is_cleaned(&self) -> bool {
        self.cleaned
    }

    /// Remove registered artifacts. Missing files are not an error.
    pub fn cleanup(&mut self) -> Vec<CleanupWarning> {
        if self.cleaned {
            return Vec::new();
        }
        self.cleaned = true;

        let mut warnings = Vec::new();
        for path in self.artifacts.drain(..) {
            match std::fs::remove_file(&path) {
                Ok(()) => debug!("Removed artifact {:?}", path),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(error) => warnings.push(CleanupWarning { path, error }),
            }
        }

        match std::fs::remove_dir(&self.dir) {
            Ok(()) => debug!("Removed workspace {:?}", self.dir),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(error) => warnings.push(CleanupWarning {
                path: self.dir.clone(),
                error,
            }),
        }

        for warning in &warnings {
            warn!(
                "Cleanup could not remove {:?}: {}",
                warning.path, warning.error
            );
        }

        warnings
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if !self.cleaned {
            warn!("Workspace dropped before cleanup, removing {:?}", self.dir);
            self.cleanup();
        }
    }
}
