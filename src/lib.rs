pub mod audio;
pub mod command;
pub mod config;
pub mod error;
pub mod job;
pub mod pipeline;
pub mod subtitle;
pub mod transcribe;
pub mod translate;
pub mod video;

pub use config::Config;
pub use error::{ErrorKind, PipelineError, Result, Stage, SubtitlerError};
pub use job::{Job, JobId, JobStatus};
pub use pipeline::{
    print_summary, process_video, Collaborators, Pipeline, PipelineResult, PipelineSettings,
    PipelineStats,
};
