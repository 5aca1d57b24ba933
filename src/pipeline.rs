use crate::audio::{plan_upload, split_wav, AudioArtifact, AudioExtractor, FfmpegExtractor};
use crate::config::Config;
use crate::error::{PipelineError, Result, Stage, SubtitlerError};
use crate::job::{Job, JobId, JobStatus, Workspace};
use crate::subtitle::{build_cues, format_srt, SubtitleCue};
use crate::transcribe::{transcribe_chunks, RetryPolicy, Transcriber, Transcript, WhisperClient};
use crate::translate::{
    same_language, translate_transcript, GeminiTranslator, Translator, Unconfigured,
};
use crate::video::{FfmpegComposer, FfprobeProbe, VideoComposer, VideoProbe};
use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, info_span, warn, Instrument};

/// Settings shared by every job a pipeline runs.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Upper bound for each external stage call.
    pub stage_timeout: Duration,
    /// Retry policy for the transcription service.
    pub retry: RetryPolicy,
    /// Lines translated concurrently.
    pub translation_concurrency: usize,
    /// Directory job workspaces are created in.
    pub temp_root: PathBuf,
    /// Show progress spinners.
    pub show_progress: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            stage_timeout: config.stage_timeout(),
            retry: RetryPolicy {
                max_attempts: config.transcription_attempts,
                base_delay: Duration::from_millis(config.retry_base_delay_ms),
                attempt_timeout: config.stage_timeout(),
            },
            translation_concurrency: config.translation_concurrency,
            temp_root: config.temp_root(),
            show_progress: false,
        }
    }
}

/// The external services a pipeline delegates to.
#[derive(Clone)]
pub struct Collaborators {
    pub probe: Arc<dyn VideoProbe>,
    pub extractor: Arc<dyn AudioExtractor>,
    pub transcriber: Arc<dyn Transcriber>,
    pub translator: Arc<dyn Translator>,
    pub composer: Arc<dyn VideoComposer>,
}

impl Collaborators {
    /// ffprobe/ffmpeg, Whisper and (if a key is set) Gemini.
    pub fn from_config(config: &Config) -> Self {
        let translator: Arc<dyn Translator> = match &config.gemini_api_key {
            Some(key) => Arc::new(GeminiTranslator::new(key.clone())),
            None => Arc::new(Unconfigured),
        };

        Self {
            probe: Arc::new(FfprobeProbe::new(config.ffprobe_path.clone())),
            extractor: Arc::new(FfmpegExtractor::new(config.ffmpeg_path.clone())),
            transcriber: Arc::new(WhisperClient::from_config(config)),
            translator,
            composer: Arc::new(FfmpegComposer::new(config.ffmpeg_path.clone())),
        }
    }
}

/// Statistics from one job.
#[derive(Debug, Clone)]
pub struct PipelineStats {
    /// Total time taken for the entire pipeline.
    pub total_time: Duration,
    pub extraction_time: Duration,
    pub transcription_time: Duration,
    pub translation_time: Duration,
    pub compose_time: Duration,
    pub video_duration: Duration,
    pub audio_duration: Duration,
    pub transcript_lines: usize,
    pub cues: usize,
    /// False when source and target language matched.
    pub translated: bool,
}

/// Result of a successful job.
#[derive(Debug)]
pub struct PipelineResult {
    pub job_id: JobId,
    pub output_path: PathBuf,
    pub cues: Vec<SubtitleCue>,
    pub stats: PipelineStats,
}

/// Spinner for one stage; abandoned if dropped before finishing.
struct StageSpinner(Option<ProgressBar>);

impl StageSpinner {
    fn start(multi: Option<&MultiProgress>, message: &'static str) -> Self {
        Self(multi.map(|mp| {
            let pb = mp.add(ProgressBar::new_spinner());
            pb.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.green} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            pb.set_message(message);
            pb.enable_steady_tick(Duration::from_millis(100));
            pb
        }))
    }

    fn finish(self, message: String) {
        if let Some(pb) = &self.0 {
            pb.finish_with_message(message);
        }
    }
}

impl Drop for StageSpinner {
    fn drop(&mut self) {
        if let Some(pb) = self.0.take() {
            if !pb.is_finished() {
                pb.abandon_with_message("✗ Failed");
            }
        }
    }
}

/// Runs jobs through probe, extract, transcribe, translate, cue building and
/// compose.
///
/// A pipeline holds no per-job state and can run any number of jobs
/// concurrently.
#[derive(Clone)]
pub struct Pipeline {
    collaborators: Collaborators,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(collaborators: Collaborators, settings: PipelineSettings) -> Self {
        Self {
            collaborators,
            settings,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Collaborators::from_config(config),
            PipelineSettings::from_config(config),
        )
    }

    /// Run a job to completion.
    ///
    /// The job's workspace is cleaned exactly once before this returns,
    /// whether the job succeeded, failed or was cancelled.
    pub async fn run(&self, job: &Job) -> std::result::Result<PipelineResult, PipelineError> {
        let span = info_span!("job", id = %job.id());
        self.run_job(job).instrument(span).await
    }

    async fn run_job(&self, job: &Job) -> std::result::Result<PipelineResult, PipelineError> {
        info!(
            "Subtitling {} ({} -> {})",
            job.input().display(),
            job.source_language(),
            job.target_language()
        );

        let mut workspace = match Workspace::create(&self.settings.temp_root, job.id()) {
            Ok(ws) => ws,
            Err(e) => {
                job.set_status(JobStatus::Failed);
                let err = PipelineError::new(job.id(), Stage::Setup, e.into());
                error!("{}", err);
                return Err(err);
            }
        };

        let outcome = self.execute(job, &mut workspace).await;

        let warnings = workspace.cleanup();
        if !warnings.is_empty() {
            warn!("Cleanup left {} artifact(s) behind", warnings.len());
        }

        match &outcome {
            Ok(result) => {
                job.set_status(JobStatus::Done);
                info!(
                    "Wrote {} cues to {:?} in {:.2}s",
                    result.stats.cues,
                    result.output_path,
                    result.stats.total_time.as_secs_f64()
                );
            }
            Err(e) if matches!(e.source, SubtitlerError::Cancelled) => {
                job.set_status(JobStatus::Cancelled);
                warn!("Job cancelled during {}", e.stage);
            }
            Err(e) => {
                job.set_status(JobStatus::Failed);
                error!("{}", e);
            }
        }

        outcome
    }

    async fn execute(
        &self,
        job: &Job,
        workspace: &mut Workspace,
    ) -> std::result::Result<PipelineResult, PipelineError> {
        let start_time = Instant::now();
        let c = &self.collaborators;
        let timeout = Some(self.settings.stage_timeout);
        let multi_progress = self.settings.show_progress.then(MultiProgress::new);
        let mp = multi_progress.as_ref();
        let fail = |stage: Stage| move |e: SubtitlerError| PipelineError::new(job.id(), stage, e);

        // Stage 1: Probe
        info!("Stage 1/6: Probing {:?}", job.input());
        let spinner = StageSpinner::start(mp, "Probing video...");
        let video = self
            .guard(job, Stage::Probe, timeout, c.probe.probe(job.input()))
            .await?;
        spinner.finish(format!(
            "✓ Video probed ({:.1}s)",
            video.duration.as_secs_f64()
        ));

        // Stage 2: Audio extraction
        job.set_status(JobStatus::Extracting);
        info!("Stage 2/6: Extracting audio");
        let spinner = StageSpinner::start(mp, "Extracting audio...");
        let extraction_start = Instant::now();
        let audio_path = workspace.artifact("audio.wav");
        let audio = self
            .guard(
                job,
                Stage::Extract,
                timeout,
                c.extractor.extract(&video, &audio_path),
            )
            .await?;
        let extraction_time = extraction_start.elapsed();
        spinner.finish(format!(
            "✓ Audio extracted ({:.1}s)",
            audio.duration.as_secs_f64()
        ));

        // Stage 3: Transcription (attempts are bounded by the retry policy)
        job.set_status(JobStatus::Transcribing);
        info!("Stage 3/6: Transcribing with {}", c.transcriber.name());
        let spinner = StageSpinner::start(mp, "Transcribing...");
        let transcription_start = Instant::now();
        let transcript = self
            .guard(
                job,
                Stage::Transcribe,
                None,
                self.transcribe(job, workspace, &audio),
            )
            .await?;
        let transcription_time = transcription_start.elapsed();
        spinner.finish(format!("✓ Transcribed {} lines", transcript.lines.len()));

        // Stage 4: Translation
        job.set_status(JobStatus::Translating);
        info!("Stage 4/6: Translating to {}", job.target_language());
        let spinner = StageSpinner::start(mp, "Translating...");
        let translation_start = Instant::now();
        let translated_needed = !same_language(&transcript.language, job.target_language());
        let translated = self
            .guard(
                job,
                Stage::Translate,
                timeout,
                translate_transcript(
                    c.translator.as_ref(),
                    &transcript,
                    job.target_language(),
                    self.settings.translation_concurrency,
                ),
            )
            .await?;
        let translation_time = translation_start.elapsed();
        spinner.finish(format!("✓ Translated {} lines", translated.lines.len()));

        // Stage 5: Cue building
        job.set_status(JobStatus::BuildingCues);
        info!("Stage 5/6: Building cues");
        let cues = build_cues(&translated, video.duration).map_err(fail(Stage::BuildCues))?;
        let subtitles = if cues.is_empty() {
            info!("Transcript is empty, no subtitles to burn in");
            None
        } else {
            let srt_path = workspace.artifact("subtitles.srt");
            tokio::fs::write(&srt_path, format_srt(&cues))
                .await
                .map_err(|e| fail(Stage::BuildCues)(e.into()))?;
            Some(srt_path)
        };

        // Stage 6: Compose
        job.set_status(JobStatus::Composing);
        info!("Stage 6/6: Composing output video");
        let spinner = StageSpinner::start(mp, "Composing video...");
        let compose_start = Instant::now();
        tokio::fs::create_dir_all(job.output_dir())
            .await
            .map_err(|e| fail(Stage::Compose)(e.into()))?;
        let staging = job.staging_path();
        workspace.register(staging.clone());
        self.guard(
            job,
            Stage::Compose,
            timeout,
            c.composer.compose(&video, subtitles.as_deref(), &staging),
        )
        .await?;
        let output_path = job.output_path();
        publish(&staging, &output_path)
            .await
            .map_err(fail(Stage::Compose))?;
        let compose_time = compose_start.elapsed();
        spinner.finish(format!("✓ Wrote {}", output_path.display()));

        let stats = PipelineStats {
            total_time: start_time.elapsed(),
            extraction_time,
            transcription_time,
            translation_time,
            compose_time,
            video_duration: video.duration,
            audio_duration: audio.duration,
            transcript_lines: transcript.lines.len(),
            cues: cues.len(),
            translated: translated_needed,
        };

        Ok(PipelineResult {
            job_id: job.id(),
            output_path,
            cues,
            stats,
        })
    }

    /// Transcribe the extracted audio, split into uploads the transcriber
    /// accepts. Chunk files are registered with the workspace before they
    /// are written.
    async fn transcribe(
        &self,
        job: &Job,
        workspace: &mut Workspace,
        audio: &AudioArtifact,
    ) -> Result<Transcript> {
        let transcriber = self.collaborators.transcriber.as_ref();

        let planned = match transcriber.max_upload_bytes() {
            Some(limit) => plan_upload(audio, limit).await?,
            None => None,
        };
        let chunks = match planned {
            Some(ranges) => {
                let dests = (0..ranges.len())
                    .map(|i| workspace.artifact(&format!("chunk_{i:04}.wav")))
                    .collect();
                split_wav(audio, ranges, dests).await?
            }
            None => vec![audio.clone()],
        };

        transcribe_chunks(
            transcriber,
            &chunks,
            job.source_language(),
            &self.settings.retry,
        )
        .await
    }

    /// Run one stage call, bounded by `limit` and the job's cancellation.
    async fn guard<T, F>(
        &self,
        job: &Job,
        stage: Stage,
        limit: Option<Duration>,
        call: F,
    ) -> std::result::Result<T, PipelineError>
    where
        F: Future<Output = Result<T>>,
    {
        let token = job.cancellation_token();
        let bounded = async {
            match limit {
                Some(limit) => tokio::time::timeout(limit, call)
                    .await
                    .unwrap_or_else(|_| Err(SubtitlerError::Timeout(limit))),
                None => call.await,
            }
        };

        let result = tokio::select! {
            biased;
            _ = token.cancelled() => Err(SubtitlerError::Cancelled),
            result = bounded => result,
        };

        result.map_err(|e| PipelineError::new(job.id(), stage, e))
    }
}

/// Move the staged output to its final name.
async fn publish(staging: &Path, output: &Path) -> Result<()> {
    tokio::fs::rename(staging, output).await.map_err(|e| {
        SubtitlerError::Compose(format!(
            "Failed to move {} to {}: {e}",
            staging.display(),
            output.display()
        ))
    })
}

/// Subtitle a video with the collaborators described by `config`.
///
/// The source language comes from the config. Returns the path of the
/// subtitled copy in `output_dir`.
pub async fn process_video(
    input: &Path,
    target_language: &str,
    output_dir: &Path,
    config: &Config,
) -> std::result::Result<PathBuf, PipelineError> {
    let job = Job::new(
        input,
        config.source_language.clone(),
        target_language,
        output_dir,
    );

    if let Err(e) = config.validate(job.source_language(), job.target_language()) {
        return Err(PipelineError::new(job.id(), Stage::Setup, e));
    }

    Pipeline::from_config(config)
        .run(&job)
        .await
        .map(|result| result.output_path)
}

/// Print a summary of the pipeline results.
pub fn print_summary(result: &PipelineResult) {
    let stats = &result.stats;
    println!();
    println!("{}", style("Subtitling complete").green().bold());
    println!();
    println!("  Output:     {}", style(result.output_path.display()).cyan());
    println!("  Job:        {}", result.job_id);
    println!("  Cues:       {}", stats.cues);
    println!(
        "  Duration:   {:.1}s video, {:.1}s audio",
        stats.video_duration.as_secs_f64(),
        stats.audio_duration.as_secs_f64()
    );
    println!();
    println!("  Timing:");
    println!("    Extract:     {:.2}s", stats.extraction_time.as_secs_f64());
    println!(
        "    Transcribe:  {:.2}s ({} lines)",
        stats.transcription_time.as_secs_f64(),
        stats.transcript_lines
    );
    if stats.translated {
        println!("    Translate:   {:.2}s", stats.translation_time.as_secs_f64());
    } else {
        println!("    Translate:   skipped (same language)");
    }
    println!("    Compose:     {:.2}s", stats.compose_time.as_secs_f64());
    println!("    Total:       {:.2}s", stats.total_time.as_secs_f64());
    if stats.cues == 0 {
        println!();
        println!(
            "  {}",
            style("Note: no speech detected, output has no subtitles").yellow()
        );
    }
    println!();
}
