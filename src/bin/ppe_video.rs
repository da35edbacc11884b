//! ppe_video - Aggregate PPE compliance over a detection replay file.
//!
//! Frames are read from a JSON-lines replay file (or `stub://<name>`), every
//! `--sample-rate`-th frame goes through the detector backend and compliance
//! evaluation, and the resulting report is printed as JSON and persisted as a
//! video processing record. Ctrl-C cancels the job between frames.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::Path;

use ppe_compliance::{
    config::AppConfig,
    frame::{FrameSource, RawFrame, StreamInfo},
    generate_request_id,
    ingest::{FileConfig, FileSource},
    video::process_stream,
    BackendRegistry, CancelToken, InferenceFailurePolicy, PipelineError, RecordStore,
    SqliteRecordStore, VideoProcessingRecord,
};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(
    name = "ppe_video",
    about = "Aggregate PPE compliance across the frames of a video replay"
)]
struct Args {
    /// Replay file (JSON lines) or stub://<name>
    #[arg(value_name = "PATH")]
    input: String,

    /// Run inference on every Nth frame, overrides config
    #[arg(long, value_name = "N")]
    sample_rate: Option<u64>,

    /// Stop after this many sampled frames, overrides config
    #[arg(long, value_name = "N")]
    max_frames: Option<u64>,

    /// Minimum detection confidence, overrides config
    #[arg(long, value_name = "FLOAT")]
    conf_threshold: Option<f64>,

    /// Inference failure policy (abort|skip), overrides config
    #[arg(long, value_name = "POLICY")]
    on_inference_error: Option<InferenceFailurePolicy>,

    /// SQLite record store path, overrides config
    #[arg(long, value_name = "PATH")]
    db_path: Option<String>,

    /// Detector backend name, overrides config
    #[arg(long, value_name = "NAME")]
    backend: Option<String>,

    /// Do not persist the video record
    #[arg(long)]
    no_store: bool,

    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

/// Ticks the progress display on every frame read.
struct ProgressSource<'a> {
    inner: &'a mut dyn FrameSource,
    progress: ui::FrameProgress,
}

impl FrameSource for ProgressSource<'_> {
    fn connect(&mut self) -> Result<StreamInfo> {
        let info = self.inner.connect()?;
        self.progress.set_total(info.total_frames);
        Ok(info)
    }

    fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        let frame = self.inner.next_frame()?;
        if frame.is_some() {
            self.progress.tick();
        }
        Ok(frame)
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = ui::Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);

    let cfg = AppConfig::load()?;
    let mut job = cfg.video_job();
    if let Some(rate) = args.sample_rate {
        job.sample_rate = rate;
    }
    if let Some(max_frames) = args.max_frames {
        job.max_frames = max_frames;
    }
    if let Some(threshold) = args.conf_threshold {
        job.conf_threshold = threshold;
    }
    if let Some(policy) = args.on_inference_error {
        job.on_inference_error = policy;
    }
    job.validate()?;
    let db_path = args.db_path.clone().unwrap_or_else(|| cfg.db_path.clone());
    let backend_name = args.backend.clone().unwrap_or_else(|| cfg.backend.clone());

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || {
            log::warn!("interrupt received, cancelling video job");
            cancel.cancel();
        })?;
    }

    let registry = BackendRegistry::with_builtin();
    let backend = registry.require(&backend_name)?;
    let mut backend = backend
        .lock()
        .map_err(|_| anyhow!("backend lock poisoned"))?;
    backend.warm_up()?;

    let mut source = FileSource::new(FileConfig {
        path: args.input.clone(),
        ..FileConfig::default()
    })?;
    let mut tracked = ProgressSource {
        inner: &mut source,
        progress: ui.frames(),
    };

    let result = {
        let _stage = ui.stage("Process video");
        process_stream(&mut tracked, &mut *backend, &job, &cancel)
    };
    tracked.progress.finish();

    let report = match result {
        Ok(report) => report,
        Err(PipelineError::Cancelled { frame_number }) => {
            log::warn!("video job cancelled at frame {}", frame_number);
            return Err(anyhow!("cancelled at frame {}", frame_number));
        }
        Err(e) => return Err(e.into()),
    };
    log::info!("read {} frames from {}", source.stats().frames_read, args.input);

    let request_id = generate_request_id();
    if !args.no_store {
        let _stage = ui.stage("Persist record");
        let mut store = SqliteRecordStore::open(&db_path)?;
        let filename = Path::new(&args.input)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| args.input.clone());
        store.append_video(&VideoProcessingRecord::from_report(
            &request_id,
            &filename,
            job.conf_threshold,
            &report,
        ))?;
    }

    let body = serde_json::json!({
        "success": true,
        "request_id": request_id,
        "result": report,
    });
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}
