//! ppe_check - Run PPE detection and compliance on detection image files.
//!
//! One file is processed as a single request (`predict`, or `check-compliance`
//! with `--compliance`); several files form one `predict-batch` request.
//! Every processed image is persisted as a detection record and the result is
//! printed to stdout as JSON.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;

use ppe_compliance::{
    config::AppConfig,
    generate_request_id,
    image::{process_batch, process_image},
    ingest::load_image_file,
    storage::{ENDPOINT_CHECK_COMPLIANCE, ENDPOINT_PREDICT, ENDPOINT_PREDICT_BATCH},
    BackendRegistry, DetectionRecord, RecordStore, SqliteRecordStore,
};

#[path = "../ui.rs"]
#[allow(dead_code)]
mod ui;

#[derive(Parser, Debug)]
#[command(
    name = "ppe_check",
    about = "Detect PPE in images and check worker compliance"
)]
struct Args {
    /// Detection image files (JSON with width, height and detections)
    #[arg(required = true, value_name = "PATH")]
    files: Vec<PathBuf>,

    /// Evaluate compliance for every image
    #[arg(long)]
    compliance: bool,

    /// Minimum detection confidence, overrides config
    #[arg(long, value_name = "FLOAT")]
    conf_threshold: Option<f64>,

    /// SQLite record store path, overrides config
    #[arg(long, value_name = "PATH")]
    db_path: Option<String>,

    /// Detector backend name, overrides config
    #[arg(long, value_name = "NAME")]
    backend: Option<String>,

    /// Do not persist detection records
    #[arg(long)]
    no_store: bool,

    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = ui::Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);

    let cfg = AppConfig::load()?;
    let conf_threshold = args.conf_threshold.unwrap_or(cfg.conf_threshold);
    let db_path = args.db_path.clone().unwrap_or_else(|| cfg.db_path.clone());
    let backend_name = args.backend.clone().unwrap_or_else(|| cfg.backend.clone());

    let registry = BackendRegistry::with_builtin();
    let backend = registry.require(&backend_name)?;
    let mut backend = backend
        .lock()
        .map_err(|_| anyhow!("backend lock poisoned"))?;
    backend.warm_up()?;

    let mut store = if args.no_store {
        None
    } else {
        let _stage = ui.stage("Open record store");
        Some(SqliteRecordStore::open(&db_path)?)
    };

    let inputs = {
        let _stage = ui.stage("Read images");
        args.files
            .iter()
            .map(|path| load_image_file(path))
            .collect::<Result<Vec<_>>>()?
    };

    if let [input] = inputs.as_slice() {
        let analysis = {
            let _stage = ui.stage("Run detection");
            process_image(
                &mut *backend,
                &input.frame,
                &input.filename,
                conf_threshold,
                args.compliance,
            )?
        };
        let request_id = generate_request_id();
        let endpoint = if args.compliance {
            ENDPOINT_CHECK_COMPLIANCE
        } else {
            ENDPOINT_PREDICT
        };
        if let Some(store) = store.as_mut() {
            store.append_detection(&DetectionRecord::from_analysis(
                &request_id,
                endpoint,
                conf_threshold,
                &analysis,
            ))?;
        }
        log::info!(
            "{}: {} detections ({})",
            request_id,
            analysis.detections.len(),
            input.filename
        );
        let body = serde_json::json!({
            "success": true,
            "request_id": request_id,
            "result": analysis,
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    let report = {
        let _stage = ui.stage("Run batch detection");
        process_batch(&mut *backend, &inputs, conf_threshold, args.compliance)?
    };
    if let Some(store) = store.as_mut() {
        let _stage = ui.stage("Persist records");
        for item in &report.results {
            store.append_detection(&DetectionRecord::from_analysis(
                &item.request_id,
                ENDPOINT_PREDICT_BATCH,
                conf_threshold,
                &item.analysis,
            ))?;
        }
    }
    log::info!(
        "batch {}: {}/{} images processed",
        report.request_id,
        report.processed_images,
        report.total_images
    );
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
