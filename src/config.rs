use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;

use crate::analytics::{AnalyticsWindow, MAX_WINDOW_DAYS};
use crate::video::{InferenceFailurePolicy, VideoJob, DEFAULT_MAX_FRAMES};

const DEFAULT_DB_PATH: &str = "ppe_detection.db";
const DEFAULT_BACKEND: &str = "replay";
const DEFAULT_CONF_THRESHOLD: f64 = 0.25;
const DEFAULT_SAMPLE_RATE: u64 = 1;
const DEFAULT_ANALYTICS_DAYS: u32 = 7;

#[derive(Debug, Deserialize, Default)]
struct AppConfigFile {
    db_path: Option<String>,
    backend: Option<String>,
    detection: Option<DetectionConfigFile>,
    video: Option<VideoConfigFile>,
    analytics: Option<AnalyticsConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectionConfigFile {
    conf_threshold: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct VideoConfigFile {
    sample_rate: Option<u64>,
    max_frames: Option<u64>,
    on_inference_error: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct AnalyticsConfigFile {
    days: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: String,
    pub backend: String,
    pub conf_threshold: f64,
    pub video: VideoSettings,
    pub analytics_days: u32,
}

#[derive(Debug, Clone)]
pub struct VideoSettings {
    pub sample_rate: u64,
    pub max_frames: u64,
    pub on_inference_error: InferenceFailurePolicy,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: DEFAULT_DB_PATH.to_string(),
            backend: DEFAULT_BACKEND.to_string(),
            conf_threshold: DEFAULT_CONF_THRESHOLD,
            video: VideoSettings {
                sample_rate: DEFAULT_SAMPLE_RATE,
                max_frames: DEFAULT_MAX_FRAMES,
                on_inference_error: InferenceFailurePolicy::Abort,
            },
            analytics_days: DEFAULT_ANALYTICS_DAYS,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("PPE_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: AppConfigFile) -> Result<Self> {
        let defaults = Self::default();
        let on_inference_error = match file
            .video
            .as_ref()
            .and_then(|video| video.on_inference_error.as_deref())
        {
            Some(policy) => parse_policy(policy)?,
            None => defaults.video.on_inference_error,
        };
        Ok(Self {
            db_path: file.db_path.unwrap_or(defaults.db_path),
            backend: file.backend.unwrap_or(defaults.backend),
            conf_threshold: file
                .detection
                .and_then(|detection| detection.conf_threshold)
                .unwrap_or(defaults.conf_threshold),
            video: VideoSettings {
                sample_rate: file
                    .video
                    .as_ref()
                    .and_then(|video| video.sample_rate)
                    .unwrap_or(defaults.video.sample_rate),
                max_frames: file
                    .video
                    .as_ref()
                    .and_then(|video| video.max_frames)
                    .unwrap_or(defaults.video.max_frames),
                on_inference_error,
            },
            analytics_days: file
                .analytics
                .and_then(|analytics| analytics.days)
                .unwrap_or(defaults.analytics_days),
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var("PPE_DB_PATH") {
            if !path.trim().is_empty() {
                self.db_path = path;
            }
        }
        if let Ok(backend) = std::env::var("PPE_BACKEND") {
            if !backend.trim().is_empty() {
                self.backend = backend.trim().to_string();
            }
        }
        if let Ok(threshold) = std::env::var("PPE_CONF_THRESHOLD") {
            self.conf_threshold = threshold
                .trim()
                .parse()
                .map_err(|_| anyhow!("PPE_CONF_THRESHOLD must be a number"))?;
        }
        if let Ok(rate) = std::env::var("PPE_SAMPLE_RATE") {
            self.video.sample_rate = rate
                .trim()
                .parse()
                .map_err(|_| anyhow!("PPE_SAMPLE_RATE must be a positive integer"))?;
        }
        if let Ok(max_frames) = std::env::var("PPE_MAX_FRAMES") {
            self.video.max_frames = max_frames
                .trim()
                .parse()
                .map_err(|_| anyhow!("PPE_MAX_FRAMES must be a positive integer"))?;
        }
        if let Ok(policy) = std::env::var("PPE_ON_INFERENCE_ERROR") {
            self.video.on_inference_error = parse_policy(&policy)?;
        }
        if let Ok(days) = std::env::var("PPE_ANALYTICS_DAYS") {
            self.analytics_days = days
                .trim()
                .parse()
                .map_err(|_| anyhow!("PPE_ANALYTICS_DAYS must be an integer number of days"))?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.db_path.trim().is_empty() {
            return Err(anyhow!("db_path must not be empty"));
        }
        if self.backend.trim().is_empty() {
            return Err(anyhow!("backend must not be empty"));
        }
        if !(0.0..=1.0).contains(&self.conf_threshold) {
            return Err(anyhow!(
                "conf_threshold must be within [0, 1], got {}",
                self.conf_threshold
            ));
        }
        if self.video.sample_rate == 0 {
            return Err(anyhow!("video.sample_rate must be at least 1"));
        }
        if self.video.max_frames == 0 {
            return Err(anyhow!("video.max_frames must be at least 1"));
        }
        if self.analytics_days == 0 || self.analytics_days > MAX_WINDOW_DAYS {
            return Err(anyhow!(
                "analytics.days must be between 1 and {}, got {}",
                MAX_WINDOW_DAYS,
                self.analytics_days
            ));
        }
        Ok(())
    }

    pub fn video_job(&self) -> VideoJob {
        VideoJob {
            conf_threshold: self.conf_threshold,
            sample_rate: self.video.sample_rate,
            max_frames: self.video.max_frames,
            on_inference_error: self.video.on_inference_error,
        }
    }

    pub fn analytics_window(&self, endpoint: Option<String>) -> Result<AnalyticsWindow> {
        Ok(AnalyticsWindow::new(self.analytics_days, endpoint)?)
    }
}

fn parse_policy(value: &str) -> Result<InferenceFailurePolicy> {
    value
        .parse()
        .map_err(|e: String| anyhow!("on_inference_error: {}", e))
}

fn read_config_file(path: &Path) -> Result<AppConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
