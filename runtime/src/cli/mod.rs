//! CLI subcommand implementations for the Funnelscope binary.

pub mod audit_cmd;
pub mod doctor;
pub mod output;
pub mod question_cmd;
pub mod report_cmd;

use crate::capture::{ChromiumCapture, NoopCapture, ScreenshotCapture};
use crate::config::AuditConfig;
use crate::llm::{Assistant, OpenAiBackend};
use crate::store::AuditStore;
use crate::workflow::Conductor;
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Environment configuration with the `--db` override applied.
pub fn load_config(db: Option<PathBuf>) -> Result<AuditConfig> {
    let mut config = AuditConfig::from_env()?;
    if let Some(db) = db {
        config.db_path = db;
    }
    Ok(config)
}

pub fn open_store(config: &AuditConfig) -> Result<Arc<AuditStore>> {
    let store = AuditStore::open(&config.db_path)
        .with_context(|| format!("cannot open audit database {}", config.db_path.display()))?;
    Ok(Arc::new(store))
}

/// A conductor wired to real collaborators. Screenshots fall back to
/// placeholders when Chromium cannot be launched.
pub async fn conductor(config: &AuditConfig) -> Result<Conductor> {
    let store = open_store(config)?;
    let assistant = assistant(config)?;

    let capture: Arc<dyn ScreenshotCapture> = if config.screenshots {
        match ChromiumCapture::launch(config.chromium_path.as_deref(), config.screenshot_dir.clone())
            .await
        {
            Ok(capture) => Arc::new(capture),
            Err(e) => {
                let message = format!("{e:#}");
                warn!(error = %message, "screenshots disabled");
                Arc::new(NoopCapture)
            }
        }
    } else {
        Arc::new(NoopCapture)
    };

    Ok(Conductor::new(store, config.clone())
        .with_capture(capture)
        .with_assistant(assistant))
}

pub fn assistant(config: &AuditConfig) -> Result<Assistant> {
    let timeout = Duration::from_millis(config.ai_timeout_ms);
    match &config.openai {
        Some(settings) => {
            let backend = OpenAiBackend::new(settings.clone(), timeout)?;
            Ok(Assistant::new(Arc::new(backend), timeout))
        }
        None => Ok(Assistant::disabled()),
    }
}
