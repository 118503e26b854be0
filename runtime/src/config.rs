//! Runtime configuration.
//!
//! Defaults, then `FUNNELSCOPE_*` environment variables, then CLI flags
//! (applied by the binary on top of [`AuditConfig::from_env`]).

use crate::model::AuditSettings;
use anyhow::{Context, Result};
use std::path::PathBuf;

/// Settings for the OpenAI-compatible AI backend.
#[derive(Debug, Clone)]
pub struct OpenAiSettings {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
}

#[derive(Debug, Clone)]
pub struct AuditConfig {
    /// SQLite database holding every audit.
    pub db_path: PathBuf,
    /// Directory for captured screenshots.
    pub screenshot_dir: PathBuf,
    pub max_depth: u32,
    pub max_pages: usize,
    /// Per-phase fan-out for page-level work.
    pub concurrency: usize,
    /// Re-fetch every page for the backlink pass instead of reusing crawl links.
    pub refetch_backlinks: bool,
    /// Pages analyzed in depth: the homepage plus the best-linked others.
    pub analysis_pages: usize,
    /// Minimum priority score that earns clarifying questions.
    pub question_threshold: u8,
    pub fetch_timeout_ms: u64,
    pub ai_timeout_ms: u64,
    pub capture_timeout_ms: u64,
    /// `None` disables the AI backend; every AI call takes its fallback.
    pub openai: Option<OpenAiSettings>,
    /// Disable screenshot capture entirely.
    pub screenshots: bool,
    pub chromium_path: Option<PathBuf>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        let data_dir = data_dir();
        Self {
            db_path: data_dir.join("audits.db"),
            screenshot_dir: data_dir.join("screenshots"),
            max_depth: 2,
            max_pages: 20,
            concurrency: 4,
            refetch_backlinks: false,
            analysis_pages: 5,
            question_threshold: 70,
            fetch_timeout_ms: 15_000,
            ai_timeout_ms: 30_000,
            capture_timeout_ms: 20_000,
            openai: None,
            screenshots: true,
            chromium_path: None,
        }
    }
}

impl AuditConfig {
    /// The per-audit part of this configuration, stored with new audits.
    pub fn audit_settings(&self) -> AuditSettings {
        AuditSettings {
            max_depth: self.max_depth,
            max_pages: self.max_pages,
            refetch_backlinks: self.refetch_backlinks,
            screenshots: self.screenshots,
        }
    }

    /// Defaults overridden by `FUNNELSCOPE_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(dir) = env_string("FUNNELSCOPE_HOME") {
            let dir = PathBuf::from(dir);
            config.db_path = dir.join("audits.db");
            config.screenshot_dir = dir.join("screenshots");
        }
        if let Some(db) = env_string("FUNNELSCOPE_DB") {
            config.db_path = PathBuf::from(db);
        }
        if let Some(v) = env_parse::<u32>("FUNNELSCOPE_MAX_DEPTH")? {
            config.max_depth = v;
        }
        if let Some(v) = env_parse::<usize>("FUNNELSCOPE_MAX_PAGES")? {
            config.max_pages = v;
        }
        if let Some(v) = env_parse::<usize>("FUNNELSCOPE_CONCURRENCY")? {
            config.concurrency = v.max(1);
        }
        if let Some(v) = env_parse::<bool>("FUNNELSCOPE_REFETCH_BACKLINKS")? {
            config.refetch_backlinks = v;
        }
        if let Some(v) = env_parse::<u64>("FUNNELSCOPE_FETCH_TIMEOUT_MS")? {
            config.fetch_timeout_ms = v;
        }
        if let Some(v) = env_parse::<u64>("FUNNELSCOPE_AI_TIMEOUT_MS")? {
            config.ai_timeout_ms = v;
        }
        if let Some(v) = env_parse::<u64>("FUNNELSCOPE_CAPTURE_TIMEOUT_MS")? {
            config.capture_timeout_ms = v;
        }
        if let Some(v) = env_parse::<bool>("FUNNELSCOPE_SCREENSHOTS")? {
            config.screenshots = v;
        }
        if let Some(path) = env_string("FUNNELSCOPE_CHROMIUM_PATH") {
            config.chromium_path = Some(PathBuf::from(path));
        }

        let api_key =
            env_string("FUNNELSCOPE_OPENAI_API_KEY").or_else(|| env_string("OPENAI_API_KEY"));
        config.openai = api_key.map(|api_key| OpenAiSettings {
            api_key,
            base_url: env_string("FUNNELSCOPE_OPENAI_BASE")
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            model: env_string("FUNNELSCOPE_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string()),
            temperature: 0.2,
        });

        Ok(config)
    }
}

/// `~/.funnelscope`, or `/tmp/.funnelscope` when there is no home directory.
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(".funnelscope")
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env_string(key) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("invalid value for {key}: '{raw}'")),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AuditConfig::default();
        assert_eq!(config.max_depth, 2);
        assert_eq!(config.analysis_pages, 5);
        assert_eq!(config.question_threshold, 70);
        assert!(config.openai.is_none());
        assert!(config.db_path.ends_with("audits.db"));
        assert_eq!(config.audit_settings(), AuditSettings::default());
    }

    #[test]
    fn test_env_parse_rejects_garbage() {
        std::env::set_var("FUNNELSCOPE_TEST_PARSE", "many");
        let err = env_parse::<u32>("FUNNELSCOPE_TEST_PARSE").unwrap_err();
        assert!(format!("{err:#}").contains("FUNNELSCOPE_TEST_PARSE"));
        std::env::remove_var("FUNNELSCOPE_TEST_PARSE");
    }
}
