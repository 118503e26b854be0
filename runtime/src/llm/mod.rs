//! AI backend seam.
//!
//! Every AI call in the engine goes through [`Assistant`], which applies a
//! timeout and turns any failure into `None`. Callers always hold a
//! deterministic fallback for that case.

pub mod json;
pub mod openai;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

pub use openai::OpenAiBackend;

/// A language-model backend with two call shapes.
#[async_trait]
pub trait AiBackend: Send + Sync {
    /// Request a structured JSON object.
    async fn complete_json(&self, system: &str, prompt: &str) -> Result<Value>;

    /// Request free text.
    async fn chat(&self, system: &str, prompt: &str) -> Result<String>;

    fn name(&self) -> &str;

    /// `false` for backends that never answer.
    fn is_enabled(&self) -> bool {
        true
    }
}

/// Backend used when no model is configured.
pub struct DisabledBackend;

#[async_trait]
impl AiBackend for DisabledBackend {
    async fn complete_json(&self, _system: &str, _prompt: &str) -> Result<Value> {
        Err(anyhow!("AI backend disabled"))
    }

    async fn chat(&self, _system: &str, _prompt: &str) -> Result<String> {
        Err(anyhow!("AI backend disabled"))
    }

    fn name(&self) -> &str {
        "disabled"
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

/// Canned backend for tests and offline runs.
///
/// Replies are matched by a substring of the system prompt, first
/// registration wins. Unmatched calls fail like an unreachable backend.
#[derive(Default)]
pub struct ScriptedBackend {
    json_replies: Mutex<Vec<(String, Value)>>,
    chat_replies: Mutex<Vec<(String, String)>>,
    calls: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_json(self, system_contains: &str, reply: Value) -> Self {
        self.json_replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((system_contains.to_string(), reply));
        self
    }

    pub fn with_chat(self, system_contains: &str, reply: &str) -> Self {
        self.chat_replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((system_contains.to_string(), reply.to_string()));
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl AiBackend for ScriptedBackend {
    async fn complete_json(&self, system: &str, _prompt: &str) -> Result<Value> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let replies = self.json_replies.lock().unwrap_or_else(|e| e.into_inner());
        replies
            .iter()
            .find(|(needle, _)| system.contains(needle.as_str()))
            .map(|(_, v)| v.clone())
            .ok_or_else(|| anyhow!("no scripted JSON reply"))
    }

    async fn chat(&self, system: &str, _prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let replies = self.chat_replies.lock().unwrap_or_else(|e| e.into_inner());
        replies
            .iter()
            .find(|(needle, _)| system.contains(needle.as_str()))
            .map(|(_, v)| v.clone())
            .ok_or_else(|| anyhow!("no scripted chat reply"))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Timeout-guarded front for an [`AiBackend`]. Never returns an error.
#[derive(Clone)]
pub struct Assistant {
    backend: Arc<dyn AiBackend>,
    timeout: Duration,
}

impl Assistant {
    pub fn new(backend: Arc<dyn AiBackend>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    pub fn disabled() -> Self {
        Self::new(Arc::new(DisabledBackend), Duration::from_secs(1))
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_enabled()
    }

    /// Ask for a JSON object and decode it as `T`.
    pub async fn ask_json<T: DeserializeOwned>(&self, system: &str, prompt: &str) -> Option<T> {
        if !self.backend.is_enabled() {
            return None;
        }
        let value = match tokio::time::timeout(
            self.timeout,
            self.backend.complete_json(system, prompt),
        )
        .await
        {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => {
                warn!(backend = self.backend.name(), error = %e, "AI request failed");
                return None;
            }
            Err(_) => {
                warn!(
                    backend = self.backend.name(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "AI request timed out"
                );
                return None;
            }
        };
        match serde_json::from_value(value) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                debug!(error = %e, "AI reply did not match expected shape");
                None
            }
        }
    }

    /// Ask for free text. Blank answers count as no answer.
    pub async fn ask_text(&self, system: &str, prompt: &str) -> Option<String> {
        if !self.backend.is_enabled() {
            return None;
        }
        match tokio::time::timeout(self.timeout, self.backend.chat(system, prompt)).await {
            Ok(Ok(text)) => {
                let text = text.trim().to_string();
                (!text.is_empty()).then_some(text)
            }
            Ok(Err(e)) => {
                warn!(backend = self.backend.name(), error = %e, "AI chat failed");
                None
            }
            Err(_) => {
                warn!(backend = self.backend.name(), "AI chat timed out");
                None
            }
        }
    }
}
