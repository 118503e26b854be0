//! Output mode flags and helpers shared by every subcommand.
//!
//! The binary turns `--json`, `--quiet`, and `--verbose` into environment
//! flags once at startup, so subcommands never thread them through.

use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use std::time::Duration;

pub const JSON_FLAG: &str = "FUNNELSCOPE_JSON";
pub const QUIET_FLAG: &str = "FUNNELSCOPE_QUIET";
pub const VERBOSE_FLAG: &str = "FUNNELSCOPE_VERBOSE";

fn flag(name: &str) -> bool {
    matches!(
        std::env::var(name).as_deref(),
        Ok("1") | Ok("true") | Ok("yes")
    )
}

pub fn is_json() -> bool {
    flag(JSON_FLAG)
}

pub fn is_quiet() -> bool {
    flag(QUIET_FLAG)
}

pub fn is_verbose() -> bool {
    flag(VERBOSE_FLAG)
}

/// Pretty JSON on stdout.
pub fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(_) => println!("{value}"),
    }
}

/// A stderr spinner, hidden in JSON or quiet mode.
pub fn spinner(message: &str) -> ProgressBar {
    if is_json() || is_quiet() {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("  {spinner} {msg}") {
        bar.set_style(style);
    }
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

/// Truncate to `max` characters with an ellipsis.
pub fn clip(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}
