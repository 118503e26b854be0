//! Environment readiness check.

use crate::capture::chromium::find_chromium;
use crate::cli::output;
use crate::config::AuditConfig;
use crate::store::AuditStore;
use anyhow::Result;
use serde_json::json;

/// Check the database, Chromium, and the AI backend configuration.
pub async fn run(config: AuditConfig) -> Result<()> {
    let chromium = find_chromium(config.chromium_path.as_deref());
    let store = AuditStore::open(&config.db_path);
    let catalog_size = store
        .as_ref()
        .ok()
        .and_then(|s| s.tests().ok())
        .map(|t| t.len());
    let ai_model = config.openai.as_ref().map(|s| s.model.clone());

    if output::is_json() {
        output::print_json(&json!({
            "os": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
            "database": {
                "path": config.db_path.display().to_string(),
                "ok": store.is_ok(),
                "catalog_tests": catalog_size,
            },
            "chromium": chromium.as_ref().map(|p| p.display().to_string()),
            "screenshots": config.screenshots,
            "ai_model": ai_model,
            "ready": store.is_ok(),
        }));
        return Ok(());
    }

    println!("Funnelscope Doctor");
    println!("==================");
    println!();
    println!("OS:   {}", std::env::consts::OS);
    println!("Arch: {}", std::env::consts::ARCH);
    println!();

    match &store {
        Ok(_) => println!(
            "[OK] Database: {} ({} catalog tests)",
            config.db_path.display(),
            catalog_size.unwrap_or(0)
        ),
        Err(e) => println!("[!!] Database {} unusable: {e}", config.db_path.display()),
    }

    match (&chromium, config.screenshots) {
        (_, false) => println!("[--] Screenshots disabled (FUNNELSCOPE_SCREENSHOTS=false)"),
        (Some(path), true) => println!("[OK] Chromium found: {}", path.display()),
        (None, true) => println!(
            "[!!] Chromium NOT found. Screenshots will be placeholders. Set FUNNELSCOPE_CHROMIUM_PATH."
        ),
    }

    match &config.openai {
        Some(settings) => println!(
            "[OK] AI backend: {} at {}",
            settings.model, settings.base_url
        ),
        None => println!(
            "[!!] No AI backend configured. Set OPENAI_API_KEY; rule-based fallbacks will be used."
        ),
    }

    println!();
    if store.is_ok() {
        println!("Status: READY");
    } else {
        println!("Status: NOT READY");
        println!("  Set FUNNELSCOPE_DB or --db to a writable location.");
    }
    Ok(())
}
