//! `funnelscope report <id>`: print the synthesized findings.

use crate::cli::{self, output};
use crate::config::AuditConfig;
use crate::model::Priority;
use anyhow::{bail, Result};
use serde_json::json;

pub fn run(config: AuditConfig, audit_id: &str, with_results: bool) -> Result<()> {
    let store = cli::open_store(&config)?;
    let audit = store.audit(audit_id)?;
    let Some(report) = store.report(audit_id)? else {
        if output::is_json() {
            output::print_json(&json!({
                "error": "no_report",
                "message": format!("Audit {audit_id} has no report yet"),
                "status": audit.status,
                "phase": audit.phase,
            }));
            return Ok(());
        }
        bail!(
            "Audit {audit_id} has no report yet (status {}, phase {}). Run 'funnelscope resume {audit_id}'.",
            audit.status,
            audit.phase
        );
    };
    let results = if with_results {
        store.results(audit_id)?
    } else {
        Vec::new()
    };

    if output::is_json() {
        output::print_json(&json!({
            "audit_id": audit_id,
            "seed_url": audit.seed_url,
            "report": report,
            "test_results": results,
        }));
        return Ok(());
    }

    println!("Funnelscope report for {}", audit.seed_url);
    println!("Overall score: {}/100", report.overall_score);
    println!();
    println!("{}", report.executive_summary);

    for page in &report.pages {
        println!();
        println!("{} ({})", page.url, page.page_type);
        if page.insights.is_empty() {
            println!("  No issues found.");
        }
        for insight in &page.insights {
            println!("  [{}] {}", marker(insight.priority), insight.issue);
            if !insight.impact.is_empty() {
                println!("      Impact: {}", insight.impact);
            }
            if !insight.recommendation.is_empty() {
                println!("      Fix:    {}", insight.recommendation);
            }
        }
    }

    if !results.is_empty() {
        println!();
        println!("Catalog checks");
        for result in &results {
            println!(
                "  page {:>4}  {:<26} {:<15} {}",
                result.page_id,
                result.test_key,
                result.status.as_str(),
                result.note.as_deref().unwrap_or("")
            );
        }
    }
    Ok(())
}

fn marker(priority: Priority) -> &'static str {
    match priority {
        Priority::Critical => "!!",
        Priority::High => "! ",
        Priority::Medium | Priority::Low => "  ",
    }
}
