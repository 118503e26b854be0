//! `funnelscope run|status|list|resume|retry|delete`: audit lifecycle commands.

use crate::cli::{self, output};
use crate::config::AuditConfig;
use crate::model::{Audit, AuditMode, AuditSettings, Phase};
use crate::workflow::{Conductor, StepOutcome};
use anyhow::Result;
use serde_json::json;

/// Overrides for a new audit, taken from `run` flags.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub single_page: bool,
    pub max_depth: Option<u32>,
    pub max_pages: Option<usize>,
    pub refetch_backlinks: bool,
    pub no_screenshots: bool,
}

impl RunOptions {
    fn apply(&self, config: &mut AuditConfig) {
        if let Some(depth) = self.max_depth {
            config.max_depth = depth;
        }
        if let Some(pages) = self.max_pages {
            config.max_pages = pages;
        }
        if self.refetch_backlinks {
            config.refetch_backlinks = true;
        }
        if self.no_screenshots {
            config.screenshots = false;
        }
    }
}

/// Match `config` to the limits an audit was created with. Screenshots stay
/// off when either side turned them off.
fn adopt_settings(config: &mut AuditConfig, settings: &AuditSettings) {
    config.max_depth = settings.max_depth;
    config.max_pages = settings.max_pages;
    config.refetch_backlinks = settings.refetch_backlinks;
    config.screenshots &= settings.screenshots;
}

/// A conductor for an audit that already exists.
async fn conductor_for(mut config: AuditConfig, id: &str) -> Result<Conductor> {
    let audit = cli::open_store(&config)?.audit(id)?;
    adopt_settings(&mut config, &audit.settings);
    cli::conductor(&config).await
}

/// Create an audit for `url` and run it as far as it goes.
pub async fn run(mut config: AuditConfig, url: &str, options: &RunOptions) -> Result<()> {
    options.apply(&mut config);
    let conductor = cli::conductor(&config).await?;
    let mode = if options.single_page {
        AuditMode::SinglePage
    } else {
        AuditMode::FullCrawl
    };
    let audit = conductor.create_audit(url, mode)?;
    if !output::is_quiet() && !output::is_json() {
        eprintln!("  Audit {} started for {}", audit.id, audit.seed_url);
    }
    drive(&conductor, &audit.id, Drive::Run).await
}

/// Continue an audit that was waiting for answers.
pub async fn resume(config: AuditConfig, id: &str) -> Result<()> {
    let conductor = conductor_for(config, id).await?;
    drive(&conductor, id, Drive::Run).await
}

/// Restart a failed audit from the phase that failed.
pub async fn retry(config: AuditConfig, id: &str) -> Result<()> {
    let conductor = conductor_for(config, id).await?;
    drive(&conductor, id, Drive::Retry).await
}

/// Run a single phase directly.
pub async fn invoke(config: AuditConfig, id: &str, phase: &str) -> Result<()> {
    let phase: Phase = phase.parse()?;
    let conductor = conductor_for(config, id).await?;
    drive(&conductor, id, Drive::Invoke(phase)).await
}

enum Drive {
    Run,
    Retry,
    Invoke(Phase),
}

async fn drive(conductor: &Conductor, id: &str, how: Drive) -> Result<()> {
    let bar = output::spinner("Auditing…");
    let outcome = match how {
        Drive::Run => conductor.run(id).await,
        Drive::Retry => conductor.retry(id).await,
        Drive::Invoke(phase) => conductor.invoke(id, phase).await,
    };
    bar.finish_and_clear();
    let outcome = outcome?;
    let audit = conductor.store().audit(id)?;

    if output::is_json() {
        output::print_json(&json!({
            "audit": audit,
            "result": outcome,
        }));
        return Ok(());
    }
    if output::is_quiet() {
        return Ok(());
    }

    match &outcome {
        StepOutcome::Advanced { from, to } => {
            eprintln!("  Finished {from}; next phase is {to}.");
        }
        StepOutcome::AwaitingAnswers { pending } => {
            eprintln!("  Waiting for {pending} answer(s) before analysis can start.");
            eprintln!("  Run: funnelscope questions {id}");
            eprintln!("  Then: funnelscope answer <question-id> \"<answer>\"  (or skip <question-id>)");
            eprintln!("  Then: funnelscope resume {id}");
        }
        StepOutcome::Completed => {
            eprintln!(
                "  Audit complete. Overall score: {}/100",
                audit.overall_score.unwrap_or(0)
            );
            eprintln!("  Run: funnelscope report {id}");
        }
        StepOutcome::Failed { phase, message } => {
            eprintln!("  Audit failed during {phase}: {message}");
            eprintln!("  Run: funnelscope retry {id}");
        }
    }
    Ok(())
}

/// Show one audit with its pages and journal.
pub fn status(config: AuditConfig, id: &str) -> Result<()> {
    let store = cli::open_store(&config)?;
    let audit = store.audit(id)?;
    let pages = store.pages(id)?;
    let journal = store.transitions(id)?;
    let pending = store.pending_question_count(id)?;

    if output::is_json() {
        output::print_json(&json!({
            "audit": audit,
            "pages": pages,
            "pending_questions": pending,
            "transitions": journal,
        }));
        return Ok(());
    }

    print_audit_line(&audit);
    if let Some(reasoning) = &audit.priority_reasoning {
        eprintln!("  {reasoning}");
    }
    if let Some(message) = &audit.failure_message {
        eprintln!("  Failure: {message}");
    }
    if pending > 0 {
        eprintln!("  {pending} question(s) pending");
    }

    if !pages.is_empty() {
        eprintln!();
        eprintln!("  {:>4}  {:<10} {:>5} {:>4}  URL", "ID", "TYPE", "SCORE", "IN");
        for page in &pages {
            let score = page
                .priority
                .map(|s| format!("{}{}", s.value, if page.is_priority { "*" } else { "" }))
                .unwrap_or_else(|| "-".to_string());
            eprintln!(
                "  {:>4}  {:<10} {:>5} {:>4}  {}",
                page.id,
                page.page_type.as_str(),
                score,
                page.metadata.inbound_links,
                output::clip(&page.url, 80)
            );
        }
    }

    if output::is_verbose() && !journal.is_empty() {
        eprintln!();
        for t in &journal {
            eprintln!(
                "  {}  {:<13} {:<11} {}",
                t.at,
                t.phase.as_str(),
                t.status.as_str(),
                t.note.as_deref().unwrap_or("")
            );
        }
    }
    Ok(())
}

pub fn list(config: AuditConfig) -> Result<()> {
    let store = cli::open_store(&config)?;
    let audits = store.audits()?;

    if output::is_json() {
        output::print_json(&json!({ "total": audits.len(), "audits": audits }));
        return Ok(());
    }
    if audits.is_empty() {
        if !output::is_quiet() {
            eprintln!("  No audits yet. Run: funnelscope run <url>");
        }
        return Ok(());
    }
    for audit in &audits {
        print_audit_line(audit);
    }
    Ok(())
}

pub fn delete(config: AuditConfig, id: &str) -> Result<()> {
    let store = cli::open_store(&config)?;
    let conductor = Conductor::new(store, config);
    conductor.delete(id)?;
    if output::is_json() {
        output::print_json(&json!({ "deleted": id }));
    } else if !output::is_quiet() {
        eprintln!("  Deleted audit {id}");
    }
    Ok(())
}

fn print_audit_line(audit: &Audit) {
    let score = audit
        .overall_score
        .map(|s| format!("score {s}"))
        .unwrap_or_default();
    eprintln!(
        "  {}  {:<10} {:<13} {:<12} {}  {}",
        audit.id,
        audit.status.as_str(),
        audit.phase.as_str(),
        audit.mode.as_str(),
        audit.seed_url,
        score
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_flags_become_audit_settings() {
        let mut config = AuditConfig::default();
        RunOptions {
            max_depth: Some(4),
            max_pages: Some(7),
            no_screenshots: true,
            ..RunOptions::default()
        }
        .apply(&mut config);
        let settings = config.audit_settings();
        assert_eq!(settings.max_depth, 4);
        assert_eq!(settings.max_pages, 7);
        assert!(!settings.screenshots);
    }

    #[test]
    fn test_existing_audit_keeps_its_settings() {
        let settings = AuditSettings {
            max_depth: 4,
            max_pages: 7,
            refetch_backlinks: true,
            screenshots: false,
        };
        let mut config = AuditConfig::default();
        adopt_settings(&mut config, &settings);
        assert_eq!(config.audit_settings(), settings);

        // a screenshot-enabled audit still honours a disabled environment
        let mut config = AuditConfig {
            screenshots: false,
            ..AuditConfig::default()
        };
        adopt_settings(&mut config, &AuditSettings::default());
        assert!(!config.screenshots);
    }
}
