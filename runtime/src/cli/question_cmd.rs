//! `funnelscope questions|answer|skip`: the site owner's side of the question gate.

use crate::cli::{self, output};
use crate::config::AuditConfig;
use crate::model::{AuditQuestion, QuestionStatus};
use crate::workflow::Conductor;
use anyhow::Result;
use serde_json::json;

/// List an audit's questions, pending ones first unless `all` is set.
pub fn list(config: AuditConfig, audit_id: &str, all: bool) -> Result<()> {
    let store = cli::open_store(&config)?;
    store.audit(audit_id)?;
    let questions: Vec<AuditQuestion> = store
        .questions(audit_id)?
        .into_iter()
        .filter(|q| all || q.status == QuestionStatus::Pending)
        .collect();

    if output::is_json() {
        output::print_json(&json!({
            "audit_id": audit_id,
            "total": questions.len(),
            "questions": questions,
        }));
        return Ok(());
    }
    if questions.is_empty() {
        if !output::is_quiet() {
            eprintln!("  No pending questions. Run: funnelscope resume {audit_id}");
        }
        return Ok(());
    }

    let pages = store.pages(audit_id)?;
    for q in &questions {
        let page = q
            .page_id
            .and_then(|id| pages.iter().find(|p| p.id == id))
            .map(|p| p.url.as_str())
            .unwrap_or("whole site");
        eprintln!("  [{}] {} ({})", q.id, q.text, page);
        if let Some(options) = &q.options {
            for option in options {
                eprintln!("        - {option}");
            }
        }
        if q.status != QuestionStatus::Pending {
            eprintln!(
                "        {}: {}",
                q.status,
                q.response.as_deref().unwrap_or("-")
            );
        }
    }
    Ok(())
}

pub fn answer(config: AuditConfig, question_id: i64, response: &str) -> Result<()> {
    let conductor = Conductor::new(cli::open_store(&config)?, config);
    let question = conductor.answer(question_id, response)?;
    report(&conductor, &question)
}

pub fn skip(config: AuditConfig, question_id: i64) -> Result<()> {
    let conductor = Conductor::new(cli::open_store(&config)?, config);
    let question = conductor.skip(question_id)?;
    report(&conductor, &question)
}

fn report(conductor: &Conductor, question: &AuditQuestion) -> Result<()> {
    let pending = conductor
        .store()
        .pending_question_count(&question.audit_id)?;
    if output::is_json() {
        output::print_json(&json!({
            "question": question,
            "pending": pending,
        }));
        return Ok(());
    }
    if !output::is_quiet() {
        eprintln!("  Question {} {}", question.id, question.status);
        if pending == 0 {
            eprintln!(
                "  All questions resolved. Run: funnelscope resume {}",
                question.audit_id
            );
        } else {
            eprintln!("  {pending} question(s) still pending");
        }
    }
    Ok(())
}
