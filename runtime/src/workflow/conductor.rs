//! Phase state machine for one audit at a time.
//!
//! An audit sits in exactly one phase. `advance` runs that phase once and
//! either moves the audit to the next phase, parks it on pending questions,
//! completes it, or marks it failed. Every move is journaled in the store
//! before the next phase can start. Failed audits stay failed until
//! [`Conductor::retry`] is called.

use super::StepOutcome;
use crate::acquisition::{DocumentFetcher, HttpFetcher};
use crate::analysis::{select_analysis_pages, Analyzer, PageAnalysis};
use crate::capture::{NoopCapture, ScreenshotCapture};
use crate::config::AuditConfig;
use crate::crawl::{apply_backlinks, urls, CrawledPage, Crawler};
use crate::error::{AuditError, AuditResult};
use crate::llm::Assistant;
use crate::model::{
    Audit, AuditMode, AuditQuestion, AuditStatus, CollectionStatus, DiscoveredPage, Phase,
    TestingStatus,
};
use crate::questions::{pages_needing_questions, QuestionGenerator};
use crate::scoring::PriorityScorer;
use crate::store::AuditStore;
use crate::synthesis::{PageFindings, Synthesizer};
use anyhow::{bail, Result};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Result of running one phase body.
enum PhaseOutput {
    Done(String),
    Waiting(usize),
}

pub struct Conductor {
    store: Arc<AuditStore>,
    config: AuditConfig,
    fetcher: Arc<dyn DocumentFetcher>,
    capture: Arc<dyn ScreenshotCapture>,
    assistant: Assistant,
}

impl Conductor {
    /// Plain HTTP fetching, no screenshots, no AI. Swap collaborators with
    /// the `with_*` methods.
    pub fn new(store: Arc<AuditStore>, config: AuditConfig) -> Self {
        let fetcher = Arc::new(HttpFetcher::new(config.fetch_timeout_ms));
        Self {
            store,
            config,
            fetcher,
            capture: Arc::new(NoopCapture),
            assistant: Assistant::disabled(),
        }
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn DocumentFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn with_capture(mut self, capture: Arc<dyn ScreenshotCapture>) -> Self {
        self.capture = capture;
        self
    }

    pub fn with_assistant(mut self, assistant: Assistant) -> Self {
        self.assistant = assistant;
        self
    }

    pub fn store(&self) -> &AuditStore {
        &self.store
    }

    /// Validate and normalize the seed, then persist a pending audit. The
    /// crawl limits and screenshot switch of the current configuration are
    /// stored with it and govern every later run.
    pub fn create_audit(&self, seed: &str, mode: AuditMode) -> AuditResult<Audit> {
        let seed = urls::normalize_seed(seed)?;
        let settings = self.config.audit_settings();
        let audit = self.store.create_audit(seed.as_str(), mode, &settings)?;
        info!(audit = %audit.id, seed = %audit.seed_url, mode = %mode, "audit created");
        Ok(audit)
    }

    /// Run the current phase once.
    pub async fn advance(&self, id: &str) -> AuditResult<StepOutcome> {
        let audit = self.store.audit(id)?;
        match audit.status {
            AuditStatus::Complete => Ok(StepOutcome::Completed),
            AuditStatus::Failed => Ok(failed_outcome(&audit)),
            _ => self.step(&audit).await,
        }
    }

    /// Advance until the audit completes, fails, or waits for answers.
    pub async fn run(&self, id: &str) -> AuditResult<StepOutcome> {
        loop {
            let outcome = self.advance(id).await?;
            if outcome.is_settled() {
                return Ok(outcome);
            }
        }
    }

    /// Run `phase` directly. Only the current phase may run, except that
    /// asking for analysis while questioning first clears the question gate.
    pub async fn invoke(&self, id: &str, phase: Phase) -> AuditResult<StepOutcome> {
        let audit = self.store.audit(id)?;
        if audit.status.is_terminal() {
            return Err(AuditError::InvalidTransition {
                current: audit.phase,
                requested: phase,
            });
        }
        if phase == audit.phase {
            return self.step(&audit).await;
        }
        if audit.phase == Phase::Questioning && phase == Phase::Analyzing {
            return match self.step(&audit).await? {
                StepOutcome::Advanced { .. } => {
                    let audit = self.store.audit(id)?;
                    self.step(&audit).await
                }
                gated => Ok(gated),
            };
        }
        Err(AuditError::InvalidTransition {
            current: audit.phase,
            requested: phase,
        })
    }

    /// Restart a failed audit from the phase that failed, discarding what
    /// that phase left behind, then run it forward.
    pub async fn retry(&self, id: &str) -> AuditResult<StepOutcome> {
        let audit = self.store.audit(id)?;
        if audit.status != AuditStatus::Failed {
            return Err(AuditError::NotFailed(id.to_string()));
        }
        let phase = audit.failed_phase.unwrap_or(audit.phase);
        match phase {
            Phase::Crawling => {
                self.store.clear_pages(id)?;
            }
            Phase::Analyzing => self.store.clear_analysis(id)?,
            Phase::Synthesizing => self.store.clear_report(id)?,
            Phase::Prioritizing | Phase::Questioning => {}
        }
        self.store.clear_failure(id)?;
        self.store
            .record_transition(id, phase, phase.status(), None, Some("retry"))?;
        info!(audit = %id, phase = %phase, "retrying audit");
        self.run(id).await
    }

    pub fn answer(&self, question_id: i64, response: &str) -> AuditResult<AuditQuestion> {
        self.store.answer_question(question_id, response)
    }

    pub fn skip(&self, question_id: i64) -> AuditResult<AuditQuestion> {
        self.store.skip_question(question_id)
    }

    pub fn delete(&self, id: &str) -> AuditResult<()> {
        if self.store.delete_audit(id)? {
            info!(audit = %id, "audit deleted");
            Ok(())
        } else {
            Err(AuditError::AuditNotFound(id.to_string()))
        }
    }

    async fn step(&self, audit: &Audit) -> AuditResult<StepOutcome> {
        let phase = audit.phase;
        if audit.status == AuditStatus::Pending {
            self.store
                .record_transition(&audit.id, phase, phase.status(), None, Some("started"))?;
        }

        let output = match phase {
            Phase::Crawling => self.crawl(audit).await,
            Phase::Prioritizing => self.prioritize(audit).await,
            Phase::Questioning => self.question(audit).await,
            Phase::Analyzing => self.analyze(audit).await,
            Phase::Synthesizing => self.synthesize(audit).await,
        };

        match output {
            Ok(PhaseOutput::Waiting(pending)) => {
                info!(audit = %audit.id, pending, "waiting for answers");
                Ok(StepOutcome::AwaitingAnswers { pending })
            }
            Ok(PhaseOutput::Done(note)) => match phase.next() {
                Some(next) => {
                    self.store.record_transition(
                        &audit.id,
                        next,
                        next.status(),
                        Some(phase),
                        Some(&note),
                    )?;
                    info!(audit = %audit.id, from = %phase, to = %next, "{note}");
                    Ok(StepOutcome::Advanced { from: phase, to: next })
                }
                None => {
                    self.store.record_transition(
                        &audit.id,
                        phase,
                        AuditStatus::Complete,
                        Some(phase),
                        Some(&note),
                    )?;
                    info!(audit = %audit.id, "audit complete: {note}");
                    Ok(StepOutcome::Completed)
                }
            },
            Err(e) => {
                let message = format!("{e:#}");
                error!(audit = %audit.id, phase = %phase, error = %message, "phase failed");
                self.store.mark_failed(&audit.id, phase, &message)?;
                Ok(StepOutcome::Failed { phase, message })
            }
        }
    }

    async fn crawl(&self, audit: &Audit) -> Result<PhaseOutput> {
        let crawler = Crawler::new(self.fetcher.clone(), self.config.concurrency);
        let settings = audit.settings;
        let (depth, limit) = match audit.mode {
            AuditMode::SinglePage => (0, 1),
            AuditMode::FullCrawl => (settings.max_depth, settings.max_pages),
        };
        let mut pages = crawler.discover(&audit.seed_url, depth, limit).await?;
        if pages.is_empty() {
            bail!("no pages could be fetched from {}", audit.seed_url);
        }

        let sets = if settings.refetch_backlinks {
            crawler.refetch_link_sets(&pages).await
        } else {
            pages.iter().map(CrawledPage::link_set).collect()
        };
        apply_backlinks(&mut pages, &sets);

        for page in &pages {
            self.store.insert_page(&audit.id, page)?;
        }
        Ok(PhaseOutput::Done(format!("{} pages discovered", pages.len())))
    }

    async fn prioritize(&self, audit: &Audit) -> Result<PhaseOutput> {
        let pages = self.store.pages(&audit.id)?;
        let scorer = PriorityScorer::new(self.assistant.clone());

        let scores: Vec<_> = stream::iter(&pages)
            .map(|page| {
                let scorer = &scorer;
                async move { (page.id, scorer.score(page).await) }
            })
            .buffer_unordered(self.config.concurrency)
            .collect()
            .await;
        for (page_id, score) in scores {
            self.store.set_priority(page_id, score)?;
        }

        let pages = self.store.pages(&audit.id)?;
        let selected: Vec<i64> = select_analysis_pages(&pages, self.config.analysis_pages)
            .iter()
            .map(|p| p.id)
            .collect();
        self.store.set_priority_flags(&audit.id, &selected)?;

        let reasoning = scorer.reasoning(&pages, self.config.analysis_pages).await;
        self.store.set_priority_reasoning(&audit.id, &reasoning)?;

        Ok(PhaseOutput::Done(format!(
            "{} pages scored, {} selected for analysis",
            pages.len(),
            selected.len()
        )))
    }

    /// Generate questions once per audit, then hold until none are pending.
    /// Every page at or above the threshold is asked about, whether or not
    /// it was selected for analysis.
    async fn question(&self, audit: &Audit) -> Result<PhaseOutput> {
        if self.store.questions(&audit.id)?.is_empty() {
            let pages = self.store.pages(&audit.id)?;
            let targets = pages_needing_questions(&pages, self.config.question_threshold);
            let generator = QuestionGenerator::new(self.assistant.clone());

            let batches: Vec<_> = stream::iter(targets)
                .map(|page| generator.generate(page))
                .buffered(self.config.concurrency)
                .collect()
                .await;
            let added = self.store.insert_questions(&audit.id, &batches.concat())?;
            info!(audit = %audit.id, added, "questions generated");
        }

        let pending = self.store.pending_question_count(&audit.id)?;
        if pending > 0 {
            return Ok(PhaseOutput::Waiting(pending));
        }
        Ok(PhaseOutput::Done("questions resolved".to_string()))
    }

    /// Analyze every priority page. A page that cannot be fetched is marked
    /// failed and left out of synthesis; the phase itself still completes.
    async fn analyze(&self, audit: &Audit) -> Result<PhaseOutput> {
        let pages = self.store.priority_pages(&audit.id)?;
        let catalog = self.store.tests()?;
        let capture: Arc<dyn ScreenshotCapture> = if audit.settings.screenshots {
            self.capture.clone()
        } else {
            Arc::new(NoopCapture)
        };
        let analyzer = Analyzer::new(
            self.fetcher.clone(),
            capture,
            self.assistant.clone(),
            Duration::from_millis(self.config.capture_timeout_ms),
        );

        let mut contexts = Vec::with_capacity(pages.len());
        for page in &pages {
            self.store
                .set_collection_status(page.id, CollectionStatus::Collecting)?;
            self.store.set_testing_status(page.id, TestingStatus::Running)?;
            contexts.push(self.store.answers_for_page(&audit.id, page.id)?);
        }

        let results: Vec<(&DiscoveredPage, Result<PageAnalysis>)> =
            stream::iter(pages.iter().zip(&contexts))
                .map(|(page, context)| {
                    let analyzer = &analyzer;
                    let catalog = &catalog;
                    async move { (page, analyzer.analyze(page, context, catalog).await) }
                })
                .buffer_unordered(self.config.concurrency)
                .collect()
                .await;

        let mut analyzed = 0;
        for (page, result) in results {
            match result {
                Ok(analysis) => {
                    self.persist_analysis(&audit.id, page, &analysis)?;
                    analyzed += 1;
                }
                Err(e) => {
                    let message = format!("{e:#}");
                    warn!(url = %page.url, error = %message, "page analysis failed");
                    self.store
                        .set_collection_status(page.id, CollectionStatus::Failed)?;
                    self.store.set_testing_status(page.id, TestingStatus::Failed)?;
                }
            }
        }

        Ok(PhaseOutput::Done(format!(
            "{analyzed} of {} priority pages analyzed",
            pages.len()
        )))
    }

    fn persist_analysis(
        &self,
        audit_id: &str,
        page: &DiscoveredPage,
        analysis: &PageAnalysis,
    ) -> AuditResult<()> {
        self.store.save_page_data(&analysis.data)?;
        self.store
            .set_collection_status(page.id, analysis.collection_status)?;
        self.store.insert_adaptive_tests(page.id, &analysis.tests)?;
        for outcome in &analysis.catalog {
            self.store.record_result(
                audit_id,
                page.id,
                &outcome.test_key,
                outcome.status,
                outcome.note.as_deref(),
            )?;
        }
        self.store.set_testing_status(page.id, TestingStatus::Complete)
    }

    async fn synthesize(&self, audit: &Audit) -> Result<PhaseOutput> {
        let mut findings = Vec::new();
        for page in self.store.priority_pages(&audit.id)? {
            if page.testing_status != TestingStatus::Complete {
                continue;
            }
            findings.push(PageFindings {
                page_id: page.id,
                summary: self.store.page_data(page.id)?.and_then(|d| d.summary),
                tests: self.store.adaptive_tests(page.id)?,
                url: page.url,
                page_type: page.page_type,
            });
        }

        let report = Synthesizer::new(self.assistant.clone())
            .synthesize(&findings)
            .await;
        self.store.save_report(&audit.id, &report)?;
        Ok(PhaseOutput::Done(format!(
            "overall score {}",
            report.overall_score
        )))
    }
}

fn failed_outcome(audit: &Audit) -> StepOutcome {
    StepOutcome::Failed {
        phase: audit.failed_phase.unwrap_or(audit.phase),
        message: audit
            .failure_message
            .clone()
            .unwrap_or_else(|| "unknown failure".to_string()),
    }
}
