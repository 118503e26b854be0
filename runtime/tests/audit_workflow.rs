//! End-to-end audits over an in-memory site with scripted AI replies.

use assert_json_diff::assert_json_include;
use funnelscope_runtime::acquisition::MemoryFetcher;
use funnelscope_runtime::config::AuditConfig;
use funnelscope_runtime::crawl::Crawler;
use funnelscope_runtime::llm::{Assistant, ScriptedBackend};
use funnelscope_runtime::model::{
    AuditMode, AuditStatus, CollectionStatus, PageType, Phase, QuestionStatus, ScoreSource,
    TestingStatus,
};
use funnelscope_runtime::store::AuditStore;
use funnelscope_runtime::workflow::{Conductor, StepOutcome};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

const HOME: &str = r#"<html lang="en"><head><title>Example</title>
    <meta name="description" content="Example widgets for everyone"></head><body>
    <nav><a href="/pricing">Pricing</a><a href="/about">About</a></nav>
    <h1>Widgets that work</h1>
    <a class="btn" href="/pricing" style="background: #0055ff; color: #ffffff; font-size: 20px">Get started</a>
    </body></html>"#;

const PRICING: &str = r#"<html><head><title>Pricing</title></head><body>
    <h1>Plans</h1><p>Starter and Pro plans.</p>
    <form action="/buy"><label for="e">Email</label><input id="e" name="email" type="email">
    <button type="submit">Buy now</button></form></body></html>"#;

const ABOUT: &str = r#"<html><head><title>About us</title></head><body>
    <h1>Our story</h1><p>We have built widgets since 1999.</p></body></html>"#;

fn example_site() -> MemoryFetcher {
    MemoryFetcher::new()
        .with_page("https://example.com/", HOME)
        .with_page("https://example.com/pricing", PRICING)
        .with_page("https://example.com/about", ABOUT)
}

fn config() -> AuditConfig {
    AuditConfig {
        max_depth: 1,
        max_pages: 5,
        concurrency: 2,
        screenshots: false,
        ..AuditConfig::default()
    }
}

fn conductor(store: Arc<AuditStore>) -> Conductor {
    let backend =
        Arc::new(ScriptedBackend::new().with_json("conversion funnel", json!({"score": 60})));
    Conductor::new(store, config())
        .with_fetcher(Arc::new(example_site()))
        .with_assistant(Assistant::new(backend, Duration::from_secs(2)))
}

#[tokio::test]
async fn test_example_com_audit() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(AuditStore::open(&dir.path().join("audits.db")).unwrap());
    let conductor = conductor(store.clone());

    let audit = conductor
        .create_audit("example.com", AuditMode::FullCrawl)
        .unwrap();
    let outcome = conductor.run(&audit.id).await.unwrap();
    assert_eq!(outcome, StepOutcome::AwaitingAnswers { pending: 1 });

    // discovery, scores, and backlinks
    let pages = store.pages(&audit.id).unwrap();
    let urls: HashSet<&str> = pages.iter().map(|p| p.url.as_str()).collect();
    assert_eq!(
        urls,
        HashSet::from([
            "https://example.com/",
            "https://example.com/pricing",
            "https://example.com/about",
        ])
    );
    for page in &pages {
        match page.url.as_str() {
            "https://example.com/" => {
                assert_eq!(page.page_type, PageType::Homepage);
                assert_eq!(page.score(), Some(100));
                assert_eq!(page.priority.unwrap().source, ScoreSource::Fixed);
                assert_eq!(page.metadata.inbound_links, 0);
            }
            _ => {
                assert_eq!(page.priority.unwrap().source, ScoreSource::Ai);
                assert_eq!(page.score(), Some(60));
                assert_eq!(page.metadata.inbound_links, 1);
            }
        }
        assert!(page.is_priority);
    }

    // only the homepage clears the question threshold
    let questions = store.questions(&audit.id).unwrap();
    assert_eq!(questions.len(), 1);
    let home_id = pages.iter().find(|p| p.url == "https://example.com/").unwrap().id;
    assert_eq!(questions[0].page_id, Some(home_id));

    conductor
        .answer(questions[0].id, "Click the main call-to-action button")
        .unwrap();
    assert_eq!(conductor.run(&audit.id).await.unwrap(), StepOutcome::Completed);

    let done = store.audit(&audit.id).unwrap();
    assert_json_include!(
        actual: serde_json::to_value(&done).unwrap(),
        expected: json!({
            "status": "complete",
            "phase": "synthesizing",
            "last_completed_phase": "synthesizing",
            "failed_phase": null,
        })
    );
    assert!(done.priority_reasoning.is_some());

    for page in store.pages(&audit.id).unwrap() {
        assert_eq!(page.testing_status, TestingStatus::Complete);
        // screenshots are disabled, so data is never complete
        assert_eq!(page.collection_status, CollectionStatus::Partial);
        let data = store.page_data(page.id).unwrap().unwrap();
        assert_eq!(data.micro_tests.len(), 10);
        assert!(!store.adaptive_tests(page.id).unwrap().is_empty());
    }
    assert_eq!(store.results(&audit.id).unwrap().len(), 15);

    let report = store.report(&audit.id).unwrap().unwrap();
    assert_eq!(report.pages.len(), 3);
    assert_eq!(Some(report.overall_score), done.overall_score);
    assert!(report
        .executive_summary
        .starts_with("Analyzed 3 priority pages"));
    assert_eq!(
        store.questions(&audit.id).unwrap()[0].status,
        QuestionStatus::Answered
    );
}

#[tokio::test]
async fn test_gate_holds_across_conductors() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audits.db");
    let audit_id = {
        let store = Arc::new(AuditStore::open(&path).unwrap());
        let conductor = conductor(store);
        let audit = conductor
            .create_audit("https://example.com/", AuditMode::FullCrawl)
            .unwrap();
        conductor.run(&audit.id).await.unwrap();
        audit.id
    };

    // a fresh process sees the same pending gate
    let store = Arc::new(AuditStore::open(&path).unwrap());
    let conductor = conductor(store.clone());
    assert!(matches!(
        conductor.invoke(&audit_id, Phase::Analyzing).await.unwrap(),
        StepOutcome::AwaitingAnswers { pending: 1 }
    ));
    let audit = store.audit(&audit_id).unwrap();
    assert_eq!(audit.phase, Phase::Questioning);
    assert_eq!(audit.status, AuditStatus::Collecting);
    assert!(store.page_data(store.pages(&audit_id).unwrap()[0].id).unwrap().is_none());

    let question = &store.questions(&audit_id).unwrap()[0];
    conductor.skip(question.id).unwrap();
    assert!(matches!(
        conductor.invoke(&audit_id, Phase::Analyzing).await.unwrap(),
        StepOutcome::Advanced {
            from: Phase::Analyzing,
            to: Phase::Synthesizing
        }
    ));
}

/// A site where page `n` links to pages `2n` and `2n + 1`.
fn binary_site(size: usize) -> MemoryFetcher {
    let mut fetcher = MemoryFetcher::new();
    for n in 1..=size {
        let url = if n == 1 {
            "https://site.test/".to_string()
        } else {
            format!("https://site.test/p{n}")
        };
        let body = format!(
            r#"<html><body><a href="/p{}">left</a><a href="/p{}">right</a><a href="/">home</a></body></html>"#,
            2 * n,
            2 * n + 1
        );
        fetcher = fetcher.with_page(&url, &body);
    }
    fetcher
}

#[tokio::test]
async fn test_crawl_bounds() {
    let crawler = Crawler::new(Arc::new(binary_site(63)), 4);

    for max_pages in [1, 4, 7, 20] {
        let pages = crawler.discover("site.test", 10, max_pages).await.unwrap();
        assert!(pages.len() <= max_pages);
        let unique: HashSet<&str> = pages.iter().map(|p| p.url.as_str()).collect();
        assert_eq!(unique.len(), pages.len());
    }

    for max_depth in 0..=3u32 {
        let pages = crawler.discover("site.test", max_depth, 100).await.unwrap();
        assert_eq!(pages.len(), (1usize << (max_depth + 1)) - 1);
        assert!(pages.iter().all(|p| p.metadata.depth <= max_depth));
    }
}
