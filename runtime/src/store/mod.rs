//! SQLite persistence for audits and everything they own.
//!
//! One connection behind a mutex. Every child table cascades from `audits`,
//! so deleting an audit removes all of its pages, data, questions, tests,
//! results, and journal rows.

mod catalog;
mod pages;
mod questions;

use crate::error::{AuditError, AuditResult};
use crate::model::{
    Audit, AuditMode, AuditSettings, AuditStatus, Phase, PhaseTransition, UnknownLabel,
};
use crate::synthesis::Report;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS audits (
    id TEXT PRIMARY KEY,
    seed_url TEXT NOT NULL,
    mode TEXT NOT NULL,
    max_depth INTEGER NOT NULL DEFAULT 2,
    max_pages INTEGER NOT NULL DEFAULT 20,
    refetch_backlinks INTEGER NOT NULL DEFAULT 0,
    screenshots INTEGER NOT NULL DEFAULT 1,
    phase TEXT NOT NULL,
    status TEXT NOT NULL,
    failed_phase TEXT,
    failure_message TEXT,
    last_completed_phase TEXT,
    priority_reasoning TEXT,
    executive_summary TEXT,
    overall_score INTEGER,
    report_json TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS pages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    audit_id TEXT NOT NULL REFERENCES audits(id) ON DELETE CASCADE,
    url TEXT NOT NULL,
    page_type TEXT NOT NULL,
    priority_score INTEGER,
    score_source TEXT,
    metadata TEXT NOT NULL,
    collection_status TEXT NOT NULL DEFAULT 'pending',
    testing_status TEXT NOT NULL DEFAULT 'pending',
    is_priority INTEGER NOT NULL DEFAULT 0,
    UNIQUE (audit_id, url)
);

CREATE TABLE IF NOT EXISTS page_data (
    page_id INTEGER PRIMARY KEY REFERENCES pages(id) ON DELETE CASCADE,
    payload TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS questions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    audit_id TEXT NOT NULL REFERENCES audits(id) ON DELETE CASCADE,
    page_id INTEGER REFERENCES pages(id) ON DELETE CASCADE,
    question_type TEXT NOT NULL,
    text TEXT NOT NULL,
    options TEXT,
    response TEXT,
    status TEXT NOT NULL DEFAULT 'pending'
);
CREATE UNIQUE INDEX IF NOT EXISTS questions_per_page
    ON questions (audit_id, COALESCE(page_id, 0), question_type);

CREATE TABLE IF NOT EXISTS adaptive_tests (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    page_id INTEGER NOT NULL REFERENCES pages(id) ON DELETE CASCADE,
    test_type TEXT NOT NULL,
    decision_reason TEXT NOT NULL,
    result TEXT NOT NULL,
    impact_score INTEGER NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS test_groups (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    description TEXT
);

CREATE TABLE IF NOT EXISTS tests (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    group_id INTEGER NOT NULL REFERENCES test_groups(id) ON DELETE CASCADE,
    key TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    prompt TEXT NOT NULL,
    data_sources TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS test_results (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    audit_id TEXT NOT NULL REFERENCES audits(id) ON DELETE CASCADE,
    page_id INTEGER NOT NULL REFERENCES pages(id) ON DELETE CASCADE,
    test_key TEXT NOT NULL,
    status TEXT NOT NULL,
    note TEXT,
    UNIQUE (page_id, test_key)
);

CREATE TABLE IF NOT EXISTS phase_transitions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    audit_id TEXT NOT NULL REFERENCES audits(id) ON DELETE CASCADE,
    phase TEXT NOT NULL,
    status TEXT NOT NULL,
    note TEXT,
    at TEXT NOT NULL
);
";

const AUDIT_COLUMNS: &str = "id, seed_url, mode, phase, status, failed_phase, failure_message, \
    last_completed_phase, priority_reasoning, executive_summary, overall_score, created_at, updated_at, \
    max_depth, max_pages, refetch_backlinks, screenshots";

pub struct AuditStore {
    conn: Mutex<Connection>,
}

impl AuditStore {
    /// Open or create the database at `path`, creating parent directories.
    pub fn open(path: &Path) -> AuditResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                // a missing directory surfaces as the open error below
                let _ = std::fs::create_dir_all(parent);
            }
        }
        Self::init(Connection::open(path)?)
    }

    pub fn in_memory() -> AuditResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> AuditResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.seed_catalog()?;
        Ok(store)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ── audits ────────────────────────────────────────────────────────

    pub fn create_audit(
        &self,
        seed_url: &str,
        mode: AuditMode,
        settings: &AuditSettings,
    ) -> AuditResult<Audit> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = now();
        self.conn().execute(
            "INSERT INTO audits (id, seed_url, mode, phase, status, created_at, updated_at,
                 max_depth, max_pages, refetch_backlinks, screenshots)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6, ?7, ?8, ?9, ?10)",
            params![
                id,
                seed_url,
                mode.as_str(),
                Phase::Crawling.as_str(),
                AuditStatus::Pending.as_str(),
                now,
                settings.max_depth,
                settings.max_pages as i64,
                settings.refetch_backlinks,
                settings.screenshots
            ],
        )?;
        debug!(audit = %id, seed_url, "audit created");
        self.audit(&id)
    }

    pub fn audit(&self, id: &str) -> AuditResult<Audit> {
        self.conn()
            .query_row(
                &format!("SELECT {AUDIT_COLUMNS} FROM audits WHERE id = ?1"),
                params![id],
                audit_from_row,
            )
            .optional()?
            .ok_or_else(|| AuditError::AuditNotFound(id.to_string()))
    }

    /// Every audit, newest first.
    pub fn audits(&self) -> AuditResult<Vec<Audit>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {AUDIT_COLUMNS} FROM audits ORDER BY created_at DESC, rowid DESC"
        ))?;
        let audits = stmt
            .query_map([], audit_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(audits)
    }

    /// Remove an audit and, by cascade, everything it owns.
    pub fn delete_audit(&self, id: &str) -> AuditResult<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM audits WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    /// Move an audit to `phase`/`status` and journal the move in one
    /// transaction. `completed` becomes the last completed phase when given.
    ///
    /// Phases only move forward: a `phase` before the current one is an
    /// [`AuditError::InvalidTransition`]. Restarting the current phase is
    /// allowed.
    pub fn record_transition(
        &self,
        id: &str,
        phase: Phase,
        status: AuditStatus,
        completed: Option<Phase>,
        note: Option<&str>,
    ) -> AuditResult<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let current: Phase = tx
            .query_row(
                "SELECT phase FROM audits WHERE id = ?1",
                params![id],
                |row| label(row, 0),
            )
            .optional()?
            .ok_or_else(|| AuditError::AuditNotFound(id.to_string()))?;
        if phase < current {
            return Err(AuditError::InvalidTransition {
                current,
                requested: phase,
            });
        }
        let now = now();
        let rows = tx.execute(
            "UPDATE audits SET phase = ?2, status = ?3,
                 last_completed_phase = COALESCE(?4, last_completed_phase),
                 updated_at = ?5
             WHERE id = ?1",
            params![
                id,
                phase.as_str(),
                status.as_str(),
                completed.map(Phase::as_str),
                now
            ],
        )?;
        if rows == 0 {
            return Err(AuditError::AuditNotFound(id.to_string()));
        }
        tx.execute(
            "INSERT INTO phase_transitions (audit_id, phase, status, note, at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, phase.as_str(), status.as_str(), note, now],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Mark the audit failed in `phase`, keeping its last completed phase.
    pub fn mark_failed(&self, id: &str, phase: Phase, message: &str) -> AuditResult<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let now = now();
        let rows = tx.execute(
            "UPDATE audits SET phase = ?2, status = ?3, failed_phase = ?2,
                 failure_message = ?4, updated_at = ?5
             WHERE id = ?1",
            params![id, phase.as_str(), AuditStatus::Failed.as_str(), message, now],
        )?;
        if rows == 0 {
            return Err(AuditError::AuditNotFound(id.to_string()));
        }
        tx.execute(
            "INSERT INTO phase_transitions (audit_id, phase, status, note, at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, phase.as_str(), AuditStatus::Failed.as_str(), message, now],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn clear_failure(&self, id: &str) -> AuditResult<()> {
        self.conn().execute(
            "UPDATE audits SET failed_phase = NULL, failure_message = NULL, updated_at = ?2
             WHERE id = ?1",
            params![id, now()],
        )?;
        Ok(())
    }

    /// The journal, oldest first.
    pub fn transitions(&self, id: &str) -> AuditResult<Vec<PhaseTransition>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT audit_id, phase, status, note, at FROM phase_transitions
             WHERE audit_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![id], |row| {
                Ok(PhaseTransition {
                    audit_id: row.get(0)?,
                    phase: label(row, 1)?,
                    status: label(row, 2)?,
                    note: row.get(3)?,
                    at: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn set_priority_reasoning(&self, id: &str, reasoning: &str) -> AuditResult<()> {
        self.conn().execute(
            "UPDATE audits SET priority_reasoning = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, reasoning, now()],
        )?;
        Ok(())
    }

    pub fn save_report(&self, id: &str, report: &Report) -> AuditResult<()> {
        let json = serde_json::to_string(report)?;
        self.conn().execute(
            "UPDATE audits SET executive_summary = ?2, overall_score = ?3, report_json = ?4,
                 updated_at = ?5
             WHERE id = ?1",
            params![id, report.executive_summary, report.overall_score, json, now()],
        )?;
        Ok(())
    }

    pub fn report(&self, id: &str) -> AuditResult<Option<Report>> {
        let json: Option<String> = self
            .conn()
            .query_row(
                "SELECT report_json FROM audits WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| AuditError::AuditNotFound(id.to_string()))?;
        json.map(|j| serde_json::from_str(&j))
            .transpose()
            .map_err(AuditError::from)
    }

    pub fn clear_report(&self, id: &str) -> AuditResult<()> {
        self.conn().execute(
            "UPDATE audits SET executive_summary = NULL, overall_score = NULL, report_json = NULL
             WHERE id = ?1",
            params![id],
        )?;
        Ok(())
    }
}

pub(crate) fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Read a labelled enum column.
pub(crate) fn label<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = UnknownLabel>,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e: UnknownLabel| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn optional_label<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr<Err = UnknownLabel>,
{
    let raw: Option<String> = row.get(idx)?;
    raw.map(|r| {
        r.parse().map_err(|e: UnknownLabel| {
            rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
        })
    })
    .transpose()
}

/// Read a JSON text column.
pub(crate) fn json_column<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

fn audit_from_row(row: &Row<'_>) -> rusqlite::Result<Audit> {
    Ok(Audit {
        id: row.get(0)?,
        seed_url: row.get(1)?,
        mode: label(row, 2)?,
        phase: label(row, 3)?,
        status: label(row, 4)?,
        failed_phase: optional_label(row, 5)?,
        failure_message: row.get(6)?,
        last_completed_phase: optional_label(row, 7)?,
        priority_reasoning: row.get(8)?,
        executive_summary: row.get(9)?,
        overall_score: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
        settings: AuditSettings {
            max_depth: row.get(13)?,
            max_pages: row.get::<_, i64>(14)?.max(0) as usize,
            refetch_backlinks: row.get(15)?,
            screenshots: row.get(16)?,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawl::CrawledPage;
    use crate::model::{CrawlMetadata, PageType, Priority};
    use crate::synthesis::{Insight, PageInsights};

    pub(super) fn crawled(url: &str) -> CrawledPage {
        CrawledPage {
            url: url.to_string(),
            page_type: PageType::Other,
            metadata: CrawlMetadata::default(),
            links: Vec::new(),
        }
    }

    #[test]
    fn test_audit_lifecycle_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("audits.db");
        let store = AuditStore::open(&path).unwrap();

        let audit = store
            .create_audit(
                "https://example.com/",
                AuditMode::FullCrawl,
                &AuditSettings::default(),
            )
            .unwrap();
        assert_eq!(audit.phase, Phase::Crawling);
        assert_eq!(audit.status, AuditStatus::Pending);
        assert_eq!(audit.id.len(), 36);

        store
            .record_transition(&audit.id, Phase::Crawling, AuditStatus::Crawling, None, None)
            .unwrap();
        store
            .record_transition(
                &audit.id,
                Phase::Prioritizing,
                AuditStatus::Collecting,
                Some(Phase::Crawling),
                Some("3 pages"),
            )
            .unwrap();

        drop(store);
        let store = AuditStore::open(&path).unwrap();
        let reloaded = store.audit(&audit.id).unwrap();
        assert_eq!(reloaded.phase, Phase::Prioritizing);
        assert_eq!(reloaded.last_completed_phase, Some(Phase::Crawling));

        let journal = store.transitions(&audit.id).unwrap();
        assert_eq!(journal.len(), 2);
        assert_eq!(journal[1].note.as_deref(), Some("3 pages"));
    }

    #[test]
    fn test_failure_keeps_last_completed_phase() {
        let store = AuditStore::in_memory().unwrap();
        let audit = store
            .create_audit(
                "https://example.com/",
                AuditMode::FullCrawl,
                &AuditSettings::default(),
            )
            .unwrap();
        store
            .record_transition(
                &audit.id,
                Phase::Prioritizing,
                AuditStatus::Collecting,
                Some(Phase::Crawling),
                None,
            )
            .unwrap();
        store
            .mark_failed(&audit.id, Phase::Prioritizing, "boom")
            .unwrap();

        let failed = store.audit(&audit.id).unwrap();
        assert_eq!(failed.status, AuditStatus::Failed);
        assert_eq!(failed.failed_phase, Some(Phase::Prioritizing));
        assert_eq!(failed.last_completed_phase, Some(Phase::Crawling));

        store.clear_failure(&audit.id).unwrap();
        assert!(store.audit(&audit.id).unwrap().failed_phase.is_none());
    }

    #[test]
    fn test_settings_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audits.db");
        let settings = AuditSettings {
            max_depth: 4,
            max_pages: 7,
            refetch_backlinks: true,
            screenshots: false,
        };
        let id = AuditStore::open(&path)
            .unwrap()
            .create_audit("https://example.com/", AuditMode::FullCrawl, &settings)
            .unwrap()
            .id;

        let reloaded = AuditStore::open(&path).unwrap().audit(&id).unwrap();
        assert_eq!(reloaded.settings, settings);
    }

    #[test]
    fn test_transitions_only_move_forward() {
        let store = AuditStore::in_memory().unwrap();
        let audit = store
            .create_audit(
                "https://example.com/",
                AuditMode::FullCrawl,
                &AuditSettings::default(),
            )
            .unwrap();
        store
            .record_transition(
                &audit.id,
                Phase::Analyzing,
                AuditStatus::Testing,
                Some(Phase::Questioning),
                None,
            )
            .unwrap();

        let err = store
            .record_transition(&audit.id, Phase::Crawling, AuditStatus::Crawling, None, None)
            .unwrap_err();
        assert!(matches!(
            err,
            AuditError::InvalidTransition {
                current: Phase::Analyzing,
                requested: Phase::Crawling
            }
        ));
        let unchanged = store.audit(&audit.id).unwrap();
        assert_eq!(unchanged.phase, Phase::Analyzing);
        assert_eq!(store.transitions(&audit.id).unwrap().len(), 1);

        // restarting the current phase is how a retry re-enters it
        store
            .record_transition(&audit.id, Phase::Analyzing, AuditStatus::Testing, None, Some("retry"))
            .unwrap();
        assert!(matches!(
            store.record_transition("missing", Phase::Crawling, AuditStatus::Crawling, None, None),
            Err(AuditError::AuditNotFound(_))
        ));
    }

    #[test]
    fn test_delete_cascades() {
        let store = AuditStore::in_memory().unwrap();
        let audit = store
            .create_audit(
                "https://example.com/",
                AuditMode::FullCrawl,
                &AuditSettings::default(),
            )
            .unwrap();
        let page_id = store
            .insert_page(&audit.id, &crawled("https://example.com/"))
            .unwrap();
        store
            .record_transition(&audit.id, Phase::Crawling, AuditStatus::Crawling, None, None)
            .unwrap();

        assert!(store.delete_audit(&audit.id).unwrap());
        assert!(!store.delete_audit(&audit.id).unwrap());
        assert!(matches!(
            store.audit(&audit.id),
            Err(AuditError::AuditNotFound(_))
        ));
        assert!(matches!(
            store.page(page_id),
            Err(AuditError::PageNotFound(_))
        ));
        assert!(store.transitions(&audit.id).unwrap().is_empty());
    }

    #[test]
    fn test_report_round_trip() {
        let store = AuditStore::in_memory().unwrap();
        let audit = store
            .create_audit(
                "https://example.com/",
                AuditMode::SinglePage,
                &AuditSettings::default(),
            )
            .unwrap();
        assert!(store.report(&audit.id).unwrap().is_none());

        let report = Report {
            executive_summary: "Fix the CTA.".into(),
            overall_score: 80,
            pages: vec![PageInsights {
                page_id: 1,
                url: "https://example.com/".into(),
                page_type: PageType::Homepage,
                insights: vec![Insight {
                    issue: "No prominent call to action".into(),
                    impact: "x".into(),
                    recommendation: "y".into(),
                    priority: Priority::Critical,
                }],
            }],
        };
        store.save_report(&audit.id, &report).unwrap();

        assert_eq!(store.report(&audit.id).unwrap(), Some(report));
        let audit = store.audit(&audit.id).unwrap();
        assert_eq!(audit.overall_score, Some(80));
        assert_eq!(audit.executive_summary.as_deref(), Some("Fix the CTA."));
    }
}
