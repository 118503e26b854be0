use super::{is_unique_violation, json_column, label, now, optional_label, AuditStore};
use crate::crawl::CrawledPage;
use crate::error::{AuditError, AuditResult};
use crate::model::{
    AdaptiveTest, CollectionStatus, DiscoveredPage, NewAdaptiveTest, PageData, Scored,
    TestingStatus,
};
use rusqlite::{params, OptionalExtension, Row};

const PAGE_COLUMNS: &str = "id, audit_id, url, page_type, priority_score, score_source, metadata, \
    collection_status, testing_status, is_priority";

impl AuditStore {
    /// Persist a crawled page. A URL can appear once per audit.
    pub fn insert_page(&self, audit_id: &str, page: &CrawledPage) -> AuditResult<i64> {
        let metadata = serde_json::to_string(&page.metadata)?;
        let conn = self.conn();
        let inserted = conn.execute(
            "INSERT INTO pages (audit_id, url, page_type, metadata) VALUES (?1, ?2, ?3, ?4)",
            params![audit_id, page.url, page.page_type.as_str(), metadata],
        );
        match inserted {
            Ok(_) => Ok(conn.last_insert_rowid()),
            Err(e) if is_unique_violation(&e) => Err(AuditError::DuplicateUrl {
                audit_id: audit_id.to_string(),
                url: page.url.clone(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Pages of an audit in discovery order.
    pub fn pages(&self, audit_id: &str) -> AuditResult<Vec<DiscoveredPage>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {PAGE_COLUMNS} FROM pages WHERE audit_id = ?1 ORDER BY id"
        ))?;
        let pages = stmt
            .query_map(params![audit_id], page_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(pages)
    }

    pub fn priority_pages(&self, audit_id: &str) -> AuditResult<Vec<DiscoveredPage>> {
        Ok(self
            .pages(audit_id)?
            .into_iter()
            .filter(|p| p.is_priority)
            .collect())
    }

    pub fn page(&self, page_id: i64) -> AuditResult<DiscoveredPage> {
        self.conn()
            .query_row(
                &format!("SELECT {PAGE_COLUMNS} FROM pages WHERE id = ?1"),
                params![page_id],
                page_from_row,
            )
            .optional()?
            .ok_or(AuditError::PageNotFound(page_id))
    }

    /// Drop every page of an audit; children cascade.
    pub fn clear_pages(&self, audit_id: &str) -> AuditResult<usize> {
        Ok(self
            .conn()
            .execute("DELETE FROM pages WHERE audit_id = ?1", params![audit_id])?)
    }

    pub fn set_priority(&self, page_id: i64, score: Scored) -> AuditResult<()> {
        let rows = self.conn().execute(
            "UPDATE pages SET priority_score = ?2, score_source = ?3 WHERE id = ?1",
            params![page_id, score.value, score.source.as_str()],
        )?;
        if rows == 0 {
            return Err(AuditError::PageNotFound(page_id));
        }
        Ok(())
    }

    /// Flag exactly `page_ids` as the audit's priority pages.
    pub fn set_priority_flags(&self, audit_id: &str, page_ids: &[i64]) -> AuditResult<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute(
            "UPDATE pages SET is_priority = 0 WHERE audit_id = ?1",
            params![audit_id],
        )?;
        for id in page_ids {
            tx.execute(
                "UPDATE pages SET is_priority = 1 WHERE audit_id = ?1 AND id = ?2",
                params![audit_id, id],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn set_collection_status(&self, page_id: i64, status: CollectionStatus) -> AuditResult<()> {
        self.conn().execute(
            "UPDATE pages SET collection_status = ?2 WHERE id = ?1",
            params![page_id, status.as_str()],
        )?;
        Ok(())
    }

    pub fn set_testing_status(&self, page_id: i64, status: TestingStatus) -> AuditResult<()> {
        self.conn().execute(
            "UPDATE pages SET testing_status = ?2 WHERE id = ?1",
            params![page_id, status.as_str()],
        )?;
        Ok(())
    }

    /// Insert or replace the single data record of a page.
    pub fn save_page_data(&self, data: &PageData) -> AuditResult<()> {
        let payload = serde_json::to_string(data)?;
        self.conn().execute(
            "INSERT INTO page_data (page_id, payload, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(page_id) DO UPDATE SET payload = excluded.payload,
                 updated_at = excluded.updated_at",
            params![data.page_id, payload, now()],
        )?;
        Ok(())
    }

    pub fn page_data(&self, page_id: i64) -> AuditResult<Option<PageData>> {
        Ok(self
            .conn()
            .query_row(
                "SELECT payload FROM page_data WHERE page_id = ?1",
                params![page_id],
                |row| json_column(row, 0),
            )
            .optional()?)
    }

    pub fn insert_adaptive_tests(&self, page_id: i64, tests: &[NewAdaptiveTest]) -> AuditResult<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let at = now();
        for test in tests {
            tx.execute(
                "INSERT INTO adaptive_tests
                     (page_id, test_type, decision_reason, result, impact_score, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    page_id,
                    test.test_type,
                    test.decision_reason,
                    serde_json::to_string(&test.result)?,
                    test.impact_score,
                    at
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn adaptive_tests(&self, page_id: i64) -> AuditResult<Vec<AdaptiveTest>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, page_id, test_type, decision_reason, result, impact_score, created_at
             FROM adaptive_tests WHERE page_id = ?1 ORDER BY id",
        )?;
        let tests = stmt
            .query_map(params![page_id], |row| {
                Ok(AdaptiveTest {
                    id: row.get(0)?,
                    page_id: row.get(1)?,
                    test_type: row.get(2)?,
                    decision_reason: row.get(3)?,
                    result: json_column(row, 4)?,
                    impact_score: row.get(5)?,
                    created_at: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tests)
    }

    /// Forget everything the analyzing phase produced for an audit.
    pub fn clear_analysis(&self, audit_id: &str) -> AuditResult<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let scope = "SELECT id FROM pages WHERE audit_id = ?1";
        tx.execute(
            &format!("DELETE FROM adaptive_tests WHERE page_id IN ({scope})"),
            params![audit_id],
        )?;
        tx.execute(
            &format!("DELETE FROM page_data WHERE page_id IN ({scope})"),
            params![audit_id],
        )?;
        tx.execute(
            "DELETE FROM test_results WHERE audit_id = ?1",
            params![audit_id],
        )?;
        tx.execute(
            "UPDATE pages SET collection_status = 'pending', testing_status = 'pending'
             WHERE audit_id = ?1",
            params![audit_id],
        )?;
        tx.commit()?;
        Ok(())
    }
}

fn page_from_row(row: &Row<'_>) -> rusqlite::Result<DiscoveredPage> {
    let score: Option<u8> = row.get(4)?;
    let source = optional_label(row, 5)?;
    Ok(DiscoveredPage {
        id: row.get(0)?,
        audit_id: row.get(1)?,
        url: row.get(2)?,
        page_type: label(row, 3)?,
        priority: score
            .zip(source)
            .map(|(value, source)| Scored { source, value }),
        metadata: json_column(row, 6)?,
        collection_status: label(row, 7)?,
        testing_status: label(row, 8)?,
        is_priority: row.get(9)?,
    })
}
