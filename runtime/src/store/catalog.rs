use super::{is_unique_violation, json_column, AuditStore};
use crate::error::{AuditError, AuditResult};
use crate::model::{
    builtin_catalog, validate_data_sources, NewTestDefinition, TestDefinition, TestGroup,
    TestResult, TestStatus,
};
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};
use tracing::debug;

impl AuditStore {
    /// Seed the built-in groups into an empty catalog.
    pub(super) fn seed_catalog(&self) -> AuditResult<()> {
        let groups: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM test_groups", [], |row| row.get(0))?;
        if groups > 0 {
            return Ok(());
        }
        for (name, description, defs) in builtin_catalog() {
            let group = self.create_group(name, Some(description))?;
            for def in defs {
                self.create_test(group.id, &def)?;
            }
        }
        debug!("seeded built-in test catalog");
        Ok(())
    }

    pub fn create_group(&self, name: &str, description: Option<&str>) -> AuditResult<TestGroup> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO test_groups (name, description) VALUES (?1, ?2)",
            params![name, description],
        )?;
        Ok(TestGroup {
            id: conn.last_insert_rowid(),
            name: name.to_string(),
            description: description.map(str::to_string),
        })
    }

    pub fn groups(&self) -> AuditResult<Vec<TestGroup>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT id, name, description FROM test_groups ORDER BY id")?;
        let groups = stmt
            .query_map([], |row| {
                Ok(TestGroup {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    description: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(groups)
    }

    /// Add a test to a group. Unknown data sources, a missing group, and a
    /// reused key are rejected.
    pub fn create_test(&self, group_id: i64, def: &NewTestDefinition) -> AuditResult<TestDefinition> {
        validate_data_sources(&def.data_sources)?;
        let conn = self.conn();
        let exists = conn
            .query_row(
                "SELECT 1 FROM test_groups WHERE id = ?1",
                params![group_id],
                |_| Ok(()),
            )
            .optional()?;
        if exists.is_none() {
            return Err(AuditError::TestGroupNotFound(group_id));
        }

        let sources = serde_json::to_string(&def.data_sources)?;
        let inserted = conn.execute(
            "INSERT INTO tests (group_id, key, name, prompt, data_sources)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![group_id, def.key, def.name, def.prompt, sources],
        );
        match inserted {
            Ok(_) => Ok(TestDefinition {
                id: conn.last_insert_rowid(),
                group_id,
                key: def.key.clone(),
                name: def.name.clone(),
                prompt: def.prompt.clone(),
                data_sources: def.data_sources.clone(),
            }),
            Err(e) if is_unique_violation(&e) => Err(AuditError::DuplicateTestKey(def.key.clone())),
            Err(e) => Err(e.into()),
        }
    }

    /// Every catalog test, grouped in creation order.
    pub fn tests(&self) -> AuditResult<Vec<TestDefinition>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, group_id, key, name, prompt, data_sources FROM tests ORDER BY group_id, id",
        )?;
        let tests = stmt
            .query_map([], |row| {
                Ok(TestDefinition {
                    id: row.get(0)?,
                    group_id: row.get(1)?,
                    key: row.get(2)?,
                    name: row.get(3)?,
                    prompt: row.get(4)?,
                    data_sources: json_column(row, 5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tests)
    }

    /// Record a result, replacing any earlier one for the same page and key.
    pub fn record_result(
        &self,
        audit_id: &str,
        page_id: i64,
        test_key: &str,
        status: TestStatus,
        note: Option<&str>,
    ) -> AuditResult<()> {
        self.conn().execute(
            "INSERT INTO test_results (audit_id, page_id, test_key, status, note)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(page_id, test_key) DO UPDATE SET status = excluded.status,
                 note = excluded.note, audit_id = excluded.audit_id",
            params![audit_id, page_id, test_key, status.as_str(), note],
        )?;
        Ok(())
    }

    pub fn results(&self, audit_id: &str) -> AuditResult<Vec<TestResult>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, audit_id, page_id, test_key, status, note FROM test_results
             WHERE audit_id = ?1 ORDER BY page_id, id",
        )?;
        let results = stmt
            .query_map(params![audit_id], result_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(results)
    }
}

fn result_from_row(row: &Row<'_>) -> rusqlite::Result<TestResult> {
    let raw: String = row.get(4)?;
    let status = TestStatus::parse(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            Type::Text,
            format!("unknown test status '{raw}'").into(),
        )
    })?;
    Ok(TestResult {
        id: row.get(0)?,
        audit_id: row.get(1)?,
        page_id: row.get(2)?,
        test_key: row.get(3)?,
        status,
        note: row.get(5)?,
    })
}
