use super::{label, AuditStore};
use crate::error::{AuditError, AuditResult};
use crate::model::{AuditQuestion, NewQuestion, QuestionStatus};
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};

const QUESTION_COLUMNS: &str =
    "id, audit_id, page_id, question_type, text, options, response, status";

impl AuditStore {
    /// Insert questions, ignoring any whose (page, type) pair already exists
    /// for the audit. Returns how many were added.
    pub fn insert_questions(&self, audit_id: &str, questions: &[NewQuestion]) -> AuditResult<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let mut added = 0;
        for q in questions {
            let options = q.options.as_ref().map(serde_json::to_string).transpose()?;
            added += tx.execute(
                "INSERT OR IGNORE INTO questions (audit_id, page_id, question_type, text, options)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![audit_id, q.page_id, q.question_type.as_str(), q.text, options],
            )?;
        }
        tx.commit()?;
        Ok(added)
    }

    pub fn questions(&self, audit_id: &str) -> AuditResult<Vec<AuditQuestion>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {QUESTION_COLUMNS} FROM questions WHERE audit_id = ?1 ORDER BY id"
        ))?;
        let questions = stmt
            .query_map(params![audit_id], question_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(questions)
    }

    pub fn question(&self, id: i64) -> AuditResult<AuditQuestion> {
        self.conn()
            .query_row(
                &format!("SELECT {QUESTION_COLUMNS} FROM questions WHERE id = ?1"),
                params![id],
                question_from_row,
            )
            .optional()?
            .ok_or(AuditError::QuestionNotFound(id))
    }

    pub fn pending_question_count(&self, audit_id: &str) -> AuditResult<usize> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM questions WHERE audit_id = ?1 AND status = 'pending'",
            params![audit_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Record an answer. Empty answers and already resolved questions are
    /// rejected.
    pub fn answer_question(&self, id: i64, response: &str) -> AuditResult<AuditQuestion> {
        let response = response.trim();
        if response.is_empty() {
            return Err(AuditError::EmptyResponse);
        }
        self.resolve(id, QuestionStatus::Answered, Some(response))
    }

    pub fn skip_question(&self, id: i64) -> AuditResult<AuditQuestion> {
        self.resolve(id, QuestionStatus::Skipped, None)
    }

    fn resolve(
        &self,
        id: i64,
        status: QuestionStatus,
        response: Option<&str>,
    ) -> AuditResult<AuditQuestion> {
        let current = self.question(id)?;
        if current.status != QuestionStatus::Pending {
            return Err(AuditError::QuestionResolved(id));
        }
        self.conn().execute(
            "UPDATE questions SET status = ?2, response = ?3 WHERE id = ?1 AND status = 'pending'",
            params![id, status.as_str(), response],
        )?;
        self.question(id)
    }

    /// Answers that apply to a page: its own plus audit-wide ones, formatted
    /// as `question -> answer`.
    pub fn answers_for_page(&self, audit_id: &str, page_id: i64) -> AuditResult<Vec<String>> {
        Ok(self
            .questions(audit_id)?
            .into_iter()
            .filter(|q| q.status == QuestionStatus::Answered)
            .filter(|q| q.page_id.map_or(true, |id| id == page_id))
            .filter_map(|q| q.response.map(|r| format!("{} -> {}", q.text, r)))
            .collect())
    }
}

fn question_from_row(row: &Row<'_>) -> rusqlite::Result<AuditQuestion> {
    let options: Option<String> = row.get(5)?;
    let options = options
        .map(|raw| serde_json::from_str::<Vec<String>>(&raw))
        .transpose()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?;
    Ok(AuditQuestion {
        id: row.get(0)?,
        audit_id: row.get(1)?,
        page_id: row.get(2)?,
        question_type: label(row, 3)?,
        text: row.get(4)?,
        options,
        response: row.get(6)?,
        status: label(row, 7)?,
    })
}
