//! Error types for the audit engine.

use crate::model::{Phase, UnknownLabel};

/// Everything the store and conductor can reject.
///
/// Fetch and AI failures never show up here: those are recovered where they
/// happen. These are validation failures and storage faults that a caller has
/// to see.
#[derive(thiserror::Error, Debug)]
pub enum AuditError {
    #[error("audit not found: {0}")]
    AuditNotFound(String),

    #[error("page not found: {0}")]
    PageNotFound(i64),

    #[error("question not found: {0}")]
    QuestionNotFound(i64),

    #[error("test group not found: {0}")]
    TestGroupNotFound(i64),

    #[error("invalid seed url '{0}'")]
    InvalidSeed(String),

    #[error("url {url} already discovered for audit {audit_id}")]
    DuplicateUrl { audit_id: String, url: String },

    #[error("test key already exists: {0}")]
    DuplicateTestKey(String),

    #[error("unknown data sources: {}", .invalid.join(", "))]
    InvalidDataSources { invalid: Vec<String> },

    #[error("answer must not be empty")]
    EmptyResponse,

    #[error("question {0} was already resolved")]
    QuestionResolved(i64),

    #[error("cannot run {requested} while audit is in {current}")]
    InvalidTransition { current: Phase, requested: Phase },

    #[error("audit {0} has not failed")]
    NotFailed(String),

    #[error(transparent)]
    Label(#[from] UnknownLabel),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience result type.
pub type AuditResult<T> = Result<T, AuditError>;
