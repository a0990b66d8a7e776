//! Stored-procedure mutations with a direct fallback
//!
//! A privileged path (a database routine) is tried first. Its result says
//! whether anything could have been persisted, and the direct path only runs
//! when nothing was.

use async_trait::async_trait;
use std::future::Future;
use tracing::{info, warn};

use crate::{Error, Result};

/// SQLSTATE codes meaning the routine is missing or unusable
const ROUTINE_MISSING_CODES: [&str; 3] = [
    "42883", // undefined_function
    "3F000", // invalid_schema_name
    "42P01", // undefined_table
];

/// Result of attempting a mutation through a stored procedure
#[derive(Debug)]
pub enum ProcedureOutcome<T> {
    /// Routine ran and its transaction committed
    Applied(T),
    /// Routine cannot be called here; nothing ran
    Unavailable(String),
    /// Routine failed before commit; the transaction was rolled back
    RolledBack(Error),
    /// Commit was sent but its outcome is unknown
    Indeterminate(Error),
}

impl<T> ProcedureOutcome<T> {
    /// Classify an error raised while the routine's transaction was still open
    #[must_use]
    pub fn from_statement_error(err: sqlx::Error) -> Self {
        if is_routine_missing(&err) {
            Self::Unavailable(err.to_string())
        } else {
            Self::RolledBack(err.into())
        }
    }

    /// Classify an error raised by COMMIT itself. The server answering with an
    /// error means it aborted; anything else leaves the outcome unknown.
    #[must_use]
    pub fn from_commit_error(err: sqlx::Error) -> Self {
        if matches!(err, sqlx::Error::Database(_)) {
            Self::RolledBack(err.into())
        } else {
            Self::Indeterminate(Error::Internal(format!("commit outcome unknown: {err}")))
        }
    }
}

fn is_routine_missing(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err
            .code()
            .is_some_and(|code| ROUTINE_MISSING_CODES.contains(&code.as_ref())),
        _ => false,
    }
}

/// Which path ended up applying a mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationPath {
    Procedure,
    Fallback,
}

/// Run `primary`, falling back to `fallback` only if the primary provably
/// persisted nothing.
///
/// Returns the value from whichever path committed. An indeterminate primary
/// is surfaced as an error instead of retried, so a mutation is never
/// applied twice.
pub async fn run_with_fallback<T, P, F, Fut>(
    operation: &str,
    primary: P,
    fallback: F,
) -> Result<(T, MutationPath)>
where
    P: Future<Output = ProcedureOutcome<T>>,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match primary.await {
        ProcedureOutcome::Applied(value) => Ok((value, MutationPath::Procedure)),
        ProcedureOutcome::Unavailable(reason) => {
            info!(operation, reason = %reason, "Procedure unavailable, using direct path");
            let value = fallback().await?;
            Ok((value, MutationPath::Fallback))
        }
        ProcedureOutcome::RolledBack(err) => {
            warn!(operation, error = %err, "Procedure failed, using direct path");
            let value = fallback().await?;
            Ok((value, MutationPath::Fallback))
        }
        ProcedureOutcome::Indeterminate(err) => {
            warn!(operation, error = %err, "Procedure outcome unknown, not retrying");
            Err(err)
        }
    }
}

/// Effect of dissolving a chapter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DissolveSummary {
    /// Whether the chapter existed
    pub existed: bool,
    /// Marines removed along with it
    pub members: i64,
}

/// Chapter mutations backed by database routines
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChapterProcedures: Send + Sync {
    /// `fn_create_chapter(name, count)`, returning the new id
    async fn create_chapter(&self, name: &str, marines_count: i64) -> ProcedureOutcome<i64>;

    /// `fn_dissolve_chapter(id)`
    async fn dissolve_chapter(&self, chapter_id: i64) -> ProcedureOutcome<DissolveSummary>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn run(
        outcome: ProcedureOutcome<i64>,
        fallback_runs: &AtomicUsize,
        fallback_result: Result<i64>,
    ) -> Result<(i64, MutationPath)> {
        run_with_fallback("create_chapter", async move { outcome }, move || async move {
            fallback_runs.fetch_add(1, Ordering::SeqCst);
            fallback_result
        })
        .await
    }

    #[tokio::test]
    async fn test_applied_skips_fallback() {
        let runs = AtomicUsize::new(0);
        let (id, path) = run(ProcedureOutcome::Applied(11), &runs, Ok(99)).await.unwrap();

        assert_eq!(id, 11);
        assert_eq!(path, MutationPath::Procedure);
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unavailable_uses_fallback_once() {
        let runs = AtomicUsize::new(0);
        let outcome = ProcedureOutcome::Unavailable("function fn_create_chapter does not exist".to_string());
        let (id, path) = run(outcome, &runs, Ok(12)).await.unwrap();

        assert_eq!(id, 12);
        assert_eq!(path, MutationPath::Fallback);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rolled_back_uses_fallback() {
        let runs = AtomicUsize::new(0);
        let outcome = ProcedureOutcome::RolledBack(Error::InvalidInput("check failed".to_string()));
        let (_, path) = run(outcome, &runs, Ok(13)).await.unwrap();

        assert_eq!(path, MutationPath::Fallback);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_indeterminate_is_not_retried() {
        let runs = AtomicUsize::new(0);
        let outcome = ProcedureOutcome::Indeterminate(Error::Internal("connection reset".to_string()));
        let result = run(outcome, &runs, Ok(14)).await;

        assert!(matches!(result, Err(Error::Internal(_))));
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_both_paths_failing_surfaces_fallback_error() {
        let runs = AtomicUsize::new(0);
        let result = run(
            ProcedureOutcome::Unavailable("missing".to_string()),
            &runs,
            Err(Error::AlreadyExists("Resource already exists".to_string())),
        )
        .await;

        assert!(matches!(result, Err(Error::AlreadyExists(_))));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_commit_error_classification() {
        let outcome: ProcedureOutcome<()> = ProcedureOutcome::from_commit_error(sqlx::Error::PoolClosed);
        assert!(matches!(outcome, ProcedureOutcome::Indeterminate(_)));

        let outcome: ProcedureOutcome<()> =
            ProcedureOutcome::from_statement_error(sqlx::Error::PoolTimedOut);
        assert!(matches!(outcome, ProcedureOutcome::RolledBack(_)));
    }
}
