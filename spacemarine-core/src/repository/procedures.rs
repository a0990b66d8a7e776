use async_trait::async_trait;
use sqlx::PgPool;

use crate::{
    procedure::{ChapterProcedures, DissolveSummary, ProcedureOutcome},
    repository::ChapterRepository,
    UnitOfWork,
};

/// Calls the `fn_create_chapter` / `fn_dissolve_chapter` routines, each in
/// its own transaction
#[derive(Clone)]
pub struct PgChapterProcedures {
    pool: PgPool,
    chapters: ChapterRepository,
}

impl PgChapterProcedures {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        let chapters = ChapterRepository::new(pool.clone());
        Self { pool, chapters }
    }

    async fn finish<T>(uow: UnitOfWork, value: T) -> ProcedureOutcome<T> {
        match uow.commit_raw().await {
            Ok(()) => ProcedureOutcome::Applied(value),
            Err(e) => ProcedureOutcome::from_commit_error(e),
        }
    }
}

#[async_trait]
impl ChapterProcedures for PgChapterProcedures {
    async fn create_chapter(&self, name: &str, marines_count: i64) -> ProcedureOutcome<i64> {
        let mut uow = match UnitOfWork::begin(&self.pool).await {
            Ok(uow) => uow,
            Err(e) => return ProcedureOutcome::RolledBack(e),
        };

        let id = sqlx::query_scalar::<_, i64>("SELECT fn_create_chapter($1, $2)")
            .bind(name)
            .bind(marines_count)
            .fetch_one(uow.conn())
            .await;

        match id {
            Ok(id) => Self::finish(uow, id).await,
            Err(e) => {
                // Dropping the transaction rolls it back
                drop(uow);
                ProcedureOutcome::from_statement_error(e)
            }
        }
    }

    async fn dissolve_chapter(&self, chapter_id: i64) -> ProcedureOutcome<DissolveSummary> {
        let mut uow = match UnitOfWork::begin(&self.pool).await {
            Ok(uow) => uow,
            Err(e) => return ProcedureOutcome::RolledBack(e),
        };

        let existed = match self.chapters.lock_with_executor(chapter_id, uow.conn()).await {
            Ok(existed) => existed,
            Err(e) => return ProcedureOutcome::RolledBack(e),
        };
        if !existed {
            return ProcedureOutcome::Applied(DissolveSummary {
                existed: false,
                members: 0,
            });
        }

        let members = match self.chapters.count_members_with_executor(chapter_id, uow.conn()).await {
            Ok(members) => members,
            Err(e) => return ProcedureOutcome::RolledBack(e),
        };

        if let Err(e) = sqlx::query("SELECT fn_dissolve_chapter($1)")
            .bind(chapter_id)
            .execute(uow.conn())
            .await
        {
            return ProcedureOutcome::from_statement_error(e);
        }

        Self::finish(
            uow,
            DissolveSummary {
                existed: true,
                members,
            },
        )
        .await
    }
}

impl std::fmt::Debug for PgChapterProcedures {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgChapterProcedures").finish_non_exhaustive()
    }
}
