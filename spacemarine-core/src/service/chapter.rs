//! Chapter service
//!
//! Chapter mutations, including the routine-backed create/dissolve pair.
//! Every mutation publishes its change events only after commit.

use std::sync::Arc;

use spacemarine_notify::{Action, ChangeEvent, ChangeNotifier, EntityType};
use sqlx::PgPool;
use tracing::info;

use crate::{
    models::{Chapter, ChapterInput},
    procedure::{run_with_fallback, ChapterProcedures, DissolveSummary},
    repository::ChapterRepository,
    validation::ChapterValidator,
    Error, Result, UnitOfWork,
};

/// Chapter management service
#[derive(Clone)]
pub struct ChapterService {
    pool: PgPool,
    chapters: ChapterRepository,
    procedures: Arc<dyn ChapterProcedures>,
    notifier: ChangeNotifier,
}

impl std::fmt::Debug for ChapterService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChapterService").finish()
    }
}

fn not_found(id: i64) -> Error {
    Error::NotFound(format!("Chapter with id {id} not found"))
}

impl ChapterService {
    pub fn new(
        pool: PgPool,
        procedures: Arc<dyn ChapterProcedures>,
        notifier: ChangeNotifier,
    ) -> Self {
        Self {
            chapters: ChapterRepository::new(pool.clone()),
            pool,
            procedures,
            notifier,
        }
    }

    pub async fn list_all(&self) -> Result<Vec<Chapter>> {
        self.chapters.list_all().await
    }

    pub async fn get(&self, id: i64) -> Result<Chapter> {
        self.chapters.get_by_id(id).await?.ok_or_else(|| not_found(id))
    }

    pub async fn create(&self, input: &ChapterInput) -> Result<Chapter> {
        let new_chapter = ChapterValidator::new().validate_new(input)?;

        let mut uow = UnitOfWork::begin(&self.pool).await?;
        let chapter = self.chapters.create_with_executor(&new_chapter, uow.conn()).await?;
        self.notifier.notify_within(
            &mut uow,
            ChangeEvent::new(EntityType::Chapter, Action::Create, chapter.id),
        );
        uow.commit().await?;

        info!(chapter_id = chapter.id, name = %chapter.name, "Chapter created");
        Ok(chapter)
    }

    pub async fn update(&self, id: i64, input: &ChapterInput) -> Result<Chapter> {
        let (name, marines_count) = ChapterValidator::new().validate_update(input)?;

        let mut uow = UnitOfWork::begin(&self.pool).await?;
        let Some(chapter) = self
            .chapters
            .update_with_executor(id, &name, marines_count, uow.conn())
            .await?
        else {
            uow.rollback().await?;
            return Err(not_found(id));
        };
        self.notifier.notify_within(
            &mut uow,
            ChangeEvent::new(EntityType::Chapter, Action::Update, id),
        );
        uow.commit().await?;

        info!(chapter_id = id, "Chapter updated");
        Ok(chapter)
    }

    /// Delete a chapter together with its marines
    pub async fn delete(&self, id: i64) -> Result<()> {
        let mut uow = UnitOfWork::begin(&self.pool).await?;
        if !self.chapters.lock_with_executor(id, uow.conn()).await? {
            uow.rollback().await?;
            return Err(not_found(id));
        }
        let members = self.chapters.count_members_with_executor(id, uow.conn()).await?;
        self.chapters.delete_with_executor(id, uow.conn()).await?;

        self.notifier.notify_within(
            &mut uow,
            ChangeEvent::new(EntityType::Chapter, Action::Delete, id),
        );
        if members > 0 {
            self.notifier.notify_within(&mut uow, ChangeEvent::cascade_delete(id));
        }
        uow.commit().await?;

        info!(chapter_id = id, members, "Chapter deleted");
        Ok(())
    }

    /// Create through `fn_create_chapter`, inserting directly if the routine
    /// is missing or failed without committing. Returns the new id.
    pub async fn create_via_db(&self, name: &str, marines_count: i64) -> Result<i64> {
        let new_chapter = ChapterValidator::new().validate_parts(name, marines_count)?;

        let (id, path) = run_with_fallback(
            "create_chapter",
            self.procedures.create_chapter(&new_chapter.name, new_chapter.marines_count),
            || async {
                let mut uow = UnitOfWork::begin(&self.pool).await?;
                let chapter = self.chapters.create_with_executor(&new_chapter, uow.conn()).await?;
                uow.commit().await?;
                Ok(chapter.id)
            },
        )
        .await?;

        self.notifier
            .notify(ChangeEvent::new(EntityType::Chapter, Action::Create, id));

        info!(chapter_id = id, path = ?path, "Chapter created via database routine");
        Ok(id)
    }

    /// Dissolve through `fn_dissolve_chapter`, deleting directly if the
    /// routine is missing or failed without committing
    pub async fn dissolve_via_db(&self, id: i64) -> Result<()> {
        let (summary, path) = run_with_fallback(
            "dissolve_chapter",
            self.procedures.dissolve_chapter(id),
            || async {
                let mut uow = UnitOfWork::begin(&self.pool).await?;
                if !self.chapters.lock_with_executor(id, uow.conn()).await? {
                    uow.rollback().await?;
                    return Ok(DissolveSummary { existed: false, members: 0 });
                }
                let members = self.chapters.count_members_with_executor(id, uow.conn()).await?;
                self.chapters.delete_with_executor(id, uow.conn()).await?;
                uow.commit().await?;
                Ok(DissolveSummary { existed: true, members })
            },
        )
        .await?;

        if !summary.existed {
            return Err(not_found(id));
        }

        self.notifier
            .notify(ChangeEvent::new(EntityType::Chapter, Action::Delete, id));
        if summary.members > 0 {
            self.notifier.notify(ChangeEvent::cascade_delete(id));
        }

        info!(chapter_id = id, members = summary.members, path = ?path, "Chapter dissolved via database routine");
        Ok(())
    }
}
