use sqlx::{postgres::PgRow, PgPool, Row};

use crate::{
    models::{Chapter, NewChapter},
    Result,
};

const CHAPTER_COLUMNS: &str = "c.id, c.name, c.marines_count,
    (SELECT COUNT(*) FROM space_marines m WHERE m.chapter_id = c.id) AS members_count";

/// Chapter repository for database operations
#[derive(Clone)]
pub struct ChapterRepository {
    pool: PgPool,
}

impl ChapterRepository {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// All chapters ordered by id, with live member counts
    pub async fn list_all(&self) -> Result<Vec<Chapter>> {
        let rows = sqlx::query(&format!(
            "SELECT {CHAPTER_COLUMNS} FROM chapters c ORDER BY c.id"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_chapter).collect()
    }

    /// Get chapter by ID
    pub async fn get_by_id(&self, id: i64) -> Result<Option<Chapter>> {
        self.get_by_id_with_executor(id, &self.pool).await
    }

    pub async fn get_by_id_with_executor<'e, E>(&self, id: i64, executor: E) -> Result<Option<Chapter>>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let row = sqlx::query(&format!(
            "SELECT {CHAPTER_COLUMNS} FROM chapters c WHERE c.id = $1"
        ))
        .bind(id)
        .fetch_optional(executor)
        .await?;

        row.map(row_to_chapter).transpose()
    }

    pub async fn exists_with_executor<'e, E>(&self, id: i64, executor: E) -> Result<bool>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM chapters WHERE id = $1)")
            .bind(id)
            .fetch_one(executor)
            .await?;
        Ok(exists)
    }

    /// Row-lock the chapter until the transaction ends. Marine inserts and
    /// re-assignments into it block on the foreign-key check meanwhile, so a
    /// member count taken afterwards stays exact up to the delete.
    pub async fn lock_with_executor<'e, E>(&self, id: i64, executor: E) -> Result<bool>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let locked: Option<i64> = sqlx::query_scalar("SELECT id FROM chapters WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(executor)
            .await?;
        Ok(locked.is_some())
    }

    /// Insert a chapter. A fresh chapter has no members.
    pub async fn create_with_executor<'e, E>(&self, chapter: &NewChapter, executor: E) -> Result<Chapter>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let row = sqlx::query(
            r"
            INSERT INTO chapters (name, marines_count)
            VALUES ($1, $2)
            RETURNING id, name, marines_count, 0::BIGINT AS members_count
            ",
        )
        .bind(&chapter.name)
        .bind(chapter.marines_count)
        .fetch_one(executor)
        .await?;

        row_to_chapter(row)
    }

    /// Rename a chapter and, when given, change its declared strength.
    /// Returns `None` if the chapter does not exist.
    pub async fn update_with_executor<'e, E>(
        &self,
        id: i64,
        name: &str,
        marines_count: Option<i64>,
        executor: E,
    ) -> Result<Option<Chapter>>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let row = sqlx::query(
            r"
            UPDATE chapters c
            SET name = $2, marines_count = COALESCE($3, c.marines_count)
            WHERE c.id = $1
            RETURNING c.id, c.name, c.marines_count,
                (SELECT COUNT(*) FROM space_marines m WHERE m.chapter_id = c.id) AS members_count
            ",
        )
        .bind(id)
        .bind(name)
        .bind(marines_count)
        .fetch_optional(executor)
        .await?;

        row.map(row_to_chapter).transpose()
    }

    /// Marines currently assigned to the chapter
    pub async fn count_members_with_executor<'e, E>(&self, id: i64, executor: E) -> Result<i64>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM space_marines WHERE chapter_id = $1")
            .bind(id)
            .fetch_one(executor)
            .await?;
        Ok(count)
    }

    /// Hard delete; marines are removed by `ON DELETE CASCADE`
    pub async fn delete_with_executor<'e, E>(&self, id: i64, executor: E) -> Result<bool>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let result = sqlx::query("DELETE FROM chapters WHERE id = $1")
            .bind(id)
            .execute(executor)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

fn row_to_chapter(row: PgRow) -> Result<Chapter> {
    Ok(Chapter {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        marines_count: row.try_get("marines_count")?,
        members_count: row.try_get("members_count")?,
    })
}
