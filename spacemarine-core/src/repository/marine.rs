use std::str::FromStr;

use sqlx::{postgres::PgRow, PgPool, Row};

use crate::{
    models::{
        AchievementGroup, Coordinates, MarineFilter, MarineListQuery, NewMarine, SpaceMarine,
        Weapon,
    },
    Result,
};

const MARINE_COLUMNS: &str = "id, name, coord_x, coord_y, creation_date, chapter_id, health, achievements, height, weapon_type";

/// Space marine repository for database operations
#[derive(Clone)]
pub struct MarineRepository {
    pool: PgPool,
}

impl MarineRepository {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Get marine by ID
    pub async fn get_by_id(&self, id: i64) -> Result<Option<SpaceMarine>> {
        let row = sqlx::query(&format!("SELECT {MARINE_COLUMNS} FROM space_marines WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(row_to_marine).transpose()
    }

    /// List marines with pagination, sorting and an optional exact-match filter
    ///
    /// Returns the page of marines and the number of rows matching the filter.
    pub async fn list(&self, query: &MarineListQuery) -> Result<(Vec<SpaceMarine>, i64)> {
        // Column names come from a whitelist; only values are bound
        let (condition, value) = match query.filter() {
            MarineFilter::None => (None, None),
            MarineFilter::Name(name) => (Some("name = $1"), Some(name)),
            MarineFilter::Achievements(achievements) => (Some("achievements = $1"), Some(achievements)),
        };
        let where_clause = condition.map(|c| format!("WHERE {c}")).unwrap_or_default();
        let (limit_idx, offset_idx) = if value.is_some() { (2, 3) } else { (1, 2) };

        let order_by = match query.sort.column() {
            "id" => format!("id {}", query.sort.direction.as_sql()),
            column => format!("{column} {}, id ASC", query.sort.direction.as_sql()),
        };

        let count_sql = format!("SELECT COUNT(*) FROM space_marines {where_clause}");
        let list_sql = format!(
            "SELECT {MARINE_COLUMNS} FROM space_marines {where_clause}
             ORDER BY {order_by}
             LIMIT ${limit_idx} OFFSET ${offset_idx}"
        );

        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        let mut list_query = sqlx::query(&list_sql);
        if let Some(value) = &value {
            count_query = count_query.bind(value);
            list_query = list_query.bind(value);
        }

        let total = count_query.fetch_one(&self.pool).await?;
        let rows = list_query
            .bind(query.params.limit())
            .bind(query.params.offset())
            .fetch_all(&self.pool)
            .await?;

        let marines = rows.into_iter().map(row_to_marine).collect::<Result<Vec<_>>>()?;
        Ok((marines, total))
    }

    /// Every marine, ordered by id
    pub async fn list_all(&self) -> Result<Vec<SpaceMarine>> {
        let rows = sqlx::query(&format!("SELECT {MARINE_COLUMNS} FROM space_marines ORDER BY id"))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(row_to_marine).collect()
    }

    pub async fn create_with_executor<'e, E>(&self, marine: &NewMarine, executor: E) -> Result<SpaceMarine>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let row = sqlx::query(&format!(
            "INSERT INTO space_marines
                (name, coord_x, coord_y, creation_date, chapter_id, health, achievements, height, weapon_type)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING {MARINE_COLUMNS}"
        ))
        .bind(&marine.name)
        .bind(marine.coordinates.x)
        .bind(marine.coordinates.y)
        .bind(chrono::Utc::now())
        .bind(marine.chapter_id)
        .bind(marine.health)
        .bind(&marine.achievements)
        .bind(marine.height)
        .bind(marine.weapon_type.map(Weapon::as_str))
        .fetch_one(executor)
        .await?;

        row_to_marine(row)
    }

    /// Overwrite every mutable field. `creation_date` is kept.
    pub async fn update_with_executor<'e, E>(
        &self,
        id: i64,
        marine: &NewMarine,
        executor: E,
    ) -> Result<Option<SpaceMarine>>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let row = sqlx::query(&format!(
            "UPDATE space_marines
             SET name = $2, coord_x = $3, coord_y = $4, chapter_id = $5, health = $6,
                 achievements = $7, height = $8, weapon_type = $9
             WHERE id = $1
             RETURNING {MARINE_COLUMNS}"
        ))
        .bind(id)
        .bind(&marine.name)
        .bind(marine.coordinates.x)
        .bind(marine.coordinates.y)
        .bind(marine.chapter_id)
        .bind(marine.health)
        .bind(&marine.achievements)
        .bind(marine.height)
        .bind(marine.weapon_type.map(Weapon::as_str))
        .fetch_optional(executor)
        .await?;

        row.map(row_to_marine).transpose()
    }

    pub async fn delete_with_executor<'e, E>(&self, id: i64, executor: E) -> Result<bool>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let result = sqlx::query("DELETE FROM space_marines WHERE id = $1")
            .bind(id)
            .execute(executor)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Marine counts per distinct achievements value (NULL included)
    pub async fn group_by_achievements(&self) -> Result<Vec<AchievementGroup>> {
        let rows = sqlx::query(
            r"
            SELECT achievements, COUNT(*) AS cnt
            FROM space_marines
            GROUP BY achievements
            ORDER BY achievements NULLS FIRST
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(AchievementGroup {
                    achievements: row.try_get("achievements")?,
                    cnt: row.try_get("cnt")?,
                })
            })
            .collect()
    }

    /// Marines armed with any of `weapons`
    pub async fn count_by_weapons(&self, weapons: &[Weapon]) -> Result<i64> {
        if weapons.is_empty() {
            return Ok(0);
        }
        let names: Vec<&str> = weapons.iter().map(|w| w.as_str()).collect();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM space_marines WHERE weapon_type = ANY($1)")
            .bind(&names)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn count_health_greater_than(&self, threshold: i64) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM space_marines WHERE health > $1")
            .bind(threshold)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

fn row_to_marine(row: PgRow) -> Result<SpaceMarine> {
    let weapon_type: Option<String> = row.try_get("weapon_type")?;

    Ok(SpaceMarine {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        coordinates: Coordinates {
            x: row.try_get("coord_x")?,
            y: row.try_get("coord_y")?,
        },
        creation_date: row.try_get("creation_date")?,
        chapter_id: row.try_get("chapter_id")?,
        health: row.try_get("health")?,
        achievements: row.try_get("achievements")?,
        height: row.try_get("height")?,
        weapon_type: weapon_type.as_deref().map(Weapon::from_str).transpose()?,
    })
}
