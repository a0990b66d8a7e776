use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgConnection, PgPool, Row};

use crate::{
    models::{Color, Coordinates, Country, Location, NewPerson, Person, PersonListQuery},
    Result,
};

const PERSON_SELECT: &str = r"
    SELECT p.id, p.name, c.x AS coord_x, c.y AS coord_y, p.creation_date,
           p.eye_color, p.hair_color,
           l.x AS loc_x, l.y AS loc_y, l.z AS loc_z, l.name AS loc_name,
           p.height, p.birthday, p.nationality
    FROM persons p
    JOIN coordinates c ON c.id = p.coordinates_id
    JOIN locations l ON l.id = p.location_id";

/// Person repository
///
/// A person spans three tables: coordinates are shared and unique on (x, y),
/// while each person owns its location row.
#[derive(Clone)]
pub struct PersonRepository {
    pool: PgPool,
}

impl PersonRepository {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Person>> {
        self.get_by_id_with_executor(id, &self.pool).await
    }

    pub async fn get_by_id_with_executor<'e, E>(&self, id: i64, executor: E) -> Result<Option<Person>>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let row = sqlx::query(&format!("{PERSON_SELECT} WHERE p.id = $1"))
            .bind(id)
            .fetch_optional(executor)
            .await?;

        row.map(row_to_person).transpose()
    }

    /// Id of the coordinates row for (x, y), inserting it if needed
    pub async fn upsert_coordinates_with_executor<'e, E>(&self, coordinates: Coordinates, executor: E) -> Result<i64>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let id: i64 = sqlx::query_scalar(
            r"
            INSERT INTO coordinates (x, y)
            VALUES ($1, $2)
            ON CONFLICT (x, y) DO UPDATE SET x = EXCLUDED.x
            RETURNING id
            ",
        )
        .bind(coordinates.x)
        .bind(coordinates.y)
        .fetch_one(executor)
        .await?;
        Ok(id)
    }

    /// Insert a person with its location. Runs several statements, so it
    /// needs a connection rather than any executor.
    pub async fn create_with_conn(&self, person: &NewPerson, conn: &mut PgConnection) -> Result<Person> {
        let coordinates_id = self.upsert_coordinates_with_executor(person.coordinates, &mut *conn).await?;

        let location_id: i64 = sqlx::query_scalar(
            "INSERT INTO locations (x, y, z, name) VALUES ($1, $2, $3, $4) RETURNING id",
        )
        .bind(person.location.x)
        .bind(person.location.y)
        .bind(person.location.z)
        .bind(&person.location.name)
        .fetch_one(&mut *conn)
        .await?;

        let id: i64 = sqlx::query_scalar(
            r"
            INSERT INTO persons
                (name, coordinates_id, creation_date, eye_color, hair_color, location_id, height, birthday, nationality)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id
            ",
        )
        .bind(&person.name)
        .bind(coordinates_id)
        .bind(Utc::now())
        .bind(person.eye_color.map(Color::as_str))
        .bind(person.hair_color.as_str())
        .bind(location_id)
        .bind(person.height)
        .bind(person.birthday)
        .bind(person.nationality.as_str())
        .fetch_one(&mut *conn)
        .await?;

        self.get_by_id_with_executor(id, &mut *conn)
            .await?
            .ok_or_else(|| crate::Error::Internal(format!("Person {id} vanished after insert")))
    }

    /// Overwrite a person in place, keeping its creation date and location row.
    /// Returns `None` if the person does not exist.
    pub async fn update_with_conn(
        &self,
        id: i64,
        person: &NewPerson,
        conn: &mut PgConnection,
    ) -> Result<Option<Person>> {
        let location_id: Option<i64> =
            sqlx::query_scalar("SELECT location_id FROM persons WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *conn)
                .await?;
        let Some(location_id) = location_id else {
            return Ok(None);
        };

        let coordinates_id = self.upsert_coordinates_with_executor(person.coordinates, &mut *conn).await?;

        sqlx::query("UPDATE locations SET x = $2, y = $3, z = $4, name = $5 WHERE id = $1")
            .bind(location_id)
            .bind(person.location.x)
            .bind(person.location.y)
            .bind(person.location.z)
            .bind(&person.location.name)
            .execute(&mut *conn)
            .await?;

        sqlx::query(
            r"
            UPDATE persons
            SET name = $2, coordinates_id = $3, eye_color = $4, hair_color = $5,
                height = $6, birthday = $7, nationality = $8
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(&person.name)
        .bind(coordinates_id)
        .bind(person.eye_color.map(Color::as_str))
        .bind(person.hair_color.as_str())
        .bind(person.height)
        .bind(person.birthday)
        .bind(person.nationality.as_str())
        .execute(&mut *conn)
        .await?;

        self.get_by_id_with_executor(id, &mut *conn).await
    }

    /// Delete a person and the location it owned
    pub async fn delete_with_conn(&self, id: i64, conn: &mut PgConnection) -> Result<bool> {
        let location_id: Option<i64> =
            sqlx::query_scalar("DELETE FROM persons WHERE id = $1 RETURNING location_id")
                .bind(id)
                .fetch_optional(&mut *conn)
                .await?;

        match location_id {
            Some(location_id) => {
                remove_orphan_locations(&[location_id], conn).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Delete every person born at `birthday`, returning their ids
    pub async fn delete_by_birthday_with_conn(
        &self,
        birthday: DateTime<Utc>,
        conn: &mut PgConnection,
    ) -> Result<Vec<i64>> {
        let rows = sqlx::query("DELETE FROM persons WHERE birthday = $1 RETURNING id, location_id")
            .bind(birthday)
            .fetch_all(&mut *conn)
            .await?;

        let mut ids = Vec::with_capacity(rows.len());
        let mut location_ids = Vec::with_capacity(rows.len());
        for row in rows {
            ids.push(row.try_get::<i64, _>("id")?);
            location_ids.push(row.try_get::<i64, _>("location_id")?);
        }

        if !location_ids.is_empty() {
            remove_orphan_locations(&location_ids, conn).await?;
        }
        Ok(ids)
    }

    /// One page of persons
    pub async fn list(&self, query: &PersonListQuery) -> Result<Vec<Person>> {
        // Both column names come from whitelists in PersonListQuery
        let (where_clause, value, limit_idx) = match query.filter() {
            Some((column, value)) => (format!("WHERE {column} = $1"), Some(value), 2),
            None => (String::new(), None, 1),
        };
        let sql = format!(
            "{PERSON_SELECT} {where_clause}
             ORDER BY {} {}, p.id ASC
             LIMIT ${limit_idx} OFFSET ${}",
            query.sort_column(),
            query.direction.as_sql(),
            limit_idx + 1,
        );

        let mut list_query = sqlx::query(&sql);
        if let Some(value) = value {
            list_query = list_query.bind(value);
        }
        let rows = list_query
            .bind(query.params.limit())
            .bind(query.params.offset())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(row_to_person).collect()
    }

    /// Total number of persons, ignoring any filter
    pub async fn count_all(&self) -> Result<i64> {
        self.count("SELECT COUNT(*) FROM persons", None::<&str>).await
    }

    pub async fn count_by_birthday(&self, birthday: DateTime<Utc>) -> Result<i64> {
        self.count("SELECT COUNT(*) FROM persons WHERE birthday = $1", Some(birthday))
            .await
    }

    pub async fn count_height_less_than(&self, height: f32) -> Result<i64> {
        self.count("SELECT COUNT(*) FROM persons WHERE height < $1", Some(height))
            .await
    }

    pub async fn count_by_hair_color(&self, color: Color) -> Result<i64> {
        self.count("SELECT COUNT(*) FROM persons WHERE hair_color = $1", Some(color.as_str()))
            .await
    }

    pub async fn count_by_eye_color(&self, color: Color) -> Result<i64> {
        self.count("SELECT COUNT(*) FROM persons WHERE eye_color = $1", Some(color.as_str()))
            .await
    }

    async fn count<'q, T>(&self, sql: &'q str, arg: Option<T>) -> Result<i64>
    where
        T: 'q + Send + sqlx::Encode<'q, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
    {
        let mut query = sqlx::query_scalar::<_, i64>(sql);
        if let Some(arg) = arg {
            query = query.bind(arg);
        }
        Ok(query.fetch_one(&self.pool).await?)
    }
}

/// Drop locations no person points at any more
async fn remove_orphan_locations(location_ids: &[i64], conn: &mut PgConnection) -> Result<()> {
    sqlx::query(
        r"
        DELETE FROM locations l
        WHERE l.id = ANY($1)
          AND NOT EXISTS (SELECT 1 FROM persons p WHERE p.location_id = l.id)
        ",
    )
    .bind(location_ids)
    .execute(conn)
    .await?;
    Ok(())
}

fn row_to_person(row: PgRow) -> Result<Person> {
    let eye_color: Option<String> = row.try_get("eye_color")?;
    let hair_color: String = row.try_get("hair_color")?;
    let nationality: String = row.try_get("nationality")?;

    Ok(Person {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        coordinates: Coordinates {
            x: row.try_get("coord_x")?,
            y: row.try_get("coord_y")?,
        },
        creation_date: row.try_get("creation_date")?,
        eye_color: eye_color.as_deref().map(Color::from_str).transpose()?,
        hair_color: Color::from_str(&hair_color)?,
        location: Location {
            x: row.try_get("loc_x")?,
            y: row.try_get("loc_y")?,
            z: row.try_get("loc_z")?,
            name: row.try_get("loc_name")?,
        },
        height: row.try_get("height")?,
        birthday: row.try_get("birthday")?,
        nationality: Country::from_str(&nationality)?,
    })
}
