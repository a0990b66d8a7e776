//! Person service
//!
//! Person events carry the person's name so clients can show it without
//! refetching.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use spacemarine_notify::{Action, ChangeEvent, ChangeNotifier, EntityType};
use sqlx::PgPool;
use tracing::info;

use crate::{
    models::{Color, Person, PersonInput, PersonListQuery},
    repository::PersonRepository,
    validation::PersonValidator,
    Error, Result, UnitOfWork,
};

/// Person management service
#[derive(Clone)]
pub struct PersonService {
    pool: PgPool,
    persons: PersonRepository,
    notifier: ChangeNotifier,
}

impl std::fmt::Debug for PersonService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersonService").finish()
    }
}

fn not_found(id: i64) -> Error {
    Error::NotFound(format!("Person with id {id} not found"))
}

fn person_event(action: Action, person: &Person) -> ChangeEvent {
    let mut extra = Map::new();
    extra.insert("name".to_string(), Value::from(person.name.clone()));
    ChangeEvent::new(EntityType::Person, action, person.id).with_extra(extra)
}

impl PersonService {
    pub fn new(pool: PgPool, notifier: ChangeNotifier) -> Self {
        Self {
            persons: PersonRepository::new(pool.clone()),
            pool,
            notifier,
        }
    }

    /// One page of persons plus the total number of persons, unfiltered
    pub async fn list(&self, query: &PersonListQuery) -> Result<(Vec<Person>, i64)> {
        let persons = self.persons.list(query).await?;
        let total = self.persons.count_all().await?;
        Ok((persons, total))
    }

    pub async fn get(&self, id: i64) -> Result<Person> {
        self.persons.get_by_id(id).await?.ok_or_else(|| not_found(id))
    }

    pub async fn create(&self, input: &PersonInput) -> Result<Person> {
        let new_person = PersonValidator::new().validate(input)?;

        let mut uow = UnitOfWork::begin(&self.pool).await?;
        let person = self.persons.create_with_conn(&new_person, uow.conn()).await?;
        self.notifier
            .notify_within(&mut uow, person_event(Action::Create, &person));
        uow.commit().await?;

        info!(person_id = person.id, "Person created");
        Ok(person)
    }

    /// Replace a person. A body id, when present, must match `id`.
    pub async fn update(&self, id: i64, input: &PersonInput) -> Result<Person> {
        if let Some(body_id) = input.id {
            if body_id != id {
                return Err(Error::InvalidInput(format!(
                    "Path id {id} does not match body id {body_id}"
                )));
            }
        }
        let new_person = PersonValidator::new().validate(input)?;

        let mut uow = UnitOfWork::begin(&self.pool).await?;
        let Some(person) = self.persons.update_with_conn(id, &new_person, uow.conn()).await? else {
            uow.rollback().await?;
            return Err(not_found(id));
        };
        self.notifier
            .notify_within(&mut uow, person_event(Action::Update, &person));
        uow.commit().await?;

        info!(person_id = id, "Person updated");
        Ok(person)
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        let mut uow = UnitOfWork::begin(&self.pool).await?;
        if !self.persons.delete_with_conn(id, uow.conn()).await? {
            uow.rollback().await?;
            return Err(not_found(id));
        }
        self.notifier.notify_within(
            &mut uow,
            ChangeEvent::new(EntityType::Person, Action::Delete, id),
        );
        uow.commit().await?;

        info!(person_id = id, "Person deleted");
        Ok(())
    }

    pub async fn count_by_birthday(&self, birthday: DateTime<Utc>) -> Result<i64> {
        self.persons.count_by_birthday(birthday).await
    }

    /// Remove everyone born at `birthday` in one transaction. One delete
    /// event per person is published once it commits.
    pub async fn delete_by_birthday(&self, birthday: DateTime<Utc>) -> Result<u64> {
        let mut uow = UnitOfWork::begin(&self.pool).await?;
        let ids = self.persons.delete_by_birthday_with_conn(birthday, uow.conn()).await?;
        for &id in &ids {
            self.notifier.notify_within(
                &mut uow,
                ChangeEvent::new(EntityType::Person, Action::Delete, id),
            );
        }
        uow.commit().await?;

        info!(birthday = %birthday, removed = ids.len(), "Persons deleted by birthday");
        Ok(ids.len() as u64)
    }

    pub async fn count_height_less_than(&self, height: f32) -> Result<i64> {
        self.persons.count_height_less_than(height).await
    }

    pub async fn count_by_hair_color(&self, color: Color) -> Result<i64> {
        self.persons.count_by_hair_color(color).await
    }

    pub async fn count_by_eye_color(&self, color: Color) -> Result<i64> {
        self.persons.count_by_eye_color(color).await
    }
}
