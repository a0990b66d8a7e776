//! Space marine service

use std::str::FromStr;

use spacemarine_notify::{Action, ChangeEvent, ChangeNotifier, EntityType};
use sqlx::PgPool;
use tracing::info;

use crate::{
    models::{AchievementGroup, MarineInput, MarineListQuery, NewMarine, Page, SpaceMarine, Weapon},
    repository::{ChapterRepository, MarineRepository},
    validation::MarineValidator,
    Error, Result, UnitOfWork,
};

/// Space marine service
#[derive(Clone)]
pub struct MarineService {
    pool: PgPool,
    marines: MarineRepository,
    chapters: ChapterRepository,
    notifier: ChangeNotifier,
}

impl std::fmt::Debug for MarineService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarineService").finish()
    }
}

fn not_found(id: i64) -> Error {
    Error::NotFound(format!("SpaceMarine with id {id} not found"))
}

impl MarineService {
    pub fn new(pool: PgPool, notifier: ChangeNotifier) -> Self {
        Self {
            marines: MarineRepository::new(pool.clone()),
            chapters: ChapterRepository::new(pool.clone()),
            pool,
            notifier,
        }
    }

    pub async fn list(&self, query: &MarineListQuery) -> Result<Page<SpaceMarine>> {
        let (marines, total) = self.marines.list(query).await?;
        Ok(Page::new(
            marines,
            u64::try_from(total).unwrap_or_default(),
            query.params,
        ))
    }

    pub async fn get(&self, id: i64) -> Result<SpaceMarine> {
        self.marines.get_by_id(id).await?.ok_or_else(|| not_found(id))
    }

    pub async fn create(&self, input: &MarineInput) -> Result<SpaceMarine> {
        let new_marine = MarineValidator::new().validate(input)?;

        let mut uow = UnitOfWork::begin(&self.pool).await?;
        self.ensure_chapter(&new_marine, &mut uow).await?;
        let marine = self.marines.create_with_executor(&new_marine, uow.conn()).await?;
        self.notifier.notify_within(
            &mut uow,
            ChangeEvent::new(EntityType::Marine, Action::Create, marine.id),
        );
        uow.commit().await?;

        info!(marine_id = marine.id, chapter_id = marine.chapter_id, "SpaceMarine created");
        Ok(marine)
    }

    pub async fn update(&self, id: i64, input: &MarineInput) -> Result<SpaceMarine> {
        let new_marine = MarineValidator::new().validate(input)?;

        let mut uow = UnitOfWork::begin(&self.pool).await?;
        self.ensure_chapter(&new_marine, &mut uow).await?;
        let Some(marine) = self
            .marines
            .update_with_executor(id, &new_marine, uow.conn())
            .await?
        else {
            uow.rollback().await?;
            return Err(not_found(id));
        };
        self.notifier.notify_within(
            &mut uow,
            ChangeEvent::new(EntityType::Marine, Action::Update, id),
        );
        uow.commit().await?;

        info!(marine_id = id, "SpaceMarine updated");
        Ok(marine)
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        let mut uow = UnitOfWork::begin(&self.pool).await?;
        if !self.marines.delete_with_executor(id, uow.conn()).await? {
            uow.rollback().await?;
            return Err(not_found(id));
        }
        self.notifier.notify_within(
            &mut uow,
            ChangeEvent::new(EntityType::Marine, Action::Delete, id),
        );
        uow.commit().await?;

        info!(marine_id = id, "SpaceMarine deleted");
        Ok(())
    }

    /// A marine must reference an existing chapter
    async fn ensure_chapter(&self, marine: &NewMarine, uow: &mut UnitOfWork) -> Result<()> {
        if self.chapters.exists_with_executor(marine.chapter_id, uow.conn()).await? {
            Ok(())
        } else {
            Err(Error::InvalidInput(format!(
                "Chapter with id {} not found",
                marine.chapter_id
            )))
        }
    }

    pub async fn group_by_achievements(&self) -> Result<Vec<AchievementGroup>> {
        self.marines.group_by_achievements().await
    }

    /// Marines whose weapon comes before `weapon` in declaration order.
    /// An unknown weapon name matches nothing.
    pub async fn count_weapon_less_than(&self, weapon: &str) -> Result<i64> {
        match Weapon::from_str(weapon.trim()) {
            Ok(weapon) => self.marines.count_by_weapons(&weapon.lesser()).await,
            Err(_) => Ok(0),
        }
    }

    pub async fn count_health_greater_than(&self, threshold: i64) -> Result<i64> {
        self.marines.count_health_greater_than(threshold).await
    }

    pub async fn all_marines(&self) -> Result<Vec<SpaceMarine>> {
        self.marines.list_all().await
    }
}
