//! Service initialization and dependency injection

use std::sync::Arc;

use spacemarine_notify::{ChangeNotifier, SubscriberRegistry};
use sqlx::PgPool;
use tracing::info;

use crate::{
    repository::PgChapterProcedures,
    service::{ChapterService, MarineService, PersonService},
    Config,
};

/// Container for all initialized services
#[derive(Clone)]
pub struct Services {
    pub chapter_service: Arc<ChapterService>,
    pub marine_service: Arc<MarineService>,
    pub person_service: Arc<PersonService>,
    /// Publishes committed changes to WebSocket subscribers
    pub notifier: ChangeNotifier,
    /// Live WebSocket subscribers, shared with the notifier
    pub registry: SubscriberRegistry,
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

/// Initialize all core services
pub fn init_services(pool: PgPool, config: &Config) -> Services {
    let registry = SubscriberRegistry::with_capacity(config.notify.channel_capacity);
    let notifier = ChangeNotifier::new(registry.clone());

    let procedures = Arc::new(PgChapterProcedures::new(pool.clone()));
    let chapter_service = Arc::new(ChapterService::new(pool.clone(), procedures, notifier.clone()));
    let marine_service = Arc::new(MarineService::new(pool.clone(), notifier.clone()));
    let person_service = Arc::new(PersonService::new(pool, notifier.clone()));

    info!(
        channel_capacity = config.notify.channel_capacity,
        "Services initialized"
    );

    Services {
        chapter_service,
        marine_service,
        person_service,
        notifier,
        registry,
    }
}
