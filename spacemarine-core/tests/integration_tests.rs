//! Integration tests for spacemarine-core services against PostgreSQL
//!
//! Run with: DATABASE_URL=postgres://... cargo test --test integration_tests -- --ignored

use std::time::Duration;

use serde_json::Value;
use spacemarine_core::{
    bootstrap::{init_services, Services},
    models::{
        ChapterInput, Color, Coordinates, Country, Location, MarineInput, MarineListQuery,
        MarineSort, PageParams, PersonInput, Weapon,
    },
    repository::ChapterRepository,
    Config, Error, UnitOfWork,
};
use spacemarine_notify::{Action, ChangeEvent, EntityType, Payload, Topic};
use sqlx::{postgres::PgPoolOptions, PgPool};
use tokio::sync::mpsc::Receiver;

async fn setup_pool() -> PgPool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .expect("Failed to connect to database");
    sqlx::migrate!("../migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");
    pool
}

async fn setup() -> Services {
    init_services(setup_pool().await, &Config::default())
}

fn unique(prefix: &str) -> String {
    format!("{prefix}-{}", nanoid::nanoid!(8))
}

async fn next_message(rx: &mut Receiver<Payload>) -> Value {
    let payload = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("channel closed");
    serde_json::from_str(&payload).unwrap()
}

fn marine_input(chapter_id: i64, name: &str) -> MarineInput {
    MarineInput {
        name: name.to_string(),
        coordinates: Some(Coordinates { x: 10, y: 20 }),
        chapter_id: Some(chapter_id),
        health: Some(100),
        achievements: Some("Purity Seal".to_string()),
        height: 2.1,
        weapon_type: Some(Weapon::BoltPistol),
    }
}

#[tokio::test]
#[ignore = "Requires database"]
async fn test_chapter_lifecycle_events() {
    let services = setup().await;
    let (_id, mut chapters_rx) = services.registry.connect([Topic::Chapters]);
    let (_id, mut marines_rx) = services.registry.connect([Topic::Marines]);

    let chapter = services
        .chapter_service
        .create(&ChapterInput {
            name: unique("Ultramarines"),
            marines_count: Some(5),
        })
        .await
        .unwrap();
    let msg = next_message(&mut chapters_rx).await;
    assert_eq!(msg["action"], "create");
    assert_eq!(msg["id"], chapter.id);

    let marine = services
        .marine_service
        .create(&marine_input(chapter.id, "Titus"))
        .await
        .unwrap();
    assert_eq!(next_message(&mut marines_rx).await["id"], marine.id);
    assert_eq!(services.chapter_service.get(chapter.id).await.unwrap().members_count, 1);

    services.chapter_service.delete(chapter.id).await.unwrap();

    let msg = next_message(&mut chapters_rx).await;
    assert_eq!(msg["action"], "delete");
    assert_eq!(msg["id"], chapter.id);

    let msg = next_message(&mut marines_rx).await;
    assert_eq!(msg["action"], "cascade_delete");
    assert_eq!(msg["chapterId"], chapter.id);
    assert_eq!(msg["type"], "marine_cleanup");
    assert!(marines_rx.try_recv().is_err());

    assert!(matches!(
        services.marine_service.get(marine.id).await,
        Err(Error::NotFound(_))
    ));
}

#[tokio::test]
#[ignore = "Requires database"]
async fn test_failed_mutation_publishes_nothing() {
    let services = setup().await;
    let (_id, mut marines_rx) = services.registry.connect([Topic::Marines]);

    let result = services
        .marine_service
        .create(&marine_input(i64::MAX, "Orphan"))
        .await;

    assert!(matches!(result, Err(Error::InvalidInput(_))));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(marines_rx.try_recv().is_err());
}

#[tokio::test]
#[ignore = "Requires database"]
async fn test_create_and_dissolve_via_db() {
    let services = setup().await;
    let (_id, mut chapters_rx) = services.registry.connect([Topic::Chapters]);

    let id = services
        .chapter_service
        .create_via_db(&unique("Space Wolves"), 12)
        .await
        .unwrap();
    let msg = next_message(&mut chapters_rx).await;
    assert_eq!(msg["action"], "create");
    assert_eq!(msg["id"], id);
    assert!(chapters_rx.try_recv().is_err());

    services.chapter_service.dissolve_via_db(id).await.unwrap();
    assert_eq!(next_message(&mut chapters_rx).await["action"], "delete");

    assert!(matches!(
        services.chapter_service.dissolve_via_db(id).await,
        Err(Error::NotFound(_))
    ));
}

#[tokio::test]
#[ignore = "Requires database"]
async fn test_marine_listing_and_specials() {
    let services = setup().await;
    let chapter = services
        .chapter_service
        .create(&ChapterInput {
            name: unique("Blood Angels"),
            marines_count: Some(3),
        })
        .await
        .unwrap();

    let name = unique("Sanguinor");
    for _ in 0..3 {
        services
            .marine_service
            .create(&marine_input(chapter.id, &name))
            .await
            .unwrap();
    }

    let page = services
        .marine_service
        .list(&MarineListQuery {
            params: PageParams::new(Some(0), Some(2)),
            sort: MarineSort::parse(Some("id,desc")).unwrap(),
            name: Some(name.clone()),
            achievements: None,
        })
        .await
        .unwrap();
    assert_eq!(page.total_elements, 3);
    assert_eq!(page.total_pages, 2);
    assert_eq!(page.content.len(), 2);
    assert!(page.content[0].id > page.content[1].id);

    let lesser = services.marine_service.count_weapon_less_than("PLASMA_GUN").await.unwrap();
    assert!(lesser >= 3);
    assert_eq!(services.marine_service.count_weapon_less_than("LASGUN").await.unwrap(), 0);

    services.chapter_service.delete(chapter.id).await.unwrap();
}

#[tokio::test]
#[ignore = "Requires database"]
async fn test_delete_persons_by_birthday() {
    let services = setup().await;
    let (_id, mut persons_rx) = services.registry.connect([Topic::Persons]);

    // A birthday no other test uses
    let birthday = chrono::Utc::now();
    let input = |name: &str, x: i64| PersonInput {
        id: None,
        name: name.to_string(),
        coordinates: Coordinates { x, y: 7 },
        eye_color: Some(Color::Green),
        hair_color: Color::Black,
        location: Location {
            x: 1.5,
            y: 2,
            z: 3,
            name: "Terra".to_string(),
        },
        height: 180.0,
        birthday,
        nationality: Country::France,
    };

    let first = services.person_service.create(&input("Anna", 1)).await.unwrap();
    let second = services.person_service.create(&input("Boris", 1)).await.unwrap();
    assert_eq!(first.coordinates, second.coordinates);
    for expected in [&first, &second] {
        let msg = next_message(&mut persons_rx).await;
        assert_eq!(msg["action"], "create");
        assert_eq!(msg["type"], "person");
        assert_eq!(msg["name"], expected.name.as_str());
    }

    assert_eq!(services.person_service.count_by_birthday(birthday).await.unwrap(), 2);
    assert_eq!(services.person_service.delete_by_birthday(birthday).await.unwrap(), 2);

    let mut deleted = vec![
        next_message(&mut persons_rx).await["id"].as_i64().unwrap(),
        next_message(&mut persons_rx).await["id"].as_i64().unwrap(),
    ];
    deleted.sort_unstable();
    assert_eq!(deleted, vec![first.id, second.id]);
    assert_eq!(services.person_service.count_by_birthday(birthday).await.unwrap(), 0);
}

#[tokio::test]
#[ignore = "Requires database"]
async fn test_person_update_keeps_creation_date() {
    let services = setup().await;

    let mut input = PersonInput {
        id: None,
        name: "Clara".to_string(),
        coordinates: Coordinates { x: 42, y: 42 },
        eye_color: None,
        hair_color: Color::Red,
        location: Location {
            x: 0.0,
            y: 0,
            z: 0,
            name: "Home".to_string(),
        },
        height: 165.0,
        birthday: chrono::Utc::now(),
        nationality: Country::India,
    };
    let created = services.person_service.create(&input).await.unwrap();

    input.id = Some(created.id + 1);
    assert!(matches!(
        services.person_service.update(created.id, &input).await,
        Err(Error::InvalidInput(_))
    ));

    input.id = Some(created.id);
    input.name = "Clara B.".to_string();
    input.location.name = "Away".to_string();
    let updated = services.person_service.update(created.id, &input).await.unwrap();
    assert_eq!(updated.creation_date, created.creation_date);
    assert_eq!(updated.location.name, "Away");

    services.person_service.delete(created.id).await.unwrap();
    assert!(matches!(
        services.person_service.delete(created.id).await,
        Err(Error::NotFound(_))
    ));
}

#[tokio::test]
#[ignore = "Requires database"]
async fn test_dissolve_via_db_with_members_cascades() {
    let services = setup().await;
    let (_id, mut chapters_rx) = services.registry.connect([Topic::Chapters]);
    let (_id, mut marines_rx) = services.registry.connect([Topic::Marines]);

    let id = services
        .chapter_service
        .create_via_db(&unique("Blood Angels"), 30)
        .await
        .unwrap();
    next_message(&mut chapters_rx).await;

    for name in ["Dante", "Mephiston"] {
        services
            .marine_service
            .create(&marine_input(id, name))
            .await
            .unwrap();
        next_message(&mut marines_rx).await;
    }

    services.chapter_service.dissolve_via_db(id).await.unwrap();

    let msg = next_message(&mut chapters_rx).await;
    assert_eq!(msg["action"], "delete");
    assert_eq!(msg["id"], id);
    assert!(chapters_rx.try_recv().is_err());

    let msg = next_message(&mut marines_rx).await;
    assert_eq!(msg["action"], "cascade_delete");
    assert_eq!(msg["chapterId"], id);
    assert!(marines_rx.try_recv().is_err());
}

#[tokio::test]
#[ignore = "Requires database"]
async fn test_delete_empty_chapter_skips_cascade() {
    let services = setup().await;
    let (_id, mut marines_rx) = services.registry.connect([Topic::Marines]);

    let chapter = services
        .chapter_service
        .create(&ChapterInput {
            name: unique("Iron Hands"),
            marines_count: Some(3),
        })
        .await
        .unwrap();
    services.chapter_service.delete(chapter.id).await.unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(marines_rx.try_recv().is_err());
}

#[tokio::test]
#[ignore = "Requires database"]
async fn test_chapter_lock_blocks_new_members_until_delete() {
    let pool = setup_pool().await;
    let services = init_services(pool.clone(), &Config::default());
    let chapters = ChapterRepository::new(pool.clone());
    let (_id, mut marines_rx) = services.registry.connect([Topic::Marines]);

    let chapter = services
        .chapter_service
        .create(&ChapterInput {
            name: unique("Salamanders"),
            marines_count: Some(3),
        })
        .await
        .unwrap();

    let mut uow = UnitOfWork::begin(&pool).await.unwrap();
    assert!(chapters.lock_with_executor(chapter.id, uow.conn()).await.unwrap());

    let marine_service = services.marine_service.clone();
    let insert = tokio::spawn(async move {
        marine_service.create(&marine_input(chapter.id, "Vulkan")).await
    });

    // the insert's foreign-key check waits on the chapter lock
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!insert.is_finished());

    assert_eq!(chapters.count_members_with_executor(chapter.id, uow.conn()).await.unwrap(), 0);
    assert!(chapters.delete_with_executor(chapter.id, uow.conn()).await.unwrap());
    uow.commit().await.unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), insert)
        .await
        .expect("insert still blocked")
        .unwrap();
    assert!(result.is_err());
    assert!(marines_rx.try_recv().is_err());
}

#[tokio::test]
#[ignore = "Requires database"]
async fn test_unit_of_work_rollback_publishes_nothing() {
    let pool = setup_pool().await;
    let services = init_services(pool.clone(), &Config::default());
    let (_id, mut rx) = services.registry.connect([Topic::Chapters]);

    let mut uow = UnitOfWork::begin(&pool).await.unwrap();
    services
        .notifier
        .notify_within(&mut uow, ChangeEvent::new(EntityType::Chapter, Action::Create, 1));
    assert_eq!(uow.pending_hooks(), 1);
    uow.rollback().await.unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
#[ignore = "Requires database"]
async fn test_unit_of_work_dropped_publishes_nothing() {
    let pool = setup_pool().await;
    let services = init_services(pool.clone(), &Config::default());
    let (_id, mut rx) = services.registry.connect([Topic::Chapters]);

    {
        let mut uow = UnitOfWork::begin(&pool).await.unwrap();
        services
            .notifier
            .notify_within(&mut uow, ChangeEvent::new(EntityType::Chapter, Action::Update, 2));
    }

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
#[ignore = "Requires database"]
async fn test_unit_of_work_commit_publishes_once() {
    let pool = setup_pool().await;
    let services = init_services(pool.clone(), &Config::default());
    let (_id, mut rx) = services.registry.connect([Topic::Chapters]);

    let mut uow = UnitOfWork::begin(&pool).await.unwrap();
    services
        .notifier
        .notify_within(&mut uow, ChangeEvent::new(EntityType::Chapter, Action::Delete, 3));

    // nothing before commit
    assert!(rx.try_recv().is_err());
    uow.commit().await.unwrap();

    let msg = next_message(&mut rx).await;
    assert_eq!(msg["action"], "delete");
    assert_eq!(msg["id"], 3);
    assert!(rx.try_recv().is_err());
}
