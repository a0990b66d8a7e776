// HTTP routing and shared handler state

pub mod chapters;
pub mod error;
pub mod health;
pub mod marines;
pub mod persons;
pub mod special;
pub mod websocket;

use std::sync::Arc;

use axum::{
    http::{header, HeaderName, HeaderValue},
    routing::get,
    Router,
};
use spacemarine_core::{
    bootstrap::Services,
    config::{Config, CorsConfig},
    service::{ChapterService, MarineService, PersonService},
};
use spacemarine_notify::SubscriberRegistry;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

pub use error::{AppError, AppResult};

/// Shared state of every handler
#[derive(Clone)]
pub struct AppState {
    pub chapter_service: Arc<ChapterService>,
    pub marine_service: Arc<MarineService>,
    pub person_service: Arc<PersonService>,
    pub registry: SubscriberRegistry,
    /// Largest inbound WebSocket frame accepted
    pub ws_max_message_size: usize,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("registry", &self.registry)
            .field("ws_max_message_size", &self.ws_max_message_size)
            .finish_non_exhaustive()
    }
}

impl AppState {
    #[must_use]
    pub fn new(services: &Services, config: &Config) -> Self {
        Self {
            chapter_service: services.chapter_service.clone(),
            marine_service: services.marine_service.clone(),
            person_service: services.person_service.clone(),
            registry: services.registry.clone(),
            ws_max_message_size: config.notify.max_message_size,
        }
    }
}

/// Create the HTTP router with all routes
pub fn create_router(state: AppState, cors: &CorsConfig) -> Router {
    let router = Router::new()
        // Health check endpoint (for monitoring probes)
        .merge(health::create_health_router())
        .merge(chapters::create_chapter_router())
        .merge(marines::create_marine_router())
        .merge(special::create_special_router())
        .merge(persons::create_person_router())
        // Change feed
        .route("/ws", get(websocket::websocket_handler))
        .route("/ws/{topic}", get(websocket::topic_websocket_handler));

    // Apply layers before state
    let router = router
        .layer(cors_layer(cors))
        .layer(TraceLayer::new_for_http());

    // Apply state to all routes (must be last)
    router.with_state(state)
}

fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([header::LOCATION, HeaderName::from_static("x-total-count")]);

    if config.allowed_origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    layer.allow_origin(AllowOrigin::list(origins))
}
