//! HTTP and WebSocket surface of the SpaceMarine service

pub mod http;

pub use http::{create_router, AppState};
