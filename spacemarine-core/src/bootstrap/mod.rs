//! Bootstrap module for initializing the server
//!
//! This module handles:
//! - Configuration loading
//! - Database initialization
//! - Service initialization and dependency injection

pub mod config;
pub mod database;
pub mod services;

pub use config::load_config;
pub use database::init_database;
pub use services::{init_services, Services};
