pub mod bootstrap;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod procedure;
pub mod repository;
pub mod service;
pub mod transaction;
pub mod validation;

pub use config::Config;
pub use error::{Error, Result};
pub use transaction::UnitOfWork;
