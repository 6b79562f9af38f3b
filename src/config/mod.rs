//! Configuration management
//!
//! The application configuration is a single JSON document persisted in
//! SQLite and cached in memory for lock-free reads.

mod schema;
mod store;

pub use schema::{AppConfig, CaptureConfig, StreamConfig, WebConfig};
pub use store::{ConfigChange, ConfigStore};
