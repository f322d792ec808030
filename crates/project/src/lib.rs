//! Versioned project documents and the stores that keep them.

pub mod document;
pub mod error;
pub mod migrate;
pub mod schema;
pub mod store;

pub use document::{load, save, ProjectDocument};
pub use error::{SchemaError, SchemaResult};
pub use migrate::migrate_document;
pub use schema::SchemaVersion;
pub use store::{app_data_dir, default_store_path, MemoryProjectStore, ProjectStore, SqliteProjectStore, StoredProject};
