pub mod cache;
pub mod case;
pub mod cluster;
pub mod config;
pub mod constants;
pub mod filters;
pub mod models;
pub mod rebuild;
pub mod repository;
pub mod store;

// Re-export the main entry points at the crate root for convenience
pub use config::CoreConfig;
pub use repository::EventRepository;
pub use store::{EventStore, StoreError};
