//! Persistence layer for the API gateway.
//!
//! This crate contains:
//! - Database connection management and migrations
//! - Entity definitions (database row mappings)
//! - Repository implementations over PostgreSQL
//! - [`PgStore`] and [`MemoryStore`] implementations of the storage
//!   interface consumed by the service layer

pub mod db;
pub mod entities;
pub mod memory;
pub mod metrics;
pub mod repositories;
pub mod store;

pub use memory::MemoryStore;
pub use store::PgStore;
