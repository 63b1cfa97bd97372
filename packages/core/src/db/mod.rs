//! Database Layer
//!
//! This module handles all database interactions using libsql:
//!
//! - Database initialization and connection management
//! - The primary `nodes` table (current tree shape)
//! - The `closure` relation (materialized transitive closure)
//!
//! # Architecture
//!
//! The closure relation is a derived, eagerly maintained index over the
//! primary table. The repository exposes the SQL primitives; the service
//! layer composes them inside transactions so the two tables never disagree
//! once a transaction commits.

mod database;
mod error;
mod repository;

pub use database::DatabaseService;
pub use error::DatabaseError;
pub use repository::NodeRepository;
