//! Canopy Core - Closure-Table Tree Engine
//!
//! This crate maintains a dynamic, arbitrarily deep forest of labeled nodes
//! and answers two classes of query efficiently: "is A an ancestor of B?"
//! and "list all descendants of A" - while supporting subtree relocation
//! without ever introducing a cycle.
//!
//! # Architecture
//!
//! - **Primary table**: one row per node with its current parent and root
//! - **Closure relation**: every transitively held (ancestor, descendant)
//!   pair with its depth, rebuilt incrementally on every mutation
//! - **libsql**: embedded SQLite-compatible storage; one transaction per
//!   mutating operation keeps the two relations consistent
//!
//! # Modules
//!
//! - [`models`] - data structures (Node, validation)
//! - [`services`] - the tree engine (NodeService)
//! - [`db`] - database layer with libsql integration
//! - [`utils`] - streaming JSON sink

pub mod db;
pub mod models;
pub mod services;
pub mod utils;

// Re-export commonly used types
pub use models::*;
pub use services::*;
