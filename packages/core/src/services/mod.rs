//! Business Services
//!
//! This module contains the tree engine's behavior:
//!
//! - `NodeService` - create/move/query operations over the closure relation
//!
//! The service composes repository primitives inside transactions,
//! implementing the validation and cycle-detection rules of the engine.

pub mod error;
pub mod node_service;

pub use error::NodeServiceError;
pub use node_service::NodeService;
