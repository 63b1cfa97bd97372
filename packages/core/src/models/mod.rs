//! Data Models
//!
//! Core data structures shared across the engine:
//!
//! - [`Node`] - a labeled node with parent pointer, root and derived height
//! - [`ValidationError`] - caller-side field validation failures

pub mod node;

pub use node::{Node, ValidationError};
