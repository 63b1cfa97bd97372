//! Service Layer Error Types
//!
//! This module defines error types for the tree engine's operations. Every
//! precondition failure aborts an operation before any write occurs, so
//! these errors never leave partial state behind; storage failures surface
//! as the opaque `DatabaseError` variant and mean "retry the whole
//! operation".

use crate::db::DatabaseError;
use crate::models::ValidationError;
use thiserror::Error;

/// Tree engine operation errors
#[derive(Error, Debug)]
pub enum NodeServiceError {
    /// A node with this id already exists
    #[error("A node with id {id} already exists")]
    AlreadyExists { id: String },

    /// A referenced parent/root/node id does not resolve
    #[error("The specified node {id} does not exist")]
    InvalidNode { id: String },

    /// Move target equals source
    #[error("A node can not be moved to itself")]
    MoveToSelf,

    /// Move target is within the source's own subtree
    #[error("Moving {node_id} under {new_parent_id} would create a cycle")]
    CircularReference {
        node_id: String,
        new_parent_id: String,
    },

    /// Required field blank on create (caller-side contract)
    #[error("Node validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),

    /// Storage failure; the operation performed no partial side effect
    #[error("Database operation failed: {0}")]
    DatabaseError(#[from] DatabaseError),

    /// Serialization error while writing a result stream
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// I/O failure while writing a result stream
    #[error("Stream write failed: {0}")]
    StreamWriteFailed(#[from] std::io::Error),
}

impl NodeServiceError {
    /// Create an already exists error
    pub fn already_exists(id: impl Into<String>) -> Self {
        Self::AlreadyExists { id: id.into() }
    }

    /// Create an invalid node error
    pub fn invalid_node(id: impl Into<String>) -> Self {
        Self::InvalidNode { id: id.into() }
    }

    /// Create a circular reference error
    pub fn circular_reference(
        node_id: impl Into<String>,
        new_parent_id: impl Into<String>,
    ) -> Self {
        Self::CircularReference {
            node_id: node_id.into(),
            new_parent_id: new_parent_id.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization_error(msg: impl Into<String>) -> Self {
        Self::SerializationError(msg.into())
    }
}
