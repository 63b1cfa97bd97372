//! Node Data Structures
//!
//! This module defines the core `Node` struct for the tree engine.
//!
//! # Architecture
//!
//! - **Externally supplied identity**: node ids come from the caller and are
//!   never generated by the engine
//! - **Parent-pointer shape**: `parent_id` is the single source of truth for
//!   the current tree shape; `root_id` names the tree a node belongs to
//! - **Derived height**: `height` is computed from the closure relation at
//!   read time, not stored authoritatively on the node row
//!
//! # Examples
//!
//! ```rust
//! use canopy_core::models::Node;
//!
//! // A child node under parent "a" in the tree rooted at "root"
//! let node = Node::new(
//!     "b".to_string(),
//!     Some("a".to_string()),
//!     "root".to_string(),
//! );
//! assert!(node.validate_for_create().is_ok());
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default timestamp for serde deserialization of payloads that omit one
fn default_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Validation errors for Node operations
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),
}

/// A single node in the tree.
///
/// # Fields
///
/// - `id`: Unique identifier, externally supplied
/// - `parent_id`: Immediate parent; `None` only for a root
/// - `root_id`: Topmost ancestor of the tree this node belongs to. A root's
///   `root_id` equals its own `id`; a non-root's `root_id` must equal its
///   parent's `root_id`
/// - `height`: Distance in edges from `root_id`, derived from the closure
///   relation whenever the node is read back
/// - `created_at` / `modified_at`: Row timestamps maintained by the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Unique node identifier
    pub id: String,

    /// Immediate parent id (None only for roots)
    pub parent_id: Option<String>,

    /// Root of the tree this node belongs to
    pub root_id: String,

    /// Distance from the root, computed from the closure relation
    #[serde(default)]
    pub height: i64,

    /// Timestamp when the node was created
    #[serde(default = "default_timestamp")]
    pub created_at: DateTime<Utc>,

    /// Timestamp when the node was last repointed
    #[serde(default = "default_timestamp")]
    pub modified_at: DateTime<Utc>,
}

impl Node {
    /// Create a new candidate node for insertion.
    ///
    /// `height` starts at 0 and is recomputed from the closure relation when
    /// the node is read back after creation.
    pub fn new(id: String, parent_id: Option<String>, root_id: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            parent_id,
            root_id,
            height: 0,
            created_at: now,
            modified_at: now,
        }
    }

    /// Whether this node is a root of its tree
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Validate the fields required to create a non-root node.
    ///
    /// `id`, `parent_id` and `root_id` must all be present and non-blank.
    /// This is a caller-side contract checked before the engine is entered,
    /// not a storage invariant.
    pub fn validate_for_create(&self) -> Result<(), ValidationError> {
        if self.id.trim().is_empty() {
            return Err(ValidationError::MissingField("id".to_string()));
        }
        match &self.parent_id {
            Some(parent_id) if !parent_id.trim().is_empty() => {}
            _ => return Err(ValidationError::MissingField("parentId".to_string())),
        }
        if self.root_id.trim().is_empty() {
            return Err(ValidationError::MissingField("rootId".to_string()));
        }
        Ok(())
    }
}
