//! Node Repository - SQL Operations on the Two Relations
//!
//! This module contains the SQL for every primitive the tree engine needs:
//! primary-table reads/writes, self-edge maintenance, the attach/detach
//! closure joins, the indexed ancestor probe, and the streaming descendant
//! read.
//!
//! Every method takes the `libsql::Connection` to run on, so the service
//! layer controls the transaction boundary: all statements of one mutation
//! execute on the same connection between BEGIN and COMMIT.

use crate::db::error::DatabaseError;
use crate::models::Node;
use chrono::{DateTime, NaiveDateTime, Utc};
use libsql::Row;

/// SQL operations for the primary `nodes` table and the `closure` relation.
///
/// Stateless; the connection (and therefore the transaction) is supplied by
/// the caller per operation.
#[derive(Debug, Default, Clone)]
pub struct NodeRepository;

impl NodeRepository {
    /// Create a new repository
    pub fn new() -> Self {
        Self
    }

    /// Parse a timestamp from the database - handles both SQLite and RFC3339
    ///
    /// SQLite CURRENT_TIMESTAMP returns: "YYYY-MM-DD HH:MM:SS"
    /// Old data might use RFC3339: "YYYY-MM-DDTHH:MM:SSZ"
    fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
            return Ok(naive.and_utc());
        }

        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Ok(dt.with_timezone(&Utc));
        }

        Err(DatabaseError::sql_execution(format!(
            "Unable to parse timestamp '{}' as SQLite or RFC3339 format",
            s
        )))
    }

    /// Convert a libsql::Row to a Node
    ///
    /// Expected columns (in order): id, parent_id, root_id, height,
    /// created_at, modified_at. `height` may be NULL when the closure path
    /// row is missing mid-transaction; it defaults to 0.
    pub fn row_to_node(row: &Row) -> Result<Node, DatabaseError> {
        let id: String = row
            .get(0)
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to get id: {}", e)))?;
        let parent_id: Option<String> = row
            .get(1)
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to get parent_id: {}", e)))?;
        let root_id: String = row
            .get(2)
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to get root_id: {}", e)))?;
        let height: Option<i64> = row
            .get(3)
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to get height: {}", e)))?;
        let created_at_str: String = row
            .get(4)
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to get created_at: {}", e)))?;
        let modified_at_str: String = row.get(5).map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to get modified_at: {}", e))
        })?;

        Ok(Node {
            id,
            parent_id,
            root_id,
            height: height.unwrap_or(0),
            created_at: Self::parse_timestamp(&created_at_str)?,
            modified_at: Self::parse_timestamp(&modified_at_str)?,
        })
    }

    /// Find a single node by id, with `height` computed from the closure
    /// relation as the depth of the edge from the node's root to the node.
    pub async fn find_by_id(
        &self,
        conn: &libsql::Connection,
        id: &str,
    ) -> Result<Option<Node>, DatabaseError> {
        let mut stmt = conn
            .prepare(
                "SELECT n.id, n.parent_id, n.root_id, d.depth AS height,
                        n.created_at, n.modified_at
                 FROM nodes n
                 LEFT JOIN closure d ON d.ancestor = n.root_id AND d.descendant = n.id
                 WHERE n.id = ?",
            )
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!("Failed to prepare find_by_id query: {}", e))
            })?;

        let mut rows = stmt.query([id]).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to query node {}: {}", id, e))
        })?;

        match rows.next().await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to fetch node {}: {}", id, e))
        })? {
            Some(row) => Ok(Some(Self::row_to_node(&row)?)),
            None => Ok(None),
        }
    }

    /// Insert a row into the primary table
    pub async fn insert_node_row(
        &self,
        conn: &libsql::Connection,
        node: &Node,
    ) -> Result<(), DatabaseError> {
        conn.execute(
            "INSERT INTO nodes (id, parent_id, root_id) VALUES (?, ?, ?)",
            (
                node.id.as_str(),
                node.parent_id.as_deref(),
                node.root_id.as_str(),
            ),
        )
        .await
        .map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to insert node {}: {}", node.id, e))
        })?;
        Ok(())
    }

    /// Repoint a node's primary-table row to a new parent/root
    pub async fn update_node_row(
        &self,
        conn: &libsql::Connection,
        node: &Node,
    ) -> Result<(), DatabaseError> {
        conn.execute(
            "UPDATE nodes
             SET parent_id = ?, root_id = ?, modified_at = CURRENT_TIMESTAMP
             WHERE id = ?",
            (
                node.parent_id.as_deref(),
                node.root_id.as_str(),
                node.id.as_str(),
            ),
        )
        .await
        .map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to repoint node {}: {}", node.id, e))
        })?;
        Ok(())
    }

    /// Insert the depth-0 self-edge that links a node to itself
    pub async fn insert_self_edge(
        &self,
        conn: &libsql::Connection,
        node: &Node,
    ) -> Result<(), DatabaseError> {
        conn.execute(
            "INSERT INTO closure (ancestor, descendant, depth, parent_id, root_id)
             VALUES (?, ?, 0, ?, ?)",
            (
                node.id.as_str(),
                node.id.as_str(),
                node.parent_id.as_deref(),
                node.root_id.as_str(),
            ),
        )
        .await
        .map_err(|e| {
            DatabaseError::sql_execution(format!(
                "Failed to insert self-edge for node {}: {}",
                node.id, e
            ))
        })?;
        Ok(())
    }

    /// Update the denormalized parent/root on a node's self-edge only
    pub async fn refresh_self_edge(
        &self,
        conn: &libsql::Connection,
        node: &Node,
    ) -> Result<(), DatabaseError> {
        conn.execute(
            "UPDATE closure
             SET parent_id = ?, root_id = ?
             WHERE ancestor = ? AND descendant = ? AND depth = 0",
            (
                node.parent_id.as_deref(),
                node.root_id.as_str(),
                node.id.as_str(),
                node.id.as_str(),
            ),
        )
        .await
        .map_err(|e| {
            DatabaseError::sql_execution(format!(
                "Failed to refresh self-edge for node {}: {}",
                node.id, e
            ))
        })?;
        Ok(())
    }

    /// Attach a node (or a whole subtree) under a parent.
    ///
    /// Joins every ancestor edge ending at `parent_id` (including the
    /// parent's self-edge) with every descendant edge starting at `node_id`
    /// (including the node's self-edge). The new edge depth is
    /// `p.depth + c.depth + 1`; the descendant's denormalized parent comes
    /// from the subtree edge, its root from the ancestor edge.
    pub async fn attach_subtree(
        &self,
        conn: &libsql::Connection,
        node_id: &str,
        parent_id: &str,
    ) -> Result<u64, DatabaseError> {
        conn.execute(
            "INSERT INTO closure (ancestor, descendant, depth, parent_id, root_id)
             SELECT p.ancestor, c.descendant, p.depth + c.depth + 1, c.parent_id, p.root_id
             FROM closure p, closure c
             WHERE p.descendant = ? AND c.ancestor = ?",
            (parent_id, node_id),
        )
        .await
        .map_err(|e| {
            DatabaseError::sql_execution(format!(
                "Failed to attach subtree {} under {}: {}",
                node_id, parent_id, e
            ))
        })
    }

    /// Detach a subtree from its old ancestry chain.
    ///
    /// Deletes exactly the edges whose ancestor is `old_parent_id` or one of
    /// its ancestors and whose descendant is `node_id` or one of its
    /// descendants. Edges internal to the subtree have an ancestor below
    /// `old_parent_id`, so the three-way join never selects them.
    pub async fn detach_subtree(
        &self,
        conn: &libsql::Connection,
        node_id: &str,
        old_parent_id: &str,
    ) -> Result<u64, DatabaseError> {
        conn.execute(
            "DELETE FROM closure
             WHERE rowid IN (
                 SELECT link.rowid
                 FROM closure p
                 JOIN closure link ON link.ancestor = p.ancestor
                 JOIN closure c ON c.descendant = link.descendant
                 WHERE p.descendant = ? AND c.ancestor = ?
             )",
            (old_parent_id, node_id),
        )
        .await
        .map_err(|e| {
            DatabaseError::sql_execution(format!(
                "Failed to detach subtree {} from {}: {}",
                node_id, old_parent_id, e
            ))
        })
    }

    /// Single indexed probe of the closure relation: does an edge
    /// (ancestor, descendant) exist? Never a graph traversal.
    pub async fn is_ancestor_of(
        &self,
        conn: &libsql::Connection,
        ancestor_id: &str,
        descendant_id: &str,
    ) -> Result<bool, DatabaseError> {
        let mut stmt = conn
            .prepare(
                "SELECT EXISTS (
                     SELECT 1 FROM closure WHERE ancestor = ? AND descendant = ?
                 )",
            )
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!(
                    "Failed to prepare ancestor probe: {}",
                    e
                ))
            })?;

        let mut rows = stmt
            .query((ancestor_id, descendant_id))
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!(
                    "Failed to probe ancestor ({}, {}): {}",
                    ancestor_id, descendant_id, e
                ))
            })?;

        let row = rows
            .next()
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!("Failed to fetch ancestor probe: {}", e))
            })?
            .ok_or_else(|| {
                DatabaseError::sql_execution("Ancestor probe returned no rows".to_string())
            })?;

        let exists: i64 = row.get(0).map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to read ancestor probe: {}", e))
        })?;

        Ok(exists != 0)
    }

    /// Open the streaming descendant read for a node.
    ///
    /// Returns the raw row cursor; the caller drains it row by row without
    /// materializing the result set. Each descendant is annotated with its
    /// own height (depth from its own root, not from `node_id`). Ordered by
    /// height then id so the sequence is stable within one snapshot.
    pub async fn descendant_rows(
        &self,
        conn: &libsql::Connection,
        node_id: &str,
    ) -> Result<libsql::Rows, DatabaseError> {
        let mut stmt = conn
            .prepare(
                "SELECT c.descendant AS id, c.parent_id, c.root_id, d.depth AS height,
                        n.created_at, n.modified_at
                 FROM closure c
                 JOIN closure d ON d.ancestor = c.root_id AND d.descendant = c.descendant
                 JOIN nodes n ON n.id = c.descendant
                 WHERE c.ancestor = ? AND c.descendant != ?
                 ORDER BY d.depth, c.descendant",
            )
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!(
                    "Failed to prepare descendants query: {}",
                    e
                ))
            })?;

        stmt.query((node_id, node_id)).await.map_err(|e| {
            DatabaseError::sql_execution(format!(
                "Failed to query descendants of {}: {}",
                node_id, e
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timestamp_sqlite_format() {
        let ts = NodeRepository::parse_timestamp("2025-01-03 10:30:00").unwrap();
        assert_eq!(ts.to_rfc3339(), "2025-01-03T10:30:00+00:00");
    }

    #[test]
    fn test_parse_timestamp_rfc3339_format() {
        let ts = NodeRepository::parse_timestamp("2025-01-03T10:30:00Z").unwrap();
        assert_eq!(ts.to_rfc3339(), "2025-01-03T10:30:00+00:00");
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        assert!(NodeRepository::parse_timestamp("not-a-date").is_err());
    }
}
