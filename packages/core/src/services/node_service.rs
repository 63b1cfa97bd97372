//! Node Service - The Tree Engine
//!
//! This module provides the only component with behavior in the engine:
//! it validates and executes `create_node`, `create_root`, `move_node`,
//! `is_ancestor_of`, `find_by_id` and `stream_descendants`, keeping the
//! primary table and the closure relation mutually consistent inside one
//! transaction per mutating operation.
//!
//! # Transaction discipline
//!
//! Every mutation runs between `BEGIN IMMEDIATE` and `COMMIT` on a single
//! connection. The immediate write lock plus the per-connection busy
//! timeout serializes conflicting moves: two moves whose subtrees overlap
//! can never interleave their detach/reattach phases, and WAL readers see
//! either all four steps of a move or none of them. Mutations on disjoint
//! subtrees still contend for the single SQLite writer slot, but only for
//! the few statements of one operation.
//!
//! # Height
//!
//! `height` is re-read from the closure relation after commit rather than
//! derived from the just-written edges, so it is eventually consistent with
//! the latest committed move.

use crate::db::{DatabaseError, DatabaseService, NodeRepository};
use crate::models::{Node, ValidationError};
use crate::services::error::NodeServiceError;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Bounded channel capacity for descendant streaming.
///
/// Small enough that a slow consumer keeps memory flat, large enough that
/// the row reader is not woken for every element.
const STREAM_CHANNEL_CAPACITY: usize = 64;

/// The tree engine.
///
/// Owns the two relations through [`DatabaseService`] and composes the
/// repository's SQL primitives into the atomic operations of the engine.
/// No other component writes the tables.
///
/// # Examples
///
/// ```no_run
/// use canopy_core::db::DatabaseService;
/// use canopy_core::models::Node;
/// use canopy_core::services::NodeService;
/// use std::path::PathBuf;
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let db = Arc::new(DatabaseService::new(PathBuf::from("./tree.db")).await?);
///     let service = NodeService::new(db);
///
///     let root = service.create_root("root").await?;
///     let child = service
///         .create_node(Node::new(
///             "a".to_string(),
///             Some("root".to_string()),
///             "root".to_string(),
///         ))
///         .await?;
///     assert_eq!(child.height, 1);
///     assert!(service.is_ancestor_of(&root.id, &child.id).await?);
///     Ok(())
/// }
/// ```
pub struct NodeService {
    db: Arc<DatabaseService>,
    repo: NodeRepository,
}

impl NodeService {
    /// Create a new NodeService over an initialized database
    pub fn new(db: Arc<DatabaseService>) -> Self {
        Self {
            db,
            repo: NodeRepository::new(),
        }
    }

    async fn begin(&self, conn: &libsql::Connection) -> Result<(), DatabaseError> {
        // IMMEDIATE takes the write lock up front so the preconditions and
        // the detach/reattach joins all see one snapshot.
        conn.execute("BEGIN IMMEDIATE", ()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to begin transaction: {}", e))
        })?;
        Ok(())
    }

    async fn commit(&self, conn: &libsql::Connection) -> Result<(), DatabaseError> {
        conn.execute("COMMIT", ()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to commit transaction: {}", e))
        })?;
        Ok(())
    }

    async fn rollback(&self, conn: &libsql::Connection) {
        if let Err(e) = conn.execute("ROLLBACK", ()).await {
            tracing::warn!("Rollback failed: {}", e);
        }
    }

    /// Create a new node under an existing parent.
    ///
    /// Preconditions, checked in order inside the transaction:
    /// 1. no node with this id exists ([`NodeServiceError::AlreadyExists`])
    /// 2. the parent exists ([`NodeServiceError::InvalidNode`] naming it)
    /// 3. the root exists and equals the parent's root
    ///    ([`NodeServiceError::InvalidNode`] naming the root)
    ///
    /// Atomically inserts the primary row, the self-edge, and one closure
    /// edge per ancestor of the parent (each one level deeper). Returns the
    /// node as stored, with `height` computed from the closure relation.
    pub async fn create_node(&self, node: Node) -> Result<Node, NodeServiceError> {
        node.validate_for_create()?;
        tracing::debug!(
            "create_node: id={} parent={:?} root={}",
            node.id,
            node.parent_id,
            node.root_id
        );

        let conn = self.db.connect_with_timeout().await?;
        self.begin(&conn).await?;
        if let Err(e) = self.create_node_in_tx(&conn, &node).await {
            self.rollback(&conn).await;
            return Err(e);
        }
        self.commit(&conn).await?;
        tracing::info!("Created node {} under {:?}", node.id, node.parent_id);

        // Re-read so height comes from the committed closure relation
        self.repo
            .find_by_id(&conn, &node.id)
            .await?
            .ok_or_else(|| {
                DatabaseError::sql_execution(format!("Node {} missing after commit", node.id))
                    .into()
            })
    }

    async fn create_node_in_tx(
        &self,
        conn: &libsql::Connection,
        node: &Node,
    ) -> Result<(), NodeServiceError> {
        if self.repo.find_by_id(conn, &node.id).await?.is_some() {
            return Err(NodeServiceError::already_exists(&node.id));
        }

        let Some(parent_id) = node.parent_id.as_deref() else {
            return Err(ValidationError::MissingField("parentId".to_string()).into());
        };
        let parent = self
            .repo
            .find_by_id(conn, parent_id)
            .await?
            .ok_or_else(|| NodeServiceError::invalid_node(parent_id))?;

        // The named root must exist and agree with the parent's root
        match self.repo.find_by_id(conn, &node.root_id).await? {
            Some(root) if parent.root_id == root.id => {}
            _ => return Err(NodeServiceError::invalid_node(&node.root_id)),
        }

        self.repo.insert_node_row(conn, node).await?;
        self.repo.insert_self_edge(conn, node).await?;
        self.repo.attach_subtree(conn, &node.id, parent_id).await?;
        Ok(())
    }

    /// Create a new tree root.
    ///
    /// A root has no parent and is its own root; it is the bootstrap path
    /// for a forest, since `create_node` only accepts existing parents.
    pub async fn create_root(&self, id: &str) -> Result<Node, NodeServiceError> {
        if id.trim().is_empty() {
            return Err(ValidationError::MissingField("id".to_string()).into());
        }
        tracing::debug!("create_root: id={}", id);

        let node = Node::new(id.to_string(), None, id.to_string());
        let conn = self.db.connect_with_timeout().await?;
        self.begin(&conn).await?;
        if let Err(e) = self.create_root_in_tx(&conn, &node).await {
            self.rollback(&conn).await;
            return Err(e);
        }
        self.commit(&conn).await?;
        tracing::info!("Created root {}", id);

        self.repo.find_by_id(&conn, id).await?.ok_or_else(|| {
            DatabaseError::sql_execution(format!("Root {} missing after commit", id)).into()
        })
    }

    async fn create_root_in_tx(
        &self,
        conn: &libsql::Connection,
        node: &Node,
    ) -> Result<(), NodeServiceError> {
        if self.repo.find_by_id(conn, &node.id).await?.is_some() {
            return Err(NodeServiceError::already_exists(&node.id));
        }
        self.repo.insert_node_row(conn, node).await?;
        self.repo.insert_self_edge(conn, node).await?;
        Ok(())
    }

    /// Move the subtree rooted at `node_id` under `new_parent_id`.
    ///
    /// Preconditions: the target differs from the source
    /// ([`NodeServiceError::MoveToSelf`]), is not within the source's own
    /// subtree ([`NodeServiceError::CircularReference`]), both ids resolve
    /// and share a root ([`NodeServiceError::InvalidNode`]).
    ///
    /// Four steps in one transaction: detach the subtree's edges from the
    /// old ancestry chain, repoint the primary row, refresh the self-edge's
    /// denormalized parent/root, reattach under the new ancestry chain.
    /// Moving a node to its current parent is a legal no-op that still runs
    /// detach+reattach.
    pub async fn move_node(
        &self,
        node_id: &str,
        new_parent_id: &str,
    ) -> Result<(), NodeServiceError> {
        if node_id == new_parent_id {
            return Err(NodeServiceError::MoveToSelf);
        }
        tracing::debug!("move_node: id={} new_parent={}", node_id, new_parent_id);

        let conn = self.db.connect_with_timeout().await?;
        self.begin(&conn).await?;
        if let Err(e) = self.move_node_in_tx(&conn, node_id, new_parent_id).await {
            self.rollback(&conn).await;
            return Err(e);
        }
        self.commit(&conn).await?;
        tracing::info!("Moved node {} under {}", node_id, new_parent_id);
        Ok(())
    }

    async fn move_node_in_tx(
        &self,
        conn: &libsql::Connection,
        node_id: &str,
        new_parent_id: &str,
    ) -> Result<(), NodeServiceError> {
        // A target inside the moved subtree would close a directed cycle
        if self.repo.is_ancestor_of(conn, node_id, new_parent_id).await? {
            return Err(NodeServiceError::circular_reference(node_id, new_parent_id));
        }

        let mut node = self
            .repo
            .find_by_id(conn, node_id)
            .await?
            .ok_or_else(|| NodeServiceError::invalid_node(node_id))?;
        let new_parent = self
            .repo
            .find_by_id(conn, new_parent_id)
            .await?
            .ok_or_else(|| NodeServiceError::invalid_node(new_parent_id))?;

        // Cross-root moves are invalid; forests share the closure relation
        // but every operation stays within one tree.
        if node.root_id != new_parent.root_id {
            return Err(NodeServiceError::invalid_node(new_parent_id));
        }

        let old_parent_id = node.parent_id.take();
        node.parent_id = Some(new_parent_id.to_string());
        node.root_id = new_parent.root_id;

        // 1. Detach: drop the edges linking former ancestors to the subtree
        if let Some(old_parent_id) = &old_parent_id {
            self.repo.detach_subtree(conn, node_id, old_parent_id).await?;
        }
        // 2. Repoint the primary row
        self.repo.update_node_row(conn, &node).await?;
        // 3. Refresh the self-edge's denormalized parent/root
        self.repo.refresh_self_edge(conn, &node).await?;
        // 4. Reattach the whole subtree under the new ancestry chain
        self.repo.attach_subtree(conn, node_id, new_parent_id).await?;
        Ok(())
    }

    /// Find a node by id, with height computed from the closure relation
    pub async fn find_by_id(&self, id: &str) -> Result<Option<Node>, NodeServiceError> {
        let conn = self.db.connect_with_timeout().await?;
        Ok(self.repo.find_by_id(&conn, id).await?)
    }

    /// Pure predicate: is `ancestor_id` an ancestor of `descendant_id`?
    ///
    /// True also when the two ids are equal (every node is its own depth-0
    /// ancestor). Single indexed lookup; this is the cycle-detection
    /// primitive and the entire reason the closure relation exists.
    pub async fn is_ancestor_of(
        &self,
        ancestor_id: &str,
        descendant_id: &str,
    ) -> Result<bool, NodeServiceError> {
        let conn = self.db.connect_with_timeout().await?;
        Ok(self
            .repo
            .is_ancestor_of(&conn, ancestor_id, descendant_id)
            .await?)
    }

    /// Stream every descendant of `node_id` (the node itself excluded),
    /// each annotated with its own height.
    ///
    /// Rows are read one at a time on a dedicated connection and handed to
    /// the consumer through a bounded channel, so the result set is never
    /// materialized. A storage error mid-read is delivered as an `Err` item
    /// and ends the stream; the sequence is finite, non-restartable, and
    /// reflects one snapshot of the relation.
    pub async fn stream_descendants(
        &self,
        node_id: &str,
    ) -> Result<ReceiverStream<Result<Node, NodeServiceError>>, NodeServiceError> {
        let conn = self.db.connect_with_timeout().await?;
        let repo = self.repo.clone();
        let id = node_id.to_string();
        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);

        tokio::spawn(async move {
            let mut rows = match repo.descendant_rows(&conn, &id).await {
                Ok(rows) => rows,
                Err(e) => {
                    let _ = tx.send(Err(e.into())).await;
                    return;
                }
            };

            loop {
                match rows.next().await {
                    Ok(Some(row)) => {
                        let item =
                            NodeRepository::row_to_node(&row).map_err(NodeServiceError::from);
                        let is_err = item.is_err();
                        if tx.send(item).await.is_err() || is_err {
                            // Receiver dropped or the read failed; either
                            // way the stream is over.
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        let _ = tx
                            .send(Err(DatabaseError::sql_execution(format!(
                                "Failed to fetch descendant row of {}: {}",
                                id, e
                            ))
                            .into()))
                            .await;
                        break;
                    }
                }
            }
        });

        Ok(ReceiverStream::new(rx))
    }
}
