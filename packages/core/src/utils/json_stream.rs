//! Incremental JSON Sink for Node Streams
//!
//! Writes a stream of nodes to any `AsyncWrite` as a JSON array, one
//! element at a time. Nothing is buffered beyond the element being
//! written, so arbitrarily large subtrees stream in constant memory; the
//! first stream or I/O error aborts the write and propagates to the
//! caller.

use crate::models::Node;
use crate::services::NodeServiceError;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_stream::{Stream, StreamExt};

/// Drain `stream` into `writer` as a JSON array.
///
/// # Examples
///
/// ```no_run
/// # use canopy_core::db::DatabaseService;
/// # use canopy_core::services::NodeService;
/// # use canopy_core::utils::write_json_array;
/// # use std::path::PathBuf;
/// # use std::sync::Arc;
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// # let db = Arc::new(DatabaseService::new(PathBuf::from("./tree.db")).await?);
/// # let service = NodeService::new(db);
/// let stream = service.stream_descendants("root").await?;
/// let mut out = Vec::new();
/// write_json_array(stream, &mut out).await?;
/// # Ok(())
/// # }
/// ```
pub async fn write_json_array<S, W>(mut stream: S, writer: &mut W) -> Result<(), NodeServiceError>
where
    S: Stream<Item = Result<Node, NodeServiceError>> + Unpin,
    W: AsyncWrite + Unpin,
{
    writer.write_all(b"[").await?;

    let mut first = true;
    while let Some(item) = stream.next().await {
        let node = item?;
        let json = serde_json::to_vec(&node)
            .map_err(|e| NodeServiceError::serialization_error(e.to_string()))?;
        if !first {
            writer.write_all(b",").await?;
        }
        writer.write_all(&json).await?;
        first = false;
    }

    writer.write_all(b"]").await?;
    writer.flush().await?;
    Ok(())
}
