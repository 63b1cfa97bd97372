//! Utilities
//!
//! - [`write_json_array`] - incremental JSON-array sink for node streams

pub mod json_stream;

pub use json_stream::write_json_array;
