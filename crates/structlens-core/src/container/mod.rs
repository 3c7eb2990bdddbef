//! Traversal of standard-library containers living in the foreign process.
//!
//! The layout engine only records where a container header sits; walking its
//! contents happens here. Every accessor re-reads the header, so handles stay
//! valid while the target mutates.

mod map;
mod string;
mod vector;

pub use map::{MapIter, NodeLayout, RemoteMap, TreeHandle, key_offset_for_alignment, value_alignment_bucket};
pub use string::RemoteString;
pub use vector::RemoteVector;

/// Upper bound on bytes copied out of a single container
pub const MAX_MATERIALIZE_BYTES: u64 = 0x10_0000;
