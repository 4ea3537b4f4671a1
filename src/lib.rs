//! # bitforest
//!
//! Embeddable approximate nearest-neighbor index over fixed-width binary
//! vectors under Hamming distance.
//!
//! The index is a forest of random bit-split trees: each inner node tests one
//! bit of the query, each tree partitions the items down to small inline leaf
//! groups, and a query runs a best-first traversal across every tree, ranked
//! by how often the query agreed with the bits along its path. Candidates are
//! then reranked by exact XOR-popcount distance.
//!
//! All nodes live in one contiguous fixed-stride byte region that is written
//! to disk verbatim and memory-mapped back, so a saved index reloads without
//! parsing and queries run straight off the mapping.
//!
//! ```
//! use bitforest::HammingIndex;
//!
//! let mut index = HammingIndex::new(1);
//! index.add_item(0, &[0b0011])?;
//! index.add_item(1, &[0b0110])?;
//! index.add_item(2, &[0b1111])?;
//! index.build(5)?;
//!
//! let (ids, distances) = index.get_nns_by_vector(&[0b0000], 3, None)?;
//! assert_eq!(ids.len(), 3);
//! assert!(distances.windows(2).all(|w| w[0] <= w[1]));
//! # Ok::<(), bitforest::IndexError>(())
//! ```

/// Tuning constants for construction and storage growth.
pub mod config;
/// Error type shared by all operations.
pub mod error;
/// Node storage, metric operations, tree construction, and search.
pub mod forest;
/// The public index type.
pub mod index;
/// Deterministic KISS random generator used during builds.
pub mod rng;
/// Single-file persistence and memory-mapped reload.
pub mod storage;

pub use error::{IndexError, Result};
pub use index::HammingIndex;
pub use rng::Kiss64Random;
