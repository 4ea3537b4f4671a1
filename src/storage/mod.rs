//! Disk persistence: the single-file index format and its memory-mapped
//! loader.

/// Header encoding and the node-region mapping.
pub mod persistence;
