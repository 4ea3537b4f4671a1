//! Tuning constants for forest construction and node storage growth.

/// Random bit draws tried by split selection before scanning every bit in order.
pub const SPLIT_RANDOM_ATTEMPTS: usize = 20;

/// Full split attempts per inner node before the random salvage path takes over.
pub const SPLIT_ATTEMPTS: usize = 3;

/// A split is accepted when the larger side holds less than this fraction of ids.
pub const SPLIT_ACCEPT_FRACTION: f64 = 0.95;

/// Random reassignment repeats while the larger side exceeds this fraction.
pub const SPLIT_SALVAGE_FRACTION: f64 = 0.99;

/// Capacity growth factor of the node region on reallocation.
pub const STORE_GROWTH_FACTOR: f64 = 1.3;
