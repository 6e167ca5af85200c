//! Leasekeeper Common - Shared types and utilities
//!
//! This crate provides the foundational types used across all Leasekeeper components:
//! - The lease status automaton
//! - Error taxonomy and error codes
//! - Resume marker names and other constants
//! - Utility functions

pub mod error;
pub mod status;
pub mod utils;

// Re-exports for convenience
pub use error::{AppError, ErrorCode, LeaseError};
pub use status::LeaseStatus;
pub use utils::current_timestamp_ms;

/// Resume row holding the last externally observed tick index
pub const RESUME_LAST_WATCHED_TICK: &str = "last_watched_tick";

/// Resume row holding the moment of the last successful heartbeat
pub const RESUME_LAST_HEARTBEAT_MOMENT: &str = "last_heartbeat_moment";

/// Tick index, supplied by the external event source
pub type Tick = u64;

/// Coarse billing and expiry unit derived from a tick
pub type Moment = u64;
