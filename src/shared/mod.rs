//! Shared utilities and types used across the transport and API modules.

pub mod serde_util;
pub mod types;

// Re-export commonly used items
pub use types::*;
