//! Value types returned by requests and delivered to event callbacks.

pub mod events;
pub mod market;
pub mod order;

// Re-export all types for convenience
pub use events::*;
pub use market::*;
pub use order::*;
