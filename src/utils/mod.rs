//! Utility functions module
//! 
//! Signal handling and small synchronisation helpers shared across the crate.

pub mod signals;
pub mod sync;

// Re-export main functions
pub use signals::shutdown_signal;
pub(crate) use sync::lock;
