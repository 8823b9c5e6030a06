//! Timekeeper - timer scheduling and action dispatch
//!
//! Named timers run in one of several modes (countdown, interval, scheduled,
//! conditional, chain, work cycle, stopwatch) and fire an ordered list of
//! actions each time they trigger. A [`TimerRegistry`] owns them by name and
//! persists them as JSON; an axum server exposes the registry over HTTP.

pub mod actions;
pub mod api;
pub mod codec;
pub mod condition;
pub mod config;
pub mod error;
pub mod registry;
pub mod state;
pub mod tasks;
pub mod timer;
pub mod utils;

// Re-export commonly used types
pub use actions::{Action, ActionExecutor};
pub use api::create_router;
pub use config::Config;
pub use error::{Result, TimerError};
pub use registry::{LoadReport, RegistryEvent, TimerRegistry};
pub use state::AppState;
pub use timer::{TimerConfig, TimerEngine, TimerEvent, TimerMode, TimerSnapshot, TimerSpec};
pub use utils::shutdown_signal;
