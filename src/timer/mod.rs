//! Timer engines
//!
//! A [`TimerEngine`] owns one timer's configuration, its ordered actions and
//! the tokio task running its mode loop.

pub mod config;
pub mod engine;
mod modes;
pub mod state;

pub use config::{
    ChainConfig, ChainStep, ConditionalConfig, CountdownConfig, IntervalConfig, ScheduledConfig,
    StopwatchConfig, TimerConfig, TimerMode, TimerSpec, WorkCycleConfig, WorkCycleState,
    MAX_CHAIN_DEPTH,
};
pub use engine::{TimerEngine, DEFAULT_STOP_GRACE};
pub use state::{Phase, Progress, RuntimeState, TimerEvent, TimerSnapshot, TimerStatus};
