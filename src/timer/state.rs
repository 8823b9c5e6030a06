//! Runtime state, snapshots and events of a timer

use chrono::{DateTime, Local, NaiveDateTime};
use serde::Serialize;

use super::config::TimerMode;

/// Lifecycle of a timer engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerStatus {
    /// Constructed, never started
    Idle,
    Running,
    /// Stopped on request or finished on its own
    Stopped,
}

/// Phase of a work cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Work,
    ShortBreak,
    LongBreak,
}

/// Mode-specific progress of the current (or last) run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Progress {
    NotStarted,
    Countdown {
        remaining_seconds: u64,
    },
    Interval {
        completed: u64,
        max_repeats: Option<u64>,
    },
    Scheduled {
        last_fired: Option<NaiveDateTime>,
    },
    Conditional {
        polls: u64,
    },
    Chain {
        step: usize,
        steps: usize,
    },
    WorkCycle {
        completed_cycles: u32,
        phase: Phase,
        remaining_seconds: u64,
    },
    Stopwatch {
        elapsed_ms: u64,
    },
}

/// Counters owned by the engine's worker
#[derive(Debug, Clone)]
pub struct RuntimeState {
    pub trigger_count: u64,
    pub last_triggered: Option<DateTime<Local>>,
    pub progress: Progress,
}

impl RuntimeState {
    pub fn new() -> Self {
        Self {
            trigger_count: 0,
            last_triggered: None,
            progress: Progress::NotStarted,
        }
    }
}

impl Default for RuntimeState {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time view of a timer for display
#[derive(Debug, Clone, Serialize)]
pub struct TimerSnapshot {
    pub name: String,
    #[serde(rename = "type")]
    pub mode: TimerMode,
    pub status: TimerStatus,
    pub running: bool,
    pub created_at: DateTime<Local>,
    pub last_triggered: Option<DateTime<Local>>,
    pub trigger_count: u64,
    pub actions: usize,
    pub progress: Progress,
}

/// Notifications published by running timers
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TimerEvent {
    Started {
        timer: String,
    },
    Triggered {
        timer: String,
        count: u64,
        phase: Option<Phase>,
        at: DateTime<Local>,
    },
    ActionFailed {
        timer: String,
        action: &'static str,
        error: String,
    },
    /// The run loop hit an error and ended
    Failed {
        timer: String,
        error: String,
    },
    Finished {
        timer: String,
    },
}

impl TimerEvent {
    pub fn timer(&self) -> &str {
        match self {
            TimerEvent::Started { timer }
            | TimerEvent::Triggered { timer, .. }
            | TimerEvent::ActionFailed { timer, .. }
            | TimerEvent::Failed { timer, .. }
            | TimerEvent::Finished { timer } => timer,
        }
    }
}
