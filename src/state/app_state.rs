//! Application state shared by the HTTP handlers and background tasks

use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Instant,
};
use chrono::{DateTime, Utc};

use crate::{registry::TimerRegistry, utils::lock};

/// State handed to every handler
pub struct AppState {
    pub registry: Arc<TimerRegistry>,
    /// Server metadata
    pub start_time: Instant,
    pub port: u16,
    pub host: String,
    /// Where the registry is persisted, if anywhere
    pub timers_file: Option<PathBuf>,
    pub autosave: bool,
    /// Last action tracking
    last_action: Mutex<Option<(String, DateTime<Utc>)>>,
}

impl AppState {
    pub fn new(registry: Arc<TimerRegistry>, port: u16, host: String) -> Self {
        Self {
            registry,
            start_time: Instant::now(),
            port,
            host,
            timers_file: None,
            autosave: false,
            last_action: Mutex::new(None),
        }
    }

    /// Persist the registry to `path`, optionally after every change
    pub fn with_timers_file(mut self, path: PathBuf, autosave: bool) -> Self {
        self.timers_file = Some(path);
        self.autosave = autosave;
        self
    }

    /// Remember the last mutating request, e.g. `start tea`
    pub fn record_action(&self, action: impl Into<String>) {
        *lock(&self.last_action) = Some((action.into(), Utc::now()));
    }

    pub fn get_last_action(&self) -> (Option<String>, Option<DateTime<Utc>>) {
        match lock(&self.last_action).clone() {
            Some((action, at)) => (Some(action), Some(at)),
            None => (None, None),
        }
    }

    /// Calculate server uptime as a formatted string
    pub fn get_uptime(&self) -> String {
        let duration = self.start_time.elapsed();
        let hours = duration.as_secs() / 3600;
        let minutes = (duration.as_secs() % 3600) / 60;
        let seconds = duration.as_secs() % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}s", seconds)
        }
    }
}
