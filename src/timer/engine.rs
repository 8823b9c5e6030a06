//! A single timer: configuration, actions and its cancellable worker

use std::{
    panic::AssertUnwindSafe,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use chrono::{DateTime, Local};
use futures::FutureExt;
use tokio::{
    runtime::Handle,
    sync::{broadcast, watch},
    task::JoinHandle,
    time::timeout,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    actions::{Action, ActionExecutor},
    error::{Result, TimerError},
    utils::lock,
};

use super::{
    config::{TimerConfig, TimerMode, TimerSpec},
    modes::RunContext,
    state::{Progress, RuntimeState, TimerEvent, TimerSnapshot, TimerStatus},
};

/// How long `stop` waits for a worker before aborting it
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(1);

struct Worker {
    generation: u64,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// One named timer and its run loop
pub struct TimerEngine {
    name: String,
    config: TimerConfig,
    actions: Mutex<Vec<Action>>,
    created_at: DateTime<Local>,
    runtime: Arc<Mutex<RuntimeState>>,
    status: Arc<watch::Sender<TimerStatus>>,
    /// Bumped on every launch; only the current run may report Stopped
    generation: Arc<AtomicU64>,
    worker: Mutex<Option<Worker>>,
    events: broadcast::Sender<TimerEvent>,
    executor: Arc<ActionExecutor>,
    stop_grace: Duration,
}

impl TimerEngine {
    /// Create a timer, rejecting configurations that fail validation
    pub fn new(
        name: impl Into<String>,
        config: TimerConfig,
        executor: Arc<ActionExecutor>,
    ) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(TimerError::validation(&name, "timer name is required"));
        }
        config
            .validate()
            .map_err(|reason| TimerError::validation(&name, reason))?;

        let (events, _) = broadcast::channel(64);
        Ok(Self::assemble(name, config, Vec::new(), executor, events, DEFAULT_STOP_GRACE))
    }

    /// Create a timer from a full spec, actions included
    pub fn from_spec(
        name: impl Into<String>,
        spec: TimerSpec,
        executor: Arc<ActionExecutor>,
    ) -> Result<Self> {
        let engine = Self::new(name, spec.config, executor)?;
        *lock(&engine.actions) = spec.actions;
        Ok(engine)
    }

    /// Chain step owned by a running parent; shares the parent's event channel
    pub(crate) fn child(name: String, spec: &TimerSpec, parent: &RunContext) -> Self {
        Self::assemble(
            name,
            spec.config.clone(),
            spec.actions.clone(),
            Arc::clone(&parent.executor),
            parent.events.clone(),
            parent.stop_grace,
        )
    }

    fn assemble(
        name: String,
        config: TimerConfig,
        actions: Vec<Action>,
        executor: Arc<ActionExecutor>,
        events: broadcast::Sender<TimerEvent>,
        stop_grace: Duration,
    ) -> Self {
        let (status, _) = watch::channel(TimerStatus::Idle);
        Self {
            name,
            config,
            actions: Mutex::new(actions),
            created_at: Local::now(),
            runtime: Arc::new(Mutex::new(RuntimeState::new())),
            status: Arc::new(status),
            generation: Arc::new(AtomicU64::new(0)),
            worker: Mutex::new(None),
            events,
            executor,
            stop_grace,
        }
    }

    /// Override how long `stop` waits for the worker
    pub fn with_stop_grace(mut self, stop_grace: Duration) -> Self {
        self.stop_grace = stop_grace;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> TimerMode {
        self.config.mode()
    }

    pub fn config(&self) -> &TimerConfig {
        &self.config
    }

    pub fn created_at(&self) -> DateTime<Local> {
        self.created_at
    }

    pub fn actions(&self) -> Vec<Action> {
        lock(&self.actions).clone()
    }

    /// Append an action; a run already in progress keeps its own copy
    pub fn add_action(&self, action: Action) {
        lock(&self.actions).push(action);
    }

    /// Configuration and actions, as persisted
    pub fn spec(&self) -> TimerSpec {
        TimerSpec {
            config: self.config.clone(),
            actions: self.actions(),
        }
    }

    pub fn status(&self) -> TimerStatus {
        *self.status.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.status() == TimerStatus::Running
    }

    /// Receive events from this timer and, for chains, from its steps
    pub fn subscribe(&self) -> broadcast::Receiver<TimerEvent> {
        self.events.subscribe()
    }

    pub fn snapshot(&self) -> TimerSnapshot {
        let runtime = lock(&self.runtime).clone();
        let status = self.status();
        TimerSnapshot {
            name: self.name.clone(),
            mode: self.mode(),
            status,
            running: status == TimerStatus::Running,
            created_at: self.created_at,
            last_triggered: runtime.last_triggered,
            trigger_count: runtime.trigger_count,
            actions: lock(&self.actions).len(),
            progress: runtime.progress,
        }
    }

    /// Start the run loop; returns false if it is already running
    ///
    /// Must be called from within a tokio runtime; elsewhere nothing is
    /// started and false is returned.
    pub fn start(&self) -> bool {
        self.launch(CancellationToken::new())
    }

    pub(crate) fn launch(&self, token: CancellationToken) -> bool {
        let Ok(runtime) = Handle::try_current() else {
            warn!("Timer {} not started: no tokio runtime on this thread", self.name);
            return false;
        };

        let mut worker = lock(&self.worker);
        if worker.as_ref().is_some_and(|w| !w.handle.is_finished()) {
            debug!("Timer {} is already running", self.name);
            return false;
        }

        lock(&self.runtime).progress = Progress::NotStarted;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.status.send_replace(TimerStatus::Running);

        let ctx = RunContext {
            name: self.name.clone(),
            actions: self.actions(),
            token: token.clone(),
            runtime: Arc::clone(&self.runtime),
            events: self.events.clone(),
            executor: Arc::clone(&self.executor),
            stop_grace: self.stop_grace,
        };
        let config = self.config.clone();
        let status = Arc::clone(&self.status);
        let current = Arc::clone(&self.generation);

        info!("Starting {} timer {}", config.mode(), self.name);
        let handle = runtime.spawn(async move {
            let _ = ctx.events.send(TimerEvent::Started {
                timer: ctx.name.clone(),
            });

            match AssertUnwindSafe(config.run(&ctx)).catch_unwind().await {
                Ok(Ok(())) => debug!("Timer {} run loop finished", ctx.name),
                Ok(Err(e)) => {
                    error!("Timer {} error: {}", ctx.name, e);
                    let _ = ctx.events.send(TimerEvent::Failed {
                        timer: ctx.name.clone(),
                        error: e.to_string(),
                    });
                }
                Err(_) => {
                    error!("Timer {} run loop panicked", ctx.name);
                    let _ = ctx.events.send(TimerEvent::Failed {
                        timer: ctx.name.clone(),
                        error: "run loop panicked".to_string(),
                    });
                }
            }

            mark_stopped(&status, &current, generation);
            let _ = ctx.events.send(TimerEvent::Finished {
                timer: ctx.name.clone(),
            });
        });

        *worker = Some(Worker {
            generation,
            token,
            handle,
        });
        true
    }

    /// Cancel the run loop and wait, up to the grace period, for it to exit
    pub async fn stop(&self) {
        let worker = lock(&self.worker).take();
        let Some(Worker {
            generation,
            token,
            mut handle,
        }) = worker
        else {
            return;
        };

        token.cancel();
        match timeout(self.stop_grace, &mut handle).await {
            Ok(_) => debug!("Timer {} stopped", self.name),
            Err(_) => {
                warn!(
                    "Timer {} did not stop within {:?}, aborting its worker",
                    self.name, self.stop_grace
                );
                handle.abort();
            }
        }

        mark_stopped(&self.status, &self.generation, generation);
    }

    /// Wait until the current run, if any, has ended
    pub async fn wait(&self) {
        let mut status = self.status.subscribe();
        let _ = status
            .wait_for(|status| *status != TimerStatus::Running)
            .await;
    }
}

/// Report Stopped unless a newer run has been launched since `generation`
fn mark_stopped(status: &watch::Sender<TimerStatus>, current: &AtomicU64, generation: u64) {
    status.send_if_modified(|status| {
        if current.load(Ordering::SeqCst) == generation && *status == TimerStatus::Running {
            *status = TimerStatus::Stopped;
            true
        } else {
            false
        }
    });
}

impl Drop for TimerEngine {
    fn drop(&mut self) {
        if let Ok(Some(worker)) = self.worker.get_mut().map(|w| w.take()) {
            worker.token.cancel();
        }
    }
}

impl std::fmt::Debug for TimerEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerEngine")
            .field("name", &self.name)
            .field("mode", &self.mode())
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::CountdownConfig;

    #[test]
    fn test_start_without_runtime_is_refused() {
        let timer = TimerEngine::new(
            "headless",
            TimerConfig::Countdown(CountdownConfig { duration: 1 }),
            Arc::new(ActionExecutor::dry_run()),
        )
        .unwrap();

        assert!(!timer.start());
        assert_eq!(timer.status(), TimerStatus::Idle);
        assert!(lock(&timer.worker).is_none());
    }
}
