//! Name-keyed collection of timers

use std::{
    collections::{BTreeMap, HashMap},
    panic::{catch_unwind, AssertUnwindSafe},
    path::Path,
    sync::{Arc, Mutex},
    time::Duration,
};

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::{
    actions::ActionExecutor,
    codec,
    error::{Result, TimerError},
    timer::{TimerEngine, TimerSnapshot, TimerSpec, DEFAULT_STOP_GRACE},
    utils::lock,
};

/// Structural change to a registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "change", content = "timer", rename_all = "snake_case")]
pub enum RegistryEvent {
    Added(String),
    Removed(String),
}

/// Outcome of loading a persisted document
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadReport {
    pub loaded: Vec<String>,
    /// Entries that were not registered, with the reason
    pub failed: Vec<(String, String)>,
}

type ChangeCallback = Arc<dyn Fn(&RegistryEvent) + Send + Sync>;

/// Owns every timer by name and manages their lifecycle
pub struct TimerRegistry {
    timers: Mutex<HashMap<String, Arc<TimerEngine>>>,
    callbacks: Mutex<Vec<ChangeCallback>>,
    changes: broadcast::Sender<RegistryEvent>,
    executor: Arc<ActionExecutor>,
    stop_grace: Duration,
}

impl TimerRegistry {
    pub fn new(executor: Arc<ActionExecutor>) -> Self {
        let (changes, _) = broadcast::channel(100);
        Self {
            timers: Mutex::new(HashMap::new()),
            callbacks: Mutex::new(Vec::new()),
            changes,
            executor,
            stop_grace: DEFAULT_STOP_GRACE,
        }
    }

    /// Grace period handed to every engine built by this registry
    pub fn with_stop_grace(mut self, stop_grace: Duration) -> Self {
        self.stop_grace = stop_grace;
        self
    }

    pub fn executor(&self) -> &Arc<ActionExecutor> {
        &self.executor
    }

    /// Build an engine sharing this registry's executor; does not register it
    pub fn build(&self, name: &str, spec: TimerSpec) -> Result<TimerEngine> {
        Ok(TimerEngine::from_spec(name, spec, Arc::clone(&self.executor))?
            .with_stop_grace(self.stop_grace))
    }

    /// Build and register an engine in one step
    pub fn create(&self, name: &str, spec: TimerSpec) -> Result<Arc<TimerEngine>> {
        if self.contains(name) {
            return Err(TimerError::DuplicateName(name.to_string()));
        }
        let engine = Arc::new(self.build(name, spec)?);
        self.add(Arc::clone(&engine))?;
        Ok(engine)
    }

    /// Register an engine; the first engine with a given name wins
    pub fn add(&self, engine: Arc<TimerEngine>) -> Result<()> {
        let name = engine.name().to_string();
        {
            let mut timers = lock(&self.timers);
            if timers.contains_key(&name) {
                warn!("Timer {} already exists", name);
                return Err(TimerError::DuplicateName(name));
            }
            timers.insert(name.clone(), engine);
        }

        info!("Added timer {}", name);
        self.notify(RegistryEvent::Added(name));
        Ok(())
    }

    /// Stop and unregister a timer
    pub async fn remove(&self, name: &str) -> Result<()> {
        let engine = self.get(name).ok_or_else(|| TimerError::NotFound(name.to_string()))?;
        engine.stop().await;

        if lock(&self.timers).remove(name).is_none() {
            return Err(TimerError::NotFound(name.to_string()));
        }

        info!("Removed timer {}", name);
        self.notify(RegistryEvent::Removed(name.to_string()));
        Ok(())
    }

    /// Start a timer; `Ok(false)` when it was already running
    pub fn start(&self, name: &str) -> Result<bool> {
        let engine = self.get(name).ok_or_else(|| TimerError::NotFound(name.to_string()))?;
        Ok(engine.start())
    }

    pub async fn stop(&self, name: &str) -> Result<()> {
        let engine = self.get(name).ok_or_else(|| TimerError::NotFound(name.to_string()))?;
        engine.stop().await;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<TimerEngine>> {
        lock(&self.timers).get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        lock(&self.timers).contains_key(name)
    }

    /// Registered names, sorted
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = lock(&self.timers).keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        lock(&self.timers).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshots of every timer, sorted by name
    pub fn snapshots(&self) -> Vec<TimerSnapshot> {
        let mut snapshots: Vec<TimerSnapshot> =
            self.engines().iter().map(|engine| engine.snapshot()).collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }

    fn engines(&self) -> Vec<Arc<TimerEngine>> {
        lock(&self.timers).values().cloned().collect()
    }

    /// Start every timer that is not running; returns how many started
    pub fn start_all(&self) -> usize {
        let started = self
            .engines()
            .iter()
            .filter(|engine| engine.start())
            .count();
        info!("Started {} timers", started);
        started
    }

    /// Signal every timer to stop, then wait for all of them together
    pub async fn stop_all(&self) {
        let engines = self.engines();
        join_all(engines.iter().map(|engine| engine.stop())).await;
        info!("All timers stopped");
    }

    /// Register a copy of a timer under the first free `<name>_copy[_N]`
    pub fn duplicate(&self, name: &str) -> Result<String> {
        let original = self.get(name).ok_or_else(|| TimerError::NotFound(name.to_string()))?;

        let mut new_name = format!("{}_copy", name);
        let mut counter = 1;
        while self.contains(&new_name) {
            new_name = format!("{}_copy_{}", name, counter);
            counter += 1;
        }

        self.create(&new_name, original.spec())?;
        Ok(new_name)
    }

    /// Receive add/remove notifications
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.changes.subscribe()
    }

    /// Register a callback run after every add and remove, in registration order
    pub fn on_change<F>(&self, callback: F)
    where
        F: Fn(&RegistryEvent) + Send + Sync + 'static,
    {
        lock(&self.callbacks).push(Arc::new(callback));
    }

    fn notify(&self, event: RegistryEvent) {
        // Callbacks may call back into the registry, so run them unlocked
        let callbacks: Vec<ChangeCallback> = lock(&self.callbacks).clone();
        for callback in &callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(&event))).is_err() {
                error!("Registry change callback panicked on {:?}", event);
            }
        }

        if let Err(e) = self.changes.send(event) {
            debug!("No registry subscribers: {}", e);
        }
    }

    /// Specs of every timer keyed by name
    pub fn specs(&self) -> BTreeMap<String, TimerSpec> {
        self.engines()
            .iter()
            .map(|engine| (engine.name().to_string(), engine.spec()))
            .collect()
    }

    /// Serialize the whole registry
    pub fn to_text(&self) -> Result<String> {
        codec::encode(&self.specs())
    }

    /// Register every valid entry of a document; invalid ones are reported
    pub fn load_text(&self, text: &str) -> Result<LoadReport> {
        let mut report = LoadReport::default();

        for entry in codec::decode(text)? {
            let outcome = entry
                .spec
                .and_then(|spec| self.create(&entry.name, spec).map(|_| ()));
            match outcome {
                Ok(()) => report.loaded.push(entry.name),
                Err(e) => {
                    error!("Error loading timer {}: {}", entry.name, e);
                    report.failed.push((entry.name, e.to_string()));
                }
            }
        }

        info!(
            "Loaded {} timers ({} failed)",
            report.loaded.len(),
            report.failed.len()
        );
        Ok(report)
    }

    pub async fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let text = self.to_text()?;
        tokio::fs::write(path.as_ref(), text).await?;
        info!("Saved {} timers to {}", self.len(), path.as_ref().display());
        Ok(())
    }

    pub async fn load_from_file(&self, path: impl AsRef<Path>) -> Result<LoadReport> {
        let text = tokio::fs::read_to_string(path.as_ref()).await?;
        self.load_text(&text)
    }
}
