//! Action execution.
//!
//! Executes timer actions one at a time and records the outcome of each. A
//! failing action never prevents the next one from running.

use chrono::{DateTime, Local};
use serde::Serialize;
use thiserror::Error;
use tokio::{fs::OpenOptions, io::AsyncWriteExt, sync::broadcast};
use tracing::{debug, info, warn};

use super::{
    platform, Action, CommandParams, FileWriteParams, HttpRequestParams, MessageParams,
    SoundParams,
};

/// Failure of a single action's side effect
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("command failed: {0}")]
    Command(String),

    #[error("failed to write {path}: {source}")]
    FileWrite {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid HTTP method '{0}'")]
    InvalidMethod(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Outcome of one action
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionStatus {
    Success,
    /// The platform mechanism failed and a safe fallback ran instead
    Fallback { reason: String },
    Skipped { reason: String },
    Failed { error: String },
}

/// Result of executing a single action
#[derive(Debug, Clone, Serialize)]
pub struct ActionResult {
    pub timer: String,
    pub action_type: &'static str,
    pub status: ExecutionStatus,
}

/// Results of one trigger's action sequence, in execution order
#[derive(Debug, Clone, Default, Serialize)]
pub struct ActionLog {
    pub results: Vec<ActionResult>,
}

impl ActionLog {
    /// Number of actions that failed outright
    pub fn failures(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.status, ExecutionStatus::Failed { .. }))
            .count()
    }
}

/// Popup request published for whichever front end is listening
#[derive(Debug, Clone, Serialize)]
pub struct PopupNotice {
    pub timer: String,
    pub title: String,
    pub message: String,
    pub at: DateTime<Local>,
}

/// Executes actions and reports results
pub struct ActionExecutor {
    /// Whether to actually execute actions (false for dry-run)
    dry_run: bool,
    http: reqwest::Client,
    popups: broadcast::Sender<PopupNotice>,
}

impl ActionExecutor {
    /// Create a new executor
    pub fn new() -> Self {
        let (popups, _) = broadcast::channel(32);
        Self {
            dry_run: false,
            http: reqwest::Client::new(),
            popups,
        }
    }

    /// Create a dry-run executor (doesn't actually execute)
    pub fn dry_run() -> Self {
        Self {
            dry_run: true,
            ..Self::new()
        }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Receive popups raised by popup actions
    pub fn subscribe_popups(&self) -> broadcast::Receiver<PopupNotice> {
        self.popups.subscribe()
    }

    /// Execute every action in order; failures are recorded, never propagated
    pub async fn execute_all(&self, timer: &str, actions: &[Action]) -> ActionLog {
        let mut results = Vec::with_capacity(actions.len());
        for action in actions {
            results.push(self.execute(timer, action).await);
        }
        ActionLog { results }
    }

    /// Execute a single action
    pub async fn execute(&self, timer: &str, action: &Action) -> ActionResult {
        let action_type = action.type_name();

        let status = if self.dry_run {
            ExecutionStatus::Skipped {
                reason: "dry-run mode".to_string(),
            }
        } else {
            let outcome = match action {
                Action::Notification(params) => Ok(self.notify(timer, params).await),
                Action::Sound(params) => Ok(self.play_sound(params).await),
                Action::Command(params) => self.run_command(params).await,
                Action::Popup(params) => Ok(self.popup(timer, params)),
                Action::FileWrite(params) => self.write_file(timer, params).await,
                Action::HttpRequest(params) => self.http_request(params).await,
            };
            match outcome {
                Ok(status) => status,
                Err(e) => {
                    warn!("Timer {} {} action failed: {}", timer, action_type, e);
                    ExecutionStatus::Failed {
                        error: e.to_string(),
                    }
                }
            }
        };

        debug!("Timer {} {} action: {:?}", timer, action_type, status);
        ActionResult {
            timer: timer.to_string(),
            action_type,
            status,
        }
    }

    async fn notify(&self, timer: &str, params: &MessageParams) -> ExecutionStatus {
        let message = params.message_for(timer);
        match platform::send_notification(&params.title, &message).await {
            Ok(()) => ExecutionStatus::Success,
            Err(e) => {
                warn!("Notification mechanism unavailable: {}", e);
                info!("Notification: {} - {}", params.title, message);
                ExecutionStatus::Fallback { reason: e }
            }
        }
    }

    async fn play_sound(&self, params: &SoundParams) -> ExecutionStatus {
        if params.file.is_empty() {
            platform::terminal_bell();
            return ExecutionStatus::Success;
        }

        let exists = tokio::fs::try_exists(&params.file).await.unwrap_or(false);
        let reason = if exists {
            match platform::play_sound_file(&params.file).await {
                Ok(()) => return ExecutionStatus::Success,
                Err(e) => e,
            }
        } else {
            format!("sound file {} not found", params.file)
        };

        warn!("Falling back to terminal bell: {}", reason);
        platform::terminal_bell();
        ExecutionStatus::Fallback { reason }
    }

    async fn run_command(&self, params: &CommandParams) -> Result<ExecutionStatus, ActionError> {
        if params.command.trim().is_empty() {
            return Ok(ExecutionStatus::Skipped {
                reason: "empty command".to_string(),
            });
        }

        info!("Running command: {}", params.command);
        platform::run_shell(&params.command)
            .await
            .map_err(ActionError::Command)?;
        Ok(ExecutionStatus::Success)
    }

    fn popup(&self, timer: &str, params: &MessageParams) -> ExecutionStatus {
        let notice = PopupNotice {
            timer: timer.to_string(),
            title: params.title.clone(),
            message: params.message_for(timer),
            at: Local::now(),
        };
        info!("POPUP: {} - {}", notice.title, notice.message);

        // No listener just means no front end is attached
        let _ = self.popups.send(notice);
        ExecutionStatus::Success
    }

    async fn write_file(
        &self,
        timer: &str,
        params: &FileWriteParams,
    ) -> Result<ExecutionStatus, ActionError> {
        let content = if params.content.is_empty() {
            format!("Timer {} triggered at {}", timer, Local::now().format("%Y-%m-%d %H:%M:%S"))
        } else {
            params.content.clone()
        };

        let to_error = |source| ActionError::FileWrite {
            path: params.file_path.clone(),
            source,
        };

        let mut options = OpenOptions::new();
        options.create(true);
        if params.append {
            options.append(true);
        } else {
            options.write(true).truncate(true);
        }

        let mut file = options.open(&params.file_path).await.map_err(to_error)?;
        file.write_all(format!("{}\n", content).as_bytes())
            .await
            .map_err(to_error)?;
        file.flush().await.map_err(to_error)?;

        Ok(ExecutionStatus::Success)
    }

    async fn http_request(
        &self,
        params: &HttpRequestParams,
    ) -> Result<ExecutionStatus, ActionError> {
        if params.url.trim().is_empty() {
            return Ok(ExecutionStatus::Skipped {
                reason: "empty url".to_string(),
            });
        }

        let method = params.method.trim().to_uppercase();
        let method = reqwest::Method::from_bytes(method.as_bytes())
            .map_err(|_| ActionError::InvalidMethod(params.method.clone()))?;

        let mut request = self.http.request(method.clone(), &params.url);
        let has_body = method != reqwest::Method::GET && method != reqwest::Method::HEAD;
        if has_body && !params.data.is_empty() {
            request = request.body(params.data.clone());
        }

        let response = request.send().await?.error_for_status()?;
        debug!("{} {} -> {}", method, params.url, response.status());
        Ok(ExecutionStatus::Success)
    }
}

impl Default for ActionExecutor {
    fn default() -> Self {
        Self::new()
    }
}
