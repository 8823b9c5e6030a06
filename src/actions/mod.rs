//! Actions fired when a timer triggers
//!
//! Each action kind carries its own typed parameter record. The persisted
//! form is `{ "type": "<kind>", "params": { ... } }`.

pub mod executor;
pub mod platform;

use serde::{Deserialize, Serialize};

pub use executor::{
    ActionError, ActionExecutor, ActionLog, ActionResult, ExecutionStatus, PopupNotice,
};

/// A single side effect attached to a timer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "params", rename_all = "snake_case")]
pub enum Action {
    Notification(MessageParams),
    Sound(SoundParams),
    Command(CommandParams),
    Popup(MessageParams),
    FileWrite(FileWriteParams),
    HttpRequest(HttpRequestParams),
}

impl Action {
    /// Get the persisted tag of this action
    pub fn type_name(&self) -> &'static str {
        match self {
            Action::Notification(_) => "notification",
            Action::Sound(_) => "sound",
            Action::Command(_) => "command",
            Action::Popup(_) => "popup",
            Action::FileWrite(_) => "file_write",
            Action::HttpRequest(_) => "http_request",
        }
    }
}

/// Title and body shared by notifications and popups
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageParams {
    pub title: String,
    /// Empty means "Timer <name> has triggered!"
    pub message: String,
}

impl Default for MessageParams {
    fn default() -> Self {
        Self {
            title: "Timer Alert".to_string(),
            message: String::new(),
        }
    }
}

impl MessageParams {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
        }
    }

    pub(crate) fn message_for(&self, timer: &str) -> String {
        if self.message.is_empty() {
            format!("Timer {} has triggered!", timer)
        } else {
            self.message.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoundParams {
    /// Sound file to play; empty or missing falls back to the system beep
    pub file: String,
    pub system_sound: String,
}

impl Default for SoundParams {
    fn default() -> Self {
        Self {
            file: String::new(),
            system_sound: "default".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandParams {
    /// Command line handed to the platform shell
    pub command: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileWriteParams {
    pub file_path: String,
    /// Empty means "Timer <name> triggered at <now>"
    pub content: String,
    pub append: bool,
}

impl Default for FileWriteParams {
    fn default() -> Self {
        Self {
            file_path: "timer_log.txt".to_string(),
            content: String::new(),
            append: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpRequestParams {
    pub url: String,
    pub method: String,
    /// Request body, sent for every method except GET and HEAD
    pub data: String,
}

impl Default for HttpRequestParams {
    fn default() -> Self {
        Self {
            url: String::new(),
            method: "GET".to_string(),
            data: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_persisted_shape() {
        let action = Action::FileWrite(FileWriteParams {
            file_path: "/tmp/log.txt".to_string(),
            content: "done".to_string(),
            append: false,
        });
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["type"], "file_write");
        assert_eq!(json["params"]["file_path"], "/tmp/log.txt");
        assert_eq!(json["params"]["append"], false);
    }

    #[test]
    fn test_missing_params_take_defaults() {
        let action: Action =
            serde_json::from_str(r#"{"type": "http_request", "params": {"url": "http://x"}}"#)
                .unwrap();
        match action {
            Action::HttpRequest(params) => {
                assert_eq!(params.url, "http://x");
                assert_eq!(params.method, "GET");
                assert!(params.data.is_empty());
            }
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn test_unknown_action_tag_rejected() {
        let result = serde_json::from_str::<Action>(r#"{"type": "teleport", "params": {}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_default_message_mentions_timer() {
        let params = MessageParams::default();
        assert_eq!(params.title, "Timer Alert");
        assert_eq!(params.message_for("tea"), "Timer tea has triggered!");
        assert_eq!(MessageParams::new("t", "custom").message_for("tea"), "custom");
    }
}
