//! Persisted registry format
//!
//! A document is a JSON object keyed by timer name:
//!
//! ```json
//! {
//!   "tea": {
//!     "type": "countdown",
//!     "config": { "duration": 180 },
//!     "actions": [{ "type": "notification", "params": { "title": "Tea" } }]
//!   }
//! }
//! ```

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::{
    error::{Result, TimerError},
    timer::TimerSpec,
};

/// One entry of a decoded document; entries fail independently
#[derive(Debug)]
pub struct DecodedEntry {
    pub name: String,
    pub spec: Result<TimerSpec>,
}

/// Render timers as a pretty-printed document
pub fn encode(timers: &BTreeMap<String, TimerSpec>) -> Result<String> {
    Ok(serde_json::to_string_pretty(timers)?)
}

/// Parse a document; only a malformed top level fails the whole call
pub fn decode(text: &str) -> Result<Vec<DecodedEntry>> {
    let document: Map<String, Value> = serde_json::from_str(text)?;

    Ok(document
        .into_iter()
        .map(|(name, value)| {
            let spec = serde_json::from_value::<TimerSpec>(value).map_err(|e| {
                TimerError::Serialization {
                    name: name.clone(),
                    reason: e.to_string(),
                }
            });
            DecodedEntry { name, spec }
        })
        .collect())
}
