//! Condition evaluation for conditional timers
//!
//! Conditions are written in a small predicate language rather than a
//! general-purpose scripting language:
//!
//! ```text
//! between("09:00", "17:30") && weekday("mon", "tue", "wed", "thu", "fri")
//! !process_running("backup") || file_exists("/tmp/force-run")
//! ```
//!
//! Supported functions are `after`, `before`, `between`, `weekday`, `date`,
//! `file_exists` and `process_running`, combined with `!`, `&&`, `||` and
//! parentheses. Function arguments are always string literals.

mod parser;

use std::{path::PathBuf, process::Command};

use chrono::{Datelike, Local, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use thiserror::Error;
use tracing::{debug, warn};

pub use parser::parse;

/// Errors raised while parsing or evaluating a condition
#[derive(Debug, Error)]
pub enum ConditionError {
    #[error("parse error at {position}: {message}")]
    Parse { position: usize, message: String },

    #[error("probe failed: {0}")]
    Probe(String),
}

/// Parsed condition tree
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Literal(bool),
    Not(Box<Condition>),
    All(Vec<Condition>),
    Any(Vec<Condition>),
    /// Time of day is at or after the mark
    After(NaiveTime),
    /// Time of day is strictly before the mark
    Before(NaiveTime),
    /// Start inclusive, end exclusive; wraps past midnight when start > end
    Between(NaiveTime, NaiveTime),
    Weekday(Vec<Weekday>),
    Date(NaiveDate),
    FileExists(PathBuf),
    ProcessRunning(String),
}

/// Bindings visible to a condition during one evaluation
#[derive(Debug, Clone, Copy)]
pub struct EvalContext {
    pub now: NaiveDateTime,
}

impl EvalContext {
    /// Context for the current local wall-clock time
    pub fn now() -> Self {
        Self {
            now: Local::now().naive_local(),
        }
    }

    pub fn at(now: NaiveDateTime) -> Self {
        Self { now }
    }
}

impl Condition {
    /// Whether evaluation touches the filesystem or the process table
    pub fn needs_blocking(&self) -> bool {
        match self {
            Condition::FileExists(_) | Condition::ProcessRunning(_) => true,
            Condition::Not(inner) => inner.needs_blocking(),
            Condition::All(terms) | Condition::Any(terms) => terms.iter().any(Self::needs_blocking),
            _ => false,
        }
    }

    /// Evaluate against `ctx`, short-circuiting `&&` and `||`
    pub fn eval(&self, ctx: &EvalContext) -> Result<bool, ConditionError> {
        let time = ctx.now.time();
        match self {
            Condition::Literal(value) => Ok(*value),
            Condition::Not(inner) => Ok(!inner.eval(ctx)?),
            Condition::All(terms) => {
                for term in terms {
                    if !term.eval(ctx)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Condition::Any(terms) => {
                for term in terms {
                    if term.eval(ctx)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Condition::After(mark) => Ok(time >= *mark),
            Condition::Before(mark) => Ok(time < *mark),
            Condition::Between(start, end) => Ok(if start <= end {
                time >= *start && time < *end
            } else {
                time >= *start || time < *end
            }),
            Condition::Weekday(days) => Ok(days.contains(&ctx.now.weekday())),
            Condition::Date(date) => Ok(ctx.now.date() == *date),
            Condition::FileExists(path) => path
                .try_exists()
                .map_err(|e| ConditionError::Probe(format!("{}: {}", path.display(), e))),
            Condition::ProcessRunning(name) => process_running(name),
        }
    }
}

#[cfg(not(windows))]
fn process_running(name: &str) -> Result<bool, ConditionError> {
    let output = Command::new("pgrep")
        .args(["-x", name])
        .output()
        .map_err(|e| ConditionError::Probe(format!("failed to execute pgrep: {e}")))?;

    // pgrep exits 1 when nothing matched
    match output.status.code() {
        Some(0) => Ok(true),
        Some(1) => Ok(false),
        code => Err(ConditionError::Probe(format!(
            "pgrep exited with {:?}: {}",
            code,
            String::from_utf8_lossy(&output.stderr).trim()
        ))),
    }
}

#[cfg(windows)]
fn process_running(name: &str) -> Result<bool, ConditionError> {
    let output = Command::new("tasklist")
        .args(["/FI", &format!("IMAGENAME eq {name}"), "/NH"])
        .output()
        .map_err(|e| ConditionError::Probe(format!("failed to execute tasklist: {e}")))?;

    let stdout = String::from_utf8_lossy(&output.stdout).to_lowercase();
    Ok(stdout.contains(&name.to_lowercase()))
}

/// Evaluate a parsed condition; any probe failure counts as false
pub fn evaluate_condition(condition: &Condition, ctx: &EvalContext) -> bool {
    match condition.eval(ctx) {
        Ok(result) => {
            debug!("Condition evaluated to {}", result);
            result
        }
        Err(e) => {
            warn!("Condition evaluation failed: {}", e);
            false
        }
    }
}

/// Parse and evaluate `expression`; parse and probe failures count as false
pub fn evaluate(expression: &str, ctx: &EvalContext) -> bool {
    match parse(expression) {
        Ok(condition) => evaluate_condition(&condition, ctx),
        Err(e) => {
            warn!("Condition '{}' rejected: {}", expression, e);
            false
        }
    }
}
