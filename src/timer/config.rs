//! Timer modes and their per-mode configuration

use std::{collections::BTreeSet, fmt};

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::{actions::Action, condition};

use super::state::Phase;

/// Deepest allowed nesting of chain timers inside chain timers
pub const MAX_CHAIN_DEPTH: usize = 8;

/// Temporal semantics of a timer, fixed at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerMode {
    Countdown,
    Interval,
    Scheduled,
    Conditional,
    Chain,
    #[serde(rename = "pomodoro")]
    WorkCycle,
    Stopwatch,
}

impl TimerMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimerMode::Countdown => "countdown",
            TimerMode::Interval => "interval",
            TimerMode::Scheduled => "scheduled",
            TimerMode::Conditional => "conditional",
            TimerMode::Chain => "chain",
            TimerMode::WorkCycle => "pomodoro",
            TimerMode::Stopwatch => "stopwatch",
        }
    }
}

impl fmt::Display for TimerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Countdown: trigger once after `duration` seconds
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CountdownConfig {
    pub duration: u64,
}

/// Interval: trigger every `interval` seconds, `max_repeats` times (≤ 0 = forever)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntervalConfig {
    pub interval: u64,
    pub max_repeats: i64,
}

impl Default for IntervalConfig {
    fn default() -> Self {
        Self {
            interval: 60,
            max_repeats: -1,
        }
    }
}

impl IntervalConfig {
    /// Repeat limit, or `None` when the timer repeats until stopped
    pub fn repeat_limit(&self) -> Option<u64> {
        u64::try_from(self.max_repeats).ok().filter(|n| *n > 0)
    }
}

/// Scheduled: trigger at time-of-day marks on allowed weekdays
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduledConfig {
    #[serde(with = "time_marks")]
    pub schedule_times: Vec<NaiveTime>,
    /// 0 = Monday … 6 = Sunday
    pub days_of_week: Vec<u8>,
    pub date_specific: Option<NaiveDate>,
}

impl Default for ScheduledConfig {
    fn default() -> Self {
        Self {
            schedule_times: Vec::new(),
            days_of_week: (0..7).collect(),
            date_specific: None,
        }
    }
}

impl ScheduledConfig {
    fn day_allowed(&self, date: NaiveDate) -> bool {
        let weekday = date.weekday().num_days_from_monday() as u8;
        self.days_of_week.contains(&weekday) && self.date_specific.map_or(true, |d| d == date)
    }

    /// Marks falling in the half-open window `(after, until]`, oldest first
    pub fn due_between(&self, after: NaiveDateTime, until: NaiveDateTime) -> Vec<NaiveDateTime> {
        if until <= after {
            return Vec::new();
        }

        let mut due = BTreeSet::new();
        let mut date = after.date();
        while date <= until.date() {
            if self.day_allowed(date) {
                for mark in &self.schedule_times {
                    let candidate = date.and_time(*mark);
                    if candidate > after && candidate <= until {
                        due.insert(candidate);
                    }
                }
            }
            match date.succ_opt() {
                Some(next) => date = next,
                None => break,
            }
        }
        due.into_iter().collect()
    }
}

/// Conditional: evaluate `condition_script` every `check_interval` seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConditionalConfig {
    pub condition_script: String,
    pub check_interval: u64,
}

impl Default for ConditionalConfig {
    fn default() -> Self {
        Self {
            condition_script: String::new(),
            check_interval: 30,
        }
    }
}

/// Chain: run sub-timers one after another
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    pub chain_configs: Vec<ChainStep>,
}

/// Work cycle (pomodoro): alternate work and break phases
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkCycleConfig {
    pub work_duration: u64,
    pub break_duration: u64,
    pub long_break_duration: u64,
    pub cycles_until_long_break: u32,
}

impl Default for WorkCycleConfig {
    fn default() -> Self {
        Self {
            work_duration: 25 * 60,
            break_duration: 5 * 60,
            long_break_duration: 15 * 60,
            cycles_until_long_break: 4,
        }
    }
}

impl WorkCycleConfig {
    pub fn phase_duration(&self, phase: Phase) -> u64 {
        match phase {
            Phase::Work => self.work_duration,
            Phase::ShortBreak => self.break_duration,
            Phase::LongBreak => self.long_break_duration,
        }
    }
}

/// Position inside a work cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkCycleState {
    /// Completed work phases
    pub completed: u32,
    pub on_break: bool,
}

impl WorkCycleState {
    pub fn phase(&self, config: &WorkCycleConfig) -> Phase {
        if !self.on_break {
            Phase::Work
        } else if self.completed > 0 && self.completed % config.cycles_until_long_break == 0 {
            Phase::LongBreak
        } else {
            Phase::ShortBreak
        }
    }

    /// Move past the current phase; only work phases count as cycles
    pub fn advance(&mut self) {
        if !self.on_break {
            self.completed += 1;
        }
        self.on_break = !self.on_break;
    }
}

/// Stopwatch: accumulate elapsed time, never trigger
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StopwatchConfig {}

/// Mode-specific configuration; the variant fixes the timer's mode
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TimerConfig {
    Countdown(CountdownConfig),
    Interval(IntervalConfig),
    Scheduled(ScheduledConfig),
    Conditional(ConditionalConfig),
    Chain(ChainConfig),
    WorkCycle(WorkCycleConfig),
    Stopwatch(StopwatchConfig),
}

impl TimerConfig {
    pub fn mode(&self) -> TimerMode {
        match self {
            TimerConfig::Countdown(_) => TimerMode::Countdown,
            TimerConfig::Interval(_) => TimerMode::Interval,
            TimerConfig::Scheduled(_) => TimerMode::Scheduled,
            TimerConfig::Conditional(_) => TimerMode::Conditional,
            TimerConfig::Chain(_) => TimerMode::Chain,
            TimerConfig::WorkCycle(_) => TimerMode::WorkCycle,
            TimerConfig::Stopwatch(_) => TimerMode::Stopwatch,
        }
    }

    /// Decode the `config` object of a persisted entry for `mode`
    pub fn from_parts(mode: TimerMode, config: Value) -> Result<Self, serde_json::Error> {
        let config = if config.is_null() {
            Value::Object(Map::new())
        } else {
            config
        };

        Ok(match mode {
            TimerMode::Countdown => TimerConfig::Countdown(serde_json::from_value(config)?),
            TimerMode::Interval => TimerConfig::Interval(serde_json::from_value(config)?),
            TimerMode::Scheduled => TimerConfig::Scheduled(serde_json::from_value(config)?),
            TimerMode::Conditional => TimerConfig::Conditional(serde_json::from_value(config)?),
            TimerMode::Chain => TimerConfig::Chain(serde_json::from_value(config)?),
            TimerMode::WorkCycle => TimerConfig::WorkCycle(serde_json::from_value(config)?),
            TimerMode::Stopwatch => TimerConfig::Stopwatch(serde_json::from_value(config)?),
        })
    }

    /// Check mode-specific constraints
    pub fn validate(&self) -> Result<(), String> {
        self.validate_at(0)
    }

    fn validate_at(&self, depth: usize) -> Result<(), String> {
        match self {
            TimerConfig::Countdown(_) | TimerConfig::Stopwatch(_) => Ok(()),
            TimerConfig::Interval(c) => {
                if c.interval == 0 {
                    return Err("interval must be at least 1 second".to_string());
                }
                Ok(())
            }
            TimerConfig::Scheduled(c) => {
                if c.schedule_times.is_empty() {
                    return Err("at least one schedule time is required".to_string());
                }
                if c.days_of_week.is_empty() {
                    return Err("at least one day of the week is required".to_string());
                }
                if let Some(day) = c.days_of_week.iter().find(|d| **d > 6) {
                    return Err(format!("day of week {} is out of range 0-6", day));
                }
                Ok(())
            }
            TimerConfig::Conditional(c) => {
                if c.check_interval == 0 {
                    return Err("check interval must be at least 1 second".to_string());
                }
                condition::parse(&c.condition_script)
                    .map(|_| ())
                    .map_err(|e| format!("invalid condition: {}", e))
            }
            TimerConfig::Chain(c) => {
                if depth >= MAX_CHAIN_DEPTH {
                    return Err(format!("chains nest deeper than {} levels", MAX_CHAIN_DEPTH));
                }
                if c.chain_configs.is_empty() {
                    return Err("chain needs at least one step".to_string());
                }
                for (index, step) in c.chain_configs.iter().enumerate() {
                    step.0
                        .config
                        .validate_at(depth + 1)
                        .map_err(|e| format!("chain step {}: {}", index, e))?;
                }
                Ok(())
            }
            TimerConfig::WorkCycle(c) => {
                if c.work_duration == 0 {
                    return Err("work duration must be at least 1 second".to_string());
                }
                if c.cycles_until_long_break == 0 {
                    return Err("cycles until long break must be at least 1".to_string());
                }
                Ok(())
            }
        }
    }
}

/// Full description of a timer: configuration plus ordered actions
///
/// Persisted as `{ "type": ..., "config": { ... }, "actions": [ ... ] }`.
#[derive(Debug, Clone, PartialEq)]
pub struct TimerSpec {
    pub config: TimerConfig,
    pub actions: Vec<Action>,
}

impl TimerSpec {
    pub fn new(config: TimerConfig) -> Self {
        Self {
            config,
            actions: Vec::new(),
        }
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

fn no_actions(actions: &&[Action]) -> bool {
    actions.is_empty()
}

#[derive(Serialize)]
struct SpecRef<'a> {
    #[serde(rename = "type")]
    mode: TimerMode,
    config: &'a TimerConfig,
    actions: &'a [Action],
}

#[derive(Deserialize)]
struct RawSpec {
    #[serde(rename = "type")]
    mode: TimerMode,
    #[serde(default = "empty_object")]
    config: Value,
    #[serde(default)]
    actions: Vec<Action>,
}

impl Serialize for TimerSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        SpecRef {
            mode: self.config.mode(),
            config: &self.config,
            actions: &self.actions,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TimerSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawSpec::deserialize(deserializer)?;
        let config = TimerConfig::from_parts(raw.mode, raw.config).map_err(D::Error::custom)?;
        Ok(TimerSpec {
            config,
            actions: raw.actions,
        })
    }
}

/// One step of a chain
///
/// Persisted flat: `{ "type": ..., <config fields>, "actions": [ ... ] }`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainStep(pub TimerSpec);

#[derive(Serialize)]
struct StepRef<'a> {
    #[serde(rename = "type")]
    mode: TimerMode,
    #[serde(flatten)]
    config: &'a TimerConfig,
    #[serde(skip_serializing_if = "no_actions")]
    actions: &'a [Action],
}

#[derive(Deserialize)]
struct RawStep {
    #[serde(rename = "type")]
    mode: TimerMode,
    #[serde(default)]
    actions: Vec<Action>,
    #[serde(flatten)]
    config: Map<String, Value>,
}

impl Serialize for ChainStep {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        StepRef {
            mode: self.0.config.mode(),
            config: &self.0.config,
            actions: &self.0.actions,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ChainStep {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawStep::deserialize(deserializer)?;
        let config =
            TimerConfig::from_parts(raw.mode, Value::Object(raw.config)).map_err(D::Error::custom)?;
        Ok(ChainStep(TimerSpec {
            config,
            actions: raw.actions,
        }))
    }
}

/// `HH:MM[:SS]` strings for schedule marks
mod time_marks {
    use chrono::NaiveTime;
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(marks: &[NaiveTime], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(marks.iter().map(|t| t.format("%H:%M:%S").to_string()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<NaiveTime>, D::Error> {
        Vec::<String>::deserialize(deserializer)?
            .iter()
            .map(|s| {
                NaiveTime::parse_from_str(s, "%H:%M:%S")
                    .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
                    .map_err(|_| D::Error::custom(format!("invalid time format: {}", s)))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn hms(h: u32, m: u32, s: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, s).unwrap()
    }

    #[test]
    fn test_mode_tags() {
        assert_eq!(serde_json::to_value(TimerMode::WorkCycle).unwrap(), "pomodoro");
        assert_eq!(
            serde_json::from_value::<TimerMode>(json!("countdown")).unwrap(),
            TimerMode::Countdown
        );
        assert!(serde_json::from_value::<TimerMode>(json!("egg")).is_err());
    }

    #[test]
    fn test_from_parts_applies_defaults() {
        let config = TimerConfig::from_parts(TimerMode::Interval, json!({})).unwrap();
        assert_eq!(config, TimerConfig::Interval(IntervalConfig::default()));

        let config = TimerConfig::from_parts(TimerMode::Stopwatch, Value::Null).unwrap();
        assert_eq!(config.mode(), TimerMode::Stopwatch);

        let config = TimerConfig::from_parts(
            TimerMode::Scheduled,
            json!({"schedule_times": ["08:30", "17:45:10"], "date_specific": "2024-06-01"}),
        )
        .unwrap();
        match config {
            TimerConfig::Scheduled(c) => {
                assert_eq!(c.schedule_times, vec![hms(8, 30, 0), hms(17, 45, 10)]);
                assert_eq!(c.days_of_week, (0..7).collect::<Vec<u8>>());
                assert_eq!(c.date_specific, NaiveDate::from_ymd_opt(2024, 6, 1));
            }
            other => panic!("unexpected config {other:?}"),
        }
    }

    #[test]
    fn test_validation_rules() {
        let bad = [
            TimerConfig::Interval(IntervalConfig { interval: 0, max_repeats: 3 }),
            TimerConfig::Scheduled(ScheduledConfig::default()),
            TimerConfig::Scheduled(ScheduledConfig {
                schedule_times: vec![hms(9, 0, 0)],
                days_of_week: vec![7],
                date_specific: None,
            }),
            TimerConfig::Conditional(ConditionalConfig::default()),
            TimerConfig::Conditional(ConditionalConfig {
                condition_script: "true".to_string(),
                check_interval: 0,
            }),
            TimerConfig::Chain(ChainConfig::default()),
            TimerConfig::WorkCycle(WorkCycleConfig {
                cycles_until_long_break: 0,
                ..WorkCycleConfig::default()
            }),
        ];
        for config in bad {
            assert!(config.validate().is_err(), "expected {config:?} to be rejected");
        }

        assert!(TimerConfig::Countdown(CountdownConfig { duration: 0 }).validate().is_ok());
        assert!(TimerConfig::Conditional(ConditionalConfig {
            condition_script: r#"after("09:00")"#.to_string(),
            check_interval: 5,
        })
        .validate()
        .is_ok());
    }

    fn nested_chain(levels: usize) -> TimerConfig {
        let mut config = TimerConfig::Countdown(CountdownConfig { duration: 1 });
        for _ in 0..levels {
            config = TimerConfig::Chain(ChainConfig {
                chain_configs: vec![ChainStep(TimerSpec::new(config))],
            });
        }
        config
    }

    #[test]
    fn test_chain_depth_is_capped() {
        assert!(nested_chain(MAX_CHAIN_DEPTH).validate().is_ok());
        let err = nested_chain(MAX_CHAIN_DEPTH + 1).validate().unwrap_err();
        assert!(err.contains("nest deeper"), "unexpected error: {err}");
    }

    #[test]
    fn test_chain_step_invalid_child_rejected() {
        let config = TimerConfig::Chain(ChainConfig {
            chain_configs: vec![ChainStep(TimerSpec::new(TimerConfig::Interval(
                IntervalConfig { interval: 0, max_repeats: 1 },
            )))],
        });
        let err = config.validate().unwrap_err();
        assert!(err.starts_with("chain step 0"));
    }

    #[test]
    fn test_chain_step_flat_form() {
        let step: ChainStep = serde_json::from_value(json!({
            "type": "interval",
            "interval": 1,
            "max_repeats": 3,
            "actions": [{"type": "command", "params": {"command": "true"}}]
        }))
        .unwrap();
        assert_eq!(
            step.0.config,
            TimerConfig::Interval(IntervalConfig { interval: 1, max_repeats: 3 })
        );
        assert_eq!(step.0.actions.len(), 1);

        let value = serde_json::to_value(&step).unwrap();
        assert_eq!(value["type"], "interval");
        assert_eq!(value["max_repeats"], 3);
        assert_eq!(value["actions"][0]["type"], "command");

        let bare = ChainStep(TimerSpec::new(TimerConfig::Countdown(CountdownConfig {
            duration: 2,
        })));
        assert_eq!(
            serde_json::to_value(&bare).unwrap(),
            json!({"type": "countdown", "duration": 2})
        );
    }

    #[test]
    fn test_scheduled_day_filters() {
        // 2024-03-04 is a Monday
        let config = ScheduledConfig {
            schedule_times: vec![hms(8, 30, 0)],
            days_of_week: vec![0, 2],
            date_specific: None,
        };
        let week = config.due_between(dt("2024-03-04 00:00:00"), dt("2024-03-10 23:59:59"));
        assert_eq!(week, vec![dt("2024-03-04 08:30:00"), dt("2024-03-06 08:30:00")]);

        let dated = ScheduledConfig {
            date_specific: NaiveDate::from_ymd_opt(2024, 3, 6),
            ..config
        };
        let week = dated.due_between(dt("2024-03-04 00:00:00"), dt("2024-03-10 23:59:59"));
        assert_eq!(week, vec![dt("2024-03-06 08:30:00")]);
    }

    #[test]
    fn test_due_between_window() {
        let config = ScheduledConfig {
            schedule_times: vec![hms(23, 59, 59), hms(0, 0, 0), hms(12, 0, 0)],
            ..ScheduledConfig::default()
        };

        // A late poll still catches both marks around midnight, once each
        let due = config.due_between(dt("2024-03-04 23:59:58"), dt("2024-03-05 00:00:01"));
        assert_eq!(due, vec![dt("2024-03-04 23:59:59"), dt("2024-03-05 00:00:00")]);

        // The lower bound is exclusive, so consecutive windows never repeat a mark
        assert!(config
            .due_between(dt("2024-03-05 00:00:01"), dt("2024-03-05 00:00:02"))
            .is_empty());
        assert_eq!(
            config.due_between(dt("2024-03-05 11:59:59"), dt("2024-03-05 12:00:00")),
            vec![dt("2024-03-05 12:00:00")]
        );
        assert!(config
            .due_between(dt("2024-03-05 12:00:00"), dt("2024-03-05 12:00:00"))
            .is_empty());
    }

    #[test]
    fn test_work_cycle_phase_sequence() {
        let config = WorkCycleConfig {
            work_duration: 2,
            break_duration: 1,
            long_break_duration: 3,
            cycles_until_long_break: 2,
        };
        let mut state = WorkCycleState::default();
        let mut phases = Vec::new();
        for _ in 0..8 {
            phases.push(state.phase(&config));
            state.advance();
        }
        assert_eq!(
            phases,
            vec![
                Phase::Work,
                Phase::ShortBreak,
                Phase::Work,
                Phase::LongBreak,
                Phase::Work,
                Phase::ShortBreak,
                Phase::Work,
                Phase::LongBreak,
            ]
        );
        assert_eq!(state.completed, 4);
    }
}
