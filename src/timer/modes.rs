//! Run loops, one per timer mode
//!
//! Every loop suspends only on a single cancellable wait at a time, so a
//! cancelled timer notices within one tick or interval.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use chrono::Local;
use tokio::{
    sync::broadcast,
    time::{interval, interval_at, sleep, Instant, Interval, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    actions::{Action, ActionExecutor, ExecutionStatus},
    condition::{self, EvalContext},
    error::{Result, TimerError},
    utils::lock,
};

use super::{
    config::{
        ChainConfig, ConditionalConfig, CountdownConfig, IntervalConfig, ScheduledConfig,
        TimerConfig, WorkCycleConfig, WorkCycleState,
    },
    engine::TimerEngine,
    state::{Phase, Progress, RuntimeState, TimerEvent},
};

/// Granularity of countdown, work cycle and schedule polling
const TICK: Duration = Duration::from_secs(1);

/// Refresh rate of the stopwatch readout
const STOPWATCH_RESOLUTION: Duration = Duration::from_millis(100);

/// Longest polling gap a scheduled timer catches up on
const SCHEDULE_CATCH_UP_SECS: i64 = 60;

/// Everything a run loop needs, owned by its worker task
pub(crate) struct RunContext {
    pub name: String,
    pub actions: Vec<Action>,
    pub token: CancellationToken,
    pub runtime: Arc<Mutex<RuntimeState>>,
    pub events: broadcast::Sender<TimerEvent>,
    pub executor: Arc<ActionExecutor>,
    pub stop_grace: Duration,
}

impl RunContext {
    /// Sleep for `duration`; returns true if cancelled first
    async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => true,
            _ = sleep(duration) => false,
        }
    }

    /// Wait for the next tick; returns true if cancelled first
    async fn tick(&self, ticker: &mut Interval) -> bool {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => true,
            _ = ticker.tick() => false,
        }
    }

    fn set_progress(&self, progress: Progress) {
        lock(&self.runtime).progress = progress;
    }

    /// Count down whole seconds, reporting each remaining value; true if cancelled
    async fn count_down(&self, seconds: u64, report: impl Fn(u64) -> Progress) -> bool {
        let mut remaining = seconds;
        self.set_progress(report(remaining));

        let mut ticker = interval_at(Instant::now() + TICK, TICK);
        while remaining > 0 {
            if self.tick(&mut ticker).await {
                return true;
            }
            remaining -= 1;
            self.set_progress(report(remaining));
        }
        false
    }

    /// Record a trigger and run the action sequence in order
    async fn trigger(&self, phase: Option<Phase>) {
        let (count, at) = {
            let mut runtime = lock(&self.runtime);
            runtime.trigger_count += 1;
            let at = Local::now();
            runtime.last_triggered = Some(at);
            (runtime.trigger_count, at)
        };

        info!("Timer {} triggered (#{})", self.name, count);
        let _ = self.events.send(TimerEvent::Triggered {
            timer: self.name.clone(),
            count,
            phase,
            at,
        });

        let log = self.executor.execute_all(&self.name, &self.actions).await;
        for result in log.results {
            if let ExecutionStatus::Failed { error } = result.status {
                let _ = self.events.send(TimerEvent::ActionFailed {
                    timer: self.name.clone(),
                    action: result.action_type,
                    error,
                });
            }
        }
    }
}

impl TimerConfig {
    pub(crate) async fn run(&self, ctx: &RunContext) -> Result<()> {
        match self {
            TimerConfig::Countdown(c) => c.run(ctx).await,
            TimerConfig::Interval(c) => c.run(ctx).await,
            TimerConfig::Scheduled(c) => c.run(ctx).await,
            TimerConfig::Conditional(c) => c.run(ctx).await,
            TimerConfig::Chain(c) => c.run(ctx).await,
            TimerConfig::WorkCycle(c) => c.run(ctx).await,
            TimerConfig::Stopwatch(_) => run_stopwatch(ctx).await,
        }
    }
}

impl CountdownConfig {
    async fn run(&self, ctx: &RunContext) -> Result<()> {
        let cancelled = ctx
            .count_down(self.duration, |remaining_seconds| Progress::Countdown {
                remaining_seconds,
            })
            .await;

        if cancelled {
            debug!("Countdown {} cancelled", ctx.name);
        } else {
            ctx.trigger(None).await;
        }
        Ok(())
    }
}

impl IntervalConfig {
    async fn run(&self, ctx: &RunContext) -> Result<()> {
        let max_repeats = self.repeat_limit();
        let period = Duration::from_secs(self.interval);
        let mut completed = 0;
        ctx.set_progress(Progress::Interval {
            completed,
            max_repeats,
        });

        while !ctx.pause(period).await {
            ctx.trigger(None).await;
            completed += 1;
            ctx.set_progress(Progress::Interval {
                completed,
                max_repeats,
            });

            if max_repeats.is_some_and(|limit| completed >= limit) {
                info!("Interval {} finished after {} repeats", ctx.name, completed);
                break;
            }
        }
        Ok(())
    }
}

impl ScheduledConfig {
    async fn run(&self, ctx: &RunContext) -> Result<()> {
        ctx.set_progress(Progress::Scheduled { last_fired: None });

        let mut last_poll = Local::now().naive_local() - chrono::Duration::seconds(1);
        let mut ticker = interval(TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !ctx.tick(&mut ticker).await {
            let now = Local::now().naive_local();
            let gap = now - last_poll;
            let window_start = if gap > chrono::Duration::seconds(SCHEDULE_CATCH_UP_SECS) {
                debug!("Scheduled {} skipping marks missed since {}", ctx.name, last_poll);
                now - chrono::Duration::seconds(1)
            } else {
                last_poll
            };

            for mark in self.due_between(window_start, now) {
                ctx.trigger(None).await;
                ctx.set_progress(Progress::Scheduled {
                    last_fired: Some(mark),
                });
            }
            last_poll = now;
        }
        Ok(())
    }
}

impl ConditionalConfig {
    async fn run(&self, ctx: &RunContext) -> Result<()> {
        let condition = condition::parse(&self.condition_script)
            .map_err(|e| TimerError::validation(&ctx.name, e.to_string()))?;
        let period = Duration::from_secs(self.check_interval);
        let mut polls = 0;

        loop {
            let eval_ctx = EvalContext::now();
            let satisfied = if condition.needs_blocking() {
                let condition = condition.clone();
                tokio::task::spawn_blocking(move || {
                    condition::evaluate_condition(&condition, &eval_ctx)
                })
                .await
                .unwrap_or_else(|e| {
                    warn!("Condition probe for {} did not complete: {}", ctx.name, e);
                    false
                })
            } else {
                condition::evaluate_condition(&condition, &eval_ctx)
            };

            polls += 1;
            ctx.set_progress(Progress::Conditional { polls });
            if satisfied {
                ctx.trigger(None).await;
            }

            if ctx.pause(period).await {
                break;
            }
        }
        Ok(())
    }
}

impl ChainConfig {
    async fn run(&self, ctx: &RunContext) -> Result<()> {
        let steps = self.chain_configs.len();

        for (index, step) in self.chain_configs.iter().enumerate() {
            if ctx.token.is_cancelled() {
                break;
            }
            ctx.set_progress(Progress::Chain { step: index, steps });

            let child = TimerEngine::child(format!("{}_chain_{}", ctx.name, index), &step.0, ctx);
            info!("Chain {} starting step {} ({})", ctx.name, index, child.mode());
            child.launch(ctx.token.child_token());

            tokio::select! {
                biased;
                _ = ctx.token.cancelled() => {
                    debug!("Chain {} cancelled during step {}", ctx.name, index);
                    child.stop().await;
                    return Ok(());
                }
                _ = child.wait() => {}
            }
            child.stop().await;
        }

        ctx.set_progress(Progress::Chain { step: steps, steps });
        Ok(())
    }
}

impl WorkCycleConfig {
    async fn run(&self, ctx: &RunContext) -> Result<()> {
        let mut cycle = WorkCycleState::default();

        loop {
            let phase = cycle.phase(self);
            let completed_cycles = cycle.completed;
            debug!("Work cycle {} entering {:?}", ctx.name, phase);

            let cancelled = ctx
                .count_down(self.phase_duration(phase), |remaining_seconds| {
                    Progress::WorkCycle {
                        completed_cycles,
                        phase,
                        remaining_seconds,
                    }
                })
                .await;
            if cancelled {
                return Ok(());
            }

            ctx.trigger(Some(phase)).await;
            cycle.advance();
        }
    }
}

async fn run_stopwatch(ctx: &RunContext) -> Result<()> {
    let started = Instant::now();
    let mut ticker = interval(STOPWATCH_RESOLUTION);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        let cancelled = ctx.tick(&mut ticker).await;
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        ctx.set_progress(Progress::Stopwatch { elapsed_ms });
        if cancelled {
            return Ok(());
        }
    }
}
