use std::{sync::Arc, time::Duration};

use chrono::NaiveTime;
use timekeeper::{
    actions::{Action, ActionExecutor, MessageParams},
    timer::*,
};
use tokio::{
    sync::broadcast,
    time::{sleep, Instant},
};

fn executor() -> Arc<ActionExecutor> {
    Arc::new(ActionExecutor::new())
}

fn engine(name: &str, config: TimerConfig) -> TimerEngine {
    TimerEngine::new(name, config, executor()).unwrap()
}

fn step(config: TimerConfig) -> ChainStep {
    ChainStep(TimerSpec::new(config))
}

/// Drain every event published so far
fn drain(events: &mut broadcast::Receiver<TimerEvent>) -> Vec<TimerEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}

fn triggered_by(events: &[TimerEvent], timer: &str) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, TimerEvent::Triggered { .. }) && e.timer() == timer)
        .count()
}

#[tokio::test(start_paused = true)]
async fn test_countdown_triggers_once_after_duration() {
    let timer = engine("tea", TimerConfig::Countdown(CountdownConfig { duration: 3 }));
    let mut events = timer.subscribe();
    let started = Instant::now();
    assert!(timer.start());

    loop {
        if let TimerEvent::Triggered { count, .. } = events.recv().await.unwrap() {
            assert_eq!(count, 1);
            break;
        }
    }
    assert_eq!(started.elapsed().as_secs(), 3);

    timer.wait().await;
    let snapshot = timer.snapshot();
    assert_eq!(snapshot.status, TimerStatus::Stopped);
    assert_eq!(snapshot.trigger_count, 1);
    assert!(snapshot.last_triggered.is_some());
    assert_eq!(snapshot.progress, Progress::Countdown { remaining_seconds: 0 });
}

#[tokio::test(start_paused = true)]
async fn test_zero_countdown_triggers_immediately() {
    let timer = engine("now", TimerConfig::Countdown(CountdownConfig { duration: 0 }));
    let started = Instant::now();
    timer.start();
    timer.wait().await;

    assert_eq!(started.elapsed(), Duration::ZERO);
    let snapshot = timer.snapshot();
    assert_eq!(snapshot.trigger_count, 1);
    assert_eq!(snapshot.status, TimerStatus::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_interval_stops_after_max_repeats() {
    let timer = engine(
        "stretch",
        TimerConfig::Interval(IntervalConfig {
            interval: 2,
            max_repeats: 3,
        }),
    );
    let started = Instant::now();
    timer.start();
    timer.wait().await;

    assert_eq!(started.elapsed().as_secs(), 6);
    assert_eq!(timer.snapshot().trigger_count, 3);
    assert!(!timer.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_unlimited_interval_runs_until_stopped() {
    let timer = engine(
        "forever",
        TimerConfig::Interval(IntervalConfig {
            interval: 2,
            max_repeats: -1,
        }),
    );
    timer.start();
    sleep(Duration::from_millis(10_500)).await;
    assert!(timer.is_running());
    assert_eq!(timer.snapshot().trigger_count, 5);

    timer.stop().await;
    sleep(Duration::from_secs(10)).await;
    assert_eq!(timer.snapshot().trigger_count, 5);
}

#[tokio::test(start_paused = true)]
async fn test_start_while_running_is_a_no_op() {
    let timer = engine("once", TimerConfig::Countdown(CountdownConfig { duration: 5 }));
    assert!(timer.start());
    sleep(Duration::from_secs(2)).await;
    assert!(!timer.start());

    timer.wait().await;
    assert_eq!(timer.snapshot().trigger_count, 1);

    // A finished timer can run again; counters accumulate
    assert!(timer.start());
    timer.wait().await;
    assert_eq!(timer.snapshot().trigger_count, 2);
}

#[tokio::test(start_paused = true)]
async fn test_restart_during_stop_keeps_new_run_running() {
    let timer = engine(
        "restarted",
        TimerConfig::Interval(IntervalConfig {
            interval: 1,
            max_repeats: -1,
        }),
    );
    timer.start();
    sleep(Duration::from_millis(1500)).await;
    assert_eq!(timer.snapshot().trigger_count, 1);

    let ((), restarted) = tokio::join!(timer.stop(), async { timer.start() });
    assert!(restarted);
    assert_eq!(timer.status(), TimerStatus::Running);
    assert!(timer.is_running());
    assert!(!timer.start());

    sleep(Duration::from_millis(2500)).await;
    assert_eq!(timer.snapshot().trigger_count, 3);
    assert!(timer.is_running());

    timer.stop().await;
    assert_eq!(timer.status(), TimerStatus::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_stop_is_bounded_in_every_mode() {
    let configs = vec![
        TimerConfig::Countdown(CountdownConfig { duration: 3600 }),
        TimerConfig::Interval(IntervalConfig {
            interval: 3600,
            max_repeats: -1,
        }),
        TimerConfig::Scheduled(ScheduledConfig {
            schedule_times: vec![NaiveTime::from_hms_opt(3, 33, 33).unwrap()],
            days_of_week: vec![0, 1, 2, 3, 4, 5, 6],
            date_specific: None,
        }),
        TimerConfig::Conditional(ConditionalConfig {
            condition_script: "false".to_string(),
            check_interval: 3600,
        }),
        TimerConfig::Chain(ChainConfig {
            chain_configs: vec![step(TimerConfig::Countdown(CountdownConfig { duration: 3600 }))],
        }),
        TimerConfig::WorkCycle(WorkCycleConfig::default()),
        TimerConfig::Stopwatch(StopwatchConfig {}),
    ];

    for config in configs {
        let mode = config.mode();
        let timer = engine("bounded", config);
        timer.start();
        sleep(Duration::from_millis(1500)).await;
        assert!(timer.is_running(), "{} ended early", mode);

        let stopping = Instant::now();
        timer.stop().await;
        assert!(stopping.elapsed() < DEFAULT_STOP_GRACE, "{} did not stop promptly", mode);
        assert_eq!(timer.status(), TimerStatus::Stopped);
    }
}

#[tokio::test(start_paused = true)]
async fn test_chain_runs_steps_in_sequence() {
    let timer = engine(
        "chain",
        TimerConfig::Chain(ChainConfig {
            chain_configs: vec![
                step(TimerConfig::Countdown(CountdownConfig { duration: 2 })),
                step(TimerConfig::Interval(IntervalConfig {
                    interval: 1,
                    max_repeats: 3,
                })),
            ],
        }),
    );
    let mut events = timer.subscribe();
    let started = Instant::now();
    timer.start();
    timer.wait().await;

    assert_eq!(started.elapsed().as_secs(), 5);
    let seen = drain(&mut events);
    assert_eq!(triggered_by(&seen, "chain_chain_0"), 1);
    assert_eq!(triggered_by(&seen, "chain_chain_1"), 3);
    assert_eq!(timer.snapshot().progress, Progress::Chain { step: 2, steps: 2 });
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_chain_stops_its_current_step() {
    let timer = engine(
        "chain",
        TimerConfig::Chain(ChainConfig {
            chain_configs: vec![
                step(TimerConfig::Countdown(CountdownConfig { duration: 2 })),
                step(TimerConfig::Interval(IntervalConfig {
                    interval: 3,
                    max_repeats: -1,
                })),
                step(TimerConfig::Countdown(CountdownConfig { duration: 1 })),
            ],
        }),
    );
    let mut events = timer.subscribe();
    timer.start();
    sleep(Duration::from_millis(6500)).await;
    timer.stop().await;
    sleep(Duration::from_secs(30)).await;

    let seen = drain(&mut events);
    assert_eq!(triggered_by(&seen, "chain_chain_0"), 1);
    assert_eq!(triggered_by(&seen, "chain_chain_1"), 1);
    assert_eq!(triggered_by(&seen, "chain_chain_2"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_work_cycle_phase_sequence() {
    let timer = engine(
        "focus",
        TimerConfig::WorkCycle(WorkCycleConfig {
            work_duration: 3,
            break_duration: 1,
            long_break_duration: 2,
            cycles_until_long_break: 2,
        }),
    );
    let mut events = timer.subscribe();
    let started = Instant::now();
    timer.start();

    let mut phases = Vec::new();
    let mut times = Vec::new();
    while phases.len() < 5 {
        if let TimerEvent::Triggered { phase, .. } = events.recv().await.unwrap() {
            phases.push(phase.unwrap());
            times.push(started.elapsed().as_secs());
        }
    }
    timer.stop().await;

    assert_eq!(
        phases,
        vec![
            Phase::Work,
            Phase::ShortBreak,
            Phase::Work,
            Phase::LongBreak,
            Phase::Work
        ]
    );
    assert_eq!(times, vec![3, 4, 7, 9, 12]);
}

#[tokio::test(start_paused = true)]
async fn test_conditional_triggers_on_every_satisfied_poll() {
    let timer = engine(
        "always",
        TimerConfig::Conditional(ConditionalConfig {
            condition_script: "true && !false".to_string(),
            check_interval: 2,
        }),
    );
    timer.start();
    sleep(Duration::from_secs(5)).await;
    timer.stop().await;

    let snapshot = timer.snapshot();
    assert_eq!(snapshot.trigger_count, 3);
    assert_eq!(snapshot.progress, Progress::Conditional { polls: 3 });
}

#[tokio::test]
async fn test_conditional_probe_error_never_triggers() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let probe = file.path().join("inside_a_file");
    let timer = engine(
        "broken_probe",
        TimerConfig::Conditional(ConditionalConfig {
            condition_script: format!("file_exists({:?})", probe.display().to_string()),
            check_interval: 1,
        }),
    );
    timer.start();
    sleep(Duration::from_millis(1500)).await;
    timer.stop().await;

    let snapshot = timer.snapshot();
    assert_eq!(snapshot.trigger_count, 0);
    assert!(matches!(snapshot.progress, Progress::Conditional { polls } if polls >= 1));
}

#[tokio::test(start_paused = true)]
async fn test_stopwatch_accumulates_without_triggering() {
    let timer = engine("lap", TimerConfig::Stopwatch(StopwatchConfig {}));
    timer.start();
    sleep(Duration::from_millis(2550)).await;
    timer.stop().await;

    let snapshot = timer.snapshot();
    assert_eq!(snapshot.trigger_count, 0);
    match snapshot.progress {
        Progress::Stopwatch { elapsed_ms } => assert!((2500..=2600).contains(&elapsed_ms)),
        other => panic!("unexpected progress {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_actions_run_in_order_on_each_trigger() {
    let executor = executor();
    let mut popups = executor.subscribe_popups();
    let timer = TimerEngine::from_spec(
        "ordered",
        TimerSpec::new(TimerConfig::Countdown(CountdownConfig { duration: 1 }))
            .with_action(Action::Popup(MessageParams::new("first", "one")))
            .with_action(Action::Popup(MessageParams::new("second", "two"))),
        executor,
    )
    .unwrap();

    timer.start();
    timer.wait().await;

    assert_eq!(popups.recv().await.unwrap().title, "first");
    assert_eq!(popups.recv().await.unwrap().title, "second");
}

#[tokio::test(start_paused = true)]
async fn test_failing_action_does_not_block_the_rest() {
    let executor = executor();
    let mut popups = executor.subscribe_popups();
    let timer = TimerEngine::from_spec(
        "resilient",
        TimerSpec::new(TimerConfig::Countdown(CountdownConfig { duration: 1 }))
            .with_action(Action::HttpRequest(timekeeper::actions::HttpRequestParams {
                url: "http://localhost/".to_string(),
                method: "NOT A METHOD".to_string(),
                data: String::new(),
            }))
            .with_action(Action::Popup(MessageParams::new("after", "still runs"))),
        executor,
    )
    .unwrap();
    let mut events = timer.subscribe();

    timer.start();
    timer.wait().await;

    let seen = drain(&mut events);
    assert!(seen.iter().any(|e| matches!(
        e,
        TimerEvent::ActionFailed { action: "http_request", .. }
    )));
    assert_eq!(popups.recv().await.unwrap().title, "after");
}

#[test]
fn test_invalid_configs_are_rejected() {
    let bad = vec![
        TimerConfig::Interval(IntervalConfig {
            interval: 0,
            max_repeats: 1,
        }),
        TimerConfig::Conditional(ConditionalConfig {
            condition_script: "after(\"25:00\")".to_string(),
            check_interval: 1,
        }),
        TimerConfig::Chain(ChainConfig {
            chain_configs: Vec::new(),
        }),
    ];
    for config in bad {
        assert!(TimerEngine::new("bad", config, executor()).is_err());
    }
    assert!(TimerEngine::new(
        "  ",
        TimerConfig::Countdown(CountdownConfig { duration: 1 }),
        executor()
    )
    .is_err());
}
