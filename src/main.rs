//! Timekeeper server entry point

use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use timekeeper::{
    actions::ActionExecutor,
    api::create_router,
    config::Config,
    registry::TimerRegistry,
    state::AppState,
    tasks::autosave_task,
    utils::shutdown_signal,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    // Initialize tracing with appropriate log level
    tracing_subscriber::fmt()
        .with_env_filter(format!("timekeeper={},tower_http=info", config.log_level()))
        .init();

    info!("Starting timekeeper v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Configuration: host={}, port={}, timers_file={:?}, dry_run={}",
        config.host, config.port, config.timers_file, config.dry_run
    );

    let executor = if config.dry_run {
        ActionExecutor::dry_run()
    } else {
        ActionExecutor::new()
    };
    let registry = Arc::new(
        TimerRegistry::new(Arc::new(executor)).with_stop_grace(config.stop_grace()),
    );

    let mut state = AppState::new(Arc::clone(&registry), config.port, config.host.clone());
    if let Some(path) = &config.timers_file {
        if path.exists() {
            let report = registry.load_from_file(path).await?;
            for (name, reason) in &report.failed {
                warn!("Skipped timer {}: {}", name, reason);
            }
        } else {
            info!("Timers file {} does not exist yet", path.display());
        }
        state = state.with_timers_file(path.clone(), config.autosave);
    }
    let state = Arc::new(state);

    if config.start_all {
        registry.start_all();
    }

    if let (Some(path), true) = (&config.timers_file, config.autosave) {
        tokio::spawn(autosave_task(Arc::clone(&registry), path.clone()));
    }

    let app = create_router(Arc::clone(&state));

    let addr = config.address();
    let listener = TcpListener::bind(&addr).await?;
    info!("Server running on http://{}", addr);

    // Setup graceful shutdown
    let server = axum::serve(listener, app);

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                error!("Server error: {}", e);
            }
        }
        signal = shutdown_signal() => {
            match signal {
                Ok(signal) => info!("Shutdown signal {} received", signal),
                Err(e) => error!("Failed to listen for shutdown signals: {}", e),
            }
        }
    }

    registry.stop_all().await;
    if let (Some(path), true) = (&state.timers_file, state.autosave) {
        if let Err(e) = registry.save_to_file(path).await {
            error!("Failed to save timers on shutdown: {}", e);
        }
    }

    info!("Server shutdown complete");
    Ok(())
}
