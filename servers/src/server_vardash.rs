#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;

use lib_vardash::{load_dashboard, Crawler, CrawlerOptions, HttpFetcher, Hub};

mod vardash_logic;
use vardash_logic::{config, downstream, logger, state};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    let settings = config::load_config()?;
    logger::setup_logging(&settings.log_dir, &settings.log_level)?;
    log::info!("Settings: {:?}", settings);
    if settings.fetch_timeout >= settings.cycle_deadline {
        log::warn!(
            "Fetch timeout {:?} is not below the cycle deadline {:?}; slow services will be cut off by the deadline.",
            settings.fetch_timeout,
            settings.cycle_deadline
        );
    }

    // --- Phase 1: Dashboard ---
    let dashboard = load_dashboard(&settings.dashboard).with_context(|| {
        format!(
            "could not read dashboard configuration {}",
            settings.dashboard.display()
        )
    })?;
    let widgets = Arc::new(dashboard.widgets);

    // --- Phase 2: Engine ---
    let shutdown = CancellationToken::new();
    let (hub, hub_handle) = Hub::new(settings.subscriber_queue);
    let fetcher = HttpFetcher::new(settings.fetch_timeout).context("could not build HTTP client")?;
    let crawler = Arc::new(Crawler::new(
        CrawlerOptions {
            interval: settings.interval,
            cycle_deadline: settings.cycle_deadline,
        },
        Arc::new(fetcher),
        hub_handle.clone(),
        dashboard.services,
        Arc::clone(&widgets),
    ));

    let hub_task = tokio::spawn(hub.run(shutdown.clone()));
    let crawler_task = {
        let crawler = Arc::clone(&crawler);
        let shutdown = shutdown.clone();
        tokio::spawn(async move { crawler.run(shutdown).await })
    };

    // --- Phase 3: HTTP ---
    let app_state = state::AppState::new(hub_handle, &dashboard.layout, &widgets);
    let mut downstream_task = {
        let shutdown = shutdown.clone();
        let port = settings.port;
        let static_dir = settings.static_dir.clone();
        tokio::spawn(async move { downstream::run(port, &static_dir, app_state, shutdown).await })
    };

    // Wait for a shutdown signal, or for the HTTP server to fail on its own
    let server_result = tokio::select! {
        _ = shutdown_signal() => None,
        res = &mut downstream_task => Some(res),
    };

    shutdown.cancel();

    let server_result = match server_result {
        Some(res) => res,
        None => downstream_task.await,
    };
    let _ = tokio::join!(hub_task, crawler_task);

    match server_result {
        Ok(Ok(())) => {
            log::info!("Shutdown complete.");
            Ok(())
        }
        Ok(Err(e)) => {
            log::error!("Dashboard server failed: {:#}", e);
            Err(e)
        }
        Err(e) => Err(e).context("dashboard server task panicked"),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
        log::info!("Ctrl-C received, initiating shutdown.");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut term_signal) => {
                term_signal.recv().await;
                log::info!("SIGTERM received, initiating shutdown.");
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
