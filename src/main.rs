use anyhow::Result;
use statmon::*;
use tokio::sync::oneshot;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(_) => {
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries the report lines; diagnostics go to stderr
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let app_config = config::AppConfig::load()?;

    let fetcher =
        fetcher::StatsFetcher::new(&app_config.server, app_config.parsing.parse_options());
    tracing::info!(
        version = version::VERSION,
        endpoint = %fetcher.endpoint(),
        poll_interval_secs = app_config.monitoring.poll_interval_secs,
        error_ceiling = app_config.monitoring.error_ceiling,
        on_error_ceiling = ?app_config.monitoring.on_error_ceiling,
        "{} starting",
        version::NAME
    );

    let poller = poller::Poller::new(
        fetcher,
        poller::StdoutSink,
        poller::PollerConfig {
            poll_interval: app_config.monitoring.poll_interval(),
            error_ceiling: app_config.monitoring.error_ceiling,
            on_error_ceiling: app_config.monitoring.on_error_ceiling,
            thresholds: app_config.thresholds,
            evaluator: app_config.parsing.evaluator_options(),
        },
    );

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let mut poller_handle = poller::spawn(poller, shutdown_rx);

    let exit = tokio::select! {
        result = &mut poller_handle => result?,
        _ = shutdown_signal() => {
            println!("Received shutdown signal");
            tracing::info!("Received shutdown signal");
            let _ = shutdown_tx.send(());
            poller_handle.await?
        }
    };

    if exit == poller::PollExit::GaveUp {
        std::process::exit(1);
    }
    Ok(())
}
