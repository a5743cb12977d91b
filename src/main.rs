use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use log::{error, info, warn};
use tokio::sync::watch;

use dwbench::conf::Config;
use dwbench::core::{CliArgs, setup_logging};
use dwbench::executor::{ExecutorFactory, WarehouseExecutorFactory};
use dwbench::runner::{BenchmarkRunner, preflight};
use dwbench::sink::ResultSink;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    setup_logging();
    let args = CliArgs::parse();
    info!(args = args; "dwbench started");

    let config = Config::load(Path::new(&args.config))
        .with_context(|| format!("loading config {}", args.config))?;
    let factory: Arc<dyn ExecutorFactory> = Arc::new(WarehouseExecutorFactory::from_config(&config));

    if !args.skip_check {
        preflight(&config, factory.as_ref())
            .await
            .context("warehouse check failed")?;
        info!("all enabled warehouses answered");
        if args.check_only {
            return Ok(());
        }
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let runner = BenchmarkRunner::from_config(config, factory, shutdown_rx)?;
    spawn_signal_handler(shutdown_tx, Arc::clone(runner.sink()));

    let report = runner.run().await.context("benchmark failed")?;
    for (name, reason) in &report.failed {
        warn!("{name} did not run: {reason}");
    }
    if let Some(path) = &report.artifact {
        info!("results saved to {}", path.display());
    }
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res,
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

/// First signal lets in-flight queries finish; a second one closes the
/// result file and exits right away.
fn spawn_signal_handler(shutdown: watch::Sender<bool>, sink: Arc<dyn ResultSink>) {
    tokio::spawn(async move {
        if let Err(e) = wait_for_signal().await {
            error!("cannot listen for signals: {e}");
            return;
        }
        warn!("interrupted, finishing running queries (interrupt again to abort)");
        let _ = shutdown.send(true);

        if wait_for_signal().await.is_ok() {
            warn!("aborting");
            if let Err(e) = sink.close() {
                error!("closing results: {e}");
            }
            std::process::exit(130);
        }
    });
}
