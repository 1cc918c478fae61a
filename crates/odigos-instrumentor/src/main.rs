use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use odigos_envoverwrite::Registry;
use odigos_instrumentor::MigrationRunnable;
use odigos_instrumentor::migration::KubeClusterClient;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    #[arg(long, default_value("info"))]
    /// Log level used when RUST_LOG is not set
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let Cli { log_level } = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .try_init()?;

    let client = kube::Client::try_default()
        .await
        .context("failed to create kubernetes client")?;

    // stored values may carry any variant's fragment, whatever the current tier
    let registry = Arc::new(Registry::builtin());
    let runnable = MigrationRunnable::new(KubeClusterClient::new(client), registry);

    log::info!("starting env migration");
    let report = runnable.start().await?;
    for failure in &report.failures {
        log::warn!("env migration failure: {failure}");
    }

    Ok(())
}
