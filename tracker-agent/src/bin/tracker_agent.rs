//! Tracker agent - imports newly appended game server log lines into SQLite.

use anyhow::Result;
use tracker_agent::config::Config;
use tracker_agent::runner;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = Config::load_from_env()?;
    runner::run(&config).await?;
    Ok(())
}

fn init_tracing() {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_target(false)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}
