use anyhow::Context;
use seatlock_store::app_config::Config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "seatlock=info,seatlock_cli=info,seatlock_core=info,seatlock_store=info,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!(
        trip_id = config.allocation.trip_id,
        strategy = %config.allocation.lock_strategy,
        "Starting seat allocation run"
    );

    let summary = seatlock_cli::run(&config).await?;
    print!("{}", seatlock_cli::report::render(&summary));
    Ok(())
}
