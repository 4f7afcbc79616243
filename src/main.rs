use anyhow::{Context as _, Result};
use clap::Parser;
use jig::{
    backend::create_backend_client,
    cli::{Cli, Context, execute},
    config,
    store::PairingStore,
};
use std::sync::Arc;
use tracing::{debug, error};

/// Validates that a log level string is valid
fn validate_log_level(level: &str) -> Result<()> {
    level
        .parse::<tracing_subscriber::filter::LevelFilter>()
        .map_err(|_| {
            anyhow::anyhow!(
                "Invalid log level: '{}'. Valid levels: error, warn, info, debug, trace",
                level
            )
        })?;
    Ok(())
}

fn init_logging(level: &str, json: bool) -> Result<()> {
    validate_log_level(level)?;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to build log filter")?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = config::load(cli.config.as_deref())
        .await
        .context("Failed to load configuration")?;
    cli.apply_overrides(&mut config);

    init_logging(&config.logs.level, config.logs.json)?;
    debug!("Effective configuration: {:?}", config);

    let store = Arc::new(
        PairingStore::open(
            config.store.pairings_dir.clone(),
            config.store.lock_timeout(),
        )
        .await?,
    );
    let backend = create_backend_client(&config.backend)?;

    let ctx = Context::new(config, store, backend);
    let mut stdout = std::io::stdout().lock();
    execute(&ctx, cli.command, &mut stdout).await?;
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
