use std::sync::Arc;

use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

use sitewatch::checks::CheckRegistry;
use sitewatch::config::AppConfig;
use sitewatch::db::PgStore;
use sitewatch::events::EventBus;
use sitewatch::executor::CheckExecutor;
use sitewatch::notifications::{ChannelRegistry, NotificationEngine};
use sitewatch::scheduler::CheckScheduler;

#[derive(Parser)]
#[command(name = "sitewatch", about = "Site health monitoring pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler until interrupted (default).
    Serve,
    /// Execute a single check once and exit.
    RunOnce {
        #[arg(long)]
        check_id: i32,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await?;

    let store = Arc::new(PgStore::new(pool));
    let check_registry = Arc::new(CheckRegistry::builtin()?);
    let channel_registry = Arc::new(ChannelRegistry::builtin()?);
    let events = Arc::new(EventBus::new());
    let engine = Arc::new(NotificationEngine::new(store.clone(), channel_registry));
    let executor = Arc::new(CheckExecutor::new(
        store.clone(),
        check_registry,
        events,
        engine,
    ));
    let scheduler = CheckScheduler::new(executor);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            scheduler.resync(store.as_ref()).await?;
            tracing::info!("sitewatch scheduler running, press ctrl-c to stop");
            tokio::signal::ctrl_c().await?;
            scheduler.shutdown();
        }
        Command::RunOnce { check_id } => {
            scheduler.run_once(check_id).await;
        }
    }

    Ok(())
}
