//! dbctl
//!
//! Operator tool for the shared MongoDB connection: one-shot health checks,
//! index synchronization, and a liveness/readiness server.

use clap::{Parser, Subcommand};
use core_config::tracing::{init_tracing_with, install_color_eyre};
use database::{
    ConnectionSupervisor, HealthReporter, IndexSynchronizer, ShutdownCoordinator, ShutdownSignal,
};
use eyre::Result;
use tracing::info;

mod config;
mod models;
mod server;

use config::Config;

#[derive(Parser)]
#[command(name = "dbctl")]
#[command(about = "Manage the application's MongoDB connection")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect, print the health snapshot and disconnect
    Check,

    /// Synchronize the indexes declared by the application's collections
    SyncIndexes {
        /// Drop every index of each collection before recreating (destructive)
        #[arg(long)]
        drop_first: bool,
    },

    /// Serve /health and /ready until SIGINT or SIGTERM
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    install_color_eyre();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    init_tracing_with(&config.environment, &config.log_directives());

    let supervisor: ConnectionSupervisor = ConnectionSupervisor::default();
    let handle = supervisor.connect(&config.mongodb).await?;

    match cli.command {
        Commands::Check => {
            let health = HealthReporter::new(&supervisor).health();
            println!("{}", serde_json::to_string_pretty(&health)?);
            supervisor.disconnect().await?;
        }

        Commands::SyncIndexes { drop_first } => {
            info!(drop_first, "Synchronizing indexes");
            let result = IndexSynchronizer::new(&handle)
                .sync_indexes(&models::all(), drop_first)
                .await;

            // Close the connection whether or not the sync succeeded
            supervisor.disconnect().await?;

            for report in result? {
                println!(
                    "{}: dropped_all={} dropped={:?} created={:?}",
                    report.collection, report.dropped_all, report.dropped, report.created
                );
            }
        }

        Commands::Serve => {
            let coordinator = ShutdownCoordinator::new(&supervisor);
            coordinator.install(&[ShutdownSignal::Interrupt, ShutdownSignal::Terminate]);

            let router = server::health_router(HealthReporter::new(&supervisor));
            server::serve(router, &config.health, coordinator)
                .await
                .map_err(|e| eyre::eyre!("Server error: {}", e))?;
        }
    }

    Ok(())
}
