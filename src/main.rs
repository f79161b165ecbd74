use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use clinic_dashboard::{batch, jobs, router, AppState, Config};
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// Clinic marketing dashboard: API server and table maintenance.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API (default)
    Serve,
    /// Rebuild the weekly and monthly cafe stats for the configured hospital
    AggregateCafeStats,
    /// Rebuild Blog Chart Data from Blog Weekly Metrics
    RefreshChartData,
    /// Delete every row of a table
    ClearTable {
        /// Table name, e.g. "Cafe Hospital Weekly Stats"
        table: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().context("invalid configuration")?;
    let store = clinic_dashboard::connect(&config)
        .await
        .context("failed to open record store")?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let app = router(AppState::new(store));
            let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

            info!("listening on http://{addr}");
            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }
        Command::AggregateCafeStats => {
            let summary = jobs::aggregate_cafe_stats(store.as_ref()).await?;
            info!(
                weekly = summary.weekly_rows,
                monthly = summary.monthly_rows,
                "cafe stats aggregation finished"
            );
        }
        Command::RefreshChartData => {
            let written = jobs::refresh_chart_data(store.as_ref()).await?;
            info!(written, "chart data refresh finished");
        }
        Command::ClearTable { table } => {
            let removed = batch::clear_table(store.as_ref(), &table).await?;
            info!(table = %table, removed, "table cleared");
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutting down");
    }
}
