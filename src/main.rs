use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use termfleet::cli::{self, ApiClient, Cli, Commands};
use termfleet::config::AppConfig;
use termfleet::error::Result;
use termfleet::server;
use termfleet::shutdown::shutdown_signal;
use termfleet::supervisor::{Fleet, WorkerCommand};
use termfleet::worker;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };

    match cli.command {
        Commands::Run => {
            init_logging(&config);
            run_supervisor(config).await?;
        }
        Commands::Worker(args) => {
            init_logging(&config);
            worker::run(args).await?;
        }
        Commands::Status { json } => {
            init_logging_simple();
            cli::show_status(&ApiClient::new(&cli.api), json).await?;
        }
        Commands::Positions { json } => {
            init_logging_simple();
            cli::show_positions(&ApiClient::new(&cli.api), json).await?;
        }
        Commands::Deals { login, limit, json } => {
            init_logging_simple();
            cli::show_deals(&ApiClient::new(&cli.api), login, limit, json).await?;
        }
        Commands::Totals => {
            init_logging_simple();
            cli::show_totals(&ApiClient::new(&cli.api)).await?;
        }
        Commands::Start { login } => {
            init_logging_simple();
            ApiClient::new(&cli.api).start(login).await?;
            println!("Started worker for login {login}");
        }
        Commands::Stop { login } => {
            init_logging_simple();
            ApiClient::new(&cli.api).stop(login).await?;
            println!("Stopped worker for login {login}");
        }
        Commands::StartAll => {
            init_logging_simple();
            let result = ApiClient::new(&cli.api).start_all().await?;
            println!("{result}");
        }
        Commands::StopAll => {
            init_logging_simple();
            let result = ApiClient::new(&cli.api).stop_all().await?;
            println!("{result}");
        }
        Commands::Reload => {
            init_logging_simple();
            let outcome = ApiClient::new(&cli.api).reload().await?;
            cli::show_reload(&outcome);
        }
    }

    Ok(())
}

/// Supervisor main loop: reconcile, serve the control API, poll on a timer
async fn run_supervisor(config: AppConfig) -> Result<()> {
    let fleet = Arc::new(Fleet::new(
        config.supervisor.clone(),
        WorkerCommand::current_exe()?,
    ));

    match fleet.reload().await {
        Ok(outcome) => info!(
            "Account list loaded: {} created, {} removed",
            outcome.created.len(),
            outcome.removed.len()
        ),
        // Not fatal: the fleet starts empty and a fixed file can be reloaded
        // through the API at any time.
        Err(e) => warn!("Initial account load failed: {e}"),
    }

    let server_fleet = fleet.clone();
    let port = config.server.port;
    let api = tokio::spawn(async move { server::serve(server_fleet, port).await });

    let mut tick = tokio::time::interval(Duration::from_secs(
        config.supervisor.tick_interval_secs.max(1),
    ));

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = tick.tick() => fleet.poll_tick().await,
        }
    }

    info!("Shutdown requested, stopping fleet");
    fleet.shutdown().await;
    api.abort();

    Ok(())
}

fn init_logging(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.filter.clone()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

fn init_logging_simple() {
    // Minimal logging for CLI client commands
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();
}
