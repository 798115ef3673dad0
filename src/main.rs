use signup_migrator::api::{router, AppState};
use signup_migrator::config::Config;
use signup_migrator::migration::{Direction, MigrationRunner, MigrationStatus};
use signup_migrator::pool;

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::signal;
use tracing::{debug, info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "signup-migrator",
    version,
    about = "Apply and revert the performer signup schema migrations",
    after_help = "Examples:\n  \
    signup-migrator plan\n  \
    signup-migrator up\n  \
    signup-migrator down --steps 1\n  \
    signup-migrator status --json"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply all pending migrations
    Up,
    /// Revert the most recently applied migrations
    Down {
        #[arg(long, default_value_t = 1)]
        steps: usize,
    },
    /// List migrations and whether they are applied
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Print the DDL a direction would run, without connecting
    Plan {
        #[arg(long)]
        down: bool,
    },
    /// Serve the HTTP admin endpoints
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load environment from .env file if present
    let dotenv_result = dotenvy::dotenv();

    let config = Config::from_env()?;

    // Create log directory if it doesn't exist
    std::fs::create_dir_all(&config.log_dir).unwrap_or_else(|e| {
        eprintln!(
            "Warning: Could not create log directory {}: {}",
            config.log_dir.display(),
            e
        );
    });

    // Create file appender with daily rotation
    let file_appender = RollingFileAppender::new(Rotation::DAILY, &config.log_dir, "signup-migrator.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    // Initialize logging - both stderr and file, so `plan`/`status` output on stdout stays clean
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,signup_migrator=debug")),
        )
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(false)
                .json()
                .with_writer(non_blocking),
        )
        .init();

    debug!("Logging initialized - log directory: {}", config.log_dir.display());

    if let Err(e) = dotenv_result {
        debug!("No .env file found or error loading it: {}", e);
    }

    let runner = MigrationRunner::from_config(&config)?;

    match cli.command {
        Command::Plan { down } => {
            let direction = if down { Direction::Down } else { Direction::Up };
            for planned in runner.plan(direction).await? {
                println!("-- {} ({})", planned.name, planned.direction);
                for statement in &planned.statements {
                    println!("{};", statement);
                }
                println!();
            }
        }
        Command::Up => {
            let pool = pool::connect(&config).await?;
            let applied = runner.apply_pending(&pool).await?;
            if applied.is_empty() {
                info!("Database {} is up to date", runner.database());
            } else {
                info!("Applied {} migrations to {}", applied.len(), runner.database());
            }
        }
        Command::Down { steps } => {
            let pool = pool::connect(&config).await?;
            let reverted = runner.rollback(&pool, steps).await?;
            info!("Reverted {} migrations in {}", reverted.len(), runner.database());
        }
        Command::Status { json } => {
            let pool = pool::connect(&config).await?;
            let statuses = runner.status(&pool).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&statuses)?);
            } else {
                print_status(&statuses);
            }
        }
        Command::Serve => serve(config, runner).await?,
    }

    Ok(())
}

fn print_status(statuses: &[MigrationStatus]) {
    for status in statuses {
        let state = match (status.applied, status.registered) {
            (true, true) => "applied",
            (true, false) => "applied (unregistered)",
            (false, _) => "pending",
        };
        let drift = if status.checksum_matches == Some(false) {
            " [checksum mismatch]"
        } else {
            ""
        };
        let when = status
            .applied_at
            .map(|t| format!(" at {}", t.to_rfc3339()))
            .unwrap_or_default();
        println!("{:<60} {}{}{}", status.name, state, when, drift);
    }
}

async fn serve(config: Config, runner: MigrationRunner) -> anyhow::Result<()> {
    let socket_addr = config.socket_addr()?;
    let pool = pool::connect(&config).await?;

    if config.admin_token.is_none() {
        warn!("ADMIN_TOKEN not set; /migrations/up and /migrations/down are disabled");
    }

    let state = Arc::new(AppState {
        pool,
        runner,
        admin_token: config.admin_token.clone(),
        start_time: Instant::now(),
    });

    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&socket_addr).await?;
    info!("Server listening on {}", socket_addr);

    // Run server with graceful shutdown
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received shutdown signal");
}
