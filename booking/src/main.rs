//! Park Booking - command-line host.
//!
//! Run with: `cargo run --bin park-booking -- reserve request.json`

use clap::{Parser, Subcommand};
use park_booking::{AppError, Config, exit_code, read_request, render};
use park_reservations_core::coordinator::ReservationCoordinator;
use park_reservations_core::environment::SystemClock;
use park_reservations_core::error::ReservationError;
use park_reservations_core::store::CapacityStore;
use park_reservations_core::validator::parse_slot;
use park_reservations_postgres::PostgresCapacityStore;
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "park-booking", about = "Park activity reservations")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create tables and seed the size catalog
    Migrate,
    /// Create or reset a slot's capacity
    Provision {
        /// Activity name
        activity: String,
        /// Date (DD-MM-YYYY)
        date: String,
        /// Start time (HH:MM)
        time: String,
        /// Places available
        capacity: u32,
    },
    /// Book a request read from a JSON file, or stdin with `-`
    Reserve {
        /// Request file
        #[arg(default_value = "-")]
        request: String,
    },
    /// Remaining places for one slot, or every slot of the day
    Availability {
        /// Activity name
        activity: String,
        /// Date (DD-MM-YYYY)
        date: String,
        /// Start time (HH:MM); omit for the whole day
        time: Option<String>,
    },
    /// Registrations held against one slot
    Registrations {
        /// Activity name
        activity: String,
        /// Date (DD-MM-YYYY)
        date: String,
        /// Start time (HH:MM)
        time: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment variables from .env file (if present)
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(2);
        }
    };
    init_tracing(&config.log_level);

    let store = match connect(&config).await {
        Ok(store) => store,
        Err(e) => {
            error!(error = %e, "Failed to connect to PostgreSQL");
            return ExitCode::from(2);
        }
    };
    let coordinator = ReservationCoordinator::new(
        Arc::new(store.clone()),
        Arc::new(SystemClock),
        config.rules,
    );

    match cli.command {
        Commands::Migrate => {
            let result = store.migrate().await.map_err(AppError::from);
            if result.is_ok() {
                info!("Migrations complete");
            }
            emit(&result)
        }
        Commands::Provision {
            activity,
            date,
            time,
            capacity,
        } => {
            let result = provision(&store, &activity, &date, &time, capacity).await;
            emit(&result)
        }
        Commands::Reserve { request } => {
            let result = match read_request(&request).await {
                Ok(request) => coordinator.reserve(request).await.map_err(AppError::from),
                Err(e) => Err(e),
            };
            emit(&result)
        }
        Commands::Availability {
            activity,
            date,
            time: Some(time),
        } => {
            let result = coordinator
                .slot_availability(&activity, &date, &time)
                .await
                .map_err(AppError::from);
            emit(&result)
        }
        Commands::Availability {
            activity,
            date,
            time: None,
        } => {
            let result = coordinator
                .day_availability(&activity, &date)
                .await
                .map_err(AppError::from);
            emit(&result)
        }
        Commands::Registrations {
            activity,
            date,
            time,
        } => {
            let result = match parse_slot(&activity, &date, &time) {
                Ok(slot) => store.registrations(slot).await.map_err(AppError::from),
                Err(rejection) => Err(ReservationError::from(rejection).into()),
            };
            emit(&result)
        }
    }
}

async fn connect(config: &Config) -> Result<PostgresCapacityStore, sqlx::Error> {
    info!(
        "Connecting to PostgreSQL: {}",
        config.postgres.url.split('@').next_back().unwrap_or("unknown")
    );
    let pool = PgPoolOptions::new()
        .max_connections(config.postgres.max_connections)
        .min_connections(config.postgres.min_connections)
        .acquire_timeout(Duration::from_secs(config.postgres.connect_timeout))
        .idle_timeout(Some(Duration::from_secs(config.postgres.idle_timeout)))
        .connect(&config.postgres.url)
        .await?;
    Ok(PostgresCapacityStore::from_pool(pool)
        .with_lock_timeout(Duration::from_secs(config.postgres.lock_timeout)))
}

async fn provision(
    store: &PostgresCapacityStore,
    activity: &str,
    date: &str,
    time: &str,
    capacity: u32,
) -> Result<serde_json::Value, AppError> {
    let slot = parse_slot(activity, date, time)
        .map_err(ReservationError::from)?;
    let slot_id = store.provision_slot(&slot, capacity).await?;
    Ok(serde_json::json!({
        "slotId": slot_id,
        "slot": slot,
        "remainingCapacity": capacity,
    }))
}

fn emit<T: Serialize>(result: &Result<T, AppError>) -> ExitCode {
    match render(result) {
        Ok(json) => println!("{json}"),
        Err(e) => error!(error = %e, "Failed to render output"),
    }
    ExitCode::from(exit_code(result))
}

fn init_tracing(filter: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}
