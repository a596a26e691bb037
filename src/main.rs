//! Wardboard
//!
//! Main entry point: serves the HTTP API or prints a census report.

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;

use wardboard::api::handlers::dashboard::build_dashboard;
use wardboard::config::{self, Config};
use wardboard::core::ai::Assistant;
use wardboard::core::census::CensusFilter;
use wardboard::core::period::PeriodQuery;
use wardboard::db::{Database, PatientQuery, PatientStore};
use wardboard::models::{AdmissionType, Unit};
use wardboard::{api, AppState};

#[derive(Parser)]
#[command(name = "wardboard", version, about = "Admissions and outcomes dashboard for NICU, PICU and SNCU wards")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API (the default)
    Serve,
    /// Print census statistics and charts for a period as JSON
    Census {
        #[arg(long)]
        institution: String,
        /// Named period such as `this_month` or `last_3_months`
        #[arg(long)]
        period: Option<String>,
        /// First day of a custom period (YYYY-MM-DD)
        #[arg(long)]
        start: Option<NaiveDate>,
        /// Last day of a custom period, inclusive
        #[arg(long)]
        end: Option<NaiveDate>,
        #[arg(long)]
        unit: Option<Unit>,
        #[arg(long)]
        admission_type: Option<AdmissionType>,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("WARDBOARD_LOG_JSON")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

#[actix_web::main]
async fn main() -> Result<()> {
    // load env variables, this is mainly useful for development
    let _ = dotenv::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let config = config::load_config().context("failed to load configuration")?;

    let database = Database::connect(&config.database)
        .await
        .context("could not initialize database connection")?;
    database
        .run_migrations()
        .await
        .context("failed to run database migrations")?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config, database).await,
        Command::Census {
            institution,
            period,
            start,
            end,
            unit,
            admission_type,
        } => {
            let period = PeriodQuery { period, start, end }.period()?;
            let patients = database
                .patient_store()
                .list(&institution, &PatientQuery::default())
                .await?;
            let filter = CensusFilter {
                unit,
                admission_type,
            };
            let dashboard =
                build_dashboard(&patients, period, &filter, config.ward.offset(), Utc::now())?;
            println!("{}", serde_json::to_string_pretty(&dashboard)?);
            Ok(())
        }
    }
}

async fn serve(config: Config, database: Database) -> Result<()> {
    let assistant = if config.ai.api_key.is_some() {
        Some(Arc::new(
            Assistant::from_config(&config.ai).context("invalid AI assistant configuration")?,
        ))
    } else {
        warn!("no AI API key configured; assistant routes are disabled");
        None
    };

    let bind = (config.server.host.clone(), config.server.port);
    let state = AppState {
        config: Arc::new(config),
        store: Arc::new(database.patient_store()),
        assistant,
    };
    let state = web::Data::new(state);

    info!(host = %bind.0, port = bind.1, "starting HTTP server");

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(TracingLogger::default())
            .wrap(Cors::permissive())
            .configure(api::configure)
    })
    .bind(bind)
    .context("failed to bind HTTP listener")?
    .run()
    .await
    .context("could not start HTTP server")
}
