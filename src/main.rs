//! dbmap - Main entry point.
//!
//! Runs one stored procedure or parameterized statement against a configured
//! database service and prints the result as JSON.

use clap::Parser;
use dbmap::config::{CliCommand, Config, parse_param};
use dbmap::db::{DbService, SharedService, SqlxDriver};
use dbmap::error::DbResult;
use dbmap::models::{DatabaseType, Value};
use serde_json::json;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

fn parse_params(raw: &[String]) -> DbResult<Vec<(String, Value)>> {
    raw.iter().map(|p| parse_param(p)).collect()
}

async fn run(config: &Config, service: SharedService<SqlxDriver>) -> DbResult<serde_json::Value> {
    let output = match config.command.clone() {
        CliCommand::Query { sql, params, multi } => {
            let params = parse_params(&params)?;
            service
                .run(move |db| {
                    db.set_query(sql);
                    for (name, value) in params {
                        db.add_parameter(name, value)?;
                    }
                    if multi {
                        Ok(json!(db.multi_select_list()?))
                    } else {
                        Ok(json!(db.select_list()?))
                    }
                })
                .await?
        }
        CliCommand::Call {
            procedure,
            params,
            multi,
        } => {
            let params = parse_params(&params)?;
            service
                .run(move |db| {
                    db.set_stored_procedure(procedure)?;
                    for (name, value) in params {
                        db.add_parameter(name, value)?;
                    }
                    if multi {
                        Ok(json!(db.multi_select_list()?))
                    } else {
                        Ok(json!(db.select_list()?))
                    }
                })
                .await?
        }
        CliCommand::Exec { sql, params } => {
            let params = parse_params(&params)?;
            let rows_affected = service
                .run(move |db| {
                    db.set_query(sql);
                    for (name, value) in params {
                        db.add_parameter(name, value)?;
                    }
                    db.execute()
                })
                .await?;
            json!({ "rows_affected": rows_affected })
        }
    };
    Ok(output)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse configuration from command line and environment
    let config = Config::parse();

    // Initialize logging
    init_tracing(&config);

    let key = config.service_key();
    info!(
        namespace = %key.namespace,
        backend = %key.backend,
        service = %key.service,
        "Starting dbmap v{}",
        env!("CARGO_PKG_VERSION")
    );

    let settings = config.load_settings()?;
    let service = DbService::for_service(&settings, &key)?;

    let driver_type = service.connections().driver().db_type();
    if DatabaseType::from_name(&key.backend).is_some_and(|t| t != driver_type) {
        warn!(
            backend = %key.backend,
            connection = %driver_type,
            "Configured backend differs from the connection string scheme"
        );
    }

    match run(&config, SharedService::new(service)).await {
        Ok(output) => {
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Command failed");
            Err(e.into())
        }
    }
}
