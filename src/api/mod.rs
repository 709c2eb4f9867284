use axum::{
    Router,
    extract::{Json, rejection::JsonRejection},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::net::TcpListener;

use crate::core::{ConfigError, ConfigResult, ProjectionOutcome, Scenario, run_projection};

#[derive(Parser, Debug)]
#[command(
    name = "fireplan",
    about = "Household finance projection with Irish income, pension and investment taxes"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    #[command(about = "Run a scenario file and print the outcome as JSON")]
    Run {
        #[arg(long)]
        scenario: PathBuf,
        #[arg(long, help = "Override monteCarloTrials from the scenario")]
        trials: Option<u32>,
        #[arg(long, help = "Override the scenario seed")]
        seed: Option<u64>,
        #[arg(long, default_value_t = false)]
        pretty: bool,
    },
    #[command(about = "Serve POST /simulate over HTTP")]
    Serve {
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
}

#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to encode outcome: {0}")]
    Output(#[source] serde_json::Error),

    #[error("projection task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("server error: {0}")]
    Server(#[source] std::io::Error),
}

pub async fn run_cli(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Command::Run {
            scenario,
            trials,
            seed,
            pretty,
        } => {
            let mut scenario = load_scenario(&scenario)?;
            apply_overrides(&mut scenario, trials, seed);
            let outcome = tokio::task::spawn_blocking(move || run_projection(&scenario)).await??;
            let json = if pretty {
                serde_json::to_string_pretty(&outcome)
            } else {
                serde_json::to_string(&outcome)
            }
            .map_err(CliError::Output)?;
            println!("{json}");
            Ok(())
        }
        Command::Serve { port } => run_http_server(port).await.map_err(CliError::Server),
    }
}

pub fn load_scenario(path: &Path) -> ConfigResult<Scenario> {
    let raw = fs::read_to_string(path)?;
    let scenario = serde_json::from_str(&raw)?;
    log::debug!("loaded scenario from {}", path.display());
    Ok(scenario)
}

fn apply_overrides(scenario: &mut Scenario, trials: Option<u32>, seed: Option<u64>) {
    if let Some(trials) = trials {
        scenario.parameters.monte_carlo_trials = trials;
    }
    if let Some(seed) = seed {
        scenario.parameters.seed = seed;
    }
}

pub fn router() -> Router {
    Router::new()
        .route("/simulate", post(simulate_handler))
        .route("/health", get(health_handler))
        .fallback(not_found_handler)
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    log::info!("projection API listening on http://{addr}");

    axum::serve(listener, router()).await
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health_handler() -> Response {
    json_response(StatusCode::OK, HealthResponse { status: "ok" })
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn simulate_handler(payload: Result<Json<Scenario>, JsonRejection>) -> Response {
    let scenario = match payload {
        Ok(Json(scenario)) => scenario,
        Err(rejection) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                &format!("Invalid scenario JSON: {}", rejection.body_text()),
            );
        }
    };

    match tokio::task::spawn_blocking(move || run_projection(&scenario)).await {
        Ok(Ok(outcome)) => outcome_response(outcome),
        Ok(Err(err)) => error_response(StatusCode::BAD_REQUEST, &err.to_string()),
        Err(err) => {
            log::error!("projection task failed: {err}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Projection failed")
        }
    }
}

fn outcome_response(outcome: ProjectionOutcome) -> Response {
    json_response(StatusCode::OK, outcome)
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}
