//! HTTP server for the registry validation API.
//!
//! # API Endpoints
//!
//! | Method | Path                          | Description                          |
//! |--------|-------------------------------|--------------------------------------|
//! | GET    | `/`, `/health`                | Health check                         |
//! | GET    | `/processes`                  | List executable processes            |
//! | POST   | `/processes/{id}/execution`   | Execute a process with `inputs`      |
//! | POST   | `/api/validate`               | Validate an uploaded Extended CSV    |
//! | GET    | `/api/logs`                   | SSE stream of validation progress    |

use axum::{
    extract::{Multipart, Path, State},
    http::{header, Method, StatusCode},
    response::{sse::Event, Json, Sse},
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::{convert::Infallible, time::Duration};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use super::logs::{log_info, LOG_BROADCASTER};
use super::types::{
    error_response, process_list, HealthResponse, ProcessExecution, ValidateInputs, ValidateResponse,
    DISTINCT_PROCESS, METRICS_PROCESS, VALIDATE_PROCESS,
};
use crate::config::{parse_flag, Settings};
use crate::error::{QueryError, RunError, ServerError, ServerResult};
use crate::query::{distinct, metrics, DistinctRequest, MetricsRequest};
use crate::registry::RegistryClient;
use crate::validation::{ValidateOptions, Validator};

type ApiResult = Result<Json<Value>, (StatusCode, Json<Value>)>;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub validator: Validator,
}

impl AppState {
    pub fn new(registry: RegistryClient, settings: &Settings) -> Self {
        Self {
            validator: Validator::new(registry, settings.location.clone()),
        }
    }
}

/// Build the router with all routes and CORS.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/processes", get(list_processes))
        .route("/processes/{id}/execution", post(execute_process))
        .route("/api/validate", post(validate_upload))
        .route("/api/logs", get(sse_logs))
        .layer(cors)
        .with_state(state)
}

/// Connect to the registry and serve until the listener fails.
pub async fn start_server(settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let registry = RegistryClient::connect(&settings).await?;
    let app = router(AppState::new(registry, &settings));

    let addr = settings.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("WOUDC API listening on http://{}", addr);
    info!("Registry index prefix: {}", settings.index_prefix);

    axum::serve(listener, app).await?;
    Ok(())
}

/// Map a server error to a status code and error body.
fn reject(err: ServerError) -> (StatusCode, Json<Value>) {
    let status = match &err {
        ServerError::BadRequest(_) | ServerError::Query(QueryError::InvalidInput { .. }) => StatusCode::BAD_REQUEST,
        ServerError::UnknownProcess(_) => StatusCode::NOT_FOUND,
        ServerError::Run(RunError::Registry(_)) | ServerError::Run(RunError::Query(_)) | ServerError::Query(_) => {
            StatusCode::BAD_GATEWAY
        }
        ServerError::Run(_) | ServerError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!("{}", err);
    }
    (status, Json(error_response(&err.to_string())))
}

fn parse_inputs<T: DeserializeOwned>(inputs: Value) -> ServerResult<T> {
    serde_json::from_value(inputs).map_err(|e| ServerError::BadRequest(format!("Invalid inputs: {}", e)))
}

/// Health check endpoint
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: "woudc-api",
        version: env!("CARGO_PKG_VERSION"),
        index_prefix: state.validator.registry().index_prefix().to_string(),
    })
}

async fn list_processes() -> Json<Value> {
    Json(json!({ "processes": process_list() }))
}

/// Execute a named process
async fn execute_process(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ProcessExecution>,
) -> ApiResult {
    info!(process = %id, "executing process");
    let result = match id.as_str() {
        VALIDATE_PROCESS => run_validate(&state, body.inputs).await,
        DISTINCT_PROCESS => run_distinct(&state, body.inputs).await,
        METRICS_PROCESS => run_metrics(&state, body.inputs).await,
        _ => Err(ServerError::UnknownProcess(id.clone())),
    };
    result.map(Json).map_err(reject)
}

async fn run_validate(state: &AppState, inputs: Value) -> ServerResult<Value> {
    let inputs: ValidateInputs = parse_inputs(inputs)?;
    let options = ValidateOptions {
        check_metadata: inputs.check_metadata.unwrap_or(true),
        metadata_only: inputs.metadata_only.unwrap_or(false),
    };
    let outcome = state.validator.validate_text(&inputs.extcsv, options).await?;
    Ok(json!(ValidateResponse::from(outcome)))
}

async fn run_distinct(state: &AppState, inputs: Value) -> ServerResult<Value> {
    let request: DistinctRequest = parse_inputs(inputs)?;
    let response = distinct::execute(state.validator.registry(), &request).await?;
    Ok(json!(response))
}

async fn run_metrics(state: &AppState, inputs: Value) -> ServerResult<Value> {
    let request: MetricsRequest = parse_inputs(inputs)?;
    let response = metrics::execute(state.validator.registry(), &request).await?;
    Ok(json!(response))
}

/// SSE endpoint for real-time progress streaming
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(entry) => {
            let json = serde_json::to_string(&entry).ok()?;
            Some(Ok(Event::default().data(json)))
        }
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// Upload endpoint: a `file` part plus optional `checkMetadata` and
/// `metadataOnly` text parts.
async fn validate_upload(State(state): State<AppState>, mut multipart: Multipart) -> ApiResult {
    let mut file_data: Option<Vec<u8>> = None;
    let mut file_name: Option<String> = None;
    let mut options = ValidateOptions::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| reject(ServerError::BadRequest(format!("Multipart error: {}", e))))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                file_name = field.file_name().map(|s| s.to_string());
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| reject(ServerError::BadRequest(format!("Read error: {}", e))))?;
                file_data = Some(bytes.to_vec());
            }
            "checkMetadata" | "metadataOnly" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| reject(ServerError::BadRequest(format!("Read error: {}", e))))?;
                let flag = parse_flag(&text);
                if name == "checkMetadata" {
                    options.check_metadata = flag;
                } else {
                    options.metadata_only = flag;
                }
            }
            _ => {}
        }
    }

    let bytes = file_data.ok_or_else(|| reject(ServerError::BadRequest("No file provided".into())))?;
    log_info(format!(
        "Validating upload {} ({} bytes)",
        file_name.as_deref().unwrap_or("unknown"),
        bytes.len()
    ));

    let outcome = state
        .validator
        .validate_bytes(&bytes, options)
        .await
        .map_err(|e| reject(e.into()))?;
    Ok(Json(json!(ValidateResponse::from(outcome))))
}
