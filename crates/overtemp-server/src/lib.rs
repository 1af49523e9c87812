//! HTTP telemetry ingestion server.
//!
//! Accepts raw device readings, answers whether each one is an
//! overtemperature event, and keeps a log of readings that failed to parse.
//! Every route except the index is throttled by its own sliding-window
//! limiter, so exhausting one quota never starves another.

use std::sync::Arc;

use axum::{
    Router,
    extract::{Request, State, rejection::JsonRejection},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::{MethodRouter, delete, get, post},
};
use log::{debug, error, info};
use serde::{Deserialize, Serialize};

use overtemp_core::{
    ConfigError, ErrorSink, Ingestor, LimitsConfig, ServiceConfig, SlidingWindowLimiter,
    StoreError,
};

/// Body returned with `429 Too Many Requests`.
pub const RATE_LIMIT_MESSAGE: &str = "Rate limit exceeded. Try again later.";

/// One limiter per protected operation.
#[derive(Debug, Clone)]
pub struct Limiters {
    pub ingest: Arc<SlidingWindowLimiter>,
    pub list_errors: Arc<SlidingWindowLimiter>,
    pub clear_errors: Arc<SlidingWindowLimiter>,
}

impl Limiters {
    pub fn from_config(limits: &LimitsConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            ingest: Arc::new(limits.ingest.build("ingest")?),
            list_errors: Arc::new(limits.list_errors.build("list_errors")?),
            clear_errors: Arc::new(limits.clear_errors.build("clear_errors")?),
        })
    }
}

/// Shared server state.
pub struct AppState {
    ingestor: Ingestor,
    limiters: Limiters,
}

impl AppState {
    pub fn new(ingestor: Ingestor, limiters: Limiters) -> Self {
        Self { ingestor, limiters }
    }

    /// Wire up policy, store and limiters from a validated config.
    pub fn from_config(config: &ServiceConfig) -> Result<Self, StartupError> {
        config.validate()?;
        let store = config.store.open()?;
        let ingestor = Ingestor::new(config.policy.build(), store);
        let limiters = Limiters::from_config(&config.limits)?;
        Ok(Self::new(ingestor, limiters))
    }

    fn sink(&self) -> &Arc<dyn ErrorSink> {
        self.ingestor.sink()
    }
}

/// Failure while starting the server.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to open error store: {0}")]
    Store(#[from] StoreError),

    #[error("failed to serve: {0}")]
    Bind(#[source] std::io::Error),
}

#[derive(Deserialize)]
struct TemperatureRequest {
    data: String,
}

#[derive(Serialize)]
struct ErrorsResponse {
    errors: Vec<String>,
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
}

#[derive(Serialize)]
struct MessageBody {
    message: &'static str,
}

fn bad_request() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody {
            error: "bad request",
        }),
    )
        .into_response()
}

fn internal_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody {
            error: "internal error",
        }),
    )
        .into_response()
}

async fn handle_index() -> &'static str {
    "Hello, World!"
}

async fn handle_temperature(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<TemperatureRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            debug!("unreadable /temp body: {rejection}");
            return bad_request();
        }
    };

    let result =
        tokio::task::spawn_blocking(move || state.ingestor.ingest(&request.data)).await;
    match result {
        Ok(Ok(outcome)) => Json(outcome).into_response(),
        Ok(Err(_)) => bad_request(),
        Err(err) => {
            error!("ingest task failed: {err}");
            internal_error()
        }
    }
}

async fn handle_list_errors(State(state): State<Arc<AppState>>) -> Response {
    match with_store(state, |sink| sink.list()).await {
        Some(errors) => Json(ErrorsResponse { errors }).into_response(),
        None => internal_error(),
    }
}

async fn handle_clear_errors(State(state): State<Arc<AppState>>) -> Response {
    match with_store(state, |sink| sink.clear_all()).await {
        Some(()) => StatusCode::NO_CONTENT.into_response(),
        None => internal_error(),
    }
}

/// Run a store operation off the async workers. `None` means it failed and
/// the failure has been logged.
async fn with_store<T, F>(state: Arc<AppState>, op: F) -> Option<T>
where
    T: Send + 'static,
    F: FnOnce(&dyn ErrorSink) -> Result<T, StoreError> + Send + 'static,
{
    match tokio::task::spawn_blocking(move || op(state.sink().as_ref())).await {
        Ok(Ok(value)) => Some(value),
        Ok(Err(err)) => {
            error!("error store: {err}");
            None
        }
        Err(err) => {
            error!("error store task failed: {err}");
            None
        }
    }
}

/// Admit-then-invoke middleware: forwards the request only if `limiter`
/// has quota left, otherwise answers `429` without touching the handler.
async fn throttle(
    State(limiter): State<Arc<SlidingWindowLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    if limiter.admit() {
        return next.run(request).await;
    }
    debug!(
        "throttled {} {} ({} per {:?})",
        request.method(),
        request.uri().path(),
        limiter.limit(),
        limiter.window()
    );
    (
        StatusCode::TOO_MANY_REQUESTS,
        Json(MessageBody {
            message: RATE_LIMIT_MESSAGE,
        }),
    )
        .into_response()
}

/// Guard one method route with a limiter.
fn throttled(
    route: MethodRouter<Arc<AppState>>,
    limiter: &Arc<SlidingWindowLimiter>,
) -> MethodRouter<Arc<AppState>> {
    route.route_layer(middleware::from_fn_with_state(Arc::clone(limiter), throttle))
}

/// Build the axum router.
pub fn build_router(state: AppState) -> Router {
    let limiters = state.limiters.clone();
    let state = Arc::new(state);

    Router::new()
        .route("/", get(handle_index))
        .route(
            "/temp",
            throttled(post(handle_temperature), &limiters.ingest),
        )
        .route(
            "/errors",
            throttled(get(handle_list_errors), &limiters.list_errors)
                .merge(throttled(delete(handle_clear_errors), &limiters.clear_errors)),
        )
        .with_state(state)
}

/// Run the HTTP ingestion server until the listener fails.
pub async fn run_server(state: AppState, host: &str, port: u16) -> Result<(), StartupError> {
    let app = build_router(state);
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(StartupError::Bind)?;
    info!("listening on {addr}");
    axum::serve(listener, app).await.map_err(StartupError::Bind)
}
