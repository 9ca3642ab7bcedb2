//! Routes and shared state

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::{
    Json, Router,
    extract::{Path, RawQuery, State},
    http::{HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use dashmap::DashMap;
use deeplink_protocol::{AttemptId, ProtocolError, RedirectParams};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::json;
use session_store::KeyValueStore;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use wallet_handshake::{HandshakeClient, HandshakeError, HandshakeResult, HandshakeStatus, LinkOpener};

pub type Client = HandshakeClient<Arc<dyn KeyValueStore>, Arc<dyn LinkOpener>>;

/// Outcomes kept for polling; the oldest is evicted beyond this
pub const MAX_RECORDED_ATTEMPTS: usize = 64;

/// Result of a redirect, kept for status polling
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Connected { wallet_address: String },
    Signed { signature: String },
    MessageSigned { signature: String, public_key: String },
    Disconnected,
    Failed { error: String },
}

/// Application state
#[derive(Clone)]
pub struct AppState {
    client: Arc<Mutex<Client>>,
    /// Attempt id -> (sequence, latest outcome)
    outcomes: Arc<DashMap<AttemptId, (u64, AttemptOutcome)>>,
    sequence: Arc<AtomicU64>,
}

impl AppState {
    pub fn new(client: Client) -> Self {
        Self {
            client: Arc::new(Mutex::new(client)),
            outcomes: Arc::new(DashMap::new()),
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Keep the outcome of a redirect for the attempt the client issued
    ///
    /// Redirects for any other attempt, and redirects the client turned away
    /// without touching its attempt, leave the recorded outcomes unchanged.
    fn record(
        &self,
        params: &RedirectParams,
        issued: Option<AttemptId>,
        result: HandshakeResult<AttemptOutcome>,
    ) -> Result<Json<AttemptOutcome>, ApiError> {
        let attempt = params.attempt_id().filter(|id| Some(*id) == issued);

        match (attempt, &result) {
            (Some(attempt), Ok(outcome)) => self.remember(attempt, outcome.clone()),
            (Some(attempt), Err(e)) if !e.is_ignored_redirect() => {
                self.remember(attempt, AttemptOutcome::Failed { error: e.to_string() })
            }
            _ => debug!(attempt = ?params.attempt, "Redirect outcome not recorded"),
        }

        result.map(Json).map_err(ApiError)
    }

    fn remember(&self, attempt: AttemptId, outcome: AttemptOutcome) {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        self.outcomes.insert(attempt, (seq, outcome));

        while self.outcomes.len() > MAX_RECORDED_ATTEMPTS {
            let oldest = self
                .outcomes
                .iter()
                .min_by_key(|entry| entry.value().0)
                .map(|entry| *entry.key());
            match oldest {
                Some(oldest) => {
                    self.outcomes.remove(&oldest);
                }
                None => break,
            }
        }
    }

    fn outcome(&self, attempt: &AttemptId) -> Option<AttemptOutcome> {
        self.outcomes.get(attempt).map(|entry| entry.value().1.clone())
    }
}

pub fn router(state: AppState) -> Router {
    let app_origin = state.client.lock().config().app_url.origin().ascii_serialization();
    let cors = match HeaderValue::from_str(&app_origin) {
        Ok(origin) => CorsLayer::new()
            .allow_origin(AllowOrigin::list([origin]))
            .allow_methods([Method::GET, Method::POST]),
        Err(_) => {
            warn!(origin = %app_origin, "App origin is not a valid header; cross-origin requests disabled");
            CorsLayer::new()
        }
    };

    Router::new()
        .route("/health", get(health_handler))
        .route("/session", get(session_handler))
        .route("/connect", post(connect_handler))
        .route("/disconnect", post(disconnect_handler))
        .route("/attempts/{attempt}", get(attempt_handler))
        .route("/phantom/connected", get(connected_handler))
        .route("/phantom/signed", get(signed_handler))
        .route("/phantom/message-signed", get(message_signed_handler))
        .route("/phantom/disconnected", get(disconnected_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Handshake error mapped onto an HTTP status
pub struct ApiError(HandshakeError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            HandshakeError::WalletRejected { .. } => StatusCode::FORBIDDEN,
            HandshakeError::StaleAttempt { .. }
            | HandshakeError::NoResponse
            | HandshakeError::NoPendingAttempt
            | HandshakeError::NotConnected
            | HandshakeError::Protocol(ProtocolError::InvalidStateTransition { .. }) => {
                StatusCode::CONFLICT
            }
            HandshakeError::Crypto(_) | HandshakeError::Protocol(_) => StatusCode::BAD_REQUEST,
            HandshakeError::Store(_) | HandshakeError::Config(_) | HandshakeError::Open(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        if status.is_server_error() {
            warn!("Request failed: {}", self.0);
        }

        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

impl From<HandshakeError> for ApiError {
    fn from(e: HandshakeError) -> Self {
        Self(e)
    }
}

fn redirect_params(query: Option<String>) -> RedirectParams {
    RedirectParams::from_query(query.as_deref().unwrap_or_default())
}

/// Health check endpoint
async fn health_handler() -> &'static str {
    "OK"
}

async fn session_handler(State(state): State<AppState>) -> Result<Json<HandshakeStatus>, ApiError> {
    let status = state.client.lock().status()?;
    Ok(Json(status))
}

/// Start a connect attempt for a front-end that cannot run the CLI
async fn connect_handler(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let url = state.client.lock().connect()?;
    info!("Connect link issued");
    Ok(Json(json!({ "url": url.as_str() })))
}

async fn disconnect_handler(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let url = state.client.lock().disconnect()?;
    Ok(Json(json!({ "url": url.map(|url| url.to_string()) })))
}

async fn attempt_handler(
    State(state): State<AppState>,
    Path(attempt): Path<String>,
) -> Result<Json<AttemptOutcome>, StatusCode> {
    AttemptId::parse(&attempt)
        .and_then(|attempt| state.outcome(&attempt))
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn connected_handler(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
) -> Result<Json<AttemptOutcome>, ApiError> {
    let params = redirect_params(query);
    let (issued, result) = {
        let mut client = state.client.lock();
        let issued = client.current_attempt().ok().flatten();
        (issued, client.complete_connect(&params))
    };
    let result = result.map(|session| AttemptOutcome::Connected {
        wallet_address: session.wallet_address,
    });
    state.record(&params, issued, result)
}

async fn signed_handler(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
) -> Result<Json<AttemptOutcome>, ApiError> {
    let params = redirect_params(query);
    let (issued, result) = {
        let mut client = state.client.lock();
        let issued = client.current_attempt().ok().flatten();
        (issued, client.complete_sign_and_send(&params))
    };
    let result = result.map(|response| AttemptOutcome::Signed {
        signature: response.signature,
    });
    state.record(&params, issued, result)
}

async fn message_signed_handler(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
) -> Result<Json<AttemptOutcome>, ApiError> {
    let params = redirect_params(query);
    let (issued, result) = {
        let mut client = state.client.lock();
        let issued = client.current_attempt().ok().flatten();
        (issued, client.complete_sign_message(&params))
    };
    let result = result.map(|response| AttemptOutcome::MessageSigned {
        signature: response.signature,
        public_key: response.public_key,
    });
    state.record(&params, issued, result)
}

async fn disconnected_handler(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
) -> Result<Json<AttemptOutcome>, ApiError> {
    let params = redirect_params(query);
    let (issued, result) = {
        let mut client = state.client.lock();
        let issued = client.disconnect_attempt();
        (issued, client.complete_disconnect(&params))
    };
    let result = result.map(|()| AttemptOutcome::Disconnected);
    state.record(&params, issued, result)
}
