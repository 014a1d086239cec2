use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use provider_bonding::{
    BondOrchestrator, BondPhase, BondingError, IdentityResolver, ProviderIdentity,
};
use provider_chain::{normalize, with_timeout, ChainClient, ChainError, TransactionOutcome};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::payload::{Payload, RequestDefaults};
use crate::sentinel::{SentinelClient, SentinelDocument};

#[derive(Clone)]
pub struct AppState {
    pub chain: Arc<dyn ChainClient>,
    pub orchestrator: Arc<BondOrchestrator>,
    pub defaults: RequestDefaults,
    /// RPC endpoint reported by `/api/provider-info`.
    pub node: Option<String>,
    pub metrics: Option<PrometheusHandle>,
    pub sentinel: SentinelClient,
    pub start_time: Instant,
}

type SharedState = Arc<AppState>;

impl AppState {
    fn identity_resolver(&self) -> IdentityResolver {
        IdentityResolver::new(
            self.chain.clone(),
            self.orchestrator.timings().call_timeout,
        )
    }

    async fn key_address(&self) -> std::result::Result<String, ChainError> {
        with_timeout(
            self.orchestrator.timings().call_timeout,
            "key address",
            self.chain
                .key_address(&self.defaults.key_name, &self.defaults.keyring_backend),
        )
        .await
    }

    async fn identity(&self) -> std::result::Result<ProviderIdentity, BondingError> {
        self.identity_resolver()
            .resolve(&self.defaults.key_name, &self.defaults.keyring_backend)
            .await
    }
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
    context: Map<String, Value>,
}

impl ApiError {
    fn new<S: Into<String>>(status: StatusCode, message: S) -> Self {
        Self {
            status,
            message: message.into(),
            context: Map::new(),
        }
    }

    fn bad_request<S: Into<String>>(message: S) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    fn internal<S: Into<String>>(message: S) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    fn with(mut self, key: &str, value: impl Serialize) -> Self {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.context.insert(key.to_string(), value);
        self
    }

    /// Map an orchestrator failure, attaching everything it accumulated.
    fn from_bonding(err: BondingError, inputs: Value) -> Self {
        let status = if err.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        let api = Self::new(status, err.to_string())
            .with("kind", err.kind())
            .with("inputs", inputs);

        match &err {
            BondingError::IdentityUnavailable { detail, .. } => api
                .with("detail", detail)
                .with("pubkey", json!({ "raw": "", "bech32": "" })),
            BondingError::EncodingUnavailable {
                raw_public_key,
                detail,
            } => api
                .with("detail", detail)
                .with("pubkey", json!({ "raw": raw_public_key, "bech32": "" })),
            BondingError::MissingField(_) => api,
            BondingError::BondSubmissionFailed(ctx)
            | BondingError::MetadataSubmissionFailed(ctx)
            | BondingError::SequenceMismatchRecoveryExhausted(ctx) => {
                let mut api = api
                    .with("detail", &ctx.failed.raw_output)
                    .with("cmd", &ctx.failed.command)
                    .with("pubkey", &ctx.identity)
                    .with("service", &ctx.service);
                if let Some(outcome) = ctx.bond.as_ref().and_then(BondPhase::outcome) {
                    api = api.with("bond_tx", tx_summary(outcome));
                }
                if let Some(recovery) = &ctx.recovery {
                    api = api.with("recovery", recovery);
                }
                api
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = Map::new();
        body.insert("error".to_string(), Value::String(self.message));
        body.extend(self.context);
        (self.status, Json(Value::Object(body))).into_response()
    }
}

/// Raw command output when the chain produced one, else the error text.
fn chain_detail(err: &ChainError) -> String {
    err.output()
        .map(str::to_string)
        .unwrap_or_else(|| err.to_string())
}

fn tx_summary(outcome: &TransactionOutcome) -> Value {
    json!({ "exit_code": outcome.exit_code, "output": outcome.raw_output })
}

pub async fn start_server(state: AppState, addr: &str) -> Result<()> {
    let app = build_router(state);
    let listener = bind_listener(addr).await?;
    info!("Admin API listening on {}", addr);
    axum::serve(listener, app)
        .await
        .context("admin API server terminated unexpectedly")
}

async fn bind_listener(addr: &str) -> Result<tokio::net::TcpListener> {
    if let Ok(socket_addr) = addr.parse::<SocketAddr>() {
        tokio::net::TcpListener::bind(socket_addr)
            .await
            .with_context(|| format!("failed to bind admin API listener on {socket_addr}"))
    } else {
        tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind admin API listener on {addr}"))
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/api/ping", get(handle_ping))
        .route("/api/version", get(handle_version))
        .route("/api/block-height", get(handle_block_height))
        .route("/api/key", get(handle_key))
        .route("/api/balance", get(handle_balance))
        .route("/api/sentinel-metadata", get(handle_sentinel_metadata))
        .route("/api/provider-info", get(handle_provider_info))
        .route("/api/services", get(handle_services))
        .route("/api/provider-services", get(handle_provider_services))
        .route("/api/bond-provider", post(handle_bond_provider))
        .route("/api/bond-mod-provider", post(handle_bond_mod_provider))
        .route("/metrics", get(handle_metrics))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

async fn handle_ping(State(state): State<SharedState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "uptime_secs": state.start_time.elapsed().as_secs(),
    }))
}

async fn handle_version(State(state): State<SharedState>) -> Result<Json<Value>, ApiError> {
    let timeout = state.orchestrator.timings().call_timeout;
    let version = with_timeout(timeout, "daemon version", state.chain.daemon_version())
        .await
        .map_err(|err| {
            ApiError::internal("failed to get arkeod version").with("detail", chain_detail(&err))
        })?;
    Ok(Json(json!({ "arkeod_version": version })))
}

async fn handle_block_height(State(state): State<SharedState>) -> Result<Json<Value>, ApiError> {
    let timeout = state.orchestrator.timings().call_timeout;
    let status = with_timeout(timeout, "node status", state.chain.node_status())
        .await
        .map_err(|err| {
            ApiError::internal("failed to fetch status").with("detail", chain_detail(&err))
        })?;
    Ok(Json(json!({
        "height": status.height,
        "status": status.status,
    })))
}

async fn handle_key(State(state): State<SharedState>) -> Result<Json<Value>, ApiError> {
    let address = state.key_address().await.map_err(|err| {
        ApiError::internal("failed to get key address").with("detail", chain_detail(&err))
    })?;
    Ok(Json(json!({ "address": address })))
}

async fn handle_balance(State(state): State<SharedState>) -> Result<Json<Value>, ApiError> {
    let address = state.key_address().await.map_err(|err| {
        ApiError::internal("failed to get key address").with("detail", chain_detail(&err))
    })?;

    let timeout = state.orchestrator.timings().call_timeout;
    let balance = with_timeout(timeout, "balance", state.chain.balance(&address))
        .await
        .map_err(|err| {
            ApiError::internal("failed to query balance")
                .with("address", &address)
                .with("detail", chain_detail(&err))
        })?;
    Ok(Json(json!({ "address": address, "balance": balance })))
}

#[derive(Debug, Default, Deserialize)]
struct SentinelQuery {
    url: Option<String>,
    sentinel_uri: Option<String>,
}

async fn handle_sentinel_metadata(
    State(state): State<SharedState>,
    Query(query): Query<SentinelQuery>,
) -> Result<Json<Value>, ApiError> {
    let url = [query.url, query.sentinel_uri, Some(state.defaults.sentinel_uri.clone())]
        .into_iter()
        .flatten()
        .map(|url| url.trim().to_string())
        .find(|url| !url.is_empty())
        .ok_or_else(|| ApiError::bad_request("sentinel uri not provided"))?;

    let document = state.sentinel.fetch(&url).await.map_err(|err| {
        ApiError::internal("failed to fetch sentinel metadata")
            .with("detail", format!("{err:#}"))
            .with("url", &url)
    })?;
    Ok(Json(match document {
        SentinelDocument::Metadata(metadata) => json!({ "url": url, "metadata": metadata }),
        SentinelDocument::Raw(raw) => json!({ "url": url, "raw": raw }),
    }))
}

async fn handle_provider_info(State(state): State<SharedState>) -> Json<Value> {
    let defaults = &state.defaults;
    let mut info = json!({
        "user": defaults.key_name,
        "keyring_backend": defaults.keyring_backend,
        "fees": defaults.fees,
        "bond": defaults.bond,
        "sentinel_uri": defaults.sentinel_uri,
        "metadata_nonce": defaults.metadata_nonce,
        "arkeod_node": state.node,
        "defaults": defaults,
    });

    // Identity errors are reported in the body; the remaining info stays useful.
    match state.identity().await {
        Ok(identity) => info["pubkey"] = json!(identity),
        Err(err) => {
            warn!("provider identity unavailable: {}", err);
            let raw = match &err {
                BondingError::EncodingUnavailable { raw_public_key, .. } => raw_public_key.clone(),
                _ => String::new(),
            };
            info["pubkey"] = json!({ "raw": raw, "bech32": "" });
            info["pubkey_error"] = json!(err.to_string());
        }
    }
    Json(info)
}

async fn handle_services(State(state): State<SharedState>) -> Result<Json<Value>, ApiError> {
    let timeout = state.orchestrator.timings().call_timeout;
    let services = with_timeout(timeout, "service catalog", state.chain.list_services())
        .await
        .map_err(|err| {
            ApiError::internal("failed to list services").with("detail", chain_detail(&err))
        })?;
    Ok(Json(json!({ "services": services })))
}

async fn handle_provider_services(
    State(state): State<SharedState>,
) -> Result<Json<Value>, ApiError> {
    let identity = state.identity().await.map_err(|err| {
        ApiError::internal(err.to_string())
            .with("user", &state.defaults.key_name)
            .with("keyring_backend", &state.defaults.keyring_backend)
    })?;

    let timeout = state.orchestrator.timings().call_timeout;
    let providers = with_timeout(timeout, "provider listing", state.chain.list_providers())
        .await
        .map_err(|err| {
            ApiError::internal("failed to list providers")
                .with("detail", chain_detail(&err))
                .with("pubkey", &identity)
        })?;

    let services = normalize::provider_services(&identity.encoded_public_key, &providers);
    Ok(Json(json!({
        "services": services,
        "pubkey": identity,
    })))
}

async fn handle_bond_provider(
    State(state): State<SharedState>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let payload = Payload::parse(&body);
    let request = payload
        .bond_request(&state.defaults)
        .ok_or_else(|| ApiError::bad_request("service is required"))?;
    let inputs = json!({
        "service": request.service,
        "bond": request.bond_amount,
        "keyring_backend": request.keyring_backend,
        "fees": request.fees,
    });

    let report = state
        .orchestrator
        .bond(&request)
        .await
        .map_err(|err| ApiError::from_bonding(err, inputs.clone()))?;

    let status = if report.bond.is_skipped() {
        "bond_skipped"
    } else {
        "bond_submitted"
    };
    Ok(Json(json!({
        "status": status,
        "user": request.key_name,
        "inputs": inputs,
        "pubkey": report.identity,
        "service": report.service,
        "bond": report.bond,
        "bond_tx": report.bond.outcome().map(tx_summary),
    })))
}

async fn handle_bond_mod_provider(
    State(state): State<SharedState>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let payload = Payload::parse(&body);
    let request = payload
        .registration_request(&state.defaults)
        .ok_or_else(|| ApiError::bad_request("service is required"))?;
    let metadata = &request.metadata;
    let mut inputs = json!({
        "service": request.bond.service,
        "sentinel_uri": metadata.endpoint_uri,
        "metadata_nonce": metadata.metadata_nonce,
        "status": metadata.status,
        "min_contract_dur": metadata.min_contract_duration,
        "max_contract_dur": metadata.max_contract_duration,
        "subscription_rates": metadata.subscription_rate,
        "pay_as_you_go_rates": metadata.pay_as_you_go_rate,
        "settlement_dur": metadata.settlement_duration,
        "bond": request.bond.bond_amount,
        "keyring_backend": request.bond.keyring_backend,
        "fees": request.bond.fees,
    });

    let report = state
        .orchestrator
        .register(&request)
        .await
        .map_err(|err| ApiError::from_bonding(err, inputs.clone()))?;

    inputs["resolved_service"] = json!(report.service.resolved_name);
    inputs["lookup_note"] = json!(report.service.resolution_note.clone().unwrap_or_default());
    Ok(Json(json!({
        "status": "bond_and_mod_submitted",
        "user": request.bond.key_name,
        "inputs": inputs,
        "pubkey": report.identity,
        "bond": report.bond,
        "bond_tx": report.bond.outcome().map(tx_summary),
        "mod_tx": tx_summary(&report.metadata.outcome),
        "mod_cmd": report.metadata.outcome.command,
        "sequence": report.metadata.sequence,
        "recovery": report.metadata.recovery,
    })))
}

async fn handle_metrics(State(state): State<SharedState>) -> Response {
    let Some(handle) = &state.metrics else {
        return (StatusCode::NOT_FOUND, "metrics exporter disabled").into_response();
    };
    let mut response = handle.render().into_response();
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; version=0.0.4"),
    );
    response
}
