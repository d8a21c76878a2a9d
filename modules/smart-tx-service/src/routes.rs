//! Axum route handlers for the smart transaction RPC API.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use smart_tx_types::*;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::SmartTxError;
use crate::events::EventBroadcaster;
use crate::poller::{PollingScheduler, PollingState};
use crate::reconciler::StatusReconciler;
use crate::store::ChainId;
use crate::submission::SubmissionService;

const DEFAULT_WAIT_MS: u64 = 30_000;
const MAX_WAIT_MS: u64 = 120_000;

pub struct AppState {
    pub reconciler: Arc<StatusReconciler>,
    pub events: Arc<EventBroadcaster>,
    pub scheduler: Arc<PollingScheduler>,
    pub submission: Arc<SubmissionService>,
    pub start_time: Instant,
}

type RpcResult<T> = (StatusCode, Json<RpcResponse<T>>);

fn error_status(error: &SmartTxError) -> StatusCode {
    match error {
        SmartTxError::InvalidChainId(_)
        | SmartTxError::UnsupportedChain(_)
        | SmartTxError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        SmartTxError::NotFound(_) => StatusCode::NOT_FOUND,
        SmartTxError::Relay { .. }
        | SmartTxError::TransactionService { .. }
        | SmartTxError::Http(_)
        | SmartTxError::Chain(_) => StatusCode::BAD_GATEWAY,
        SmartTxError::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
        SmartTxError::NonceLock(_) => StatusCode::CONFLICT,
        SmartTxError::Decode(_) | SmartTxError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn failure<T: serde::Serialize>(error: SmartTxError) -> RpcResult<T> {
    (error_status(&error), Json(RpcResponse::err(error.to_string())))
}

fn parse_chain<T: serde::Serialize>(raw: &str) -> Result<ChainId, RpcResult<T>> {
    ChainId::parse(raw).map_err(failure)
}

// =====================================================
// Transaction Endpoints
// =====================================================

// POST /rpc/transactions/list
pub async fn transactions_list(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ListTransactionsRequest>,
) -> RpcResult<Vec<SmartTransaction>> {
    let chain = match parse_chain(&req.chain_id) {
        Ok(chain) => chain,
        Err(response) => return response,
    };
    let records = state
        .reconciler
        .get_transactions(&chain, req.address.as_deref(), req.status);
    (StatusCode::OK, Json(RpcResponse::ok(records)))
}

// POST /rpc/transactions/get
pub async fn transactions_get(
    State(state): State<Arc<AppState>>,
    Json(req): Json<GetTransactionRequest>,
) -> RpcResult<SmartTransaction> {
    let chain = match parse_chain(&req.chain_id) {
        Ok(chain) => chain,
        Err(response) => return response,
    };
    match state.reconciler.get_transaction(&chain, &req.uuid) {
        Some(record) => (StatusCode::OK, Json(RpcResponse::ok(record))),
        None => failure(SmartTxError::NotFound(format!("Smart transaction {}", req.uuid))),
    }
}

// POST /rpc/transactions/submit
pub async fn transactions_submit(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SubmitTransactionsRequest>,
) -> RpcResult<SubmitTransactionsResponse> {
    match state.submission.submit_signed_transactions(req).await {
        Ok(response) => (StatusCode::OK, Json(RpcResponse::ok(response))),
        Err(e) => {
            log::warn!("[STX_RPC] Submission failed: {}", e);
            failure(e)
        }
    }
}

// POST /rpc/transactions/cancel
pub async fn transactions_cancel(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CancelRequest>,
) -> RpcResult<bool> {
    match state.submission.cancel(&req.chain_id, &req.uuid).await {
        Ok(()) => (StatusCode::OK, Json(RpcResponse::ok(true))),
        Err(e) => failure(e),
    }
}

// POST /rpc/transactions/wait
pub async fn transactions_wait(
    State(state): State<Arc<AppState>>,
    Json(req): Json<WaitRequest>,
) -> RpcResult<SmartTransaction> {
    let chain = match parse_chain(&req.chain_id) {
        Ok(chain) => chain,
        Err(response) => return response,
    };
    let Some(record) = state.reconciler.get_transaction(&chain, &req.uuid) else {
        return failure(SmartTxError::NotFound(format!("Smart transaction {}", req.uuid)));
    };
    if req.until == WaitUntil::Confirmation && record.confirmed {
        return (StatusCode::OK, Json(RpcResponse::ok(record)));
    }

    let timeout = Duration::from_millis(req.timeout_ms.unwrap_or(DEFAULT_WAIT_MS).min(MAX_WAIT_MS));
    let result = match req.until {
        WaitUntil::StatusChange => state.events.wait_for_status_change(&req.uuid, timeout).await,
        WaitUntil::Confirmation => state
            .events
            .wait_for_confirmation(&req.uuid, timeout)
            .await
            // Confirmation may have finished before the wait subscribed
            .or_else(|| {
                state
                    .reconciler
                    .get_transaction(&chain, &req.uuid)
                    .filter(|r| r.confirmed)
            }),
    };

    match result {
        Some(record) => (StatusCode::OK, Json(RpcResponse::ok(record))),
        None => failure(SmartTxError::Timeout(format!("smart transaction {}", req.uuid))),
    }
}

// POST /rpc/fees
pub async fn fees(
    State(state): State<Arc<AppState>>,
    Json(req): Json<FeesRequest>,
) -> RpcResult<Fees> {
    match state
        .submission
        .get_fees(
            &req.chain_id,
            req.network_client_id.as_deref(),
            req.trade_tx,
            req.approval_tx,
        )
        .await
    {
        Ok(fees) => (StatusCode::OK, Json(RpcResponse::ok(fees))),
        Err(e) => failure(e),
    }
}

// GET /rpc/liveness/:chain_id
pub async fn liveness(
    State(state): State<Arc<AppState>>,
    Path(chain_id): Path<String>,
) -> RpcResult<bool> {
    match state.submission.liveness(&chain_id).await {
        Ok(live) => (StatusCode::OK, Json(RpcResponse::ok(live))),
        Err(e) => failure(e),
    }
}

// =====================================================
// Service
// =====================================================

// GET /rpc/status
pub async fn status(State(state): State<Arc<AppState>>) -> RpcResult<ServiceStatus> {
    let store = state.reconciler.store();
    let config = state.scheduler.config();

    let status = ServiceStatus {
        running: true,
        uptime_secs: state.start_time.elapsed().as_secs(),
        polling_active: state.scheduler.state() == PollingState::Active,
        subscriptions: state.scheduler.subscription_count(),
        pending_transactions: store.pending_count(),
        total_transactions: store.len(),
        poll_interval_ms: config.interval.as_millis() as u64,
        supported_chains: config
            .supported_chains
            .iter()
            .map(ChainId::to_string)
            .collect(),
    };

    (StatusCode::OK, Json(RpcResponse::ok(status)))
}

pub fn router(state: Arc<AppState>) -> axum::Router {
    axum::Router::new()
        .route("/rpc/status", axum::routing::get(status))
        .route(
            "/rpc/transactions/list",
            axum::routing::post(transactions_list),
        )
        .route(
            "/rpc/transactions/get",
            axum::routing::post(transactions_get),
        )
        .route(
            "/rpc/transactions/submit",
            axum::routing::post(transactions_submit),
        )
        .route(
            "/rpc/transactions/cancel",
            axum::routing::post(transactions_cancel),
        )
        .route(
            "/rpc/transactions/wait",
            axum::routing::post(transactions_wait),
        )
        .route("/rpc/fees", axum::routing::post(fees))
        .route("/rpc/liveness/:chain_id", axum::routing::get(liveness))
        .with_state(state)
}
