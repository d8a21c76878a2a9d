//! Smart Transaction Service: standalone binary tracking relay-submitted
//! transactions until they are confirmed on chain.
//!
//! Default: http://127.0.0.1:9103/

use smart_tx_service::chain::EthersChainQuery;
use smart_tx_service::config::ServiceConfig;
use smart_tx_service::db::Db;
use smart_tx_service::events::EventBroadcaster;
use smart_tx_service::external::{HttpTransactionSubsystem, LogErrorReporter};
use smart_tx_service::feature_flags::FeatureFlagGate;
use smart_tx_service::metrics::LogMetricsSink;
use smart_tx_service::nonce::ChainNonceCoordinator;
use smart_tx_service::poller::{PollerConfig, PollingScheduler};
use smart_tx_service::reconciler::StatusReconciler;
use smart_tx_service::relay_api::HttpRelayApi;
use smart_tx_service::routes::{self, AppState};
use smart_tx_service::store::RecordStore;
use smart_tx_service::submission::SubmissionService;
use std::sync::Arc;
use std::time::Instant;

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    env_logger::init();

    let config = ServiceConfig::from_env();

    log::info!("Opening database at: {}", config.db_path);
    let database = Arc::new(Db::open(&config.db_path).expect("Failed to open database"));

    let store = Arc::new(RecordStore::with_sink(database.clone()));
    match database.load_all() {
        Ok(chains) => {
            for (chain, records) in chains {
                store.restore(chain, records);
            }
        }
        Err(e) => log::error!("Failed to restore smart transactions: {}", e),
    }

    let flags = Arc::new(FeatureFlagGate::new(
        config.client_id,
        Arc::new(LogErrorReporter),
    ));
    if let Some(raw) = &config.feature_flags {
        flags.load(raw);
    }

    let relay = Arc::new(HttpRelayApi::new(&config.relay_url, config.client_id));
    let chain = Arc::new(EthersChainQuery::new(&config.rpc_urls).expect("Invalid RPC configuration"));
    let nonces = Arc::new(ChainNonceCoordinator::new(chain.clone()));

    let events = Arc::new(EventBroadcaster::new());
    let mut reconciler = StatusReconciler::new(
        store.clone(),
        events.clone(),
        Arc::new(LogMetricsSink),
        flags,
        relay.clone(),
        chain.clone(),
    );
    match &config.transactions_url {
        Some(url) => {
            log::info!("Propagating smart transaction failures to {}", url);
            reconciler = reconciler.with_transaction_subsystem(Arc::new(
                HttpTransactionSubsystem::new(url, config.client_id),
            ));
        }
        None => log::warn!("SMART_TX_TRANSACTIONS_URL not set, failures are not propagated"),
    }
    let reconciler = Arc::new(reconciler);

    let scheduler = Arc::new(PollingScheduler::new(
        reconciler.clone(),
        PollerConfig {
            interval: config.poll_interval,
            supported_chains: config.supported_chains.clone(),
        },
    ));
    let supervisor = scheduler.start();

    let submission = Arc::new(SubmissionService::new(
        relay,
        chain,
        nonces,
        reconciler.clone(),
        config.supported_chains.clone(),
    ));

    let state = Arc::new(AppState {
        reconciler,
        events,
        scheduler: scheduler.clone(),
        submission,
        start_time: Instant::now(),
    });

    let cors = tower_http::cors::CorsLayer::permissive();
    let app = routes::router(state).layer(cors);

    let addr = format!("127.0.0.1:{}", config.port);
    log::info!(
        "Smart Transaction Service listening on http://{} ({} pending, relay {})",
        addr,
        store.pending_count(),
        config.relay_url
    );

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            log::info!("Shutdown signal received");
        })
        .await
        .expect("Server error");

    scheduler.shutdown();
    supervisor.await.ok();
}
