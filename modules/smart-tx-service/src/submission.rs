//! Submission, fee estimation, cancel and liveness against the relay.

use chrono::Utc;
use ethers::utils::keccak256;
use smart_tx_types::{
    Fees, SmartTransactionStatus, SmartTransactionUpdate, SubmitTransactionsRequest,
    SubmitTransactionsResponse, TxParams,
};
use std::sync::Arc;

use crate::chain::ChainQuery;
use crate::error::{Result, SmartTxError};
use crate::nonce::{increment_hex_nonce, to_hex_nonce, with_nonce_lock, NonceCoordinator, NonceLock};
use crate::reconciler::StatusReconciler;
use crate::relay_api::RelayApi;
use crate::store::ChainId;

pub struct SubmissionService {
    relay: Arc<dyn RelayApi>,
    chain: Arc<dyn ChainQuery>,
    nonces: Arc<dyn NonceCoordinator>,
    reconciler: Arc<StatusReconciler>,
    supported_chains: Vec<ChainId>,
}

/// `0x` + keccak256 of a hex-encoded signed transaction
pub fn transaction_hash(raw_tx: &str) -> Result<String> {
    let bytes = hex::decode(raw_tx.trim_start_matches("0x"))
        .map_err(|e| SmartTxError::InvalidRequest(format!("Signed transaction is not hex: {}", e)))?;
    Ok(format!("0x{}", hex::encode(keccak256(bytes))))
}

impl SubmissionService {
    pub fn new(
        relay: Arc<dyn RelayApi>,
        chain: Arc<dyn ChainQuery>,
        nonces: Arc<dyn NonceCoordinator>,
        reconciler: Arc<StatusReconciler>,
        supported_chains: Vec<ChainId>,
    ) -> Self {
        Self {
            relay,
            chain,
            nonces,
            reconciler,
            supported_chains,
        }
    }

    fn supported_chain(&self, raw: &str) -> Result<ChainId> {
        let chain = ChainId::parse(raw)?;
        if !self.supported_chains.contains(&chain) {
            return Err(SmartTxError::UnsupportedChain(chain.to_string()));
        }
        Ok(chain)
    }

    /// Submit signed transactions and start tracking the returned uuid.
    ///
    /// A missing nonce is allocated first; if that fails nothing is sent and
    /// no record is created. The lock is held until the record exists.
    pub async fn submit_signed_transactions(
        &self,
        request: SubmitTransactionsRequest,
    ) -> Result<SubmitTransactionsResponse> {
        let chain = self.supported_chain(&request.chain_id)?;
        let Some(first_tx) = request.signed_transactions.first() else {
            return Err(SmartTxError::InvalidRequest(
                "No signed transactions to submit".to_string(),
            ));
        };
        let tx_hash = transaction_hash(first_tx)?;
        let mut tx_params = request.tx_params.clone().unwrap_or_default();

        let lock: Option<NonceLock> = if tx_params.nonce.is_none() {
            let from = tx_params.from.clone().ok_or_else(|| {
                SmartTxError::InvalidRequest("txParams.from is required to allocate a nonce".to_string())
            })?;
            let network = request
                .network_client_id
                .clone()
                .unwrap_or_else(|| chain.to_string());
            let lock = self.nonces.acquire(&from, &network).await?;
            tx_params.nonce = Some(to_hex_nonce(lock.next_nonce));
            Some(lock)
        } else {
            None
        };

        let uuid = self
            .relay
            .submit_transactions(
                &chain,
                &request.signed_transactions,
                &request.signed_canceled_transactions,
            )
            .await?;

        let pre_tx_balance = match tx_params.from.as_deref() {
            Some(from) => match self.chain.get_balance(&chain, from).await {
                Ok(balance) => Some(format!("0x{:x}", balance)),
                Err(e) => {
                    log::warn!("[STX_SUBMIT] Could not read pre-tx balance of {}: {}", from, e);
                    None
                }
            },
            None => None,
        };

        let now = Utc::now().timestamp_millis();
        self.reconciler
            .reconcile_on(
                SmartTransactionUpdate {
                    uuid: uuid.clone(),
                    status: Some(SmartTransactionStatus::Pending),
                    cancellable: Some(true),
                    tx_params: Some(tx_params),
                    nonce_details: lock.as_ref().map(|l| l.nonce_details.clone()),
                    time: Some(now),
                    creation_time: Some(now),
                    transaction_id: request.transaction_id.clone(),
                    tx_hash: Some(tx_hash.clone()),
                    pre_tx_balance,
                    kind: request.kind.clone(),
                    ..Default::default()
                },
                &chain,
            )
            .await;

        if let Some(lock) = lock {
            lock.release();
        }
        log::info!("[STX_SUBMIT] Submitted {} on {} ({})", uuid, chain, tx_hash);

        Ok(SubmitTransactionsResponse {
            uuid,
            tx_hash: Some(tx_hash),
        })
    }

    /// Relay fee estimate. Missing nonces are filled in: the approval gets
    /// the next nonce and the trade the one after it.
    pub async fn get_fees(
        &self,
        chain_id: &str,
        network_client_id: Option<&str>,
        trade_tx: TxParams,
        approval_tx: Option<TxParams>,
    ) -> Result<Fees> {
        let chain = self.supported_chain(chain_id)?;
        if trade_tx.nonce.is_some() {
            return self.relay.get_fees(&chain, &trade_tx, approval_tx.as_ref()).await;
        }

        let from = trade_tx
            .from
            .clone()
            .ok_or_else(|| SmartTxError::InvalidRequest("tradeTx.from is required".to_string()))?;
        let network = network_client_id
            .map(str::to_string)
            .unwrap_or_else(|| chain.to_string());

        with_nonce_lock(self.nonces.as_ref(), &from, &network, |next_nonce, _| async move {
            let mut trade_tx = trade_tx;
            let approval_tx = match approval_tx {
                Some(mut approval) => {
                    let nonce = to_hex_nonce(next_nonce);
                    trade_tx.nonce = Some(increment_hex_nonce(&nonce)?);
                    approval.nonce = Some(nonce);
                    Some(approval)
                }
                None => {
                    trade_tx.nonce = Some(to_hex_nonce(next_nonce));
                    None
                }
            };
            self.relay
                .get_fees(&chain, &trade_tx, approval_tx.as_ref())
                .await
        })
        .await
    }

    pub async fn cancel(&self, chain_id: &str, uuid: &str) -> Result<()> {
        let chain = self.supported_chain(chain_id)?;
        if self.reconciler.get_transaction(&chain, uuid).is_none() {
            return Err(SmartTxError::NotFound(format!("Smart transaction {}", uuid)));
        }
        self.relay.cancel(&chain, uuid).await
    }

    /// Whether the relay currently accepts smart transactions on `chain_id`.
    /// Unreachable or unsupported counts as not live.
    pub async fn liveness(&self, chain_id: &str) -> Result<bool> {
        let chain = ChainId::parse(chain_id)?;
        if !self.supported_chains.contains(&chain) {
            return Ok(false);
        }
        match self.relay.liveness(&chain).await {
            Ok(live) => Ok(live),
            Err(e) => {
                log::warn!("[STX_SUBMIT] Liveness check failed on {}: {}", chain, e);
                Ok(false)
            }
        }
    }
}
