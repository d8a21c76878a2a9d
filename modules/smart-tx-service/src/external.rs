//! Collaborators owned outside this service: the regular transaction
//! subsystem that smart transactions link back to, and error reporting.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use smart_tx_types::{ClientId, SmartTransaction};

use crate::error::{Result, SmartTxError};

/// Error name written to linked transactions
pub const SMART_TX_FAILED: &str = "SmartTransactionFailed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExternalTxStatus {
    Unapproved,
    Approved,
    Signed,
    Submitted,
    Confirmed,
    Failed,
    Dropped,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionFailure {
    pub name: String,
    pub message: String,
}

/// A record of the external transaction subsystem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalTransaction {
    pub id: String,
    pub status: ExternalTxStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TransactionFailure>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[async_trait]
pub trait TransactionSubsystem: Send + Sync {
    async fn get_transactions(&self) -> Result<Vec<ExternalTransaction>>;
    async fn update_transaction(&self, tx: ExternalTransaction, note: &str) -> Result<()>;
}

/// Body of `PUT /transactions/{id}`
#[derive(Debug, Serialize, Deserialize)]
pub struct TransactionUpdateBody {
    pub transaction: ExternalTransaction,
    pub note: String,
}

/// Regular transaction service reached over HTTP.
///
/// `GET {base}/transactions` lists records, `PUT {base}/transactions/{id}`
/// replaces one.
pub struct HttpTransactionSubsystem {
    client: reqwest::Client,
    base_url: String,
    client_id: ClientId,
}

impl HttpTransactionSubsystem {
    pub fn new(base_url: &str, client_id: ClientId) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            client_id,
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<String> {
        let response = request
            .header("X-Client-Id", self.client_id.as_str())
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(SmartTxError::TransactionService {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

#[async_trait]
impl TransactionSubsystem for HttpTransactionSubsystem {
    async fn get_transactions(&self) -> Result<Vec<ExternalTransaction>> {
        let body = self
            .send(self.client.get(format!("{}/transactions", self.base_url)))
            .await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn update_transaction(&self, tx: ExternalTransaction, note: &str) -> Result<()> {
        let url = format!("{}/transactions/{}", self.base_url, tx.id);
        let body = TransactionUpdateBody {
            transaction: tx,
            note: note.to_string(),
        };
        self.send(self.client.put(url).json(&body)).await?;
        Ok(())
    }
}

/// Receives configuration errors that are isolated rather than raised
pub trait ErrorReporter: Send + Sync {
    fn capture(&self, message: &str);
}

pub struct LogErrorReporter;

impl ErrorReporter for LogErrorReporter {
    fn capture(&self, message: &str) {
        log::error!("[STX_ERRORS] {}", message);
    }
}

/// Mark the transaction linked to `record` as failed.
///
/// Does nothing when the record has no link, the linked transaction is gone
/// or it is already failed. Subsystem errors are logged.
pub async fn mark_linked_transaction_failed(
    subsystem: &dyn TransactionSubsystem,
    record: &SmartTransaction,
) {
    let Some(transaction_id) = record.transaction_id.as_deref() else {
        return;
    };
    let status = record
        .status
        .map(|s| s.as_str())
        .unwrap_or("unknown");

    let transactions = match subsystem.get_transactions().await {
        Ok(transactions) => transactions,
        Err(e) => {
            log::warn!(
                "[STX_RECONCILER] Could not load transactions to mark {} failed: {}",
                transaction_id,
                e
            );
            return;
        }
    };
    let Some(mut linked) = transactions.into_iter().find(|tx| tx.id == transaction_id) else {
        log::warn!(
            "[STX_RECONCILER] Linked transaction {} for {} not found",
            transaction_id,
            record.uuid
        );
        return;
    };
    if linked.status == ExternalTxStatus::Failed {
        return;
    }

    linked.status = ExternalTxStatus::Failed;
    linked.error = Some(TransactionFailure {
        name: SMART_TX_FAILED.to_string(),
        message: format!("Smart transaction failed with status: {}", status),
    });
    log::info!(
        "[STX_RECONCILER] Marking transaction {} failed ({} is {})",
        transaction_id,
        record.uuid,
        status
    );
    if let Err(e) = subsystem
        .update_transaction(linked, &format!("Smart transaction status: {}", status))
        .await
    {
        log::warn!(
            "[STX_RECONCILER] Failed to mark transaction {} failed: {}",
            transaction_id,
            e
        );
    }
}
