//! Shared types for the smart transaction service and its RPC clients.
//!
//! Records are serialized in camelCase so that relay payloads
//! (`statusMetadata`, `minedHash`, ...) and stored snapshots share one shape.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Marker the relay returns in a batch-status response for a uuid it no longer tracks.
pub const UUID_NOT_FOUND: &str = "uuid_not_found";

// =====================================================
// Status Types
// =====================================================

/// Local status of a smart transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmartTransactionStatus {
    /// Submitted, outcome not yet known
    Pending,
    /// Mined and succeeded
    Success,
    /// Mined and reverted
    Reverted,
    /// Relay lost track of the outcome
    Unknown,
    /// Cancelled by the relay
    Cancelled,
    /// Cancelled at the user's request
    CancelledUserCancelled,
    /// Relay no longer knows the uuid
    Resolved,
}

impl SmartTransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SmartTransactionStatus::Pending => "pending",
            SmartTransactionStatus::Success => "success",
            SmartTransactionStatus::Reverted => "reverted",
            SmartTransactionStatus::Unknown => "unknown",
            SmartTransactionStatus::Cancelled => "cancelled",
            SmartTransactionStatus::CancelledUserCancelled => "cancelled_user_cancelled",
            SmartTransactionStatus::Resolved => "resolved",
        }
    }

    pub fn is_pending(&self) -> bool {
        *self == SmartTransactionStatus::Pending
    }

    /// Every status except `pending` is settled for its uuid.
    pub fn is_terminal(&self) -> bool {
        !self.is_pending()
    }

    /// Success or reverted: there is a mined transaction to confirm.
    pub fn is_mined(&self) -> bool {
        matches!(
            self,
            SmartTransactionStatus::Success | SmartTransactionStatus::Reverted
        )
    }

    /// Terminal without a mined transaction.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            SmartTransactionStatus::Cancelled
                | SmartTransactionStatus::CancelledUserCancelled
                | SmartTransactionStatus::Unknown
                | SmartTransactionStatus::Resolved
        )
    }

    pub fn is_cancelled(&self) -> bool {
        self.as_str().starts_with("cancelled")
    }
}

impl std::fmt::Display for SmartTransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SmartTransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SmartTransactionStatus::Pending),
            "success" => Ok(SmartTransactionStatus::Success),
            "reverted" => Ok(SmartTransactionStatus::Reverted),
            "unknown" => Ok(SmartTransactionStatus::Unknown),
            "cancelled" => Ok(SmartTransactionStatus::Cancelled),
            "cancelled_user_cancelled" => Ok(SmartTransactionStatus::CancelledUserCancelled),
            "resolved" => Ok(SmartTransactionStatus::Resolved),
            _ => Err(format!("Unknown status: {}", s)),
        }
    }
}

/// `minedTx` as reported by the relay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MinedTx {
    NotMined,
    Success,
    Cancelled,
    Reverted,
    Unknown,
    /// Anything outside the documented set, kept verbatim
    Other(String),
}

impl From<String> for MinedTx {
    fn from(s: String) -> Self {
        match s.as_str() {
            "not_mined" => MinedTx::NotMined,
            "success" => MinedTx::Success,
            "cancelled" => MinedTx::Cancelled,
            "reverted" => MinedTx::Reverted,
            "unknown" => MinedTx::Unknown,
            _ => MinedTx::Other(s),
        }
    }
}

impl From<MinedTx> for String {
    fn from(m: MinedTx) -> Self {
        match m {
            MinedTx::NotMined => "not_mined".to_string(),
            MinedTx::Success => "success".to_string(),
            MinedTx::Cancelled => "cancelled".to_string(),
            MinedTx::Reverted => "reverted".to_string(),
            MinedTx::Unknown => "unknown".to_string(),
            MinedTx::Other(s) => s,
        }
    }
}

/// `cancellationReason` as reported by the relay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CancellationReason {
    NotCancelled,
    WouldRevert,
    TooCheap,
    DeadlineMissed,
    InvalidNonce,
    UserCancelled,
    /// Anything outside the documented set, kept verbatim
    Other(String),
}

impl CancellationReason {
    /// Reasons that denote an actual cancellation
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            CancellationReason::WouldRevert
                | CancellationReason::TooCheap
                | CancellationReason::DeadlineMissed
                | CancellationReason::InvalidNonce
                | CancellationReason::UserCancelled
        )
    }
}

impl From<String> for CancellationReason {
    fn from(s: String) -> Self {
        match s.as_str() {
            "not_cancelled" => CancellationReason::NotCancelled,
            "would_revert" => CancellationReason::WouldRevert,
            "too_cheap" => CancellationReason::TooCheap,
            "deadline_missed" => CancellationReason::DeadlineMissed,
            "invalid_nonce" => CancellationReason::InvalidNonce,
            "user_cancelled" => CancellationReason::UserCancelled,
            _ => CancellationReason::Other(s),
        }
    }
}

impl From<CancellationReason> for String {
    fn from(r: CancellationReason) -> Self {
        match r {
            CancellationReason::NotCancelled => "not_cancelled".to_string(),
            CancellationReason::WouldRevert => "would_revert".to_string(),
            CancellationReason::TooCheap => "too_cheap".to_string(),
            CancellationReason::DeadlineMissed => "deadline_missed".to_string(),
            CancellationReason::InvalidNonce => "invalid_nonce".to_string(),
            CancellationReason::UserCancelled => "user_cancelled".to_string(),
            CancellationReason::Other(s) => s,
        }
    }
}

/// Last raw status payload from the relay.
///
/// Only `minedTx`, `minedHash`, `cancellationReason` and `isSettled` are
/// interpreted; everything else is carried through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mined_tx: Option<MinedTx>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mined_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancellation_reason: Option<CancellationReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_settled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_ratio: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicated: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timed_out: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxied: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One value of a batch-status response: either a status payload or a bare marker string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BatchStatusEntry {
    Status(StatusMetadata),
    Marker(String),
}

impl BatchStatusEntry {
    pub fn is_uuid_not_found(&self) -> bool {
        matches!(self, BatchStatusEntry::Marker(m) if m == UUID_NOT_FOUND)
    }
}

// =====================================================
// Record Types
// =====================================================

/// On-chain parameters of the submitted transaction
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    /// Hex-encoded nonce, e.g. "0x5"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_fee_per_gas: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_priority_fee_per_gas: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Diagnostic snapshot of a nonce allocation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NonceDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<Value>,
}

/// One patch operation of a history entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PatchOperation {
    Add { path: String, value: Value },
    Replace { path: String, value: Value },
    Remove { path: String },
}

impl PatchOperation {
    pub fn path(&self) -> &str {
        match self {
            PatchOperation::Add { path, .. }
            | PatchOperation::Replace { path, .. }
            | PatchOperation::Remove { path } => path,
        }
    }
}

/// One patch-set between two snapshots of a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Capture time in epoch milliseconds
    pub timestamp: i64,
    pub operations: Vec<PatchOperation>,
}

/// Client-side record of a relay-submitted transaction
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmartTransaction {
    pub uuid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<SmartTransactionStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_metadata: Option<StatusMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_params: Option<TxParams>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce_details: Option<NonceDetails>,
    /// Submission time in epoch milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_time: Option<i64>,
    #[serde(default)]
    pub confirmed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancellable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    /// Sender balance before submission, hex-encoded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_tx_balance: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

impl SmartTransaction {
    /// Build a fresh record from the first sighting of a uuid.
    pub fn from_update(update: SmartTransactionUpdate) -> Self {
        Self {
            uuid: update.uuid,
            chain_id: update.chain_id,
            status: update.status,
            status_metadata: update.status_metadata,
            tx_params: update.tx_params,
            nonce_details: update.nonce_details,
            time: update.time,
            creation_time: update.creation_time,
            confirmed: false,
            cancellable: update.cancellable,
            transaction_id: update.transaction_id,
            tx_hash: update.tx_hash,
            pre_tx_balance: update.pre_tx_balance,
            kind: update.kind,
            history: Vec::new(),
        }
    }

    /// Shallow merge: every field present on `update` wins.
    ///
    /// `confirmed` and `history` are never touched by an update. A terminal
    /// status ignores a late `pending` report, together with its
    /// `cancellable` flag; only a new uuid starts over.
    pub fn merge(&self, update: &SmartTransactionUpdate) -> Self {
        let mut next = self.clone();
        let stale_pending = self.status.is_some_and(|s| s.is_terminal())
            && update.status == Some(SmartTransactionStatus::Pending);

        overlay(&mut next.chain_id, &update.chain_id);
        if !stale_pending {
            overlay(&mut next.status, &update.status);
            overlay(&mut next.cancellable, &update.cancellable);
        }
        overlay(&mut next.status_metadata, &update.status_metadata);
        overlay(&mut next.tx_params, &update.tx_params);
        overlay(&mut next.nonce_details, &update.nonce_details);
        overlay(&mut next.time, &update.time);
        overlay(&mut next.creation_time, &update.creation_time);
        overlay(&mut next.transaction_id, &update.transaction_id);
        overlay(&mut next.tx_hash, &update.tx_hash);
        overlay(&mut next.pre_tx_balance, &update.pre_tx_balance);
        overlay(&mut next.kind, &update.kind);
        next
    }

    pub fn is_pending(&self) -> bool {
        self.status.map(|s| s.is_pending()).unwrap_or(false)
    }

    pub fn nonce(&self) -> Option<&str> {
        self.tx_params.as_ref().and_then(|p| p.nonce.as_deref())
    }

    pub fn from_address(&self) -> Option<&str> {
        self.tx_params.as_ref().and_then(|p| p.from.as_deref())
    }

    pub fn mined_hash(&self) -> Option<&str> {
        self.status_metadata
            .as_ref()
            .and_then(|m| m.mined_hash.as_deref())
            .filter(|h| !h.is_empty())
    }
}

fn overlay<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
    if let Some(v) = value {
        *slot = Some(v.clone());
    }
}

/// Partial record fed into the reconciler: a submission or one polled status
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmartTransactionUpdate {
    pub uuid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<SmartTransactionStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_metadata: Option<StatusMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_params: Option<TxParams>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce_details: Option<NonceDetails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancellable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_tx_balance: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

/// Which wallet client is talking to the relay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientId {
    Extension,
    Mobile,
}

impl ClientId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientId::Extension => "extension",
            ClientId::Mobile => "mobile",
        }
    }
}

impl std::str::FromStr for ClientId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "extension" => Ok(ClientId::Extension),
            "mobile" => Ok(ClientId::Mobile),
            _ => Err(format!("Unknown client id: {}", s)),
        }
    }
}

// =====================================================
// Relay Fee Types
// =====================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fee {
    pub max_fee_per_gas: u64,
    pub max_priority_fee_per_gas: u64,
}

/// Fee estimate for one transaction
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxFees {
    #[serde(default)]
    pub fees: Vec<Fee>,
    #[serde(default)]
    pub cancel_fees: Vec<Fee>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee_estimate: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_limit: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_used: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fees {
    pub trade_tx_fees: Option<TxFees>,
    pub approval_tx_fees: Option<TxFees>,
}

// =====================================================
// RPC Request Types
// =====================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct ListTransactionsRequest {
    pub chain_id: String,
    pub address: Option<String>,
    pub status: Option<SmartTransactionStatus>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GetTransactionRequest {
    pub chain_id: String,
    pub uuid: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmitTransactionsRequest {
    pub chain_id: String,
    pub network_client_id: Option<String>,
    pub tx_params: Option<TxParams>,
    pub signed_transactions: Vec<String>,
    #[serde(default)]
    pub signed_canceled_transactions: Vec<String>,
    /// Id of the linked record in the external transaction subsystem
    pub transaction_id: Option<String>,
    pub kind: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitTransactionsResponse {
    pub uuid: String,
    pub tx_hash: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CancelRequest {
    pub chain_id: String,
    pub uuid: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FeesRequest {
    pub chain_id: String,
    pub network_client_id: Option<String>,
    pub trade_tx: TxParams,
    pub approval_tx: Option<TxParams>,
}

/// Which notification a wait request resolves on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitUntil {
    StatusChange,
    Confirmation,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WaitRequest {
    pub chain_id: String,
    pub uuid: String,
    pub until: WaitUntil,
    /// Defaults to 30s, capped at 120s
    pub timeout_ms: Option<u64>,
}

// =====================================================
// RPC Response Types
// =====================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct RpcResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> RpcResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

// =====================================================
// Service Status
// =====================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub running: bool,
    pub uptime_secs: u64,
    pub polling_active: bool,
    pub subscriptions: usize,
    pub pending_transactions: usize,
    pub total_transactions: usize,
    pub poll_interval_ms: u64,
    pub supported_chains: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_metadata_keeps_unknown_fields() {
        let raw = json!({
            "minedTx": "not_mined",
            "cancellationReason": "not_cancelled",
            "isSettled": false,
            "minedHash": "",
            "wouldRevertMessage": null,
        });
        let meta: StatusMetadata = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(meta.mined_tx, Some(MinedTx::NotMined));
        assert_eq!(meta.cancellation_reason, Some(CancellationReason::NotCancelled));
        assert!(meta.extra.contains_key("wouldRevertMessage"));
        assert_eq!(serde_json::to_value(&meta).unwrap(), raw);
    }

    #[test]
    fn test_unrecognized_reason_is_preserved() {
        let meta: StatusMetadata =
            serde_json::from_value(json!({"cancellationReason": "relay_overloaded"})).unwrap();
        assert_eq!(
            meta.cancellation_reason,
            Some(CancellationReason::Other("relay_overloaded".to_string()))
        );
        assert!(!meta.cancellation_reason.unwrap().is_cancellation());
    }

    #[test]
    fn test_batch_entry_marker() {
        let entry: BatchStatusEntry = serde_json::from_value(json!("uuid_not_found")).unwrap();
        assert!(entry.is_uuid_not_found());
        let entry: BatchStatusEntry =
            serde_json::from_value(json!({"minedTx": "success"})).unwrap();
        assert!(!entry.is_uuid_not_found());
    }

    #[test]
    fn test_merge_incoming_wins_and_keeps_confirmed() {
        let mut current = SmartTransaction::from_update(SmartTransactionUpdate {
            uuid: "u1".to_string(),
            status: Some(SmartTransactionStatus::Pending),
            transaction_id: Some("tx-1".to_string()),
            ..Default::default()
        });
        current.confirmed = true;

        let merged = current.merge(&SmartTransactionUpdate {
            uuid: "u1".to_string(),
            status: Some(SmartTransactionStatus::Success),
            ..Default::default()
        });
        assert_eq!(merged.status, Some(SmartTransactionStatus::Success));
        assert_eq!(merged.transaction_id.as_deref(), Some("tx-1"));
        assert!(merged.confirmed);
    }

    #[test]
    fn test_terminal_status_ignores_late_pending() {
        let current = SmartTransaction::from_update(SmartTransactionUpdate {
            uuid: "u1".to_string(),
            status: Some(SmartTransactionStatus::CancelledUserCancelled),
            cancellable: Some(false),
            ..Default::default()
        });
        let merged = current.merge(&SmartTransactionUpdate {
            uuid: "u1".to_string(),
            status: Some(SmartTransactionStatus::Pending),
            cancellable: Some(true),
            ..Default::default()
        });
        assert_eq!(merged.status, Some(SmartTransactionStatus::CancelledUserCancelled));
        assert_eq!(merged.cancellable, Some(false));

        let merged = current.merge(&SmartTransactionUpdate {
            uuid: "u1".to_string(),
            status: Some(SmartTransactionStatus::Resolved),
            ..Default::default()
        });
        assert_eq!(merged.status, Some(SmartTransactionStatus::Resolved));
    }

    #[test]
    fn test_status_classification() {
        assert!(SmartTransactionStatus::CancelledUserCancelled.is_cancelled());
        assert!(SmartTransactionStatus::Cancelled.is_failure());
        assert!(SmartTransactionStatus::Reverted.is_mined());
        assert!(!SmartTransactionStatus::Pending.is_failure());
        assert_eq!(
            "cancelled_user_cancelled".parse::<SmartTransactionStatus>().unwrap(),
            SmartTransactionStatus::CancelledUserCancelled
        );
    }

    #[test]
    fn test_record_serializes_type_field() {
        let record = SmartTransaction {
            uuid: "u1".to_string(),
            kind: Some("swap".to_string()),
            ..Default::default()
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["type"], "swap");
        assert_eq!(value["confirmed"], false);
        assert!(value.get("txParams").is_none());
    }
}
