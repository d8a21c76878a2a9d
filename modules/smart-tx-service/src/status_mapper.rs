//! Relay payload → local status.

use smart_tx_types::{
    BatchStatusEntry, CancellationReason, MinedTx, SmartTransactionStatus, StatusMetadata,
};

/// Local view of one relay status entry
#[derive(Debug, Clone, PartialEq)]
pub struct MappedStatus {
    pub status: SmartTransactionStatus,
    pub cancellable: bool,
    /// Raw payload to store on the record; `None` for the not-found marker
    pub metadata: Option<StatusMetadata>,
}

pub fn map_entry(entry: &BatchStatusEntry) -> MappedStatus {
    match entry {
        BatchStatusEntry::Status(metadata) => MappedStatus {
            status: status_of(metadata),
            cancellable: is_cancellable(metadata),
            metadata: Some(metadata.clone()),
        },
        BatchStatusEntry::Marker(marker) => {
            if !entry.is_uuid_not_found() {
                log::warn!("[STX_MAPPER] Unrecognized status marker '{}'", marker);
            }
            // A bare marker carries no outcome; the relay no longer tracks the uuid
            MappedStatus {
                status: SmartTransactionStatus::Resolved,
                cancellable: false,
                metadata: None,
            }
        }
    }
}

/// Derive the local status of a relay payload.
///
/// A not-mined transaction stays pending until the relay reports the
/// cancellation as settled. Unrecognized values never produce a terminal state.
pub fn status_of(metadata: &StatusMetadata) -> SmartTransactionStatus {
    match &metadata.mined_tx {
        Some(MinedTx::Success) => SmartTransactionStatus::Success,
        Some(MinedTx::Reverted) => SmartTransactionStatus::Reverted,
        Some(MinedTx::Cancelled) => SmartTransactionStatus::Cancelled,
        Some(MinedTx::Unknown) => SmartTransactionStatus::Unknown,
        Some(MinedTx::NotMined) => not_mined_status(metadata),
        Some(MinedTx::Other(value)) => {
            log::warn!("[STX_MAPPER] Unrecognized minedTx '{}', keeping pending", value);
            SmartTransactionStatus::Pending
        }
        None => SmartTransactionStatus::Pending,
    }
}

fn not_mined_status(metadata: &StatusMetadata) -> SmartTransactionStatus {
    let settled = metadata.is_settled.unwrap_or(false);
    match &metadata.cancellation_reason {
        Some(CancellationReason::UserCancelled) if settled => {
            SmartTransactionStatus::CancelledUserCancelled
        }
        Some(reason) if reason.is_cancellation() && settled => SmartTransactionStatus::Cancelled,
        Some(CancellationReason::Other(value)) => {
            log::warn!(
                "[STX_MAPPER] Unrecognized cancellationReason '{}', keeping pending",
                value
            );
            SmartTransactionStatus::Pending
        }
        _ => SmartTransactionStatus::Pending,
    }
}

/// Only a not-mined transaction with no cancellation in progress can be cancelled.
/// Reasons outside the known set are treated as not cancellable.
pub fn is_cancellable(metadata: &StatusMetadata) -> bool {
    matches!(metadata.mined_tx, Some(MinedTx::NotMined))
        && matches!(
            metadata.cancellation_reason,
            None | Some(CancellationReason::NotCancelled)
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(value: serde_json::Value) -> BatchStatusEntry {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_not_mined_not_cancelled_is_pending_and_cancellable() {
        let mapped = map_entry(&entry(json!({
            "minedTx": "not_mined",
            "cancellationReason": "not_cancelled",
            "isSettled": false
        })));
        assert_eq!(mapped.status, SmartTransactionStatus::Pending);
        assert!(mapped.cancellable);
        assert!(mapped.metadata.is_some());
    }

    #[test]
    fn test_unsettled_cancellation_stays_pending() {
        let mapped = map_entry(&entry(json!({
            "minedTx": "not_mined",
            "cancellationReason": "too_cheap",
            "isSettled": false
        })));
        assert_eq!(mapped.status, SmartTransactionStatus::Pending);
        assert!(!mapped.cancellable);
    }

    #[test]
    fn test_settled_cancellations() {
        let user = map_entry(&entry(json!({
            "minedTx": "not_mined",
            "cancellationReason": "user_cancelled",
            "isSettled": true
        })));
        assert_eq!(user.status, SmartTransactionStatus::CancelledUserCancelled);

        let relay = map_entry(&entry(json!({
            "minedTx": "not_mined",
            "cancellationReason": "would_revert",
            "isSettled": true
        })));
        assert_eq!(relay.status, SmartTransactionStatus::Cancelled);
    }

    #[test]
    fn test_mined_outcomes() {
        for (mined, status) in [
            ("success", SmartTransactionStatus::Success),
            ("reverted", SmartTransactionStatus::Reverted),
            ("cancelled", SmartTransactionStatus::Cancelled),
            ("unknown", SmartTransactionStatus::Unknown),
        ] {
            let mapped = map_entry(&entry(json!({"minedTx": mined, "minedHash": "0xabc"})));
            assert_eq!(mapped.status, status);
            assert!(!mapped.cancellable);
        }
    }

    #[test]
    fn test_unrecognized_values_stay_pending() {
        let mapped = map_entry(&entry(json!({"minedTx": "reorged"})));
        assert_eq!(mapped.status, SmartTransactionStatus::Pending);

        let mapped = map_entry(&entry(json!({
            "minedTx": "not_mined",
            "cancellationReason": "relay_overloaded",
            "isSettled": true
        })));
        assert_eq!(mapped.status, SmartTransactionStatus::Pending);
        assert!(!mapped.cancellable);
    }

    #[test]
    fn test_uuid_not_found_resolves() {
        let mapped = map_entry(&entry(json!("uuid_not_found")));
        assert_eq!(mapped.status, SmartTransactionStatus::Resolved);
        assert!(mapped.metadata.is_none());
        assert!(!mapped.cancellable);
    }
}
