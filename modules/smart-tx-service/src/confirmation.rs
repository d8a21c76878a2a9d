//! Finalizes mined records once the node reports a receipt.

use chrono::Utc;
use ethers::types::{Transaction, U256};
use smart_tx_types::SmartTransaction;
use std::sync::Arc;

use crate::chain::ChainQuery;
use crate::error::Result;
use crate::events::{EventBroadcaster, SmartTxEvent};
use crate::metrics::{processing_time_secs, MetricsEvent, MetricsSink};
use crate::store::{ChainId, RecordStore};

pub struct ConfirmationWorkflow {
    chain: Arc<dyn ChainQuery>,
    store: Arc<RecordStore>,
    events: Arc<EventBroadcaster>,
    metrics: Arc<dyn MetricsSink>,
}

fn hex_u256(value: U256) -> String {
    format!("0x{:x}", value)
}

impl ConfirmationWorkflow {
    pub fn new(
        chain: Arc<dyn ChainQuery>,
        store: Arc<RecordStore>,
        events: Arc<EventBroadcaster>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            chain,
            store,
            events,
            metrics,
        }
    }

    /// Try to confirm a mined record. Never fails; every finished attempt is
    /// announced with the record as stored afterwards.
    pub async fn confirm(&self, record: &SmartTransaction, chain: &ChainId) {
        if record.confirmed {
            return;
        }

        if let Err(e) = self.try_confirm(record, chain).await {
            log::error!(
                "[STX_CONFIRM] Confirmation of {} on {} failed: {}",
                record.uuid,
                chain,
                e
            );
            self.metrics.track(MetricsEvent::ConfirmationFailed {
                uuid: record.uuid.clone(),
                error: e.to_string(),
            });
        }

        let latest = self
            .store
            .get(chain, &record.uuid)
            .unwrap_or_else(|| record.clone());
        self.events
            .broadcast(SmartTxEvent::ConfirmationFinished(latest));
    }

    async fn try_confirm(&self, record: &SmartTransaction, chain: &ChainId) -> Result<()> {
        let Some(hash) = record.mined_hash() else {
            log::debug!("[STX_CONFIRM] {} has no mined hash yet", record.uuid);
            return Ok(());
        };

        let Some(receipt) = self.chain.get_transaction_receipt(chain, hash).await? else {
            log::debug!("[STX_CONFIRM] No receipt for {} yet", hash);
            return Ok(());
        };
        let Some(block_number) = receipt.block_number else {
            log::debug!("[STX_CONFIRM] Receipt for {} has no block number", hash);
            return Ok(());
        };

        let transaction = self.chain.get_transaction_by_hash(chain, hash).await?;
        let block = self.chain.get_block_by_number(chain, block_number).await?;

        self.metrics.track(MetricsEvent::Confirmed {
            uuid: record.uuid.clone(),
            status: record.status,
            processing_time_secs: processing_time_secs(
                record.time,
                Utc::now().timestamp_millis(),
            ),
            block_number: block_number.as_u64(),
            gas_used: receipt.gas_used.map(hex_u256),
            base_fee_per_gas: block.and_then(|b| b.base_fee_per_gas).map(hex_u256),
            max_fee_per_gas: transaction
                .as_ref()
                .and_then(|t| t.max_fee_per_gas)
                .map(hex_u256),
            max_priority_fee_per_gas: transaction
                .as_ref()
                .and_then(|t| t.max_priority_fee_per_gas)
                .map(hex_u256),
        });

        self.store
            .update_in_place(chain, &record.uuid, "confirmed", |current| {
                let mut next = current.clone();
                next.confirmed = true;
                if let Some(tx) = &transaction {
                    apply_fee_caps(&mut next, tx);
                }
                next
            });
        log::info!(
            "[STX_CONFIRM] {} confirmed in block {} on {}",
            record.uuid,
            block_number,
            chain
        );
        Ok(())
    }
}

/// Fee caps actually paid replace the submitted ones.
fn apply_fee_caps(record: &mut SmartTransaction, tx: &Transaction) {
    let params = record.tx_params.get_or_insert_with(Default::default);
    if let Some(max_fee) = tx.max_fee_per_gas {
        params.max_fee_per_gas = Some(hex_u256(max_fee));
    }
    if let Some(priority_fee) = tx.max_priority_fee_per_gas {
        params.max_priority_fee_per_gas = Some(hex_u256(priority_fee));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::tests::MockChain;
    use crate::metrics::tests::RecordingMetrics;
    use smart_tx_types::{SmartTransactionStatus, StatusMetadata, TxParams};

    struct Harness {
        workflow: ConfirmationWorkflow,
        store: Arc<RecordStore>,
        events: Arc<EventBroadcaster>,
        metrics: Arc<RecordingMetrics>,
    }

    fn harness(chain: MockChain) -> Harness {
        let store = Arc::new(RecordStore::new());
        let events = Arc::new(EventBroadcaster::new());
        let metrics = Arc::new(RecordingMetrics::default());
        Harness {
            workflow: ConfirmationWorkflow::new(
                Arc::new(chain),
                store.clone(),
                events.clone(),
                metrics.clone(),
            ),
            store,
            events,
            metrics,
        }
    }

    fn mainnet() -> ChainId {
        ChainId::parse("0x1").unwrap()
    }

    fn mined(hash: Option<&str>) -> SmartTransaction {
        SmartTransaction {
            uuid: "u1".to_string(),
            status: Some(SmartTransactionStatus::Success),
            status_metadata: Some(StatusMetadata {
                mined_hash: hash.map(str::to_string),
                ..Default::default()
            }),
            tx_params: Some(TxParams {
                nonce: Some("0x1".to_string()),
                max_fee_per_gas: Some("0x1".to_string()),
                ..Default::default()
            }),
            time: Some(Utc::now().timestamp_millis() - 2_000),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_receipt_with_block_confirms() {
        let h = harness(MockChain::with_receipt("0xabc", 123));
        let inserted = h.store.insert_new(&mainnet(), mined(Some("0xabc"))).unwrap();
        let (_, mut rx) = h.events.subscribe();

        h.workflow.confirm(&inserted.record, &mainnet()).await;

        let stored = h.store.get(&mainnet(), "u1").unwrap();
        assert!(stored.confirmed);
        assert_eq!(
            stored.tx_params.as_ref().unwrap().max_fee_per_gas.as_deref(),
            Some("0x6fc23ac00")
        );
        assert_eq!(stored.history.len(), 2);
        assert_eq!(stored.history[1].note.as_deref(), Some("confirmed"));
        assert_eq!(h.metrics.names(), vec!["STX Confirmed"]);

        match rx.recv().await.unwrap() {
            SmartTxEvent::ConfirmationFinished(record) => assert!(record.confirmed),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_hash_or_receipt_is_not_an_error() {
        let h = harness(MockChain::default());
        let no_hash = h.store.insert_new(&mainnet(), mined(None)).unwrap();
        let (_, mut rx) = h.events.subscribe();

        h.workflow.confirm(&no_hash.record, &mainnet()).await;
        assert!(!h.store.get(&mainnet(), "u1").unwrap().confirmed);
        assert!(h.metrics.0.lock().is_empty());
        assert!(matches!(
            rx.recv().await.unwrap(),
            SmartTxEvent::ConfirmationFinished(_)
        ));

        let mut with_hash = no_hash.record.clone();
        with_hash.status_metadata = mined(Some("0xdef")).status_metadata;
        h.workflow.confirm(&with_hash, &mainnet()).await;
        assert!(!h.store.get(&mainnet(), "u1").unwrap().confirmed);
        assert!(h.metrics.0.lock().is_empty());
    }

    #[tokio::test]
    async fn test_lookup_error_tracks_failure_and_still_notifies() {
        let h = harness(MockChain {
            fail_receipts: true,
            ..Default::default()
        });
        let inserted = h.store.insert_new(&mainnet(), mined(Some("0xabc"))).unwrap();
        let (_, mut rx) = h.events.subscribe();

        h.workflow.confirm(&inserted.record, &mainnet()).await;

        assert_eq!(h.metrics.names(), vec!["STX Confirmation Failed"]);
        assert!(!h.store.get(&mainnet(), "u1").unwrap().confirmed);
        assert!(matches!(
            rx.recv().await.unwrap(),
            SmartTxEvent::ConfirmationFinished(_)
        ));
    }

    #[tokio::test]
    async fn test_already_confirmed_is_skipped() {
        let chain = MockChain::with_receipt("0xabc", 1);
        let h = harness(chain);
        let mut record = mined(Some("0xabc"));
        record.confirmed = true;
        h.workflow.confirm(&record, &mainnet()).await;
        assert!(h.metrics.0.lock().is_empty());
        assert_eq!(h.events.client_count(), 0);
    }
}
