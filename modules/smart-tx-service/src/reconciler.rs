//! Merges submissions and relay status reports into the record store.

use chrono::Utc;
use smart_tx_types::{SmartTransaction, SmartTransactionStatus, SmartTransactionUpdate};
use std::sync::Arc;

use crate::chain::ChainQuery;
use crate::confirmation::ConfirmationWorkflow;
use crate::error::Result;
use crate::events::{EventBroadcaster, SmartTxEvent};
use crate::external::{mark_linked_transaction_failed, TransactionSubsystem};
use crate::feature_flags::FeatureFlagGate;
use crate::metrics::{processing_time_secs, MetricsEvent, MetricsSink};
use crate::relay_api::RelayApi;
use crate::status_mapper;
use crate::store::{ChainId, RecordStore};

pub struct StatusReconciler {
    store: Arc<RecordStore>,
    events: Arc<EventBroadcaster>,
    metrics: Arc<dyn MetricsSink>,
    confirmation: ConfirmationWorkflow,
    flags: Arc<FeatureFlagGate>,
    transactions: Option<Arc<dyn TransactionSubsystem>>,
    relay: Arc<dyn RelayApi>,
}

impl StatusReconciler {
    pub fn new(
        store: Arc<RecordStore>,
        events: Arc<EventBroadcaster>,
        metrics: Arc<dyn MetricsSink>,
        flags: Arc<FeatureFlagGate>,
        relay: Arc<dyn RelayApi>,
        chain: Arc<dyn ChainQuery>,
    ) -> Self {
        let confirmation =
            ConfirmationWorkflow::new(chain, store.clone(), events.clone(), metrics.clone());
        Self {
            store,
            events,
            metrics,
            confirmation,
            flags,
            transactions: None,
            relay,
        }
    }

    /// Link the regular transaction subsystem that failures propagate to.
    pub fn with_transaction_subsystem(mut self, transactions: Arc<dyn TransactionSubsystem>) -> Self {
        self.transactions = Some(transactions);
        self
    }

    pub fn store(&self) -> &Arc<RecordStore> {
        &self.store
    }

    pub fn events(&self) -> &Arc<EventBroadcaster> {
        &self.events
    }

    pub fn flags(&self) -> &Arc<FeatureFlagGate> {
        &self.flags
    }

    /// Reconcile against a raw chain id; malformed ids are skipped.
    pub async fn reconcile(&self, incoming: SmartTransactionUpdate, chain_id: &str) {
        match ChainId::parse(chain_id) {
            Ok(chain) => self.reconcile_on(incoming, &chain).await,
            Err(e) => log::warn!(
                "[STX_RECONCILER] Skipping {} for unsafe chain key: {}",
                incoming.uuid,
                e
            ),
        }
    }

    pub async fn reconcile_on(&self, mut incoming: SmartTransactionUpdate, chain: &ChainId) {
        // Records never move between chains
        incoming.chain_id = None;

        if self.store.get(chain, &incoming.uuid).is_none() {
            let mut record = SmartTransaction::from_update(incoming.clone());
            record.chain_id = Some(chain.to_string());
            if let Some(insertion) = self.store.insert_new(chain, record) {
                if let Some(superseded) = insertion.superseded {
                    log::info!(
                        "[STX_RECONCILER] {} supersedes cancelled {} (nonce {})",
                        insertion.record.uuid,
                        superseded.uuid,
                        superseded.nonce().unwrap_or("?")
                    );
                }
                log::info!(
                    "[STX_RECONCILER] Tracking new smart transaction {} on {}",
                    insertion.record.uuid,
                    chain
                );
                return;
            }
        }

        self.apply_update(incoming, chain).await;
    }

    async fn apply_update(&self, incoming: SmartTransactionUpdate, chain: &ChainId) {
        let note = match incoming.status {
            Some(status) => format!("status update: {}", status),
            None => "update".to_string(),
        };
        let Some(update) = self
            .store
            .update_in_place(chain, &incoming.uuid, &note, |current| current.merge(&incoming))
        else {
            return;
        };
        let record = update.current;

        self.events
            .broadcast(SmartTxEvent::StatusChanged(record.clone()));

        if update.previous.status != record.status {
            if let Some(status) = record.status {
                self.track_status(&record, status);
            }
        }

        let Some(status) = record.status else {
            return;
        };
        if status.is_mined() && !record.confirmed {
            self.confirmation.confirm(&record, chain).await;
        } else if status.is_failure() {
            self.propagate_failure(&record, chain).await;
        }
    }

    fn track_status(&self, record: &SmartTransaction, status: SmartTransactionStatus) {
        log::info!(
            "[STX_RECONCILER] {} on {} is now {}",
            record.uuid,
            record.chain_id.as_deref().unwrap_or("?"),
            status
        );
        self.metrics.track(MetricsEvent::StatusUpdated {
            uuid: record.uuid.clone(),
            status,
            processing_time_secs: processing_time_secs(
                record.time,
                Utc::now().timestamp_millis(),
            ),
            kind: record.kind.clone(),
        });
    }

    async fn propagate_failure(&self, record: &SmartTransaction, chain: &ChainId) {
        let Some(transactions) = &self.transactions else {
            return;
        };
        if self.flags.should_mark_regular_transaction_failed(record, chain) {
            mark_linked_transaction_failed(transactions.as_ref(), record).await;
        }
    }

    /// Ask the relay for `uuids` on `chain` and fold the answers in relay order.
    pub async fn fetch_statuses(&self, chain: &ChainId, uuids: &[String]) -> Result<usize> {
        let entries = self.relay.batch_status(chain, uuids).await?;
        let count = entries.len();
        for (uuid, entry) in entries {
            let mapped = status_mapper::map_entry(&entry);
            let update = SmartTransactionUpdate {
                uuid,
                status: Some(mapped.status),
                status_metadata: mapped.metadata,
                cancellable: Some(mapped.cancellable),
                ..Default::default()
            };
            self.reconcile_on(update, chain).await;
        }
        Ok(count)
    }

    /// Refresh every pending record of one chain. Failures are logged and
    /// retried on the next tick.
    pub async fn refresh_chain(&self, chain: &ChainId) {
        let uuids = self.store.pending_uuids(chain);
        if uuids.is_empty() {
            return;
        }
        log::debug!(
            "[STX_RECONCILER] Fetching {} pending status(es) on {}",
            uuids.len(),
            chain
        );
        if let Err(e) = self.fetch_statuses(chain, &uuids).await {
            log::warn!("[STX_RECONCILER] Status fetch failed on {}: {}", chain, e);
        }
    }

    pub fn get_transaction(&self, chain: &ChainId, uuid: &str) -> Option<SmartTransaction> {
        self.store.get(chain, uuid)
    }

    /// Records of a chain, optionally narrowed to a sender and a status
    pub fn get_transactions(
        &self,
        chain: &ChainId,
        address: Option<&str>,
        status: Option<SmartTransactionStatus>,
    ) -> Vec<SmartTransaction> {
        self.store
            .list(chain)
            .into_iter()
            .filter(|r| {
                address.is_none_or(|a| {
                    r.from_address()
                        .is_some_and(|from| from.eq_ignore_ascii_case(a))
                })
            })
            .filter(|r| status.is_none_or(|s| r.status == Some(s)))
            .collect()
    }
}
