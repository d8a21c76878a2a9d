//! Chain-partitioned record store.
//!
//! The store is the only shared mutable state of the service. Each chain owns
//! an ordered list of records; every write is a single read → compute →
//! install step under the chain's map entry, and every install refreshes the
//! global pending count published on a watch channel.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use smart_tx_types::SmartTransaction;
use std::sync::Arc;
use tokio::sync::watch;

use crate::error::SmartTxError;
use crate::history;

/// Largest chain id accepted, in hex digits (fits a u64)
const MAX_CHAIN_ID_DIGITS: usize = 16;

/// Validated chain id used as the partition key.
///
/// Only `0x`-prefixed, non-zero hex values are accepted and they are kept in a
/// canonical lowercase form without leading zeros. Anything else (including
/// keys such as `__proto__` or `constructor`) never reaches the map.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChainId(String);

impl ChainId {
    pub fn parse(raw: &str) -> Result<Self, SmartTxError> {
        let trimmed = raw.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .ok_or_else(|| SmartTxError::InvalidChainId(raw.to_string()))?;
        let significant = digits.trim_start_matches('0');
        if digits.is_empty()
            || significant.is_empty()
            || significant.len() > MAX_CHAIN_ID_DIGITS
            || !digits.chars().all(|c| c.is_ascii_hexdigit())
        {
            return Err(SmartTxError::InvalidChainId(raw.to_string()));
        }
        Ok(Self(format!("0x{}", significant.to_ascii_lowercase())))
    }

    /// Parse a CAIP-2 `eip155:<decimal>` reference.
    pub fn from_caip2(raw: &str) -> Result<Self, SmartTxError> {
        let reference = raw
            .strip_prefix("eip155:")
            .ok_or_else(|| SmartTxError::InvalidChainId(raw.to_string()))?;
        match reference.parse::<u64>() {
            Ok(n) if n > 0 && reference.chars().all(|c| c.is_ascii_digit()) => {
                Ok(Self::from_decimal(n))
            }
            _ => Err(SmartTxError::InvalidChainId(raw.to_string())),
        }
    }

    pub fn from_decimal(id: u64) -> Self {
        Self(format!("{:#x}", id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn to_decimal(&self) -> u64 {
        // Bounded to 16 hex digits at parse time
        u64::from_str_radix(&self.0[2..], 16).unwrap_or_default()
    }
}

impl std::fmt::Display for ChainId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ChainId {
    type Err = SmartTxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ChainId {
    type Error = SmartTxError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ChainId> for String {
    fn from(id: ChainId) -> Self {
        id.0
    }
}

/// Receives a chain's full record list after every install
pub trait RecordSink: Send + Sync {
    fn save_chain(&self, chain: &ChainId, records: &[SmartTransaction]);
}

/// Result of adding a record seen for the first time
#[derive(Debug)]
pub struct Insertion {
    pub record: SmartTransaction,
    /// Cancelled record with the same nonce that was replaced
    pub superseded: Option<SmartTransaction>,
}

/// Previous and next state of a record updated in place
#[derive(Debug)]
pub struct Update {
    pub previous: SmartTransaction,
    pub current: SmartTransaction,
}

pub struct RecordStore {
    chains: DashMap<ChainId, Vec<SmartTransaction>>,
    pending: watch::Sender<usize>,
    sink: Option<Arc<dyn RecordSink>>,
}

impl RecordStore {
    pub fn new() -> Self {
        let (pending, _) = watch::channel(0);
        Self {
            chains: DashMap::new(),
            pending,
            sink: None,
        }
    }

    /// Create a store that hands every installed chain list to `sink`
    pub fn with_sink(sink: Arc<dyn RecordSink>) -> Self {
        let mut store = Self::new();
        store.sink = Some(sink);
        store
    }

    /// Seed a chain from persisted records without writing them back.
    pub fn restore(&self, chain: ChainId, records: Vec<SmartTransaction>) {
        log::info!(
            "[STX_STORE] Restored {} record(s) for chain {}",
            records.len(),
            chain
        );
        self.chains.insert(chain, records);
        self.publish_pending();
    }

    pub fn get(&self, chain: &ChainId, uuid: &str) -> Option<SmartTransaction> {
        self.chains
            .get(chain)
            .and_then(|records| records.iter().find(|r| r.uuid == uuid).cloned())
    }

    pub fn list(&self, chain: &ChainId) -> Vec<SmartTransaction> {
        self.chains
            .get(chain)
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    pub fn chains(&self) -> Vec<ChainId> {
        let mut chains: Vec<ChainId> = self.chains.iter().map(|e| e.key().clone()).collect();
        chains.sort();
        chains
    }

    pub fn pending_uuids(&self, chain: &ChainId) -> Vec<String> {
        self.chains
            .get(chain)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| r.is_pending())
                    .map(|r| r.uuid.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn chains_with_pending(&self) -> Vec<ChainId> {
        let mut chains: Vec<ChainId> = self
            .chains
            .iter()
            .filter(|e| e.value().iter().any(|r| r.is_pending()))
            .map(|e| e.key().clone())
            .collect();
        chains.sort();
        chains
    }

    pub fn pending_count(&self) -> usize {
        self.chains
            .iter()
            .map(|e| e.value().iter().filter(|r| r.is_pending()).count())
            .sum()
    }

    pub fn len(&self) -> usize {
        self.chains.iter().map(|e| e.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Watch the global pending count; updated after every install.
    pub fn subscribe_pending(&self) -> watch::Receiver<usize> {
        self.pending.subscribe()
    }

    /// Append a record seen for the first time.
    ///
    /// A record on the same chain with an equal nonce and a cancelled status is
    /// removed first. The new record starts its history with one full-snapshot
    /// entry. Returns `None` when the uuid is already present.
    pub fn insert_new(&self, chain: &ChainId, mut record: SmartTransaction) -> Option<Insertion> {
        let insertion = {
            let mut records = self.chains.entry(chain.clone()).or_default();
            if records.iter().any(|r| r.uuid == record.uuid) {
                return None;
            }

            let superseded = record.nonce().map(str::to_string).and_then(|nonce| {
                records
                    .iter()
                    .position(|r| {
                        r.nonce() == Some(nonce.as_str())
                            && r.status.map(|s| s.is_cancelled()).unwrap_or(false)
                    })
                    .map(|index| records.remove(index))
            });

            record.history = vec![history::initial_entry(&record, Some("created"))];
            records.push(record.clone());
            Insertion { record, superseded }
        };

        self.after_install(chain);
        Some(insertion)
    }

    /// Replace a record in place with `f(current)` and journal the change.
    ///
    /// `history` is carried over and `confirmed` can only go from false to true.
    /// An empty diff leaves the history untouched. Returns `None` when the uuid
    /// is not on this chain.
    pub fn update_in_place<F>(&self, chain: &ChainId, uuid: &str, note: &str, f: F) -> Option<Update>
    where
        F: FnOnce(&SmartTransaction) -> SmartTransaction,
    {
        let update = {
            let mut records = self.chains.get_mut(chain)?;
            let index = records.iter().position(|r| r.uuid == uuid)?;
            let previous = records[index].clone();

            let mut current = f(&previous);
            current.uuid = previous.uuid.clone();
            current.confirmed = previous.confirmed || current.confirmed;
            current.history = previous.history.clone();

            let entry = history::diff(
                &history::snapshot(&previous),
                &history::snapshot(&current),
                Some(note),
            );
            if !entry.operations.is_empty() {
                current.history.push(entry);
            }

            records[index] = current.clone();
            Update { previous, current }
        };

        self.after_install(chain);
        Some(update)
    }

    fn after_install(&self, chain: &ChainId) {
        self.publish_pending();
        if let Some(sink) = &self.sink {
            let records = self.list(chain);
            sink.save_chain(chain, &records);
        }
    }

    fn publish_pending(&self) {
        let count = self.pending_count();
        self.pending.send_if_modified(|current| {
            let changed = *current != count;
            *current = count;
            changed
        });
    }
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::new()
    }
}
