//! Per-chain feature flags.
//!
//! The flag document has a `default` entry plus overrides keyed by hex chain
//! id or CAIP-2 `eip155:<n>`. Bad overrides are dropped one by one; only a
//! bad `default` discards the document.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use smart_tx_types::{ClientId, SmartTransaction};
use std::collections::HashMap;
use std::sync::Arc;

use crate::external::ErrorReporter;
use crate::store::ChainId;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainFeatureFlags {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension_active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mobile_active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension_return_tx_hash_asap: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mobile_return_tx_hash_asap: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_deadline: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_deadline: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_status_polling_interval: Option<u64>,
}

impl ChainFeatureFlags {
    /// Fields set on `other` win; unset fields fall through to `self`.
    pub fn overlay(&self, other: &ChainFeatureFlags) -> ChainFeatureFlags {
        ChainFeatureFlags {
            extension_active: other.extension_active.or(self.extension_active),
            mobile_active: other.mobile_active.or(self.mobile_active),
            extension_return_tx_hash_asap: other
                .extension_return_tx_hash_asap
                .or(self.extension_return_tx_hash_asap),
            mobile_return_tx_hash_asap: other
                .mobile_return_tx_hash_asap
                .or(self.mobile_return_tx_hash_asap),
            expected_deadline: other.expected_deadline.or(self.expected_deadline),
            max_deadline: other.max_deadline.or(self.max_deadline),
            batch_status_polling_interval: other
                .batch_status_polling_interval
                .or(self.batch_status_polling_interval),
        }
    }

    pub fn return_tx_hash_asap(&self, client: ClientId) -> bool {
        match client {
            ClientId::Extension => self.extension_return_tx_hash_asap,
            ClientId::Mobile => self.mobile_return_tx_hash_asap,
        }
        .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureFlags {
    pub default: ChainFeatureFlags,
    pub chains: HashMap<ChainId, ChainFeatureFlags>,
}

#[derive(Debug, Clone, Default)]
pub struct FlagValidation {
    pub flags: FeatureFlags,
    pub errors: Vec<String>,
}

impl FeatureFlags {
    pub fn parse(raw: &Value) -> FlagValidation {
        let mut errors = Vec::new();
        let Some(entries) = raw.as_object() else {
            errors.push("Feature flags must be an object".to_string());
            return FlagValidation { flags: FeatureFlags::default(), errors };
        };

        let default = match entries
            .get("default")
            .map(|v| serde_json::from_value::<ChainFeatureFlags>(v.clone()))
        {
            Some(Ok(default)) => default,
            Some(Err(e)) => {
                errors.push(format!("Invalid default feature flags: {}", e));
                return FlagValidation { flags: FeatureFlags::default(), errors };
            }
            None => {
                errors.push("Feature flags are missing 'default'".to_string());
                return FlagValidation { flags: FeatureFlags::default(), errors };
            }
        };

        let mut chains = HashMap::new();
        for (key, value) in entries.iter().filter(|(k, _)| k.as_str() != "default") {
            let chain = match parse_chain_key(key) {
                Some(chain) => chain,
                None => {
                    errors.push(format!("Invalid chain key '{}' in feature flags", key));
                    continue;
                }
            };
            match serde_json::from_value::<ChainFeatureFlags>(value.clone()) {
                Ok(flags) => {
                    chains.insert(chain, flags);
                }
                Err(e) => errors.push(format!("Invalid feature flags for '{}': {}", key, e)),
            }
        }

        FlagValidation { flags: FeatureFlags { default, chains }, errors }
    }

    /// Default merged with the chain's override, if any
    pub fn for_chain(&self, chain: &ChainId) -> ChainFeatureFlags {
        match self.chains.get(chain) {
            Some(overrides) => self.default.overlay(overrides),
            None => self.default.clone(),
        }
    }
}

fn parse_chain_key(key: &str) -> Option<ChainId> {
    if key.starts_with("eip155:") {
        ChainId::from_caip2(key).ok()
    } else {
        ChainId::parse(key).ok()
    }
}

/// Decides whether failures are propagated to linked regular transactions
pub struct FeatureFlagGate {
    flags: RwLock<FeatureFlags>,
    client_id: ClientId,
    reporter: Arc<dyn ErrorReporter>,
}

impl FeatureFlagGate {
    pub fn new(client_id: ClientId, reporter: Arc<dyn ErrorReporter>) -> Self {
        Self {
            flags: RwLock::new(FeatureFlags::default()),
            client_id,
            reporter,
        }
    }

    /// Validate and install a flag document, reporting every dropped entry.
    pub fn load(&self, raw: &Value) {
        let FlagValidation { flags, errors } = FeatureFlags::parse(raw);
        for error in &errors {
            self.reporter.capture(error);
        }
        log::info!(
            "[STX_FLAGS] Loaded feature flags: {} chain override(s), {} error(s)",
            flags.chains.len(),
            errors.len()
        );
        *self.flags.write() = flags;
    }

    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    pub fn for_chain(&self, chain: &ChainId) -> ChainFeatureFlags {
        self.flags.read().for_chain(chain)
    }

    pub fn should_mark_regular_transaction_failed(
        &self,
        record: &SmartTransaction,
        chain: &ChainId,
    ) -> bool {
        if record.transaction_id.is_none() {
            return false;
        }
        if !record.status.map(|s| s.is_failure()).unwrap_or(false) {
            return false;
        }
        self.for_chain(chain).return_tx_hash_asap(self.client_id)
    }
}
