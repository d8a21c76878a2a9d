//! Service configuration from environment variables.

use serde_json::Value;
use smart_tx_types::ClientId;
use std::collections::HashMap;
use std::time::Duration;

use crate::store::ChainId;

pub const DEFAULT_PORT: u16 = 9103;
pub const DEFAULT_DB_PATH: &str = "./smart_tx.db";
pub const DEFAULT_RELAY_URL: &str = "https://transaction.api.cx.metamask.io";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5_000;
pub const DEFAULT_SUPPORTED_CHAINS: &str = "0x1,0xaa36a7";

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub port: u16,
    pub db_path: String,
    pub relay_url: String,
    pub client_id: ClientId,
    pub poll_interval: Duration,
    pub supported_chains: Vec<ChainId>,
    pub rpc_urls: HashMap<ChainId, String>,
    pub feature_flags: Option<Value>,
    /// Regular transaction service that failures propagate to
    pub transactions_url: Option<String>,
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; malformed values fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = parse_or("SMART_TX_PORT", lookup("SMART_TX_PORT"), DEFAULT_PORT);
        let poll_interval_ms = parse_or(
            "SMART_TX_POLL_INTERVAL_MS",
            lookup("SMART_TX_POLL_INTERVAL_MS"),
            DEFAULT_POLL_INTERVAL_MS,
        )
        .max(1);

        let client_id = match lookup("SMART_TX_CLIENT_ID") {
            Some(raw) => raw.parse::<ClientId>().unwrap_or_else(|e| {
                log::warn!("[STX_CONFIG] {}, using extension", e);
                ClientId::Extension
            }),
            None => ClientId::Extension,
        };

        let supported_chains = parse_chain_list(
            &lookup("SMART_TX_SUPPORTED_CHAINS").unwrap_or_else(|| DEFAULT_SUPPORTED_CHAINS.to_string()),
        );

        let feature_flags = lookup("SMART_TX_FEATURE_FLAGS").and_then(|raw| {
            serde_json::from_str(&raw)
                .map_err(|e| log::warn!("[STX_CONFIG] Ignoring SMART_TX_FEATURE_FLAGS: {}", e))
                .ok()
        });

        Self {
            port,
            db_path: lookup("SMART_TX_DB_PATH").unwrap_or_else(|| DEFAULT_DB_PATH.to_string()),
            relay_url: lookup("SMART_TX_RELAY_URL").unwrap_or_else(|| DEFAULT_RELAY_URL.to_string()),
            client_id,
            poll_interval: Duration::from_millis(poll_interval_ms),
            supported_chains,
            rpc_urls: parse_rpc_urls(&lookup("SMART_TX_RPC_URLS").unwrap_or_default()),
            feature_flags,
            transactions_url: lookup("SMART_TX_TRANSACTIONS_URL")
                .map(|url| url.trim().to_string())
                .filter(|url| !url.is_empty()),
        }
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, raw: Option<String>, default: T) -> T {
    match raw {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            log::warn!("[STX_CONFIG] Invalid {}='{}', using default", key, raw);
            default
        }),
        None => default,
    }
}

fn parse_chain_list(raw: &str) -> Vec<ChainId> {
    let mut chains = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match ChainId::parse(part) {
            Ok(chain) if !chains.contains(&chain) => chains.push(chain),
            Ok(_) => {}
            Err(e) => log::warn!("[STX_CONFIG] Ignoring supported chain: {}", e),
        }
    }
    chains
}

/// `0x1=https://a,0xaa36a7=https://b`
fn parse_rpc_urls(raw: &str) -> HashMap<ChainId, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .filter_map(|pair| {
            let Some((chain, url)) = pair.split_once('=') else {
                log::warn!("[STX_CONFIG] Ignoring RPC entry '{}'", pair);
                return None;
            };
            match ChainId::parse(chain) {
                Ok(chain) => Some((chain, url.trim().to_string())),
                Err(e) => {
                    log::warn!("[STX_CONFIG] Ignoring RPC entry: {}", e);
                    None
                }
            }
        })
        .collect()
}
