//! HTTP client for the transaction relay.
//!
//! Every endpoint is scoped to a network by decimal chain id and carries the
//! client identifier header. Non-2xx responses become [`SmartTxError::Relay`]
//! with the error body's keys camel-cased.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use smart_tx_types::{BatchStatusEntry, ClientId, Fees, TxFees, TxParams};

use crate::error::{Result, SmartTxError};
use crate::store::ChainId;

const CLIENT_ID_HEADER: &str = "X-Client-Id";

#[async_trait]
pub trait RelayApi: Send + Sync {
    /// Returns the relay-assigned uuid
    async fn submit_transactions(
        &self,
        chain: &ChainId,
        raw_txs: &[String],
        raw_cancel_txs: &[String],
    ) -> Result<String>;

    async fn get_fees(
        &self,
        chain: &ChainId,
        trade_tx: &TxParams,
        approval_tx: Option<&TxParams>,
    ) -> Result<Fees>;

    async fn cancel(&self, chain: &ChainId, uuid: &str) -> Result<()>;

    /// Status entries in the order the relay returned them
    async fn batch_status(
        &self,
        chain: &ChainId,
        uuids: &[String],
    ) -> Result<Vec<(String, BatchStatusEntry)>>;

    async fn liveness(&self, chain: &ChainId) -> Result<bool>;
}

pub struct HttpRelayApi {
    client: reqwest::Client,
    base_url: String,
    client_id: ClientId,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    uuid: String,
}

#[derive(Debug, Deserialize)]
struct FeesResponse {
    #[serde(default)]
    txs: Vec<TxFees>,
}

impl HttpRelayApi {
    pub fn new(base_url: &str, client_id: ClientId) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            client_id,
        }
    }

    fn url(&self, chain: &ChainId, endpoint: &str) -> String {
        format!(
            "{}/networks/{}/{}",
            self.base_url,
            chain.to_decimal(),
            endpoint
        )
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value> {
        let response = request
            .header(CLIENT_ID_HEADER, self.client_id.as_str())
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let parsed = serde_json::from_str::<Value>(&body).unwrap_or(Value::String(body));
            return Err(SmartTxError::Relay {
                status: status.as_u16(),
                body: camelize_keys(parsed),
            });
        }
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl RelayApi for HttpRelayApi {
    async fn submit_transactions(
        &self,
        chain: &ChainId,
        raw_txs: &[String],
        raw_cancel_txs: &[String],
    ) -> Result<String> {
        let request = self
            .client
            .post(self.url(chain, "submitTransactions"))
            .json(&json!({"rawTxs": raw_txs, "rawCancelTxs": raw_cancel_txs}));
        let response: SubmitResponse = serde_json::from_value(self.send(request).await?)?;
        log::info!(
            "[STX_RELAY] Submitted {} tx(s) on {}: {}",
            raw_txs.len(),
            chain,
            response.uuid
        );
        Ok(response.uuid)
    }

    async fn get_fees(
        &self,
        chain: &ChainId,
        trade_tx: &TxParams,
        approval_tx: Option<&TxParams>,
    ) -> Result<Fees> {
        let txs: Vec<&TxParams> = approval_tx.into_iter().chain(Some(trade_tx)).collect();
        let request = self
            .client
            .post(self.url(chain, "getFees"))
            .json(&json!({"txs": txs}));
        let response: FeesResponse = serde_json::from_value(self.send(request).await?)?;
        Ok(split_fees(response.txs, approval_tx.is_some()))
    }

    async fn cancel(&self, chain: &ChainId, uuid: &str) -> Result<()> {
        let request = self
            .client
            .post(self.url(chain, "cancel"))
            .json(&json!({"uuid": uuid}));
        self.send(request).await?;
        log::info!("[STX_RELAY] Cancel requested for {} on {}", uuid, chain);
        Ok(())
    }

    async fn batch_status(
        &self,
        chain: &ChainId,
        uuids: &[String],
    ) -> Result<Vec<(String, BatchStatusEntry)>> {
        let request = self
            .client
            .get(self.url(chain, "batchStatus"))
            .query(&[("uuids", uuids.join(","))]);
        let body = self.send(request).await?;
        Ok(parse_batch_status(body))
    }

    async fn liveness(&self, chain: &ChainId) -> Result<bool> {
        let body = self.send(self.client.get(self.url(chain, "health"))).await?;
        Ok(body
            .get("smartTransactions")
            .and_then(Value::as_bool)
            .unwrap_or(true))
    }
}

/// The relay answers in request order: approval first when present, trade last
fn split_fees(mut txs: Vec<TxFees>, with_approval: bool) -> Fees {
    let trade_tx_fees = txs.pop();
    let approval_tx_fees = if with_approval { txs.pop() } else { None };
    Fees {
        trade_tx_fees,
        approval_tx_fees,
    }
}

/// Decode a `uuid → entry` object, keeping relay order and skipping malformed entries.
pub fn parse_batch_status(body: Value) -> Vec<(String, BatchStatusEntry)> {
    let Value::Object(entries) = body else {
        log::warn!("[STX_RELAY] Batch status response is not an object");
        return Vec::new();
    };
    entries
        .into_iter()
        .filter_map(|(uuid, raw)| match serde_json::from_value(raw) {
            Ok(entry) => Some((uuid, entry)),
            Err(e) => {
                log::warn!("[STX_RELAY] Skipping malformed status for {}: {}", uuid, e);
                None
            }
        })
        .collect()
}

/// Recursively rewrite object keys from snake_case to camelCase.
pub fn camelize_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (camelize(&k), camelize_keys(v)))
                .collect::<Map<String, Value>>(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(camelize_keys).collect()),
        other => other,
    }
}

fn camelize(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper = false;
    for c in key.chars() {
        if c == '_' && !out.is_empty() {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::Notify;

    /// Scripted relay for engine tests
    #[derive(Default)]
    pub(crate) struct MockRelay {
        pub next_uuid: Mutex<Option<String>>,
        pub statuses: Mutex<HashMap<String, Vec<(String, BatchStatusEntry)>>>,
        pub fail_status: bool,
        pub fail_submit: bool,
        pub submitted: Mutex<Vec<Vec<String>>>,
        pub status_requests: Mutex<Vec<(String, Vec<String>)>>,
        pub cancelled: Mutex<Vec<String>>,
        pub fee_requests: Mutex<Vec<(TxParams, Option<TxParams>)>>,
        pub live: bool,
        /// Batch-status requests for a gated chain stall until notified
        pub gates: Mutex<HashMap<String, Arc<Notify>>>,
    }

    impl MockRelay {
        pub fn gate(&self, chain: &str) -> Arc<Notify> {
            self.gates
                .lock()
                .entry(chain.to_string())
                .or_default()
                .clone()
        }

        pub fn set_status(&self, chain: &str, uuid: &str, entry: Value) {
            let entry: BatchStatusEntry = serde_json::from_value(entry).unwrap();
            let mut statuses = self.statuses.lock();
            let list = statuses.entry(chain.to_string()).or_default();
            list.retain(|(u, _)| u != uuid);
            list.push((uuid.to_string(), entry));
        }
    }

    #[async_trait]
    impl RelayApi for MockRelay {
        async fn submit_transactions(
            &self,
            _chain: &ChainId,
            raw_txs: &[String],
            _raw_cancel_txs: &[String],
        ) -> Result<String> {
            if self.fail_submit {
                return Err(SmartTxError::Relay {
                    status: 400,
                    body: json!({"errorCode": "bad_tx"}),
                });
            }
            self.submitted.lock().push(raw_txs.to_vec());
            Ok(self
                .next_uuid
                .lock()
                .clone()
                .unwrap_or_else(|| "uuid-1".to_string()))
        }

        async fn get_fees(
            &self,
            _chain: &ChainId,
            trade_tx: &TxParams,
            approval_tx: Option<&TxParams>,
        ) -> Result<Fees> {
            self.fee_requests
                .lock()
                .push((trade_tx.clone(), approval_tx.cloned()));
            Ok(Fees {
                trade_tx_fees: Some(TxFees::default()),
                approval_tx_fees: approval_tx.map(|_| TxFees::default()),
            })
        }

        async fn cancel(&self, _chain: &ChainId, uuid: &str) -> Result<()> {
            self.cancelled.lock().push(uuid.to_string());
            Ok(())
        }

        async fn batch_status(
            &self,
            chain: &ChainId,
            uuids: &[String],
        ) -> Result<Vec<(String, BatchStatusEntry)>> {
            self.status_requests
                .lock()
                .push((chain.to_string(), uuids.to_vec()));
            let gate = self.gates.lock().get(chain.as_str()).cloned();
            if let Some(gate) = gate {
                gate.notified().await;
            }
            if self.fail_status {
                return Err(SmartTxError::Relay {
                    status: 503,
                    body: json!({"error": "unavailable"}),
                });
            }
            Ok(self
                .statuses
                .lock()
                .get(chain.as_str())
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .filter(|(uuid, _)| uuids.contains(uuid))
                .collect())
        }

        async fn liveness(&self, _chain: &ChainId) -> Result<bool> {
            Ok(self.live)
        }
    }

    #[test]
    fn test_camelize_nested_keys() {
        let body = camelize_keys(json!({
            "error_code": "invalid_nonce",
            "error_details": [{"expected_nonce": 5}],
            "message": "x"
        }));
        assert_eq!(
            body,
            json!({
                "errorCode": "invalid_nonce",
                "errorDetails": [{"expectedNonce": 5}],
                "message": "x"
            })
        );
        assert_eq!(camelize("_private_key"), "_privateKey");
    }

    #[test]
    fn test_batch_status_keeps_relay_order_and_skips_malformed() {
        let entries = parse_batch_status(json!({
            "c": {"minedTx": "success"},
            "a": "uuid_not_found",
            "b": 42,
            "d": {"minedTx": "not_mined"}
        }));
        let uuids: Vec<&str> = entries.iter().map(|(u, _)| u.as_str()).collect();
        assert_eq!(uuids, vec!["c", "a", "d"]);
        assert!(entries[1].1.is_uuid_not_found());
        assert!(parse_batch_status(json!([1, 2])).is_empty());
    }

    #[test]
    fn test_split_fees_assigns_positions() {
        let fees = |n| TxFees { fee_estimate: Some(n), ..Default::default() };
        let both = split_fees(vec![fees(1), fees(2)], true);
        assert_eq!(both.approval_tx_fees.unwrap().fee_estimate, Some(1));
        assert_eq!(both.trade_tx_fees.unwrap().fee_estimate, Some(2));

        let trade_only = split_fees(vec![fees(3)], false);
        assert!(trade_only.approval_tx_fees.is_none());
        assert_eq!(trade_only.trade_tx_fees.unwrap().fee_estimate, Some(3));
    }

    #[test]
    fn test_urls_use_decimal_chain_id() {
        let relay = HttpRelayApi::new("https://relay.example/", ClientId::Extension);
        let chain = ChainId::parse("0xaa36a7").unwrap();
        assert_eq!(
            relay.url(&chain, "batchStatus"),
            "https://relay.example/networks/11155111/batchStatus"
        );
    }
}
