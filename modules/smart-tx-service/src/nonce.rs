//! Nonce allocation during submission.
//!
//! A [`NonceLock`] holds the per-address lock until it is released or
//! dropped, so every exit path of a submission gives the lock back exactly
//! once.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::json;
use smart_tx_types::NonceDetails;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::chain::ChainQuery;
use crate::error::{Result, SmartTxError};
use crate::store::ChainId;

pub struct NonceLock {
    pub next_nonce: u64,
    pub nonce_details: NonceDetails,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl NonceLock {
    pub fn new(
        next_nonce: u64,
        nonce_details: NonceDetails,
        release: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            next_nonce,
            nonce_details,
            release: Some(Box::new(release)),
        }
    }

    pub fn release(mut self) {
        self.run_release();
    }

    fn run_release(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for NonceLock {
    fn drop(&mut self) {
        self.run_release();
    }
}

impl std::fmt::Debug for NonceLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NonceLock")
            .field("next_nonce", &self.next_nonce)
            .field("released", &self.release.is_none())
            .finish()
    }
}

#[async_trait]
pub trait NonceCoordinator: Send + Sync {
    async fn acquire(&self, address: &str, network_client_id: &str) -> Result<NonceLock>;
}

/// Acquire a lock, run `f` with the allocated nonce, release on every path.
pub async fn with_nonce_lock<T, F, Fut>(
    coordinator: &dyn NonceCoordinator,
    address: &str,
    network_client_id: &str,
    f: F,
) -> Result<T>
where
    F: FnOnce(u64, NonceDetails) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let lock = coordinator.acquire(address, network_client_id).await?;
    let result = f(lock.next_nonce, lock.nonce_details.clone()).await;
    lock.release();
    result
}

pub fn to_hex_nonce(nonce: u64) -> String {
    format!("{:#x}", nonce)
}

/// `"0x5"` → `"0x6"`
pub fn increment_hex_nonce(nonce: &str) -> Result<String> {
    let digits = nonce.strip_prefix("0x").unwrap_or(nonce);
    let value = u64::from_str_radix(digits, 16)
        .map_err(|e| SmartTxError::InvalidRequest(format!("Invalid nonce {}: {}", nonce, e)))?;
    Ok(to_hex_nonce(value + 1))
}

/// Serializes allocations per address and reads the pending count from chain.
///
/// `network_client_id` names the chain whose node is asked.
pub struct ChainNonceCoordinator {
    chain: Arc<dyn ChainQuery>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ChainNonceCoordinator {
    pub fn new(chain: Arc<dyn ChainQuery>) -> Self {
        Self {
            chain,
            locks: DashMap::new(),
        }
    }
}

#[async_trait]
impl NonceCoordinator for ChainNonceCoordinator {
    async fn acquire(&self, address: &str, network_client_id: &str) -> Result<NonceLock> {
        let chain = ChainId::parse(network_client_id)?;
        let key = address.to_lowercase();
        let mutex = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = mutex.lock_owned().await;
        log::debug!("[STX_NONCE] Acquired nonce lock for {}", key);

        let network = self
            .chain
            .get_transaction_count(&chain, address)
            .await
            .map_err(|e| SmartTxError::NonceLock(e.to_string()))?;
        let next_nonce = network.as_u64();

        let details = NonceDetails {
            params: Some(json!({"highestLocallyConfirmed": null, "nextNetworkNonce": next_nonce})),
            local: None,
            network: Some(json!({"name": "network", "nonce": next_nonce})),
        };

        Ok(NonceLock::new(next_nonce, details, move || {
            drop(guard);
            log::debug!("[STX_NONCE] Released nonce lock for {}", key);
        }))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::chain::tests::MockChain;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts acquisitions and releases; hands out consecutive nonces
    #[derive(Default)]
    pub(crate) struct CountingNonces {
        pub next: AtomicUsize,
        pub acquired: Arc<AtomicUsize>,
        pub released: Arc<AtomicUsize>,
        pub fail: bool,
    }

    impl CountingNonces {
        pub fn starting_at(nonce: usize) -> Self {
            let nonces = Self::default();
            nonces.next.store(nonce, Ordering::SeqCst);
            nonces
        }
    }

    #[async_trait]
    impl NonceCoordinator for CountingNonces {
        async fn acquire(&self, _address: &str, _network_client_id: &str) -> Result<NonceLock> {
            if self.fail {
                return Err(SmartTxError::NonceLock("lock unavailable".to_string()));
            }
            self.acquired.fetch_add(1, Ordering::SeqCst);
            let released = self.released.clone();
            let nonce = self.next.load(Ordering::SeqCst) as u64;
            Ok(NonceLock::new(nonce, NonceDetails::default(), move || {
                released.fetch_add(1, Ordering::SeqCst);
            }))
        }
    }

    #[test]
    fn test_hex_nonce_helpers() {
        assert_eq!(to_hex_nonce(5), "0x5");
        assert_eq!(increment_hex_nonce("0x5").unwrap(), "0x6");
        assert_eq!(increment_hex_nonce("0xf").unwrap(), "0x10");
        assert!(increment_hex_nonce("0xzz").is_err());
    }

    #[test]
    fn test_release_runs_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let lock = NonceLock::new(1, NonceDetails::default(), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        lock.release();
        assert_eq!(count.load(Ordering::SeqCst), 1);

        let counter = count.clone();
        drop(NonceLock::new(2, NonceDetails::default(), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_scoped_lock_released_on_error() {
        let nonces = CountingNonces::starting_at(7);
        let result: Result<()> = with_nonce_lock(&nonces, "0xabc", "0x1", |nonce, _| async move {
            assert_eq!(nonce, 7);
            Err(SmartTxError::InvalidRequest("boom".to_string()))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(nonces.acquired.load(Ordering::SeqCst), 1);
        assert_eq!(nonces.released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_chain_coordinator_serializes_per_address() {
        let chain = Arc::new(MockChain {
            nonce: 9,
            ..Default::default()
        });
        let coordinator = Arc::new(ChainNonceCoordinator::new(chain));
        let address = "0x0000000000000000000000000000000000000001";

        let first = coordinator.acquire(address, "0x1").await.unwrap();
        assert_eq!(first.next_nonce, 9);

        let waiting = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.acquire(address, "0x1").await.map(|l| l.next_nonce) })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!waiting.is_finished());

        first.release();
        assert_eq!(waiting.await.unwrap().unwrap(), 9);
    }

    #[tokio::test]
    async fn test_chain_coordinator_rejects_bad_network() {
        let coordinator = ChainNonceCoordinator::new(Arc::new(MockChain::default()));
        assert!(coordinator.acquire("0xabc", "mainnet").await.is_err());
    }
}
