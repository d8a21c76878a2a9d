//! Status polling.
//!
//! One scheduler owns every polling subscription. A subscription is a
//! cancellable loop over a chain set (or over whichever chains have pending
//! work). The scheduler keeps an automatic subscription alive exactly while
//! the store has pending records, re-checking on every store install.
//!
//! A chain's `batchStatusPollingInterval` flag stretches its own polling
//! interval beyond the tick; it never polls faster than the tick.

use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::reconciler::StatusReconciler;
use crate::store::ChainId;

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub interval: Duration,
    /// Chains served by the relay; everything else is never queried
    pub supported_chains: Vec<ChainId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollingState {
    Idle,
    Active,
}

struct Subscription {
    /// `None` follows whichever chains have pending records
    chains: Option<Vec<ChainId>>,
    cancel: CancellationToken,
}

pub struct PollingScheduler {
    reconciler: Arc<StatusReconciler>,
    config: PollerConfig,
    subscriptions: DashMap<String, Subscription>,
    auto_token: Mutex<Option<String>>,
    in_flight: Arc<DashSet<ChainId>>,
    last_polled: DashMap<ChainId, Instant>,
    state_tx: watch::Sender<PollingState>,
    shutdown: CancellationToken,
}

impl PollingScheduler {
    pub fn new(reconciler: Arc<StatusReconciler>, config: PollerConfig) -> Self {
        let (state_tx, _) = watch::channel(PollingState::Idle);
        Self {
            reconciler,
            config,
            subscriptions: DashMap::new(),
            auto_token: Mutex::new(None),
            in_flight: Arc::new(DashSet::new()),
            last_polled: DashMap::new(),
            state_tx,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    pub fn is_supported(&self, chain: &ChainId) -> bool {
        self.config.supported_chains.contains(chain)
    }

    /// Follow the store's pending count until shutdown.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let scheduler = Arc::clone(self);
        let mut pending = self.reconciler.store().subscribe_pending();

        tokio::spawn(async move {
            log::info!(
                "[STX_POLLER] Started (interval {:?}, chains {:?})",
                scheduler.config.interval,
                scheduler.config.supported_chains
            );
            loop {
                let count = *pending.borrow_and_update();
                scheduler.check_poll(count);

                tokio::select! {
                    _ = scheduler.shutdown.cancelled() => break,
                    changed = pending.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
            scheduler.stop_all();
            log::info!("[STX_POLLER] Supervisor stopped");
        })
    }

    /// Start or stop the automatic subscription for the given pending count.
    pub fn check_poll(self: &Arc<Self>, pending: usize) {
        let mut auto = self.auto_token.lock();
        if pending > 0 && auto.is_none() {
            log::info!("[STX_POLLER] {} pending transaction(s), polling", pending);
            *auto = self.start_polling_by_chains(None);
        } else if pending == 0 {
            if let Some(token) = auto.take() {
                drop(auto);
                log::info!("[STX_POLLER] No pending transactions, going idle");
                self.stop_subscription(&token);
            }
        }
    }

    /// Poll `chains` (or every chain with pending work when `None`) until the
    /// returned token is stopped. Unsupported chains are dropped up front;
    /// returns `None` if nothing is left to poll.
    pub fn start_polling_by_chains(self: &Arc<Self>, chains: Option<Vec<ChainId>>) -> Option<String> {
        let chains = match chains {
            Some(requested) => {
                let supported: Vec<ChainId> = requested
                    .into_iter()
                    .filter(|chain| {
                        let ok = self.is_supported(chain);
                        if !ok {
                            log::warn!("[STX_POLLER] Chain {} is not supported, not polling", chain);
                        }
                        ok
                    })
                    .collect();
                if supported.is_empty() {
                    return None;
                }
                Some(supported)
            }
            None => None,
        };

        let token = Uuid::new_v4().to_string();
        let cancel = self.shutdown.child_token();
        self.subscriptions.insert(
            token.clone(),
            Subscription {
                chains: chains.clone(),
                cancel: cancel.clone(),
            },
        );
        self.publish_state();

        let scheduler = Arc::clone(self);
        let loop_token = token.clone();
        tokio::spawn(async move {
            let mut ticker = interval(scheduler.config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => scheduler.poll_once(chains.as_deref()),
                }
            }
            log::debug!("[STX_POLLER] Subscription {} stopped", loop_token);
        });

        log::debug!("[STX_POLLER] Subscription {} started", token);
        Some(token)
    }

    /// Stop one subscription. Returns false if it was already stopped.
    ///
    /// The automatic subscription follows the pending count and is refused
    /// here; it stops on its own once nothing is pending.
    pub fn stop_polling_by_token(&self, token: &str) -> bool {
        if self.auto_token.lock().as_deref() == Some(token) {
            log::warn!(
                "[STX_POLLER] Subscription {} follows pending records, not stopping",
                token
            );
            return false;
        }
        self.stop_subscription(token)
    }

    pub fn automatic_token(&self) -> Option<String> {
        self.auto_token.lock().clone()
    }

    fn stop_subscription(&self, token: &str) -> bool {
        let Some((_, subscription)) = self.subscriptions.remove(token) else {
            return false;
        };
        // In-flight requests run to completion and are still folded in
        subscription.cancel.cancel();
        log::debug!(
            "[STX_POLLER] Stopping subscription {} ({:?})",
            token,
            subscription.chains
        );
        self.publish_state();
        true
    }

    pub fn stop_all(&self) {
        self.auto_token.lock().take();
        let tokens: Vec<String> = self.subscriptions.iter().map(|e| e.key().clone()).collect();
        for token in tokens {
            self.stop_subscription(&token);
        }
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.stop_all();
    }

    pub fn state(&self) -> PollingState {
        *self.state_tx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<PollingState> {
        self.state_tx.subscribe()
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    fn publish_state(&self) {
        let next = if self.subscriptions.is_empty() {
            PollingState::Idle
        } else {
            PollingState::Active
        };
        self.state_tx.send_if_modified(|state| {
            let changed = *state != next;
            *state = next;
            changed
        });
    }

    /// One tick: one independent batch request per chain.
    fn poll_once(&self, chains: Option<&[ChainId]>) {
        let targets = match chains {
            Some(chains) => chains.to_vec(),
            None => self.reconciler.store().chains_with_pending(),
        };

        for chain in targets {
            if !self.is_supported(&chain) {
                log::debug!("[STX_POLLER] Skipping unsupported chain {}", chain);
                continue;
            }
            if self.throttled(&chain) {
                continue;
            }
            // A slow chain keeps its previous request; others are unaffected
            if !self.in_flight.insert(chain.clone()) {
                log::debug!("[STX_POLLER] Request for {} still in flight", chain);
                continue;
            }
            self.last_polled.insert(chain.clone(), Instant::now());
            let reconciler = Arc::clone(&self.reconciler);
            let in_flight = Arc::clone(&self.in_flight);
            tokio::spawn(async move {
                reconciler.refresh_chain(&chain).await;
                in_flight.remove(&chain);
            });
        }
    }

    /// Polled more recently than the chain's flag interval allows
    fn throttled(&self, chain: &ChainId) -> bool {
        let Some(ms) = self
            .reconciler
            .flags()
            .for_chain(chain)
            .batch_status_polling_interval
        else {
            return false;
        };
        let gap = Duration::from_millis(ms);
        self.last_polled
            .get(chain)
            .is_some_and(|at| at.elapsed() < gap)
    }
}
