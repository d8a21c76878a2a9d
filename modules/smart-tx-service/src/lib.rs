//! Smart transaction service: tracks relay-submitted transactions from
//! submission to on-chain confirmation.

pub mod chain;
pub mod config;
pub mod confirmation;
pub mod db;
pub mod error;
pub mod events;
pub mod external;
pub mod feature_flags;
pub mod history;
pub mod metrics;
pub mod nonce;
pub mod poller;
pub mod reconciler;
pub mod relay_api;
pub mod routes;
pub mod status_mapper;
pub mod store;
pub mod submission;

pub use error::{Result, SmartTxError};
pub use store::ChainId;
