//! Tracking events emitted by the engine.

use serde::Serialize;
use smart_tx_types::SmartTransactionStatus;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MetricsEvent {
    /// The effective status of a record changed
    StatusUpdated {
        uuid: String,
        status: SmartTransactionStatus,
        processing_time_secs: Option<f64>,
        kind: Option<String>,
    },
    Confirmed {
        uuid: String,
        status: Option<SmartTransactionStatus>,
        processing_time_secs: Option<f64>,
        block_number: u64,
        gas_used: Option<String>,
        base_fee_per_gas: Option<String>,
        max_fee_per_gas: Option<String>,
        max_priority_fee_per_gas: Option<String>,
    },
    ConfirmationFailed {
        uuid: String,
        error: String,
    },
}

impl MetricsEvent {
    pub fn name(&self) -> &'static str {
        match self {
            MetricsEvent::StatusUpdated { .. } => "STX Status Updated",
            MetricsEvent::Confirmed { .. } => "STX Confirmed",
            MetricsEvent::ConfirmationFailed { .. } => "STX Confirmation Failed",
        }
    }
}

/// Seconds elapsed since `submitted_ms`, if known
pub fn processing_time_secs(submitted_ms: Option<i64>, now_ms: i64) -> Option<f64> {
    submitted_ms.map(|t| (now_ms - t) as f64 / 1000.0)
}

pub trait MetricsSink: Send + Sync {
    fn track(&self, event: MetricsEvent);
}

/// Writes every metrics event to the log
pub struct LogMetricsSink;

impl MetricsSink for LogMetricsSink {
    fn track(&self, event: MetricsEvent) {
        match serde_json::to_string(&event) {
            Ok(payload) => log::info!("[STX_METRICS] {}: {}", event.name(), payload),
            Err(e) => log::warn!("[STX_METRICS] Failed to encode {}: {}", event.name(), e),
        }
    }
}
