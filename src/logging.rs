//! Logging setup and the error sink used by the login flow.

use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Where login failures are reported. Fire-and-forget.
pub trait LogSink: Send + Sync {
    fn log_error(&self, message: &str, error: &dyn std::error::Error);
}

pub type SharedLogSink = Arc<dyn LogSink>;

/// Forwards to `tracing::error!`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn log_error(&self, message: &str, error: &dyn std::error::Error) {
        match error.source() {
            Some(source) => tracing::error!(%error, %source, "{}", message),
            None => tracing::error!(%error, "{}", message),
        }
    }
}

/// Install the global subscriber
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_level(true),
        )
        .with(tracing_subscriber::filter::LevelFilter::INFO)
        .init();
}
