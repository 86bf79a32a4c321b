//! Per-call audit reporting
//!
//! Every call reports exactly once, whether it succeeds, fails, or is
//! dropped by its consumer. Reporting never blocks or fails the call.

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;

/// How a call ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditOutcome {
    /// Result produced
    Success,
    /// Call failed; `kind` is the error kind
    Failure { kind: &'static str, status: Option<u16> },
    /// Stream dropped before it finished
    Cancelled,
}

impl AuditOutcome {
    /// Stable name used in logs and metric attributes
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure { .. } => "failure",
            Self::Cancelled => "cancelled",
        }
    }
}

/// One finished call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditRecord {
    /// Configured provider name
    pub provider: String,
    /// Provider identity tag for metering
    pub provider_tag: String,
    /// Requested model
    pub model: String,
    /// Whether the streaming endpoint was used
    pub streaming: bool,
    /// Request body size
    pub request_bytes: u64,
    /// Response body bytes received
    pub response_bytes: u64,
    /// Prompt tokens, as reported by the provider or estimated
    pub prompt_tokens: u32,
    /// Generated tokens, when the provider reported them
    pub completion_tokens: u32,
    /// Wall-clock duration
    pub duration: Duration,
    /// How the call ended
    pub outcome: AuditOutcome,
}

/// Receiver of audit records
pub trait AuditSink: Send + Sync {
    /// Accept one record; must not block
    fn report(&self, record: AuditRecord);
}

/// Writes each record as a structured log event
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn report(&self, record: AuditRecord) {
        tracing::info!(
            target: "conduit::audit",
            provider = %record.provider,
            provider_tag = %record.provider_tag,
            model = %record.model,
            streaming = record.streaming,
            request_bytes = record.request_bytes,
            response_bytes = record.response_bytes,
            prompt_tokens = record.prompt_tokens,
            completion_tokens = record.completion_tokens,
            duration_ms = u64::try_from(record.duration.as_millis()).unwrap_or(u64::MAX),
            outcome = record.outcome.as_str(),
            "completion call finished"
        );
    }
}

/// Forwards records over an unbounded channel to a background consumer
#[derive(Clone)]
pub struct ChannelAuditSink {
    tx: mpsc::UnboundedSender<AuditRecord>,
}

impl ChannelAuditSink {
    /// Create a sink and the receiving end of its channel
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<AuditRecord>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Create a sink whose records are handled by a spawned task
    ///
    /// The task runs until every clone of the sink is dropped. Must be
    /// called from within a Tokio runtime.
    pub fn spawn<F, Fut>(mut handler: F) -> Self
    where
        F: FnMut(AuditRecord) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (sink, mut rx) = Self::channel();

        tokio::spawn(async move {
            while let Some(record) = rx.recv().await {
                handler(record).await;
            }

            tracing::debug!("audit consumer shutting down");
        });

        sink
    }
}

impl AuditSink for ChannelAuditSink {
    fn report(&self, record: AuditRecord) {
        if let Err(e) = self.tx.send(record) {
            tracing::warn!(error = %e, "failed to enqueue audit record, channel closed");
        }
    }
}

impl std::fmt::Debug for ChannelAuditSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelAuditSink").finish_non_exhaustive()
    }
}
