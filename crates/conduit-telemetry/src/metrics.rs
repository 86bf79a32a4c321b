//! Metric names and recording helpers for completion calls

use std::time::Duration;

use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Wall-clock duration of a completion call, in seconds
pub const COMPLETION_DURATION: &str = "llm.request.duration";
/// Completion calls by provider, mode, and outcome
pub const COMPLETION_COUNT: &str = "llm.request.count";
/// Prompt and completion token counts
pub const TOKEN_USAGE: &str = "llm.token.usage";
/// Time from request start until the first streamed text delta
pub const TIME_TO_FIRST_TOKEN: &str = "llm.time_to_first_token";

/// Instruments recorded by the completion gateway
#[derive(Clone)]
pub struct CompletionMetrics {
    duration: Histogram<f64>,
    count: Counter<u64>,
    tokens: Counter<u64>,
    first_token: Histogram<f64>,
}

impl CompletionMetrics {
    /// Create the instruments on the given meter
    pub fn new(meter: &Meter) -> Self {
        Self {
            duration: meter
                .f64_histogram(COMPLETION_DURATION)
                .with_unit("s")
                .with_description("Completion call duration")
                .build(),
            count: meter
                .u64_counter(COMPLETION_COUNT)
                .with_description("Completion calls")
                .build(),
            tokens: meter
                .u64_counter(TOKEN_USAGE)
                .with_description("Tokens consumed by completion calls")
                .build(),
            first_token: meter
                .f64_histogram(TIME_TO_FIRST_TOKEN)
                .with_unit("s")
                .with_description("Latency until the first streamed text delta")
                .build(),
        }
    }

    /// Record a finished call
    pub fn record_call(&self, duration: Duration, attributes: &[KeyValue]) {
        self.duration.record(duration.as_secs_f64(), attributes);
        self.count.add(1, attributes);
    }

    /// Record prompt and completion token counts
    pub fn record_tokens(&self, prompt: u64, completion: u64, attributes: &[KeyValue]) {
        let with_kind = |kind: &'static str| {
            let mut attrs = attributes.to_vec();
            attrs.push(KeyValue::new("token.kind", kind));
            attrs
        };

        if prompt > 0 {
            self.tokens.add(prompt, &with_kind("prompt"));
        }
        if completion > 0 {
            self.tokens.add(completion, &with_kind("completion"));
        }
    }

    /// Record latency until the first streamed delta
    pub fn record_first_token(&self, latency: Duration, attributes: &[KeyValue]) {
        self.first_token.record(latency.as_secs_f64(), attributes);
    }
}
