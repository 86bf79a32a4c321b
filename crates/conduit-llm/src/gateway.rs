//! Single entry point for completion calls
//!
//! Each call runs transport, decoding, extraction, and accumulation strictly
//! in order on the calling task. Streaming calls are lazy: nothing is sent
//! until the stream is first polled, and dropping the stream closes the
//! connection and discards the unfinished result.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use conduit_config::LlmConfig;
use conduit_telemetry::KeyValue;
use conduit_telemetry::metrics::CompletionMetrics;
use futures_util::{Stream, StreamExt, stream};
use indexmap::IndexMap;
use tracing::Instrument;

use crate::accumulate::ToolCallAccumulator;
use crate::audit::{AuditOutcome, AuditRecord, AuditSink, TracingAuditSink};
use crate::decode::ChunkDecoder;
use crate::dialect::RequestPayload;
use crate::error::{CallPhase, LlmError};
use crate::extract::{Extracted, OutputKind, ResponseExtractor};
use crate::provider::ProviderConfig;
use crate::transport::{FrameStream, Transport};
use crate::types::{CompletionFragment, CompletionRequest, CompletionResult, CompletionUpdate, Usage};

/// Multi-provider completion gateway
pub struct Gateway {
    providers: IndexMap<String, ProviderHandle>,
    audit: Arc<dyn AuditSink>,
    metrics: CompletionMetrics,
}

#[derive(Clone)]
struct ProviderHandle {
    config: Arc<ProviderConfig>,
    transport: Transport,
}

impl Default for Gateway {
    fn default() -> Self {
        Self::new()
    }
}

impl Gateway {
    /// Gateway with no providers, auditing to the log
    pub fn new() -> Self {
        Self {
            providers: IndexMap::new(),
            audit: Arc::new(TracingAuditSink),
            metrics: CompletionMetrics::new(&conduit_telemetry::meter()),
        }
    }

    /// Build a gateway with every configured provider
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        config
            .providers
            .iter()
            .try_fold(Self::new(), |gateway, (name, provider)| {
                gateway.with_provider(ProviderConfig::from_config(name, provider)?)
            })
    }

    /// Register a provider under its configured name
    pub fn with_provider(mut self, config: ProviderConfig) -> Result<Self, LlmError> {
        let transport = Transport::new(&config)?;

        tracing::debug!(provider = %config.name, dialect = config.dialect.as_str(), "registered provider");

        self.providers.insert(
            config.name.clone(),
            ProviderHandle {
                config: Arc::new(config),
                transport,
            },
        );

        Ok(self)
    }

    /// Replace the audit collaborator
    #[must_use]
    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = sink;
        self
    }

    /// Look up a provider by name
    pub fn provider(&self, name: &str) -> Result<&ProviderConfig, LlmError> {
        self.handle(name).map(|handle| handle.config.as_ref())
    }

    /// Configured providers in declaration order
    pub fn providers(&self) -> impl Iterator<Item = &ProviderConfig> {
        self.providers.values().map(|handle| handle.config.as_ref())
    }

    /// Run a call to completion
    ///
    /// Uses the provider's streaming endpoint when `request.stream` is set,
    /// discarding intermediate updates.
    pub async fn complete(&self, request: &CompletionRequest, provider: &str) -> Result<CompletionResult, LlmError> {
        if request.stream {
            return self.complete_stream(request, provider)?.into_result().await;
        }

        let handle = self.handle(provider)?;
        let mut call = self.call(handle, request, false);
        let span = call.span();

        async move {
            let payload = call.check(handle.config.build_payload(request, false))?;
            call.sent(&payload, CallPhase::Blocking);

            let sent = handle.transport.send(&handle.config, &request.model, &payload).await;
            let body = call.check(sent)?;
            call.response_bytes = body.len() as u64;

            call.enter(CallPhase::Extracting);
            let mut pipeline = Pipeline::new(handle.config.extractor());
            let extracted = pipeline.extractor.extract_full(&body);
            let extracted = call.check(extracted)?;
            let absorbed = pipeline.absorb(&mut call, extracted);
            call.check(absorbed)?;

            let result = pipeline.finish();
            let result = call.check(result)?;
            call.succeed();

            Ok::<_, LlmError>(result)
        }
        .instrument(span)
        .await
    }

    /// Start a streaming call
    ///
    /// Fails immediately only for an unknown provider; everything else is
    /// reported through the stream.
    pub fn complete_stream(&self, request: &CompletionRequest, provider: &str) -> Result<CompletionStream, LlmError> {
        let handle = self.handle(provider)?;
        let call = self.call(handle, request, true);
        let span = call.span();

        let state = StreamState::Pending(Box::new(Pending {
            handle: handle.clone(),
            request: request.clone(),
            call,
        }));

        let inner = stream::unfold(state, move |state| step(state).instrument(span.clone()));

        Ok(CompletionStream {
            inner: Box::pin(inner),
        })
    }

    fn handle(&self, name: &str) -> Result<&ProviderHandle, LlmError> {
        self.providers.get(name).ok_or_else(|| LlmError::ProviderNotFound {
            provider: name.to_owned(),
        })
    }

    fn call(&self, handle: &ProviderHandle, request: &CompletionRequest, streaming: bool) -> Call {
        Call {
            provider: Arc::clone(&handle.config),
            model: request.model.clone(),
            streaming,
            phase: CallPhase::Idle,
            started: Instant::now(),
            request_bytes: 0,
            response_bytes: 0,
            prompt_estimate: 0,
            usage: Usage::default(),
            first_delta_seen: false,
            audit: Arc::clone(&self.audit),
            metrics: self.metrics.clone(),
            reported: false,
        }
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Lazy stream of updates for one call
///
/// Yields text deltas while the call produces text, then exactly one
/// `Finished` item, or a single error.
pub struct CompletionStream {
    inner: Pin<Box<dyn Stream<Item = Result<CompletionUpdate, LlmError>> + Send>>,
}

impl CompletionStream {
    /// Drive the stream to its final result
    pub async fn into_result(mut self) -> Result<CompletionResult, LlmError> {
        while let Some(update) = self.next().await {
            if let CompletionUpdate::Finished(result) = update? {
                return Ok(result);
            }
        }

        Err(LlmError::InvalidState("stream ended without a result"))
    }
}

impl Stream for CompletionStream {
    type Item = Result<CompletionUpdate, LlmError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl std::fmt::Debug for CompletionStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionStream").finish_non_exhaustive()
    }
}

enum StreamState {
    Pending(Box<Pending>),
    Running(Box<Running>),
    Done,
}

struct Pending {
    handle: ProviderHandle,
    request: CompletionRequest,
    call: Call,
}

struct Running {
    frames: FrameStream,
    decoder: ChunkDecoder,
    pipeline: Pipeline,
    deltas: VecDeque<String>,
    ended: bool,
    call: Call,
}

type Step = Option<(Result<CompletionUpdate, LlmError>, StreamState)>;

async fn step(state: StreamState) -> Step {
    match state {
        StreamState::Done => None,
        StreamState::Pending(pending) => match start(*pending).await {
            Ok(running) => drive(Box::new(running)).await,
            Err(e) => Some((Err(e), StreamState::Done)),
        },
        StreamState::Running(running) => drive(running).await,
    }
}

async fn start(pending: Pending) -> Result<Running, LlmError> {
    let Pending {
        handle,
        request,
        mut call,
    } = pending;

    let payload = call.check(handle.config.build_payload(&request, true))?;
    call.sent(&payload, CallPhase::Streaming);

    let opened = handle.transport.open_stream(&handle.config, &request.model, &payload).await;
    let frames = call.check(opened)?;

    Ok(Running {
        frames,
        decoder: handle.config.decoder(),
        pipeline: Pipeline::new(handle.config.extractor()),
        deltas: VecDeque::new(),
        ended: false,
        call,
    })
}

async fn drive(mut run: Box<Running>) -> Step {
    loop {
        if let Some(delta) = run.deltas.pop_front() {
            return Some((Ok(CompletionUpdate::Text(delta)), StreamState::Running(run)));
        }

        if run.ended {
            let finished = run.finalize().map(CompletionUpdate::Finished);
            return Some((finished, StreamState::Done));
        }

        let outcome = match run.frames.next().await {
            Some(Ok(bytes)) => run.ingest(&bytes),
            Some(Err(e)) => {
                run.call.fail(&e);
                Err(e)
            }
            None => run.end_of_body(),
        };

        if let Err(e) = outcome {
            return Some((Err(e), StreamState::Done));
        }
    }
}

impl Running {
    fn ingest(&mut self, bytes: &[u8]) -> Result<(), LlmError> {
        self.call.response_bytes += bytes.len() as u64;

        let frames = self.decoder.decode(bytes);
        self.absorb_frames(frames)?;

        if self.decoder.is_terminated() || self.pipeline.terminal {
            self.ended = true;
        }

        Ok(())
    }

    fn end_of_body(&mut self) -> Result<(), LlmError> {
        let frames = self.decoder.finish();
        self.absorb_frames(frames)?;

        if !self.decoder.is_terminated() && !self.pipeline.terminal {
            let e = LlmError::TruncatedStream {
                provider: self.call.provider.name.clone(),
                received_bytes: self.call.response_bytes,
            };
            self.call.fail(&e);
            return Err(e);
        }

        self.ended = true;
        Ok(())
    }

    fn absorb_frames(&mut self, frames: Vec<String>) -> Result<(), LlmError> {
        for frame in frames {
            self.call.enter(CallPhase::Extracting);
            let extracted = self.pipeline.extractor.extract_frame(&frame);
            let extracted = self.call.check(extracted)?;

            let absorbed = self.pipeline.absorb(&mut self.call, extracted);
            if let Some(delta) = self.call.check(absorbed)? {
                self.call.first_delta();
                self.deltas.push_back(delta);
            }
        }

        Ok(())
    }

    fn finalize(&mut self) -> Result<CompletionResult, LlmError> {
        let result = self.pipeline.finish();
        let result = self.call.check(result)?;
        self.call.succeed();
        Ok(result)
    }
}

/// Extraction and accumulation state shared by blocking and streaming calls
struct Pipeline {
    extractor: ResponseExtractor,
    text: String,
    tools: ToolCallAccumulator,
    terminal: bool,
}

impl Pipeline {
    fn new(extractor: ResponseExtractor) -> Self {
        Self {
            extractor,
            text: String::new(),
            tools: ToolCallAccumulator::new(),
            terminal: false,
        }
    }

    /// Fold one extraction into the call, returning any text delta
    fn absorb(&mut self, call: &mut Call, extracted: Extracted) -> Result<Option<String>, LlmError> {
        if let Some(usage) = extracted.usage {
            call.usage = call.usage.merge(usage);
        }
        self.terminal |= extracted.terminal;

        match extracted.fragment {
            None => Ok(None),
            Some(CompletionFragment::Text(text)) => {
                self.text.push_str(&text);
                Ok(Some(text))
            }
            Some(CompletionFragment::ToolCall(part)) => {
                call.enter(CallPhase::Accumulating);
                // Text seen before the tool call is not part of the result
                self.text.clear();
                self.tools.fold(part)?;
                Ok(None)
            }
        }
    }

    /// Produce the call result; only called once all input is absorbed
    fn finish(&mut self) -> Result<CompletionResult, LlmError> {
        match self.extractor.kind() {
            OutputKind::Text => Ok(CompletionResult::Text(std::mem::take(&mut self.text))),
            OutputKind::ToolCall => self.tools.finalize().map(CompletionResult::ToolInvocation),
        }
    }
}

/// Per-call bookkeeping: phase, byte and token counts, audit and metrics
struct Call {
    provider: Arc<ProviderConfig>,
    model: String,
    streaming: bool,
    phase: CallPhase,
    started: Instant,
    request_bytes: u64,
    response_bytes: u64,
    prompt_estimate: u32,
    usage: Usage,
    first_delta_seen: bool,
    audit: Arc<dyn AuditSink>,
    metrics: CompletionMetrics,
    reported: bool,
}

impl Call {
    fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "completion",
            provider = %self.provider.name,
            model = %self.model,
            streaming = self.streaming,
        )
    }

    fn enter(&mut self, phase: CallPhase) {
        if self.phase != phase {
            tracing::trace!(from = %self.phase, to = %phase, "call phase");
            self.phase = phase;
        }
    }

    fn sent(&mut self, payload: &RequestPayload, phase: CallPhase) {
        self.enter(CallPhase::PayloadBuilt);
        self.request_bytes = payload.body.len() as u64;
        self.prompt_estimate = payload.prompt_tokens;
        self.enter(phase);
    }

    /// Report the call as failed when `result` is an error
    fn check<T>(&mut self, result: Result<T, LlmError>) -> Result<T, LlmError> {
        if let Err(e) = &result {
            self.fail(e);
        }
        result
    }

    fn first_delta(&mut self) {
        if !self.first_delta_seen {
            self.first_delta_seen = true;
            self.metrics
                .record_first_token(self.started.elapsed(), &self.attributes(None));
        }
    }

    fn succeed(&mut self) {
        self.enter(CallPhase::Finalized);
        tracing::debug!(
            response_bytes = self.response_bytes,
            completion_tokens = self.usage.completion_tokens,
            "completion finished"
        );
        self.report(AuditOutcome::Success);
    }

    fn fail(&mut self, error: &LlmError) {
        tracing::warn!(phase = %self.phase, error = %error, "completion failed");
        self.report(AuditOutcome::Failure {
            kind: error.kind(),
            status: error.status(),
        });
    }

    fn attributes(&self, outcome: Option<&AuditOutcome>) -> Vec<KeyValue> {
        let mut attributes = vec![
            KeyValue::new("provider", self.provider.name.clone()),
            KeyValue::new("model", self.model.clone()),
            KeyValue::new("streaming", self.streaming),
        ];
        if let Some(outcome) = outcome {
            attributes.push(KeyValue::new("outcome", outcome.as_str()));
        }
        attributes
    }

    /// Emit the audit record and metrics; later calls are ignored
    fn report(&mut self, outcome: AuditOutcome) {
        if self.reported {
            return;
        }
        self.reported = true;

        let duration = self.started.elapsed();
        let prompt_tokens = if self.usage.prompt_tokens > 0 {
            self.usage.prompt_tokens
        } else {
            self.prompt_estimate
        };

        let attributes = self.attributes(Some(&outcome));
        self.metrics.record_call(duration, &attributes);
        self.metrics.record_tokens(
            u64::from(prompt_tokens),
            u64::from(self.usage.completion_tokens),
            &attributes,
        );

        self.audit.report(AuditRecord {
            provider: self.provider.name.clone(),
            provider_tag: self.provider.audit_tag.clone(),
            model: self.model.clone(),
            streaming: self.streaming,
            request_bytes: self.request_bytes,
            response_bytes: self.response_bytes,
            prompt_tokens,
            completion_tokens: self.usage.completion_tokens,
            duration,
            outcome,
        });
    }
}

impl Drop for Call {
    fn drop(&mut self) {
        if !self.reported {
            tracing::debug!(provider = %self.provider.name, phase = %self.phase, "completion dropped before finishing");
            self.report(AuditOutcome::Cancelled);
        }
    }
}
