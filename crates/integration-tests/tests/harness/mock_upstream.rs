//! Mock provider backend for integration tests
//!
//! Answers every POST with a scripted reply and records what it received.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use futures_util::{StreamExt, stream};
use tokio_util::sync::CancellationToken;

/// Scripted upstream behavior
#[derive(Debug, Clone)]
pub enum Reply {
    /// Whole JSON body with the given status
    Json(StatusCode, serde_json::Value),
    /// Body written in the given pieces, then closed cleanly
    Chunks(Vec<String>),
    /// Body written in the given pieces, then aborted
    Broken(Vec<String>),
    /// Body written in the given pieces, then left open without data
    Stall(Vec<String>),
    /// Error status whose body starts and then stops sending
    StalledError(StatusCode, String),
}

/// One request as seen by the mock
#[derive(Debug, Clone)]
pub struct Captured {
    pub path: String,
    pub query: Option<String>,
    pub authorization: Option<String>,
    pub body: serde_json::Value,
}

struct MockState {
    reply: Reply,
    requests: Mutex<Vec<Captured>>,
}

/// Mock upstream listening on an ephemeral port
pub struct MockUpstream {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<MockState>,
}

impl MockUpstream {
    /// Start the mock, returning once it is listening
    pub async fn start(reply: Reply) -> anyhow::Result<Self> {
        let state = Arc::new(MockState {
            reply,
            requests: Mutex::new(Vec::new()),
        });

        let app = Router::new().fallback(handle).with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_clone.cancelled().await;
                })
                .await
                .ok();
        });

        Ok(Self { addr, shutdown, state })
    }

    /// Base URL in the shape the Gemini dialect expects
    pub fn gemini_base_url(&self) -> String {
        format!("http://{}/v1beta", self.addr)
    }

    /// Generation endpoint for the HuggingFace dialect
    pub fn hugging_face_url(&self) -> String {
        format!("http://{}/generate", self.addr)
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<Captured> {
        self.state.requests.lock().unwrap().clone()
    }

    /// The single request received; panics otherwise
    pub fn only_request(&self) -> Captured {
        let requests = self.requests();
        assert_eq!(requests.len(), 1, "expected exactly one upstream request");
        requests.into_iter().next().unwrap()
    }
}

impl Drop for MockUpstream {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn handle(State(state): State<Arc<MockState>>, uri: Uri, headers: HeaderMap, body: Bytes) -> Response {
    state.requests.lock().unwrap().push(Captured {
        path: uri.path().to_owned(),
        query: uri.query().map(str::to_owned),
        authorization: headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned),
        body: serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null),
    });

    match state.reply.clone() {
        Reply::Json(status, body) => (status, axum::Json(body)).into_response(),
        Reply::Chunks(chunks) => {
            let body = stream::iter(chunks).map(Ok::<_, Infallible>);
            Body::from_stream(body).into_response()
        }
        Reply::Broken(chunks) => {
            let body = stream::iter(chunks)
                .map(Ok)
                .chain(stream::once(async { Err(std::io::Error::other("connection reset")) }));
            Body::from_stream(body).into_response()
        }
        Reply::Stall(chunks) => {
            let body = stream::iter(chunks)
                .map(Ok::<_, Infallible>)
                .chain(stream::pending());
            Body::from_stream(body).into_response()
        }
        Reply::StalledError(status, head) => {
            let body = stream::once(async move { Ok::<_, Infallible>(head) }).chain(stream::pending());
            (status, Body::from_stream(body)).into_response()
        }
    }
}
