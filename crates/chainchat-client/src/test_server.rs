//! In-process stand-in for the ChainChat gateway, used by the client tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::GenerateRequest;

#[derive(Debug, Clone)]
pub enum Reply {
    Chunks { chunks: Vec<Vec<u8>>, stall: bool },
    Status { code: u16, body: String },
}

impl Reply {
    pub fn chunks<'a>(chunks: impl IntoIterator<Item = &'a str>) -> Self {
        Reply::Chunks {
            chunks: chunks.into_iter().map(|c| c.as_bytes().to_vec()).collect(),
            stall: false,
        }
    }

    pub fn chunks_then_stall<'a>(chunks: impl IntoIterator<Item = &'a str>) -> Self {
        match Self::chunks(chunks) {
            Reply::Chunks { chunks, .. } => Reply::Chunks { chunks, stall: true },
            other => other,
        }
    }

    pub fn raw_chunks(chunks: Vec<Vec<u8>>) -> Self {
        Reply::Chunks { chunks, stall: false }
    }

    /// One chunk per record, each newline-terminated
    pub fn ndjson(records: &[serde_json::Value]) -> Self {
        Reply::Chunks {
            chunks: records
                .iter()
                .map(|r| format!("{}\n", r).into_bytes())
                .collect(),
            stall: false,
        }
    }

    pub fn stall_after_ndjson(records: &[serde_json::Value]) -> Self {
        match Self::ndjson(records) {
            Reply::Chunks { chunks, .. } => Reply::Chunks { chunks, stall: true },
            other => other,
        }
    }

    pub fn json(value: serde_json::Value) -> Self {
        Reply::Status {
            code: 200,
            body: value.to_string(),
        }
    }

    pub fn status(code: u16, body: &str) -> Self {
        Reply::Status {
            code,
            body: body.to_string(),
        }
    }
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        match self {
            Reply::Status { code, body } => {
                let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                (status, body).into_response()
            }
            Reply::Chunks { chunks, stall } => {
                let stream = async_stream::stream! {
                    for chunk in chunks {
                        yield Ok::<_, std::io::Error>(chunk);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                    if stall {
                        std::future::pending::<()>().await;
                    }
                };
                Body::from_stream(stream).into_response()
            }
        }
    }
}

#[derive(Debug)]
struct ServerState {
    reply: Reply,
    generate_requests: Mutex<Vec<GenerateRequest>>,
    pull_names: Mutex<Vec<String>>,
}

pub struct TestServer {
    pub url: String,
    state: Arc<ServerState>,
}

impl TestServer {
    pub fn generate_requests(&self) -> Vec<GenerateRequest> {
        self.state.generate_requests.lock().unwrap().clone()
    }

    pub fn pull_names(&self) -> Vec<String> {
        self.state.pull_names.lock().unwrap().clone()
    }
}

/// Serve `reply` from every route on an ephemeral local port
pub async fn spawn(reply: Reply) -> TestServer {
    let state = Arc::new(ServerState {
        reply,
        generate_requests: Mutex::new(Vec::new()),
        pull_names: Mutex::new(Vec::new()),
    });

    let app = Router::new()
        .route("/generate", post(generate))
        .route("/models", get(models))
        .route("/pull-model", get(pull_model))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        url: format!("http://{}", addr),
        state,
    }
}

async fn generate(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<GenerateRequest>,
) -> Reply {
    state.generate_requests.lock().unwrap().push(request);
    state.reply.clone()
}

async fn models(State(state): State<Arc<ServerState>>) -> Reply {
    state.reply.clone()
}

#[derive(Debug, Deserialize)]
struct PullQuery {
    model_name: String,
}

async fn pull_model(State(state): State<Arc<ServerState>>, Query(query): Query<PullQuery>) -> Reply {
    state.pull_names.lock().unwrap().push(query.model_name);
    state.reply.clone()
}
