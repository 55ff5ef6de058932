//! Test utilities for tally-core
//!
//! This module provides a mock classifier server speaking both the
//! OpenAI-compatible chat API and the Ollama generate API, for development and
//! integration tests. Replies are scripted in order across both APIs; once the
//! script runs out the server answers every prompt with
//! `Services | <description>`.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::{
    extract::{Json, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

/// One scripted reply from the mock server
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// 200 with this assistant message content
    Content(String),
    /// Bare error status (429, 503, 401, ...)
    Status(u16),
}

/// A completion request as the server saw it
///
/// For Ollama requests `max_tokens` holds `options.num_predict`.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub path: String,
    pub model: String,
    pub prompt: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub stream: Option<bool>,
    pub authorization: Option<String>,
}

#[derive(Default)]
struct ServerState {
    script: Mutex<VecDeque<ScriptedReply>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

/// Mock classifier server for testing and development
pub struct MockClassifierServer {
    addr: SocketAddr,
    state: Arc<ServerState>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockClassifierServer {
    /// Start the mock server on an available port
    pub async fn start(script: Vec<ScriptedReply>) -> Self {
        let state = Arc::new(ServerState {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/v1/models", get(handle_models))
            .route("/v1/chat/completions", post(handle_chat))
            .route("/api/tags", get(handle_tags))
            .route("/api/generate", post(handle_generate))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            state,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Get the base URL for this mock server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Completion requests received so far, in order
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    /// Number of completion requests received so far
    pub fn request_count(&self) -> usize {
        self.state.requests.lock().unwrap().len()
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockClassifierServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Models endpoint (health check)
async fn handle_models() -> Json<ModelsResponse> {
    Json(ModelsResponse {
        object: "list".to_string(),
        data: vec![ModelInfo {
            id: "gpt-4o-mini".to_string(),
            object: "model".to_string(),
        }],
    })
}

/// Ollama tags endpoint (health check)
async fn handle_tags() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "models": [{ "name": "llama3.2" }] }))
}

/// Record the request and pop the next scripted reply
///
/// `Err` carries a scripted error status, already turned into a response.
fn next_reply(state: &ServerState, request: RecordedRequest) -> Result<String, Response> {
    let description = extract_description(&request.prompt);
    state.requests.lock().unwrap().push(request);

    let next = state.script.lock().unwrap().pop_front();
    match next {
        Some(ScriptedReply::Status(code)) => {
            let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            Err((status, format!("mock status {}", code)).into_response())
        }
        Some(ScriptedReply::Content(content)) => Ok(content),
        None => Ok(format!("Services | {}", description)),
    }
}

/// Chat completions endpoint
async fn handle_chat(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Response {
    let prompt = request
        .messages
        .iter()
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n");

    let recorded = RecordedRequest {
        path: "/v1/chat/completions".to_string(),
        model: request.model.clone(),
        prompt,
        temperature: request.temperature,
        max_tokens: request.max_tokens,
        stream: request.stream,
        authorization: headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    };
    let content = match next_reply(&state, recorded) {
        Ok(content) => content,
        Err(response) => return response,
    };

    Json(ChatResponse {
        model: request.model,
        choices: vec![ChatChoice {
            index: 0,
            message: ChatMessage {
                role: "assistant".to_string(),
                content,
            },
            finish_reason: "stop".to_string(),
        }],
    })
    .into_response()
}

/// Ollama generate endpoint
async fn handle_generate(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<GenerateRequest>,
) -> Response {
    let options = request.options.unwrap_or_default();
    let recorded = RecordedRequest {
        path: "/api/generate".to_string(),
        model: request.model.clone(),
        prompt: request.prompt,
        temperature: options.temperature,
        max_tokens: options.num_predict,
        stream: request.stream,
        authorization: None,
    };
    let response = match next_reply(&state, recorded) {
        Ok(content) => content,
        Err(response) => return response,
    };

    Json(GenerateResponse {
        model: request.model,
        response,
        done: true,
    })
    .into_response()
}

/// Text between `Description: "` and the next quote
fn extract_description(prompt: &str) -> String {
    const MARKER: &str = "Description: \"";
    prompt
        .find(MARKER)
        .map(|start| &prompt[start + MARKER.len()..])
        .and_then(|rest| rest.find('"').map(|end| rest[..end].to_string()))
        .unwrap_or_else(|| "Unknown".to_string())
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(default)]
    temperature: Option<f32>,
    #[serde(default)]
    max_tokens: Option<u32>,
    #[serde(default)]
    stream: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    #[serde(default)]
    stream: Option<bool>,
    #[serde(default)]
    options: Option<GenerateOptions>,
}

#[derive(Debug, Default, Deserialize)]
struct GenerateOptions {
    #[serde(default)]
    temperature: Option<f32>,
    #[serde(default)]
    num_predict: Option<u32>,
}

#[derive(Serialize)]
struct GenerateResponse {
    model: String,
    response: String,
    done: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ChatResponse {
    model: String,
    choices: Vec<ChatChoice>,
}

#[derive(Serialize)]
struct ChatChoice {
    index: u32,
    message: ChatMessage,
    finish_reason: String,
}

#[derive(Serialize)]
struct ModelsResponse {
    object: String,
    data: Vec<ModelInfo>,
}

#[derive(Serialize)]
struct ModelInfo {
    id: String,
    object: String,
}
