//! Ollama API client (http://127.0.0.1:11434 by default).
//! Streams chat replies (NDJSON) into a [`FragmentStream`](super::FragmentStream).

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};

use super::{ChatBackend, FragmentSender, FragmentStream, LlmError, StreamFragment};
use crate::session::ConversationMessage;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:11434";

/// Client for Ollama HTTP API.
#[derive(Clone)]
pub struct OllamaClient {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, thiserror::Error)]
pub enum OllamaError {
    #[error("ollama request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("ollama api error: {0}")]
    Api(String),
    #[error("ollama closed the stream before the reply was done")]
    Incomplete,
}

impl OllamaClient {
    pub fn new(base_url: Option<String>) -> Self {
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET /api/tags: list installed models.
    pub async fn list_models(&self) -> Result<Vec<OllamaModel>, OllamaError> {
        let url = format!("{}/api/tags", self.base_url);
        let res = self.client.get(&url).send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(OllamaError::Api(format!("{} {}", status, body)));
        }
        let data: TagsResponse = res.json().await?;
        Ok(data.models.unwrap_or_default())
    }

    /// POST /api/chat with stream: true. Parses NDJSON and sends every message delta
    /// (empty ones included) to `tx`. Returns when the model reports `done`, when the
    /// consumer drops the stream, or with an error.
    pub async fn chat_stream(
        &self,
        model: &str,
        messages: Vec<ConversationMessage>,
        tx: &FragmentSender,
    ) -> Result<(), OllamaError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = ChatRequest {
            model: model.to_string(),
            messages,
            stream: true,
        };
        let res = self.client.post(&url).json(&body).send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(OllamaError::Api(format!("{} {}", status, body)));
        }
        let mut stream = res.bytes_stream();
        let mut buffer = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(OllamaError::Request)?;
            buffer.extend_from_slice(&chunk);
            while let Some(i) = buffer.iter().position(|&b| b == b'\n') {
                let line_bytes: Vec<u8> = buffer.drain(..i).collect();
                buffer.drain(..1);
                match handle_line(&line_bytes, tx)? {
                    LineOutcome::Continue => {}
                    LineOutcome::Done => return Ok(()),
                    LineOutcome::ConsumerGone => {
                        log::debug!("ollama: consumer dropped the stream, stopping");
                        return Ok(());
                    }
                }
            }
        }
        // Last record may lack a trailing newline.
        match handle_line(&buffer, tx)? {
            LineOutcome::Done | LineOutcome::ConsumerGone => Ok(()),
            LineOutcome::Continue => Err(OllamaError::Incomplete),
        }
    }
}

enum LineOutcome {
    Continue,
    Done,
    ConsumerGone,
}

fn handle_line(line_bytes: &[u8], tx: &FragmentSender) -> Result<LineOutcome, OllamaError> {
    let line = String::from_utf8_lossy(line_bytes);
    let line = line.trim();
    if line.is_empty() {
        return Ok(LineOutcome::Continue);
    }
    let event: ChatStreamEvent = match serde_json::from_str(line) {
        Ok(e) => e,
        Err(e) => {
            log::warn!("ollama: skipping unparseable stream line: {}", e);
            return Ok(LineOutcome::Continue);
        }
    };
    if let Some(err) = event.error {
        return Err(OllamaError::Api(err));
    }
    if let Some(msg) = event.message {
        let content = msg.content.unwrap_or_default();
        if !tx.send(StreamFragment::new(content)) {
            return Ok(LineOutcome::ConsumerGone);
        }
    }
    if event.done {
        return Ok(LineOutcome::Done);
    }
    Ok(LineOutcome::Continue)
}

/// [`ChatBackend`] that streams from Ollama on a tokio runtime it does not own.
///
/// The HTTP read runs as a task on `runtime`; the caller consumes fragments on its own
/// thread, so it must not be a runtime worker that the task needs to make progress.
#[derive(Clone)]
pub struct OllamaBackend {
    client: OllamaClient,
    model: String,
    runtime: tokio::runtime::Handle,
}

impl OllamaBackend {
    pub fn new(client: OllamaClient, model: impl Into<String>, runtime: tokio::runtime::Handle) -> Self {
        Self {
            client,
            model: model.into(),
            runtime,
        }
    }

    pub fn client(&self) -> &OllamaClient {
        &self.client
    }
}

impl ChatBackend for OllamaBackend {
    fn model(&self) -> &str {
        &self.model
    }

    fn stream_chat(&self, messages: &[ConversationMessage]) -> Result<FragmentStream, LlmError> {
        let (tx, stream) = FragmentStream::channel();
        let client = self.client.clone();
        let model = self.model.clone();
        let messages = messages.to_vec();
        log::debug!(
            "ollama: streaming {} messages to {} at {}",
            messages.len(),
            model,
            client.base_url()
        );
        self.runtime.spawn(async move {
            if let Err(e) = client.chat_stream(&model, messages, &tx).await {
                log::warn!("ollama: chat stream failed: {}", e);
                tx.fail(LlmError::Ollama(e));
            }
        });
        Ok(stream)
    }
}

#[derive(Debug, Deserialize)]
struct ChatStreamEvent {
    #[serde(default)]
    message: Option<StreamMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Message delta in a stream record; `content` may be null or missing.
#[derive(Debug, Deserialize)]
struct StreamMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaModel {
    pub name: String,
    #[serde(default)]
    pub size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    models: Option<Vec<OllamaModel>>,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ConversationMessage>,
    stream: bool,
}
