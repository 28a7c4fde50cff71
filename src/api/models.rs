//! API request and response models.
//!
//! One side speaks the OpenAI chat-completion format to clients; the other
//! speaks Ollama's native `/api/chat` format to backends. The conversion
//! helpers here are pure so framing behavior is unit-testable.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// OpenAI-compatible client surface
// ============================================================================

/// A single message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Role: "system", "user", or "assistant"
    pub role: String,

    /// Message content
    pub content: String,
}

/// Chat completion request following OpenAI API format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    /// Model identifier
    pub model: String,

    /// Conversation messages
    pub messages: Vec<Message>,

    /// Sampling temperature. Kept as f64 so the client's JSON number
    /// reaches the backend unchanged.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    /// Maximum tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Whether to stream the response
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,

    /// Additional parameters, passed through untouched
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Token usage statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// A single choice in the response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub index: u32,
    pub message: Message,
    pub finish_reason: Option<String>,
}

/// Chat completion response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<Choice>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// Delta content in streaming responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// A single choice in a streaming chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChoice {
    pub index: u32,
    pub delta: Delta,
    pub finish_reason: Option<String>,
}

/// Streaming response chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<StreamChoice>,
}

impl StreamChunk {
    fn new(id: &str, created: i64, model: &str, delta: Delta, finish_reason: Option<&str>) -> Self {
        Self {
            id: id.to_string(),
            object: "chat.completion.chunk".to_string(),
            created,
            model: model.to_string(),
            choices: vec![StreamChoice {
                index: 0,
                delta,
                finish_reason: finish_reason.map(|r| r.to_string()),
            }],
        }
    }

    /// First frame of a stream: carries the assistant role, no content.
    pub fn role(id: &str, created: i64, model: &str) -> Self {
        Self::new(
            id,
            created,
            model,
            Delta {
                role: Some("assistant".to_string()),
                content: Some(String::new()),
            },
            None,
        )
    }

    /// A content delta frame.
    pub fn content(id: &str, created: i64, model: &str, content: &str) -> Self {
        Self::new(
            id,
            created,
            model,
            Delta {
                role: None,
                content: Some(content.to_string()),
            },
            None,
        )
    }

    /// Final frame before the terminal marker.
    pub fn stop(id: &str, created: i64, model: &str) -> Self {
        Self::new(
            id,
            created,
            model,
            Delta {
                role: None,
                content: None,
            },
            Some("stop"),
        )
    }
}

/// OpenAI-style model listing entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub owned_by: String,
}

/// OpenAI-style model listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelList {
    pub object: String,
    pub data: Vec<ModelInfo>,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub models: Vec<String>,
    pub version: String,
}

// ============================================================================
// Ollama backend surface
// ============================================================================

/// Request body for Ollama's `/api/chat`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub stream: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<serde_json::Value>,
}

/// One response object from Ollama, either the whole buffered reply or a
/// single NDJSON line of a stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaChunk {
    #[serde(default)]
    pub message: Option<Message>,

    #[serde(default)]
    pub done: bool,

    #[serde(default)]
    pub prompt_eval_count: Option<u64>,

    #[serde(default)]
    pub eval_count: Option<u64>,
}

impl OllamaChunk {
    pub fn content(&self) -> &str {
        self.message.as_ref().map(|m| m.content.as_str()).unwrap_or("")
    }
}

/// Translate an OpenAI request into Ollama's shape.
///
/// `backend_model` is the name the backend knows, which may differ from the
/// public name the client used.
pub fn to_ollama_request(
    request: &ChatCompletionRequest,
    backend_model: &str,
    stream: bool,
) -> OllamaChatRequest {
    let mut options = serde_json::Map::new();
    if let Some(temperature) = request.temperature {
        options.insert("temperature".to_string(), temperature.into());
    }
    if let Some(max_tokens) = request.max_tokens {
        // Ollama's name for the generation cap
        options.insert("num_predict".to_string(), max_tokens.into());
    }

    OllamaChatRequest {
        model: backend_model.to_string(),
        messages: request.messages.clone(),
        stream,
        options: if options.is_empty() {
            None
        } else {
            Some(serde_json::Value::Object(options))
        },
    }
}

/// Build a buffered OpenAI response from the single Ollama payload.
pub fn to_openai_response(
    chunk: &OllamaChunk,
    public_model: &str,
    request_id: &str,
    created: i64,
) -> ChatCompletionResponse {
    let prompt_tokens = chunk.prompt_eval_count.unwrap_or(0);
    let completion_tokens = chunk.eval_count.unwrap_or(0);

    ChatCompletionResponse {
        id: format!("chatcmpl-{}", request_id),
        object: "chat.completion".to_string(),
        created,
        model: public_model.to_string(),
        choices: vec![Choice {
            index: 0,
            message: Message {
                role: "assistant".to_string(),
                content: chunk.content().to_string(),
            },
            finish_reason: chunk.done.then(|| "stop".to_string()),
        }],
        usage: Some(Usage {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }),
    }
}
