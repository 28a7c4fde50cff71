//! HTTP request handlers for the gateway API.
//!
//! This module contains all endpoint handlers: chat completions, model
//! listings, health checks, and metrics.

use crate::api::auth::authenticate;
use crate::api::disconnect::DisconnectStream;
use crate::api::dispatch::{dispatch, RelayMode};
use crate::api::models::*;
use crate::api::relay::relay_stream;
use crate::api::upstream::UpstreamClient;
use crate::core::middleware::RequestId;
use crate::core::usage::outcome;
use crate::core::{generate_request_id, AppError, CancelHandle, Result, UsageRecorder};
use crate::services::ModelRegistry;
use crate::with_request_context;
use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use prometheus::{Encoder, TextEncoder};
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub registry: ModelRegistry,
    pub upstream: UpstreamClient,
}

/// Handle chat completion requests.
///
/// Supports both buffered and streaming responses. Every request, whatever
/// its outcome, emits exactly one usage record: the recorder finishes on
/// success and on failure, and its drop guard covers client disconnects.
#[tracing::instrument(
    skip(state, request_id, headers, payload),
    fields(
        model = %payload.model,
        stream = payload.stream.unwrap_or(false),
    )
)]
pub async fn chat_completions(
    State(state): State<Arc<AppState>>,
    request_id: Option<Extension<RequestId>>,
    headers: HeaderMap,
    Json(payload): Json<ChatCompletionRequest>,
) -> Result<Response> {
    let request_id = request_id
        .map(|Extension(RequestId(id))| id)
        .unwrap_or_else(generate_request_id);
    let model_name = payload.model.clone();

    with_request_context!(request_id.clone(), model_name.clone(), async move {
        let recorder = UsageRecorder::new(&request_id, &model_name);

        let result = serve_chat(&state, &request_id, &headers, &payload, &recorder).await;

        if let Err(ref error) = result {
            tracing::warn!(
                error = %error,
                kind = error.kind(),
                "Chat completion request failed"
            );
            recorder.finish(outcome::FAILED, Some(error.kind()));
        }
        result
    })
}

async fn serve_chat(
    state: &AppState,
    request_id: &str,
    headers: &HeaderMap,
    payload: &ChatCompletionRequest,
    recorder: &Arc<UsageRecorder>,
) -> Result<Response> {
    if payload.messages.is_empty() {
        return Err(AppError::BadRequest("messages must not be empty".into()));
    }

    let principal = authenticate(headers, &state.registry)?;
    recorder.set_principal(&principal.name);

    let (backend, mode) = dispatch(payload, &state.registry)?;

    tracing::info!(
        principal = %principal.name,
        backend_model = %backend.model,
        host = %backend.host,
        port = backend.port,
        mode = ?mode,
        "Dispatching chat completion"
    );

    match mode {
        RelayMode::Buffered => {
            let chunk = state.upstream.complete(backend, payload).await?;

            let tokens = recorder.tokens();
            tokens.set_prompt(chunk.prompt_eval_count.unwrap_or(0));
            tokens.set_completion(chunk.eval_count.unwrap_or(0));
            recorder.finish(outcome::COMPLETED, None);

            let created = chrono::Utc::now().timestamp();
            let body = to_openai_response(&chunk, &payload.model, request_id, created);
            Ok(Json(body).into_response())
        }
        RelayMode::Streaming => {
            let chunks = state.upstream.open_stream(backend, payload).await?;

            let cancel = CancelHandle::new();
            let mut response = relay_stream(
                chunks,
                recorder.clone(),
                cancel.clone(),
                request_id,
                &payload.model,
            );

            // Wrap the body so a client walking away mid-stream trips the
            // cancel handle and drops the upstream connection.
            let (parts, body) = response.into_parts();
            let body = Body::from_stream(DisconnectStream {
                stream: body.into_data_stream(),
                cancel_handle: cancel,
            });
            response = Response::from_parts(parts, body);
            Ok(response)
        }
    }
}

/// List the configured models in OpenAI format.
pub async fn list_models(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ModelList>> {
    authenticate(&headers, &state.registry)?;

    let created = chrono::Utc::now().timestamp();
    let data = state
        .registry
        .model_names()
        .into_iter()
        .map(|id| ModelInfo {
            id,
            object: "model".to_string(),
            created,
            owned_by: "organization".to_string(),
        })
        .collect();

    Ok(Json(ModelList {
        object: "list".to_string(),
        data,
    }))
}

/// Health check endpoint. Unauthenticated; reports configured models only,
/// never probes backends.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        models: state.registry.model_names(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Prometheus metrics endpoint.
pub async fn metrics_handler() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to encode metrics",
        )
            .into_response();
    }

    (
        StatusCode::OK,
        [("content-type", encoder.format_type().to_string())],
        buffer,
    )
        .into_response()
}
