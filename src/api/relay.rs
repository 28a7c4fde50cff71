//! SSE relay: translates the upstream chunk sequence into OpenAI-style
//! `data:` frames.
//!
//! The relay is pull-based. Each frame is produced only after the previous
//! one has been accepted by the response body, so a slow client applies
//! back-pressure all the way to the upstream read instead of filling an
//! unbounded buffer. Dropping the body (client disconnect) drops the
//! upstream stream with it.

use crate::api::models::StreamChunk;
use crate::api::upstream::ChunkStream;
use crate::core::usage::outcome;
use crate::core::{get_metrics, AppError, CancelHandle, UsageRecorder};
use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::Response;
use bytes::Bytes;
use futures::stream::StreamExt;
use std::sync::Arc;

/// Decrements the active-stream gauge when the relay ends, including the
/// disconnect path where the body future is simply dropped.
struct StreamGauge {
    model: String,
}

impl StreamGauge {
    fn arm(model: &str) -> Self {
        get_metrics()
            .active_streams
            .with_label_values(&[model])
            .inc();
        Self {
            model: model.to_string(),
        }
    }
}

impl Drop for StreamGauge {
    fn drop(&mut self) {
        get_metrics()
            .active_streams
            .with_label_values(&[&self.model])
            .dec();
    }
}

fn sse_frame(chunk: &StreamChunk) -> Result<Bytes, serde_json::Error> {
    let json = serde_json::to_string(chunk)?;
    Ok(Bytes::from(format!("data: {}\n\n", json)))
}

fn sse_error_frame(error: &AppError) -> Bytes {
    let payload = serde_json::json!({
        "error": {
            "message": error.to_string(),
            "type": error.kind(),
            "code": error.status().as_u16(),
        }
    });
    Bytes::from(format!("data: {}\n\n", payload))
}

const SSE_DONE: &[u8] = b"data: [DONE]\n\n";

/// Build the streaming SSE response for one request.
///
/// Frame order: one role frame, one content frame per upstream chunk in
/// arrival order, a stop frame once the upstream reports done, then exactly
/// one `[DONE]` marker. If the upstream fails mid-stream, a single error
/// frame replaces the stop frame and `[DONE]` still terminates the body.
pub fn relay_stream(
    mut chunks: ChunkStream,
    recorder: Arc<UsageRecorder>,
    cancel: CancelHandle,
    request_id: &str,
    public_model: &str,
) -> Response {
    let id = format!("chatcmpl-{}", request_id);
    let model = public_model.to_string();
    let created = chrono::Utc::now().timestamp();
    let tokens = recorder.tokens();

    let body_stream = async_stream::stream! {
        let _gauge = StreamGauge::arm(&model);

        if let Ok(frame) = sse_frame(&StreamChunk::role(&id, created, &model)) {
            yield Ok::<Bytes, std::convert::Infallible>(frame);
        }

        let mut failed: Option<AppError> = None;
        while let Some(item) = chunks.next().await {
            match item {
                Ok(chunk) => {
                    if let Some(count) = chunk.prompt_eval_count {
                        tokens.set_prompt(count);
                    }
                    if let Some(count) = chunk.eval_count {
                        tokens.set_completion(count);
                    }
                    if chunk.done {
                        break;
                    }
                    match sse_frame(&StreamChunk::content(&id, created, &model, chunk.content())) {
                        Ok(frame) => yield Ok(frame),
                        Err(e) => {
                            failed = Some(AppError::from(e));
                            break;
                        }
                    }
                }
                Err(e) => {
                    failed = Some(e);
                    break;
                }
            }
        }

        match failed {
            None => {
                if let Ok(frame) = sse_frame(&StreamChunk::stop(&id, created, &model)) {
                    yield Ok(frame);
                }
                yield Ok(Bytes::from_static(SSE_DONE));
                cancel.mark_completed();
                recorder.finish(outcome::COMPLETED, None);
            }
            Some(error) => {
                tracing::error!(
                    model = %model,
                    error = %error,
                    kind = error.kind(),
                    "Stream relay failed"
                );
                yield Ok(sse_error_frame(&error));
                yield Ok(Bytes::from_static(SSE_DONE));
                cancel.mark_completed();
                recorder.finish(outcome::FAILED, Some(error.kind()));
            }
        }
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .body(Body::from_stream(body_stream))
        .unwrap_or_else(|_| {
            Response::new(Body::from("Failed to build streaming response"))
        })
}
