//! Upstream connection handling for Ollama backends.
//!
//! One logical upstream call per inbound request. Buffered mode returns the
//! whole decoded payload; streaming mode returns a lazy, finite,
//! non-restartable sequence of chunks, one per NDJSON line from the backend.
//! Dropping the sequence drops the underlying response and closes the
//! connection, so cancellation never leaks an upstream socket.

use crate::api::models::{to_ollama_request, ChatCompletionRequest, OllamaChunk};
use crate::core::{AppError, ModelEntry, Result};
use futures::stream::{Stream, StreamExt};
use std::pin::Pin;
use std::time::Duration;

/// The chunk sequence produced in streaming mode.
///
/// Items arrive in backend order. A final `Err` item means the stream was
/// truncated or timed out; a clean end (after a `done` chunk) means success.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<OllamaChunk>> + Send + 'static>>;

/// HTTP client for talking to Ollama backends.
#[derive(Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    idle_timeout: Duration,
}

impl UpstreamClient {
    pub fn new(http: reqwest::Client, idle_timeout: Duration) -> Self {
        Self { http, idle_timeout }
    }

    async fn send(
        &self,
        backend: &ModelEntry,
        request: &ChatCompletionRequest,
        stream: bool,
    ) -> Result<reqwest::Response> {
        let url = format!("{}/api/chat", backend.base_url());
        let payload = to_ollama_request(request, &backend.model, stream);

        tracing::debug!(
            model = %backend.name,
            backend_model = %backend.model,
            stream = stream,
            "Opening upstream connection"
        );

        let mut builder = self.http.post(&url).json(&payload);
        if !stream {
            // Buffered waits are bounded by the per-model deadline; streams
            // use the idle timeout between chunks instead.
            builder = builder.timeout(Duration::from_secs(backend.timeout));
        }

        let send = builder.send();
        let sent = if stream {
            // The per-chunk idle timeout only starts once headers arrive, so
            // the connect/header wait needs its own bound: a backend that
            // accepts TCP but never responds must not park the request.
            tokio::time::timeout(self.idle_timeout, send)
                .await
                .map_err(|_| {
                    tracing::error!(
                        model = %backend.name,
                        idle_secs = self.idle_timeout.as_secs(),
                        "Upstream did not respond within the idle deadline"
                    );
                    AppError::UpstreamTimeout
                })?
        } else {
            send.await
        };

        let response = sent.map_err(|e| {
            tracing::error!(
                model = %backend.name,
                error = %e,
                is_timeout = e.is_timeout(),
                is_connect = e.is_connect(),
                "Upstream request failed"
            );
            AppError::from(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(
                model = %backend.name,
                status = status.as_u16(),
                body = %body,
                "Upstream returned error status"
            );
            return Err(AppError::UpstreamError {
                status: status.as_u16(),
            });
        }

        Ok(response)
    }

    /// Buffered mode: issue the request and decode the complete payload.
    pub async fn complete(
        &self,
        backend: &ModelEntry,
        request: &ChatCompletionRequest,
    ) -> Result<OllamaChunk> {
        let response = self.send(backend, request, false).await?;
        let chunk = response.json::<OllamaChunk>().await.map_err(|e| {
            tracing::error!(model = %backend.name, error = %e, "Invalid upstream payload");
            AppError::from(e)
        })?;
        Ok(chunk)
    }

    /// Streaming mode: open the connection and return the chunk sequence.
    ///
    /// The connection is committed (status received) before this returns, so
    /// the caller never writes a response frame for a backend that refused
    /// the request.
    pub async fn open_stream(
        &self,
        backend: &ModelEntry,
        request: &ChatCompletionRequest,
    ) -> Result<ChunkStream> {
        let response = self.send(backend, request, true).await?;
        let model_name = backend.name.clone();
        let idle_timeout = self.idle_timeout;
        let mut bytes_stream = response.bytes_stream();

        let stream = async_stream::try_stream! {
            let mut buf: Vec<u8> = Vec::new();
            let mut saw_done = false;

            'read: loop {
                let next = tokio::time::timeout(idle_timeout, bytes_stream.next())
                    .await
                    .map_err(|_| {
                        tracing::error!(
                            model = %model_name,
                            idle_secs = idle_timeout.as_secs(),
                            "Upstream stream idle timeout"
                        );
                        AppError::UpstreamTimeout
                    })?;

                let Some(item) = next else {
                    break 'read;
                };
                let bytes = item.map_err(|e| {
                    tracing::error!(
                        model = %model_name,
                        error = %e,
                        "Upstream connection dropped mid-stream"
                    );
                    AppError::StreamTruncated
                })?;

                buf.extend_from_slice(&bytes);
                while let Some(line) = drain_line(&mut buf) {
                    // Malformed lines are skipped rather than failing the
                    // whole stream.
                    let Some(chunk) = parse_chunk(&line) else {
                        continue;
                    };
                    let done = chunk.done;
                    yield chunk;
                    if done {
                        saw_done = true;
                        break 'read;
                    }
                }
            }

            // An EOF before the backend's done marker is a truncation, not
            // a clean end.
            if !saw_done {
                tracing::error!(model = %model_name, "Upstream stream ended without done marker");
                Err::<(), _>(AppError::StreamTruncated)?;
            }
        };

        Ok(Box::pin(stream))
    }
}

/// Remove and return the next newline-terminated line from `buf`, if any.
fn drain_line(buf: &mut Vec<u8>) -> Option<Vec<u8>> {
    let pos = buf.iter().position(|&b| b == b'\n')?;
    let mut line: Vec<u8> = buf.drain(..=pos).collect();
    line.pop(); // trailing newline
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    Some(line)
}

fn parse_chunk(line: &[u8]) -> Option<OllamaChunk> {
    if line.iter().all(|b| b.is_ascii_whitespace()) {
        return None;
    }
    match serde_json::from_slice::<OllamaChunk>(line) {
        Ok(chunk) => Some(chunk),
        Err(e) => {
            tracing::warn!(error = %e, "Skipping malformed upstream line");
            None
        }
    }
}
