//! Per-request usage accounting.
//!
//! Every request, whatever its outcome, produces exactly one [`UsageRecord`].
//! The record is emitted as a structured tracing event under the
//! `ollamao::usage` target; the subscriber owns formatting and sinks.
//!
//! A [`UsageRecorder`] is armed as soon as a request is received. Terminal
//! paths call [`UsageRecorder::finish`]; if the recorder is dropped without
//! finishing (client disconnected mid-stream, handler future cancelled), its
//! `Drop` emits the record with an `aborted` outcome. Emission happens at
//! most once either way.

use crate::core::metrics::get_metrics;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Terminal outcome identifiers used in usage records.
pub mod outcome {
    pub const COMPLETED: &str = "completed";
    pub const FAILED: &str = "failed";
    pub const ABORTED: &str = "aborted";
}

/// The accounting record emitted once per request.
#[derive(Debug, Clone)]
pub struct UsageRecord {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub request_id: String,
    pub model: String,
    pub principal: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub latency_ms: u64,
    pub outcome: String,
    pub error_kind: Option<String>,
}

/// Shared token tally a streaming relay updates as counts arrive.
#[derive(Default)]
pub struct TokenTally {
    prompt: AtomicU64,
    completion: AtomicU64,
}

impl TokenTally {
    pub fn set_prompt(&self, n: u64) {
        self.prompt.store(n, Ordering::Relaxed);
    }

    pub fn set_completion(&self, n: u64) {
        self.completion.store(n, Ordering::Relaxed);
    }

    pub fn prompt(&self) -> u64 {
        self.prompt.load(Ordering::Relaxed)
    }

    pub fn completion(&self) -> u64 {
        self.completion.load(Ordering::Relaxed)
    }
}

/// Emits exactly one usage record per request.
pub struct UsageRecorder {
    request_id: String,
    model: String,
    principal: Mutex<String>,
    started: Instant,
    tokens: Arc<TokenTally>,
    emitted: AtomicBool,
}

impl UsageRecorder {
    /// Arm a recorder at request receipt.
    pub fn new(request_id: impl Into<String>, model: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            request_id: request_id.into(),
            model: model.into(),
            principal: Mutex::new("anonymous".to_string()),
            started: Instant::now(),
            tokens: Arc::new(TokenTally::default()),
            emitted: AtomicBool::new(false),
        })
    }

    /// Record the authenticated principal once auth succeeds.
    pub fn set_principal(&self, name: &str) {
        *self.principal.lock().unwrap() = name.to_string();
    }

    /// Token tally shared with the relay / buffered handler.
    pub fn tokens(&self) -> Arc<TokenTally> {
        self.tokens.clone()
    }

    /// Emit the record with a terminal outcome. Later calls are no-ops.
    pub fn finish(&self, outcome: &str, error_kind: Option<&str>) {
        if self.emitted.swap(true, Ordering::SeqCst) {
            return;
        }

        let record = UsageRecord {
            timestamp: chrono::Utc::now(),
            request_id: self.request_id.clone(),
            model: self.model.clone(),
            principal: self.principal.lock().unwrap().clone(),
            prompt_tokens: self.tokens.prompt(),
            completion_tokens: self.tokens.completion(),
            latency_ms: self.started.elapsed().as_millis() as u64,
            outcome: outcome.to_string(),
            error_kind: error_kind.map(|k| k.to_string()),
        };

        emit(&record);
    }

    /// Whether the record has already been emitted.
    pub fn is_finished(&self) -> bool {
        self.emitted.load(Ordering::SeqCst)
    }
}

impl Drop for UsageRecorder {
    fn drop(&mut self) {
        // Reached only when no terminal path ran: the client went away.
        if !self.emitted.load(Ordering::SeqCst) {
            self.finish(outcome::ABORTED, None);
        }
    }
}

fn emit(record: &UsageRecord) {
    tracing::info!(
        target: "ollamao::usage",
        timestamp = %record.timestamp.to_rfc3339(),
        request_id = %record.request_id,
        model = %record.model,
        principal = %record.principal,
        prompt_tokens = record.prompt_tokens,
        completion_tokens = record.completion_tokens,
        latency_ms = record.latency_ms,
        outcome = %record.outcome,
        error_kind = record.error_kind.as_deref(),
        "usage"
    );

    let metrics = get_metrics();
    metrics
        .token_usage
        .with_label_values(&[&record.model, "prompt"])
        .inc_by(record.prompt_tokens);
    metrics
        .token_usage
        .with_label_values(&[&record.model, "completion"])
        .inc_by(record.completion_tokens);
    metrics
        .completed_requests
        .with_label_values(&[&record.model, &record.outcome])
        .inc();
}
