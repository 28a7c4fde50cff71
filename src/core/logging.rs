//! Logging utilities with per-request context.
//!
//! Task-local storage carries the request ID and model name through the
//! handler call chain so log lines can include them without threading the
//! values through every function signature.

tokio::task_local! {
    /// Task-local storage for the current request ID.
    pub static REQUEST_ID: String;
}

tokio::task_local! {
    /// Task-local storage for the model name being served.
    pub static MODEL_CONTEXT: String;
}

/// Get the current request ID from context, if set.
///
/// Returns an empty string if no request ID is set.
pub fn get_request_id() -> String {
    REQUEST_ID.try_with(|id| id.clone()).unwrap_or_default()
}

/// Get the current model name from context, if set.
pub fn get_model_context() -> String {
    MODEL_CONTEXT.try_with(|m| m.clone()).unwrap_or_default()
}

/// Generate a new unique request ID using UUID v4.
pub fn generate_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Execute an async block with request context (request_id, model).
///
/// # Example
///
/// ```ignore
/// with_request_context!(request_id, model_name, async {
///     // handler logic here
/// })
/// ```
#[macro_export]
macro_rules! with_request_context {
    ($request_id:expr, $model:expr, $body:expr) => {
        $crate::core::logging::REQUEST_ID
            .scope($request_id, async {
                $crate::core::logging::MODEL_CONTEXT
                    .scope($model, $body)
                    .await
            })
            .await
    };
    ($request_id:expr, $body:expr) => {
        $crate::core::logging::REQUEST_ID
            .scope($request_id, $body)
            .await
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_request_id_get() {
        REQUEST_ID
            .scope("test-request-123".to_string(), async {
                assert_eq!(get_request_id(), "test-request-123");
            })
            .await;
    }

    #[tokio::test]
    async fn test_request_id_default() {
        assert_eq!(get_request_id(), "");
    }

    #[tokio::test]
    async fn test_request_id_isolation() {
        let task1 = tokio::spawn(async {
            REQUEST_ID
                .scope("request-1".to_string(), async {
                    tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;
                    get_request_id()
                })
                .await
        });

        let task2 = tokio::spawn(async {
            REQUEST_ID
                .scope("request-2".to_string(), async {
                    tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;
                    get_request_id()
                })
                .await
        });

        assert_eq!(task1.await.unwrap(), "request-1");
        assert_eq!(task2.await.unwrap(), "request-2");
    }

    #[tokio::test]
    async fn test_nested_contexts() {
        REQUEST_ID
            .scope("req-456".to_string(), async {
                MODEL_CONTEXT
                    .scope("llama3".to_string(), async {
                        assert_eq!(get_request_id(), "req-456");
                        assert_eq!(get_model_context(), "llama3");
                    })
                    .await
            })
            .await;
    }

    #[tokio::test]
    async fn test_generate_request_id() {
        let id1 = generate_request_id();
        let id2 = generate_request_id();

        // UUIDs are 36 chars including hyphens, and unique
        assert_eq!(id1.len(), 36);
        assert_ne!(id1, id2);
    }
}
