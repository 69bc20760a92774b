//! Action executors.
//!
//! An executor publishes a reply, quote, post or repost on the origin
//! network. Every executor rejects malformed requests with
//! [`ExecutorError::InvalidPayload`] before doing any work. The
//! crate ships two implementations: [`DryRunExecutor`], which only logs, and
//! [`MockExecutor`], a scripted executor for tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::ExecutorError;
use crate::types::{ExecutionReceipt, ExecutionRequest};

/// Performs actions against the origin network.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionReceipt, ExecutorError>;
}

/// Logs the action and returns a synthetic result id.
#[derive(Debug, Default)]
pub struct DryRunExecutor;

#[async_trait]
impl ActionExecutor for DryRunExecutor {
    fn name(&self) -> &str {
        "dry_run"
    }

    async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionReceipt, ExecutorError> {
        request.check()?;
        let result_id = format!("dry-run-{}", Uuid::new_v4());
        tracing::info!(
            external_ref = request.external_ref.as_deref().unwrap_or("-"),
            url = %request.url,
            kind = %request.payload.kind,
            chars = request.payload.text.chars().count(),
            result_id = %result_id,
            "Dry-run action"
        );
        Ok(ExecutionReceipt { result_id })
    }
}

/// Scripted outcome for [`MockExecutor`].
#[derive(Debug, Clone)]
pub enum MockBehavior {
    Succeed,
    Fail(String),
}

/// Test executor with a fixed outcome, optional latency and a call counter.
#[derive(Debug)]
pub struct MockExecutor {
    behavior: MockBehavior,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockExecutor {
    pub fn succeeding() -> Self {
        Self {
            behavior: MockBehavior::Succeed,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            behavior: MockBehavior::Fail(message.into()),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Sleep this long inside every call before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of `execute` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ActionExecutor for MockExecutor {
    fn name(&self) -> &str {
        "mock"
    }

    async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionReceipt, ExecutorError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        request.check()?;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.behavior {
            MockBehavior::Succeed => Ok(ExecutionReceipt {
                result_id: format!(
                    "mock-{}-{}",
                    request.external_ref.as_deref().unwrap_or("post"),
                    call
                ),
            }),
            MockBehavior::Fail(message) => Err(ExecutorError::Failed(message.clone())),
        }
    }
}
