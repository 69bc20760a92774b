//! State transition manager.
//!
//! Sequences an action as: validate, check the item is open, execute, then
//! compare-and-set the item to `Acted`. The external action happens before the
//! store write, so a store failure after a successful action leaves the item
//! open even though the reply exists. That gap is logged at error level.
//!
//! Standalone posts and reposts go through the same executor and timeout but
//! touch no item state; they only leave an audit entry.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use herald_core::config::ActionsConfig;
use herald_core::types::{now_millis, AuditAction, AuditEntry, Item, ItemState};
use herald_storage::ItemStore;

use crate::error::{ExecutorError, TriageError};
use crate::executor::ActionExecutor;
use crate::state_machine::validate_transition;
use crate::types::{
    ActionKind, ActionOutcome, ActionPayload, ExecutionReceipt, ExecutionRequest, PublishOutcome,
};

pub struct StateTransitionManager {
    store: Arc<dyn ItemStore>,
    executor: Arc<dyn ActionExecutor>,
    config: ActionsConfig,
}

impl StateTransitionManager {
    pub fn new(
        store: Arc<dyn ItemStore>,
        executor: Arc<dyn ActionExecutor>,
        config: ActionsConfig,
    ) -> Self {
        Self {
            store,
            executor,
            config,
        }
    }

    /// Perform `payload` on the item and record it as acted.
    ///
    /// At most one concurrent caller succeeds for a given item; the others
    /// get `AlreadyTerminal`, either before calling the executor or after
    /// losing the compare-and-set.
    pub async fn act_on_item(
        &self,
        internal_id: Uuid,
        payload: ActionPayload,
    ) -> Result<ActionOutcome, TriageError> {
        payload.validate(self.config.max_text_chars)?;
        if !payload.kind.answers_item() {
            return Err(TriageError::Validation(format!(
                "a {} does not answer an item",
                payload.kind
            )));
        }

        let item = self
            .store
            .get_item(internal_id)?
            .ok_or(TriageError::NotFound(internal_id))?;
        validate_transition(item.internal_id, item.state, ItemState::Acted)?;

        let request = ExecutionRequest {
            external_ref: Some(item.external_id.clone()),
            url: item.url.clone(),
            payload: payload.clone(),
        };

        let receipt = match self.run(&request).await {
            Ok(receipt) => receipt,
            Err(e) => {
                warn!(
                    internal_id = %internal_id,
                    executor = self.executor.name(),
                    error = %e,
                    "Action failed, item stays open"
                );
                self.record(
                    AuditEntry::new(AuditAction::Acted, item.author.clone())
                        .with_item(internal_id)
                        .with_error(e.to_string())
                        .with_metadata(action_metadata(&payload)),
                );
                return Err(TriageError::ExecutorFailure(e));
            }
        };

        let acted_at = now_millis();
        match self
            .store
            .mark_acted_if_open(internal_id, &receipt.result_id, acted_at)
        {
            Ok(true) => {
                info!(
                    internal_id = %internal_id,
                    result_id = %receipt.result_id,
                    kind = %payload.kind,
                    "Item acted"
                );
                self.record(
                    AuditEntry::new(AuditAction::Acted, item.author.clone())
                        .with_item(internal_id)
                        .with_result_id(receipt.result_id.clone())
                        .with_metadata(action_metadata(&payload))
                        .at(acted_at),
                );
                Ok(ActionOutcome {
                    internal_id,
                    external_id: item.external_id,
                    result_id: receipt.result_id,
                    acted_at,
                    kind: payload.kind,
                })
            }
            Ok(false) => {
                let state = self.current_state(&item);
                warn!(
                    internal_id = %internal_id,
                    orphaned_result_id = %receipt.result_id,
                    state = %state,
                    "Lost race to mark item acted"
                );
                let mut metadata = action_metadata(&payload);
                metadata["orphaned_result_id"] = json!(receipt.result_id);
                self.record(
                    AuditEntry::new(AuditAction::Acted, item.author.clone())
                        .with_item(internal_id)
                        .with_error(format!("item already {}", state))
                        .with_metadata(metadata),
                );
                Err(TriageError::AlreadyTerminal { internal_id, state })
            }
            Err(e) => {
                error!(
                    internal_id = %internal_id,
                    result_id = %receipt.result_id,
                    error = %e,
                    "Action succeeded but marking the item acted failed; item remains open"
                );
                let mut metadata = action_metadata(&payload);
                metadata["unrecorded_result_id"] = json!(receipt.result_id);
                self.record(
                    AuditEntry::new(AuditAction::Acted, item.author.clone())
                        .with_item(internal_id)
                        .with_error(format!("store write failed: {}", e))
                        .with_metadata(metadata),
                );
                Err(TriageError::StoreUnavailable(e.to_string()))
            }
        }
    }

    /// Publish a new post. No item is involved.
    pub async fn post(&self, text: impl Into<String>) -> Result<PublishOutcome, TriageError> {
        let payload = ActionPayload::post(text);
        payload.validate(self.config.max_text_chars)?;
        let request = ExecutionRequest {
            external_ref: None,
            url: String::new(),
            payload,
        };
        self.publish(request, None).await
    }

    /// Repost a post by its external id. A stored item with that id is
    /// linked in the audit entry but keeps its state.
    pub async fn repost(&self, external_id: &str) -> Result<PublishOutcome, TriageError> {
        let external_id = external_id.trim();
        if external_id.is_empty() {
            return Err(TriageError::Validation(
                "external_id must not be empty".to_string(),
            ));
        }
        let target = self.store.get_item_by_external_id(external_id)?;
        let request = ExecutionRequest {
            external_ref: Some(external_id.to_string()),
            url: target.as_ref().map(|i| i.url.clone()).unwrap_or_default(),
            payload: ActionPayload::repost(),
        };
        self.publish(request, target.as_ref()).await
    }

    async fn publish(
        &self,
        request: ExecutionRequest,
        target: Option<&Item>,
    ) -> Result<PublishOutcome, TriageError> {
        let kind = request.payload.kind;
        let action = match kind {
            ActionKind::Repost => AuditAction::Reposted,
            _ => AuditAction::Posted,
        };
        let mut entry = AuditEntry::new(
            action,
            target.map(|i| i.author.clone()).unwrap_or_default(),
        )
        .with_metadata(publish_metadata(&request));
        if let Some(item) = target {
            entry = entry.with_item(item.internal_id);
        }

        match self.run(&request).await {
            Ok(receipt) => {
                let performed_at = now_millis();
                info!(
                    kind = %kind,
                    external_ref = request.external_ref.as_deref().unwrap_or("-"),
                    result_id = %receipt.result_id,
                    "Published"
                );
                self.record(
                    entry
                        .with_result_id(receipt.result_id.clone())
                        .at(performed_at),
                );
                Ok(PublishOutcome {
                    kind,
                    external_ref: request.external_ref,
                    result_id: receipt.result_id,
                    performed_at,
                })
            }
            Err(e) => {
                warn!(
                    kind = %kind,
                    executor = self.executor.name(),
                    error = %e,
                    "Publish failed"
                );
                self.record(entry.with_error(e.to_string()));
                Err(TriageError::ExecutorFailure(e))
            }
        }
    }

    /// Call the executor, treating an expired timeout as a failure.
    async fn run(&self, request: &ExecutionRequest) -> Result<ExecutionReceipt, ExecutorError> {
        let timeout_secs = self.config.executor_timeout_secs;
        match tokio::time::timeout(
            Duration::from_secs(timeout_secs),
            self.executor.execute(request),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ExecutorError::Timeout(timeout_secs)),
        }
    }

    fn current_state(&self, item: &Item) -> ItemState {
        match self.store.get_item(item.internal_id) {
            Ok(Some(current)) if current.state.is_terminal() => current.state,
            _ => ItemState::Acted,
        }
    }

    fn record(&self, entry: AuditEntry) {
        if let Err(e) = self.store.append_audit(&entry) {
            error!(
                action = %entry.action_type,
                item = ?entry.item_internal_id,
                error = %e,
                "Failed to write audit entry"
            );
        }
    }
}

fn action_metadata(payload: &ActionPayload) -> serde_json::Value {
    json!({
        "kind": payload.kind,
        "text": payload.text,
        "quoted": payload.kind == ActionKind::Quote,
    })
}

fn publish_metadata(request: &ExecutionRequest) -> serde_json::Value {
    match request.payload.kind {
        ActionKind::Repost => json!({
            "kind": request.payload.kind,
            "external_ref": request.external_ref,
        }),
        kind => json!({
            "kind": kind,
            "text": request.payload.text,
        }),
    }
}
