//! Request and result types for the triage and action layers.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use herald_core::types::Category;

use crate::error::{ExecutorError, TriageError};

/// What the executor is asked to publish.
///
/// `Reply` and `Quote` answer a triaged item. `Post` and `Repost` are
/// standalone and never change an item's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Reply,
    Quote,
    Post,
    Repost,
}

impl ActionKind {
    /// Whether the action answers an item and moves it to `Acted`.
    pub fn answers_item(self) -> bool {
        matches!(self, ActionKind::Reply | ActionKind::Quote)
    }

    /// Whether the action targets an existing post on the network.
    pub fn needs_target(self) -> bool {
        !matches!(self, ActionKind::Post)
    }

    /// Whether the action carries text.
    pub fn has_text(self) -> bool {
        !matches!(self, ActionKind::Repost)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::Reply => write!(f, "reply"),
            ActionKind::Quote => write!(f, "quote"),
            ActionKind::Post => write!(f, "post"),
            ActionKind::Repost => write!(f, "repost"),
        }
    }
}

/// The content to publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionPayload {
    pub kind: ActionKind,
    pub text: String,
}

impl ActionPayload {
    pub fn reply(text: impl Into<String>) -> Self {
        Self {
            kind: ActionKind::Reply,
            text: text.into(),
        }
    }

    pub fn quote(text: impl Into<String>) -> Self {
        Self {
            kind: ActionKind::Quote,
            text: text.into(),
        }
    }

    pub fn post(text: impl Into<String>) -> Self {
        Self {
            kind: ActionKind::Post,
            text: text.into(),
        }
    }

    pub fn repost() -> Self {
        Self {
            kind: ActionKind::Repost,
            text: String::new(),
        }
    }

    /// Text must be non-empty after trimming and at most `max_chars`
    /// characters long. A repost carries no text.
    pub fn validate(&self, max_chars: usize) -> Result<(), TriageError> {
        if !self.kind.has_text() {
            if !self.text.is_empty() {
                return Err(TriageError::Validation(
                    "a repost carries no text".to_string(),
                ));
            }
            return Ok(());
        }
        if self.text.trim().is_empty() {
            return Err(TriageError::Validation(
                "text must not be empty".to_string(),
            ));
        }
        let chars = self.text.chars().count();
        if chars > max_chars {
            return Err(TriageError::Validation(format!(
                "text is {} characters, maximum is {}",
                chars, max_chars
            )));
        }
        Ok(())
    }
}

/// What a successful `act_on_item` call did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub internal_id: Uuid,
    pub external_id: String,
    pub result_id: String,
    pub acted_at: DateTime<Utc>,
    pub kind: ActionKind,
}

/// What a successful standalone post or repost did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishOutcome {
    pub kind: ActionKind,
    /// External id of the reposted post; absent for a new post.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_ref: Option<String>,
    pub result_id: String,
    pub performed_at: DateTime<Utc>,
}

/// Parameters of a triage call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionQuery {
    pub limit: usize,
    /// Restrict to one author and switch to single-author mode.
    pub author: Option<String>,
    pub category: Option<Category>,
}

impl SelectionQuery {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            author: None,
            category: None,
        }
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }
}

/// Per-batch ingestion summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub created: usize,
    pub refreshed: usize,
    pub failures: Vec<IngestFailure>,
}

impl IngestReport {
    pub fn processed(&self) -> usize {
        self.created + self.refreshed
    }
}

/// One raw item that could not be ingested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestFailure {
    pub external_id: String,
    pub error: String,
}

/// What the executor is asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    /// External id of the post being answered or reposted.
    pub external_ref: Option<String>,
    /// Link to the target post, empty when unknown.
    pub url: String,
    pub payload: ActionPayload,
}

impl ExecutionRequest {
    /// Shape check every executor runs before touching the network.
    pub fn check(&self) -> Result<(), ExecutorError> {
        let kind = self.payload.kind;
        let target = self.external_ref.as_deref().map(str::trim);
        match (kind.needs_target(), target) {
            (true, None) | (true, Some("")) => {
                return Err(ExecutorError::InvalidPayload(format!(
                    "{} needs a target post",
                    kind
                )))
            }
            (false, Some(_)) => {
                return Err(ExecutorError::InvalidPayload(format!(
                    "{} must not target a post",
                    kind
                )))
            }
            _ => {}
        }
        if kind.has_text() && self.payload.text.trim().is_empty() {
            return Err(ExecutorError::InvalidPayload(format!(
                "{} needs text",
                kind
            )));
        }
        Ok(())
    }
}

/// Proof that the executor performed the action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionReceipt {
    pub result_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_validation() {
        assert!(ActionPayload::reply("thanks!").validate(280).is_ok());
        assert!(matches!(
            ActionPayload::reply("   ").validate(280),
            Err(TriageError::Validation(_))
        ));
        assert!(ActionPayload::quote("x".repeat(280)).validate(280).is_ok());
        assert!(ActionPayload::quote("x".repeat(281)).validate(280).is_err());
    }

    #[test]
    fn test_payload_counts_characters_not_bytes() {
        let text = "é".repeat(280);
        assert_eq!(text.len(), 560);
        assert!(ActionPayload::reply(text).validate(280).is_ok());
    }

    #[test]
    fn test_action_kind_serde() {
        let payload: ActionPayload =
            serde_json::from_str(r#"{"kind":"quote","text":"hi"}"#).unwrap();
        assert_eq!(payload.kind, ActionKind::Quote);
        assert_eq!(ActionKind::Reply.to_string(), "reply");
    }

    #[test]
    fn test_standalone_kinds() {
        assert!(ActionKind::Reply.answers_item());
        assert!(!ActionKind::Post.answers_item());
        assert!(!ActionKind::Repost.answers_item());

        assert!(ActionPayload::post("hello world").validate(280).is_ok());
        assert!(ActionPayload::post(" ").validate(280).is_err());
        assert!(ActionPayload::repost().validate(280).is_ok());

        let mut with_text = ActionPayload::repost();
        with_text.text = "extra".to_string();
        assert!(with_text.validate(280).is_err());
    }

    #[test]
    fn test_execution_request_check() {
        let reply = ExecutionRequest {
            external_ref: Some("1001".to_string()),
            url: String::new(),
            payload: ActionPayload::reply("thanks"),
        };
        assert!(reply.check().is_ok());

        let untargeted = ExecutionRequest {
            external_ref: None,
            ..reply.clone()
        };
        assert!(matches!(
            untargeted.check(),
            Err(ExecutorError::InvalidPayload(_))
        ));

        let post = ExecutionRequest {
            external_ref: None,
            url: String::new(),
            payload: ActionPayload::post("news"),
        };
        assert!(post.check().is_ok());
        let targeted_post = ExecutionRequest {
            external_ref: Some("1001".to_string()),
            ..post
        };
        assert!(targeted_post.check().is_err());

        let blank_repost = ExecutionRequest {
            external_ref: Some("  ".to_string()),
            url: String::new(),
            payload: ActionPayload::repost(),
        };
        assert!(blank_repost.check().is_err());
    }

    #[test]
    fn test_selection_query_builder() {
        let query = SelectionQuery::new(5)
            .author("alice")
            .category(Category::AuthoredPost);
        assert_eq!(query.limit, 5);
        assert_eq!(query.author.as_deref(), Some("alice"));
        assert_eq!(query.category, Some(Category::AuthoredPost));
    }
}
