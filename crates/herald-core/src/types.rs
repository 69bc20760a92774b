//! Domain types shared by every Herald crate.
//!
//! Items, author records and audit entries, plus the enumerations that are
//! persisted as text columns.

use std::fmt;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::HeraldError;

// =============================================================================
// Enums
// =============================================================================

/// Where an item came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// A post that mentions the account.
    Mention,
    /// A post authored by a watched account.
    AuthoredPost,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Mention => write!(f, "mention"),
            Category::AuthoredPost => write!(f, "authored_post"),
        }
    }
}

impl std::str::FromStr for Category {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mention" => Ok(Category::Mention),
            "authored_post" => Ok(Category::AuthoredPost),
            _ => Err(format!("Unknown category: {}", s)),
        }
    }
}

/// Item lifecycle states.
///
/// `Open -> Acted` and `Open -> Skipped` are the only transitions; both
/// targets are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemState {
    Open,
    Acted,
    Skipped,
}

impl ItemState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ItemState::Open)
    }
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemState::Open => write!(f, "open"),
            ItemState::Acted => write!(f, "acted"),
            ItemState::Skipped => write!(f, "skipped"),
        }
    }
}

impl std::str::FromStr for ItemState {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(ItemState::Open),
            "acted" => Ok(ItemState::Acted),
            "skipped" => Ok(ItemState::Skipped),
            _ => Err(format!("Unknown item state: {}", s)),
        }
    }
}

/// Why an item was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// A more recent item from the same author was selected in the same call.
    DuplicateAuthor,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::DuplicateAuthor => write!(f, "duplicate_author"),
        }
    }
}

impl std::str::FromStr for SkipReason {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "duplicate_author" => Ok(SkipReason::DuplicateAuthor),
            _ => Err(format!("Unknown skip reason: {}", s)),
        }
    }
}

/// Why an author was blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    ExcessiveSkips,
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockReason::ExcessiveSkips => write!(f, "excessive_skips"),
        }
    }
}

impl std::str::FromStr for BlockReason {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "excessive_skips" => Ok(BlockReason::ExcessiveSkips),
            _ => Err(format!("Unknown block reason: {}", s)),
        }
    }
}

/// Kind of transition an audit entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Acted,
    Skipped,
    Blocked,
    /// A standalone post with no item behind it.
    Posted,
    Reposted,
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditAction::Acted => write!(f, "acted"),
            AuditAction::Skipped => write!(f, "skipped"),
            AuditAction::Blocked => write!(f, "blocked"),
            AuditAction::Posted => write!(f, "posted"),
            AuditAction::Reposted => write!(f, "reposted"),
        }
    }
}

impl std::str::FromStr for AuditAction {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "acted" => Ok(AuditAction::Acted),
            "skipped" => Ok(AuditAction::Skipped),
            "blocked" => Ok(AuditAction::Blocked),
            "posted" => Ok(AuditAction::Posted),
            "reposted" => Ok(AuditAction::Reposted),
            _ => Err(format!("Unknown audit action: {}", s)),
        }
    }
}

// =============================================================================
// Domain Structs
// =============================================================================

/// An item as delivered by a content source, before normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawItem {
    pub external_id: String,
    pub author: String,
    pub body: String,
    #[serde(default)]
    pub url: String,
    pub created_at: DateTime<Utc>,
    pub category: Category,
}

/// A canonical, persisted item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub internal_id: Uuid,
    pub external_id: String,
    pub author: String,
    pub body: String,
    pub url: String,
    pub category: Category,
    pub created_at: DateTime<Utc>,
    pub state: ItemState,
    pub skip_reason: Option<SkipReason>,
    pub skip_at: Option<DateTime<Utc>>,
    pub acted_at: Option<DateTime<Utc>>,
    pub result_id: Option<String>,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub mentioned_users: Vec<String>,
}

/// The read-only projection of an item handed to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemView {
    pub internal_id: Uuid,
    pub external_id: String,
    pub author: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub url: String,
    pub category: Category,
    pub state: ItemState,
    pub skip_reason: Option<SkipReason>,
    pub acted_at: Option<DateTime<Utc>>,
    pub result_id: Option<String>,
}

impl From<&Item> for ItemView {
    fn from(item: &Item) -> Self {
        Self {
            internal_id: item.internal_id,
            external_id: item.external_id.clone(),
            author: item.author.clone(),
            body: item.body.clone(),
            created_at: item.created_at,
            url: item.url.clone(),
            category: item.category,
            state: item.state,
            skip_reason: item.skip_reason,
            acted_at: item.acted_at,
            result_id: item.result_id.clone(),
        }
    }
}

/// Per-author abuse bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorRecord {
    pub author: String,
    pub skip_count: u64,
    pub blocked: bool,
    pub blocked_at: Option<DateTime<Utc>>,
    pub blocked_reason: Option<BlockReason>,
}

/// One append-only audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub action_type: AuditAction,
    /// Absent for author-level entries such as `Blocked`.
    pub item_internal_id: Option<Uuid>,
    pub author: String,
    pub result_id: Option<String>,
    pub success: bool,
    pub error: Option<String>,
    pub performed_at: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

impl AuditEntry {
    /// Start a successful entry stamped now; adjust with the `with_*` helpers.
    pub fn new(action_type: AuditAction, author: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            action_type,
            item_internal_id: None,
            author: author.into(),
            result_id: None,
            success: true,
            error: None,
            performed_at: now_millis(),
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_item(mut self, internal_id: Uuid) -> Self {
        self.item_internal_id = Some(internal_id);
        self
    }

    pub fn with_result_id(mut self, result_id: impl Into<String>) -> Self {
        self.result_id = Some(result_id.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.success = false;
        self.error = Some(error.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn at(mut self, performed_at: DateTime<Utc>) -> Self {
        self.performed_at = performed_at;
        self
    }
}

// =============================================================================
// Candidate predicate
// =============================================================================

/// Which open items a triage call may consider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateFilter {
    /// Normalized author handle; `None` admits every author.
    pub author: Option<String>,
    pub category: Option<Category>,
}

impl CandidateFilter {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn for_author(author: impl Into<String>) -> Self {
        Self {
            author: Some(author.into()),
            category: None,
        }
    }

    pub fn with_category(mut self, category: Option<Category>) -> Self {
        self.category = category;
        self
    }

    /// The candidate-set predicate: open and matching the optional author
    /// and category. Blocked authors are excluded by the store query.
    pub fn admits(&self, item: &Item) -> bool {
        item.state == ItemState::Open
            && self.author.as_deref().map_or(true, |a| a == item.author)
            && self.category.map_or(true, |c| c == item.category)
    }
}

/// Canonical form of an author handle: trimmed, leading `@` removed,
/// lowercased.
pub fn normalize_author(raw: &str) -> String {
    raw.trim().trim_start_matches('@').trim().to_lowercase()
}

/// Normalize a handle and check it is made only of letters, digits and `_`.
///
/// Ingestion and author-filtered triage apply the same rule, so every stored
/// author can also be selected by name.
pub fn validate_author(raw: &str) -> Result<String, HeraldError> {
    let author = normalize_author(raw);
    if author.is_empty() {
        return Err(HeraldError::Validation(
            "author must not be empty".to_string(),
        ));
    }
    if !author.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Err(HeraldError::Validation(format!(
            "invalid author handle: {}",
            raw.trim()
        )));
    }
    Ok(author)
}

/// Current time truncated to the millisecond precision timestamps are
/// stored with.
pub fn now_millis() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}
