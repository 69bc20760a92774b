//! The persistence seam used by the triage and action layers.
//!
//! `ItemStore` exposes typed primitives only: upsert by external id, filtered
//! reads, compare-and-set updates and counters. Business rules (dedup,
//! thresholds, sequencing) live in `herald-triage`.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use herald_core::error::Result;
use herald_core::types::{AuditEntry, AuthorRecord, BlockReason, CandidateFilter, Item, SkipReason};

/// Result of upserting an item by external id.
#[derive(Debug, Clone, PartialEq)]
pub enum UpsertOutcome {
    /// No item with this external id existed; the given record was stored.
    Created(Item),
    /// An item already existed; only `last_seen_at` was refreshed.
    Refreshed(Item),
}

impl UpsertOutcome {
    pub fn item(&self) -> &Item {
        match self {
            UpsertOutcome::Created(item) | UpsertOutcome::Refreshed(item) => item,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, UpsertOutcome::Created(_))
    }
}

/// Storage primitives for items, author records and the audit log.
///
/// Every `*_if_*` method is a conditional write and returns whether it was
/// applied. A `false` return means another writer got there first.
pub trait ItemStore: Send + Sync {
    /// Insert `item` unless its external id is already known, in which case
    /// only `last_seen_at` is set to `now`. Never touches state.
    fn upsert_item(&self, item: &Item, now: DateTime<Utc>) -> Result<UpsertOutcome>;

    fn get_item(&self, internal_id: Uuid) -> Result<Option<Item>>;

    fn get_item_by_external_id(&self, external_id: &str) -> Result<Option<Item>>;

    /// Open items of non-blocked authors matching `filter`, most recent first
    /// (`created_at` descending, then insertion order descending).
    fn find_candidates(&self, filter: &CandidateFilter, limit: usize) -> Result<Vec<Item>>;

    /// `Open -> Skipped`, only if the item is still open.
    fn mark_skipped_if_open(
        &self,
        internal_id: Uuid,
        reason: SkipReason,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    /// `Open -> Acted`, only if the item is still open.
    fn mark_acted_if_open(
        &self,
        internal_id: Uuid,
        result_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    /// Increment (creating at 1) the author's skip counter and return the new
    /// value.
    fn increment_skip_count(&self, author: &str) -> Result<u64>;

    /// Block the author unless already blocked.
    fn block_author_if_unblocked(
        &self,
        author: &str,
        reason: BlockReason,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    fn get_author(&self, author: &str) -> Result<Option<AuthorRecord>>;

    fn is_author_blocked(&self, author: &str) -> Result<bool>;

    fn append_audit(&self, entry: &AuditEntry) -> Result<()>;

    /// Most recent audit entries first, optionally restricted to one item.
    fn list_audit(&self, item_internal_id: Option<Uuid>, limit: usize) -> Result<Vec<AuditEntry>>;

    fn count_items(&self) -> Result<u64>;
}
