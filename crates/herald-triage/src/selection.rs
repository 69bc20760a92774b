//! Triage engine.
//!
//! Picks the actionable items for one request. In the default mode each
//! author contributes at most one item per call; older items from the same
//! author that were scanned before the batch filled up are skipped, counted
//! against the author, and may get the author blocked.
//!
//! A call runs in three phases: scan (read only), mark (conditional skip
//! writes) and escalate (counter and block). A failure in one write is logged
//! and does not undo or retry any other phase.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{debug, error, info, warn};

use herald_core::config::TriageConfig;
use herald_core::types::{
    now_millis, validate_author, AuditAction, AuditEntry, BlockReason, CandidateFilter, Item,
    SkipReason,
};
use herald_storage::ItemStore;

use crate::error::TriageError;
use crate::types::SelectionQuery;

pub struct TriageEngine {
    store: Arc<dyn ItemStore>,
    config: TriageConfig,
}

impl TriageEngine {
    pub fn new(store: Arc<dyn ItemStore>, config: TriageConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &TriageConfig {
        &self.config
    }

    /// Select up to `limit` actionable items, optionally for one author.
    pub fn select_actionable(
        &self,
        limit: usize,
        author: Option<&str>,
    ) -> Result<Vec<Item>, TriageError> {
        let query = SelectionQuery {
            limit,
            author: author.map(str::to_string),
            category: None,
        };
        self.select(&query)
    }

    pub fn select(&self, query: &SelectionQuery) -> Result<Vec<Item>, TriageError> {
        self.select_at(query, now_millis())
    }

    /// Select with an explicit clock for skip and block timestamps.
    pub fn select_at(
        &self,
        query: &SelectionQuery,
        now: DateTime<Utc>,
    ) -> Result<Vec<Item>, TriageError> {
        if query.limit == 0 || query.limit > self.config.max_limit {
            return Err(TriageError::Validation(format!(
                "limit must be within 1..={}, got {}",
                self.config.max_limit, query.limit
            )));
        }

        match &query.author {
            Some(raw_author) => {
                let author = validate_author(raw_author)?;
                self.select_single_author(&author, query)
            }
            None => self.select_deduplicated(query, now),
        }
    }

    fn select_single_author(
        &self,
        author: &str,
        query: &SelectionQuery,
    ) -> Result<Vec<Item>, TriageError> {
        if self.store.is_author_blocked(author)? {
            debug!(author, "Author is blocked, nothing to select");
            return Ok(Vec::new());
        }

        let filter = CandidateFilter::for_author(author).with_category(query.category);
        let selected: Vec<Item> = self
            .store
            .find_candidates(&filter, query.limit)?
            .into_iter()
            .filter(|item| filter.admits(item))
            .take(query.limit)
            .collect();

        debug!(author, selected = selected.len(), "Single-author selection");
        Ok(selected)
    }

    fn select_deduplicated(
        &self,
        query: &SelectionQuery,
        now: DateTime<Utc>,
    ) -> Result<Vec<Item>, TriageError> {
        let filter = CandidateFilter::any().with_category(query.category);
        let window = query.limit.saturating_mul(self.config.overfetch_factor);
        let candidates = self.store.find_candidates(&filter, window)?;

        // Scan
        let mut selected: Vec<Item> = Vec::with_capacity(query.limit);
        let mut duplicates: Vec<Item> = Vec::new();
        let mut seen_authors: HashSet<String> = HashSet::new();

        for item in candidates {
            if selected.len() >= query.limit {
                break;
            }
            if !filter.admits(&item) {
                continue;
            }
            if seen_authors.insert(item.author.clone()) {
                selected.push(item);
            } else {
                duplicates.push(item);
            }
        }

        // Mark and escalate
        let mut skipped = 0usize;
        for duplicate in &duplicates {
            if self.skip_duplicate(duplicate, now) {
                skipped += 1;
            }
        }

        info!(
            limit = query.limit,
            window,
            selected = selected.len(),
            skipped,
            "Triage selection complete"
        );
        Ok(selected)
    }

    /// Returns whether the skip was applied.
    fn skip_duplicate(&self, item: &Item, now: DateTime<Utc>) -> bool {
        match self
            .store
            .mark_skipped_if_open(item.internal_id, SkipReason::DuplicateAuthor, now)
        {
            Ok(true) => {}
            Ok(false) => {
                debug!(internal_id = %item.internal_id, "Item left open state concurrently, not skipped");
                return false;
            }
            Err(e) => {
                warn!(internal_id = %item.internal_id, error = %e, "Failed to mark duplicate as skipped");
                return false;
            }
        }

        let entry = AuditEntry::new(AuditAction::Skipped, item.author.clone())
            .with_item(item.internal_id)
            .with_metadata(json!({
                "reason": SkipReason::DuplicateAuthor.to_string(),
                "external_id": item.external_id,
            }))
            .at(now);
        if let Err(e) = self.store.append_audit(&entry) {
            error!(internal_id = %item.internal_id, error = %e, "Failed to write skip audit entry");
        }

        let skip_count = match self.store.increment_skip_count(&item.author) {
            Ok(count) => count,
            Err(e) => {
                warn!(author = %item.author, error = %e, "Failed to increment skip count");
                return true;
            }
        };

        if skip_count >= self.config.block_threshold {
            self.escalate(&item.author, skip_count, now);
        }
        true
    }

    fn escalate(&self, author: &str, skip_count: u64, now: DateTime<Utc>) {
        match self
            .store
            .block_author_if_unblocked(author, BlockReason::ExcessiveSkips, now)
        {
            Ok(true) => {
                warn!(
                    author,
                    skip_count,
                    threshold = self.config.block_threshold,
                    "Author blocked for excessive skipped items"
                );
                let entry = AuditEntry::new(AuditAction::Blocked, author)
                    .with_metadata(json!({
                        "reason": BlockReason::ExcessiveSkips.to_string(),
                        "skip_count": skip_count,
                        "threshold": self.config.block_threshold,
                    }))
                    .at(now);
                if let Err(e) = self.store.append_audit(&entry) {
                    error!(author, error = %e, "Failed to write block audit entry");
                }
            }
            Ok(false) => debug!(author, "Author already blocked"),
            Err(e) => warn!(author, error = %e, "Failed to block author"),
        }
    }
}
