//! Ingestion normalizer.
//!
//! Turns raw content-source items into canonical [`Item`] records and stores
//! them idempotently by external id.

use std::collections::HashSet;
use std::sync::{Arc, LazyLock};

use chrono::{DateTime, SubsecRound, Utc};
use regex::Regex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use herald_core::types::{now_millis, validate_author, Item, ItemState, RawItem};
use herald_storage::{ItemStore, UpsertOutcome};

use crate::error::TriageError;
use crate::types::{IngestFailure, IngestReport};

static MENTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@(\w+)").expect("valid mention regex"));

/// `@handle` tokens in order of first appearance, lowercased and
/// deduplicated.
pub fn extract_mentions(body: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    MENTION_RE
        .captures_iter(body)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_lowercase())
        .filter(|handle| seen.insert(handle.clone()))
        .collect()
}

/// Builds a fresh open [`Item`] from a raw one. Timestamps are kept at
/// millisecond precision, the precision the store keeps.
pub fn normalize(raw: &RawItem, now: DateTime<Utc>) -> Result<Item, TriageError> {
    let external_id = raw.external_id.trim();
    if external_id.is_empty() {
        return Err(TriageError::Validation(
            "external_id must not be empty".to_string(),
        ));
    }
    let author = validate_author(&raw.author)
        .map_err(|e| TriageError::Validation(format!("item {}: {}", external_id, e)))?;
    let now = now.trunc_subsecs(3);

    Ok(Item {
        internal_id: Uuid::new_v4(),
        external_id: external_id.to_string(),
        author,
        body: raw.body.clone(),
        url: raw.url.trim().to_string(),
        category: raw.category,
        created_at: raw.created_at.trunc_subsecs(3),
        state: ItemState::Open,
        skip_reason: None,
        skip_at: None,
        acted_at: None,
        result_id: None,
        first_seen_at: now,
        last_seen_at: now,
        mentioned_users: extract_mentions(&raw.body),
    })
}

/// Stores raw items, one upsert per item.
pub struct Normalizer {
    store: Arc<dyn ItemStore>,
}

impl Normalizer {
    pub fn new(store: Arc<dyn ItemStore>) -> Self {
        Self { store }
    }

    pub fn ingest(&self, raw_items: &[RawItem]) -> IngestReport {
        self.ingest_at(raw_items, now_millis())
    }

    /// Ingest with an explicit clock. A failing item is recorded in the
    /// report and does not stop the rest of the batch.
    pub fn ingest_at(&self, raw_items: &[RawItem], now: DateTime<Utc>) -> IngestReport {
        let mut report = IngestReport::default();

        for raw in raw_items {
            let outcome = normalize(raw, now).and_then(|item| {
                self.store
                    .upsert_item(&item, now)
                    .map_err(TriageError::from)
            });

            match outcome {
                Ok(UpsertOutcome::Created(item)) => {
                    debug!(external_id = %item.external_id, author = %item.author, "Ingested new item");
                    report.created += 1;
                }
                Ok(UpsertOutcome::Refreshed(_)) => report.refreshed += 1,
                Err(e) => {
                    warn!(external_id = %raw.external_id, error = %e, "Failed to ingest item");
                    report.failures.push(IngestFailure {
                        external_id: raw.external_id.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        if !raw_items.is_empty() {
            info!(
                created = report.created,
                refreshed = report.refreshed,
                failed = report.failures.len(),
                "Ingested batch"
            );
        }
        report
    }
}
