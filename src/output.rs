//! Run results: per-item reports and the aggregate summary.
//!
//! The orchestrator never throws per-item errors at the caller; it folds
//! every outcome into an [`ItemReport`] and hands back a [`RunReport`]
//! whose [`RunSummary`] carries the success/skip/failure counts the
//! caller prints or asserts on. Everything here serialises so the CLI
//! can emit the whole report as JSON.

use crate::error::ItemError;
use serde::{Deserialize, Serialize};

/// Terminal state of one batch item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ItemOutcome {
    /// The product was extracted, rendered, and recorded in the ledger.
    Recorded {
        /// Ledger id assigned to the product.
        internal_id: u64,
        /// Path of the generated card image.
        image_path: String,
        /// Extracted product title.
        title: String,
    },
    /// The identifier was already in the ledger; nothing was done.
    Skipped,
    /// The item failed; the run continued with the next item.
    Failed { error: ItemError },
}

/// What happened to a single input URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemReport {
    /// 1-indexed position in the input batch.
    pub index: usize,
    /// Raw input URL.
    pub url: String,
    /// Canonical identifier, when normalisation succeeded.
    pub identifier: Option<String>,
    /// Terminal state.
    pub outcome: ItemOutcome,
    /// Wall-clock time spent on this item in milliseconds.
    pub duration_ms: u64,
}

impl ItemReport {
    /// Human-readable failure reason, when the item failed.
    pub fn failure_reason(&self) -> Option<String> {
        match &self.outcome {
            ItemOutcome::Failed { error } => Some(error.to_string()),
            _ => None,
        }
    }

    /// True when the item completed the full pipeline.
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, ItemOutcome::Recorded { .. })
    }
}

/// Aggregate counts for a finished run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Items recorded in the ledger this run.
    pub succeeded: usize,
    /// Items already present in the ledger.
    pub skipped: usize,
    /// Items that failed extraction or rendering.
    pub failed: usize,
}

impl RunSummary {
    /// Derive counts from a slice of item reports.
    pub fn from_items(items: &[ItemReport]) -> Self {
        let mut summary = Self::default();
        for item in items {
            match item.outcome {
                ItemOutcome::Recorded { .. } => summary.succeeded += 1,
                ItemOutcome::Skipped => summary.skipped += 1,
                ItemOutcome::Failed { .. } => summary.failed += 1,
            }
        }
        summary
    }

    /// Total items the summary accounts for.
    pub fn total(&self) -> usize {
        self.succeeded + self.skipped + self.failed
    }
}

/// Complete result of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Per-item outcomes, in input order.
    pub items: Vec<ItemReport>,
    /// Aggregate counts.
    pub summary: RunSummary,
    /// Wall-clock duration of the whole run in milliseconds.
    pub total_duration_ms: u64,
    /// True when a stop signal ended the run before the last item.
    pub stopped_early: bool,
}
