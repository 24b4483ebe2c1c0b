//! Progress-callback trait for per-item pipeline events.
//!
//! Inject an [`Arc<dyn RunProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! real-time events as the pipeline works through the batch.
//!
//! Callbacks are the least-invasive integration point: callers can
//! forward events to a terminal progress bar, a log file, or a channel
//! without the library knowing how the host application communicates.

use std::sync::Arc;

/// Convenience alias for the injected callback handle.
pub type ProgressCallback = Arc<dyn RunProgressCallback>;

/// Called by the pipeline as it processes each product.
///
/// Items are processed strictly sequentially, so implementations need no
/// internal synchronisation; the trait is `Send + Sync` only so the
/// handle can be shared with the orchestrator task. All methods have
/// default no-op implementations so callers only override what they
/// care about.
pub trait RunProgressCallback: Send + Sync {
    /// Called once before any item is processed.
    ///
    /// # Arguments
    /// * `total_items` — number of URLs in the batch
    fn on_run_start(&self, total_items: usize) {
        let _ = total_items;
    }

    /// Called just before an item's extraction begins.
    ///
    /// # Arguments
    /// * `index` — 1-indexed position in the batch
    /// * `total` — batch size
    /// * `url`   — raw input URL
    fn on_item_start(&self, index: usize, total: usize, url: &str) {
        let _ = (index, total, url);
    }

    /// Called when an item completes the full pipeline and is recorded.
    ///
    /// # Arguments
    /// * `index`       — 1-indexed position in the batch
    /// * `total`       — batch size
    /// * `internal_id` — ledger id assigned to the product
    /// * `title`       — extracted product title
    fn on_item_complete(&self, index: usize, total: usize, internal_id: u64, title: &str) {
        let _ = (index, total, internal_id, title);
    }

    /// Called when an item is skipped because its identifier is already
    /// in the ledger.
    fn on_item_skipped(&self, index: usize, total: usize, identifier: &str) {
        let _ = (index, total, identifier);
    }

    /// Called when an item fails. The run continues with the next item.
    ///
    /// # Arguments
    /// * `reason` — human-readable failure description
    fn on_item_failed(&self, index: usize, total: usize, reason: &str) {
        let _ = (index, total, reason);
    }

    /// Called once after the last item, with final counts.
    fn on_run_complete(&self, succeeded: usize, skipped: usize, failed: usize) {
        let _ = (succeeded, skipped, failed);
    }
}
