//! Error types for the dealcard library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`DealcardError`] — **Fatal**: the run cannot proceed at all
//!   (ledger unwritable, invalid configuration). Returned as
//!   `Err(DealcardError)` from the top-level [`crate::run`] entry point.
//!
//! * [`ItemError`] — **Non-fatal**: a single product failed (bad URL,
//!   upstream data unavailable, render glitch) but the rest of the batch
//!   is fine. Stored inside [`crate::output::ItemReport`] so callers can
//!   inspect partial success rather than losing the whole run to one bad
//!   product.
//!
//! The separation matches the idempotence contract: everything per-item
//! is caught and reported, but a ledger that cannot be trusted ends the
//! run immediately — continuing without a durable record would reprocess
//! products on the next invocation.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the dealcard library.
///
/// Item-level failures use [`ItemError`] and are stored in
/// [`crate::output::ItemReport`] rather than propagated here.
#[derive(Debug, Error)]
pub enum DealcardError {
    /// The processing ledger could not be persisted.
    #[error("Failed to persist ledger '{path}': {source}\nCheck the directory exists and is writable.")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The ledger document could not be serialised.
    #[error("Failed to encode ledger: {0}")]
    LedgerEncoding(#[from] serde_json::Error),

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Why an extraction attempt produced no usable product data.
///
/// Attached to [`ItemError::Extraction`]; the variant decides nothing on
/// its own — retry policy lives with the static fetch (exactly one retry
/// on timeout) and the orchestrator treats every reason the same way:
/// record, log, move on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ExtractionReason {
    /// Neither strategy yielded a title and a current price.
    NotFound,
    /// A network operation exceeded its bounded timeout.
    Timeout,
    /// The response arrived but could not be parsed as a product page.
    ParseFailure,
    /// The upstream refused the request (HTTP 403/429).
    Blocked,
}

impl std::fmt::Display for ExtractionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotFound => "not found",
            Self::Timeout => "timeout",
            Self::ParseFailure => "parse failure",
            Self::Blocked => "blocked",
        };
        f.write_str(s)
    }
}

/// A non-fatal error for a single product.
///
/// Stored inside [`crate::output::ItemReport`] when an item fails.
/// The overall run always continues to the next item.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum ItemError {
    /// The URL does not reference a recognisable marketplace product.
    #[error("Invalid product reference '{url}': {detail}")]
    InvalidReference { url: String, detail: String },

    /// No strategy could extract usable product data.
    #[error("Extraction failed for '{identifier}': {reason}")]
    Extraction {
        identifier: String,
        reason: ExtractionReason,
    },

    /// The procedural image backend itself failed.
    ///
    /// The browser backend never surfaces here — its failures fall back
    /// to the procedural path for the same request.
    #[error("Render failed for '{identifier}': {detail}")]
    Render { identifier: String, detail: String },
}

impl ItemError {
    /// Extraction reason, when this is an extraction failure.
    pub fn extraction_reason(&self) -> Option<ExtractionReason> {
        match self {
            Self::Extraction { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persistence_display_names_path() {
        let e = DealcardError::Persistence {
            path: PathBuf::from("/data/products.json"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        let msg = e.to_string();
        assert!(msg.contains("/data/products.json"), "got: {msg}");
    }

    #[test]
    fn extraction_display_carries_reason() {
        let e = ItemError::Extraction {
            identifier: "MLB123".into(),
            reason: ExtractionReason::NotFound,
        };
        assert!(e.to_string().contains("not found"));
        assert_eq!(e.extraction_reason(), Some(ExtractionReason::NotFound));
    }

    #[test]
    fn invalid_reference_has_no_extraction_reason() {
        let e = ItemError::InvalidReference {
            url: "https://example.com".into(),
            detail: "unsupported domain".into(),
        };
        assert_eq!(e.extraction_reason(), None);
    }
}
