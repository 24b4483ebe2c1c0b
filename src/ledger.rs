//! Durable processing ledger: the single source of truth for
//! skip-already-processed decisions.
//!
//! The ledger is a JSON document (`{"products": [...], "last_updated": …}`)
//! kept whole in memory and rewritten atomically on every append: the new
//! document is written to a temp file in the same directory and renamed
//! over the old one, so a crash mid-write leaves either the previous or
//! the new entry set on disk, never a torn file.
//!
//! A missing, empty, or unparseable store loads as an empty ledger — a
//! first run needs no provisioning, and a hand-mangled file degrades to
//! "reprocess everything" instead of refusing to start. Unwritable
//! storage, by contrast, is fatal for the run: without a trustworthy
//! record there is no safe way to keep the exactly-once contract.

use crate::error::DealcardError;
use crate::link::ProductRef;
use crate::product::ProductData;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// One recorded product. Never mutated after append.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Monotonic id assigned by the ledger at append time.
    pub internal_id: u64,
    /// Canonical product key, e.g. `MLB1234567890`.
    ///
    /// Absent in files written by older versions; backfilled from `url`
    /// on load.
    #[serde(default)]
    pub identifier: String,
    /// Source product URL.
    pub url: String,
    /// Extracted title.
    pub title: String,
    /// Pre-discount price, when the page showed one.
    #[serde(default)]
    pub original_price: Option<f64>,
    /// Price at extraction time.
    pub current_price: f64,
    /// Derived discount percentage.
    #[serde(default)]
    pub discount_percentage: Option<f64>,
    /// Currency symbol.
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Path of the generated card image.
    pub image_path: String,
    /// Source photo URL, when one was found.
    #[serde(default)]
    pub image_url: Option<String>,
    /// When the product was processed.
    pub scraped_at: DateTime<Utc>,
    /// Outbound link stored with the entry; defaults to `url`.
    ///
    /// Composition of real partner links happens outside this crate —
    /// the ledger only stores what it is given.
    #[serde(default)]
    pub affiliate_link: Option<String>,
}

fn default_currency() -> String {
    "R$".to_string()
}

/// On-disk document shape. Unknown fields are ignored on read.
#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerDocument {
    #[serde(default)]
    products: Vec<LedgerEntry>,
    #[serde(default)]
    last_updated: Option<DateTime<Utc>>,
}

/// In-memory ledger with atomic whole-file persistence.
#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    entries: Vec<LedgerEntry>,
    seen: HashSet<String>,
    next_id: u64,
}

impl Ledger {
    /// Load the ledger from `path`.
    ///
    /// Missing or corrupt stores yield an empty ledger; this never
    /// fails. The next `internal_id` is `max(existing) + 1`, or 1 for an
    /// empty store, so ids stay unique across process restarts.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();

        let document = match std::fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => LedgerDocument::default(),
            Ok(raw) => match serde_json::from_str::<LedgerDocument>(&raw) {
                Ok(doc) => doc,
                Err(e) => {
                    warn!("Ledger '{}' is unreadable ({e}); starting empty", path.display());
                    LedgerDocument::default()
                }
            },
            Err(_) => LedgerDocument::default(),
        };

        let mut entries = document.products;
        for entry in &mut entries {
            if entry.identifier.is_empty() {
                if let Ok(r) = ProductRef::parse(&entry.url) {
                    entry.identifier = r.identifier;
                } else {
                    // Pre-identifier files may hold URLs we can no longer
                    // canonicalise; keep the row visible but unmatchable.
                    entry.identifier = entry.url.clone();
                }
            }
        }

        let seen = entries.iter().map(|e| e.identifier.clone()).collect();
        let next_id = entries.iter().map(|e| e.internal_id).max().unwrap_or(0) + 1;
        debug!(
            "Loaded ledger '{}': {} entries, next id {}",
            path.display(),
            entries.len(),
            next_id
        );

        Self {
            path,
            entries,
            seen,
            next_id,
        }
    }

    /// Whether a product identifier is already recorded.
    pub fn contains(&self, identifier: &str) -> bool {
        self.seen.contains(identifier)
    }

    /// Number of recorded entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no entries are recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries, in recorded order.
    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    /// The id the next appended entry will receive.
    pub fn next_internal_id(&self) -> u64 {
        self.next_id
    }

    /// Record a completed product and persist the whole store atomically.
    ///
    /// Assigns the next `internal_id`. `affiliate_link` defaults to the
    /// source URL when the caller supplies none.
    ///
    /// # Errors
    /// [`DealcardError::Persistence`] when the store cannot be written —
    /// fatal for the run. A duplicate identifier is an orchestration bug
    /// and surfaces as [`DealcardError::Internal`].
    pub fn append(
        &mut self,
        product_ref: &ProductRef,
        product: &ProductData,
        image_path: &Path,
        affiliate_link: Option<String>,
    ) -> Result<&LedgerEntry, DealcardError> {
        if self.contains(&product_ref.identifier) {
            return Err(DealcardError::Internal(format!(
                "duplicate ledger append for '{}'",
                product_ref.identifier
            )));
        }

        let entry = LedgerEntry {
            internal_id: self.next_id,
            identifier: product_ref.identifier.clone(),
            url: product_ref.source_url.clone(),
            title: product.title.clone(),
            original_price: product.original_price,
            current_price: product.current_price,
            discount_percentage: product.discount_percent,
            currency: product.currency.clone(),
            image_path: image_path.to_string_lossy().into_owned(),
            image_url: product.image_url.clone(),
            scraped_at: Utc::now(),
            affiliate_link: affiliate_link.or_else(|| Some(product_ref.source_url.clone())),
        };

        self.entries.push(entry);
        if let Err(e) = self.persist() {
            // Keep memory consistent with disk when the write fails.
            self.entries.pop();
            return Err(e);
        }

        let entry = self.entries.last().expect("entry just pushed");
        self.seen.insert(entry.identifier.clone());
        self.next_id += 1;
        Ok(entry)
    }

    /// Write the full document to a sibling temp file, then rename it
    /// over the store.
    fn persist(&self) -> Result<(), DealcardError> {
        let parent = self.path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent).map_err(|e| DealcardError::Persistence {
            path: self.path.clone(),
            source: e,
        })?;

        let document = LedgerDocument {
            products: self.entries.clone(),
            last_updated: Some(Utc::now()),
        };
        let payload = serde_json::to_vec_pretty(&document)?;

        let mut tmp =
            tempfile::NamedTempFile::new_in(parent).map_err(|e| DealcardError::Persistence {
                path: self.path.clone(),
                source: e,
            })?;
        tmp.write_all(&payload)
            .and_then(|_| tmp.flush())
            .map_err(|e| DealcardError::Persistence {
                path: self.path.clone(),
                source: e,
            })?;

        tmp.persist(&self.path)
            .map_err(|e| DealcardError::Persistence {
                path: self.path.clone(),
                source: e.error,
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_ref(n: u64) -> ProductRef {
        ProductRef::parse(&format!("https://produto.mercadolivre.com.br/MLB-123456789{n}"))
            .expect("valid ref")
    }

    fn sample_product() -> ProductData {
        ProductData::new("Tênis Esportivo", None, Some(149.90), 99.90, "R$")
    }

    #[test]
    fn missing_store_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::load(dir.path().join("products.json"));
        assert!(ledger.is_empty());
        assert_eq!(ledger.next_internal_id(), 1);
    }

    #[test]
    fn corrupt_store_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("products.json");
        std::fs::write(&path, b"{\"products\": [trailing garbage").unwrap();
        let ledger = Ledger::load(&path);
        assert!(ledger.is_empty());
    }

    #[test]
    fn append_assigns_sequential_ids_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data/products.json");

        let mut ledger = Ledger::load(&path);
        let first = ledger
            .append(&sample_ref(0), &sample_product(), Path::new("output/images/product_1.jpg"), None)
            .expect("append");
        assert_eq!(first.internal_id, 1);
        assert_eq!(first.discount_percentage, Some(33.36));
        assert_eq!(
            first.affiliate_link.as_deref(),
            Some("https://produto.mercadolivre.com.br/MLB-1234567890")
        );

        ledger
            .append(&sample_ref(1), &sample_product(), Path::new("p2.jpg"), None)
            .expect("append second");

        // A fresh load sees both entries and continues the id sequence.
        let reloaded = Ledger::load(&path);
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.next_internal_id(), 3);
        assert!(reloaded.contains("MLB1234567890"));
        assert!(reloaded.contains("MLB1234567891"));
    }

    #[test]
    fn duplicate_append_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = Ledger::load(dir.path().join("products.json"));
        ledger
            .append(&sample_ref(0), &sample_product(), Path::new("a.jpg"), None)
            .unwrap();
        let err = ledger
            .append(&sample_ref(0), &sample_product(), Path::new("b.jpg"), None)
            .unwrap_err();
        assert!(matches!(err, DealcardError::Internal(_)));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn unknown_fields_and_missing_optionals_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("products.json");
        std::fs::write(
            &path,
            br#"{
              "products": [{
                "internal_id": 7,
                "url": "https://produto.mercadolivre.com.br/MLB-1234567890",
                "title": "Produto",
                "current_price": 59.9,
                "image_path": "output/images/product_7.jpg",
                "scraped_at": "2025-11-02T12:00:00Z",
                "editor_note": "added by hand"
              }],
              "schema": 2
            }"#,
        )
        .unwrap();

        let ledger = Ledger::load(&path);
        assert_eq!(ledger.len(), 1);
        // Identifier backfilled from the URL of the legacy row.
        assert!(ledger.contains("MLB1234567890"));
        let entry = &ledger.entries()[0];
        assert_eq!(entry.original_price, None);
        assert_eq!(entry.currency, "R$");
        assert_eq!(ledger.next_internal_id(), 8);
    }

    #[test]
    fn persisted_file_is_always_whole() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("products.json");
        let mut ledger = Ledger::load(&path);
        for n in 0..5 {
            ledger
                .append(&sample_ref(n), &sample_product(), Path::new("x.jpg"), None)
                .unwrap();
            // After every append the on-disk document parses in full.
            let raw = std::fs::read_to_string(&path).unwrap();
            let doc: serde_json::Value = serde_json::from_str(&raw).expect("whole document");
            assert_eq!(doc["products"].as_array().unwrap().len() as u64, n + 1);
        }
    }

    #[test]
    fn unwritable_store_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        // A directory at the ledger path makes the rename fail.
        let path = dir.path().join("products.json");
        std::fs::create_dir_all(&path).unwrap();
        let mut ledger = Ledger::load(&path);
        let err = ledger
            .append(&sample_ref(0), &sample_product(), Path::new("a.jpg"), None)
            .unwrap_err();
        assert!(matches!(err, DealcardError::Persistence { .. }));
    }
}
