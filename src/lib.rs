//! # dealcard
//!
//! Turn marketplace product URLs into ready-to-post social deal images,
//! plus a durable record of everything processed.
//!
//! ## Why this crate?
//!
//! The upstream marketplace is JavaScript-rendered, rate-limited, and
//! unreliable: a plain HTTP fetch often returns an empty shell, a
//! headless browser is not always installed where the tool runs, and a
//! batch re-run must not repost products it already handled. dealcard
//! treats all three as first-class: extraction degrades from static
//! parsing to a browser-rendered DOM, rendering degrades from a
//! browser-screenshot template to direct pixel composition, and a
//! crash-safe JSON ledger makes every product exactly-once.
//!
//! ## Pipeline Overview
//!
//! ```text
//! URL list
//!  │
//!  ├─ 1. Link      canonical MLB identifier from each URL
//!  ├─ 2. Ledger    skip identifiers already recorded
//!  ├─ 3. Extract   static HTML parse, headless-browser fallback
//!  ├─ 4. Render    HTML-template screenshot, procedural fallback
//!  ├─ 5. Record    atomic ledger append (write-temp-then-rename)
//!  └─ 6. Summary   {succeeded, skipped, failed} + per-item reports
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dealcard::{run, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::default();
//!     let urls = vec!["https://produto.mercadolivre.com.br/MLB-1234567890".to_string()];
//!     let report = run(&urls, &config).await?;
//!     eprintln!(
//!         "done: {} ok, {} skipped, {} failed",
//!         report.summary.succeeded, report.summary.skipped, report.summary.failed
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `dealcard` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! dealcard = { version = "0.4", default-features = false }
//! ```
//!
//! ## Degradation Matrix
//!
//! | Environment | Extraction | Rendering |
//! |-------------|-----------|-----------|
//! | Chrome installed | static → dynamic | template screenshot |
//! | No Chrome        | static only      | procedural drawing |
//! | Chrome broken mid-run | static only | per-request fallback to procedural |
//!
//! The capability probe runs once per process; every later decision
//! reads the memoised verdict.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod ledger;
pub mod link;
pub mod output;
pub mod pipeline;
pub mod product;
pub mod progress;
pub mod run;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{PipelineConfig, PipelineConfigBuilder, DEFAULT_USER_AGENT};
pub use error::{DealcardError, ExtractionReason, ItemError};
pub use ledger::{Ledger, LedgerEntry};
pub use link::ProductRef;
pub use output::{ItemOutcome, ItemReport, RunReport, RunSummary};
pub use pipeline::browser::BrowserRuntime;
pub use product::ProductData;
pub use progress::{ProgressCallback, RunProgressCallback};
pub use run::run;
