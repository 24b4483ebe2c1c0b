//! Pipeline orchestrator: sequence every URL through
//! normalise → skip-check → extract → render → record.
//!
//! Per-item failures never leave this module; they become `Failed`
//! outcomes with readable reasons and the run moves on. The single
//! exception is ledger persistence: a run that cannot record completed
//! work cannot keep its exactly-once promise, so
//! [`DealcardError::Persistence`] propagates immediately.
//!
//! Items are processed strictly sequentially, with a minimum delay
//! between extraction attempts measured from the previous fetch — an
//! aggregate budget, deliberately not per-strategy. A cooperative stop
//! flag is honoured between items, never mid-item.

use crate::config::PipelineConfig;
use crate::error::DealcardError;
use crate::ledger::Ledger;
use crate::link::ProductRef;
use crate::output::{ItemOutcome, ItemReport, RunReport, RunSummary};
use crate::pipeline::browser::BrowserRuntime;
use crate::pipeline::extract::Extractor;
use crate::pipeline::render::CardRenderer;
use reqwest::Client;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Process a batch of product URLs into cards and ledger entries.
///
/// Returns a report covering every input item; the run itself only
/// fails on a fatal error (unwritable ledger, broken HTTP client).
pub async fn run(urls: &[String], config: &PipelineConfig) -> Result<RunReport, DealcardError> {
    let run_start = Instant::now();
    let total = urls.len();
    info!("Starting run: {total} product URLs");

    let client = Client::builder()
        .user_agent(config.user_agent.as_str())
        .build()
        .map_err(|e| DealcardError::Internal(format!("HTTP client: {e}")))?;

    let browser = BrowserRuntime::from_config(config);
    let extractor = Extractor::new(&client, &browser, config);
    let renderer = CardRenderer::new(&client, &browser, config);
    let mut ledger = Ledger::load(&config.ledger_path);
    info!("Ledger: {} products already recorded", ledger.len());

    if let Some(cb) = &config.progress_callback {
        cb.on_run_start(total);
    }

    let mut items = Vec::with_capacity(total);
    let mut last_fetch: Option<Instant> = None;
    let mut stopped_early = false;

    for (i, url) in urls.iter().enumerate() {
        let index = i + 1;

        if stop_requested(config) {
            info!("Stop requested; ending run after {} of {total} items", index - 1);
            stopped_early = true;
            break;
        }

        if let Some(cb) = &config.progress_callback {
            cb.on_item_start(index, total, url);
        }

        let report = process_item(
            index,
            url,
            config,
            &extractor,
            &renderer,
            &mut ledger,
            &mut last_fetch,
        )
        .await?;

        if let Some(cb) = &config.progress_callback {
            match &report.outcome {
                ItemOutcome::Recorded {
                    internal_id, title, ..
                } => {
                    cb.on_item_complete(index, total, *internal_id, title);
                }
                ItemOutcome::Skipped => {
                    cb.on_item_skipped(index, total, report.identifier.as_deref().unwrap_or(url));
                }
                ItemOutcome::Failed { error } => {
                    cb.on_item_failed(index, total, &error.to_string());
                }
            }
        }

        items.push(report);
    }

    let summary = RunSummary::from_items(&items);
    info!(
        "Run complete: {} succeeded, {} skipped, {} failed",
        summary.succeeded, summary.skipped, summary.failed
    );
    if let Some(cb) = &config.progress_callback {
        cb.on_run_complete(summary.succeeded, summary.skipped, summary.failed);
    }

    Ok(RunReport {
        items,
        summary,
        total_duration_ms: run_start.elapsed().as_millis() as u64,
        stopped_early,
    })
}

/// Drive one URL to a terminal state.
///
/// `Ok` covers all three outcomes; `Err` is reserved for fatal ledger
/// failures.
async fn process_item(
    index: usize,
    url: &str,
    config: &PipelineConfig,
    extractor: &Extractor<'_>,
    renderer: &CardRenderer<'_>,
    ledger: &mut Ledger,
    last_fetch: &mut Option<Instant>,
) -> Result<ItemReport, DealcardError> {
    let item_start = Instant::now();
    let finish = |identifier: Option<String>, outcome: ItemOutcome| ItemReport {
        index,
        url: url.to_string(),
        identifier,
        outcome,
        duration_ms: item_start.elapsed().as_millis() as u64,
    };

    // Pending → (invalid reference?) Failed
    let product_ref = match ProductRef::parse(url) {
        Ok(r) => r,
        Err(error) => {
            warn!("[{index}] {url}: {error}");
            return Ok(finish(None, ItemOutcome::Failed { error }));
        }
    };
    let identifier = product_ref.identifier.clone();

    // Pending → Skipped (no fetch happens, so no pacing needed)
    if ledger.contains(&identifier) {
        info!("[{index}] '{identifier}': already recorded, skipping");
        return Ok(finish(Some(identifier), ItemOutcome::Skipped));
    }

    // Extracting (paced against the previous fetch)
    pace_requests(config, last_fetch).await;
    *last_fetch = Some(Instant::now());

    let product = match extractor.extract(&product_ref).await {
        Ok(p) => p,
        Err(error) => {
            return Ok(finish(Some(identifier), ItemOutcome::Failed { error }));
        }
    };
    info!(
        "[{index}] '{identifier}': extracted \"{}\" at {} {:.2}",
        crate::product::truncate_title(&product.title, 50),
        product.currency,
        product.current_price
    );

    // Rendering — the output name uses the id the ledger will assign.
    let internal_id = ledger.next_internal_id();
    let image_path = config.image_dir.join(format!("product_{internal_id}.jpg"));

    if let Err(error) = renderer.render(&identifier, &product, &image_path).await {
        warn!("[{index}] '{identifier}': {error}");
        return Ok(finish(Some(identifier), ItemOutcome::Failed { error }));
    }

    // Recorded — persistence failures are fatal and propagate.
    let entry = ledger.append(&product_ref, &product, &image_path, None)?;
    info!(
        "[{index}] '{identifier}': recorded as internal_id {}",
        entry.internal_id
    );

    Ok(finish(
        Some(identifier),
        ItemOutcome::Recorded {
            internal_id,
            image_path: image_path.to_string_lossy().into_owned(),
            title: product.title.clone(),
        },
    ))
}

/// Sleep whatever remains of the minimum inter-request window.
async fn pace_requests(config: &PipelineConfig, last_fetch: &Option<Instant>) {
    let Some(previous) = last_fetch else { return };
    let window = Duration::from_millis(config.min_request_delay_ms);
    let elapsed = previous.elapsed();
    if elapsed < window {
        let wait = window - elapsed;
        tracing::debug!("Pacing: sleeping {}ms before next extraction", wait.as_millis());
        tokio::time::sleep(wait).await;
    }
}

fn stop_requested(config: &PipelineConfig) -> bool {
    config
        .stop_flag
        .as_ref()
        .map(|flag| flag.load(Ordering::Relaxed))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Ledger;
    use crate::product::ProductData;
    use std::path::Path;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    fn offline_config(dir: &Path) -> PipelineConfig {
        PipelineConfig::builder()
            .disable_browser(true)
            .ledger_path(dir.join("data/products.json"))
            .image_dir(dir.join("images"))
            .min_request_delay_ms(0)
            .request_timeout_secs(1)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn invalid_reference_fails_item_not_run() {
        let dir = tempfile::tempdir().unwrap();
        let config = offline_config(dir.path());

        let urls = vec!["https://www.amazon.com.br/dp/B000".to_string()];
        let report = run(&urls, &config).await.expect("run succeeds");

        assert_eq!(report.summary.failed, 1);
        assert_eq!(report.summary.succeeded, 0);
        assert!(report.items[0].failure_reason().is_some());
        assert!(!dir.path().join("data/products.json").exists());
    }

    #[tokio::test]
    async fn recorded_identifier_is_skipped_before_any_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let config = offline_config(dir.path());

        // Seed the ledger with the identifier the URL will normalise to.
        let mut ledger = Ledger::load(&config.ledger_path);
        let r = ProductRef::parse("https://produto.mercadolivre.com.br/MLB-1234567890").unwrap();
        let product = ProductData::new("Tênis Esportivo", None, Some(149.90), 99.90, "R$");
        ledger
            .append(&r, &product, Path::new("images/product_1.jpg"), None)
            .unwrap();

        // Same product under a different query string: still a skip, and
        // the skip happens without touching the network (no fetch, so an
        // offline environment passes).
        let urls =
            vec!["https://produto.mercadolivre.com.br/MLB-1234567890?utm_source=x".to_string()];
        let report = run(&urls, &config).await.expect("run succeeds");

        assert_eq!(
            report.summary,
            crate::output::RunSummary {
                succeeded: 0,
                skipped: 1,
                failed: 0
            }
        );
    }

    #[tokio::test]
    async fn stop_flag_prevents_further_items() {
        let dir = tempfile::tempdir().unwrap();
        let flag = Arc::new(AtomicBool::new(true));
        let config = PipelineConfig::builder()
            .disable_browser(true)
            .ledger_path(dir.path().join("products.json"))
            .image_dir(dir.path().join("images"))
            .stop_flag(Arc::clone(&flag))
            .build()
            .unwrap();

        let urls = vec![
            "https://produto.mercadolivre.com.br/MLB-1111111111".to_string(),
            "https://produto.mercadolivre.com.br/MLB-2222222222".to_string(),
        ];
        let report = run(&urls, &config).await.expect("run succeeds");
        assert!(report.stopped_early);
        assert!(report.items.is_empty());
        assert_eq!(report.summary.total(), 0);
    }

    #[tokio::test]
    async fn unreachable_upstream_fails_items_but_finishes_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let config = offline_config(dir.path());

        // Valid references, dead host: each item fails extraction, the
        // run completes with a full report.
        let urls = vec![
            "https://produto.mercadolivre.com.br/MLB-1111111111".to_string(),
            "https://produto.mercadolivre.com.br/MLB-2222222222".to_string(),
        ];
        let report = run(&urls, &config).await.expect("run survives bad items");
        assert_eq!(report.summary.failed, 2);
        assert_eq!(report.items.len(), 2);
        // Failed items leave no trace: no ledger, no images.
        assert!(!config.ledger_path.exists());
    }
}
