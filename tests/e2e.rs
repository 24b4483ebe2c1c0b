//! End-to-end integration tests for dealcard.
//!
//! The offline tests exercise the full pipeline surface without any
//! network or browser: pre-seeded ledgers, procedural rendering, and
//! idempotent re-runs. Tests that hit the live marketplace (and a real
//! Chrome install, when present) are gated behind the `E2E_ENABLED`
//! environment variable so they never run in CI unintentionally.
//!
//! Run everything:
//!   E2E_ENABLED=1 cargo test --test e2e -- --nocapture

use dealcard::{
    run, BrowserRuntime, Ledger, PipelineConfig, ProductData, ProductRef, RunSummary,
};
use image::GenericImageView;
use std::path::Path;

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Skip the current test unless live end-to-end runs were requested.
macro_rules! e2e_skip_unless_enabled {
    () => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP — set E2E_ENABLED=1 to run live e2e tests");
            return;
        }
    }};
}

fn offline_config(dir: &Path) -> PipelineConfig {
    PipelineConfig::builder()
        .disable_browser(true)
        .ledger_path(dir.join("data/products.json"))
        .image_dir(dir.join("images"))
        .min_request_delay_ms(0)
        .request_timeout_secs(2)
        .canvas_size(640, 640)
        .build()
        .expect("offline config")
}

fn seed_ledger(config: &PipelineConfig, url: &str) -> u64 {
    let mut ledger = Ledger::load(&config.ledger_path);
    let r = ProductRef::parse(url).expect("seed url");
    let product = ProductData::new("Tênis Esportivo", None, Some(149.90), 99.90, "R$");
    let entry = ledger
        .append(&r, &product, Path::new("images/product_1.jpg"), None)
        .expect("seed append");
    entry.internal_id
}

// ── Offline pipeline behaviour ───────────────────────────────────────────────

#[tokio::test]
async fn second_run_skips_everything_it_already_recorded() {
    let dir = tempfile::tempdir().unwrap();
    let config = offline_config(dir.path());

    let url = "https://produto.mercadolivre.com.br/MLB-1234567890";
    let id = seed_ledger(&config, url);
    assert_eq!(id, 1);

    // The "second run": same product, extra tracking query.
    let urls = vec![format!("{url}?utm_campaign=stories")];
    let report = run(&urls, &config).await.expect("run");

    assert_eq!(
        report.summary,
        RunSummary {
            succeeded: 0,
            skipped: 1,
            failed: 0
        }
    );

    // No duplicate entries, no new ids.
    let ledger = Ledger::load(&config.ledger_path);
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger.next_internal_id(), 2);
}

#[tokio::test]
async fn mixed_batch_produces_itemised_report() {
    let dir = tempfile::tempdir().unwrap();
    let config = offline_config(dir.path());
    seed_ledger(&config, "https://produto.mercadolivre.com.br/MLB-1234567890");

    let urls = vec![
        // Skipped: seeded above.
        "https://produto.mercadolivre.com.br/MLB-1234567890".to_string(),
        // Failed: not a marketplace reference at all.
        "https://example.com/produto".to_string(),
        // Failed: valid reference, but extraction cannot complete
        // without upstream access in this offline environment.
        "https://produto.mercadolivre.com.br/MLB-9999999999".to_string(),
    ];
    let report = run(&urls, &config).await.expect("run");

    assert_eq!(report.items.len(), 3);
    assert_eq!(report.summary.skipped, 1);
    assert!(report.summary.failed >= 1);
    assert_eq!(report.summary.total(), 3);

    // Reports keep input order and carry readable reasons.
    assert_eq!(report.items[0].index, 1);
    assert!(report.items[1].failure_reason().is_some());
}

#[tokio::test]
async fn ledger_survives_rerun_cycles_without_duplicates() {
    let dir = tempfile::tempdir().unwrap();
    let config = offline_config(dir.path());

    let url = "https://produto.mercadolivre.com.br/MLB-1234567890";
    seed_ledger(&config, url);

    for _ in 0..3 {
        let report = run(&[url.to_string()], &config).await.expect("run");
        assert_eq!(report.summary.skipped, 1);
    }

    let ledger = Ledger::load(&config.ledger_path);
    assert_eq!(ledger.len(), 1, "identifier must stay unique across runs");
}

#[tokio::test]
async fn forced_procedural_renderer_completes_without_browser() {
    use dealcard::pipeline::render::CardRenderer;

    let dir = tempfile::tempdir().unwrap();
    let config = offline_config(dir.path());
    let client = reqwest::Client::new();
    let browser = BrowserRuntime::from_config(&config);
    assert!(!browser.available().await, "browser is forced off");

    let product = ProductData::new(
        "Tênis Esportivo Masculino Corrida Leve",
        None, // no photo URL → placeholder, no network
        Some(149.90),
        99.90,
        "R$",
    );
    let renderer = CardRenderer::new(&client, &browser, &config);
    let output = dir.path().join("images/product_1.jpg");
    renderer
        .render("MLB1234567890", &product, &output)
        .await
        .expect("procedural render");

    let img = image::open(&output).expect("valid output image");
    assert_eq!(
        (img.width(), img.height()),
        config.canvas_size(),
        "procedural card must match the configured canvas"
    );
}

#[tokio::test]
async fn capability_probe_is_never_a_hard_error() {
    // Point the probe at a binary that cannot exist; the verdict must be
    // a clean `false`, not an error or a panic.
    let config = PipelineConfig::builder()
        .browser_executable("/definitely/not/chrome")
        .build()
        .unwrap();
    let browser = BrowserRuntime::from_config(&config);
    assert!(!browser.available().await);
    // Memoised: asking again is instant and identical.
    assert!(!browser.available().await);
}

// ── Live marketplace tests (network + optional Chrome) ───────────────────────

#[tokio::test]
async fn live_full_pipeline_single_product() {
    e2e_skip_unless_enabled!();

    let dir = tempfile::tempdir().unwrap();
    let config = PipelineConfig::builder()
        .ledger_path(dir.path().join("products.json"))
        .image_dir(dir.path().join("images"))
        .build()
        .unwrap();

    // A long-lived catalogue listing; replace when it finally dies.
    let urls = vec!["https://www.mercadolivre.com.br/p/MLB19508846".to_string()];
    let report = run(&urls, &config).await.expect("live run");

    println!("live summary: {:?}", report.summary);
    if report.summary.succeeded == 1 {
        let ledger = Ledger::load(&config.ledger_path);
        let entry = &ledger.entries()[0];
        assert!(entry.current_price > 0.0);
        assert!(Path::new(&entry.image_path).exists());
        println!("extracted: {} — {} {}", entry.title, entry.currency, entry.current_price);
    } else {
        // Upstream volatility is expected; the contract is a clean
        // report either way.
        assert_eq!(report.summary.total(), 1);
    }
}

#[tokio::test]
async fn live_second_run_is_idempotent() {
    e2e_skip_unless_enabled!();

    let dir = tempfile::tempdir().unwrap();
    let config = PipelineConfig::builder()
        .ledger_path(dir.path().join("products.json"))
        .image_dir(dir.path().join("images"))
        .build()
        .unwrap();

    let urls = vec!["https://www.mercadolivre.com.br/p/MLB19508846".to_string()];
    let first = run(&urls, &config).await.expect("first run");
    if first.summary.succeeded != 1 {
        println!("SKIP — upstream did not yield product data");
        return;
    }

    let second = run(&urls, &config).await.expect("second run");
    assert_eq!(
        second.summary,
        RunSummary {
            succeeded: 0,
            skipped: 1,
            failed: 0
        }
    );
}
