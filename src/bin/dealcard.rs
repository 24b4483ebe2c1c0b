//! CLI binary for dealcard.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PipelineConfig`, feeds it URLs from a CSV (or `--url` flags), and
//! prints per-item progress plus the final summary.

use anyhow::{bail, Context, Result};
use clap::Parser;
use dealcard::{run, PipelineConfig, ProgressCallback, RunProgressCallback, RunReport};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: a bar anchored at the bottom plus one log line per
/// finished item. Items run sequentially, so no out-of-order handling is
/// needed.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  \
                 [{bar:42.green/238}] {pos:>3}/{len} products  ⏱ {elapsed_precise}  {wide_msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.set_prefix("Processing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl RunProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_items: usize) {
        self.bar.set_length(total_items as u64);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Processing {total_items} products…"))
        ));
    }

    fn on_item_start(&self, index: usize, _total: usize, url: &str) {
        let short: String = url.chars().take(64).collect();
        self.bar.set_message(format!("#{index} {short}"));
    }

    fn on_item_complete(&self, index: usize, total: usize, internal_id: u64, title: &str) {
        let short: String = title.chars().take(48).collect();
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  #{internal_id}  {}",
            green("✓"),
            index,
            total,
            short
        ));
        self.bar.inc(1);
    }

    fn on_item_skipped(&self, index: usize, total: usize, identifier: &str) {
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}",
            yellow("↷"),
            index,
            total,
            identifier,
            dim("already recorded")
        ));
        self.bar.inc(1);
    }

    fn on_item_failed(&self, index: usize, total: usize, reason: &str) {
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}",
            red("✗"),
            index,
            total,
            dim(reason)
        ));
        self.bar.inc(1);
    }

    fn on_run_complete(&self, _succeeded: usize, _skipped: usize, _failed: usize) {
        self.bar.finish_and_clear();
    }
}

// ── CLI definition ───────────────────────────────────────────────────────────

const AFTER_HELP: &str = r#"EXAMPLES:
  # Process the default CSV (input/products.csv)
  dealcard

  # Process a specific CSV into a custom output tree
  dealcard deals.csv --output-dir posts/images --ledger posts/products.json

  # One-off URLs without a CSV
  dealcard --url https://produto.mercadolivre.com.br/MLB-1234567890

  # Force the procedural renderer (no Chrome needed)
  dealcard --no-browser deals.csv

  # Portrait cards
  dealcard --canvas 1080x1350 deals.csv

ENVIRONMENT VARIABLES:
  DEALCARD_BROWSER     Path to a Chrome/Chromium binary — skips the search
  DEALCARD_FONT        Path to a .ttf used by the procedural renderer
  RUST_LOG             Tracing filter, e.g. RUST_LOG=dealcard=debug

NOTES:
  The ledger keys products by their MLB identifier: a URL that was already
  processed is skipped on re-runs, so interrupted batches can simply be
  restarted. Press Ctrl-C to stop after the current item.
"#;

/// Generate social deal images from marketplace product URLs.
#[derive(Parser, Debug)]
#[command(
    name = "dealcard",
    version,
    about = "Generate social deal images from Mercado Livre product URLs",
    long_about = "Scrape product data (static HTML first, headless Chrome fallback), render a \
1080×1080 deal card per product (HTML-template screenshot with a procedural drawing fallback), \
and record every processed product in a crash-safe JSON ledger.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// CSV file with product URLs (one per line, `url` column or first field).
    #[arg(default_value = "input/products.csv")]
    input: PathBuf,

    /// Process these URLs instead of reading the CSV. Repeatable.
    #[arg(long = "url", value_name = "URL")]
    urls: Vec<String>,

    /// Directory for generated card images.
    #[arg(short, long, env = "DEALCARD_OUTPUT_DIR", default_value = "output/images")]
    output_dir: PathBuf,

    /// Path of the JSON processing ledger.
    #[arg(long, env = "DEALCARD_LEDGER", default_value = "output/data/products.json")]
    ledger: PathBuf,

    /// Canvas size as WIDTHxHEIGHT.
    #[arg(long, env = "DEALCARD_CANVAS", default_value = "1080x1080")]
    canvas: String,

    /// Minimum delay between extraction requests, in milliseconds.
    #[arg(long, env = "DEALCARD_DELAY_MS", default_value_t = 3000)]
    delay_ms: u64,

    /// Per-request HTTP timeout in seconds.
    #[arg(long, env = "DEALCARD_TIMEOUT", default_value_t = 10)]
    timeout: u64,

    /// Page-settle wait for the browser strategies, in milliseconds.
    #[arg(long, env = "DEALCARD_SETTLE_MS", default_value_t = 5000)]
    settle_ms: u64,

    /// Never use a browser: static extraction and procedural rendering only.
    #[arg(long, env = "DEALCARD_NO_BROWSER")]
    no_browser: bool,

    /// Explicit Chrome/Chromium binary.
    #[arg(long, env = "DEALCARD_BROWSER")]
    browser: Option<PathBuf>,

    /// Explicit .ttf font for the procedural renderer.
    #[arg(long, env = "DEALCARD_FONT")]
    font: Option<PathBuf>,

    /// Process at most N items from the input.
    #[arg(long, value_name = "N")]
    limit: Option<usize>,

    /// Output the full run report as JSON instead of the summary.
    #[arg(long)]
    json: bool,

    /// Disable the progress bar.
    #[arg(long)]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long)]
    quiet: bool,
}

/// Pull product URLs out of a CSV, tolerantly.
///
/// Header rows, empty lines, and non-marketplace rows are dropped; the
/// URL may sit in any comma-separated field. Duplicates keep their first
/// position.
fn parse_product_links(path: &PathBuf) -> Result<Vec<String>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read input CSV '{}'", path.display()))?;

    let mut urls = Vec::new();
    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() || line.eq_ignore_ascii_case("url") {
            continue;
        }
        let Some(field) = line
            .split(',')
            .map(str::trim)
            .find(|f| f.starts_with("http") && f.to_lowercase().contains("mercadolivre.com.br"))
        else {
            continue;
        };
        let url = field.to_string();
        if !urls.contains(&url) {
            urls.push(url);
        }
    }
    Ok(urls)
}

fn parse_canvas(spec: &str) -> Result<(u32, u32)> {
    let (w, h) = spec
        .split_once(['x', 'X'])
        .with_context(|| format!("Invalid canvas '{spec}', expected WIDTHxHEIGHT"))?;
    Ok((
        w.trim().parse().with_context(|| format!("Invalid canvas width '{w}'"))?,
        h.trim().parse().with_context(|| format!("Invalid canvas height '{h}'"))?,
    ))
}

fn print_summary(report: &RunReport) {
    let s = &report.summary;
    println!();
    println!("{}", bold("Run complete"));
    println!("  {} succeeded   {}", green("✓"), s.succeeded);
    println!("  {} skipped     {}", yellow("↷"), s.skipped);
    println!("  {} failed      {}", red("✗"), s.failed);
    println!(
        "  {} total        {}  {}",
        cyan("Σ"),
        s.total(),
        dim(&format!("{:.1}s", report.total_duration_ms as f64 / 1000.0))
    );

    let failures: Vec<_> = report
        .items
        .iter()
        .filter_map(|item| item.failure_reason().map(|r| (item.index, r)))
        .collect();
    if !failures.is_empty() {
        println!();
        println!("{}", bold("Failures"));
        for (index, reason) in failures {
            println!("  {} item {index}: {reason}", red("✗"));
        }
    }
    if report.stopped_early {
        println!();
        println!("{}", yellow("Run stopped early by Ctrl-C; re-run to continue."));
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar is the user-facing feedback; keep library logs at
    // error level unless verbosity is requested explicitly.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "dealcard=debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    // ── Collect input URLs ───────────────────────────────────────────────
    let mut urls = if cli.urls.is_empty() {
        parse_product_links(&cli.input)?
    } else {
        cli.urls.clone()
    };
    if let Some(limit) = cli.limit {
        urls.truncate(limit);
    }
    if urls.is_empty() {
        bail!(
            "No product URLs found — checked '{}'. Add URLs to the CSV or pass --url.",
            cli.input.display()
        );
    }

    // ── Build config ─────────────────────────────────────────────────────
    let (width, height) = parse_canvas(&cli.canvas)?;

    let stop_flag = Arc::new(AtomicBool::new(false));
    {
        let stop_flag = Arc::clone(&stop_flag);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\nStopping after the current item…");
                stop_flag.store(true, Ordering::Relaxed);
            }
        });
    }

    let mut builder = PipelineConfig::builder()
        .canvas_size(width, height)
        .image_dir(&cli.output_dir)
        .ledger_path(&cli.ledger)
        .min_request_delay_ms(cli.delay_ms)
        .request_timeout_secs(cli.timeout)
        .browser_settle_ms(cli.settle_ms)
        .disable_browser(cli.no_browser)
        .stop_flag(stop_flag);
    if let Some(browser) = &cli.browser {
        builder = builder.browser_executable(browser);
    }
    if let Some(font) = &cli.font {
        builder = builder.font_path(font);
    }
    if show_progress {
        let cb = CliProgressCallback::new();
        builder = builder.progress_callback(cb as ProgressCallback);
    }
    let config = builder.build().context("Invalid configuration")?;

    // ── Run ──────────────────────────────────────────────────────────────
    let report = run(&urls, &config).await.context("Run failed")?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise report")?
        );
    } else if !cli.quiet {
        print_summary(&report);
        if report.summary.succeeded > 0 {
            println!();
            println!("Images:  {}", cli.output_dir.display());
            println!("Ledger:  {}", cli.ledger.display());
        }
    }

    // A run that produced nothing but failures signals trouble to shells.
    let s = &report.summary;
    if s.failed > 0 && s.succeeded == 0 && s.skipped == 0 {
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn csv_parsing_is_tolerant() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "url").unwrap();
        writeln!(file, "https://produto.mercadolivre.com.br/MLB-1,notes here").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "https://example.com/not-a-product").unwrap();
        writeln!(file, "name,https://www.mercadolivre.com.br/p/MLB2").unwrap();
        writeln!(file, "https://produto.mercadolivre.com.br/MLB-1,dup").unwrap();

        let urls = parse_product_links(&file.path().to_path_buf()).unwrap();
        assert_eq!(
            urls,
            vec![
                "https://produto.mercadolivre.com.br/MLB-1".to_string(),
                "https://www.mercadolivre.com.br/p/MLB2".to_string(),
            ]
        );
    }

    #[test]
    fn canvas_spec_parsing() {
        assert_eq!(parse_canvas("1080x1080").unwrap(), (1080, 1080));
        assert_eq!(parse_canvas("1080X1350").unwrap(), (1080, 1350));
        assert!(parse_canvas("square").is_err());
        assert!(parse_canvas("1080x").is_err());
    }
}
