//! Dynamic extraction: render the page in a headless browser, then mine
//! the settled DOM with the same structural extractor the static
//! strategy uses.
//!
//! The marketplace injects prices client-side, so the static fetch often
//! sees an empty shell. This stage only changes *how the HTML is
//! obtained*; field mining stays in [`crate::pipeline::scrape`] so both
//! strategies agree on what a product looks like.

use crate::pipeline::browser::BrowserRuntime;
use crate::pipeline::scrape::{DomExtractor, ExtractedFields};
use std::time::Duration;
use tracing::{debug, warn};

/// Render `url` in a headless session and extract product fields.
///
/// Returns `None` when the browser capability is unavailable or the
/// session dies — the strategy selector then settles on the static
/// result. The session is closed on every path before returning.
pub async fn extract_rendered(
    browser: &BrowserRuntime,
    extractor: &DomExtractor,
    url: &str,
    settle: Duration,
    width: u32,
    height: u32,
) -> Option<ExtractedFields> {
    let session = browser.session(width, height).await?;

    let html = match session.rendered_html(url, settle).await {
        Ok(html) => html,
        Err(e) => {
            warn!("Dynamic extraction failed for '{url}': {e}");
            session.close().await;
            return None;
        }
    };
    session.close().await;

    let fields = extractor.extract(&html);
    debug!(complete = fields.complete(), "dynamic extraction finished");
    Some(fields)
}
