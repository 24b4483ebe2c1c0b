//! Extraction strategy selector: static first, dynamic fallback.
//!
//! The ordered chain mirrors how often each strategy succeeds versus
//! what it costs:
//!
//! 1. **Static** — one cheap HTTP fetch. Sufficient when the page embeds
//!    JSON-LD or server-rendered markup. A network timeout here gets
//!    exactly one retry; nothing else is retried anywhere.
//! 2. **Dynamic** — a full headless-browser navigation, only attempted
//!    when the capability probe passed and the static pass came back
//!    incomplete.
//!
//! Partial static fields are not discarded when the dynamic pass runs:
//! the rendered DOM wins per field, and static fills whatever it misses
//! (typically `og:` image URLs that survive in the shell).

use crate::config::PipelineConfig;
use crate::error::{ExtractionReason, ItemError};
use crate::link::ProductRef;
use crate::pipeline::browser::BrowserRuntime;
use crate::pipeline::dynamic;
use crate::pipeline::scrape::{self, DomExtractor, ExtractedFields, FetchFailure};
use crate::product::ProductData;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Runs the strategy chain for one product reference.
pub struct Extractor<'a> {
    client: &'a Client,
    browser: &'a BrowserRuntime,
    config: &'a PipelineConfig,
    dom: DomExtractor,
}

impl<'a> Extractor<'a> {
    pub fn new(client: &'a Client, browser: &'a BrowserRuntime, config: &'a PipelineConfig) -> Self {
        Self {
            client,
            browser,
            config,
            dom: DomExtractor::new(),
        }
    }

    /// Extract product data, or fail with a classified reason.
    pub async fn extract(&self, product_ref: &ProductRef) -> Result<ProductData, ItemError> {
        let url = product_ref.source_url.as_str();
        let identifier = product_ref.identifier.as_str();

        let (static_fields, failure_hint) = self.static_strategy(url).await;

        if let Some(fields) = &static_fields {
            if fields.complete() {
                info!("'{identifier}': static strategy succeeded");
                return Ok(fields
                    .clone()
                    .into_product()
                    .expect("complete fields convert"));
            }
            debug!("'{identifier}': static strategy incomplete, considering dynamic");
        }

        if self.browser.available().await {
            let rendered = dynamic::extract_rendered(
                self.browser,
                &self.dom,
                url,
                Duration::from_millis(self.config.browser_settle_ms),
                self.config.canvas_width,
                self.config.canvas_height,
            )
            .await;

            if let Some(mut fields) = rendered {
                if let Some(static_fields) = static_fields.clone() {
                    fields.merge(static_fields);
                }
                if fields.complete() {
                    info!("'{identifier}': dynamic strategy succeeded");
                    return Ok(fields.into_product().expect("complete fields convert"));
                }
                debug!("'{identifier}': dynamic strategy also incomplete");
            }
        }

        let reason = failure_hint.unwrap_or(ExtractionReason::NotFound);
        warn!("'{identifier}': extraction failed ({reason})");
        Err(ItemError::Extraction {
            identifier: identifier.to_string(),
            reason,
        })
    }

    /// Static fetch + mine, with a single bounded retry on timeout.
    ///
    /// Returns whatever fields were mined (possibly none) plus a reason
    /// hint describing why the fetch itself failed, if it did.
    async fn static_strategy(
        &self,
        url: &str,
    ) -> (Option<ExtractedFields>, Option<ExtractionReason>) {
        let timeout = Duration::from_secs(self.config.request_timeout_secs);

        for attempt in 0..2 {
            match scrape::fetch_page(self.client, url, timeout).await {
                Ok(body) => {
                    return (Some(self.dom.extract(&body)), None);
                }
                Err(FetchFailure::Timeout) if attempt == 0 => {
                    debug!("Static fetch timed out for '{url}'; retrying once");
                    continue;
                }
                Err(failure) => {
                    debug!("Static fetch failed for '{url}': {failure:?}");
                    return (None, Some(failure.reason()));
                }
            }
        }
        (None, Some(ExtractionReason::Timeout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_config() -> PipelineConfig {
        PipelineConfig::builder()
            .disable_browser(true)
            .request_timeout_secs(1)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn unreachable_host_classified_without_browser() {
        let config = offline_config();
        let client = Client::new();
        let browser = BrowserRuntime::from_config(&config);
        let extractor = Extractor::new(&client, &browser, &config);

        // Connection refused locally: transport failure, no retry loop.
        let r = ProductRef {
            identifier: "MLB1234567890".into(),
            source_url: "http://127.0.0.1:1/MLB-1234567890".into(),
        };
        let err = extractor.extract(&r).await.unwrap_err();
        assert!(matches!(err, ItemError::Extraction { .. }));
    }
}
