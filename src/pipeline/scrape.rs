//! Static extraction: fetch the product page over plain HTTP and mine
//! it with structural selectors.
//!
//! The extractor works on any DOM string, so the dynamic strategy reuses
//! it verbatim on browser-rendered markup — the two strategies differ
//! only in how the HTML was obtained. Selector lists are ordered from
//! most specific (current `ui-pdp`/`andes` classes) to most generic
//! (`h1`, `og:` meta), because the marketplace renames classes often and
//! a stale specific selector should degrade, not break, extraction.
//!
//! Three mining passes run in order, first hit wins per field:
//! 1. CSS selectors against the product DOM
//! 2. JSON-LD `Product`/`Offer` blocks
//! 3. `og:`/`product:` meta tags and a raw `R$` price scan

use crate::error::ExtractionReason;
use crate::product::{parse_price, ProductData};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;
use tracing::debug;

static RE_PRICE_IN_TEXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"R\$\s*(\d{1,3}(?:\.\d{3})*(?:,\d{2})?)").unwrap());

static RE_ORIGINAL_IN_TEXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)de\s+R\$\s*(\d{1,3}(?:\.\d{3})*(?:,\d{2})?)").unwrap());

/// Fields mined from one page, each independently optional.
///
/// `complete()` decides whether the strategy satisfied the extraction
/// contract (title + current price); partial results fall through to the
/// next strategy instead of erroring.
#[derive(Debug, Clone, Default)]
pub struct ExtractedFields {
    pub title: Option<String>,
    pub image_url: Option<String>,
    pub original_price: Option<f64>,
    pub current_price: Option<f64>,
    pub currency: Option<String>,
}

impl ExtractedFields {
    /// Whether the mandatory fields are present.
    pub fn complete(&self) -> bool {
        self.title.is_some() && self.current_price.is_some()
    }

    /// Fill any empty field from a second pass.
    pub fn merge(&mut self, other: ExtractedFields) {
        if self.title.is_none() {
            self.title = other.title;
        }
        if self.image_url.is_none() {
            self.image_url = other.image_url;
        }
        if self.original_price.is_none() {
            self.original_price = other.original_price;
        }
        if self.current_price.is_none() {
            self.current_price = other.current_price;
        }
        if self.currency.is_none() {
            self.currency = other.currency;
        }
    }

    /// Finalise into [`ProductData`]; `None` unless complete.
    pub fn into_product(self) -> Option<ProductData> {
        let title = self.title?;
        let current = self.current_price?;
        Some(ProductData::new(
            title,
            self.image_url,
            self.original_price,
            current,
            self.currency.unwrap_or_else(|| "R$".to_string()),
        ))
    }
}

/// Why a static fetch produced no DOM to mine.
#[derive(Debug)]
pub enum FetchFailure {
    /// The request or body read timed out.
    Timeout,
    /// The upstream refused the request (403/429).
    Blocked,
    /// Transport-level failure (DNS, connect, TLS).
    Network(String),
    /// 2xx response with an empty or non-HTML body.
    EmptyBody,
}

impl FetchFailure {
    /// Map onto the extraction error taxonomy.
    pub fn reason(&self) -> ExtractionReason {
        match self {
            Self::Timeout => ExtractionReason::Timeout,
            Self::Blocked => ExtractionReason::Blocked,
            Self::Network(_) => ExtractionReason::Timeout,
            Self::EmptyBody => ExtractionReason::ParseFailure,
        }
    }
}

/// Fetch the page body with a bounded timeout and browser-like headers.
pub async fn fetch_page(
    client: &Client,
    url: &str,
    timeout: Duration,
) -> Result<String, FetchFailure> {
    let response = client
        .get(url)
        .header(
            "Accept",
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
        )
        .header("Accept-Language", "pt-BR,pt;q=0.9,en-US;q=0.8,en;q=0.7")
        .header("Referer", "https://www.mercadolivre.com.br/")
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                FetchFailure::Timeout
            } else {
                FetchFailure::Network(e.to_string())
            }
        })?;

    let status = response.status();
    if status.as_u16() == 403 || status.as_u16() == 429 {
        return Err(FetchFailure::Blocked);
    }
    if !status.is_success() {
        return Err(FetchFailure::Network(format!("HTTP {status}")));
    }

    let body = response.text().await.map_err(|e| {
        if e.is_timeout() {
            FetchFailure::Timeout
        } else {
            FetchFailure::Network(e.to_string())
        }
    })?;

    if body.trim().is_empty() {
        return Err(FetchFailure::EmptyBody);
    }
    Ok(body)
}

/// Structural extractor with pre-parsed selector lists.
#[derive(Clone)]
pub struct DomExtractor {
    titles: Vec<Selector>,
    images: Vec<Selector>,
    current_prices: Vec<Selector>,
    original_prices: Vec<Selector>,
    fraction: Selector,
    cents: Selector,
    json_ld: Selector,
    meta_og_title: Selector,
    meta_og_image: Selector,
    meta_price: Selector,
}

impl DomExtractor {
    pub fn new() -> Self {
        let parse_all = |sources: &[&str]| {
            sources
                .iter()
                .map(|s| Selector::parse(s).expect("static selector"))
                .collect::<Vec<_>>()
        };

        Self {
            titles: parse_all(&[
                "h1.ui-pdp-title",
                "h1[class*=\"ui-pdp-title\"]",
                "[data-testid=\"title\"]",
                ".ui-pdp-title",
                "h1",
            ]),
            images: parse_all(&[
                "img.ui-pdp-image",
                "img[class*=\"ui-pdp-image\"]",
                "img[data-zoom]",
                ".ui-pdp-gallery img",
                "[class*=\"gallery\"] img",
            ]),
            current_prices: parse_all(&[
                ".ui-pdp-price__second-line .andes-money-amount",
                ".ui-pdp-price .andes-money-amount",
                "[data-testid=\"price\"]",
                ".andes-money-amount",
            ]),
            original_prices: parse_all(&[
                ".ui-pdp-price__original .andes-money-amount",
                "s .andes-money-amount",
                "del .andes-money-amount",
                "[class*=\"strikethrough\"] .andes-money-amount",
            ]),
            fraction: Selector::parse(".andes-money-amount__fraction").expect("fraction selector"),
            cents: Selector::parse(".andes-money-amount__cents").expect("cents selector"),
            json_ld: Selector::parse("script[type=\"application/ld+json\"]")
                .expect("json-ld selector"),
            meta_og_title: Selector::parse("meta[property=\"og:title\"]").expect("og:title"),
            meta_og_image: Selector::parse("meta[property=\"og:image\"]").expect("og:image"),
            meta_price: Selector::parse("meta[property=\"product:price:amount\"]")
                .expect("price meta"),
        }
    }

    /// Mine every field the page exposes.
    pub fn extract(&self, html: &str) -> ExtractedFields {
        let document = Html::parse_document(html);

        let mut fields = self.extract_selectors(&document);
        if !fields.complete() {
            fields.merge(self.extract_json_ld(&document));
        }
        if !fields.complete() {
            fields.merge(self.extract_meta(&document));
        }
        if fields.current_price.is_none() {
            fields.current_price = scan_text_price(html);
        }
        if fields.original_price.is_none() {
            fields.original_price = scan_text_original_price(html);
        }

        debug!(
            title = fields.title.is_some(),
            price = fields.current_price.is_some(),
            image = fields.image_url.is_some(),
            "dom extraction"
        );
        fields
    }

    fn extract_selectors(&self, document: &Html) -> ExtractedFields {
        let mut fields = ExtractedFields::default();

        for selector in &self.titles {
            if let Some(el) = document.select(selector).next() {
                let text = collapse_text(&el);
                if plausible_title(&text) {
                    fields.title = Some(text);
                    break;
                }
            }
        }

        for selector in &self.images {
            if let Some(el) = document.select(selector).next() {
                let raw = el
                    .value()
                    .attr("src")
                    .or_else(|| el.value().attr("data-src"))
                    .or_else(|| el.value().attr("data-zoom"));
                if let Some(cleaned) = raw.and_then(normalise_image_url) {
                    fields.image_url = Some(cleaned);
                    break;
                }
            }
        }

        for selector in &self.current_prices {
            if let Some(price) = document
                .select(selector)
                .next()
                .and_then(|el| self.amount_from_element(&el))
            {
                fields.current_price = Some(price);
                fields.currency.get_or_insert_with(|| "R$".to_string());
                break;
            }
        }

        for selector in &self.original_prices {
            if let Some(price) = document
                .select(selector)
                .next()
                .and_then(|el| self.amount_from_element(&el))
            {
                fields.original_price = Some(price);
                break;
            }
        }

        fields
    }

    /// Reassemble a price from the marketplace's split markup
    /// (`<fraction>149</fraction><cents>90</cents>`); fall back to the
    /// element's own text for plain markup.
    fn amount_from_element(&self, el: &ElementRef<'_>) -> Option<f64> {
        if let Some(fraction) = el.select(&self.fraction).next() {
            let whole = collapse_text(&fraction);
            let cents = el
                .select(&self.cents)
                .next()
                .map(|c| collapse_text(&c))
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| "00".to_string());
            return parse_price(&format!("{whole},{cents}"));
        }
        parse_price(&collapse_text(el))
    }

    fn extract_json_ld(&self, document: &Html) -> ExtractedFields {
        let mut fields = ExtractedFields::default();

        for script in document.select(&self.json_ld) {
            let raw = script.text().collect::<String>();
            let Ok(value) = serde_json::from_str::<serde_json::Value>(&raw) else {
                continue;
            };
            // Some pages wrap the product in a @graph array.
            let candidates: Vec<&serde_json::Value> = match value.as_array() {
                Some(items) => items.iter().collect(),
                None => vec![&value],
            };
            for node in candidates {
                let ty = node.get("@type").and_then(|t| t.as_str()).unwrap_or("");
                if ty != "Product" && ty != "Offer" {
                    continue;
                }
                if fields.title.is_none() {
                    fields.title = node
                        .get("name")
                        .and_then(|n| n.as_str())
                        .filter(|t| plausible_title(t))
                        .map(str::to_string);
                }
                if fields.image_url.is_none() {
                    fields.image_url = json_ld_image(node).and_then(|u| normalise_image_url(&u));
                }
                let offer = node.get("offers").map(|o| match o.as_array() {
                    Some(list) => list.first().unwrap_or(o),
                    None => o,
                });
                if let Some(offer) = offer {
                    if fields.current_price.is_none() {
                        fields.current_price = json_number(offer.get("price"));
                    }
                    if fields.currency.is_none() {
                        fields.currency = offer
                            .get("priceCurrency")
                            .and_then(|c| c.as_str())
                            .map(currency_symbol);
                    }
                }
            }
        }

        fields
    }

    fn extract_meta(&self, document: &Html) -> ExtractedFields {
        let mut fields = ExtractedFields::default();

        if let Some(el) = document.select(&self.meta_og_title).next() {
            fields.title = el
                .value()
                .attr("content")
                .map(strip_site_suffix)
                .filter(|t| plausible_title(t));
        }
        if let Some(el) = document.select(&self.meta_og_image).next() {
            fields.image_url = el.value().attr("content").and_then(normalise_image_url);
        }
        if let Some(el) = document.select(&self.meta_price).next() {
            fields.current_price = el.value().attr("content").and_then(parse_price);
        }

        fields
    }
}

impl Default for DomExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Raw `R$ …` scan over the page source; last-resort current price.
fn scan_text_price(html: &str) -> Option<f64> {
    RE_PRICE_IN_TEXT
        .captures(html)
        .and_then(|caps| parse_price(&caps[1]))
        .filter(|p| (1.0..=1_000_000.0).contains(p))
}

/// `de R$ …` marks the pre-discount price in running text.
fn scan_text_original_price(html: &str) -> Option<f64> {
    RE_ORIGINAL_IN_TEXT
        .captures(html)
        .and_then(|caps| parse_price(&caps[1]))
}

fn collapse_text(el: &ElementRef<'_>) -> String {
    el.text().collect::<String>().split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Short strings and the site's own name are navigation chrome, not
/// product titles.
fn plausible_title(text: &str) -> bool {
    text.chars().count() > 5 && !text.to_lowercase().contains("mercado livre")
}

fn strip_site_suffix(title: &str) -> String {
    title
        .split(" | ")
        .next()
        .unwrap_or(title)
        .trim_end_matches(" - Mercado Livre")
        .trim()
        .to_string()
}

/// Strip tracking query parameters and upgrade protocol-relative or
/// site-relative photo URLs to absolute https.
fn normalise_image_url(raw: &str) -> Option<String> {
    let base = raw.split('?').next().unwrap_or(raw).trim();
    if base.is_empty() || base.starts_with("data:") {
        return None;
    }
    let absolute = if let Some(rest) = base.strip_prefix("//") {
        format!("https://{rest}")
    } else if base.starts_with('/') {
        format!("https://www.mercadolivre.com.br{base}")
    } else {
        base.to_string()
    };
    absolute.starts_with("http").then_some(absolute)
}

fn json_ld_image(node: &serde_json::Value) -> Option<String> {
    let image = node.get("image")?;
    let first = match image.as_array() {
        Some(list) => list.first()?,
        None => image,
    };
    match first {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Object(map) => map
            .get("url")
            .or_else(|| map.get("@id"))
            .and_then(|v| v.as_str())
            .map(str::to_string),
        _ => None,
    }
}

fn json_number(value: Option<&serde_json::Value>) -> Option<f64> {
    match value? {
        serde_json::Value::Number(n) => n.as_f64().filter(|v| *v > 0.0),
        serde_json::Value::String(s) => parse_price(s),
        _ => None,
    }
}

fn currency_symbol(code: &str) -> String {
    match code {
        "BRL" => "R$".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRODUCT_PAGE: &str = r#"
        <html><head><title>Tênis Esportivo - Mercado Livre</title></head><body>
        <h1 class="ui-pdp-title">Tênis Esportivo Masculino Corrida</h1>
        <div class="ui-pdp-gallery">
          <img class="ui-pdp-image" src="//http2.mlstatic.com/D_NQ_NP_123-O.webp?x=1"/>
        </div>
        <div class="ui-pdp-price">
          <s><span class="andes-money-amount">
            <span class="andes-money-amount__fraction">149</span>
            <span class="andes-money-amount__cents">90</span>
          </span></s>
          <div class="ui-pdp-price__second-line">
            <span class="andes-money-amount">
              <span class="andes-money-amount__fraction">99</span>
              <span class="andes-money-amount__cents">90</span>
            </span>
          </div>
        </div>
        </body></html>"#;

    #[test]
    fn extracts_full_product_page() {
        let fields = DomExtractor::new().extract(PRODUCT_PAGE);
        assert_eq!(fields.title.as_deref(), Some("Tênis Esportivo Masculino Corrida"));
        assert_eq!(fields.current_price, Some(99.90));
        assert_eq!(fields.original_price, Some(149.90));
        assert_eq!(
            fields.image_url.as_deref(),
            Some("https://http2.mlstatic.com/D_NQ_NP_123-O.webp")
        );

        let product = fields.into_product().expect("complete");
        assert_eq!(product.discount_percent, Some(33.36));
    }

    #[test]
    fn thousands_separator_in_fraction() {
        let html = r#"<div class="ui-pdp-price"><div class="ui-pdp-price__second-line">
            <span class="andes-money-amount">
              <span class="andes-money-amount__fraction">1.234</span>
              <span class="andes-money-amount__cents">56</span>
            </span></div></div>"#;
        let fields = DomExtractor::new().extract(html);
        assert_eq!(fields.current_price, Some(1234.56));
    }

    #[test]
    fn json_ld_fallback() {
        let html = r#"<html><body>
          <script type="application/ld+json">
            {"@type":"Product","name":"Fone Bluetooth Premium",
             "image":["https://http2.mlstatic.com/fone.jpg"],
             "offers":{"price":59.9,"priceCurrency":"BRL"}}
          </script></body></html>"#;
        let fields = DomExtractor::new().extract(html);
        assert_eq!(fields.title.as_deref(), Some("Fone Bluetooth Premium"));
        assert_eq!(fields.current_price, Some(59.9));
        assert_eq!(fields.currency.as_deref(), Some("R$"));
    }

    #[test]
    fn og_meta_fallback() {
        let html = r#"<html><head>
          <meta property="og:title" content="Cafeteira Elétrica 600ml - Mercado Livre"/>
          <meta property="og:image" content="https://http2.mlstatic.com/cafeteira.jpg"/>
          <meta property="product:price:amount" content="89.90"/>
        </head><body></body></html>"#;
        let fields = DomExtractor::new().extract(html);
        assert_eq!(fields.title.as_deref(), Some("Cafeteira Elétrica 600ml"));
        assert_eq!(fields.current_price, Some(89.90));
    }

    #[test]
    fn raw_price_scan_as_last_resort() {
        let html = r#"<html><body>
          <h1 class="ui-pdp-title">Mochila Notebook Impermeável</h1>
          <p>Por apenas R$ 1.234,56 à vista</p></body></html>"#;
        let fields = DomExtractor::new().extract(html);
        assert_eq!(fields.current_price, Some(1234.56));
    }

    #[test]
    fn empty_shell_yields_incomplete() {
        let html = "<html><body><p>Ative o JavaScript para continuar</p></body></html>";
        let fields = DomExtractor::new().extract(html);
        assert!(!fields.complete());
        assert!(fields.into_product().is_none());
    }

    #[test]
    fn navigation_chrome_is_not_a_title() {
        assert!(!plausible_title("Busca"));
        assert!(!plausible_title("Mercado Livre Brasil"));
        assert!(plausible_title("Tênis Esportivo"));
    }

    #[test]
    fn image_url_normalisation() {
        assert_eq!(
            normalise_image_url("//cdn.example.com/a.jpg?w=100"),
            Some("https://cdn.example.com/a.jpg".to_string())
        );
        assert_eq!(
            normalise_image_url("/images/a.jpg"),
            Some("https://www.mercadolivre.com.br/images/a.jpg".to_string())
        );
        assert_eq!(normalise_image_url("data:image/png;base64,xxx"), None);
    }
}
