//! Product data model and price arithmetic.
//!
//! [`ProductData`] is produced once by the extraction stage and never
//! mutated afterwards; the discount is derived at construction so the
//! rest of the pipeline can rely on it being consistent with the two
//! prices. Price parsing lives here too because both extraction
//! strategies and the tests need the same locale handling.

use serde::{Deserialize, Serialize};

/// Extracted fields for one product.
///
/// Invariants, enforced by [`ProductData::new`]:
/// * `discount_percent` is present iff both prices are present and
///   `current_price <= original_price`; it is then
///   `round(100 * (orig - cur) / orig, 2)` and never negative.
/// * An original price below the current price is discarded rather than
///   clamped, so a bogus strikethrough never renders as "-0%".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductData {
    /// Product title as shown on the page.
    pub title: String,
    /// Main product photo URL, when one was found.
    pub image_url: Option<String>,
    /// Pre-discount price, when the page shows one.
    pub original_price: Option<f64>,
    /// Price the product currently sells for.
    pub current_price: f64,
    /// Derived discount percentage, two decimals.
    pub discount_percent: Option<f64>,
    /// Currency symbol, e.g. `R$`.
    pub currency: String,
}

impl ProductData {
    /// Build product data, deriving the discount from the price pair.
    pub fn new(
        title: impl Into<String>,
        image_url: Option<String>,
        original_price: Option<f64>,
        current_price: f64,
        currency: impl Into<String>,
    ) -> Self {
        let original_price = original_price.filter(|orig| *orig >= current_price);
        let discount_percent =
            original_price.and_then(|orig| discount_percent(orig, current_price));

        Self {
            title: title.into(),
            image_url,
            original_price,
            current_price,
            discount_percent,
            currency: currency.into(),
        }
    }
}

/// Discount percentage for a price pair, rounded to two decimals.
///
/// Returns `None` when no real discount exists (zero or inverted pair).
pub fn discount_percent(original: f64, current: f64) -> Option<f64> {
    if original <= 0.0 || current >= original {
        return None;
    }
    Some(round2(100.0 * (original - current) / original))
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Parse a locale-formatted price into a decimal value.
///
/// Accepts the Brazilian shapes the marketplace renders: `R$ 1.234,56`,
/// `1.234,56`, `149,90`, and plain `149.90`. Currency symbols and
/// whitespace are stripped; dots are thousands separators whenever a
/// comma is present. Anything that does not survive as a positive finite
/// number is absent, never zero.
pub fn parse_price(text: &str) -> Option<f64> {
    let cleaned = text.replace("R$", "").replace('$', "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return None;
    }

    let normalised = if cleaned.contains(',') {
        cleaned.replace('.', "").replace(',', ".")
    } else {
        cleaned.to_string()
    };

    match normalised.parse::<f64>() {
        Ok(v) if v.is_finite() && v > 0.0 => Some(v),
        _ => None,
    }
}

/// Format a price for display: `R$ 1.234,56`.
pub fn format_price(value: f64, currency: &str) -> String {
    let cents = (value * 100.0).round() as i64;
    let whole = cents / 100;
    let frac = (cents % 100).abs();

    let mut grouped = String::new();
    let digits = whole.abs().to_string();
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }
    let sign = if whole < 0 { "-" } else { "" };

    format!("{currency} {sign}{grouped},{frac:02}")
}

/// Truncate to `max_chars`, appending an ellipsis when cut.
pub fn truncate_title(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(3);
    let mut out: String = text.chars().take(keep).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discount_matches_reference_scenario() {
        // 149.90 → 99.90 is the canonical fixture from the input deck.
        let p = ProductData::new("Tênis Esportivo", None, Some(149.90), 99.90, "R$");
        assert_eq!(p.discount_percent, Some(33.36));
        assert_eq!(p.original_price, Some(149.90));
    }

    #[test]
    fn no_original_price_means_no_discount() {
        let p = ProductData::new("Produto", None, None, 59.90, "R$");
        assert_eq!(p.discount_percent, None);
        assert_eq!(p.original_price, None);
    }

    #[test]
    fn inverted_pair_drops_original() {
        let p = ProductData::new("Produto", None, Some(50.0), 99.90, "R$");
        assert_eq!(p.original_price, None);
        assert_eq!(p.discount_percent, None);
    }

    #[test]
    fn equal_prices_keep_original_without_discount() {
        let p = ProductData::new("Produto", None, Some(99.90), 99.90, "R$");
        assert_eq!(p.original_price, Some(99.90));
        assert_eq!(p.discount_percent, None);
    }

    #[test]
    fn parse_brazilian_shapes() {
        assert_eq!(parse_price("R$ 1.234,56"), Some(1234.56));
        assert_eq!(parse_price("1.234,56"), Some(1234.56));
        assert_eq!(parse_price("149,90"), Some(149.90));
        assert_eq!(parse_price("149.90"), Some(149.90));
        assert_eq!(parse_price("  99  "), Some(99.0));
    }

    #[test]
    fn parse_failures_are_absent() {
        assert_eq!(parse_price(""), None);
        assert_eq!(parse_price("R$"), None);
        assert_eq!(parse_price("abc"), None);
        assert_eq!(parse_price("0"), None);
        assert_eq!(parse_price("-12,50"), None);
    }

    #[test]
    fn format_groups_thousands() {
        assert_eq!(format_price(1234.56, "R$"), "R$ 1.234,56");
        assert_eq!(format_price(99.9, "R$"), "R$ 99,90");
        assert_eq!(format_price(1_000_000.0, "R$"), "R$ 1.000.000,00");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let long = "Tênis Esportivo Masculino Corrida Academia Caminhada Leve Confortável";
        let cut = truncate_title(long, 60);
        assert!(cut.chars().count() <= 60);
        assert!(cut.ends_with("..."));
        assert_eq!(truncate_title("curto", 60), "curto");
    }
}
