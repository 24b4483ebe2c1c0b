//! Product-link normalisation: raw URL → canonical [`ProductRef`].
//!
//! The marketplace exposes the same product under several URL shapes —
//! `produto.mercadolivre.com.br/MLB-1234567890-slug`, the catalogue form
//! `www.mercadolivre.com.br/p/MLB1234567890`, plus arbitrary tracking
//! query strings and fragments. The only stable key is the `MLB` token
//! embedded in the path, so that token (digits only, `MLB`-prefixed)
//! becomes the canonical identifier everything downstream is keyed on:
//! ledger membership, output naming, log lines.

use crate::error::ItemError;
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

/// Host suffix identifying the supported marketplace.
const MARKETPLACE_DOMAIN: &str = "mercadolivre.com.br";

static RE_PRODUCT_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)MLB-?(\d{6,})").unwrap());

/// A validated reference to one marketplace product.
///
/// Immutable once created. Two refs with the same `identifier` denote
/// the same product no matter how their source URLs differ.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductRef {
    /// Canonical product key, e.g. `MLB1234567890`.
    pub identifier: String,
    /// The URL as supplied by the caller, fragment stripped.
    pub source_url: String,
}

impl ProductRef {
    /// Parse and validate a raw product URL.
    ///
    /// Checks, in order: the string parses as an http(s) URL, the host is
    /// the supported marketplace (any subdomain), and the path carries an
    /// `MLB` product token. Query parameters never participate in the
    /// identifier.
    ///
    /// # Errors
    /// [`ItemError::InvalidReference`] when any check fails. This is a
    /// local, non-retryable failure; callers report it and move on.
    pub fn parse(raw: &str) -> Result<Self, ItemError> {
        let trimmed = raw.trim();
        let url = Url::parse(trimmed).map_err(|e| ItemError::InvalidReference {
            url: trimmed.to_string(),
            detail: format!("not a valid URL: {e}"),
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(ItemError::InvalidReference {
                url: trimmed.to_string(),
                detail: format!("unsupported scheme '{}'", url.scheme()),
            });
        }

        let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
        let domain_ok =
            host == MARKETPLACE_DOMAIN || host.ends_with(&format!(".{MARKETPLACE_DOMAIN}"));
        if !domain_ok {
            return Err(ItemError::InvalidReference {
                url: trimmed.to_string(),
                detail: format!("unsupported domain '{host}'"),
            });
        }

        // The token lives in the path; a token that only appears in the
        // query string (e.g. a tracking redirect) is not a product page.
        let digits = RE_PRODUCT_TOKEN
            .captures(url.path())
            .map(|caps| caps[1].to_string())
            .ok_or_else(|| ItemError::InvalidReference {
                url: trimmed.to_string(),
                detail: "no MLB product token in path".to_string(),
            })?;

        let mut source = url.clone();
        source.set_fragment(None);

        Ok(Self {
            identifier: format!("MLB{digits}"),
            source_url: source.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_standard_product_url() {
        let r = ProductRef::parse("https://produto.mercadolivre.com.br/MLB-1234567890-tenis")
            .expect("valid reference");
        assert_eq!(r.identifier, "MLB1234567890");
    }

    #[test]
    fn parses_catalogue_form() {
        let r = ProductRef::parse("https://www.mercadolivre.com.br/p/MLB51568808")
            .expect("valid reference");
        assert_eq!(r.identifier, "MLB51568808");
    }

    #[test]
    fn query_string_never_changes_identifier() {
        let a = ProductRef::parse("https://produto.mercadolivre.com.br/MLB-1234567890").unwrap();
        let b = ProductRef::parse(
            "https://produto.mercadolivre.com.br/MLB-1234567890?utm_source=x&ref=abc",
        )
        .unwrap();
        assert_eq!(a.identifier, b.identifier);
    }

    #[test]
    fn fragment_is_stripped_from_source() {
        let r = ProductRef::parse("https://produto.mercadolivre.com.br/MLB-1234567890#reviews")
            .unwrap();
        assert!(!r.source_url.contains('#'));
    }

    #[test]
    fn rejects_foreign_domain() {
        let err = ProductRef::parse("https://www.amazon.com.br/dp/B0ABCDEF").unwrap_err();
        assert!(matches!(err, ItemError::InvalidReference { .. }));
    }

    #[test]
    fn rejects_lookalike_domain() {
        let err =
            ProductRef::parse("https://evilmercadolivre.com.br/MLB-1234567890").unwrap_err();
        assert!(matches!(err, ItemError::InvalidReference { .. }));
    }

    #[test]
    fn rejects_missing_token() {
        let err = ProductRef::parse("https://www.mercadolivre.com.br/ofertas").unwrap_err();
        assert!(matches!(err, ItemError::InvalidReference { .. }));
    }

    #[test]
    fn rejects_token_only_in_query() {
        let err =
            ProductRef::parse("https://www.mercadolivre.com.br/sec/redirect?item=MLB-1234567890")
                .unwrap_err();
        assert!(matches!(err, ItemError::InvalidReference { .. }));
    }

    #[test]
    fn rejects_non_url_input() {
        assert!(ProductRef::parse("not a url").is_err());
        assert!(ProductRef::parse("").is_err());
    }

    #[test]
    fn lowercase_token_accepted() {
        let r = ProductRef::parse("https://produto.mercadolivre.com.br/mlb-1234567890").unwrap();
        assert_eq!(r.identifier, "MLB1234567890");
    }
}
