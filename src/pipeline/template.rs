//! Browser-backed card rendering: fill the HTML template, screenshot it.
//!
//! The template is a self-contained document — inline CSS, photo embedded
//! as a data URI — so the headless page never touches the network and a
//! capture depends only on local state. Layout proportions (photo region,
//! price panel, CTA bar) match [`crate::pipeline::canvas`] so a card is
//! visually interchangeable regardless of which backend produced it.
//!
//! Every failure on this path is recoverable by construction: the caller
//! falls back to the procedural backend for the same request.

use crate::pipeline::browser::{BrowserFailure, BrowserRuntime};
use crate::pipeline::photo::ProductPhoto;
use crate::product::{format_price, truncate_title, ProductData};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{DynamicImage, GenericImageView};
use std::io::Write;
use std::time::Duration;
use tracing::debug;

/// How long the headless page gets to lay out and paint the template.
/// There is no script to settle, only image decode and font layout.
const TEMPLATE_SETTLE: Duration = Duration::from_millis(600);

/// Card layout, square post format. Placeholders (`__X__`) are filled by
/// [`build_card_html`]; the optional blocks arrive pre-rendered or empty.
const CARD_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="pt-BR">
<head>
<meta charset="utf-8"/>
<style>
  * { margin: 0; padding: 0; box-sizing: border-box; }
  html, body { width: __WIDTH__px; height: __HEIGHT__px; overflow: hidden; }
  body {
    font-family: Arial, Helvetica, sans-serif;
    background: #F5F5F5;
    position: relative;
  }
  .badge {
    position: absolute; top: 40px; left: 40px;
    display: flex; align-items: center; gap: 12px;
    background: #0F1014; color: #FFFFFF;
    padding: 14px 26px; border-radius: 14px;
    font-size: 30px; font-weight: bold; letter-spacing: 1px;
  }
  .badge .star { color: #FFD400; font-size: 32px; }
  .card {
    position: absolute; top: 12%; left: 5%;
    width: 56%; height: __PHOTO_REGION__%;
    background: #FFFFFF; border-radius: 36px;
    display: flex; align-items: center; justify-content: center;
    box-shadow: 0 10px 30px rgba(0,0,0,0.12);
  }
  .card img { max-width: 94%; max-height: 94%; object-fit: contain; }
  .price-panel {
    position: absolute; top: 20%; right: 4%;
    width: 32%; padding: 30px 30px 36px;
    background: #19B45A; border-radius: 24px; color: #FFFFFF;
  }
  .price-panel .was {
    font-size: 26px; color: #D7F5E4;
    text-decoration: line-through; margin-bottom: 6px;
  }
  .price-panel .currency { font-size: 40px; font-weight: bold; }
  .price-panel .price { font-size: 88px; font-weight: bold; line-height: 1.05; }
  .discount {
    position: absolute; top: 12%; right: 4%;
    background: #FFD400; color: #0F1014;
    font-size: 34px; font-weight: bold;
    padding: 10px 22px; border-radius: 999px;
  }
  .product-name {
    position: absolute; left: 5%; right: 5%; bottom: 16%;
    font-size: 42px; font-weight: bold; color: #0F1014;
    text-align: center;
    display: -webkit-box; -webkit-line-clamp: __TITLE_LINES__;
    -webkit-box-orient: vertical; overflow: hidden;
  }
  .cta {
    position: absolute; left: 0; right: 0; bottom: 0;
    height: 9%; background: #0F1014; color: #FFFFFF;
    display: flex; align-items: center; justify-content: center;
    font-size: 36px; font-weight: bold;
  }
</style>
</head>
<body>
  <div class="badge"><span class="star">&#9733;</span><span>ACHADO DO DIA</span></div>
  <div class="card"><img src="__PHOTO_SRC__" alt="Produto"/></div>
  __DISCOUNT_BLOCK__
  <div class="price-panel">
    __ORIGINAL_BLOCK__
    <div class="currency">__CURRENCY__</div>
    <div class="price">__PRICE__</div>
  </div>
  <div class="product-name">__TITLE__</div>
  <div class="cta">Vale muito a pena</div>
</body>
</html>
"#;

/// Fill the card template for one product.
pub fn build_card_html(
    product: &ProductData,
    photo: &ProductPhoto,
    width: u32,
    height: u32,
    title_max_chars: usize,
    title_max_lines: usize,
    photo_region_ratio: f32,
) -> String {
    let price_display = format_price(product.current_price, &product.currency);
    let amount = price_display
        .trim_start_matches(product.currency.as_str())
        .trim()
        .to_string();

    let original_block = match product.original_price {
        Some(orig) => format!(
            r#"<div class="was">{}</div>"#,
            escape_html(&format_price(orig, &product.currency))
        ),
        None => String::new(),
    };
    let discount_block = match product.discount_percent {
        Some(pct) => format!(r#"<div class="discount">-{}%</div>"#, pct.round() as i64),
        None => String::new(),
    };

    let photo_src = format!("data:{};base64,{}", photo.mime, STANDARD.encode(&photo.bytes));

    CARD_TEMPLATE
        .replace("__WIDTH__", &width.to_string())
        .replace("__HEIGHT__", &height.to_string())
        .replace("__PHOTO_REGION__", &((photo_region_ratio * 100.0) as u32).to_string())
        .replace("__TITLE_LINES__", &title_max_lines.to_string())
        .replace("__PHOTO_SRC__", &photo_src)
        .replace("__DISCOUNT_BLOCK__", &discount_block)
        .replace("__ORIGINAL_BLOCK__", &original_block)
        .replace("__CURRENCY__", &escape_html(&product.currency))
        .replace("__PRICE__", &escape_html(&amount))
        .replace("__TITLE__", &escape_html(&truncate_title(&product.title, title_max_chars)))
}

/// Render the card in a headless page and return the decoded capture.
///
/// # Errors
/// Any launch, navigation, capture, or decode problem — including a
/// blank capture, which presents as success at the CDP level.
pub async fn render_card(
    browser: &BrowserRuntime,
    html: &str,
    width: u32,
    height: u32,
) -> Result<DynamicImage, BrowserFailure> {
    let mut staged = tempfile::Builder::new()
        .prefix("dealcard-")
        .suffix(".html")
        .tempfile()
        .map_err(|e| BrowserFailure::Capture(format!("stage template: {e}")))?;
    staged
        .write_all(html.as_bytes())
        .and_then(|_| staged.flush())
        .map_err(|e| BrowserFailure::Capture(format!("stage template: {e}")))?;

    let page_url = url::Url::from_file_path(staged.path())
        .map_err(|_| BrowserFailure::Navigation("template path not absolute".to_string()))?;

    let session = browser
        .session(width, height)
        .await
        .ok_or_else(|| BrowserFailure::Launch("browser unavailable".to_string()))?;

    let result = session.screenshot(page_url.as_str(), TEMPLATE_SETTLE).await;
    session.close().await;
    let bytes = result?;

    let capture = image::load_from_memory(&bytes)
        .map_err(|e| BrowserFailure::Capture(format!("decode capture: {e}")))?;

    if looks_blank(&capture) {
        return Err(BrowserFailure::Capture("blank capture".to_string()));
    }

    debug!("Template capture: {}x{}", capture.width(), capture.height());
    Ok(capture)
}

/// A capture where a sample grid is one uniform colour carries no card.
fn looks_blank(img: &DynamicImage) -> bool {
    let rgba = img.to_rgba8();
    let (w, h) = rgba.dimensions();
    if w == 0 || h == 0 {
        return true;
    }
    let first = rgba.get_pixel(0, 0);
    let step_x = (w / 16).max(1);
    let step_y = (h / 16).max(1);
    for x in (0..w).step_by(step_x as usize) {
        for y in (0..h).step_by(step_y as usize) {
            if rgba.get_pixel(x, y) != first {
                return false;
            }
        }
    }
    true
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::photo::placeholder_photo;

    fn sample_product() -> ProductData {
        ProductData::new(
            "Tênis <Esportivo> & Leve",
            Some("https://example.com/a.jpg".into()),
            Some(149.90),
            99.90,
            "R$",
        )
    }

    #[test]
    fn template_fills_every_placeholder() {
        let html = build_card_html(&sample_product(), &placeholder_photo(), 1080, 1080, 60, 2, 0.55);
        assert!(!html.contains("__"), "unfilled placeholder in template");
        assert!(html.contains("data:image/png;base64,"));
        assert!(html.contains("99,90"));
        assert!(html.contains("R$ 149,90"));
        assert!(html.contains("-33%"));
        assert!(html.contains("width: 1080px"));
    }

    #[test]
    fn title_is_html_escaped() {
        let html = build_card_html(&sample_product(), &placeholder_photo(), 1080, 1080, 60, 2, 0.55);
        assert!(html.contains("Tênis &lt;Esportivo&gt; &amp; Leve"));
        assert!(!html.contains("<Esportivo>"));
    }

    #[test]
    fn no_discount_blocks_when_price_pair_missing() {
        let product = ProductData::new("Produto Simples Teste", None, None, 59.90, "R$");
        let html = build_card_html(&product, &placeholder_photo(), 1080, 1080, 60, 2, 0.55);
        assert!(!html.contains("class=\"discount\""));
        assert!(!html.contains("class=\"was\""));
    }

    #[test]
    fn blank_detection() {
        let flat = DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(
            64,
            64,
            image::Rgba([255, 255, 255, 255]),
        ));
        assert!(looks_blank(&flat));

        let mut varied = image::RgbaImage::from_pixel(64, 64, image::Rgba([255, 255, 255, 255]));
        varied.put_pixel(32, 32, image::Rgba([0, 0, 0, 255]));
        assert!(!looks_blank(&DynamicImage::ImageRgba8(varied)));
    }
}
