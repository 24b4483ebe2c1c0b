//! Card renderer: one public operation, two interchangeable backends.
//!
//! Backend choice is decided purely by the capability verdict in
//! [`BrowserRuntime`] — nothing else in the pipeline branches on which
//! backend ran. A browser failure mid-render (navigation, capture,
//! blank screenshot) downgrades this one request to the procedural
//! backend; [`crate::error::ItemError::Render`] is raised only when the
//! procedural path itself cannot deliver, which in practice means the
//! output file cannot be written.

use crate::config::PipelineConfig;
use crate::error::ItemError;
use crate::pipeline::browser::BrowserRuntime;
use crate::pipeline::canvas::{self, TextPainter};
use crate::pipeline::photo;
use crate::pipeline::template;
use crate::product::ProductData;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use reqwest::Client;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Renders product cards with a capability-gated backend pair.
pub struct CardRenderer<'a> {
    client: &'a Client,
    browser: &'a BrowserRuntime,
    config: &'a PipelineConfig,
    painter: TextPainter,
}

impl<'a> CardRenderer<'a> {
    pub fn new(client: &'a Client, browser: &'a BrowserRuntime, config: &'a PipelineConfig) -> Self {
        Self {
            client,
            browser,
            config,
            painter: TextPainter::load(config.font_path.as_deref()),
        }
    }

    /// Render the card for `product` and write it to `output_path`,
    /// echoing the path back on success.
    ///
    /// Guaranteed to either leave a valid JPEG of the configured canvas
    /// size at `output_path` or fail with [`ItemError::Render`].
    pub async fn render(
        &self,
        identifier: &str,
        product: &ProductData,
        output_path: &Path,
    ) -> Result<PathBuf, ItemError> {
        let (width, height) = self.config.canvas_size();

        let photo = photo::fetch_photo(
            self.client,
            product.image_url.as_deref(),
            Duration::from_secs(self.config.request_timeout_secs),
        )
        .await;

        let card = if self.browser.available().await {
            let html = template::build_card_html(
                product,
                &photo,
                width,
                height,
                self.config.title_max_chars,
                self.config.title_max_lines,
                self.config.photo_region_ratio,
            );
            match template::render_card(self.browser, &html, width, height).await {
                Ok(capture) => {
                    debug!("'{identifier}': browser backend produced the card");
                    capture
                }
                Err(e) => {
                    warn!("'{identifier}': browser backend failed ({e}); using procedural backend");
                    self.compose_procedural(product, &photo.image)
                }
            }
        } else {
            self.compose_procedural(product, &photo.image)
        };

        let card = normalise_canvas(card, width, height);
        write_jpeg(&card, output_path, self.config.jpeg_quality).map_err(|detail| {
            ItemError::Render {
                identifier: identifier.to_string(),
                detail,
            }
        })?;
        Ok(output_path.to_path_buf())
    }

    fn compose_procedural(&self, product: &ProductData, photo: &DynamicImage) -> DynamicImage {
        DynamicImage::ImageRgba8(canvas::compose_card(
            product,
            photo,
            self.config.canvas_width,
            self.config.canvas_height,
            self.config.photo_region_ratio,
            self.config.title_max_chars,
            self.config.title_max_lines,
            &self.painter,
        ))
    }
}

/// Resize to the configured canvas when a capture came back off-size
/// (device pixel ratio, window chrome). Both backends end up emitting
/// identical dimensions.
fn normalise_canvas(img: DynamicImage, width: u32, height: u32) -> DynamicImage {
    if img.width() == width && img.height() == height {
        img
    } else {
        debug!(
            "Normalising capture {}x{} → {}x{}",
            img.width(),
            img.height(),
            width,
            height
        );
        img.resize_exact(width, height, FilterType::Lanczos3)
    }
}

/// Encode as JPEG; JPEG carries no alpha, so flatten first.
fn write_jpeg(img: &DynamicImage, path: &Path, quality: u8) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| format!("create '{}': {e}", parent.display()))?;
    }
    let file = std::fs::File::create(path).map_err(|e| format!("create '{}': {e}", path.display()))?;
    let mut encoder = JpegEncoder::new_with_quality(BufWriter::new(file), quality);
    encoder
        .encode_image(&img.to_rgb8())
        .map_err(|e| format!("encode '{}': {e}", path.display()))
}
