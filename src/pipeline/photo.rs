//! Product photo acquisition shared by both render backends.
//!
//! A card without its product photo is still worth posting, so photo
//! problems never fail a render: any download or decode trouble swaps in
//! a neutral placeholder and the pipeline moves on. Both the decoded
//! image (procedural backend) and the raw bytes + MIME (template
//! backend, which embeds a data URI) are kept so the photo is fetched
//! exactly once per product.

use image::{DynamicImage, GenericImageView, Rgba, RgbaImage};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

/// A fetched (or substituted) product photo.
pub struct ProductPhoto {
    /// Encoded bytes as downloaded, or PNG bytes of the placeholder.
    pub bytes: Vec<u8>,
    /// MIME type matching `bytes`.
    pub mime: &'static str,
    /// Decoded pixels for the procedural backend.
    pub image: DynamicImage,
    /// True when the placeholder was substituted.
    pub placeholder: bool,
}

/// Fetch the product photo with a bounded timeout.
///
/// `None` URL, HTTP failure, timeout, or an undecodable body all yield
/// the placeholder.
pub async fn fetch_photo(
    client: &Client,
    image_url: Option<&str>,
    timeout: Duration,
) -> ProductPhoto {
    let Some(url) = image_url else {
        debug!("No product photo URL; using placeholder");
        return placeholder_photo();
    };

    match download(client, url, timeout).await {
        Ok(photo) => photo,
        Err(detail) => {
            warn!("Photo download failed for '{url}': {detail}; using placeholder");
            placeholder_photo()
        }
    }
}

async fn download(
    client: &Client,
    url: &str,
    timeout: Duration,
) -> Result<ProductPhoto, String> {
    let response = client
        .get(url)
        .header("Accept", "image/webp,image/apng,image/*,*/*;q=0.8")
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| e.to_string())?;

    if !response.status().is_success() {
        return Err(format!("HTTP {}", response.status()));
    }

    let bytes = response.bytes().await.map_err(|e| e.to_string())?.to_vec();
    let image = image::load_from_memory(&bytes).map_err(|e| e.to_string())?;
    let mime = sniff_mime(&bytes);

    debug!("Photo downloaded: {} bytes, {}x{}", bytes.len(), image.width(), image.height());
    Ok(ProductPhoto {
        bytes,
        mime,
        image,
        placeholder: false,
    })
}

fn sniff_mime(bytes: &[u8]) -> &'static str {
    match image::guess_format(bytes) {
        Ok(image::ImageFormat::Png) => "image/png",
        Ok(image::ImageFormat::WebP) => "image/webp",
        Ok(image::ImageFormat::Gif) => "image/gif",
        _ => "image/jpeg",
    }
}

/// Neutral light-grey tile with a slightly darker frame.
pub fn placeholder_photo() -> ProductPhoto {
    const SIDE: u32 = 600;
    const FRAME: u32 = 12;

    let mut img = RgbaImage::from_pixel(SIDE, SIDE, Rgba([226, 226, 226, 255]));
    for x in 0..SIDE {
        for y in 0..SIDE {
            let on_frame =
                x < FRAME || y < FRAME || x >= SIDE - FRAME || y >= SIDE - FRAME;
            if on_frame {
                img.put_pixel(x, y, Rgba([200, 200, 200, 255]));
            }
        }
    }

    let image = DynamicImage::ImageRgba8(img);
    let mut bytes = Vec::new();
    image
        .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .expect("in-memory png encode");

    ProductPhoto {
        bytes,
        mime: "image/png",
        image,
        placeholder: true,
    }
}
