//! Procedural card rendering: direct drawing primitives, no browser.
//!
//! This backend must always work, so it depends on nothing but pixels:
//! filled rectangles, circles, polygons, and glyph rasterisation via
//! `ab_glyph`. Region proportions mirror the HTML template in
//! [`crate::pipeline::template`] — photo card top-left, green price
//! panel right, title strip above the CTA bar — so the two backends
//! produce interchangeable cards.
//!
//! Fonts come from the host system (the same well-known faces the
//! original layout was designed around). A machine with no usable font
//! still yields a structurally complete card: shapes render, text is
//! skipped with a warning, and the pipeline keeps its always-available
//! guarantee.

use ab_glyph::{FontVec, PxScale};
use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView, Rgba, RgbaImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_filled_rect_mut, draw_line_segment_mut, draw_polygon_mut,
    draw_text_mut, text_size,
};
use imageproc::point::Point;
use imageproc::rect::Rect;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment override for the card font.
pub const FONT_ENV: &str = "DEALCARD_FONT";

const BACKGROUND: Rgba<u8> = Rgba([245, 245, 245, 255]);
const CARD_WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
const PANEL_GREEN: Rgba<u8> = Rgba([25, 180, 90, 255]);
const INK_DARK: Rgba<u8> = Rgba([15, 16, 20, 255]);
const TEXT_WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
const BADGE_YELLOW: Rgba<u8> = Rgba([255, 212, 0, 255]);
const STRIKE_PALE: Rgba<u8> = Rgba([215, 245, 228, 255]);

#[cfg(target_os = "linux")]
const FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Bold.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/truetype/freefont/FreeSansBold.ttf",
];

#[cfg(target_os = "macos")]
const FONT_CANDIDATES: &[&str] = &[
    "/Library/Fonts/Arial Bold.ttf",
    "/Library/Fonts/Arial.ttf",
    "/System/Library/Fonts/Supplemental/Arial Bold.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
];

#[cfg(target_os = "windows")]
const FONT_CANDIDATES: &[&str] = &[
    r"C:\Windows\Fonts\arialbd.ttf",
    r"C:\Windows\Fonts\calibrib.ttf",
    r"C:\Windows\Fonts\arial.ttf",
];

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
const FONT_CANDIDATES: &[&str] = &[];

/// Glyph painter with a best-effort system font.
pub struct TextPainter {
    font: Option<FontVec>,
}

impl TextPainter {
    /// Load the first readable face: explicit path, `DEALCARD_FONT`,
    /// then the per-OS candidates.
    pub fn load(explicit: Option<&Path>) -> Self {
        let mut candidates: Vec<PathBuf> = Vec::new();
        if let Some(path) = explicit {
            candidates.push(path.to_path_buf());
        }
        if let Some(env_path) = std::env::var_os(FONT_ENV) {
            candidates.push(PathBuf::from(env_path));
        }
        candidates.extend(FONT_CANDIDATES.iter().map(PathBuf::from));

        for path in &candidates {
            if let Ok(bytes) = std::fs::read(path) {
                if let Ok(font) = FontVec::try_from_vec(bytes) {
                    debug!("Card font: {}", path.display());
                    return Self { font: Some(font) };
                }
            }
        }

        warn!("No usable card font found; cards render without text");
        Self { font: None }
    }

    /// A painter that never draws text. Test hook.
    #[cfg(test)]
    pub fn disabled() -> Self {
        Self { font: None }
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    fn draw(&self, img: &mut RgbaImage, color: Rgba<u8>, x: i32, y: i32, px: f32, text: &str) {
        if let Some(font) = &self.font {
            draw_text_mut(img, color, x, y, PxScale::from(px), font, text);
        }
    }

    fn measure(&self, px: f32, text: &str) -> (u32, u32) {
        match &self.font {
            Some(font) => text_size(PxScale::from(px), font, text),
            None => (0, 0),
        }
    }

    fn draw_centered(&self, img: &mut RgbaImage, color: Rgba<u8>, cx: i32, y: i32, px: f32, text: &str) {
        let (w, _) = self.measure(px, text);
        self.draw(img, color, cx - (w as i32) / 2, y, px, text);
    }

    /// Greedy word wrap against a pixel budget.
    pub fn wrap(&self, text: &str, px: f32, max_width: u32) -> Vec<String> {
        if self.font.is_none() {
            return vec![text.to_string()];
        }

        let mut lines = Vec::new();
        let mut current = String::new();
        for word in text.split_whitespace() {
            let trial = if current.is_empty() {
                word.to_string()
            } else {
                format!("{current} {word}")
            };
            if self.measure(px, &trial).0 <= max_width || current.is_empty() {
                current = trial;
            } else {
                lines.push(std::mem::take(&mut current));
                current = word.to_string();
            }
        }
        if !current.is_empty() {
            lines.push(current);
        }
        if lines.is_empty() {
            lines.push(text.to_string());
        }
        lines
    }
}

/// Card geometry derived from the canvas size; one place keeps both
/// backends' proportions aligned.
struct Layout {
    width: i32,
    height: i32,
    pad: i32,
    card_x: i32,
    card_y: i32,
    card_w: i32,
    card_h: i32,
    panel_x: i32,
    panel_y: i32,
    panel_w: i32,
    panel_h: i32,
    title_y: i32,
    cta_h: i32,
}

impl Layout {
    fn new(width: u32, height: u32, photo_region_ratio: f32) -> Self {
        let w = width as f32;
        let h = height as f32;
        Self {
            width: width as i32,
            height: height as i32,
            pad: (w * 0.037) as i32,
            card_x: (w * 0.05) as i32,
            card_y: (h * 0.12) as i32,
            card_w: (w * 0.56) as i32,
            card_h: (h * photo_region_ratio) as i32,
            panel_x: (w * 0.64) as i32,
            panel_y: (h * 0.20) as i32,
            panel_w: (w * 0.32) as i32,
            panel_h: (h * 0.24) as i32,
            title_y: (h * 0.76) as i32,
            cta_h: (h * 0.09) as i32,
        }
    }
}

/// Compose the deal card. Always succeeds and always returns exactly
/// `width`×`height` pixels.
#[allow(clippy::too_many_arguments)]
pub fn compose_card(
    product: &crate::product::ProductData,
    photo: &DynamicImage,
    width: u32,
    height: u32,
    photo_region_ratio: f32,
    title_max_chars: usize,
    title_max_lines: usize,
    painter: &TextPainter,
) -> RgbaImage {
    let layout = Layout::new(width, height, photo_region_ratio);
    let mut img = RgbaImage::from_pixel(width, height, BACKGROUND);

    draw_badge(&mut img, &layout, painter);
    draw_photo_card(&mut img, &layout, photo);
    draw_price_panel(&mut img, &layout, product, painter);
    if let Some(pct) = product.discount_percent {
        draw_discount_pill(&mut img, &layout, pct, painter);
    }
    draw_title(&mut img, &layout, product, title_max_chars, title_max_lines, painter);
    draw_cta(&mut img, &layout, painter);

    img
}

fn draw_badge(img: &mut RgbaImage, layout: &Layout, painter: &TextPainter) {
    let h = (layout.height as f32 * 0.065) as i32;
    let w = (layout.width as f32 * 0.38) as i32;
    fill_rounded_rect(img, layout.pad, layout.pad, w, h, h / 4, INK_DARK);

    let star_r = h / 5;
    let star_cx = layout.pad + h / 2;
    let star_cy = layout.pad + h / 2;
    draw_star(img, star_cx, star_cy, star_r, BADGE_YELLOW);

    let px = h as f32 * 0.5;
    painter.draw(
        img,
        TEXT_WHITE,
        star_cx + star_r + h / 3,
        layout.pad + (h - px as i32) / 2,
        px,
        "ACHADO DO DIA",
    );
}

fn draw_photo_card(img: &mut RgbaImage, layout: &Layout, photo: &DynamicImage) {
    fill_rounded_rect(
        img,
        layout.card_x,
        layout.card_y,
        layout.card_w,
        layout.card_h,
        layout.card_w / 16,
        CARD_WHITE,
    );

    // Fit preserving aspect ratio inside a small inner margin.
    let margin = (layout.card_w as f32 * 0.03) as u32;
    let max_w = (layout.card_w as u32).saturating_sub(margin * 2).max(1);
    let max_h = (layout.card_h as u32).saturating_sub(margin * 2).max(1);
    let (pw, ph) = (photo.width().max(1), photo.height().max(1));
    let scale = (max_w as f32 / pw as f32).min(max_h as f32 / ph as f32);
    let fit_w = ((pw as f32 * scale) as u32).max(1);
    let fit_h = ((ph as f32 * scale) as u32).max(1);

    let resized = imageops::resize(photo, fit_w, fit_h, FilterType::Lanczos3);
    let x = layout.card_x as i64 + ((layout.card_w as i64 - fit_w as i64) / 2);
    let y = layout.card_y as i64 + ((layout.card_h as i64 - fit_h as i64) / 2);
    imageops::overlay(img, &resized, x, y);
}

fn draw_price_panel(
    img: &mut RgbaImage,
    layout: &Layout,
    product: &crate::product::ProductData,
    painter: &TextPainter,
) {
    fill_rounded_rect(
        img,
        layout.panel_x,
        layout.panel_y,
        layout.panel_w,
        layout.panel_h,
        layout.panel_w / 14,
        PANEL_GREEN,
    );

    let inner_x = layout.panel_x + layout.panel_w / 10;
    let mut cursor_y = layout.panel_y + layout.panel_h / 10;

    if let Some(orig) = product.original_price {
        let text = crate::product::format_price(orig, &product.currency);
        let px = layout.panel_h as f32 * 0.11;
        painter.draw(img, STRIKE_PALE, inner_x, cursor_y, px, &text);
        let (tw, th) = painter.measure(px, &text);
        if tw > 0 {
            let mid = cursor_y as f32 + th as f32 / 2.0;
            draw_line_segment_mut(
                img,
                (inner_x as f32, mid),
                (inner_x as f32 + tw as f32, mid),
                STRIKE_PALE,
            );
        }
        cursor_y += (px * 1.3) as i32;
    }

    let currency_px = layout.panel_h as f32 * 0.16;
    painter.draw(img, TEXT_WHITE, inner_x, cursor_y, currency_px, &product.currency);
    cursor_y += (currency_px * 1.15) as i32;

    let amount = crate::product::format_price(product.current_price, &product.currency);
    let amount = amount
        .trim_start_matches(product.currency.as_str())
        .trim()
        .to_string();
    let price_px = layout.panel_h as f32 * 0.34;
    painter.draw(img, TEXT_WHITE, inner_x, cursor_y, price_px, &amount);
}

fn draw_discount_pill(img: &mut RgbaImage, layout: &Layout, pct: f64, painter: &TextPainter) {
    let h = (layout.height as f32 * 0.055) as i32;
    let w = (layout.width as f32 * 0.14) as i32;
    let x = layout.panel_x + layout.panel_w - w;
    let y = (layout.height as f32 * 0.12) as i32;
    fill_rounded_rect(img, x, y, w, h, h / 2, BADGE_YELLOW);

    let px = h as f32 * 0.6;
    let label = format!("-{}%", pct.round() as i64);
    painter.draw_centered(img, INK_DARK, x + w / 2, y + (h - px as i32) / 2, px, &label);
}

fn draw_title(
    img: &mut RgbaImage,
    layout: &Layout,
    product: &crate::product::ProductData,
    title_max_chars: usize,
    title_max_lines: usize,
    painter: &TextPainter,
) {
    let truncated = crate::product::truncate_title(&product.title, title_max_chars);
    let px = layout.height as f32 * 0.039;
    let max_width = (layout.width - layout.pad * 2) as u32;

    let mut lines = painter.wrap(&truncated, px, max_width);
    lines.truncate(title_max_lines);

    let mut y = layout.title_y;
    for line in lines {
        painter.draw_centered(img, INK_DARK, layout.width / 2, y, px, &line);
        y += (px * 1.2) as i32;
    }
}

fn draw_cta(img: &mut RgbaImage, layout: &Layout, painter: &TextPainter) {
    let y = layout.height - layout.cta_h;
    draw_filled_rect_mut(
        img,
        Rect::at(0, y).of_size(layout.width as u32, layout.cta_h as u32),
        INK_DARK,
    );

    let px = layout.cta_h as f32 * 0.4;
    painter.draw_centered(
        img,
        TEXT_WHITE,
        layout.width / 2,
        y + (layout.cta_h - px as i32) / 2,
        px,
        "Vale muito a pena",
    );
}

/// Rectangle with quarter-circle corners.
fn fill_rounded_rect(
    img: &mut RgbaImage,
    x: i32,
    y: i32,
    w: i32,
    h: i32,
    radius: i32,
    color: Rgba<u8>,
) {
    if w <= 0 || h <= 0 {
        return;
    }
    let r = radius.clamp(0, w.min(h) / 2);

    draw_filled_rect_mut(
        img,
        Rect::at(x + r, y).of_size((w - 2 * r).max(1) as u32, h as u32),
        color,
    );
    draw_filled_rect_mut(
        img,
        Rect::at(x, y + r).of_size(w as u32, (h - 2 * r).max(1) as u32),
        color,
    );
    if r > 0 {
        draw_filled_circle_mut(img, (x + r, y + r), r, color);
        draw_filled_circle_mut(img, (x + w - r - 1, y + r), r, color);
        draw_filled_circle_mut(img, (x + r, y + h - r - 1), r, color);
        draw_filled_circle_mut(img, (x + w - r - 1, y + h - r - 1), r, color);
    }
}

/// Five-pointed star, alternating outer/inner vertices.
fn draw_star(img: &mut RgbaImage, cx: i32, cy: i32, radius: i32, color: Rgba<u8>) {
    let mut points = Vec::with_capacity(10);
    for i in 0..10 {
        let angle = -std::f32::consts::FRAC_PI_2 + (i as f32) * std::f32::consts::PI / 5.0;
        let r = if i % 2 == 0 { radius as f32 } else { radius as f32 / 2.0 };
        points.push(Point::new(
            cx + (r * angle.cos()) as i32,
            cy + (r * angle.sin()) as i32,
        ));
    }
    // draw_polygon_mut rejects a closed ring where last == first.
    if points.first() != points.last() {
        draw_polygon_mut(img, &points, color);
    }
}
