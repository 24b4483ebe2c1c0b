//! Configuration types for the deal-image pipeline.
//!
//! All run behaviour is controlled through [`PipelineConfig`], built via
//! its [`PipelineConfigBuilder`]. Keeping every knob in one struct makes
//! it trivial to share configs across tasks, log them, and diff two runs
//! to understand why their outputs differ.
//!
//! # Design choice: builder over constructor
//! A fifteen-field constructor is unreadable and breaks on every new
//! field. The builder lets callers set only what they care about and
//! rely on well-documented defaults for the rest.

use crate::error::DealcardError;
use crate::progress::ProgressCallback;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Browser identity presented to the upstream site.
///
/// The marketplace serves a stripped "enable JavaScript" shell to clients
/// it does not recognise as real browsers, so the static strategy sends a
/// current desktop Chrome identity.
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/120.0.0.0 Safari/537.36";

/// Configuration for a deal-image pipeline run.
///
/// Built via [`PipelineConfig::builder()`] or using
/// [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use dealcard::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .image_dir("output/images")
///     .min_request_delay_ms(3000)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Output canvas width in pixels. Default: 1080.
    ///
    /// 1080×1080 is the square post format; both render backends target
    /// exactly this size so their outputs are interchangeable.
    pub canvas_width: u32,

    /// Output canvas height in pixels. Default: 1080.
    pub canvas_height: u32,

    /// JPEG quality for the written card image, 1–100. Default: 95.
    pub jpeg_quality: u8,

    /// Directory for generated card images. Default: `output/images`.
    ///
    /// Files are named `product_{internal_id}.jpg`; the id comes from the
    /// ledger so names stay stable across re-runs.
    pub image_dir: PathBuf,

    /// Path of the JSON processing ledger. Default: `output/data/products.json`.
    pub ledger_path: PathBuf,

    /// Per-request HTTP timeout in seconds. Default: 10.
    ///
    /// Applies to the static page fetch and the product-photo download.
    /// The upstream occasionally hangs connections instead of refusing
    /// them; without this bound one bad product stalls the whole batch.
    pub request_timeout_secs: u64,

    /// Minimum delay between successive extraction attempts in
    /// milliseconds. Default: 3000.
    ///
    /// A correctness requirement, not an optimisation: the upstream rate-
    /// limits aggressively and starts serving the blocked shell once it
    /// does. The delay is measured from the previous fetch regardless of
    /// which strategy performed it.
    pub min_request_delay_ms: u64,

    /// How long the dynamic strategy lets a page settle after navigation
    /// before reading the DOM, in milliseconds. Default: 5000.
    ///
    /// Prices on the target are injected by client-side script well after
    /// the load event fires.
    pub browser_settle_ms: u64,

    /// Bound on headless-browser launch and navigation, in seconds.
    /// Default: 20.
    pub browser_launch_timeout_secs: u64,

    /// User-Agent header for all HTTP requests. Default: [`DEFAULT_USER_AGENT`].
    pub user_agent: String,

    /// Skip the capability probe and treat the browser backend as
    /// unavailable. Default: false.
    ///
    /// Forces static-only extraction and procedural-only rendering; used
    /// by the CLI `--no-browser` flag and by tests.
    pub disable_browser: bool,

    /// Explicit browser executable, checked before the well-known
    /// locations. Default: None.
    pub browser_executable: Option<PathBuf>,

    /// Explicit font file for the procedural backend, checked before the
    /// per-OS system font list. Default: None.
    pub font_path: Option<PathBuf>,

    /// Title truncation length in characters. Default: 60.
    pub title_max_chars: usize,

    /// Maximum wrapped title lines on the card. Default: 2.
    pub title_max_lines: usize,

    /// Fraction of canvas height reserved for the product photo.
    /// Default: 0.55.
    pub photo_region_ratio: f32,

    /// Cooperative stop flag, checked between items. Default: None.
    ///
    /// Setting the flag finishes the in-flight item normally and then
    /// ends the run; no item is ever interrupted mid-flight.
    pub stop_flag: Option<Arc<AtomicBool>>,

    /// Progress callback fired per item. Default: None.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            canvas_width: 1080,
            canvas_height: 1080,
            jpeg_quality: 95,
            image_dir: PathBuf::from("output/images"),
            ledger_path: PathBuf::from("output/data/products.json"),
            request_timeout_secs: 10,
            min_request_delay_ms: 3000,
            browser_settle_ms: 5000,
            browser_launch_timeout_secs: 20,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            disable_browser: false,
            browser_executable: None,
            font_path: None,
            title_max_chars: 60,
            title_max_lines: 2,
            photo_region_ratio: 0.55,
            stop_flag: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("canvas_width", &self.canvas_width)
            .field("canvas_height", &self.canvas_height)
            .field("jpeg_quality", &self.jpeg_quality)
            .field("image_dir", &self.image_dir)
            .field("ledger_path", &self.ledger_path)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("min_request_delay_ms", &self.min_request_delay_ms)
            .field("browser_settle_ms", &self.browser_settle_ms)
            .field("disable_browser", &self.disable_browser)
            .field("browser_executable", &self.browser_executable)
            .field("font_path", &self.font_path)
            .field("stop_flag", &self.stop_flag.as_ref().map(|_| "<AtomicBool>"))
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn RunProgressCallback>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// Output canvas dimensions as a `(width, height)` pair.
    pub fn canvas_size(&self) -> (u32, u32) {
        (self.canvas_width, self.canvas_height)
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn canvas_size(mut self, width: u32, height: u32) -> Self {
        self.config.canvas_width = width;
        self.config.canvas_height = height;
        self
    }

    pub fn jpeg_quality(mut self, q: u8) -> Self {
        self.config.jpeg_quality = q.clamp(1, 100);
        self
    }

    pub fn image_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.image_dir = dir.into();
        self
    }

    pub fn ledger_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.ledger_path = path.into();
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs.max(1);
        self
    }

    pub fn min_request_delay_ms(mut self, ms: u64) -> Self {
        self.config.min_request_delay_ms = ms;
        self
    }

    pub fn browser_settle_ms(mut self, ms: u64) -> Self {
        self.config.browser_settle_ms = ms;
        self
    }

    pub fn browser_launch_timeout_secs(mut self, secs: u64) -> Self {
        self.config.browser_launch_timeout_secs = secs.max(1);
        self
    }

    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.config.user_agent = ua.into();
        self
    }

    pub fn disable_browser(mut self, v: bool) -> Self {
        self.config.disable_browser = v;
        self
    }

    pub fn browser_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.browser_executable = Some(path.into());
        self
    }

    pub fn font_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.font_path = Some(path.into());
        self
    }

    pub fn title_max_chars(mut self, n: usize) -> Self {
        self.config.title_max_chars = n.max(8);
        self
    }

    pub fn title_max_lines(mut self, n: usize) -> Self {
        self.config.title_max_lines = n.max(1);
        self
    }

    pub fn photo_region_ratio(mut self, ratio: f32) -> Self {
        self.config.photo_region_ratio = ratio.clamp(0.2, 0.8);
        self
    }

    pub fn stop_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.config.stop_flag = Some(flag);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, DealcardError> {
        let c = &self.config;
        if c.canvas_width < 320 || c.canvas_height < 320 {
            return Err(DealcardError::InvalidConfig(format!(
                "Canvas must be at least 320×320, got {}×{}",
                c.canvas_width, c.canvas_height
            )));
        }
        if c.canvas_width > 4096 || c.canvas_height > 4096 {
            return Err(DealcardError::InvalidConfig(format!(
                "Canvas must not exceed 4096×4096, got {}×{}",
                c.canvas_width, c.canvas_height
            )));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_build() {
        let config = PipelineConfig::builder().build().expect("defaults valid");
        assert_eq!(config.canvas_size(), (1080, 1080));
        assert_eq!(config.jpeg_quality, 95);
        assert!(!config.disable_browser);
    }

    #[test]
    fn tiny_canvas_rejected() {
        let err = PipelineConfig::builder()
            .canvas_size(100, 100)
            .build()
            .expect_err("canvas below minimum");
        assert!(matches!(err, DealcardError::InvalidConfig(_)));
    }

    #[test]
    fn quality_clamped() {
        let config = PipelineConfig::builder().jpeg_quality(0).build().unwrap();
        assert_eq!(config.jpeg_quality, 1);
    }
}
