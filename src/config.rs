//! Configuration types for Markdown-to-PDF conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. One struct holds every knob: the image
//! root served to the browser-side fetch, the page stylesheet and template,
//! and the few tunables the pipeline exposes (asset port, fetch concurrency,
//! timeouts). The PDF layout itself is fixed and lives in
//! [`crate::pipeline::pdf::PdfLayout`].

use crate::error::Md2PdfError;
use crate::progress::ProgressCallback;
use crate::templates::{DEFAULT_STYLE, DEFAULT_TEMPLATE, TWEMOJI_BASE_URL};
use std::fmt;
use std::path::PathBuf;

/// Configuration for a Markdown-to-PDF conversion.
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_md2pdf::ConversionConfig;
///
/// let config = ConversionConfig::builder()
///     .image_dir("docs/images")
///     .table_of_contents(true)
///     .asset_port(3000)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Directory served by the local asset server. Default: `.`.
    ///
    /// Relative `<img src>` values are resolved against this directory. A
    /// leading `<basename>/` is tolerated, so `images/pic.png` and `pic.png`
    /// both resolve when this is `images`.
    pub image_dir: PathBuf,

    /// CSS injected into the template's `style` placeholder.
    pub style: String,

    /// Page template with `title`, `style`, `toc` and `content` placeholders.
    pub template: String,

    /// Prepend a table-of-contents marker to every document. Default: false.
    pub table_of_contents: bool,

    /// Loopback port of the local asset server. Default: 3000.
    ///
    /// `0` lets the OS pick a free port; the bound port is then reported by
    /// [`crate::pipeline::server::AssetServer::base_url`].
    pub asset_port: u16,

    /// Number of images fetched at the same time. Default: 1 (document order).
    ///
    /// Outcomes are always applied in document order, so raising this only
    /// changes wall-clock time, never the output.
    pub image_concurrency: usize,

    /// Per-image HTTP timeout in seconds. Default: None (wait forever).
    pub image_timeout_secs: Option<u64>,

    /// Upper bound for the placeholder-page navigation in milliseconds. Default: 2000.
    pub navigation_timeout_ms: u64,

    /// Explicit browser executable. If None, `chromium-auto` searches for one.
    pub browser_executable: Option<PathBuf>,

    /// Base URL of the emoji image set; code points + `.png` are appended.
    pub emoji_base_url: String,

    /// Optional progress callback for stage and image events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            image_dir: PathBuf::from("."),
            style: DEFAULT_STYLE.to_string(),
            template: DEFAULT_TEMPLATE.to_string(),
            table_of_contents: false,
            asset_port: 3000,
            image_concurrency: 1,
            image_timeout_secs: None,
            navigation_timeout_ms: 2000,
            browser_executable: None,
            emoji_base_url: TWEMOJI_BASE_URL.to_string(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("image_dir", &self.image_dir)
            .field("style", &format_args!("<{} bytes>", self.style.len()))
            .field("template", &format_args!("<{} bytes>", self.template.len()))
            .field("table_of_contents", &self.table_of_contents)
            .field("asset_port", &self.asset_port)
            .field("image_concurrency", &self.image_concurrency)
            .field("image_timeout_secs", &self.image_timeout_secs)
            .field("navigation_timeout_ms", &self.navigation_timeout_ms)
            .field("browser_executable", &self.browser_executable)
            .field("emoji_base_url", &self.emoji_base_url)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ConversionConfig`].
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl fmt::Debug for ConversionConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl ConversionConfigBuilder {
    pub fn image_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.image_dir = dir.into();
        self
    }

    pub fn style(mut self, css: impl Into<String>) -> Self {
        self.config.style = css.into();
        self
    }

    pub fn template(mut self, html: impl Into<String>) -> Self {
        self.config.template = html.into();
        self
    }

    pub fn table_of_contents(mut self, v: bool) -> Self {
        self.config.table_of_contents = v;
        self
    }

    pub fn asset_port(mut self, port: u16) -> Self {
        self.config.asset_port = port;
        self
    }

    pub fn image_concurrency(mut self, n: usize) -> Self {
        self.config.image_concurrency = n.max(1);
        self
    }

    pub fn image_timeout_secs(mut self, secs: u64) -> Self {
        self.config.image_timeout_secs = Some(secs);
        self
    }

    pub fn navigation_timeout_ms(mut self, ms: u64) -> Self {
        self.config.navigation_timeout_ms = ms;
        self
    }

    pub fn browser_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.browser_executable = Some(path.into());
        self
    }

    pub fn emoji_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.emoji_base_url = url.into();
        self
    }

    /// Attach a progress callback.
    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, Md2PdfError> {
        let c = &self.config;
        if c.image_concurrency == 0 {
            return Err(Md2PdfError::InvalidConfig(
                "Image concurrency must be ≥ 1".into(),
            ));
        }
        if c.navigation_timeout_ms == 0 {
            return Err(Md2PdfError::InvalidConfig(
                "Navigation timeout must be ≥ 1 ms".into(),
            ));
        }
        if c.template.trim().is_empty() {
            return Err(Md2PdfError::InvalidConfig("Template is empty".into()));
        }
        if !c.emoji_base_url.ends_with('/') {
            return Err(Md2PdfError::InvalidConfig(format!(
                "Emoji base URL must end with '/', got '{}'",
                c.emoji_base_url
            )));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = ConversionConfig::default();
        assert_eq!(c.asset_port, 3000);
        assert_eq!(c.image_concurrency, 1);
        assert_eq!(c.navigation_timeout_ms, 2000);
        assert!(c.image_timeout_secs.is_none());
        assert!(!c.table_of_contents);
        assert!(c.template.contains("content"));
    }

    #[test]
    fn builder_clamps_concurrency() {
        let c = ConversionConfig::builder()
            .image_concurrency(0)
            .build()
            .unwrap();
        assert_eq!(c.image_concurrency, 1);
    }

    #[test]
    fn builder_rejects_empty_template() {
        let err = ConversionConfig::builder().template("  ").build().unwrap_err();
        assert!(matches!(err, Md2PdfError::InvalidConfig(_)));
    }

    #[test]
    fn builder_rejects_zero_navigation_timeout() {
        let err = ConversionConfig::builder()
            .navigation_timeout_ms(0)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("Navigation timeout"));
    }

    #[test]
    fn builder_rejects_emoji_base_without_slash() {
        assert!(ConversionConfig::builder()
            .emoji_base_url("https://cdn.example/emoji")
            .build()
            .is_err());
    }

    #[test]
    fn debug_hides_template_body() {
        let c = ConversionConfig::builder().style("body{}").build().unwrap();
        let dbg = format!("{c:?}");
        assert!(dbg.contains("<6 bytes>"), "got: {dbg}");
    }
}
