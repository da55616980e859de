//! Conversion entry points.
//!
//! [`Converter`] owns the local asset server for its whole lifetime so that a
//! batch of documents shares one server:
//!
//! ```text
//! Converter::new ──▶ start ──▶ convert × N ──▶ close
//! ```
//!
//! [`convert_file`] wraps that lifecycle for the common one-file case.

use crate::config::ConversionConfig;
use crate::error::{Md2PdfError, Stage};
use crate::output::{ConversionOutput, ConversionStats};
use crate::pipeline::images::{self, ImageResolver};
use crate::pipeline::pdf::{self, PdfLayout, PdfOptions};
use crate::pipeline::server::AssetServer;
use crate::pipeline::{compose, markdown};
use std::net::SocketAddr;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Markdown-to-PDF converter bound to one configuration and asset server.
///
/// # Example
/// ```rust,no_run
/// use edgequake_md2pdf::{ConversionConfig, Converter};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ConversionConfig::builder().image_dir("docs").build()?;
/// let mut converter = Converter::new(config);
/// converter.start().await?;
/// let output = converter.convert("# Hello\n", Some("Greeting")).await;
/// converter.close().await?;
/// output?.write_pdf("hello.pdf").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Converter {
    config: ConversionConfig,
    server: AssetServer,
}

impl Converter {
    pub fn new(config: ConversionConfig) -> Self {
        let server = AssetServer::new(&config.image_dir, config.asset_port);
        Self { config, server }
    }

    pub fn config(&self) -> &ConversionConfig {
        &self.config
    }

    /// Start the local asset server.
    pub async fn start(&mut self) -> Result<SocketAddr, Md2PdfError> {
        self.server.start().await
    }

    /// Stop the local asset server. The converter cannot be restarted.
    pub async fn close(&mut self) -> Result<(), Md2PdfError> {
        self.server.close().await
    }

    /// Convert Markdown to HTML and PDF.
    ///
    /// `title` defaults to the empty string. Images that cannot be fetched
    /// keep their `src` and are listed in
    /// [`ConversionOutput::image_failures`]; they never fail the call. Local
    /// images only resolve while the converter is started.
    ///
    /// # Errors
    /// [`Md2PdfError::StageFailed`] naming the first stage that failed.
    pub async fn convert(
        &self,
        markdown: &str,
        title: Option<&str>,
    ) -> Result<ConversionOutput, Md2PdfError> {
        let result = self.run_stages(markdown, title).await;
        if let (Err(e), Some(cb)) = (&result, &self.config.progress_callback) {
            cb.on_conversion_failed(e);
        }
        result
    }

    async fn run_stages(
        &self,
        markdown: &str,
        title: Option<&str>,
    ) -> Result<ConversionOutput, Md2PdfError> {
        let total_start = Instant::now();
        let title = title.unwrap_or("");
        let progress = self.config.progress_callback.clone();
        let mut stats = ConversionStats::default();
        info!("Starting conversion: {} bytes of Markdown", markdown.len());

        if let Some(cb) = &progress {
            cb.on_conversion_start();
        }
        let stage_started = |stage: Stage| {
            if let Some(cb) = &progress {
                cb.on_stage_start(stage);
            }
            Instant::now()
        };
        let stage_done = |stage: Stage, started: Instant| -> u64 {
            let ms = started.elapsed().as_millis() as u64;
            if let Some(cb) = &progress {
                cb.on_stage_complete(stage, ms);
            }
            debug!("Stage '{}' took {}ms", stage, ms);
            ms
        };

        // ── Step 1: Markdown → HTML body ─────────────────────────────────
        let t = stage_started(Stage::Render);
        let body = markdown::render(markdown, &self.config);
        stats.render_duration_ms = stage_done(Stage::Render, t);

        // ── Step 2: Page template ────────────────────────────────────────
        let t = stage_started(Stage::Compose);
        let page = compose::compose(&body, title, &self.config.style, &self.config.template)?;
        stats.compose_duration_ms = stage_done(Stage::Compose, t);

        // ── Step 3: Inline images ────────────────────────────────────────
        let t = stage_started(Stage::ResolveImages);
        let client = images::build_client(self.config.image_timeout_secs)?;
        let resolver = ImageResolver::new(client, &self.config.image_dir, self.server.base_url())
            .concurrency(self.config.image_concurrency)
            .progress(progress.clone());
        let (html, report) = resolver.resolve(&page).await?;
        stats.record_images(&report);
        stats.image_duration_ms = stage_done(Stage::ResolveImages, t);

        // ── Step 4: Print ────────────────────────────────────────────────
        let t = stage_started(Stage::CapturePdf);
        let pdf = pdf::render_pdf(&html, &self.pdf_options()).await?;
        stats.pdf_duration_ms = stage_done(Stage::CapturePdf, t);

        stats.html_bytes = html.len();
        stats.pdf_bytes = pdf.len();
        stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
        info!(
            "Conversion complete: {} bytes of PDF, {}/{} images inlined, {}ms total",
            stats.pdf_bytes, stats.images_resolved, stats.images_found, stats.total_duration_ms
        );

        if let Some(cb) = &progress {
            cb.on_conversion_complete(&stats);
        }

        Ok(ConversionOutput {
            html,
            pdf,
            stats,
            image_failures: report.failures,
        })
    }

    /// Like [`Self::convert`] for raw bytes; fails with
    /// [`Md2PdfError::InvalidInput`] before any I/O unless both the document
    /// and the title are valid UTF-8.
    pub async fn convert_from_bytes(
        &self,
        markdown: &[u8],
        title: Option<&[u8]>,
    ) -> Result<ConversionOutput, Md2PdfError> {
        let markdown = std::str::from_utf8(markdown).map_err(|e| Md2PdfError::InvalidInput {
            reason: format!("document is not valid UTF-8: {e}"),
        })?;
        let title = title
            .map(std::str::from_utf8)
            .transpose()
            .map_err(|e| Md2PdfError::InvalidInput {
                reason: format!("title is not valid UTF-8: {e}"),
            })?;
        self.convert(markdown, title).await
    }

    fn pdf_options(&self) -> PdfOptions {
        PdfOptions {
            browser_executable: self.config.browser_executable.clone(),
            navigation_timeout: Duration::from_millis(self.config.navigation_timeout_ms),
            layout: PdfLayout::default(),
        }
    }
}

/// Read `input`, convert it and write the PDF to `output`.
///
/// The asset server is started for this one document and closed again even
/// when the conversion fails.
pub async fn convert_file(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    title: Option<&str>,
    config: ConversionConfig,
) -> Result<ConversionOutput, Md2PdfError> {
    let input = input.as_ref();
    let bytes = tokio::fs::read(input)
        .await
        .map_err(|e| Md2PdfError::InvalidInput {
            reason: format!("cannot read '{}': {e}", input.display()),
        })?;

    let mut converter = Converter::new(config);
    converter.start().await?;
    let converted = converter
        .convert_from_bytes(&bytes, title.map(str::as_bytes))
        .await;
    let closed = converter.close().await;

    let result = converted?;
    closed?;
    result.write_pdf(output).await?;
    Ok(result)
}

/// Synchronous wrapper around [`convert_file`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    title: Option<&str>,
    config: ConversionConfig,
) -> Result<ConversionOutput, Md2PdfError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Md2PdfError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert_file(input, output, title, config))
}
