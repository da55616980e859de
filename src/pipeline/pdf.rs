//! HTML → PDF through a headless Chromium.
//!
//! ## Isolation
//!
//! Every conversion launches its own browser with a throw-away profile
//! directory.
//!
//! ## Cleanup
//!
//! The browser is closed and its process awaited on every exit path once it
//! has launched. If printing failed, that error is returned after the close
//! attempt; a close failure is reported only when everything else succeeded.

use crate::error::{Md2PdfError, Stage};
use crate::templates::PLACEHOLDER_PAGE;
use chromiumoxide::cdp::browser_protocol::page::PrintToPdfParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// CSS pixels per inch; Chromium's PDF margins are in inches.
const PX_PER_INCH: f64 = 96.0;

/// Page geometry passed to `Page.printToPDF`.
#[derive(Debug, Clone, PartialEq)]
pub struct PdfLayout {
    /// Inches.
    pub paper_width: f64,
    /// Inches.
    pub paper_height: f64,
    pub scale: f64,
    pub display_header_footer: bool,
    pub print_background: bool,
    /// CSS pixels, applied on all four sides.
    pub margin_px: f64,
}

impl Default for PdfLayout {
    /// A4, 90 % scale, no header or footer, 50 px margins.
    fn default() -> Self {
        Self {
            paper_width: 8.27,
            paper_height: 11.7,
            scale: 0.9,
            display_header_footer: false,
            print_background: false,
            margin_px: 50.0,
        }
    }
}

impl PdfLayout {
    pub fn to_params(&self) -> PrintToPdfParams {
        let margin = self.margin_px / PX_PER_INCH;
        PrintToPdfParams {
            paper_width: Some(self.paper_width),
            paper_height: Some(self.paper_height),
            scale: Some(self.scale),
            display_header_footer: Some(self.display_header_footer),
            print_background: Some(self.print_background),
            margin_top: Some(margin),
            margin_bottom: Some(margin),
            margin_left: Some(margin),
            margin_right: Some(margin),
            ..Default::default()
        }
    }
}

/// Browser-side settings for one render.
#[derive(Debug, Clone)]
pub struct PdfOptions {
    /// Explicit executable; `None` asks `chromium-auto`.
    pub browser_executable: Option<PathBuf>,
    /// Bound for loading the placeholder page.
    pub navigation_timeout: Duration,
    pub layout: PdfLayout,
}

impl Default for PdfOptions {
    fn default() -> Self {
        Self {
            browser_executable: None,
            navigation_timeout: Duration::from_millis(2000),
            layout: PdfLayout::default(),
        }
    }
}

/// Extra Chromium switches; `--headless`, `--no-sandbox` and
/// `--disable-setuid-sandbox` come from the launcher config.
const BROWSER_ARGS: &[&str] = &[
    "--disable-gpu",
    "--disable-dev-shm-usage",
    "--single-process",
];

/// Print `html` to PDF bytes.
pub async fn render_pdf(html: &str, options: &PdfOptions) -> Result<Vec<u8>, Md2PdfError> {
    let start = Instant::now();
    let executable = match &options.browser_executable {
        Some(path) => path.clone(),
        None => chromium_auto::locate_browser()
            .map_err(|e| Md2PdfError::stage(Stage::LaunchBrowser, e))?,
    };
    debug!("Using browser at {}", executable.display());

    // Dropped (and deleted) only after the browser process has exited.
    let profile = tempfile::Builder::new()
        .prefix("md2pdf-profile-")
        .tempdir()
        .map_err(|e| Md2PdfError::stage(Stage::LaunchBrowser, e))?;

    let mut builder = BrowserConfig::builder()
        .chrome_executable(&executable)
        .user_data_dir(profile.path())
        .no_sandbox();
    for arg in BROWSER_ARGS {
        builder = builder.arg(*arg);
    }
    let config = builder
        .build()
        .map_err(|e| Md2PdfError::stage(Stage::LaunchBrowser, e))?;

    let (mut browser, mut handler) = Browser::launch(config)
        .await
        .map_err(|e| Md2PdfError::stage(Stage::LaunchBrowser, e))?;

    let handler_task = tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                debug!("CDP handler event error: {}", e);
            }
        }
    });

    let printed = print_document(&browser, html, options).await;
    let closed = close_browser(&mut browser).await;
    handler_task.abort();
    drop(profile);

    match (printed, closed) {
        (Ok(pdf), Ok(())) => {
            info!(
                "Rendered PDF: {} bytes in {}ms",
                pdf.len(),
                start.elapsed().as_millis()
            );
            Ok(pdf)
        }
        (Ok(_), Err(close_err)) => Err(close_err),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(close_err)) => {
            warn!("Browser did not close cleanly after a failed render: {}", close_err);
            Err(e)
        }
    }
}

async fn print_document(
    browser: &Browser,
    html: &str,
    options: &PdfOptions,
) -> Result<Vec<u8>, Md2PdfError> {
    let page = browser
        .new_page("about:blank")
        .await
        .map_err(|e| Md2PdfError::stage(Stage::NewPage, e))?;

    navigate_placeholder(&page, options.navigation_timeout).await?;

    page.set_content(html)
        .await
        .map_err(|e| Md2PdfError::stage(Stage::SetContent, e))?;

    page.pdf(options.layout.to_params())
        .await
        .map_err(|e| Md2PdfError::stage(Stage::CapturePdf, e))
}

async fn navigate_placeholder(page: &Page, timeout: Duration) -> Result<(), Md2PdfError> {
    match tokio::time::timeout(timeout, page.goto(PLACEHOLDER_PAGE)).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) => Err(Md2PdfError::stage(Stage::Navigate, e)),
        Err(_) => Err(Md2PdfError::stage(
            Stage::Navigate,
            format!("timed out after {}ms", timeout.as_millis()),
        )),
    }
}

async fn close_browser(browser: &mut Browser) -> Result<(), Md2PdfError> {
    browser
        .close()
        .await
        .map_err(|e| Md2PdfError::stage(Stage::CloseBrowser, e))?;
    browser
        .wait()
        .await
        .map_err(|e| Md2PdfError::stage(Stage::CloseBrowser, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_layout_is_a4_at_ninety_percent() {
        let layout = PdfLayout::default();
        assert_eq!(layout.paper_width, 8.27);
        assert_eq!(layout.paper_height, 11.7);
        assert_eq!(layout.scale, 0.9);
        assert!(!layout.display_header_footer);
    }

    #[test]
    fn margins_are_converted_to_inches() {
        let params = PdfLayout::default().to_params();
        let expected = 50.0 / 96.0;
        for margin in [
            params.margin_top,
            params.margin_bottom,
            params.margin_left,
            params.margin_right,
        ] {
            let m = margin.expect("margin set");
            assert!((m - expected).abs() < 1e-9, "got {m}");
        }
        assert_eq!(params.scale, Some(0.9));
        assert_eq!(params.display_header_footer, Some(false));
    }

    #[tokio::test]
    async fn missing_executable_is_a_launch_failure() {
        let options = PdfOptions {
            browser_executable: Some(PathBuf::from("/nonexistent/chromium-md2pdf-test")),
            ..PdfOptions::default()
        };
        let err = render_pdf("<p>x</p>", &options).await.unwrap_err();
        assert_eq!(err.failed_stage(), Some(Stage::LaunchBrowser), "got: {err}");
    }
}
