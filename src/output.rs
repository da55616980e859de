//! Conversion results: the final HTML, the PDF bytes and run statistics.

use crate::error::Md2PdfError;
use crate::pipeline::images::{ImageFailure, ImageReport};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Output of one successful conversion.
#[derive(Debug, Clone)]
pub struct ConversionOutput {
    /// The page that was printed, with every resolvable image inlined.
    pub html: String,
    /// PDF bytes as produced by the browser.
    pub pdf: Vec<u8>,
    pub stats: ConversionStats,
    /// Images that kept their original `src`, in document order.
    pub image_failures: Vec<ImageFailure>,
}

impl ConversionOutput {
    /// Write [`Self::html`] to `path` (temp file + rename).
    pub async fn write_html(&self, path: impl AsRef<Path>) -> Result<(), Md2PdfError> {
        write_atomic(path.as_ref(), self.html.as_bytes()).await
    }

    /// Write [`Self::pdf`] to `path` (temp file + rename).
    pub async fn write_pdf(&self, path: impl AsRef<Path>) -> Result<(), Md2PdfError> {
        write_atomic(path.as_ref(), &self.pdf).await
    }
}

/// Counters and timings for one conversion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionStats {
    /// `<img>` elements in the composed page.
    pub images_found: usize,
    pub images_resolved: usize,
    pub images_unresolved: usize,
    /// Empty `src` or already a `data:` URI.
    pub images_skipped: usize,
    pub html_bytes: usize,
    pub pdf_bytes: usize,
    pub render_duration_ms: u64,
    pub compose_duration_ms: u64,
    pub image_duration_ms: u64,
    pub pdf_duration_ms: u64,
    pub total_duration_ms: u64,
}

impl ConversionStats {
    pub(crate) fn record_images(&mut self, report: &ImageReport) {
        self.images_found = report.found;
        self.images_resolved = report.resolved;
        self.images_unresolved = report.unresolved;
        self.images_skipped = report.skipped;
    }
}

/// Write `bytes` next to `path` first, then rename over it, so readers never
/// see a half-written file.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), Md2PdfError> {
    let fail = |source| Md2PdfError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(fail)?;
    }

    let tmp_path = tmp_path_for(path);
    tokio::fs::write(&tmp_path, bytes).await.map_err(fail)?;
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(fail(e));
    }
    Ok(())
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
