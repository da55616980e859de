//! Progress-callback trait for per-stage and per-image conversion events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to receive
//! events as the pipeline moves through its stages and inlines each image.
//!
//! The trait is `Send + Sync` because images may be fetched concurrently.
//!
//! # Example
//!
//! ```rust
//! use edgequake_md2pdf::{ConversionProgressCallback, ConversionConfig, ImageOutcome};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     inlined: AtomicUsize,
//! }
//!
//! impl ConversionProgressCallback for CountingCallback {
//!     fn on_image_complete(&self, index: usize, total: usize, src: &str, outcome: &ImageOutcome) {
//!         if outcome.is_resolved() {
//!             self.inlined.fetch_add(1, Ordering::SeqCst);
//!         }
//!         eprintln!("image {}/{} {}", index + 1, total, src);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { inlined: AtomicUsize::new(0) });
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ConversionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::error::{Md2PdfError, Stage};
use crate::output::ConversionStats;
use crate::pipeline::images::ImageOutcome;
use std::sync::Arc;

/// Called by the conversion pipeline as it runs.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
///
/// # Thread safety
///
/// With `image_concurrency > 1`, `on_image_complete` may be called from
/// several tasks in an unspecified order.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once, after input validation and before any I/O.
    fn on_conversion_start(&self) {}

    /// Called when a stage begins.
    fn on_stage_start(&self, stage: Stage) {
        let _ = stage;
    }

    /// Called when a stage finishes successfully.
    ///
    /// # Arguments
    /// * `stage`: the stage that finished
    /// * `elapsed_ms`: wall-clock time spent in it
    fn on_stage_complete(&self, stage: Stage, elapsed_ms: u64) {
        let _ = (stage, elapsed_ms);
    }

    /// Called once per `<img>` after its fetch settles.
    ///
    /// # Arguments
    /// * `index`: 0-indexed position in document order
    /// * `total`: number of images being resolved
    /// * `src`: the original `src` attribute
    /// * `outcome`: inlined data URI or the soft failure
    fn on_image_complete(&self, index: usize, total: usize, src: &str, outcome: &ImageOutcome) {
        let _ = (index, total, src, outcome);
    }

    /// Called once when a stage fails and the conversion is abandoned.
    fn on_conversion_failed(&self, error: &Md2PdfError) {
        let _ = error;
    }

    /// Called once after the PDF bytes have been captured.
    fn on_conversion_complete(&self, stats: &ConversionStats) {
        let _ = stats;
    }
}

/// A no-op implementation for callers that don't need progress events.
///
/// This is the default when no callback is configured.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;
