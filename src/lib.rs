//! # edgequake-md2pdf
//!
//! Convert Markdown documents into self-contained, paginated PDFs.
//!
//! ## Why this crate?
//!
//! Markdown is easy to write but awkward to hand out. This crate renders it
//! the way a Git forge would (anchored headings, table of contents, task
//! lists, footnotes, emoji, highlighted code), inlines every image so the
//! page has no external references, and lets a headless Chromium do the
//! pagination and typesetting.
//!
//! ## Pipeline Overview
//!
//! ```text
//! Markdown
//!  │
//!  ├─ 1. Render   pulldown-cmark events + ordered passes → HTML body
//!  ├─ 2. Compose  TOC extraction + page template (title, style, toc, content)
//!  ├─ 3. Images   fetch every <img> (local ones via the loopback asset server)
//!  │              and inline it as a base64 data URI
//!  └─ 4. PDF      headless Chromium, A4 at 90 %, 50 px margins
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_md2pdf::{ConversionConfig, Converter};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConversionConfig::builder()
//!         .image_dir("docs/images")
//!         .table_of_contents(true)
//!         .build()?;
//!
//!     let mut converter = Converter::new(config);
//!     converter.start().await?;
//!     let output = converter.convert("# Report\n\n[toc]\n", Some("Report")).await;
//!     converter.close().await?;
//!
//!     let output = output?;
//!     output.write_pdf("report.pdf").await?;
//!     eprintln!("{} images inlined", output.stats.images_resolved);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `md2pdf` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! edgequake-md2pdf = { version = "0.1", default-features = false }
//! ```
//!
//! ## Browser
//!
//! A Chromium or Chrome executable is located by the `chromium-auto` crate;
//! set `MD2PDF_BROWSER_PATH` or [`ConversionConfigBuilder::browser_executable`]
//! to pick one explicitly.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod templates;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConversionConfig, ConversionConfigBuilder};
pub use convert::{convert_file, convert_sync, Converter};
pub use error::{ImageError, Md2PdfError, Stage};
pub use output::{ConversionOutput, ConversionStats};
pub use pipeline::images::{ImageFailure, ImageOutcome, ImageReport, ImageSource};
pub use pipeline::pdf::PdfLayout;
pub use pipeline::slug::SlugRegistry;
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
