//! Pipeline stages for Markdown-to-PDF conversion.
//!
//! Each submodule implements exactly one transformation step, so each can be
//! tested on its own with plain strings.
//!
//! ## Data Flow
//!
//! ```text
//! markdown ──▶ markdown ──▶ compose ──▶ images ──▶ pdf
//!  (&str)      (HTML body)  (page)     (data URIs) (Chromium)
//! ```
//!
//! 1. [`markdown`]: parse and run the ordered event passes (highlighting
//!    via [`highlight`], emoji via [`emoji`], task lists, footnotes, heading
//!    anchors via [`slug`], table of contents)
//! 2. [`compose`]: lift the TOC out of the body and fill the page template
//! 3. [`images`]: inline every `<img>` as base64; local files come from
//!    the [`server`] running on loopback
//! 4. [`pdf`]: print the self-contained page with headless Chromium

pub mod compose;
pub mod emoji;
pub mod highlight;
pub mod images;
pub mod markdown;
pub mod pdf;
pub mod server;
pub mod slug;
