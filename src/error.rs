//! Error types for the edgequake-md2pdf library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Md2PdfError`] (**fatal**): the conversion cannot proceed at all
//!   (input is not UTF-8, the template does not compile, the browser did not
//!   launch). Returned as `Err(Md2PdfError)` from the top-level `convert*`
//!   functions.
//!
//! * [`ImageError`] (**non-fatal**): a single image could not be inlined
//!   (404, connection refused, truncated body) but the rest of the document is
//!   fine. Carried by [`crate::pipeline::images::ImageOutcome::Unresolved`] and
//!   reported through the progress callback; the `<img>` keeps its original
//!   `src`.
//!
//! Nothing in the pipeline retries. Callers that want retry semantics wrap
//! `convert` themselves.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Pipeline stage a fatal error originated from.
///
/// Each stage maps 1:1 to a step of [`crate::convert::Converter::convert`]
/// or of the PDF renderer, so an error message always says *where* the
/// conversion broke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Stage {
    /// Markdown → HTML.
    Render,
    /// Template substitution and TOC extraction.
    Compose,
    /// Fetching and inlining `<img>` sources.
    ResolveImages,
    /// Locating and spawning the headless browser.
    LaunchBrowser,
    /// Opening a browser tab.
    NewPage,
    /// Navigating to the placeholder document.
    Navigate,
    /// Injecting the final HTML.
    SetContent,
    /// `Page.printToPDF`.
    CapturePdf,
    /// Shutting the browser down.
    CloseBrowser,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Render => "rendering Markdown",
            Stage::Compose => "composing document",
            Stage::ResolveImages => "converting images",
            Stage::LaunchBrowser => "launching browser",
            Stage::NewPage => "creating new page",
            Stage::Navigate => "navigating to placeholder page",
            Stage::SetContent => "setting page content",
            Stage::CapturePdf => "rendering PDF",
            Stage::CloseBrowser => "closing browser",
        };
        f.write_str(s)
    }
}

/// All fatal errors returned by the edgequake-md2pdf library.
///
/// Image-level failures use [`ImageError`] and never surface here.
#[derive(Debug, Error)]
pub enum Md2PdfError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The document or title is not valid text. Raised before any I/O.
    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    // ── Pipeline errors ───────────────────────────────────────────────────
    /// A pipeline stage failed; the whole conversion is aborted.
    #[error("Error while {stage}: {detail}")]
    StageFailed { stage: Stage, detail: String },

    // ── Asset server errors ───────────────────────────────────────────────
    /// The local image server could not bind its port.
    #[error("Failed to bind image server on {addr}: {source}\nIs another process using the port? Try --port.")]
    AssetServerBind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The local image server was used out of order (double start, restart after close).
    #[error("Image server misuse: {0}")]
    AssetServer(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Md2PdfError {
    /// Wrap any displayable failure as a [`Md2PdfError::StageFailed`].
    pub fn stage(stage: Stage, detail: impl fmt::Display) -> Self {
        Md2PdfError::StageFailed {
            stage,
            detail: detail.to_string(),
        }
    }

    /// The stage this error came from, if it is a stage failure.
    pub fn failed_stage(&self) -> Option<Stage> {
        match self {
            Md2PdfError::StageFailed { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

/// A non-fatal error for a single image.
///
/// The conversion continues; the image keeps its original `src`.
#[derive(Debug, Clone, Error, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ImageError {
    /// The server answered with something other than `200 OK`.
    #[error("HTTP {status} for '{url}' (is the image folder route correct?)")]
    HttpStatus { url: String, status: u16 },

    /// Connection refused, DNS failure, timeout, redirect loop, …
    #[error("request to '{url}' failed: {detail}")]
    Request { url: String, detail: String },

    /// Headers arrived but the body could not be read.
    #[error("reading body of '{url}' failed: {detail}")]
    Body { url: String, detail: String },

    /// The `src` could not be turned into a fetchable URL.
    #[error("'{src}' is not a fetchable image URL: {detail}")]
    InvalidUrl { src: String, detail: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_failure_names_the_stage() {
        let e = Md2PdfError::stage(Stage::LaunchBrowser, "no chrome");
        let msg = e.to_string();
        assert!(msg.contains("launching browser"), "got: {msg}");
        assert!(msg.contains("no chrome"), "got: {msg}");
        assert_eq!(e.failed_stage(), Some(Stage::LaunchBrowser));
    }

    #[test]
    fn invalid_input_has_no_stage() {
        let e = Md2PdfError::InvalidInput {
            reason: "not UTF-8".into(),
        };
        assert_eq!(e.failed_stage(), None);
        assert!(e.to_string().contains("not UTF-8"));
    }

    #[test]
    fn image_status_display() {
        let e = ImageError::HttpStatus {
            url: "http://127.0.0.1:3000/pic.png".into(),
            status: 404,
        };
        let msg = e.to_string();
        assert!(msg.contains("404"), "got: {msg}");
        assert!(msg.contains("pic.png"), "got: {msg}");
    }

    #[test]
    fn image_error_roundtrips_through_json() {
        let e = ImageError::Request {
            url: "https://example.test/a.png".into(),
            detail: "connection refused".into(),
        };
        let json = serde_json::to_string(&e).unwrap();
        let back: ImageError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, e);
    }

    #[test]
    fn bind_error_display() {
        let e = Md2PdfError::AssetServerBind {
            addr: "127.0.0.1:3000".into(),
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"),
        };
        assert!(e.to_string().contains("127.0.0.1:3000"));
    }
}
