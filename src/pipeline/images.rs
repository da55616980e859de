//! Image inlining: every `<img src>` becomes a base64 `data:` URI.
//!
//! ## Protocol
//!
//! 1. Collect the `src` of every `<img>` in document order.
//! 2. Classify each one. `http(s)://` sources are fetched as-is; anything
//!    else is treated as a path under the image directory and fetched from
//!    the local asset server; `data:` URIs and empty sources are skipped.
//! 3. Fetch each image as an independent task. Only `200 OK` counts; any
//!    other status, transport error or body error is a soft failure and the
//!    `<img>` keeps its original `src`.
//! 4. Once every outcome is known, rewrite the document in one pass.
//!
//! Outcomes are gathered before rewriting, so fetching several images at once
//! (`image_concurrency > 1`) cannot change the output.

use crate::error::{ImageError, Md2PdfError, Stage};
use crate::progress::ProgressCallback;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures::stream::{self, StreamExt};
use lol_html::{element, rewrite_str, RewriteStrSettings};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Where an `<img src>` points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Absolute `http://` or `https://` URL.
    Remote(String),
    /// Path relative to the image directory, served by the asset server.
    Local(String),
    /// Already a `data:` URI.
    Inline,
}

impl ImageSource {
    /// Classify a non-empty `src` attribute.
    pub fn classify(src: &str, image_dir: &Path) -> Self {
        let lower = src.get(..8).unwrap_or(src).to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            ImageSource::Remote(src.to_string())
        } else if lower.starts_with("data:") {
            ImageSource::Inline
        } else {
            ImageSource::Local(local_path(src, image_dir))
        }
    }

    /// URL to fetch, or `None` for inline sources.
    pub fn fetch_url(&self, asset_base_url: &str) -> Option<String> {
        match self {
            ImageSource::Remote(url) => Some(url.clone()),
            ImageSource::Local(path) => Some(format!(
                "{}/{}",
                asset_base_url.trim_end_matches('/'),
                path
            )),
            ImageSource::Inline => None,
        }
    }
}

/// Map a local `src` to a path below the asset server root.
///
/// A leading `./` and a leading `<image-dir name>/` are dropped, so with an
/// image directory of `docs/images`, `images/a.png`, `./images/a.png` and
/// `a.png` all resolve to `a.png`.
pub fn local_path(src: &str, image_dir: &Path) -> String {
    let dir = image_dir.to_string_lossy().replace('\\', "/");
    let dir_name = dir.trim_end_matches('/').rsplit('/').next().unwrap_or("");

    let mut path = src.strip_prefix("./").unwrap_or(src);
    if !dir_name.is_empty() && dir_name != "." {
        if let Some(rest) = path
            .strip_prefix(dir_name)
            .and_then(|rest| rest.strip_prefix('/'))
        {
            path = rest;
        }
    }
    path.trim_start_matches('/').to_string()
}

/// Result of resolving one image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ImageOutcome {
    /// `data:<content-type>;base64,<payload>`
    Resolved(String),
    /// Soft failure; the original `src` is kept.
    Unresolved(ImageError),
}

impl ImageOutcome {
    pub fn is_resolved(&self) -> bool {
        matches!(self, ImageOutcome::Resolved(_))
    }
}

/// A single image that could not be inlined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageFailure {
    pub src: String,
    pub error: ImageError,
}

/// Summary of one resolution run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImageReport {
    /// `<img>` elements in the document.
    pub found: usize,
    /// Inlined as `data:` URIs.
    pub resolved: usize,
    /// Fetch attempted but failed.
    pub unresolved: usize,
    /// Empty `src` or already inline.
    pub skipped: usize,
    /// Details for every unresolved image, in document order.
    pub failures: Vec<ImageFailure>,
}

/// Build the HTTP client used for image fetches.
///
/// Without a timeout a fetch may wait indefinitely.
pub fn build_client(timeout_secs: Option<u64>) -> Result<Client, Md2PdfError> {
    let mut builder = Client::builder();
    if let Some(secs) = timeout_secs {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    builder
        .build()
        .map_err(|e| Md2PdfError::stage(Stage::ResolveImages, e))
}

/// Fetches and inlines the images of a composed document.
pub struct ImageResolver {
    client: Client,
    image_dir: PathBuf,
    asset_base_url: String,
    concurrency: usize,
    progress: Option<ProgressCallback>,
}

impl ImageResolver {
    pub fn new(client: Client, image_dir: impl Into<PathBuf>, asset_base_url: impl Into<String>) -> Self {
        Self {
            client,
            image_dir: image_dir.into(),
            asset_base_url: asset_base_url.into(),
            concurrency: 1,
            progress: None,
        }
    }

    /// Number of fetches in flight at once (min 1).
    pub fn concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    pub fn progress(mut self, cb: Option<ProgressCallback>) -> Self {
        self.progress = cb;
        self
    }

    /// Inline every fetchable image of `html`.
    ///
    /// Only HTML rewriting errors are fatal; individual images never fail
    /// the call.
    pub async fn resolve(&self, html: &str) -> Result<(String, ImageReport), Md2PdfError> {
        let sources = collect_sources(html)?;
        let mut report = ImageReport {
            found: sources.len(),
            ..ImageReport::default()
        };
        info!("Found {} <img> tags", sources.len());

        let mut jobs = Vec::new();
        for (position, src) in sources.iter().enumerate() {
            let Some(src) = src else {
                debug!("Skipping image with empty src");
                report.skipped += 1;
                continue;
            };
            match ImageSource::classify(src, &self.image_dir).fetch_url(&self.asset_base_url) {
                Some(url) => jobs.push((position, src.clone(), url)),
                None => {
                    debug!("Image already inline, skipping");
                    report.skipped += 1;
                }
            }
        }

        let total = jobs.len();
        let client = &self.client;
        let progress = self.progress.as_ref();
        let fetched: Vec<(usize, String, ImageOutcome)> = stream::iter(jobs.into_iter().enumerate())
            .map(|(job, (position, src, url))| async move {
                debug!("Embedding image: {} -> {}", src, url);
                let outcome = fetch_image(client, &url).await;
                if let Some(cb) = progress {
                    cb.on_image_complete(job, total, &src, &outcome);
                }
                (position, src, outcome)
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut outcomes: Vec<Option<ImageOutcome>> = vec![None; sources.len()];
        for (position, src, outcome) in fetched {
            match &outcome {
                ImageOutcome::Resolved(_) => report.resolved += 1,
                ImageOutcome::Unresolved(error) => {
                    warn!("Image '{}' left unresolved: {}", src, error);
                    report.unresolved += 1;
                    report.failures.push(ImageFailure {
                        src,
                        error: error.clone(),
                    });
                }
            }
            outcomes[position] = Some(outcome);
        }

        let html = apply_outcomes(html, &outcomes)?;
        info!(
            "Images: {} inlined, {} unresolved, {} skipped",
            report.resolved, report.unresolved, report.skipped
        );
        Ok((html, report))
    }
}

/// GET `url` and turn the body into a data URI.
pub async fn fetch_image(client: &Client, url: &str) -> ImageOutcome {
    if let Err(e) = reqwest::Url::parse(url) {
        return ImageOutcome::Unresolved(ImageError::InvalidUrl {
            src: url.to_string(),
            detail: e.to_string(),
        });
    }

    let response = match client.get(url).send().await {
        Ok(r) => r,
        Err(e) => {
            return ImageOutcome::Unresolved(ImageError::Request {
                url: url.to_string(),
                detail: e.to_string(),
            })
        }
    };

    if response.status() != StatusCode::OK {
        return ImageOutcome::Unresolved(ImageError::HttpStatus {
            url: url.to_string(),
            status: response.status().as_u16(),
        });
    }

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.replace(' ', ""))
        .filter(|v| !v.is_empty());

    let bytes = match response.bytes().await {
        Ok(b) => b,
        Err(e) => {
            return ImageOutcome::Unresolved(ImageError::Body {
                url: url.to_string(),
                detail: e.to_string(),
            })
        }
    };

    let content_type = content_type.unwrap_or_else(|| guess_content_type(url));
    ImageOutcome::Resolved(format!(
        "data:{};base64,{}",
        content_type,
        STANDARD.encode(&bytes)
    ))
}

fn guess_content_type(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

/// `src` of every `<img>` in document order; `None` when missing or blank.
///
/// Character references are decoded (`?a=1&amp;b=2` → `?a=1&b=2`), so the
/// values are ready to fetch.
pub fn collect_sources(html: &str) -> Result<Vec<Option<String>>, Md2PdfError> {
    let sources = Rc::new(RefCell::new(Vec::new()));

    rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![element!("img", {
                let sources = Rc::clone(&sources);
                move |el| {
                    let src = el
                        .get_attribute("src")
                        .map(|raw| html_escape::decode_html_entities(&raw).into_owned())
                        .filter(|s| !s.trim().is_empty());
                    sources.borrow_mut().push(src);
                    Ok(())
                }
            })],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|e| Md2PdfError::stage(Stage::ResolveImages, e))?;

    let collected = sources.borrow().clone();
    Ok(collected)
}

/// Replace the `src` of the N-th `<img>` with `outcomes[N]` when resolved.
pub fn apply_outcomes(html: &str, outcomes: &[Option<ImageOutcome>]) -> Result<String, Md2PdfError> {
    if !outcomes.iter().flatten().any(ImageOutcome::is_resolved) {
        return Ok(html.to_string());
    }

    let index = Rc::new(RefCell::new(0usize));
    rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![element!("img", {
                let index = Rc::clone(&index);
                move |el| {
                    let mut idx = index.borrow_mut();
                    if let Some(Some(ImageOutcome::Resolved(uri))) = outcomes.get(*idx) {
                        el.set_attribute("src", uri)?;
                    }
                    *idx += 1;
                    Ok(())
                }
            })],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|e| Md2PdfError::stage(Stage::ResolveImages, e))
}
