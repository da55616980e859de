//! End-to-end integration tests for edgequake-md2pdf.
//!
//! Most tests drive the pipeline up to (but excluding) the browser: they
//! render, compose and resolve images against local axum servers bound to
//! port 0. Tests that launch Chromium are gated behind the `E2E_ENABLED`
//! environment variable so they do not run in CI unless explicitly requested.
//!
//! Run with:
//!   E2E_ENABLED=1 cargo test --test e2e -- --nocapture
//!
//! Point at a specific browser with `MD2PDF_BROWSER_PATH=/path/to/chrome`.

use axum::http::{header, StatusCode};
use axum::extract::Query;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_md2pdf::pipeline::images::{self, ImageResolver};
use edgequake_md2pdf::pipeline::server::AssetServer;
use edgequake_md2pdf::pipeline::{compose, markdown};
use edgequake_md2pdf::{
    ConversionConfig, ConversionProgressCallback, Converter, ImageError, ImageOutcome,
    Md2PdfError, Stage,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

const PNG: &[u8] = b"\x89PNG\r\n\x1a\n-not-really-a-png";

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Skip this test unless E2E_ENABLED is set.
macro_rules! e2e_skip_unless_enabled {
    () => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP — set E2E_ENABLED=1 to run browser tests");
            return;
        }
    }};
}

/// Route library logs into the test output; `RUST_LOG=debug` for detail.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Stub image host on an ephemeral port. Returns its base URL.
async fn stub_image_host() -> String {
    let app = Router::new()
        .route(
            "/ok.png",
            get(|| async { ([(header::CONTENT_TYPE, "image/png")], PNG) }),
        )
        .route(
            "/spaced.svg",
            get(|| async {
                (
                    [(header::CONTENT_TYPE, "image/svg+xml; charset=utf-8")],
                    "<svg/>",
                )
            }),
        )
        .route(
            "/untyped.gif",
            get(|| async { axum::body::Body::from("GIF89a") }),
        )
        .route("/created.png", get(|| async { (StatusCode::CREATED, PNG) }))
        .route(
            "/badge.png",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                if params.get("a").map(String::as_str) == Some("1")
                    && params.get("b").map(String::as_str) == Some("2")
                {
                    ([(header::CONTENT_TYPE, "image/png")], PNG).into_response()
                } else {
                    (StatusCode::BAD_REQUEST, format!("bad query: {params:?}")).into_response()
                }
            }),
        )
        .route(
            "/gone.png",
            get(|| async { (StatusCode::NOT_FOUND, "missing") }),
        );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn png_data_uri() -> String {
    format!("data:image/png;base64,{}", STANDARD.encode(PNG))
}

fn resolver(image_dir: &std::path::Path, asset_base_url: &str) -> ImageResolver {
    ImageResolver::new(images::build_client(Some(5)).unwrap(), image_dir, asset_base_url)
}

#[derive(Default)]
struct RecordingCallback {
    stages: Mutex<Vec<Stage>>,
    images: AtomicUsize,
    unresolved: AtomicUsize,
    failed_at: Mutex<Option<Stage>>,
    completed: AtomicUsize,
}

impl ConversionProgressCallback for RecordingCallback {
    fn on_stage_start(&self, stage: Stage) {
        self.stages.lock().unwrap().push(stage);
    }

    fn on_image_complete(&self, _index: usize, _total: usize, _src: &str, outcome: &ImageOutcome) {
        self.images.fetch_add(1, Ordering::SeqCst);
        if !outcome.is_resolved() {
            self.unresolved.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn on_conversion_failed(&self, error: &Md2PdfError) {
        *self.failed_at.lock().unwrap() = error.failed_stage();
    }

    fn on_conversion_complete(&self, _stats: &edgequake_md2pdf::ConversionStats) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }
}

// ── Render + compose ─────────────────────────────────────────────────────────

#[test]
fn test_toc_page_lists_all_headings() {
    let config = ConversionConfig::builder()
        .table_of_contents(true)
        .build()
        .unwrap();
    let body = markdown::render("# One\n\ntext\n\n## Two\n\n# Three\n", &config);
    let page = compose::compose(&body, "Doc", &config.style, &config.template).unwrap();

    let toc_start = page.find("<div id=\"table-of-contents\">").unwrap();
    let article = page.find("<article").unwrap();
    let toc = &page[toc_start..article];
    for slug in ["#one", "#two", "#three"] {
        assert!(toc.contains(slug), "TOC is missing {slug}: {toc}");
    }
    assert!(!page.contains("<nav"), "nav must be lifted out of the body");
    assert!(page[article..].contains("<h2 id=\"two\">"));
}

#[test]
fn test_duplicate_headings_link_to_distinct_anchors() {
    let config = ConversionConfig::builder()
        .table_of_contents(true)
        .build()
        .unwrap();
    let body = markdown::render("# Notes\n\n# Notes\n", &config);
    assert!(body.contains("<a href=\"#notes\">Notes</a>"));
    assert!(body.contains("<a href=\"#notes-1\">Notes</a>"));
    assert!(body.contains("<h1 id=\"notes-1\">"));
}

#[test]
fn test_custom_mustache_template() {
    let config = ConversionConfig::builder()
        .template("<html><title>{{title}}</title><body>{{{toc}}}|{{{content}}}</body></html>")
        .table_of_contents(true)
        .build()
        .unwrap();
    let body = markdown::render("# Only\n", &config);
    let page = compose::compose(&body, "T & C", &config.style, &config.template).unwrap();
    assert!(page.starts_with("<html><title>T &amp; C</title><body><ul><li><a href=\"#only\">"), "got: {page}");
    assert!(page.contains("</ul>|"), "got: {page}");
    assert!(page.contains("<h1 id=\"only\">"), "got: {page}");
}

// ── Image resolution ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_remote_image_is_inlined() {
    let host = stub_image_host().await;
    let html = format!("<p><img src=\"{host}/ok.png\" alt=\"ok\"></p>");
    let (out, report) = resolver(std::path::Path::new("."), "http://127.0.0.1:1")
        .resolve(&html)
        .await
        .unwrap();

    assert!(out.contains(&format!("src=\"{}\"", png_data_uri())), "got: {out}");
    assert_eq!(report.found, 1);
    assert_eq!(report.resolved, 1);
}

#[tokio::test]
async fn test_query_string_is_fetched_with_decoded_ampersand() {
    init_tracing();
    let host = stub_image_host().await;
    let body = markdown::render(
        &format!("![badge]({host}/badge.png?a=1&b=2)\n"),
        &ConversionConfig::default(),
    );
    assert!(body.contains("?a=1&amp;b=2"), "writer escapes '&': {body}");

    let (out, report) = resolver(std::path::Path::new("."), "http://127.0.0.1:1")
        .resolve(&body)
        .await
        .unwrap();
    assert_eq!(report.resolved, 1, "failures: {:?}", report.failures);
    assert!(out.contains(&png_data_uri()), "got: {out}");
}

#[tokio::test]
async fn test_non_200_responses_keep_original_src() {
    init_tracing();
    let host = stub_image_host().await;
    let html = format!(
        "<img src=\"{host}/gone.png\"><img src=\"{host}/created.png\"><img src=\"{host}/ok.png\">"
    );
    let (out, report) = resolver(std::path::Path::new("."), "http://127.0.0.1:1")
        .resolve(&html)
        .await
        .unwrap();

    assert!(out.contains(&format!("src=\"{host}/gone.png\"")));
    assert!(out.contains(&format!("src=\"{host}/created.png\"")));
    assert!(out.contains(&png_data_uri()));
    assert_eq!(report.unresolved, 2);
    assert_eq!(
        report.failures[0].error,
        ImageError::HttpStatus {
            url: format!("{host}/gone.png"),
            status: 404
        }
    );
    assert!(matches!(
        report.failures[1].error,
        ImageError::HttpStatus { status: 201, .. }
    ));
}

#[tokio::test]
async fn test_content_type_spaces_removed_and_missing_type_guessed() {
    let host = stub_image_host().await;
    let html = format!("<img src=\"{host}/spaced.svg\"><img src=\"{host}/untyped.gif\">");
    let (out, _) = resolver(std::path::Path::new("."), "http://127.0.0.1:1")
        .resolve(&html)
        .await
        .unwrap();

    assert!(out.contains("src=\"data:image/svg+xml;charset=utf-8;base64,"), "got: {out}");
    assert!(out.contains("src=\"data:image/gif;base64,"), "got: {out}");
}

#[tokio::test]
async fn test_local_image_resolves_with_and_without_dir_prefix() {
    let root = tempfile::tempdir().unwrap();
    let image_dir = root.path().join("images");
    std::fs::create_dir_all(&image_dir).unwrap();
    std::fs::write(image_dir.join("pic.png"), PNG).unwrap();

    let mut server = AssetServer::new(&image_dir, 0);
    server.start().await.unwrap();

    let html = "<img src=\"images/pic.png\"><img src=\"./pic.png\"><img src=\"pic.png\">";
    let (out, report) = resolver(&image_dir, &server.base_url())
        .resolve(html)
        .await
        .unwrap();
    server.close().await.unwrap();

    assert_eq!(report.resolved, 3, "failures: {:?}", report.failures);
    assert_eq!(out.matches(&png_data_uri()).count(), 3);
}

#[tokio::test]
async fn test_local_images_unresolved_without_server() {
    let root = tempfile::tempdir().unwrap();
    let server = AssetServer::new(root.path(), 0);
    // never started: base_url points at port 0, nothing listens there
    let (out, report) = resolver(root.path(), &server.base_url())
        .resolve("<img src=\"pic.png\">")
        .await
        .unwrap();
    assert_eq!(out, "<img src=\"pic.png\">");
    assert_eq!(report.unresolved, 1);
}

#[tokio::test]
async fn test_data_uris_and_empty_sources_are_skipped() {
    let html = "<img src=\"data:image/png;base64,AAAA\"><img><img src=\"\">";
    let (out, report) = resolver(std::path::Path::new("."), "http://127.0.0.1:1")
        .resolve(html)
        .await
        .unwrap();
    assert_eq!(out, html);
    assert_eq!(report.found, 3);
    assert_eq!(report.skipped, 3);
    assert_eq!(report.resolved + report.unresolved, 0);
}

#[tokio::test]
async fn test_concurrent_fetch_preserves_document_order() {
    let host = stub_image_host().await;
    let html = format!(
        "<img src=\"{host}/ok.png\"><img src=\"{host}/gone.png\"><img src=\"{host}/spaced.svg\">\
         <img src=\"{host}/untyped.gif\"><img src=\"{host}/ok.png\">"
    );

    let (sequential, _) = resolver(std::path::Path::new("."), "http://127.0.0.1:1")
        .resolve(&html)
        .await
        .unwrap();
    let (parallel, _) = resolver(std::path::Path::new("."), "http://127.0.0.1:1")
        .concurrency(4)
        .resolve(&html)
        .await
        .unwrap();
    assert_eq!(sequential, parallel);
}

#[tokio::test]
async fn test_progress_callback_sees_every_fetched_image() {
    let host = stub_image_host().await;
    let cb = Arc::new(RecordingCallback::default());
    let html = format!("<img src=\"{host}/ok.png\"><img src=\"{host}/gone.png\"><img src=\"data:,x\">");
    resolver(std::path::Path::new("."), "http://127.0.0.1:1")
        .progress(Some(cb.clone() as Arc<dyn ConversionProgressCallback>))
        .resolve(&html)
        .await
        .unwrap();

    assert_eq!(cb.images.load(Ordering::SeqCst), 2);
    assert_eq!(cb.unresolved.load(Ordering::SeqCst), 1);
}

// ── Converter lifecycle ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_invalid_input_fails_before_any_io() {
    let cb = Arc::new(RecordingCallback::default());
    let config = ConversionConfig::builder()
        .progress_callback(cb.clone())
        .build()
        .unwrap();
    let converter = Converter::new(config);

    let err = converter
        .convert_from_bytes(&[0x80, 0x81], Some(b"title"))
        .await
        .unwrap_err();
    assert!(matches!(err, Md2PdfError::InvalidInput { .. }), "got: {err}");
    assert!(cb.stages.lock().unwrap().is_empty(), "no stage may start");
}

#[tokio::test]
async fn test_converter_cannot_restart_after_close() {
    let dir = tempfile::tempdir().unwrap();
    let config = ConversionConfig::builder()
        .image_dir(dir.path())
        .asset_port(0)
        .build()
        .unwrap();
    let mut converter = Converter::new(config);
    converter.start().await.unwrap();
    converter.close().await.unwrap();
    assert!(matches!(
        converter.start().await.unwrap_err(),
        Md2PdfError::AssetServer(_)
    ));
}

#[tokio::test]
async fn test_stage_events_fire_in_order_until_failure() {
    let cb = Arc::new(RecordingCallback::default());
    let config = ConversionConfig::builder()
        .asset_port(0)
        .browser_executable("/nonexistent/chromium-md2pdf-test")
        .progress_callback(cb.clone())
        .build()
        .unwrap();
    let converter = Converter::new(config);

    let err = converter.convert("# Hi\n", None).await.unwrap_err();
    assert_eq!(err.failed_stage(), Some(Stage::LaunchBrowser));
    assert_eq!(
        *cb.stages.lock().unwrap(),
        vec![
            Stage::Render,
            Stage::Compose,
            Stage::ResolveImages,
            Stage::CapturePdf
        ]
    );
    assert_eq!(*cb.failed_at.lock().unwrap(), Some(Stage::LaunchBrowser));
    assert_eq!(cb.completed.load(Ordering::SeqCst), 0);
}

// ── Browser tests (E2E_ENABLED) ──────────────────────────────────────────────

#[tokio::test]
async fn test_empty_document_produces_pdf() {
    e2e_skip_unless_enabled!();
    init_tracing();

    let config = ConversionConfig::builder().asset_port(0).build().unwrap();
    let mut converter = Converter::new(config);
    converter.start().await.unwrap();
    let result = converter.convert("", Some("Title")).await;
    converter.close().await.unwrap();

    let output = result.expect("empty document converts");
    assert!(output.pdf.starts_with(b"%PDF"), "not a PDF");
    assert!(output.html.contains("<title>Title</title>"));
}

#[tokio::test]
async fn test_full_document_with_local_image() {
    e2e_skip_unless_enabled!();
    init_tracing();

    let dir = tempfile::tempdir().unwrap();
    let images = dir.path().join("images");
    std::fs::create_dir_all(&images).unwrap();
    // 1×1 transparent PNG
    let pixel = STANDARD
        .decode("iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAQAAAC1HAwCAAAAC0lEQVR42mNkYAAAAAYAAjCB0C8AAAAASUVORK5CYII=")
        .unwrap();
    std::fs::write(images.join("dot.png"), pixel).unwrap();

    let md = "# Report :rocket:\n\n- [x] done\n- [ ] todo\n\nSee note[^n].\n\n\
              ![dot](images/dot.png)\n\n```rust\nfn main() {}\n```\n\n[^n]: A footnote.\n";
    let config = ConversionConfig::builder()
        .image_dir(&images)
        .asset_port(0)
        .table_of_contents(true)
        .build()
        .unwrap();
    let mut converter = Converter::new(config);
    converter.start().await.unwrap();
    let result = converter.convert(md, Some("Report")).await;
    converter.close().await.unwrap();

    let output = result.expect("conversion succeeds");
    assert!(output.pdf.starts_with(b"%PDF"));
    assert!(output.stats.images_resolved >= 1, "stats: {:?}", output.stats);
    assert!(!output.html.contains("src=\"images/dot.png\""));

    let out_dir = tempfile::tempdir().unwrap();
    output.write_pdf(out_dir.path().join("report.pdf")).await.unwrap();
    output.write_html(out_dir.path().join("report.html")).await.unwrap();
    assert!(out_dir.path().join("report.pdf").metadata().unwrap().len() > 0);
}
