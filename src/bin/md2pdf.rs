//! CLI binary for edgequake-md2pdf.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ConversionConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_md2pdf::{
    ConversionConfig, ConversionProgressCallback, ConversionStats, Converter, ImageOutcome,
    Md2PdfError, ProgressCallback, Stage,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a spinner naming the current stage plus one
/// log line per image.
struct CliProgressCallback {
    bar: ProgressBar,
    unresolved: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            unresolved: AtomicUsize::new(0),
        })
    }

    /// Stop the spinner so an error message is not drawn over.
    fn abandon(&self) {
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_stage_start(&self, stage: Stage) {
        self.bar.set_prefix("Converting");
        self.bar.set_message(format!("{stage}…"));
    }

    fn on_stage_complete(&self, stage: Stage, elapsed_ms: u64) {
        self.bar.println(format!(
            "  {} {:<22} {}",
            green("✓"),
            stage.to_string(),
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
        ));
    }

    fn on_image_complete(&self, index: usize, total: usize, src: &str, outcome: &ImageOutcome) {
        // Truncate long sources to keep output tidy.
        let shown = if src.chars().count() > 60 {
            format!("{}\u{2026}", src.chars().take(59).collect::<String>())
        } else {
            src.to_string()
        };
        match outcome {
            ImageOutcome::Resolved(_) => self.bar.println(format!(
                "    {} image {:>3}/{:<3} {}",
                green("✓"),
                index + 1,
                total,
                dim(&shown)
            )),
            ImageOutcome::Unresolved(e) => {
                self.unresolved.fetch_add(1, Ordering::SeqCst);
                self.bar.println(format!(
                    "    {} image {:>3}/{:<3} {}  {}",
                    red("✗"),
                    index + 1,
                    total,
                    shown,
                    red(&e.to_string())
                ));
            }
        }
    }

    fn on_conversion_failed(&self, _error: &Md2PdfError) {
        self.abandon();
    }

    fn on_conversion_complete(&self, stats: &ConversionStats) {
        self.bar.finish_and_clear();
        let unresolved = self.unresolved.load(Ordering::SeqCst);
        if unresolved == 0 {
            eprintln!(
                "{} PDF rendered  ({} images inlined)",
                green("✔"),
                bold(&stats.images_resolved.to_string())
            );
        } else {
            eprintln!(
                "{} PDF rendered  ({}/{} images inlined, {} left as links)",
                cyan("⚠"),
                stats.images_resolved,
                stats.images_resolved + unresolved,
                red(&unresolved.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Basic conversion (writes README.pdf next to the input)
  md2pdf README.md

  # Explicit output, title and table of contents
  md2pdf notes.md -o out/notes.pdf --title "Meeting notes" --toc

  # Images referenced as images/diagram.png live in docs/images
  md2pdf docs/guide.md --image-dir docs/images

  # Custom look
  md2pdf report.md --style report.css --template page.html

  # Keep the intermediate HTML and print stats as JSON
  md2pdf report.md --html report.html --json

TEMPLATES:
  A template is an HTML file with the placeholders {{ title }}, {{ style }},
  {{ toc }} and {{ content }}. Mustache-style {{{content}}} also works.
  The title is HTML-escaped; the other three are inserted verbatim.

ENVIRONMENT VARIABLES:
  MD2PDF_BROWSER_PATH     Chromium / Chrome executable to use
  RUST_LOG                Log filter (overrides -v / -q)

SETUP:
  md2pdf drives a headless Chromium. It looks for chromium, chromium-browser,
  google-chrome and a puppeteer / playwright download; set
  MD2PDF_BROWSER_PATH when yours lives elsewhere.
"#;

/// Convert Markdown files to PDF via headless Chromium.
#[derive(Parser, Debug)]
#[command(
    name = "md2pdf",
    version,
    about = "Convert Markdown files to self-contained PDFs",
    long_about = "Convert Markdown documents to paginated PDFs. Headings get anchors, an optional \
table of contents is generated, code is highlighted, emoji shortcodes are expanded and every \
image (local or remote) is embedded, so the PDF has no external references.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Markdown file to convert.
    input: PathBuf,

    /// Write the PDF here. Default: input path with a `.pdf` extension.
    #[arg(short, long, env = "MD2PDF_OUTPUT")]
    output: Option<PathBuf>,

    /// Also write the final, image-inlined HTML here.
    #[arg(long, env = "MD2PDF_HTML")]
    html: Option<PathBuf>,

    /// Document title (HTML `<title>`). Default: input file stem.
    #[arg(long, env = "MD2PDF_TITLE")]
    title: Option<String>,

    /// Directory holding local images. Default: the input file's directory.
    #[arg(long, env = "MD2PDF_IMAGE_DIR")]
    image_dir: Option<PathBuf>,

    /// CSS file replacing the built-in stylesheet.
    #[arg(long, env = "MD2PDF_STYLE")]
    style: Option<PathBuf>,

    /// HTML template replacing the built-in one.
    #[arg(long, env = "MD2PDF_TEMPLATE")]
    template: Option<PathBuf>,

    /// Insert a table of contents at the top of the document.
    #[arg(long, env = "MD2PDF_TOC")]
    toc: bool,

    /// Loopback port for the local image server (0 = any free port).
    #[arg(long, env = "MD2PDF_PORT", default_value_t = 3000)]
    port: u16,

    /// Number of images fetched at the same time.
    #[arg(long, env = "MD2PDF_IMAGE_CONCURRENCY", default_value_t = 1,
          value_parser = clap::value_parser!(u64).range(1..=64))]
    image_concurrency: u64,

    /// Per-image HTTP timeout in seconds (default: wait indefinitely).
    #[arg(long, env = "MD2PDF_IMAGE_TIMEOUT")]
    image_timeout: Option<u64>,

    /// Chromium / Chrome executable.
    #[arg(long, env = "MD2PDF_BROWSER_PATH")]
    browser: Option<PathBuf>,

    /// Print conversion stats as JSON on stdout.
    #[arg(long, env = "MD2PDF_JSON")]
    json: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "MD2PDF_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "MD2PDF_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "MD2PDF_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the spinner is active;
    // the spinner provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let spinner = show_progress.then(CliProgressCallback::new);
    let progress_cb = spinner
        .clone()
        .map(|cb| cb as Arc<dyn ConversionProgressCallback>);
    let abandon_spinner = || {
        if let Some(spinner) = &spinner {
            spinner.abandon();
        }
    };
    let config = build_config(&cli, progress_cb)
        .await
        .inspect_err(|_| abandon_spinner())?;

    let markdown = tokio::fs::read(&cli.input)
        .await
        .inspect_err(|_| abandon_spinner())
        .with_context(|| format!("Failed to read {}", cli.input.display()))?;
    let title = cli.title.clone().unwrap_or_else(|| default_title(&cli.input));
    let output_path = cli
        .output
        .clone()
        .unwrap_or_else(|| cli.input.with_extension("pdf"));

    // ── Run conversion ───────────────────────────────────────────────────
    // The image server is closed even when the conversion fails.
    let mut converter = Converter::new(config);
    if let Err(e) = converter.start().await {
        abandon_spinner();
        return Err(e).context("Failed to start the local image server");
    }
    let converted = converter
        .convert_from_bytes(&markdown, Some(title.as_bytes()))
        .await;
    let closed = converter.close().await;
    abandon_spinner();

    let output = converted.context("Conversion failed")?;
    closed.context("Failed to shut down the local image server")?;

    output
        .write_pdf(&output_path)
        .await
        .context("Failed to write PDF")?;
    if let Some(ref html_path) = cli.html {
        output
            .write_html(html_path)
            .await
            .context("Failed to write HTML")?;
    }

    // ── Report ───────────────────────────────────────────────────────────
    if cli.json {
        let json =
            serde_json::to_string_pretty(&output.stats).context("Failed to serialise stats")?;
        println!("{json}");
    } else if !cli.quiet {
        let stats = &output.stats;
        eprintln!(
            "{}  {} KiB  {}ms  →  {}",
            if stats.images_unresolved == 0 {
                green("✔")
            } else {
                cyan("⚠")
            },
            stats.pdf_bytes / 1024,
            stats.total_duration_ms,
            bold(&output_path.display().to_string()),
        );
        for failure in &output.image_failures {
            eprintln!("   {} {}", red("✗"), dim(&failure.error.to_string()));
        }
    }

    Ok(())
}

/// Map CLI args to `ConversionConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let image_dir = cli.image_dir.clone().unwrap_or_else(|| {
        cli.input
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    });

    let mut builder = ConversionConfig::builder()
        .image_dir(image_dir)
        .table_of_contents(cli.toc)
        .asset_port(cli.port)
        .image_concurrency(cli.image_concurrency as usize);

    if let Some(ref path) = cli.style {
        let css = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read style from {:?}", path))?;
        builder = builder.style(css);
    }
    if let Some(ref path) = cli.template {
        let html = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read template from {:?}", path))?;
        builder = builder.template(html);
    }
    if let Some(secs) = cli.image_timeout {
        builder = builder.image_timeout_secs(secs);
    }
    if let Some(ref browser) = cli.browser {
        builder = builder.browser_executable(browser);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn default_title(input: &Path) -> String {
    input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}
