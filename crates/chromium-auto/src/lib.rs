//! # chromium-auto
//!
//! Locate a Chromium-family browser executable for headless automation, so
//! that users of `edgequake-md2pdf` do not need to pass `--browser` on every
//! run.
//!
//! ## How it works
//!
//! [`locate_browser`] checks, in order:
//!
//! 1. `MD2PDF_BROWSER_PATH`: an explicit override. If set, it must point to
//!    an existing file; a dangling override is an error rather than a silent
//!    fall-through.
//! 2. Well-known executable names on `PATH` (`chromium`, `google-chrome`, …).
//! 3. Platform install locations (`/Applications/Google Chrome.app/…`,
//!    `C:\Program Files\Google\Chrome\…`, …).
//! 4. Browser caches left behind by puppeteer (`~/.cache/puppeteer/chrome/*`)
//!    and playwright (`~/.cache/ms-playwright/chromium-*`).
//!
//! The search result (steps 2–4) is cached for the lifetime of the process.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use chromium_auto::locate_browser;
//!
//! let chrome = locate_browser().expect("no Chromium installed");
//! println!("using {}", chrome.display());
//! ```
//!
//! ## Platform support
//!
//! | OS      | Searched names / locations |
//! |---------|----------------------------|
//! | Linux   | `chromium`, `chromium-browser`, `google-chrome(-stable)`, `/snap/bin/chromium` |
//! | macOS   | `Google Chrome.app`, `Chromium.app`, `Microsoft Edge.app` |
//! | Windows | `chrome.exe` under Program Files / LocalAppData, `msedge.exe` |

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use thiserror::Error;

// ── Public constants ─────────────────────────────────────────────────────────

/// Environment variable overriding the browser executable.
pub const BROWSER_PATH_ENV: &str = "MD2PDF_BROWSER_PATH";

// ── Error type ───────────────────────────────────────────────────────────────

/// Errors returned by chromium-auto lookups.
#[derive(Error, Debug)]
pub enum LocateError {
    /// The override variable is set but points nowhere.
    #[error("{var} is set to '{path}', but no file exists there")]
    OverrideMissing { var: &'static str, path: PathBuf },

    /// Nothing usable was found in any searched location.
    #[error(
        "No Chromium/Chrome executable found ({searched} locations searched).\n\
Install Chromium or Google Chrome, or set {var}=/path/to/chrome."
    )]
    NotFound { var: &'static str, searched: usize },
}

// ── Search inputs ────────────────────────────────────────────────────────────

/// Everything the lookup reads from the environment, gathered up front so the
/// search itself is a pure function of its inputs.
#[derive(Debug, Clone, Default)]
pub struct SearchContext {
    /// Value of [`BROWSER_PATH_ENV`], if set and non-empty.
    pub override_path: Option<PathBuf>,
    /// Raw `PATH` value.
    pub path_var: Option<OsString>,
    /// Directories holding puppeteer/playwright style browser caches.
    pub cache_roots: Vec<PathBuf>,
}

impl SearchContext {
    /// Build a context from the current process environment.
    pub fn from_env() -> Self {
        let override_path = std::env::var_os(BROWSER_PATH_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        let mut cache_roots = Vec::new();
        if let Some(home) = dirs::home_dir() {
            cache_roots.push(home.join(".cache"));
        }
        if let Some(cache) = dirs::cache_dir() {
            if !cache_roots.contains(&cache) {
                cache_roots.push(cache);
            }
        }

        Self {
            override_path,
            path_var: std::env::var_os("PATH"),
            cache_roots,
        }
    }
}

// ── Internal: platform metadata ──────────────────────────────────────────────

/// Executable names looked up on `PATH`.
fn executable_names() -> &'static [&'static str] {
    match std::env::consts::OS {
        "windows" => &["chrome.exe", "chromium.exe", "msedge.exe"],
        "macos" => &["chromium", "google-chrome", "chrome"],
        _ => &[
            "chromium",
            "chromium-browser",
            "google-chrome",
            "google-chrome-stable",
            "chrome",
            "microsoft-edge",
        ],
    }
}

/// Absolute install locations, per OS.
fn install_locations() -> Vec<PathBuf> {
    match std::env::consts::OS {
        "macos" => vec![
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome".into(),
            "/Applications/Chromium.app/Contents/MacOS/Chromium".into(),
            "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge".into(),
        ],
        "windows" => {
            let mut out = Vec::new();
            for var in ["ProgramFiles", "ProgramFiles(x86)", "LOCALAPPDATA"] {
                if let Some(base) = std::env::var_os(var) {
                    let base = PathBuf::from(base);
                    out.push(base.join(r"Google\Chrome\Application\chrome.exe"));
                    out.push(base.join(r"Chromium\Application\chrome.exe"));
                    out.push(base.join(r"Microsoft\Edge\Application\msedge.exe"));
                }
            }
            out
        }
        _ => vec![
            "/usr/bin/chromium".into(),
            "/usr/bin/chromium-browser".into(),
            "/usr/bin/google-chrome".into(),
            "/snap/bin/chromium".into(),
            "/opt/google/chrome/chrome".into(),
        ],
    }
}

/// Relative path of the browser binary inside one versioned cache directory.
fn cached_binary_suffixes() -> &'static [&'static str] {
    match std::env::consts::OS {
        "macos" => &[
            "chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing",
            "chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing",
            "chrome-mac/Chromium.app/Contents/MacOS/Chromium",
        ],
        "windows" => &["chrome-win64/chrome.exe", "chrome-win/chrome.exe"],
        _ => &["chrome-linux64/chrome", "chrome-linux/chrome"],
    }
}

// ── Thread-safe singleton search cache ───────────────────────────────────────

static SEARCHED_PATH: OnceLock<Option<PathBuf>> = OnceLock::new();

// ── Public API ───────────────────────────────────────────────────────────────

/// Locate a browser using the current process environment.
///
/// The override is re-read on every call; the filesystem search runs once.
pub fn locate_browser() -> Result<PathBuf, LocateError> {
    let ctx = SearchContext::from_env();
    if ctx.override_path.is_some() {
        return locate_browser_in(&ctx);
    }

    let found = SEARCHED_PATH.get_or_init(|| locate_browser_in(&ctx).ok());
    match found {
        Some(path) => Ok(path.clone()),
        None => Err(LocateError::NotFound {
            var: BROWSER_PATH_ENV,
            searched: candidates(&ctx).len(),
        }),
    }
}

/// Locate a browser from an explicit [`SearchContext`].
pub fn locate_browser_in(ctx: &SearchContext) -> Result<PathBuf, LocateError> {
    if let Some(ref path) = ctx.override_path {
        if path.is_file() {
            return Ok(path.clone());
        }
        return Err(LocateError::OverrideMissing {
            var: BROWSER_PATH_ENV,
            path: path.clone(),
        });
    }

    let candidates = candidates(ctx);
    candidates
        .iter()
        .find(|p| is_executable(p))
        .cloned()
        .ok_or(LocateError::NotFound {
            var: BROWSER_PATH_ENV,
            searched: candidates.len(),
        })
}

/// Every path the search would probe, in priority order.
pub fn candidates(ctx: &SearchContext) -> Vec<PathBuf> {
    let mut out = Vec::new();

    if let Some(ref path_var) = ctx.path_var {
        for dir in std::env::split_paths(path_var) {
            for name in executable_names() {
                out.push(dir.join(name));
            }
        }
    }

    out.extend(install_locations());

    for root in &ctx.cache_roots {
        out.extend(cached_browsers(&root.join("puppeteer").join("chrome")));
        out.extend(cached_browsers(&root.join("ms-playwright")));
    }

    out
}

// ── Internal helpers ─────────────────────────────────────────────────────────

/// List browser binaries under a versioned cache directory, newest name first.
fn cached_browsers(root: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(root) else {
        return Vec::new();
    };

    let mut versions: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    // Version directories sort lexically close enough to numerically for
    // picking "some recent one".
    versions.sort();
    versions.reverse();

    let mut out = Vec::new();
    for dir in versions {
        for suffix in cached_binary_suffixes() {
            out.push(dir.join(suffix));
        }
    }
    out
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_executable(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"#!/bin/sh\n").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        path
    }

    #[test]
    fn override_wins_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let chrome = fake_executable(dir.path(), "my-chrome");
        let ctx = SearchContext {
            override_path: Some(chrome.clone()),
            ..Default::default()
        };
        assert_eq!(locate_browser_in(&ctx).unwrap(), chrome);
    }

    #[test]
    fn dangling_override_is_an_error() {
        let ctx = SearchContext {
            override_path: Some(PathBuf::from("/definitely/not/chrome")),
            ..Default::default()
        };
        let err = locate_browser_in(&ctx).unwrap_err();
        assert!(matches!(err, LocateError::OverrideMissing { .. }));
        assert!(err.to_string().contains(BROWSER_PATH_ENV));
    }

    #[test]
    fn finds_browser_on_path() {
        let dir = tempfile::tempdir().unwrap();
        let name = executable_names()[0];
        let chrome = fake_executable(dir.path(), name);
        let ctx = SearchContext {
            path_var: Some(dir.path().as_os_str().to_owned()),
            ..Default::default()
        };
        // PATH candidates are probed before install locations.
        assert_eq!(candidates(&ctx)[0], chrome);
        assert_eq!(locate_browser_in(&ctx).unwrap(), chrome);
    }

    #[test]
    fn finds_puppeteer_cache() {
        let dir = tempfile::tempdir().unwrap();
        let suffix = cached_binary_suffixes()[0];
        let version_dir = dir.path().join("puppeteer/chrome/linux-121.0.6167.85");
        let binary = version_dir.join(suffix);
        std::fs::create_dir_all(binary.parent().unwrap()).unwrap();
        let binary = fake_executable(binary.parent().unwrap(), binary.file_name().unwrap().to_str().unwrap());

        let ctx = SearchContext {
            cache_roots: vec![dir.path().to_path_buf()],
            ..Default::default()
        };
        assert!(candidates(&ctx).contains(&binary));
    }

    #[test]
    fn not_found_reports_search_size() {
        let ctx = SearchContext {
            path_var: Some(OsString::from("/nonexistent-bin-dir")),
            ..Default::default()
        };
        let err = LocateError::NotFound {
            var: BROWSER_PATH_ENV,
            searched: candidates(&ctx).len(),
        };
        assert!(err.to_string().contains("locations searched"));
    }
}
