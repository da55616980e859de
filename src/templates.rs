//! Built-in page template, stylesheet and asset locations.
//!
//! The look of a PDF produced without `--style`/`--template` comes from the
//! two files under `assets/`, embedded at compile time.
//!
//! Callers can override both through [`crate::config::ConversionConfig`];
//! the constants here are used only when no override is provided.

/// Default page template.
///
/// Placeholders: `title` (escaped), `style`, `toc`, `content` (inserted
/// verbatim). Mustache triple braces (`{{{content}}}`) are accepted too.
pub const DEFAULT_TEMPLATE: &str = include_str!("../assets/template.html");

/// Default stylesheet, loosely modelled on GitHub's Markdown rendering.
pub const DEFAULT_STYLE: &str = include_str!("../assets/style.css");

/// twemoji 72×72 PNG set. `{codepoints}.png` is appended per emoji.
pub const TWEMOJI_BASE_URL: &str = "https://cdn.jsdelivr.net/gh/twitter/twemoji@14.0.2/assets/72x72/";

/// Marker prepended to the Markdown when a table of contents is requested.
pub const TOC_MARKER: &str = "[toc]";

/// `id` of the `<nav>` the TOC pass emits and the composer extracts.
pub const TOC_CONTAINER_ID: &str = "table-of-contents";

/// Document loaded before the real content is injected.
pub const PLACEHOLDER_PAGE: &str = "data:text/html,<h1>Not Rendered</h1>";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_template_has_all_placeholders() {
        for name in ["title", "style", "toc", "content"] {
            assert!(
                DEFAULT_TEMPLATE.contains(&format!("{{{{ {name} }}}}")),
                "template is missing `{name}`"
            );
        }
    }

    #[test]
    fn default_style_is_nonempty_css() {
        assert!(DEFAULT_STYLE.contains("body"));
        assert!(DEFAULT_STYLE.contains(".task-list-item"));
    }

    #[test]
    fn twemoji_base_ends_with_slash() {
        assert!(TWEMOJI_BASE_URL.ends_with('/'));
    }
}
