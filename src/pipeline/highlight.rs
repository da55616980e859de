//! Syntax highlighting for fenced code blocks.
//!
//! Highlighting is best effort: an unknown language, a missing language tag
//! or any syntect failure yields [`Highlight::Plain`] and the renderer falls
//! back to escaped, unstyled code. Colours are emitted as inline `style`
//! attributes so the PDF needs no extra stylesheet.

use once_cell::sync::Lazy;
use syntect::easy::HighlightLines;
use syntect::highlighting::{Theme, ThemeSet};
use syntect::html::{styled_line_to_highlighted_html, IncludeBackground};
use syntect::parsing::{SyntaxReference, SyntaxSet};
use syntect::util::LinesWithEndings;
use tracing::debug;

static SYNTAXES: Lazy<SyntaxSet> = Lazy::new(SyntaxSet::load_defaults_newlines);
static THEMES: Lazy<ThemeSet> = Lazy::new(ThemeSet::load_defaults);

/// Light theme close to GitHub's code colours.
const THEME_NAME: &str = "InspiredGitHub";

/// Result of highlighting one code block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Highlight {
    /// Highlighted inner markup for `<code>`; already HTML-escaped.
    Markup(String),
    /// Not highlighted; the caller emits escaped plain text.
    Plain,
}

/// Highlight `code` written in `lang` (the first word of the fence info string).
pub fn highlight(code: &str, lang: &str) -> Highlight {
    let lang = lang.trim();
    if lang.is_empty() {
        return Highlight::Plain;
    }
    let Some(syntax) = find_syntax(lang) else {
        debug!("No syntax for fence language '{}'", lang);
        return Highlight::Plain;
    };
    let Some(theme) = THEMES.themes.get(THEME_NAME) else {
        return Highlight::Plain;
    };

    match highlight_with(code, syntax, theme) {
        Ok(markup) => Highlight::Markup(markup),
        Err(e) => {
            debug!("Highlighting '{}' failed, using plain text: {}", lang, e);
            Highlight::Plain
        }
    }
}

fn highlight_with(
    code: &str,
    syntax: &SyntaxReference,
    theme: &Theme,
) -> Result<String, syntect::Error> {
    let mut highlighter = HighlightLines::new(syntax, theme);
    let mut out = String::with_capacity(code.len() * 2);
    for line in LinesWithEndings::from(code) {
        let regions = highlighter.highlight_line(line, &SYNTAXES)?;
        out.push_str(&styled_line_to_highlighted_html(&regions, IncludeBackground::No)?);
    }
    Ok(out)
}

fn find_syntax(token: &str) -> Option<&'static SyntaxReference> {
    let lowercase = token.to_ascii_lowercase();
    SYNTAXES
        .find_syntax_by_token(&lowercase)
        .or_else(|| SYNTAXES.find_syntax_by_name(token))
        .or_else(|| SYNTAXES.find_syntax_by_extension(&lowercase))
}
