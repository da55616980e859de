//! Wrap the rendered body into the page template.
//!
//! The renderer leaves the table of contents inline as
//! `<nav id="table-of-contents">`. Composition lifts the first such nav out
//! of the body into the template's `toc` slot, drops any others, and renders
//! the template with `title` escaped and `style`, `toc` and `content`
//! inserted verbatim.

use crate::error::{Md2PdfError, Stage};
use crate::templates::TOC_CONTAINER_ID;
use lol_html::html_content::ContentType;
use lol_html::{element, rewrite_str, RewriteStrSettings};
use minijinja::{context, AutoEscape, Environment, Value};
use tracing::debug;

const TOC_START: &str = "<!--md2pdf:toc:start-->";
const TOC_END: &str = "<!--md2pdf:toc:end-->";

/// Body HTML split into table of contents and remaining content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitBody {
    /// Inner markup of the first TOC container, if any.
    pub toc: Option<String>,
    /// Body with every TOC container removed.
    pub content: String,
}

/// Build the full HTML page.
///
/// The `toc` placeholder holds the first TOC container found in the body,
/// whether it came from the prepended marker or one written by hand. Without
/// one it is left undefined and renders empty.
pub fn compose(html: &str, title: &str, style: &str, template: &str) -> Result<String, Md2PdfError> {
    let SplitBody { toc, content } = split_toc(html)?;

    let toc = toc.map(Value::from_safe_string).unwrap_or(Value::UNDEFINED);

    let source = normalize_placeholders(template);
    let mut env = Environment::new();
    env.set_auto_escape_callback(|_| AutoEscape::Html);
    env.add_template("page", &source)
        .map_err(|e| Md2PdfError::stage(Stage::Compose, format!("invalid template: {e}")))?;

    let page = env
        .get_template("page")
        .and_then(|tmpl| {
            tmpl.render(context! {
                title => title,
                style => Value::from_safe_string(style.to_string()),
                toc => toc,
                content => Value::from_safe_string(content),
            })
        })
        .map_err(|e| Md2PdfError::stage(Stage::Compose, e))?;

    debug!("Composed page: {} bytes", page.len());
    Ok(page)
}

/// Separate the table of contents from the body.
pub fn split_toc(html: &str) -> Result<SplitBody, Md2PdfError> {
    let selector = format!("nav#{TOC_CONTAINER_ID}");
    let marked = rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![element!(selector, |el| {
                el.before(TOC_START, ContentType::Html);
                el.after(TOC_END, ContentType::Html);
                el.remove_and_keep_content();
                Ok(())
            })],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|e| Md2PdfError::stage(Stage::Compose, e))?;

    let mut toc = None;
    let mut content = String::with_capacity(marked.len());
    let mut rest = marked.as_str();

    while let Some(start) = rest.find(TOC_START) {
        content.push_str(&rest[..start]);
        let after = &rest[start + TOC_START.len()..];
        let Some(end) = after.find(TOC_END) else {
            rest = after;
            break;
        };
        if toc.is_none() {
            toc = Some(after[..end].to_string());
        }
        let tail = &after[end + TOC_END.len()..];
        rest = tail.strip_prefix('\n').unwrap_or(tail);
    }
    content.push_str(rest);

    Ok(SplitBody { toc, content })
}

/// Accept Mustache-style `{{{name}}}` and `{{& name}}` as plain `{{ name }}`.
fn normalize_placeholders(template: &str) -> String {
    template
        .replace("{{{", "{{")
        .replace("}}}", "}}")
        .replace("{{&", "{{")
}
