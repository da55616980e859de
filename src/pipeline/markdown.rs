//! Markdown → HTML body.
//!
//! The document is parsed once into a flat `Vec<Event>` and then handed
//! through an ordered list of passes. Each pass consumes the vector and
//! returns a new one; the only shared state is the per-render
//! [`RenderContext`] (slug registry, collected headings, task-item counter).
//!
//! ```text
//! parse ──▶ highlight ──▶ emoji ──▶ task lists ──▶ footnotes ──▶ anchors ──▶ toc ──▶ HTML
//! ```
//!
//! Anchors must run before the TOC pass because the TOC links to the slugs
//! the anchor pass assigns.

use crate::config::ConversionConfig;
use crate::pipeline::emoji::{self, Segment};
use crate::pipeline::highlight::{self, Highlight};
use crate::pipeline::slug::SlugRegistry;
use crate::templates::{TOC_CONTAINER_ID, TOC_MARKER};
use once_cell::sync::Lazy;
use pulldown_cmark::{html, CodeBlockKind, Event, Options, Parser, Tag, TagEnd, TextMergeStream};
use regex::Regex;
use std::borrow::Cow;
use tracing::debug;

/// Paragraphs made only of one of these become the table of contents.
static RE_TOC_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(\$\{toc\}|\[\[?_?toc_?\]?\])$").unwrap());

/// A heading seen by the anchor pass, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadingEntry {
    pub level: u8,
    pub slug: String,
    pub text: String,
}

/// State shared by the passes of one render call.
#[derive(Debug)]
pub struct RenderContext {
    slugs: SlugRegistry,
    headings: Vec<HeadingEntry>,
    task_items: usize,
    emoji_base_url: String,
}

impl RenderContext {
    fn new(emoji_base_url: &str) -> Self {
        Self {
            slugs: SlugRegistry::new(),
            headings: Vec::new(),
            task_items: 0,
            emoji_base_url: emoji_base_url.to_string(),
        }
    }
}

type Pass = for<'e> fn(Vec<Event<'e>>, &mut RenderContext) -> Vec<Event<'e>>;

/// Pass order matters; see the module docs.
const PASSES: &[(&str, Pass)] = &[
    ("highlight", highlight_code),
    ("emoji", expand_emoji),
    ("task-lists", task_lists),
    ("footnotes", collect_footnotes),
    ("anchors", heading_anchors),
    ("toc", table_of_contents),
];

/// Render Markdown to an HTML fragment.
///
/// When `config.table_of_contents` is set a TOC marker is prepended, so the
/// output starts with `<nav id="table-of-contents">`. Raw HTML passes
/// through; soft breaks are not turned into `<br />`.
pub fn render(markdown: &str, config: &ConversionConfig) -> String {
    let source: Cow<'_, str> = if config.table_of_contents {
        Cow::Owned(format!("{TOC_MARKER}\n\n{markdown}"))
    } else {
        Cow::Borrowed(markdown)
    };

    let parser = Parser::new_ext(&source, parser_options());
    let mut events: Vec<Event<'_>> = TextMergeStream::new(parser).collect();
    let mut cx = RenderContext::new(&config.emoji_base_url);

    for (name, pass) in PASSES {
        events = pass(events, &mut cx);
        debug!("Markdown pass '{}' done ({} events)", name, events.len());
    }

    let mut out = String::with_capacity(source.len() * 3 / 2);
    html::push_html(&mut out, events.into_iter());
    debug!(
        "Rendered {} bytes of Markdown into {} bytes of HTML ({} headings)",
        markdown.len(),
        out.len(),
        cx.headings.len()
    );
    out
}

fn parser_options() -> Options {
    Options::ENABLE_TABLES
        | Options::ENABLE_FOOTNOTES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
}

// ── Passes ───────────────────────────────────────────────────────────────

/// Replace fenced blocks in a known language with highlighted markup.
fn highlight_code<'e>(events: Vec<Event<'e>>, _cx: &mut RenderContext) -> Vec<Event<'e>> {
    let mut out = Vec::with_capacity(events.len());
    let mut iter = events.into_iter();

    while let Some(event) = iter.next() {
        let lang = match &event {
            Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(info))) => {
                info.split_whitespace().next().unwrap_or("").to_string()
            }
            _ => {
                out.push(event);
                continue;
            }
        };

        let mut block = vec![event];
        let mut code = String::new();
        for inner in iter.by_ref() {
            let end = matches!(inner, Event::End(TagEnd::CodeBlock));
            if let Event::Text(text) = &inner {
                code.push_str(text);
            }
            block.push(inner);
            if end {
                break;
            }
        }

        match highlight::highlight(&code, &lang) {
            Highlight::Markup(markup) => out.push(Event::Html(
                format!(
                    "<pre><code class=\"language-{}\">{}</code></pre>\n",
                    escape_html(&lang),
                    markup
                )
                .into(),
            )),
            Highlight::Plain => out.extend(block),
        }
    }
    out
}

/// Expand `:shortcode:` in prose. Code spans are separate events and code
/// blocks are skipped, so code stays literal.
fn expand_emoji<'e>(events: Vec<Event<'e>>, cx: &mut RenderContext) -> Vec<Event<'e>> {
    let mut out = Vec::with_capacity(events.len());
    let mut in_code_block = false;

    for event in events {
        match event {
            Event::Start(Tag::CodeBlock(_)) => {
                in_code_block = true;
                out.push(event);
            }
            Event::End(TagEnd::CodeBlock) => {
                in_code_block = false;
                out.push(event);
            }
            Event::Text(text) if !in_code_block => {
                let expanded = emoji::expand(&text, &cx.emoji_base_url).map(|segments| {
                    segments
                        .into_iter()
                        .map(|segment| match segment {
                            Segment::Text(t) => Event::Text(t.to_string().into()),
                            Segment::Image(img) => Event::InlineHtml(img.into()),
                        })
                        .collect::<Vec<_>>()
                });
                match expanded {
                    Some(replacement) => out.extend(replacement),
                    None => out.push(Event::Text(text)),
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Turn `[ ]`/`[x]` items into labelled, disabled checkboxes.
fn task_lists<'e>(events: Vec<Event<'e>>, cx: &mut RenderContext) -> Vec<Event<'e>> {
    // The marker follows the item start directly (tight list) or its first
    // paragraph start (loose list).
    let is_task: Vec<bool> = (0..events.len())
        .map(|i| {
            matches!(events[i], Event::Start(Tag::Item))
                && match events.get(i + 1) {
                    Some(Event::TaskListMarker(_)) => true,
                    Some(Event::Start(Tag::Paragraph)) => {
                        matches!(events.get(i + 2), Some(Event::TaskListMarker(_)))
                    }
                    _ => false,
                }
        })
        .collect();

    let mut out = Vec::with_capacity(events.len());
    // One flag per open list item: is its label still open?
    let mut label_open: Vec<bool> = Vec::new();

    for (i, event) in events.into_iter().enumerate() {
        match event {
            Event::Start(Tag::Item) => {
                label_open.push(false);
                if is_task[i] {
                    out.push(Event::Html("<li class=\"task-list-item\">".into()));
                } else {
                    out.push(event);
                }
            }
            Event::TaskListMarker(checked) => {
                cx.task_items += 1;
                let n = cx.task_items;
                let checked = if checked { " checked=\"\"" } else { "" };
                out.push(Event::InlineHtml(
                    format!(
                        "<input class=\"task-list-item-checkbox\"{checked} disabled=\"\" type=\"checkbox\" id=\"task-item-{n}\" />\
                         <label class=\"task-list-item-label\" for=\"task-item-{n}\">"
                    )
                    .into(),
                ));
                if let Some(open) = label_open.last_mut() {
                    *open = true;
                }
            }
            Event::End(TagEnd::Item) => {
                close_label(&mut label_open, &mut out);
                label_open.pop();
                out.push(event);
            }
            Event::End(TagEnd::Paragraph)
            | Event::Start(Tag::List(_))
            | Event::Start(Tag::CodeBlock(_))
            | Event::Start(Tag::BlockQuote(_))
            | Event::Start(Tag::Table(_))
            | Event::Start(Tag::HtmlBlock) => {
                close_label(&mut label_open, &mut out);
                out.push(event);
            }
            other => out.push(other),
        }
    }
    out
}

fn close_label(label_open: &mut [bool], out: &mut Vec<Event<'_>>) {
    if let Some(open) = label_open.last_mut() {
        if *open {
            out.push(Event::InlineHtml("</label>".into()));
            *open = false;
        }
    }
}

/// Move footnote definitions to a trailing `<section class="footnotes">`
/// behind a `footnotes-sep` rule.
fn collect_footnotes<'e>(events: Vec<Event<'e>>, _cx: &mut RenderContext) -> Vec<Event<'e>> {
    let mut body = Vec::with_capacity(events.len());
    let mut definitions = Vec::new();
    let mut in_definition = false;

    for event in events {
        match event {
            Event::Start(Tag::FootnoteDefinition(_)) => {
                in_definition = true;
                definitions.push(event);
            }
            Event::End(TagEnd::FootnoteDefinition) => {
                in_definition = false;
                definitions.push(event);
            }
            other if in_definition => definitions.push(other),
            other => body.push(other),
        }
    }

    if !definitions.is_empty() {
        body.push(Event::Html(
            "<hr class=\"footnotes-sep\" />\n<section class=\"footnotes\">\n".into(),
        ));
        body.extend(definitions);
        body.push(Event::Html("</section>\n".into()));
    }
    body
}

/// Give every heading a unique `id` and a hidden permalink.
fn heading_anchors<'e>(events: Vec<Event<'e>>, cx: &mut RenderContext) -> Vec<Event<'e>> {
    let mut out = Vec::with_capacity(events.len());
    let mut iter = events.into_iter();

    while let Some(event) = iter.next() {
        let (level, classes, attrs) = match event {
            Event::Start(Tag::Heading {
                level,
                classes,
                attrs,
                ..
            }) => (level, classes, attrs),
            other => {
                out.push(other);
                continue;
            }
        };

        let mut inner = Vec::new();
        let mut text = String::new();
        for e in iter.by_ref() {
            let end = matches!(e, Event::End(TagEnd::Heading(_)));
            if let Event::Text(t) | Event::Code(t) = &e {
                text.push_str(t);
            }
            inner.push(e);
            if end {
                break;
            }
        }

        let slug = cx.slugs.slugify(&text);
        out.push(Event::Start(Tag::Heading {
            level,
            id: Some(slug.clone().into()),
            classes,
            attrs,
        }));
        out.push(Event::InlineHtml(
            format!(
                "<a class=\"anchor\" aria-hidden=\"true\" href=\"#{slug}\">\
                 <span class=\"octicon octicon-link\"></span></a> "
            )
            .into(),
        ));
        out.extend(inner);

        cx.headings.push(HeadingEntry {
            level: level as u8,
            slug,
            text: text.trim().to_string(),
        });
    }
    out
}

/// Replace marker paragraphs with the heading tree.
fn table_of_contents<'e>(events: Vec<Event<'e>>, cx: &mut RenderContext) -> Vec<Event<'e>> {
    let mut out = Vec::with_capacity(events.len());
    let mut iter = events.into_iter();
    let mut nav: Option<String> = None;

    while let Some(event) = iter.next() {
        if !matches!(event, Event::Start(Tag::Paragraph)) {
            out.push(event);
            continue;
        }

        let mut paragraph = vec![event];
        for e in iter.by_ref() {
            let end = matches!(e, Event::End(TagEnd::Paragraph));
            paragraph.push(e);
            if end {
                break;
            }
        }

        let inner = &paragraph[1..paragraph.len().saturating_sub(1).max(1)];
        if is_toc_marker(inner) {
            let html = nav.get_or_insert_with(|| toc_html(&cx.headings));
            out.push(Event::Html(html.clone().into()));
        } else {
            out.extend(paragraph);
        }
    }
    out
}

fn is_toc_marker(inner: &[Event<'_>]) -> bool {
    let mut text = String::new();
    for event in inner {
        match event {
            Event::Text(t) => text.push_str(t),
            // `[[_toc_]]` parses as emphasis around "toc".
            Event::Start(Tag::Emphasis) | Event::End(TagEnd::Emphasis) => text.push('_'),
            _ => return false,
        }
    }
    RE_TOC_MARKER.is_match(text.trim())
}

/// `<nav id="table-of-contents">` holding a nested `<ul>` of heading links.
pub fn toc_html(headings: &[HeadingEntry]) -> String {
    let mut html = format!("<nav id=\"{TOC_CONTAINER_ID}\">");
    if let Some(first) = headings.first() {
        let mut levels = vec![first.level];
        html.push_str("<ul>");
        for (i, heading) in headings.iter().enumerate() {
            let link = format!(
                "<a href=\"#{}\">{}</a>",
                heading.slug,
                escape_html(&heading.text)
            );
            if i == 0 {
                html.push_str("<li>");
                html.push_str(&link);
                continue;
            }
            while levels.len() > 1 && levels.last().is_some_and(|&top| heading.level < top) {
                html.push_str("</li></ul>");
                levels.pop();
            }
            if levels.last().is_some_and(|&top| heading.level > top) {
                html.push_str("<ul><li>");
                levels.push(heading.level);
            } else {
                html.push_str("</li><li>");
            }
            html.push_str(&link);
        }
        html.push_str("</li>");
        for _ in 1..levels.len() {
            html.push_str("</ul></li>");
        }
        html.push_str("</ul>");
    }
    html.push_str("</nav>\n");
    html
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
