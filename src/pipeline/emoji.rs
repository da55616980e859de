//! `:shortcode:` and emoticon expansion to twemoji images.
//!
//! Shortcodes (`:smile:`) may appear anywhere in a text run. Emoticon
//! shortcuts (`:)`, `<3`, `8-)`, …) only count when the characters on both
//! sides are whitespace, punctuation or the edge of the run, so `http://`
//! never turns into `:/`.

use once_cell::sync::Lazy;
use regex::Regex;

static RE_SHORTCODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^:([A-Za-z0-9_+\-]+):").unwrap());

const ZWJ: char = '\u{200D}';
const VS16: char = '\u{FE0F}';

/// Emoticon shortcuts, keyed by the shortcode they stand for.
const SHORTCUTS: &[(&str, &[&str])] = &[
    ("angry", &[">:(", ">:-("]),
    ("blush", &[":\")", ":-\")"]),
    ("broken_heart", &["</3", "<\\3"]),
    ("confused", &[":/", ":-/"]),
    ("cry", &[":'(", ":'-(", ":,(", ":,-("]),
    ("frowning", &[":(", ":-("]),
    ("heart", &["<3"]),
    ("imp", &["]:(", "]:-("]),
    ("innocent", &["o:)", "O:)", "o:-)", "O:-)", "0:)", "0:-)"]),
    ("joy", &[":')", ":'-)", ":,)", ":,-)", ":'D", ":'-D", ":,D", ":,-D"]),
    ("kissing", &[":*", ":-*"]),
    ("laughing", &["x-)", "X-)"]),
    ("neutral_face", &[":|", ":-|"]),
    ("open_mouth", &[":o", ":-o", ":O", ":-O"]),
    ("rage", &[":@", ":-@"]),
    ("smile", &[":D", ":-D"]),
    ("smiley", &[":)", ":-)"]),
    ("smiling_imp", &["]:)", "]:-)"]),
    ("sob", &[":,'(", ":,'-(", ";(", ";-("]),
    ("stuck_out_tongue", &[":P", ":-P"]),
    ("sunglasses", &["8-)", "B-)"]),
    ("sweat", &[",:(", ",:-("]),
    ("sweat_smile", &[",:)", ",:-)"]),
    ("unamused", &[":s", ":-S", ":z", ":-Z", ":$", ":-$"]),
    ("wink", &[";)", ";-)"]),
];

/// Every shortcut with its emoji, longest first so `:-)` wins over `:-`.
static SHORTCUT_TABLE: Lazy<Vec<(&'static str, &'static emojis::Emoji)>> = Lazy::new(|| {
    let mut table: Vec<_> = SHORTCUTS
        .iter()
        .filter_map(|(name, cuts)| emojis::get_by_shortcode(name).map(|e| (*cuts, e)))
        .flat_map(|(cuts, emoji)| cuts.iter().map(move |cut| (*cut, emoji)))
        .collect();
    table.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
    table
});

/// A run of text after shortcode expansion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'t> {
    /// Literal text, still to be escaped by the HTML writer.
    Text(&'t str),
    /// A ready `<img class="emoji">` tag.
    Image(String),
}

/// Split `text` on known shortcodes and emoticons.
///
/// Returns `None` when nothing matched, so callers can keep the original
/// event untouched. Unknown shortcodes stay in the surrounding text, and
/// scanning resumes at their closing colon (`x:foo:smile:` still finds
/// `:smile:`).
pub fn expand<'t>(text: &'t str, base_url: &str) -> Option<Vec<Segment<'t>>> {
    let mut segments = Vec::new();
    let mut last = 0;
    let mut pos = 0;

    while let Some(c) = text[pos..].chars().next() {
        match match_at(text, pos) {
            Some((len, emoji)) => {
                if pos > last {
                    segments.push(Segment::Text(&text[last..pos]));
                }
                segments.push(Segment::Image(twemoji_img(emoji.as_str(), base_url)));
                pos += len;
                last = pos;
            }
            None => pos += c.len_utf8(),
        }
    }

    if segments.is_empty() {
        return None;
    }
    if last < text.len() {
        segments.push(Segment::Text(&text[last..]));
    }
    Some(segments)
}

/// Byte length and emoji of a match starting exactly at `pos`.
fn match_at(text: &str, pos: usize) -> Option<(usize, &'static emojis::Emoji)> {
    let rest = &text[pos..];

    if rest.starts_with(':') {
        let found = RE_SHORTCODE.captures(rest).and_then(|caps| {
            let len = caps.get(0)?.end();
            emojis::get_by_shortcode(caps.get(1)?.as_str()).map(|e| (len, e))
        });
        if found.is_some() {
            return found;
        }
    }

    if !text[..pos].chars().next_back().map_or(true, is_boundary) {
        return None;
    }
    SHORTCUT_TABLE.iter().find_map(|&(cut, emoji)| {
        let after = rest.strip_prefix(cut)?;
        after
            .chars()
            .next()
            .map_or(true, is_boundary)
            .then_some((cut.len(), emoji))
    })
}

fn is_boundary(c: char) -> bool {
    c.is_whitespace() || c.is_ascii_punctuation() || c.is_control()
}

/// `<img>` tag for one emoji, in twemoji's markup.
pub fn twemoji_img(emoji: &str, base_url: &str) -> String {
    format!(
        "<img class=\"emoji\" draggable=\"false\" alt=\"{emoji}\" src=\"{base_url}{}.png\" />",
        codepoints(emoji)
    )
}

/// twemoji file name: lower-case hex code points joined by `-`.
///
/// The emoji presentation selector is dropped unless the sequence contains a
/// zero-width joiner, matching twemoji's asset naming.
pub fn codepoints(emoji: &str) -> String {
    let keep_vs16 = emoji.contains(ZWJ);
    emoji
        .chars()
        .filter(|&c| keep_vs16 || c != VS16)
        .map(|c| format!("{:x}", c as u32))
        .collect::<Vec<_>>()
        .join("-")
}
