//! Heading slugs: URL-safe, unique-per-document anchor identifiers.
//!
//! A [`SlugRegistry`] is created at the start of every render and dropped at
//! the end, so two documents converted by the same process never influence
//! each other's anchors.

use once_cell::sync::Lazy;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use regex::Regex;
use std::collections::{HashMap, HashSet};

/// Characters removed before slugging.
static RE_PUNCTUATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r##"[\]\[!"#$%&'()*+,./:;<=>?@\\^_{|}~`]"##).unwrap());

static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// `encodeURIComponent` leaves these unescaped.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Normalise heading text into a base slug (no uniqueness applied).
///
/// `"Hello, World!"` → `"hello-world"`; non-ASCII letters are kept and
/// percent-encoded (`"Café"` → `"caf%C3%A9"`).
pub fn normalize(text: &str) -> String {
    let lowered = text.trim().to_lowercase();
    let stripped = RE_PUNCTUATION.replace_all(&lowered, "");
    let hyphenated = RE_WHITESPACE.replace_all(&stripped, "-");
    let trimmed = hyphenated.trim_matches('-');
    utf8_percent_encode(trimmed, URI_COMPONENT).to_string()
}

/// Assigns unique slugs within one document.
///
/// The first occurrence of a base slug is returned as-is; repeats get `-1`,
/// `-2`, … in first-seen order.
#[derive(Debug, Default)]
pub struct SlugRegistry {
    collisions: HashMap<String, usize>,
    issued: HashSet<String>,
}

impl SlugRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slugify `text` and make the result unique in this registry.
    pub fn slugify(&mut self, text: &str) -> String {
        let base = normalize(text);

        let slug = match self.collisions.get_mut(&base) {
            None => {
                self.collisions.insert(base.clone(), 0);
                base
            }
            Some(count) => loop {
                *count += 1;
                let candidate = format!("{base}-{count}");
                // A literal heading such as "Intro 1" may already own the suffix.
                if !self.issued.contains(&candidate) {
                    break candidate;
                }
            },
        };

        self.issued.insert(slug.clone());
        slug
    }

    /// Number of distinct slugs handed out so far.
    pub fn len(&self) -> usize {
        self.issued.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issued.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_punctuation_and_hyphenates() {
        assert_eq!(normalize("Hello, World!"), "hello-world");
        assert_eq!(normalize("  What's   new?  "), "whats-new");
        assert_eq!(normalize("snake_case & more"), "snakecase-more");
    }

    #[test]
    fn trims_edge_hyphens() {
        assert_eq!(normalize("- list-like -"), "list-like");
        assert_eq!(normalize("--"), "");
    }

    #[test]
    fn percent_encodes_non_ascii() {
        assert_eq!(normalize("Café"), "caf%C3%A9");
        assert_eq!(normalize("日本"), "%E6%97%A5%E6%9C%AC");
    }

    #[test]
    fn repeated_headings_get_increasing_suffixes() {
        let mut slugs = SlugRegistry::new();
        assert_eq!(slugs.slugify("Setup"), "setup");
        assert_eq!(slugs.slugify("Setup"), "setup-1");
        assert_eq!(slugs.slugify("setup"), "setup-2");
        assert_eq!(slugs.len(), 3);
    }

    #[test]
    fn empty_text_is_still_suffixed() {
        let mut slugs = SlugRegistry::new();
        assert_eq!(slugs.slugify(""), "");
        assert_eq!(slugs.slugify("   "), "-1");
    }

    #[test]
    fn suffix_skips_literal_collisions() {
        let mut slugs = SlugRegistry::new();
        assert_eq!(slugs.slugify("a"), "a");
        assert_eq!(slugs.slugify("a 1"), "a-1");
        assert_eq!(slugs.slugify("a"), "a-2");
    }

    #[test]
    fn registries_are_independent() {
        let mut first = SlugRegistry::new();
        let mut second = SlugRegistry::new();
        assert_eq!(first.slugify("Intro"), "intro");
        assert_eq!(second.slugify("Intro"), "intro");
    }
}
