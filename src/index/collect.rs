//! Turns a zettel into the [`ZettelIndex`] record stored by the index.

use super::ZettelIndex;
use crate::id::Zid;
use crate::meta::keys::{self, KeyType};
use crate::meta::{DEFAULT_SYNTAX, SYNTAX_NONE};
use crate::zettel::Zettel;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;
use url::Url;

static LINK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[\[(?:[^\]|]*\|)?\s*(\d{14})(?:#[^\]]*)?\s*\]\]").expect("valid link regex")
});
static EMBED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{(?:[^}|]*\|)?\s*(\d{14})(?:#[^}]*)?\s*\}\}").expect("valid embed regex")
});
static MD_LINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\]\((\d{14})(?:#[^)]*)?\)").expect("valid markdown link regex"));
static URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"https?://[^\s\]\)>"|]+"#).expect("valid url regex"));
static TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|\s)#([\p{L}\p{N}_-]+)").expect("valid tag regex"));

/// What a scanner found in a piece of text.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanResult {
    pub links: BTreeSet<Zid>,
    pub urls: BTreeSet<String>,
    pub words: BTreeSet<String>,
    /// Inline tags, lowercased and prefixed with `#`.
    pub tags: BTreeSet<String>,
}

/// Extracts references and words from text of a given syntax.
pub trait ContentScanner: Send + Sync {
    fn scan(&self, syntax: &str, text: &str, out: &mut ScanResult);
}

/// Recognizes zettelmarkup links and embeds, markdown links to zettel,
/// bare URLs and `#tags`.
#[derive(Debug, Default, Clone, Copy)]
pub struct MarkupScanner;

impl ContentScanner for MarkupScanner {
    fn scan(&self, _syntax: &str, text: &str, out: &mut ScanResult) {
        for re in [&*LINK_RE, &*EMBED_RE, &*MD_LINK_RE] {
            for caps in re.captures_iter(text) {
                if let Some(zid) = caps.get(1).and_then(|m| Zid::parse(m.as_str()).ok()) {
                    out.links.insert(zid);
                }
            }
        }
        for m in URL_RE.find_iter(text) {
            let candidate = m.as_str().trim_end_matches(['.', ',', ';', ':']);
            if Url::parse(candidate).is_ok() {
                out.urls.insert(candidate.to_string());
            }
        }
        for caps in TAG_RE.captures_iter(text) {
            if let Some(tag) = caps.get(1) {
                out.tags.insert(format!("#{}", tag.as_str().to_lowercase()));
            }
        }
        out.words.extend(normalize_words(text));
    }
}

/// Case-folded, NFKD-normalized words with combining marks removed.
pub fn normalize_words(text: &str) -> Vec<String> {
    let folded: String = text
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect();
    folded
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_string)
        .collect()
}

/// Builds the index record of `zettel`. `exists` decides whether a
/// referenced zid is live or dead.
pub fn build_zettel_index(
    zettel: &Zettel,
    scanner: &dyn ContentScanner,
    exists: &dyn Fn(Zid) -> bool,
) -> ZettelIndex {
    let mut zidx = ZettelIndex::new(zettel.zid());
    let mut found = ScanResult::default();

    for (key, value) in zettel.meta.user_pairs() {
        match keys::key_type(key) {
            KeyType::Id | KeyType::IdSet => {
                let inverse = keys::inverse_key(key);
                for target in zettel.meta.get_zids(key) {
                    add_meta_target(&mut zidx, inverse, target, exists);
                }
            }
            KeyType::Zettelmarkup => scanner.scan(DEFAULT_SYNTAX, value, &mut found),
            KeyType::Url => {
                if Url::parse(value).is_ok() {
                    zidx.add_url(value);
                }
            }
            KeyType::TagSet | KeyType::WordSet => {
                for element in keys::list_from_value(value) {
                    found.words.extend(normalize_words(element));
                }
            }
            _ => found.words.extend(normalize_words(value)),
        }
    }

    let syntax = zettel.meta.get_default(keys::KEY_SYNTAX, DEFAULT_SYNTAX);
    if syntax != SYNTAX_NONE && !zettel.content.is_binary() {
        scanner.scan(syntax, &zettel.content.as_text(), &mut found);
    }

    for link in found.links {
        if exists(link) {
            zidx.add_forward_ref(link);
        } else {
            zidx.add_dead_ref(link);
        }
    }
    zidx.urls.extend(found.urls);
    zidx.words.extend(found.words);
    zidx.itags.extend(found.tags);
    zidx
}

fn add_meta_target(
    zidx: &mut ZettelIndex,
    inverse: Option<&str>,
    zid: Zid,
    exists: &dyn Fn(Zid) -> bool,
) {
    if !exists(zid) {
        zidx.add_dead_ref(zid);
        return;
    }
    match inverse {
        Some(key) => zidx.add_meta_ref(key, zid),
        None => zidx.add_forward_ref(zid),
    }
}
