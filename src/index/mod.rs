//! In-memory reference index and the loop that keeps it current.

pub mod collect;
mod indexer;
mod memstore;

pub use collect::{build_zettel_index, normalize_words, ContentScanner, MarkupScanner};
pub use indexer::{Indexer, IndexerStats};
pub use memstore::{MemStore, MemStoreStats};

use crate::id::{Zid, ZidSet};
use std::collections::{BTreeMap, BTreeSet};

/// Everything the indexer learned about one zettel, ready to be diffed
/// against the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ZettelIndex {
    pub zid: Zid,
    /// Referenced identifiers that do not resolve.
    pub dead: ZidSet,
    pub forward: ZidSet,
    /// Typed metadata references, keyed by the inverse key under which the
    /// target reports them.
    pub meta: BTreeMap<String, ZidSet>,
    pub words: BTreeSet<String>,
    pub urls: BTreeSet<String>,
    pub itags: BTreeSet<String>,
}

impl ZettelIndex {
    pub fn new(zid: Zid) -> Self {
        Self {
            zid,
            ..Self::default()
        }
    }

    pub fn add_dead_ref(&mut self, zid: Zid) {
        self.dead.insert(zid);
    }

    pub fn add_forward_ref(&mut self, zid: Zid) {
        self.forward.insert(zid);
    }

    pub fn add_meta_ref(&mut self, key: &str, zid: Zid) {
        self.meta.entry(key.to_string()).or_default().insert(zid);
    }

    pub fn add_word(&mut self, word: impl Into<String>) {
        self.words.insert(word.into());
    }

    pub fn add_url(&mut self, url: impl Into<String>) {
        self.urls.insert(url.into());
    }

    pub fn add_itag(&mut self, tag: impl Into<String>) {
        self.itags.insert(tag.into());
    }

    /// Inline tags as stored in the index: sorted and space separated.
    pub fn itags_value(&self) -> String {
        self.itags.iter().cloned().collect::<Vec<_>>().join(" ")
    }
}
