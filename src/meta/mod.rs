//! Zettel metadata: an ordered key/value map bound to one identifier.

mod header;
pub mod keys;

pub use header::{parse_header, write_header, write_zettel_file};
pub use keys::{describe, inverse_key, is_computed, key_type, KeyDescription, KeyType};

use crate::id::Zid;
use std::collections::btree_map;
use std::collections::BTreeMap;

pub const DEFAULT_SYNTAX: &str = "zmk";
pub const SYNTAX_NONE: &str = "none";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Meta {
    pub zid: Zid,
    pairs: BTreeMap<String, String>,
    /// Metadata was (or should be) embedded between `---` lines.
    pub yaml_sep: bool,
}

impl Meta {
    pub fn new(zid: Zid) -> Self {
        Self {
            zid,
            pairs: BTreeMap::new(),
            yaml_sep: false,
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        if key == keys::KEY_ID {
            return None;
        }
        self.pairs.get(key).map(String::as_str)
    }

    pub fn get_default<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.pairs.contains_key(key)
    }

    /// Sets a value; the `id` key and malformed keys are ignored because the
    /// identifier is owned by [`Meta::zid`].
    pub fn set(&mut self, key: &str, value: &str) {
        if key == keys::KEY_ID || !keys::is_valid_key(key) {
            return;
        }
        let value = value.split_whitespace().collect::<Vec<_>>().join(" ");
        self.pairs.insert(key.to_string(), value);
    }

    pub fn delete(&mut self, key: &str) -> Option<String> {
        self.pairs.remove(key)
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, String> {
        self.pairs.iter()
    }

    /// Pairs that are stored on disk: everything except computed keys.
    pub fn user_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs
            .iter()
            .filter(|(key, _)| !keys::is_computed(key))
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn get_list(&self, key: &str) -> Vec<&str> {
        self.get(key)
            .map(|value| keys::list_from_value(value).collect())
            .unwrap_or_default()
    }

    /// Parsed identifiers of an id-typed value; unparsable elements are skipped.
    pub fn get_zids(&self, key: &str) -> Vec<Zid> {
        self.get_list(key)
            .into_iter()
            .filter_map(|value| Zid::parse(value).ok())
            .collect()
    }
}
