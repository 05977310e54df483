//! The in-memory reference index.
//!
//! Every mutation runs under one write-lock acquisition, so readers always
//! see the forward and backward views in agreement.

use super::ZettelIndex;
use crate::id::{parse_uint, Zid, ZidSet, ZidSlice, ZID_LENGTH};
use crate::meta::keys::{self, KeyType};
use crate::meta::Meta;
use crate::storage::Enricher;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct MetaRefs {
    forward: ZidSlice,
    backward: ZidSlice,
}

impl MetaRefs {
    fn is_empty(&self) -> bool {
        self.forward.is_empty() && self.backward.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Entry {
    dead: ZidSlice,
    forward: ZidSlice,
    backward: ZidSlice,
    meta: BTreeMap<String, MetaRefs>,
    words: Vec<String>,
    urls: Vec<String>,
    itags: String,
}

impl Entry {
    fn is_empty(&self) -> bool {
        self.dead.is_empty()
            && self.forward.is_empty()
            && self.backward.is_empty()
            && self.meta.is_empty()
            && self.words.is_empty()
            && self.urls.is_empty()
            && self.itags.is_empty()
    }
}

type Inverted = BTreeMap<String, ZidSlice>;

#[derive(Debug, Default)]
struct Tables {
    entries: BTreeMap<Zid, Entry>,
    dead: BTreeMap<Zid, ZidSlice>,
    words: Inverted,
    urls: Inverted,
}

impl Tables {
    fn entry_mut(&mut self, zid: Zid) -> &mut Entry {
        self.entries.entry(zid).or_default()
    }

    fn reap(&mut self, zid: Zid) {
        if self.entries.get(&zid).is_some_and(Entry::is_empty) {
            self.entries.remove(&zid);
        }
    }

    fn remove_dead_source(&mut self, target: Zid, source: Zid) {
        if let Some(sources) = self.dead.get_mut(&target) {
            sources.remove(source);
            if sources.is_empty() {
                self.dead.remove(&target);
            }
        }
    }

    fn remove_backward(&mut self, target: Zid, source: Zid) {
        if let Some(entry) = self.entries.get_mut(&target) {
            entry.backward.remove(source);
        }
    }

    fn remove_meta_backward(&mut self, target: Zid, key: &str, source: Zid) {
        if let Some(entry) = self.entries.get_mut(&target) {
            if let Some(refs) = entry.meta.get_mut(key) {
                refs.backward.remove(source);
                if refs.is_empty() {
                    entry.meta.remove(key);
                }
            }
        }
    }

    fn remove_meta_forward(&mut self, target: Zid, key: &str, source: Zid) {
        if let Some(entry) = self.entries.get_mut(&target) {
            if let Some(refs) = entry.meta.get_mut(key) {
                refs.forward.remove(source);
                if refs.is_empty() {
                    entry.meta.remove(key);
                }
            }
        }
    }

    /// Adds `zid` to the rows of an inverted table for every element of the
    /// second argument missing from the third. Empty rows are dropped.
    fn update_inverted(table: &mut Inverted, zid: Zid, new: &[String], old: &[String]) {
        for word in new.iter().filter(|word| old.binary_search(word).is_err()) {
            table.entry(word.clone()).or_default().insert(zid);
        }
        for word in old.iter().filter(|word| new.binary_search(word).is_err()) {
            if let Some(row) = table.get_mut(word) {
                row.remove(zid);
                if row.is_empty() {
                    table.remove(word);
                }
            }
        }
    }

    /// Adds an indexed `zid` and everything pointing at it.
    fn add_backward_closure(&self, zid: Zid, result: &mut ZidSet) {
        if let Some(entry) = self.entries.get(&zid) {
            result.insert(zid);
            result.extend_slice(&entry.backward);
            for refs in entry.meta.values() {
                result.extend_slice(&refs.backward);
            }
        }
    }

    fn search<F>(&self, predicate: F, result: &mut ZidSet)
    where
        F: Fn(&str) -> bool,
    {
        for (word, zids) in self.words.iter().chain(self.urls.iter()) {
            if predicate(word) {
                result.extend_slice(zids);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemStoreStats {
    pub zettel: usize,
    pub dead_targets: usize,
    pub words: usize,
    pub urls: usize,
    /// Enrichments that added at least one key.
    pub updates: u64,
    /// Distinct zids that were ever enriched.
    pub enriched: usize,
}

#[derive(Debug, Default)]
pub struct MemStore {
    tables: RwLock<Tables>,
    updates: AtomicU64,
    enriched: Mutex<ZidSet>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a fresh index record and returns the zettel that must be
    /// indexed again because their dead references to it now resolve. Their
    /// dead-inverse rows shrink once they are re-indexed.
    pub fn update_references(&self, zidx: &ZettelIndex) -> ZidSet {
        let zid = zidx.zid;
        let mut tables = self.tables.write();
        let mut to_check: ZidSet = tables
            .dead
            .get(&zid)
            .map(|sources| sources.iter().copied().collect())
            .unwrap_or_default();
        to_check.remove(zid);
        let old = tables.entries.get(&zid).cloned().unwrap_or_default();
        let mut touched = vec![zid];

        let new_dead = zidx.dead.sorted();
        let (added, removed) = new_dead.diff(&old.dead);
        for target in &added {
            tables.dead.entry(*target).or_default().insert(zid);
        }
        for target in &removed {
            tables.remove_dead_source(*target, zid);
        }
        tables.entry_mut(zid).dead = new_dead;

        let new_forward = zidx.forward.sorted();
        let (added, removed) = new_forward.diff(&old.forward);
        tables.entry_mut(zid).forward = new_forward;
        for target in &added {
            tables.entry_mut(*target).backward.insert(zid);
        }
        for target in &removed {
            tables.remove_backward(*target, zid);
            touched.push(*target);
        }

        for (key, refs) in old.meta.iter().filter(|(key, _)| !zidx.meta.contains_key(*key)) {
            for target in &refs.forward {
                tables.remove_meta_backward(*target, key, zid);
                touched.push(*target);
            }
            let entry = tables.entry_mut(zid);
            if let Some(own) = entry.meta.get_mut(key) {
                own.forward = ZidSlice::new();
                if own.is_empty() {
                    entry.meta.remove(key);
                }
            }
        }
        for (key, targets) in &zidx.meta {
            let new_refs = targets.sorted();
            let old_refs = old.meta.get(key).map(|refs| refs.forward.clone()).unwrap_or_default();
            let (added, removed) = new_refs.diff(&old_refs);
            for target in &added {
                tables
                    .entry_mut(*target)
                    .meta
                    .entry(key.clone())
                    .or_default()
                    .backward
                    .insert(zid);
            }
            for target in &removed {
                tables.remove_meta_backward(*target, key, zid);
                touched.push(*target);
            }
            let entry = tables.entry_mut(zid);
            let own = entry.meta.entry(key.clone()).or_default();
            own.forward = new_refs;
            if own.is_empty() {
                entry.meta.remove(key);
            }
        }

        let new_words: Vec<String> = zidx.words.iter().cloned().collect();
        Tables::update_inverted(&mut tables.words, zid, &new_words, &old.words);
        let new_urls: Vec<String> = zidx.urls.iter().cloned().collect();
        Tables::update_inverted(&mut tables.urls, zid, &new_urls, &old.urls);

        let entry = tables.entry_mut(zid);
        entry.words = new_words;
        entry.urls = new_urls;
        entry.itags = zidx.itags_value();

        for zid in touched {
            tables.reap(zid);
        }
        to_check
    }

    /// Forgets a zettel and returns those whose references to it are now
    /// dangling.
    pub fn delete_zettel(&self, zid: Zid) -> ZidSet {
        let mut tables = self.tables.write();
        let mut to_check = ZidSet::new();
        let Some(entry) = tables.entries.remove(&zid) else {
            return to_check;
        };
        let mut touched = Vec::new();

        for target in &entry.dead {
            tables.remove_dead_source(*target, zid);
        }
        for target in entry.forward.iter().filter(|target| **target != zid) {
            tables.remove_backward(*target, zid);
            touched.push(*target);
        }
        for source in entry.backward.iter().filter(|source| **source != zid) {
            if let Some(other) = tables.entries.get_mut(source) {
                other.forward.remove(zid);
            }
            to_check.insert(*source);
            touched.push(*source);
        }
        for (key, refs) in &entry.meta {
            for target in refs.forward.iter().filter(|target| **target != zid) {
                tables.remove_meta_backward(*target, key, zid);
                touched.push(*target);
            }
            for source in refs.backward.iter().filter(|source| **source != zid) {
                tables.remove_meta_forward(*source, key, zid);
                to_check.insert(*source);
                touched.push(*source);
            }
        }
        Tables::update_inverted(&mut tables.words, zid, &[], &entry.words);
        Tables::update_inverted(&mut tables.urls, zid, &[], &entry.urls);

        for zid in touched {
            tables.reap(zid);
        }
        to_check
    }

    /// Zids that currently own an index entry.
    pub fn indexed_zids(&self) -> ZidSet {
        self.tables.read().entries.keys().copied().collect()
    }

    pub fn search_equal(&self, term: &str) -> ZidSet {
        let tables = self.tables.read();
        let mut result = ZidSet::new();
        if let Some(zids) = tables.words.get(term) {
            result.extend_slice(zids);
        }
        if let Some(zids) = tables.urls.get(term) {
            result.extend_slice(zids);
        }
        if let Ok(zid) = Zid::parse(term) {
            tables.add_backward_closure(zid, &mut result);
        }
        result
    }

    pub fn search_prefix(&self, prefix: &str) -> ZidSet {
        let tables = self.tables.read();
        let mut result = ZidSet::new();
        tables.search(|word| word.starts_with(prefix), &mut result);

        let len = prefix.len();
        if len == 0 || len > ZID_LENGTH {
            return result;
        }
        let (Some(min), Some(max)) = (
            parse_uint(&format!("{prefix:0<width$}", width = ZID_LENGTH)),
            parse_uint(&format!("{prefix:9<width$}", width = ZID_LENGTH)),
        ) else {
            return result;
        };
        let range = Zid::from_u64(min.max(1))..=Zid::from_u64(max);
        let hits: Vec<Zid> = tables.entries.range(range).map(|(zid, _)| *zid).collect();
        for zid in hits {
            tables.add_backward_closure(zid, &mut result);
        }
        result
    }

    pub fn search_suffix(&self, suffix: &str) -> ZidSet {
        let tables = self.tables.read();
        let mut result = ZidSet::new();
        tables.search(|word| word.ends_with(suffix), &mut result);

        let Some(value) = parse_uint(suffix) else {
            return result;
        };
        let modulus = 10u64.pow(suffix.len() as u32);
        let hits: Vec<Zid> = tables
            .entries
            .keys()
            .filter(|zid| zid.as_u64() % modulus == value)
            .copied()
            .collect();
        for zid in hits {
            tables.add_backward_closure(zid, &mut result);
        }
        result
    }

    pub fn search_contains(&self, needle: &str) -> ZidSet {
        let tables = self.tables.read();
        let mut result = ZidSet::new();
        tables.search(|word| word.contains(needle), &mut result);

        if parse_uint(needle).is_none() {
            return result;
        }
        let hits: Vec<Zid> = tables
            .entries
            .keys()
            .filter(|zid| zid.to_string().contains(needle))
            .copied()
            .collect();
        for zid in hits {
            tables.add_backward_closure(zid, &mut result);
        }
        result
    }

    pub fn stats(&self) -> MemStoreStats {
        let tables = self.tables.read();
        MemStoreStats {
            zettel: tables.entries.len(),
            dead_targets: tables.dead.len(),
            words: tables.words.len(),
            urls: tables.urls.len(),
            updates: self.updates.load(Ordering::Relaxed),
            enriched: self.enriched.lock().len(),
        }
    }

    /// Textual dump of all tables, ordered by zid and word.
    pub fn dump(&self) -> String {
        let tables = self.tables.read();
        let mut out = String::new();
        for (zid, entry) in &tables.entries {
            let _ = writeln!(out, "=== {zid}");
            dump_slice(&mut out, "dead", &entry.dead);
            dump_slice(&mut out, "forward", &entry.forward);
            dump_slice(&mut out, "backward", &entry.backward);
            for (key, refs) in &entry.meta {
                dump_slice(&mut out, &format!("meta {key} forward"), &refs.forward);
                dump_slice(&mut out, &format!("meta {key} backward"), &refs.backward);
            }
            if !entry.words.is_empty() {
                let _ = writeln!(out, "* words: {}", entry.words.join(" "));
            }
            if !entry.urls.is_empty() {
                let _ = writeln!(out, "* urls: {}", entry.urls.join(" "));
            }
            if !entry.itags.is_empty() {
                let _ = writeln!(out, "* itags: {}", entry.itags);
            }
        }
        if !tables.dead.is_empty() {
            let _ = writeln!(out, "==== Dead references");
            for (zid, sources) in &tables.dead {
                let _ = writeln!(out, "{zid}: {sources}");
            }
        }
        for (title, table) in [("Words", &tables.words), ("URLs", &tables.urls)] {
            if table.is_empty() {
                continue;
            }
            let _ = writeln!(out, "==== {title}");
            for (word, zids) in table {
                let _ = writeln!(out, "{word}: {zids}");
            }
        }
        out
    }

    /// Lists every broken relationship between the tables. Empty when the
    /// index is consistent.
    pub fn check_consistency(&self) -> Vec<String> {
        let tables = self.tables.read();
        let mut problems = Vec::new();
        let backward_of = |zid: Zid| tables.entries.get(&zid).map(|entry| &entry.backward);

        for (zid, entry) in &tables.entries {
            if entry.is_empty() {
                problems.push(format!("{zid}: empty entry"));
            }
            for (name, slice) in [
                ("dead", &entry.dead),
                ("forward", &entry.forward),
                ("backward", &entry.backward),
            ] {
                if !slice.is_strictly_ascending() {
                    problems.push(format!("{zid}: {name} not ascending"));
                }
            }
            for target in &entry.forward {
                if !backward_of(*target).is_some_and(|back| back.contains(*zid)) {
                    problems.push(format!("{zid}: forward {target} lacks backward"));
                }
            }
            for source in &entry.backward {
                let forward = tables.entries.get(source).map(|entry| &entry.forward);
                if !forward.is_some_and(|forward| forward.contains(*zid)) {
                    problems.push(format!("{zid}: backward {source} lacks forward"));
                }
            }
            for target in &entry.dead {
                if !tables.dead.get(target).is_some_and(|sources| sources.contains(*zid)) {
                    problems.push(format!("{zid}: dead {target} lacks inverse"));
                }
            }
            for (key, refs) in &entry.meta {
                for target in &refs.forward {
                    let other = tables.entries.get(target).and_then(|entry| entry.meta.get(key));
                    if !other.is_some_and(|other| other.backward.contains(*zid)) {
                        problems.push(format!("{zid}: meta {key} {target} lacks backward"));
                    }
                }
                for source in &refs.backward {
                    let other = tables.entries.get(source).and_then(|entry| entry.meta.get(key));
                    if !other.is_some_and(|other| other.forward.contains(*zid)) {
                        problems.push(format!("{zid}: meta {key} {source} lacks forward"));
                    }
                }
            }
            for word in &entry.words {
                if !tables.words.get(word).is_some_and(|zids| zids.contains(*zid)) {
                    problems.push(format!("{zid}: word {word} not inverted"));
                }
            }
        }
        for (target, sources) in &tables.dead {
            for source in sources {
                let dead = tables.entries.get(source).map(|entry| &entry.dead);
                if !dead.is_some_and(|dead| dead.contains(*target)) {
                    problems.push(format!("dead {target}: source {source} lacks entry"));
                }
            }
        }
        for (word, zids) in &tables.words {
            for zid in zids {
                let has = tables.entries.get(zid).is_some_and(|entry| {
                    entry.words.binary_search(word).is_ok()
                });
                if !has {
                    problems.push(format!("word {word}: {zid} lacks entry"));
                }
            }
        }
        problems
    }

    fn enrich_meta(&self, meta: &mut Meta) -> bool {
        let tables = self.tables.read();
        let Some(entry) = tables.entries.get(&meta.zid) else {
            return false;
        };
        let mut updated = false;
        let mut back = without_meta_refs(meta, entry.backward.clone());

        if !entry.dead.is_empty() {
            meta.set(keys::KEY_DEAD, &entry.dead.to_string());
            updated = true;
        }
        if !entry.backward.is_empty() {
            meta.set(keys::KEY_BACKWARD, &entry.backward.to_string());
            updated = true;
        }
        if !entry.forward.is_empty() {
            meta.set(keys::KEY_FORWARD, &entry.forward.to_string());
            back = back.without(&entry.forward);
            updated = true;
        }
        for (key, refs) in &entry.meta {
            if !refs.backward.is_empty() {
                meta.set(key, &refs.backward.to_string());
                back = back.without(&refs.backward);
                updated = true;
            }
        }
        if !back.is_empty() {
            meta.set(keys::KEY_BACK, &back.to_string());
            updated = true;
        }

        let user_tags = meta.get(keys::KEY_TAGS).map(str::to_string);
        if !entry.itags.is_empty() {
            meta.set(keys::KEY_CONTENT_TAGS, &entry.itags);
            let all: BTreeSet<&str> = user_tags
                .as_deref()
                .into_iter()
                .flat_map(keys::list_from_value)
                .chain(keys::list_from_value(&entry.itags))
                .collect();
            meta.set(keys::KEY_ALL_TAGS, &all.into_iter().collect::<Vec<_>>().join(" "));
            updated = true;
        } else if let Some(tags) = user_tags {
            meta.set(keys::KEY_ALL_TAGS, &tags);
            updated = true;
        }
        updated
    }
}

impl Enricher for MemStore {
    fn enrich(&self, meta: &mut Meta) {
        if self.enrich_meta(meta) {
            self.updates.fetch_add(1, Ordering::Relaxed);
            self.enriched.lock().insert(meta.zid);
        }
    }
}

/// Drops from `back` every zid already named by an id-typed user key.
fn without_meta_refs(meta: &Meta, back: ZidSlice) -> ZidSlice {
    let named: ZidSlice = meta
        .user_pairs()
        .filter(|(key, _)| matches!(keys::key_type(key), KeyType::Id | KeyType::IdSet))
        .flat_map(|(key, _)| meta.get_zids(key))
        .collect();
    back.without(&named)
}

fn dump_slice(out: &mut String, name: &str, slice: &ZidSlice) {
    if !slice.is_empty() {
        let _ = writeln!(out, "* {name}: {slice}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::keys::*;

    fn z(n: u64) -> Zid {
        Zid::from_u64(n)
    }

    fn zidx(zid: u64, forward: &[u64], dead: &[u64], words: &[&str]) -> ZettelIndex {
        let mut zidx = ZettelIndex::new(z(zid));
        forward.iter().for_each(|n| zidx.add_forward_ref(z(*n)));
        dead.iter().for_each(|n| zidx.add_dead_ref(z(*n)));
        words.iter().for_each(|w| zidx.add_word(*w));
        zidx
    }

    fn ids(set: &ZidSet) -> Vec<u64> {
        set.iter().map(Zid::as_u64).collect()
    }

    fn assert_consistent(store: &MemStore) {
        let problems = store.check_consistency();
        assert!(problems.is_empty(), "inconsistent index: {problems:?}");
    }

    #[test]
    fn forward_and_backward_stay_in_sync() {
        let store = MemStore::new();
        store.update_references(&zidx(1, &[2, 3], &[], &["alpha"]));
        assert_consistent(&store);

        let mut meta = Meta::new(z(2));
        store.enrich(&mut meta);
        assert_eq!(meta.get(KEY_BACKWARD), Some("00000000000001"));
        assert_eq!(meta.get(KEY_BACK), Some("00000000000001"));

        store.update_references(&zidx(1, &[3], &[], &["alpha"]));
        assert_consistent(&store);
        let mut meta = Meta::new(z(2));
        store.enrich(&mut meta);
        assert_eq!(meta.get(KEY_BACKWARD), None);
        assert!(!store.indexed_zids().contains(z(2)));
    }

    #[test]
    fn dead_reference_resolves_when_target_appears() {
        let store = MemStore::new();
        assert!(store.update_references(&zidx(1, &[], &[2], &[])).is_empty());
        assert_consistent(&store);

        let mut meta = Meta::new(z(1));
        store.enrich(&mut meta);
        assert_eq!(meta.get(KEY_DEAD), Some("00000000000002"));

        let to_check = store.update_references(&zidx(2, &[], &[], &["beta"]));
        assert_eq!(ids(&to_check), vec![1]);

        store.update_references(&zidx(1, &[2], &[], &[]));
        assert_consistent(&store);
        let mut meta = Meta::new(z(1));
        store.enrich(&mut meta);
        assert_eq!(meta.get(KEY_DEAD), None);
        assert_eq!(meta.get(KEY_FORWARD), Some("00000000000002"));
        assert!(!store.dump().contains("Dead references"));
    }

    #[test]
    fn delete_reports_dangling_sources() {
        let store = MemStore::new();
        store.update_references(&zidx(1, &[2], &[], &["one"]));
        store.update_references(&zidx(3, &[2], &[], &[]));
        store.update_references(&zidx(2, &[4], &[], &["two"]));

        let to_check = store.delete_zettel(z(2));
        assert_eq!(ids(&to_check), vec![1, 3]);
        assert_consistent(&store);
        assert!(store.search_equal("two").is_empty());
        assert!(!store.indexed_zids().contains(z(4)));
        assert!(store.delete_zettel(z(2)).is_empty());
    }

    #[test]
    fn typed_meta_references_are_mirrored() {
        let store = MemStore::new();
        let mut source = ZettelIndex::new(z(10));
        source.add_meta_ref(KEY_FOLGE, z(20));
        store.update_references(&source);
        assert_consistent(&store);

        let mut target = Meta::new(z(20));
        store.enrich(&mut target);
        assert_eq!(target.get(KEY_FOLGE), Some("00000000000010"));
        assert_eq!(target.get(KEY_BACK), None);

        store.update_references(&ZettelIndex::new(z(10)));
        assert_consistent(&store);
        assert!(store.indexed_zids().is_empty());

        store.update_references(&source);
        let to_check = store.delete_zettel(z(20));
        assert_eq!(ids(&to_check), vec![10]);
        assert_consistent(&store);
    }

    #[test]
    fn back_excludes_refs_named_in_meta() {
        let store = MemStore::new();
        store.update_references(&zidx(1, &[2], &[], &[]));
        store.update_references(&zidx(3, &[2], &[], &[]));
        store.update_references(&zidx(2, &[3], &[], &[]));

        let mut meta = Meta::new(z(2));
        meta.set("source-zid", "00000000000001");
        store.enrich(&mut meta);
        assert_eq!(meta.get(KEY_BACKWARD), Some("00000000000001 00000000000003"));
        assert_eq!(meta.get(KEY_BACK), None);
    }

    #[test]
    fn enrich_is_idempotent_and_merges_tags() {
        let store = MemStore::new();
        let mut record = zidx(1, &[2], &[], &["w"]);
        record.add_itag("#inline");
        store.update_references(&record);

        let mut meta = Meta::new(z(1));
        meta.set(KEY_TAGS, "#user");
        store.enrich(&mut meta);
        let first = meta.clone();
        store.enrich(&mut meta);
        assert_eq!(meta, first);
        assert_eq!(meta.get(KEY_CONTENT_TAGS), Some("#inline"));
        assert_eq!(meta.get(KEY_ALL_TAGS), Some("#inline #user"));

        let mut untouched = Meta::new(z(99));
        store.enrich(&mut untouched);
        assert!(untouched.is_empty());

        let stats = store.stats();
        assert_eq!(stats.updates, 2);
        assert_eq!(stats.enriched, 1);
    }

    #[test]
    fn update_with_same_record_changes_nothing() {
        let store = MemStore::new();
        let record = zidx(1, &[2], &[5], &["alpha", "beta"]);
        store.update_references(&record);
        let before = store.dump();
        store.update_references(&record);
        assert_eq!(store.dump(), before);
        assert_consistent(&store);
    }

    #[test]
    fn searches_cover_words_urls_and_ids() {
        let store = MemStore::new();
        let mut record = zidx(20200101000001, &[20200101000002], &[], &["zettel", "kasten"]);
        record.add_url("https://example.org/zettel");
        store.update_references(&record);

        assert_eq!(ids(&store.search_equal("kasten")), vec![20200101000001]);
        assert_eq!(ids(&store.search_prefix("zet")), vec![20200101000001]);
        assert_eq!(ids(&store.search_suffix("sten")), vec![20200101000001]);
        assert_eq!(ids(&store.search_contains("example.org")), vec![20200101000001]);

        assert_eq!(
            ids(&store.search_equal("20200101000002")),
            vec![20200101000001, 20200101000002]
        );
        assert_eq!(
            ids(&store.search_prefix("2020010100000")),
            vec![20200101000001, 20200101000002]
        );
        assert_eq!(ids(&store.search_suffix("002")), vec![20200101000001, 20200101000002]);
        assert_eq!(ids(&store.search_contains("0101000001")), vec![20200101000001]);
        assert!(store.search_prefix("123456789012345").is_empty());
    }

    #[test]
    fn id_search_ignores_unindexed_zids() {
        let store = MemStore::new();
        assert!(store.search_equal("20991231235959").is_empty());

        store.update_references(&zidx(20200101000001, &[], &[], &["solo"]));
        assert!(store.search_equal("20991231235959").is_empty());
        assert_eq!(ids(&store.search_equal("20200101000001")), vec![20200101000001]);
    }

    #[test]
    fn delete_then_reindex_restores_store() {
        let store = MemStore::new();
        let first = zidx(1, &[2], &[], &["one", "shared"]);
        let mut second = zidx(2, &[3], &[9], &["two", "shared"]);
        second.add_meta_ref(KEY_FOLGE, z(1));
        second.add_url("https://example.org/two");
        second.add_itag("#draft");
        let third = zidx(3, &[1], &[], &["three"]);
        for record in [&first, &second, &third] {
            store.update_references(record);
        }
        assert_consistent(&store);
        let before = store.dump();

        let to_check = store.delete_zettel(z(2));
        assert_eq!(ids(&to_check), vec![1]);
        assert_consistent(&store);
        assert_ne!(store.dump(), before);

        assert!(store.update_references(&second).is_empty());
        store.update_references(&first);
        assert_eq!(store.dump(), before);
        assert_consistent(&store);

        store.delete_zettel(z(3));
        store.update_references(&third);
        store.update_references(&second);
        assert_eq!(store.dump(), before);
        assert_consistent(&store);
    }
}
