use super::{Zid, ZidSlice};
use std::collections::BTreeSet;

/// Unordered collection of identifiers with cheap sorted materialization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ZidSet(BTreeSet<Zid>);

impl ZidSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, zid: Zid) -> bool {
        self.0.contains(&zid)
    }

    pub fn insert(&mut self, zid: Zid) -> bool {
        self.0.insert(zid)
    }

    pub fn remove(&mut self, zid: Zid) -> bool {
        self.0.remove(&zid)
    }

    pub fn iter(&self) -> impl Iterator<Item = Zid> + '_ {
        self.0.iter().copied()
    }

    pub fn extend_slice(&mut self, refs: &ZidSlice) {
        self.0.extend(refs.iter().copied());
    }

    pub fn union_with(&mut self, other: &ZidSet) {
        self.0.extend(other.0.iter().copied());
    }

    /// Intersection where a missing receiver acts as the identity element:
    /// `None ∩ other = other`.
    pub fn intersect_or_set(this: Option<ZidSet>, other: &ZidSet) -> ZidSet {
        match this {
            None => other.clone(),
            Some(current) => ZidSet(current.0.intersection(&other.0).copied().collect()),
        }
    }

    pub fn sorted(&self) -> ZidSlice {
        self.0.iter().copied().collect()
    }
}

impl FromIterator<Zid> for ZidSet {
    fn from_iter<T: IntoIterator<Item = Zid>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for ZidSet {
    type Item = Zid;
    type IntoIter = std::collections::btree_set::IntoIter<Zid>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl Extend<Zid> for ZidSet {
    fn extend<T: IntoIterator<Item = Zid>>(&mut self, iter: T) {
        self.0.extend(iter);
    }
}
