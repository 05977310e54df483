use super::Zid;
use std::fmt;

/// Strictly ascending list of identifiers, used for the edge lists of the index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ZidSlice(Vec<Zid>);

impl ZidSlice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Zid> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Zid] {
        &self.0
    }

    pub fn contains(&self, zid: Zid) -> bool {
        self.0.binary_search(&zid).is_ok()
    }

    /// Returns `true` if the identifier was not present before.
    pub fn insert(&mut self, zid: Zid) -> bool {
        match self.0.binary_search(&zid) {
            Ok(_) => false,
            Err(pos) => {
                self.0.insert(pos, zid);
                true
            }
        }
    }

    pub fn remove(&mut self, zid: Zid) -> bool {
        match self.0.binary_search(&zid) {
            Ok(pos) => {
                self.0.remove(pos);
                true
            }
            Err(_) => false,
        }
    }

    /// Linear merge of two sorted slices: `(added, removed)` of `self` relative to `old`.
    pub fn diff(&self, old: &ZidSlice) -> (ZidSlice, ZidSlice) {
        let (mut added, mut removed) = (Vec::new(), Vec::new());
        let (new_ids, old_ids) = (&self.0, &old.0);
        let (mut i, mut j) = (0, 0);
        while i < new_ids.len() && j < old_ids.len() {
            match new_ids[i].cmp(&old_ids[j]) {
                std::cmp::Ordering::Less => {
                    added.push(new_ids[i]);
                    i += 1;
                }
                std::cmp::Ordering::Greater => {
                    removed.push(old_ids[j]);
                    j += 1;
                }
                std::cmp::Ordering::Equal => {
                    i += 1;
                    j += 1;
                }
            }
        }
        added.extend_from_slice(&new_ids[i..]);
        removed.extend_from_slice(&old_ids[j..]);
        (ZidSlice(added), ZidSlice(removed))
    }

    /// Copy of `self` without any identifier of `other`.
    pub fn without(&self, other: &ZidSlice) -> ZidSlice {
        if other.is_empty() {
            return self.clone();
        }
        ZidSlice(self.0.iter().copied().filter(|zid| !other.contains(*zid)).collect())
    }

    pub fn is_strictly_ascending(&self) -> bool {
        self.0.windows(2).all(|pair| pair[0] < pair[1])
    }
}

impl FromIterator<Zid> for ZidSlice {
    fn from_iter<T: IntoIterator<Item = Zid>>(iter: T) -> Self {
        let mut ids: Vec<Zid> = iter.into_iter().collect();
        ids.sort_unstable();
        ids.dedup();
        Self(ids)
    }
}

impl<'a> IntoIterator for &'a ZidSlice {
    type Item = &'a Zid;
    type IntoIter = std::slice::Iter<'a, Zid>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for ZidSlice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (pos, zid) in self.0.iter().enumerate() {
            if pos > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{zid}")?;
        }
        Ok(())
    }
}
