//! Multi-room queue between change notifications and the indexer.
//!
//! Pending work for one zid is coalesced into a single action. Reload rooms
//! hold the result of a full re-scan and are always processed before
//! ordinary rooms.

use crate::config::DEFAULT_MAX_ANTEROOM_LOAD;
use crate::id::{Zid, ZidSet};
use std::collections::{BTreeMap, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArAction {
    /// Everything must be re-scanned; carried by `Zid::INVALID`.
    Reload,
    Update,
    Delete,
}

#[derive(Debug, Default)]
struct Room {
    entries: BTreeMap<Zid, ArAction>,
    reload: bool,
}

impl Room {
    fn reload_with(entries: BTreeMap<Zid, ArAction>) -> Self {
        Self {
            entries,
            reload: true,
        }
    }
}

#[derive(Debug)]
pub struct Anteroom {
    rooms: VecDeque<Room>,
    max_load: usize,
}

impl Anteroom {
    /// A `max_load` of zero selects the default room size.
    pub fn new(max_load: usize) -> Self {
        let max_load = if max_load == 0 {
            DEFAULT_MAX_ANTEROOM_LOAD
        } else {
            max_load
        };
        Self {
            rooms: VecDeque::new(),
            max_load,
        }
    }

    pub fn max_load(&self) -> usize {
        self.max_load
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Pending actions over all rooms.
    pub fn len(&self) -> usize {
        self.rooms.iter().map(|room| room.entries.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.iter().all(|room| room.entries.is_empty())
    }

    pub fn enqueue(&mut self, zid: Zid, action: ArAction) {
        if !zid.is_valid() || action == ArAction::Reload {
            return;
        }
        for room in self.rooms.iter_mut().filter(|room| !room.reload) {
            if let Some(pending) = room.entries.get_mut(&zid) {
                *pending = action;
                return;
            }
        }
        if let Some(room) = self.rooms.back_mut() {
            if !room.reload && room.entries.len() < self.max_load {
                room.entries.insert(zid, action);
                return;
            }
        }
        let mut room = Room::default();
        room.entries.insert(zid, action);
        self.rooms.push_back(room);
    }

    /// Replaces any earlier reload with the outcome of a new scan: deletions
    /// first, then updates for every existing zid, then the ordinary rooms.
    pub fn reload(&mut self, deleted: &[Zid], existing: &ZidSet) {
        self.rooms.retain(|room| !room.reload);
        let updates: BTreeMap<Zid, ArAction> = existing
            .iter()
            .filter(|zid| zid.is_valid())
            .map(|zid| (zid, ArAction::Update))
            .collect();
        if !updates.is_empty() {
            self.rooms.push_front(Room::reload_with(updates));
        }
        let deletions: BTreeMap<Zid, ArAction> = deleted
            .iter()
            .filter(|zid| zid.is_valid())
            .map(|zid| (*zid, ArAction::Delete))
            .collect();
        if !deletions.is_empty() {
            self.rooms.push_front(Room::reload_with(deletions));
        }
    }

    /// Drops all pending work and schedules a full re-scan.
    pub fn reset(&mut self) {
        self.rooms.clear();
        let mut sentinel = BTreeMap::new();
        sentinel.insert(Zid::INVALID, ArAction::Reload);
        self.rooms.push_back(Room::reload_with(sentinel));
    }

    pub fn dequeue(&mut self) -> Option<(ArAction, Zid)> {
        while let Some(room) = self.rooms.front_mut() {
            let next = room.entries.pop_first();
            if room.entries.is_empty() {
                self.rooms.pop_front();
            }
            if let Some((zid, action)) = next {
                return Some((action, zid));
            }
        }
        None
    }
}

impl Default for Anteroom {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ANTEROOM_LOAD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn z(n: u64) -> Zid {
        Zid::from_u64(n)
    }

    fn drain(anteroom: &mut Anteroom) -> Vec<(ArAction, Zid)> {
        std::iter::from_fn(|| anteroom.dequeue()).collect()
    }

    #[test]
    fn rooms_fill_up_to_max_load() {
        let mut anteroom = Anteroom::new(2);
        anteroom.enqueue(z(1), ArAction::Update);
        anteroom.enqueue(z(2), ArAction::Update);
        assert_eq!(anteroom.room_count(), 1);
        assert_eq!(anteroom.len(), 2);
        anteroom.enqueue(z(3), ArAction::Update);
        assert_eq!(anteroom.room_count(), 2);

        let drained = drain(&mut anteroom);
        assert_eq!(drained.len(), 3);
        assert_eq!(anteroom.dequeue(), None);
        assert_eq!(anteroom.room_count(), 0);
    }

    #[test]
    fn zero_max_load_uses_default() {
        assert_eq!(Anteroom::new(0).max_load(), 100);
    }

    #[test]
    fn coalesces_per_zid() {
        let mut anteroom = Anteroom::new(10);
        anteroom.enqueue(z(1), ArAction::Update);
        anteroom.enqueue(z(1), ArAction::Delete);
        anteroom.enqueue(z(1), ArAction::Delete);
        anteroom.enqueue(Zid::INVALID, ArAction::Update);
        anteroom.enqueue(z(2), ArAction::Reload);
        assert_eq!(anteroom.len(), 1);
        assert_eq!(anteroom.dequeue(), Some((ArAction::Delete, z(1))));
        assert!(anteroom.is_empty());
    }

    #[test]
    fn reload_runs_deletions_first() {
        let mut anteroom = Anteroom::new(10);
        anteroom.enqueue(z(5), ArAction::Update);
        let existing: ZidSet = [z(3), z(4)].into_iter().collect();
        anteroom.reload(&[z(2)], &existing);

        assert_eq!(anteroom.dequeue(), Some((ArAction::Delete, z(2))));
        let mut updates = vec![
            anteroom.dequeue().expect("first update"),
            anteroom.dequeue().expect("second update"),
        ];
        updates.sort_by_key(|(_, zid)| *zid);
        assert_eq!(updates, vec![(ArAction::Update, z(3)), (ArAction::Update, z(4))]);
        assert_eq!(anteroom.dequeue(), Some((ArAction::Update, z(5))));
        assert_eq!(anteroom.dequeue(), None);
    }

    #[test]
    fn reload_room_count_depends_on_inputs() {
        let existing: ZidSet = [z(3)].into_iter().collect();

        let mut anteroom = Anteroom::new(10);
        anteroom.reload(&[], &existing);
        assert_eq!(anteroom.room_count(), 1);

        let mut anteroom = Anteroom::new(10);
        anteroom.reload(&[z(1)], &existing);
        assert_eq!(anteroom.room_count(), 2);

        let mut anteroom = Anteroom::new(10);
        anteroom.reload(&[], &ZidSet::new());
        assert_eq!(anteroom.room_count(), 0);
    }

    #[test]
    fn reload_replaces_previous_reload_and_is_not_coalesced_into() {
        let mut anteroom = Anteroom::new(10);
        let first: ZidSet = [z(1), z(2)].into_iter().collect();
        anteroom.reload(&[], &first);
        anteroom.enqueue(z(1), ArAction::Delete);
        assert_eq!(anteroom.room_count(), 2);

        let second: ZidSet = [z(7)].into_iter().collect();
        anteroom.reload(&[], &second);
        assert_eq!(
            drain(&mut anteroom),
            vec![(ArAction::Update, z(7)), (ArAction::Delete, z(1))]
        );
    }

    #[test]
    fn reset_leaves_reload_sentinel() {
        let mut anteroom = Anteroom::new(10);
        anteroom.enqueue(z(1), ArAction::Update);
        anteroom.reset();
        assert_eq!(anteroom.dequeue(), Some((ArAction::Reload, Zid::INVALID)));
        assert_eq!(anteroom.dequeue(), None);
    }
}
