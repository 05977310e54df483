//! The storage contract shared by every box, and the change events that
//! connect boxes to the indexer.

use crate::errors::StoreResult;
use crate::id::{Zid, ZidSet};
use crate::meta::Meta;
use crate::zettel::Zettel;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateReason {
    OnZettel,
    OnDelete,
    /// Everything may have changed; `zid` is invalid.
    OnReload,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateInfo {
    /// Location of the box that produced the change.
    pub origin: Arc<str>,
    pub reason: UpdateReason,
    pub zid: Zid,
}

pub type UpdateSender = mpsc::UnboundedSender<UpdateInfo>;
pub type UpdateReceiver = mpsc::UnboundedReceiver<UpdateInfo>;

pub fn update_channel() -> (UpdateSender, UpdateReceiver) {
    mpsc::unbounded_channel()
}

/// Publishes a change; a closed channel only means nobody is indexing.
pub(crate) fn publish(updates: &UpdateSender, origin: &Arc<str>, reason: UpdateReason, zid: Zid) {
    let info = UpdateInfo {
        origin: origin.clone(),
        reason,
        zid,
    };
    if updates.send(info).is_err() {
        tracing::trace!(zid = %zid, reason = ?reason, "change event dropped, no listener");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartState {
    Stopped,
    Starting,
    Started,
    Stopping,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BoxStats {
    pub read_only: bool,
    pub zettel_count: usize,
}

/// Adds derived data to metadata on its way out of a box.
pub trait Enricher: Send + Sync {
    fn enrich(&self, meta: &mut Meta);
}

pub type ZidPredicate<'a> = &'a (dyn Fn(Zid) -> bool + Sync);

#[async_trait]
pub trait ZettelBox: Send + Sync {
    fn location(&self) -> String;

    fn state(&self) -> StartState;

    fn can_create_zettel(&self) -> bool;

    async fn create_zettel(&self, zettel: Zettel) -> StoreResult<Zid>;

    async fn get_zettel(&self, zid: Zid) -> StoreResult<Zettel>;

    fn has_zettel(&self, zid: Zid) -> bool;

    fn apply_zid(
        &self,
        handle: &mut (dyn FnMut(Zid) + Send),
        constraint: ZidPredicate<'_>,
    ) -> StoreResult<()>;

    async fn apply_meta(
        &self,
        handle: &mut (dyn FnMut(Meta) + Send),
        constraint: ZidPredicate<'_>,
    ) -> StoreResult<()>;

    fn can_update_zettel(&self, zettel: &Zettel) -> bool;

    async fn update_zettel(&self, zettel: Zettel) -> StoreResult<()>;

    fn can_rename_zettel(&self, zid: Zid) -> bool;

    async fn rename_zettel(&self, cur: Zid, new: Zid) -> StoreResult<()>;

    fn can_delete_zettel(&self, zid: Zid) -> bool;

    async fn delete_zettel(&self, zid: Zid) -> StoreResult<()>;

    fn read_stats(&self) -> BoxStats;

    /// Every identifier currently known to the box.
    fn fetch_zids(&self) -> StoreResult<ZidSet> {
        let mut zids = ZidSet::new();
        self.apply_zid(
            &mut |zid: Zid| {
                zids.insert(zid);
            },
            &|_: Zid| true,
        )?;
        Ok(zids)
    }
}
