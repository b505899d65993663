use std::future::Future;
use std::pin::Pin;

use dashmap::{DashMap, mapref::entry::Entry};
use etch_core::ResourceId;
use tokio::sync::broadcast;
use tracing::debug;

/// Future a follower awaits; resolves to `None` when the leader produced no result.
pub type AwaitResponse<Res> = Pin<Box<dyn Future<Output = Option<Res>> + Send>>;

/// Result of concurrency check - whether to fetch from upstream or await an in-flight fetch.
pub enum ConcurrencyDecision<Res> {
    /// This caller is the leader and must fetch.
    Proceed,
    /// Another caller is already fetching this resource.
    Await(AwaitResponse<Res>),
}

/// Trait for collapsing concurrent fetches of one resource into a single upstream request.
pub trait ConcurrencyManager<Res>: Send + Sync {
    /// Registers a caller for `id`, making it the leader or a follower.
    fn check(&self, id: &ResourceId) -> ConcurrencyDecision<Res>;

    /// Releases every follower of `id` with the leader's result.
    ///
    /// `None` tells followers to run the whole pipeline themselves.
    fn complete(&self, id: &ResourceId, response: Option<Res>);
}

/// No-op implementation that lets every caller fetch.
pub struct NoopConcurrencyManager;

impl<Res> ConcurrencyManager<Res> for NoopConcurrencyManager
where
    Res: Send + 'static,
{
    fn check(&self, _id: &ResourceId) -> ConcurrencyDecision<Res> {
        ConcurrencyDecision::Proceed
    }

    fn complete(&self, _id: &ResourceId, _response: Option<Res>) {}
}

/// Deduplicator sharing the leader's response with followers over a broadcast channel.
///
/// The table shard lock is held only to insert or remove a group; followers subscribe
/// while holding it and wait after releasing it. A follower that stops waiting just
/// drops its receiver; the leader is unaffected.
pub struct BroadcastConcurrencyManager<Res> {
    in_flight: DashMap<ResourceId, broadcast::Sender<Option<Res>>>,
}

impl<Res> BroadcastConcurrencyManager<Res> {
    /// Creates an empty deduplicator.
    pub fn new() -> Self {
        Self {
            in_flight: DashMap::new(),
        }
    }

    /// Number of resources with a fetch in flight.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}

impl<Res> Default for BroadcastConcurrencyManager<Res> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Res> ConcurrencyManager<Res> for BroadcastConcurrencyManager<Res>
where
    Res: Clone + Send + Sync + 'static,
{
    fn check(&self, id: &ResourceId) -> ConcurrencyDecision<Res> {
        match self.in_flight.entry(id.clone()) {
            Entry::Occupied(group) => {
                let mut receiver = group.get().subscribe();
                drop(group);
                debug!("joining in-flight fetch");
                crate::metrics::record_follower();
                ConcurrencyDecision::Await(Box::pin(async move {
                    // A dropped sender means the leader went away without a result.
                    receiver.recv().await.ok().flatten()
                }))
            }
            Entry::Vacant(slot) => {
                let (sender, _) = broadcast::channel(1);
                slot.insert(sender);
                ConcurrencyDecision::Proceed
            }
        }
    }

    fn complete(&self, id: &ResourceId, response: Option<Res>) {
        if let Some((_, sender)) = self.in_flight.remove(id) {
            let waiters = sender.receiver_count();
            if waiters > 0 {
                debug!(waiters, delivered = response.is_some(), "releasing followers");
            }
            let _ = sender.send(response);
        }
    }
}

/// Leader's obligation to release its followers.
///
/// Dropping it without calling [`finish`](Self::finish), for instance because the
/// leader's task was cancelled, releases followers with "no result".
pub struct Leadership<'a, Res, C>
where
    C: ConcurrencyManager<Res>,
{
    manager: &'a C,
    id: ResourceId,
    finished: bool,
    _response: std::marker::PhantomData<fn(Res)>,
}

impl<'a, Res, C> Leadership<'a, Res, C>
where
    C: ConcurrencyManager<Res>,
{
    /// Takes leadership of `id`.
    pub fn new(manager: &'a C, id: ResourceId) -> Self {
        Self {
            manager,
            id,
            finished: false,
            _response: std::marker::PhantomData,
        }
    }

    /// Releases followers with `response`.
    pub fn finish(mut self, response: Option<Res>) {
        self.finished = true;
        self.manager.complete(&self.id, response);
    }
}

impl<Res, C> Drop for Leadership<'_, Res, C>
where
    C: ConcurrencyManager<Res>,
{
    fn drop(&mut self) {
        if !self.finished {
            self.manager.complete(&self.id, None);
        }
    }
}
