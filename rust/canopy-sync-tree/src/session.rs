use std::collections::HashMap;

use canopy_storage::NodeHash;
use tracing::debug;

use crate::{
    BranchFailure, Comparator, DiscoveryCallback, Name, NodeCache, NodeFetcher, SyncTreeError,
    TreeCursor,
};

/// Identifies one reconciliation session owned by a caller.
pub type SessionId = u64;

/// The owner-facing registry of reconciliation sessions.
///
/// All sessions share one [`NodeCache`], so a subtree resolved for one
/// session is immediately available to every other; each session has its
/// own [`Comparator`], listener and working root. Sessions are independent:
/// cancelling one abandons its outstanding fetches without touching the
/// shared cache or any sibling session.
pub struct Syncer<Fetcher>
where
    Fetcher: NodeFetcher,
{
    cache: NodeCache,
    fetcher: Fetcher,
    sessions: HashMap<SessionId, Comparator<Fetcher>>,
}

impl<Fetcher> Syncer<Fetcher>
where
    Fetcher: NodeFetcher,
{
    /// Create a registry with a fresh shared cache.
    pub fn new(fetcher: Fetcher) -> Self {
        Self::with_cache(fetcher, NodeCache::new())
    }

    /// Create a registry over an existing shared cache.
    pub fn with_cache(fetcher: Fetcher, cache: NodeCache) -> Self {
        Syncer {
            cache,
            fetcher,
            sessions: HashMap::new(),
        }
    }

    /// The cache shared by every session.
    pub fn node_cache(&self) -> &NodeCache {
        &self.cache
    }

    /// Begin reconciling under `session`, reporting newly discovered names
    /// to `listener`.
    ///
    /// `start_hash` resumes from a known working root; its content is
    /// fetched on demand. `start_name` is a resume cursor: names ordered at
    /// or below it are merged but not reported. Registering over an
    /// existing session id shuts the previous session down first.
    pub fn register_callback(
        &mut self,
        listener: DiscoveryCallback,
        session: SessionId,
        start_hash: Option<NodeHash>,
        start_name: Option<Name>,
    ) {
        let mut comparator = Comparator::new(self.cache.clone(), self.fetcher.clone(), listener);
        comparator.set_report_floor(start_name);
        if let Some(hash) = start_hash {
            comparator.set_root(self.cache.intern_pending(hash));
        }
        debug!("Registering session {session}");
        self.sessions.insert(session, comparator);
    }

    /// Cancel a session's outstanding work and forget it. Safe to call
    /// mid-compare: fetches already in flight are abandoned and the shared
    /// cache keeps every cursor resolved so far.
    pub fn remove_callback(&mut self, session: SessionId) {
        self.shutdown(session);
    }

    /// Cancel a session's outstanding work and forget it.
    pub fn shutdown(&mut self, session: SessionId) {
        if self.sessions.remove(&session).is_some() {
            debug!("Shut down session {session}");
        }
    }

    /// Direct access to a session's comparator.
    pub fn session(&mut self, session: SessionId) -> Option<&mut Comparator<Fetcher>> {
        self.sessions.get_mut(&session)
    }

    /// Enqueue a resolved subtree to be merged into `session`'s working
    /// root.
    pub fn add_pending(
        &mut self,
        session: SessionId,
        entry: TreeCursor,
    ) -> Result<(), SyncTreeError> {
        self.sessions
            .get_mut(&session)
            .ok_or(SyncTreeError::UnknownSession(session))?
            .add_pending(entry);
        Ok(())
    }

    /// Advance `session`'s pending work by one step.
    pub fn kick(&mut self, session: SessionId) -> Result<(), SyncTreeError> {
        self.sessions
            .get_mut(&session)
            .ok_or(SyncTreeError::UnknownSession(session))?
            .kick_compare();
        Ok(())
    }

    /// Whether `session` has outstanding work.
    pub fn comparing(&self, session: SessionId) -> bool {
        self.sessions
            .get(&session)
            .map(Comparator::comparing)
            .unwrap_or(false)
    }

    /// The merged working root of `session`, once quiescent.
    pub fn current_root(&self, session: SessionId) -> Option<TreeCursor> {
        self.sessions
            .get(&session)
            .and_then(Comparator::current_root)
    }

    /// Take the branch failures `session` has accumulated.
    pub fn take_failures(&mut self, session: SessionId) -> Vec<BranchFailure> {
        self.sessions
            .get_mut(&session)
            .map(Comparator::take_failures)
            .unwrap_or_default()
    }

    /// Drive `session` until it is quiescent.
    pub async fn run_until_quiescent(&mut self, session: SessionId) -> Result<(), SyncTreeError> {
        self.sessions
            .get_mut(&session)
            .ok_or(SyncTreeError::UnknownSession(session))?
            .run_until_quiescent()
            .await
    }
}

impl<Fetcher> std::fmt::Debug for Syncer<Fetcher>
where
    Fetcher: NodeFetcher,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Syncer")
            .field("sessions", &self.sessions.len())
            .field("cache", &self.cache)
            .finish()
    }
}
