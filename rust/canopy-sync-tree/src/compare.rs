use std::collections::HashSet;

use canopy_common::spawn_detached;
use canopy_storage::NodeHash;
use nonempty::NonEmpty;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::{debug, warn};

use crate::{
    ChildRef, Element, Name, Node, NodeBuilder, NodeCache, NodeFetcher, SyncTreeError, TreeCursor,
};

/// The listener invoked exactly once for every newly discovered name.
pub type DiscoveryCallback = Box<dyn FnMut(&Name) + Send + 'static>;

/// Where a comparator is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareStatus {
    /// No work has been enqueued yet.
    Idle,
    /// At least one branch has outstanding work.
    Comparing,
    /// Every branch has been resolved.
    Quiescent,
}

/// A terminal, branch-local failure surfaced to the comparator's owner.
///
/// The owner decides whether and when to retry, by re-adding the entry as
/// pending; the comparator never retries on its own.
#[derive(Debug)]
pub struct BranchFailure {
    /// The entry whose merge failed.
    pub entry: TreeCursor,
    /// What went wrong.
    pub error: SyncTreeError,
}

struct Branch {
    entry: TreeCursor,
    waiting: HashSet<NodeHash>,
}

struct FetchCompletion {
    hash: NodeHash,
    result: Result<Node, crate::FetchError>,
}

enum MergeStep {
    Complete,
    Awaiting(HashSet<NodeHash>),
}

/// The merge/diff engine: reconciles newly available subtrees into a
/// working root, discovering the names the root did not previously hold.
///
/// The comparator is event driven. A branch that reaches a hash with no
/// locally known content marks it pending, hands a fetch to the network
/// collaborator and suspends; the completion re-enters through an internal
/// channel and the next [`kick_compare`](Comparator::kick_compare) resumes
/// the branch. One failing branch never halts its siblings, and nothing a
/// failed branch did can corrupt the shared [`NodeCache`].
pub struct Comparator<Fetcher>
where
    Fetcher: NodeFetcher,
{
    cache: NodeCache,
    fetcher: Fetcher,
    listener: DiscoveryCallback,
    report_floor: Option<Name>,
    root: Option<TreeCursor>,
    branches: Vec<Branch>,
    failures: Vec<BranchFailure>,
    in_flight: HashSet<NodeHash>,
    completion_tx: UnboundedSender<FetchCompletion>,
    completion_rx: UnboundedReceiver<FetchCompletion>,
    state: CompareStatus,
}

impl<Fetcher> Comparator<Fetcher>
where
    Fetcher: NodeFetcher,
{
    /// Create a comparator over a shared cache and a network collaborator.
    pub fn new(cache: NodeCache, fetcher: Fetcher, listener: DiscoveryCallback) -> Self {
        let (completion_tx, completion_rx) = unbounded_channel();
        Comparator {
            cache,
            fetcher,
            listener,
            report_floor: None,
            root: None,
            branches: Vec::new(),
            failures: Vec::new(),
            in_flight: HashSet::new(),
            completion_tx,
            completion_rx,
            state: CompareStatus::Idle,
        }
    }

    /// Suppress discovery reports for names ordered at or below `floor`.
    /// Used when resuming a session that already knows a prefix of the
    /// name set.
    pub fn set_report_floor(&mut self, floor: Option<Name>) {
        self.report_floor = floor;
    }

    /// Install a baseline working root, typically when resuming from a
    /// previously known root hash.
    pub fn set_root(&mut self, root: TreeCursor) {
        self.root = Some(root);
    }

    /// The merged working root. Once the comparator is quiescent this
    /// covers the union of every name merged in.
    pub fn current_root(&self) -> Option<TreeCursor> {
        self.root.clone()
    }

    /// The shared cache this comparator resolves hashes through.
    pub fn cache(&self) -> &NodeCache {
        &self.cache
    }

    /// Enqueue a resolved, locally known subtree to be merged into the
    /// working root. Re-adding an entry that previously failed clears the
    /// failure and retries it.
    pub fn add_pending(&mut self, entry: TreeCursor) {
        self.failures.retain(|failure| failure.entry != entry);
        self.branches.push(Branch {
            entry,
            waiting: HashSet::new(),
        });
        self.state = CompareStatus::Comparing;
    }

    /// True while any branch has outstanding work: a fetch in flight or a
    /// merge not yet applied.
    pub fn comparing(&self) -> bool {
        self.state == CompareStatus::Comparing
    }

    /// Where this comparator is in its lifecycle.
    pub fn status(&self) -> CompareStatus {
        self.state
    }

    /// Take the branch failures accumulated since the last call.
    pub fn take_failures(&mut self) -> Vec<BranchFailure> {
        std::mem::take(&mut self.failures)
    }

    /// Advance all pending work by one step. Idempotent: kicking with
    /// nothing pending is a no-op.
    pub fn kick_compare(&mut self) {
        while let Ok(completion) = self.completion_rx.try_recv() {
            self.apply_completion(completion);
        }

        let branches = std::mem::take(&mut self.branches);
        let mut retained = Vec::new();
        for mut branch in branches {
            match self.merge_entry(&branch.entry) {
                Ok(MergeStep::Complete) => {}
                Ok(MergeStep::Awaiting(needed)) => {
                    for hash in &needed {
                        self.request_fetch(*hash);
                    }
                    branch.waiting = needed;
                    retained.push(branch);
                }
                Err(error) => {
                    warn!("Merge of {} failed: {error}", branch.entry.hash().short());
                    self.failures.push(BranchFailure {
                        entry: branch.entry,
                        error,
                    });
                }
            }
        }
        self.branches = retained;

        if self.branches.is_empty() && self.in_flight.is_empty() {
            if self.state == CompareStatus::Comparing {
                self.state = CompareStatus::Quiescent;
            }
        } else {
            self.state = CompareStatus::Comparing;
        }
    }

    /// Drive the comparator until it is quiescent, awaiting fetch
    /// completions as they arrive.
    pub async fn run_until_quiescent(&mut self) -> Result<(), SyncTreeError> {
        loop {
            self.kick_compare();
            if !self.comparing() {
                return Ok(());
            }
            if self.in_flight.is_empty() {
                return Err(SyncTreeError::UnexpectedTreeShape(
                    "Comparator stalled with no fetches in flight".into(),
                ));
            }
            match self.completion_rx.recv().await {
                Some(completion) => self.apply_completion(completion),
                None => {
                    return Err(SyncTreeError::UnexpectedTreeShape(
                        "Completion channel closed".into(),
                    ));
                }
            }
        }
    }

    /// Abandon outstanding work without corrupting the shared cache.
    /// Partially resolved cursors remain valid and reusable by a future
    /// session.
    pub(crate) fn abandon(&mut self) {
        for hash in self.in_flight.drain() {
            if let Some(cursor) = self.cache.get(&hash) {
                cursor.set_pending(false);
            }
        }
        self.branches.clear();
    }

    fn request_fetch(&mut self, hash: NodeHash) {
        if !self.in_flight.insert(hash) {
            return;
        }
        let cursor = self.cache.intern_pending(hash);
        cursor.set_pending(true);
        debug!("Requesting {}", hash.short());

        let fetcher = self.fetcher.clone();
        let tx = self.completion_tx.clone();
        spawn_detached(async move {
            let result = fetcher.fetch_node(&hash).await;
            let _ = tx.send(FetchCompletion { hash, result });
        });
    }

    fn apply_completion(&mut self, completion: FetchCompletion) {
        self.in_flight.remove(&completion.hash);
        match completion.result {
            Ok(node) => {
                if node.hash() != completion.hash {
                    warn!(
                        "Discarding {}: content hashes to {}",
                        completion.hash.short(),
                        node.hash().short()
                    );
                    if let Some(cursor) = self.cache.get(&completion.hash) {
                        cursor.set_pending(false);
                    }
                    let hash = completion.hash;
                    let node_hash = node.hash();
                    self.fail_waiters(&hash, || {
                        SyncTreeError::HashMismatch(format!(
                            "{} offered for {}",
                            node_hash.short(),
                            hash.short()
                        ))
                    });
                    return;
                }
                match self.cache.resolve(completion.hash, node) {
                    Ok(cursor) => cursor.set_pending(false),
                    Err(error) => {
                        warn!("Failed to resolve {}: {error}", completion.hash.short());
                        let message = format!("{error}");
                        self.fail_waiters(&completion.hash, || {
                            SyncTreeError::HashMismatch(message.clone())
                        });
                    }
                }
            }
            Err(error) => {
                warn!("Fetch of {} failed: {error}", completion.hash.short());
                if let Some(cursor) = self.cache.get(&completion.hash) {
                    cursor.set_pending(false);
                }
                self.fail_waiters(&completion.hash, || SyncTreeError::Fetch(error.clone()));
            }
        }
    }

    fn fail_waiters(&mut self, hash: &NodeHash, mut make_error: impl FnMut() -> SyncTreeError) {
        let mut remaining = Vec::new();
        for branch in std::mem::take(&mut self.branches) {
            if branch.waiting.contains(hash) {
                self.failures.push(BranchFailure {
                    entry: branch.entry,
                    error: make_error(),
                });
            } else {
                remaining.push(branch);
            }
        }
        self.branches = remaining;
    }

    fn report(&mut self, name: &Name) {
        if let Some(floor) = &self.report_floor {
            if name <= floor {
                return;
            }
        }
        (self.listener)(name);
    }

    /// Attempt to merge one entry into the working root. Returns the set
    /// of hashes that must be fetched first when content is missing; no
    /// state is mutated and no names are reported until a single pass can
    /// run to completion.
    fn merge_entry(&mut self, entry: &TreeCursor) -> Result<MergeStep, SyncTreeError> {
        let Some(root) = self.root.clone() else {
            // Nothing merged yet: the entry becomes the root wholesale and
            // every reachable name is newly discovered.
            let mut needed = HashSet::new();
            subtree_plan(&self.cache, entry.hash(), &mut needed);
            if !needed.is_empty() {
                return Ok(MergeStep::Awaiting(needed));
            }
            let names = subtree_names(&self.cache, entry.hash())?;
            for name in &names {
                self.report(name);
            }
            self.root = Some(entry.clone());
            entry.set_covered(true);
            debug!(
                "Adopted {} as working root ({} names)",
                entry.hash().short(),
                names.len()
            );
            return Ok(MergeStep::Complete);
        };

        // Redundant entries are discarded without callbacks or hash
        // recomputation. Covered is only meaningful against a working root.
        if entry.hash() == root.hash() || entry.is_covered() {
            entry.set_covered(true);
            return Ok(MergeStep::Complete);
        }

        // Resolve the entry subtree first: its names drive the walk.
        let mut needed = HashSet::new();
        subtree_plan(&self.cache, entry.hash(), &mut needed);
        if !needed.is_empty() {
            return Ok(MergeStep::Awaiting(needed));
        }
        let entry_names = subtree_names(&self.cache, entry.hash())?;

        // Then resolve exactly the parts of the root whose ranges overlap
        // the entry; disjoint subtrees are never fetched.
        splice_plan(&self.cache, root.hash(), &entry_names, &mut needed);
        if !needed.is_empty() {
            return Ok(MergeStep::Awaiting(needed));
        }

        let mut discovered = Vec::new();
        let refs = splice(&self.cache, root.hash(), &entry_names, &mut discovered)?;
        let new_root = adopt_root(&self.cache, refs)?;

        for name in &discovered {
            self.report(name);
        }
        debug!(
            "Merged {} into {} -> {} ({} new names)",
            entry.hash().short(),
            root.hash().short(),
            new_root.hash().short(),
            discovered.len()
        );
        entry.set_covered(true);
        self.root = Some(new_root);
        Ok(MergeStep::Complete)
    }
}

impl<Fetcher> Drop for Comparator<Fetcher>
where
    Fetcher: NodeFetcher,
{
    fn drop(&mut self) {
        self.abandon();
    }
}

impl<Fetcher> std::fmt::Debug for Comparator<Fetcher>
where
    Fetcher: NodeFetcher,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Comparator")
            .field("status", &self.state)
            .field("branches", &self.branches.len())
            .field("in_flight", &self.in_flight.len())
            .field("root", &self.root.as_ref().map(|root| root.hash().short()))
            .finish()
    }
}

/// Record every unresolved hash reachable from `hash` that a full
/// enumeration of the subtree would require.
fn subtree_plan(cache: &NodeCache, hash: NodeHash, needed: &mut HashSet<NodeHash>) {
    let cursor = cache.intern_pending(hash);
    let Some(node) = cursor.node() else {
        needed.insert(hash);
        return;
    };
    for child in node.child_refs() {
        subtree_plan(cache, child.hash(), needed);
    }
}

/// Every name reachable from `hash`, in ascending order. The subtree must
/// be fully resolved.
fn subtree_names(cache: &NodeCache, hash: NodeHash) -> Result<Vec<Name>, SyncTreeError> {
    let node = resolved(cache, hash)?;
    let mut names = Vec::new();
    for element in node.elements() {
        match element {
            Element::Leaf(name) => names.push(name.clone()),
            Element::Child(child) => names.extend(subtree_names(cache, child.hash())?),
        }
    }
    Ok(names)
}

/// Record the unresolved hashes in the parts of the tree under `hash`
/// whose ranges could contain any of `names`. Children whose ranges are
/// disjoint from every incoming name are skipped entirely, which bounds
/// comparison cost to the size of the actual delta.
fn splice_plan(cache: &NodeCache, hash: NodeHash, names: &[Name], needed: &mut HashSet<NodeHash>) {
    let cursor = cache.intern_pending(hash);
    let Some(node) = cursor.node() else {
        needed.insert(hash);
        return;
    };
    if node.is_leaf() {
        return;
    }
    let buckets = partition(names, node.elements());
    for (element, bucket) in node.elements().iter().zip(buckets) {
        if bucket.is_empty() {
            continue;
        }
        if let Element::Child(child) = element {
            splice_plan(cache, child.hash(), &bucket, needed);
        }
    }
}

/// Assign each incoming name to the element whose range it belongs in:
/// the last element whose minimum is not greater than the name, or the
/// first element for names below the whole node's range.
fn partition(names: &[Name], elements: &NonEmpty<Element>) -> Vec<Vec<Name>> {
    let mut buckets: Vec<Vec<Name>> = vec![Vec::new(); elements.len()];
    let mut index = 0;
    for name in names {
        while index + 1 < elements.len()
            && elements
                .get(index + 1)
                .map(|element| element.min_name() <= name)
                .unwrap_or(false)
        {
            index += 1;
        }
        buckets[index].push(name.clone());
    }
    buckets
}

enum Piece {
    Keep(ChildRef),
    Rebuild(Vec<Name>),
}

/// Merge `names` into the subtree under `hash`, returning the references
/// that replace it. Untouched children are kept by reference, so their
/// nodes and hashes survive unchanged, and a subtree that already contains
/// every incoming name is returned as-is.
fn splice(
    cache: &NodeCache,
    hash: NodeHash,
    names: &[Name],
    discovered: &mut Vec<Name>,
) -> Result<Vec<ChildRef>, SyncTreeError> {
    let node = resolved(cache, hash)?;

    if node.is_leaf() {
        let (merged, novel) = merge_names(node.leaf_names(), names);
        if novel.is_empty() {
            return Ok(vec![node.child_ref()]);
        }
        discovered.extend(novel);
        return build_leaves(cache, &merged);
    }

    let buckets = partition(names, node.elements());
    let mut pieces = Vec::with_capacity(node.len());
    let mut changed = false;

    for (element, bucket) in node.elements().iter().zip(buckets) {
        match element {
            Element::Child(child) => {
                if bucket.is_empty() {
                    pieces.push(Piece::Keep(child.clone()));
                    continue;
                }
                let replacements = splice(cache, child.hash(), &bucket, discovered)?;
                if replacements.len() == 1 && replacements[0].hash() == child.hash() {
                    // The subtree already held every assigned name; it is
                    // safe to skip on future passes.
                    if let Some(cursor) = cache.get(&child.hash()) {
                        cursor.set_covered(true);
                    }
                    pieces.push(Piece::Keep(child.clone()));
                } else {
                    changed = true;
                    pieces.extend(replacements.into_iter().map(Piece::Keep));
                }
            }
            Element::Leaf(name) => {
                let held = std::iter::once(name);
                let (merged, novel) = merge_names(held, &bucket);
                if !novel.is_empty() {
                    changed = true;
                    discovered.extend(novel);
                }
                pieces.push(Piece::Rebuild(merged));
            }
        }
    }

    if !changed {
        return Ok(vec![node.child_ref()]);
    }

    // Flatten: adjacent rebuilt name runs coalesce into fresh leaves, kept
    // references pass through untouched.
    let mut refs = Vec::new();
    let mut pending_names: Vec<Name> = Vec::new();
    for piece in pieces {
        match piece {
            Piece::Rebuild(mut names) => pending_names.append(&mut names),
            Piece::Keep(child) => {
                if !pending_names.is_empty() {
                    refs.extend(build_leaves(cache, &pending_names)?);
                    pending_names.clear();
                }
                refs.push(child);
            }
        }
    }
    if !pending_names.is_empty() {
        refs.extend(build_leaves(cache, &pending_names)?);
    }

    rebuild_level(cache, &refs)
}

/// Ordered union of two ascending name sequences, also returning the
/// incoming names that were absent from the held sequence.
fn merge_names<'a>(
    held: impl Iterator<Item = &'a Name>,
    incoming: &[Name],
) -> (Vec<Name>, Vec<Name>) {
    let held: Vec<&Name> = held.collect();
    let mut merged = Vec::with_capacity(held.len() + incoming.len());
    let mut novel = Vec::new();

    let mut at_held = 0;
    let mut at_incoming = 0;
    while at_held < held.len() || at_incoming < incoming.len() {
        match (held.get(at_held), incoming.get(at_incoming)) {
            (Some(h), None) => {
                merged.push((*h).clone());
                at_held += 1;
            }
            (None, Some(i)) => {
                merged.push(i.clone());
                novel.push(i.clone());
                at_incoming += 1;
            }
            (Some(h), Some(i)) => match (*h).cmp(i) {
                std::cmp::Ordering::Less => {
                    merged.push((*h).clone());
                    at_held += 1;
                }
                std::cmp::Ordering::Greater => {
                    merged.push(i.clone());
                    novel.push(i.clone());
                    at_incoming += 1;
                }
                std::cmp::Ordering::Equal => {
                    merged.push((*h).clone());
                    at_held += 1;
                    at_incoming += 1;
                }
            },
            (None, None) => break,
        }
    }

    (merged, novel)
}

fn build_leaves(cache: &NodeCache, names: &[Name]) -> Result<Vec<ChildRef>, SyncTreeError> {
    let mut refs = Vec::new();
    let mut remaining = names;
    while !remaining.is_empty() {
        let (node, consumed) = NodeBuilder::build_leaf(remaining)?;
        cache.intern(node.clone())?;
        refs.push(node.child_ref());
        remaining = &remaining[consumed..];
    }
    Ok(refs)
}

fn rebuild_level(cache: &NodeCache, refs: &[ChildRef]) -> Result<Vec<ChildRef>, SyncTreeError> {
    let nodes = NodeBuilder::build_level(refs)?;
    let mut out = Vec::with_capacity(nodes.len());
    for node in nodes {
        cache.intern(node.clone())?;
        out.push(node.child_ref());
    }
    Ok(out)
}

/// Group references level by level until a single node remains, returning
/// its cursor.
fn adopt_root(cache: &NodeCache, refs: Vec<ChildRef>) -> Result<TreeCursor, SyncTreeError> {
    let mut level = refs;
    while level.len() > 1 {
        let nodes = NodeBuilder::build_level(&level)?;
        let nodes = if nodes.len() >= level.len() {
            // A level must shrink; adopt everything under one parent.
            let elements = NonEmpty::from_vec(
                level.iter().cloned().map(Element::Child).collect::<Vec<_>>(),
            )
            .ok_or_else(|| SyncTreeError::InvalidConstruction("Level with no children".into()))?;
            vec![Node::from_elements(elements)?]
        } else {
            nodes
        };
        for node in &nodes {
            cache.intern(node.clone())?;
        }
        level = nodes.iter().map(Node::child_ref).collect();
    }
    let only = level.first().ok_or_else(|| {
        SyncTreeError::UnexpectedTreeShape("Merge produced no replacement subtree".into())
    })?;
    cache.get(&only.hash()).ok_or_else(|| {
        SyncTreeError::UnexpectedTreeShape("Merged root missing from cache".into())
    })
}

fn resolved(cache: &NodeCache, hash: NodeHash) -> Result<Node, SyncTreeError> {
    cache
        .get(&hash)
        .and_then(|cursor| cursor.node())
        .ok_or_else(|| {
            SyncTreeError::UnexpectedTreeShape(format!("{} unresolved during merge", hash.short()))
        })
}
