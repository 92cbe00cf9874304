//! Streaming enumeration of the names reachable from a cursor.

use async_stream::try_stream;
use canopy_storage::NodeHash;
use futures_core::Stream;
use futures_util::{StreamExt, pin_mut};

use crate::{Element, Name, Node, NodeCache, NodeFetcher, SyncTreeError, TreeCursor};

/// Returns an async stream over every name reachable from `root`, in
/// ascending order.
///
/// Subtrees not yet resolved in the cache are fetched on demand through
/// `fetcher` and interned, so a second traversal touches the network only
/// for content the first one never reached.
pub fn stream_names<'a, Fetcher>(
    cache: &'a NodeCache,
    fetcher: &'a Fetcher,
    root: &TreeCursor,
) -> impl Stream<Item = Result<Name, SyncTreeError>> + 'a
where
    Fetcher: NodeFetcher,
{
    let root_hash = root.hash();

    try_stream! {
        let node = resolve_or_fetch(cache, fetcher, root_hash).await?;
        // Depth-first walk with an explicit stack of (node, next element)
        let mut stack: Vec<(Node, usize)> = vec![(node, 0)];

        while let Some((node, index)) = stack.pop() {
            let Some(element) = node.element(index).cloned() else {
                continue;
            };
            stack.push((node, index + 1));

            match element {
                Element::Leaf(name) => yield name,
                Element::Child(child) => {
                    let child_node = resolve_or_fetch(cache, fetcher, child.hash()).await?;
                    stack.push((child_node, 0));
                }
            }
        }
    }
}

/// Collect every name reachable from `root` into a vector.
pub async fn collect_names<Fetcher>(
    cache: &NodeCache,
    fetcher: &Fetcher,
    root: &TreeCursor,
) -> Result<Vec<Name>, SyncTreeError>
where
    Fetcher: NodeFetcher,
{
    let stream = stream_names(cache, fetcher, root);
    pin_mut!(stream);

    let mut names = Vec::new();
    while let Some(name) = stream.next().await {
        names.push(name?);
    }
    Ok(names)
}

async fn resolve_or_fetch<Fetcher>(
    cache: &NodeCache,
    fetcher: &Fetcher,
    hash: NodeHash,
) -> Result<Node, SyncTreeError>
where
    Fetcher: NodeFetcher,
{
    if let Some(node) = cache.get(&hash).and_then(|cursor| cursor.node()) {
        return Ok(node);
    }
    let node = fetcher.fetch_node(&hash).await?;
    if node.hash() != hash {
        return Err(SyncTreeError::HashMismatch(format!(
            "{} offered for {}",
            node.hash().short(),
            hash.short()
        )));
    }
    cache.resolve(hash, node.clone())?;
    Ok(node)
}
