use std::future::Future;
use thiserror::Error;

#[cfg(target_arch = "wasm32")]
use tokio::sync::oneshot::channel;

/// Async module errors
#[derive(Error, Debug)]
pub enum CanopyAsyncError {
    /// Generic join error
    #[error("Unable to rejoin pending future")]
    JoinError,
}

/// Spawn a future by scheduling it with the local executor. The returned
/// future will be pending until the spawned future completes.
#[cfg(target_arch = "wasm32")]
pub async fn spawn<F>(future: F) -> Result<F::Output, CanopyAsyncError>
where
    F: Future + 'static,
    F::Output: Send + 'static,
{
    let (tx, rx) = channel();

    wasm_bindgen_futures::spawn_local(async move {
        // A send error means the receiver was dropped before the spawned
        // task completed
        let _ = tx.send(future.await);
    });

    rx.await.map_err(|_| CanopyAsyncError::JoinError)
}

/// Spawn a future by scheduling it with the local executor. The returned
/// future will be pending until the spawned future completes.
#[cfg(not(target_arch = "wasm32"))]
pub async fn spawn<F>(future: F) -> Result<F::Output, CanopyAsyncError>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::spawn(future)
        .await
        .map_err(|_| CanopyAsyncError::JoinError)
}

/// Schedule a future with the local executor without awaiting its
/// completion. The future is detached: its output (if any) is discarded.
#[cfg(not(target_arch = "wasm32"))]
pub fn spawn_detached<F>(future: F)
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let _ = tokio::spawn(future);
}

/// Schedule a future with the local executor without awaiting its
/// completion. The future is detached: its output (if any) is discarded.
#[cfg(target_arch = "wasm32")]
pub fn spawn_detached<F>(future: F)
where
    F: Future + 'static,
    F::Output: 'static,
{
    wasm_bindgen_futures::spawn_local(async move {
        let _ = future.await;
    });
}

#[cfg(test)]
mod tests {
    use super::spawn;

    #[tokio::test]
    async fn it_joins_a_spawned_future() {
        let value = spawn(async { 40 + 2 }).await.unwrap();
        assert_eq!(value, 42);
    }
}
