use std::future::Future;

/// Spawn a task on the runtime driving this store.
pub fn spawn<F>(future: F)
where
    F: Future + Send + 'static,
    F::Output: Send,
{
    tokio::spawn(future);
}
