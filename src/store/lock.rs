//! Serialization of store (un)initialization.
//!
//! Each store owns one [`AwaitLock`]. Initialize and uninitialize sequences both run under it, so a
//! second call queues until the first one has fully completed. The lock is FIFO and is released
//! on every exit path of the callback, including errors and panics.

use std::future::Future;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Default)]
pub struct AwaitLock {
    inner: Mutex<()>,
}

impl AwaitLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run an initialize sequence once every earlier sequence has finished.
    pub async fn initialize<F, Fut, T>(&self, callback: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.run("initialize", callback).await
    }

    /// Run an uninitialize sequence once every earlier sequence has finished.
    pub async fn uninitialize<F, Fut, T>(&self, callback: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.run("uninitialize", callback).await
    }

    async fn run<F, Fut, T>(&self, sequence: &str, callback: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        if self.is_locked() {
            debug!("{} waiting for running sequence", sequence);
        }
        let _guard = self.inner.lock().await;
        callback().await
    }

    /// True while a sequence is running.
    pub fn is_locked(&self) -> bool {
        self.inner.try_lock().is_err()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_sequences_never_overlap() {
        let lock = Arc::new(AwaitLock::new());
        let active = Arc::new(AtomicUsize::new(0));
        let max_active = Arc::new(AtomicUsize::new(0));
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..6 {
            let lock = lock.clone();
            let active = active.clone();
            let max_active = max_active.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                let body = move || async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    max_active.fetch_max(now, Ordering::SeqCst);
                    order.lock().unwrap().push(format!("start {}", i));
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    order.lock().unwrap().push(format!("end {}", i));
                    active.fetch_sub(1, Ordering::SeqCst);
                };
                if i % 2 == 0 {
                    lock.initialize(body).await
                } else {
                    lock.uninitialize(body).await
                }
            }));
            // Issue the next call without waiting for this one
            tokio::task::yield_now().await;
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_active.load(Ordering::SeqCst), 1);
        let order = order.lock().unwrap();
        for pair in order.chunks(2) {
            let start = pair[0].strip_prefix("start ").unwrap();
            let end = pair[1].strip_prefix("end ").unwrap();
            assert_eq!(start, end);
        }
        assert!(!lock.is_locked());
    }

    #[tokio::test]
    async fn test_uninitialize_waits_for_initialize() {
        let lock = Arc::new(AwaitLock::new());
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));

        let init = {
            let lock = lock.clone();
            let log = log.clone();
            tokio::spawn(async move {
                lock.initialize(move || async move {
                    log.lock().unwrap().push("init start");
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    log.lock().unwrap().push("init end");
                })
                .await
            })
        };
        tokio::task::yield_now().await;
        assert!(lock.is_locked());

        let uninit_log = log.clone();
        lock.uninitialize(move || async move {
            uninit_log.lock().unwrap().push("uninit");
        })
        .await;
        init.await.unwrap();

        assert_eq!(*log.lock().unwrap(), ["init start", "init end", "uninit"]);
    }

    #[tokio::test]
    async fn test_lock_released_after_error() {
        let lock = AwaitLock::new();

        let result: Result<(), &str> = lock.initialize(|| async { Err("boom") }).await;
        assert!(result.is_err());
        assert!(!lock.is_locked());

        let value = lock.uninitialize(|| async { 7 }).await;
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_lock_released_after_panic() {
        let lock = Arc::new(AwaitLock::new());

        let panicking = {
            let lock = lock.clone();
            tokio::spawn(async move {
                lock.initialize(|| async {
                    panic!("callback failed");
                })
                .await;
            })
        };
        assert!(panicking.await.is_err());
        assert!(!lock.is_locked());
        lock.initialize(|| async {}).await;
    }
}
