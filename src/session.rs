//! Fetch lifetime guard.
//!
//! A view that goes away mid-fetch must drop the eventual result
//! instead of applying it. Fetches run bound to a [`Session`]; closing
//! the session lets in-flight work finish but discards its result.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::info;
use uuid::Uuid;

#[derive(Clone)]
pub struct Session {
    id: Uuid,
    open: Arc<AtomicBool>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            open: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Close the session. Idempotent.
    pub fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            info!("👋 [SESSION] {} closed", self.id);
        }
    }

    /// Run `fut` bound to this session. `None` means the session closed
    /// before the result could be applied; an already-closed session
    /// short-circuits without running the future at all.
    pub async fn bind<T>(&self, fut: impl Future<Output = T>) -> Option<T> {
        if !self.is_open() {
            return None;
        }
        let value = fut.await;
        if self.is_open() {
            Some(value)
        } else {
            info!("🚫 [SESSION] {} discarded a stale fetch result", self.id);
            None
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn open_session_applies_results() {
        let session = Session::new();
        assert_eq!(session.bind(async { 41 + 1 }).await, Some(42));
    }

    #[tokio::test]
    async fn closed_session_never_runs_the_fetch() {
        let session = Session::new();
        session.close();
        session.close();

        let ran = Arc::new(AtomicUsize::new(0));
        let counter = ran.clone();
        let result = session
            .bind(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                7
            })
            .await;
        assert_eq!(result, None);
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn result_arriving_after_close_is_discarded() {
        let session = Session::new();
        let (tx, rx) = tokio::sync::oneshot::channel::<u64>();

        let worker = {
            let session = session.clone();
            tokio::spawn(async move { session.bind(async { rx.await.unwrap() }).await })
        };

        // The view goes away while the fetch is still in flight.
        session.close();
        tx.send(99).unwrap();

        assert_eq!(worker.await.unwrap(), None);
    }

    #[tokio::test]
    async fn sessions_are_independent() {
        let a = Session::new();
        let b = Session::new();
        assert_ne!(a.id(), b.id());

        a.close();
        assert!(!a.is_open());
        assert!(b.is_open());
        assert_eq!(b.bind(async { "still here" }).await, Some("still here"));
    }
}
