//! Per-document mutual exclusion for processing runs.
//!
//! Two runs on the same document are serialized; runs on different documents
//! never contend. Entries are dropped once no run holds or waits on them.

use crate::document::DocumentId;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Registry of per-document locks.
#[derive(Debug, Default, Clone)]
pub struct ProcessingGuard {
    locks: Arc<DashMap<DocumentId, Arc<Mutex<()>>>>,
}

/// Held for the duration of one processing run.
#[derive(Debug)]
pub struct ProcessingPermit {
    document_id: DocumentId,
    locks: Arc<DashMap<DocumentId, Arc<Mutex<()>>>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl ProcessingPermit {
    /// Document this permit covers.
    pub fn document_id(&self) -> DocumentId {
        self.document_id
    }
}

impl Drop for ProcessingPermit {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Only the map holds the lock now: nobody is running or queued.
        self.locks
            .remove_if(&self.document_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl ProcessingGuard {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other run holds `document_id`, then take it.
    pub async fn acquire(&self, document_id: DocumentId) -> ProcessingPermit {
        let lock = self
            .locks
            .entry(document_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = lock.lock_owned().await;
        ProcessingPermit {
            document_id,
            locks: Arc::clone(&self.locks),
            guard: Some(guard),
        }
    }

    /// True while a run holds or waits on `document_id`.
    pub fn is_in_flight(&self, document_id: DocumentId) -> bool {
        self.locks.contains_key(&document_id)
    }

    /// Number of documents with a run in flight.
    pub fn in_flight(&self) -> usize {
        self.locks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use uuid::Uuid;

    #[tokio::test]
    async fn permit_release_clears_entry() {
        let guard = ProcessingGuard::new();
        let id = Uuid::new_v4();
        let permit = guard.acquire(id).await;
        assert_eq!(permit.document_id(), id);
        assert!(guard.is_in_flight(id));
        drop(permit);
        assert!(!guard.is_in_flight(id));
        assert_eq!(guard.in_flight(), 0);
    }

    #[tokio::test]
    async fn same_document_runs_are_serialized() {
        let guard = ProcessingGuard::new();
        let id = Uuid::new_v4();
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let guard = guard.clone();
            let active = active.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                let _permit = guard.acquire(id).await;
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert!(!guard.is_in_flight(id));
    }

    #[tokio::test]
    async fn different_documents_do_not_contend() {
        let guard = ProcessingGuard::new();
        let a = guard.acquire(Uuid::new_v4()).await;
        let b = tokio::time::timeout(Duration::from_secs(1), guard.acquire(Uuid::new_v4())).await;
        assert!(b.is_ok());
        assert_eq!(guard.in_flight(), 2);
        drop(a);
    }
}
