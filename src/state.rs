use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::processing::types::{DocumentFailure, DocumentOutcome, ProcessedDocument};

/// Thread-safe record of ingestion activity since startup.
///
/// Counters are atomics; the recent-document history is a bounded ring buffer and the failure
/// list grows without bound until the process exits.
pub struct ProcessingState {
    documents_processed: AtomicU64,
    documents_unchanged: AtomicU64,
    chunks_indexed: AtomicU64,
    runs_completed: AtomicU64,
    recent_capacity: usize,
    recent: Mutex<VecDeque<RecentDocument>>,
    failures: Mutex<Vec<DocumentFailure>>,
}

impl ProcessingState {
    /// Create an empty tracker remembering at most `recent_capacity` processed documents.
    pub fn new(recent_capacity: usize) -> Self {
        Self {
            documents_processed: AtomicU64::new(0),
            documents_unchanged: AtomicU64::new(0),
            chunks_indexed: AtomicU64::new(0),
            runs_completed: AtomicU64::new(0),
            recent_capacity,
            recent: Mutex::new(VecDeque::with_capacity(recent_capacity)),
            failures: Mutex::new(Vec::new()),
        }
    }

    /// Record a successfully processed document.
    pub fn record_document(&self, document: &ProcessedDocument, processed_at: String) {
        match document.outcome {
            DocumentOutcome::Indexed => {
                self.documents_processed.fetch_add(1, Ordering::Relaxed);
                self.chunks_indexed
                    .fetch_add(document.embeddings as u64, Ordering::Relaxed);
            }
            DocumentOutcome::Unchanged => {
                self.documents_unchanged.fetch_add(1, Ordering::Relaxed);
            }
        }

        if self.recent_capacity == 0 {
            return;
        }
        let mut recent = self.recent.lock().unwrap_or_else(|e| e.into_inner());
        if recent.len() == self.recent_capacity {
            recent.pop_front();
        }
        recent.push_back(RecentDocument {
            namespace: document.namespace.clone(),
            filename: document.filename.clone(),
            chunks: document.chunks,
            outcome: document.outcome,
            processed_at,
        });
    }

    /// Record a document whose pipeline failed.
    pub fn record_failure(&self, failure: DocumentFailure) {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(failure);
    }

    /// Record the end of a full ingestion run.
    pub fn record_run(&self) {
        self.runs_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a copy of the current state.
    pub fn snapshot(&self) -> StateSnapshot {
        let recent = self
            .recent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .rev()
            .cloned()
            .collect();
        let failures = self
            .failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        StateSnapshot {
            documents_processed: self.documents_processed.load(Ordering::Relaxed),
            documents_unchanged: self.documents_unchanged.load(Ordering::Relaxed),
            chunks_indexed: self.chunks_indexed.load(Ordering::Relaxed),
            runs_completed: self.runs_completed.load(Ordering::Relaxed),
            recent,
            failures,
        }
    }
}

/// Entry of the recent-document history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecentDocument {
    /// Namespace of the document.
    pub namespace: String,
    /// Name of the document.
    pub filename: String,
    /// Chunks produced for it.
    pub chunks: usize,
    /// Whether the index changed.
    pub outcome: DocumentOutcome,
    /// RFC3339 timestamp of completion.
    pub processed_at: String,
}

/// Immutable view of ingestion state used for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct StateSnapshot {
    /// Documents embedded and written since startup.
    pub documents_processed: u64,
    /// Documents skipped because their content was already indexed.
    pub documents_unchanged: u64,
    /// Chunks written since startup.
    pub chunks_indexed: u64,
    /// Full ingestion runs completed.
    pub runs_completed: u64,
    /// Most recently processed documents, newest first.
    pub recent: Vec<RecentDocument>,
    /// Every recorded document failure, oldest first.
    pub failures: Vec<DocumentFailure>,
}
