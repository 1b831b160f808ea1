//! In-memory document cache.
//!
//! Holds one parsed tree per [`DocumentKind`]. Readers share the tree behind
//! an `Arc`; writers replace the whole entry, so a reader never observes a
//! half-applied mutation.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;

use crate::document::DocumentKind;

/// Map from document kind to its parsed tree.
#[derive(Debug, Default)]
pub struct DocumentCache {
    entries: RwLock<HashMap<DocumentKind, Arc<Value>>>,
}

impl DocumentCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached tree for `kind`, if present.
    pub async fn get(&self, kind: DocumentKind) -> Option<Arc<Value>> {
        self.entries.read().await.get(&kind).map(Arc::clone)
    }

    /// Insert a freshly parsed tree unless another loader got there first.
    ///
    /// Returns whichever tree is cached afterwards.
    pub async fn insert_if_absent(&self, kind: DocumentKind, content: Value) -> Arc<Value> {
        let mut entries = self.entries.write().await;
        let entry = entries.entry(kind).or_insert_with(|| Arc::new(content));
        Arc::clone(entry)
    }

    /// Replace the cached tree after a successful write.
    pub async fn replace(&self, kind: DocumentKind, content: Arc<Value>) {
        self.entries.write().await.insert(kind, content);
    }

    /// Drop one entry, or every entry when `kind` is `None`.
    pub async fn clear(&self, kind: Option<DocumentKind>) {
        let mut entries = self.entries.write().await;
        match kind {
            Some(kind) => {
                entries.remove(&kind);
            }
            None => entries.clear(),
        }
    }
}
