//! The data store adapter.
//!
//! [`DataStore`] resolves documents through a [`DataSource`], parses them on
//! first use and serves every later read from its [`DocumentCache`].
//! Mutations are applied to a private copy, persisted atomically, then
//! swapped into the cache under a per-document lock.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use shopfloor_core::{DataSource, Error, Result};
use tokio::sync::Mutex;

use crate::cache::DocumentCache;
use crate::document::{self, Collection, DocumentKind};

/// Identifier draws before [`DataStore::append`] gives up.
const MAX_ID_ATTEMPTS: usize = 64;

// ============================================================================
// Lookup results
// ============================================================================

/// Result of an identifier lookup. Absence is a value, not an error.
#[derive(Clone, Debug, PartialEq)]
pub enum Lookup {
    /// The entity.
    Found(Value),
    /// No entity carries the requested identifier.
    NotFound(NotFound),
}

impl Lookup {
    /// The entity, if found.
    pub fn found(self) -> Option<Value> {
        match self {
            Self::Found(value) => Some(value),
            Self::NotFound(_) => None,
        }
    }

    /// Whether the lookup succeeded.
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }
}

/// Structured "not found" result returned to tool callers as data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NotFound {
    /// Always `false`.
    pub found: bool,
    /// Entity label ("machine", "SOP").
    pub entity: String,
    /// Identifier that was looked up.
    pub id: String,
    /// Human-readable message.
    pub message: String,
    /// Extra hints such as the list of available identifiers.
    #[serde(flatten)]
    pub context: Map<String, Value>,
}

impl NotFound {
    /// Create a not-found result for `entity` / `id`.
    pub fn new(entity: impl Into<String>, id: impl Into<String>) -> Self {
        let entity = entity.into();
        let id = id.into();
        Self {
            found: false,
            message: format!("{entity} '{id}' not found"),
            entity,
            id,
            context: Map::new(),
        }
    }

    /// Attach a context field.
    pub fn with_context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    /// JSON form of this result.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

// ============================================================================
// DataStore
// ============================================================================

/// Cached, concurrency-safe access to the domain documents.
pub struct DataStore {
    source: Arc<dyn DocumentRoot>,
    cache: DocumentCache,
    write_locks: HashMap<DocumentKind, Mutex<()>>,
}

/// Object-safe view of a [`DataSource`].
trait DocumentRoot: Send + Sync {
    fn path_of(&self, kind: DocumentKind) -> Result<PathBuf>;
}

struct SourceRoot<S>(S);

impl<S: DataSource> DocumentRoot for SourceRoot<S> {
    fn path_of(&self, kind: DocumentKind) -> Result<PathBuf> {
        self.0.document_path(kind.relative_path())
    }
}

impl std::fmt::Debug for DataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataStore").finish_non_exhaustive()
    }
}

impl DataStore {
    /// Create a store reading documents from `source`.
    pub fn new<S: DataSource>(source: S) -> Self {
        let write_locks = DocumentKind::ALL
            .iter()
            .map(|kind| (*kind, Mutex::new(())))
            .collect();
        Self {
            source: Arc::new(SourceRoot(source)),
            cache: DocumentCache::new(),
            write_locks,
        }
    }

    /// Path of a document on disk.
    pub fn document_path(&self, kind: DocumentKind) -> Result<PathBuf> {
        self.source.path_of(kind)
    }

    /// Load a document, from cache when possible.
    ///
    /// # Errors
    ///
    /// `DataUnavailable` when the file is missing or unreadable,
    /// `DataCorrupt` when it does not parse.
    pub async fn load(&self, kind: DocumentKind) -> Result<Arc<Value>> {
        if let Some(content) = self.cache.get(kind).await {
            return Ok(content);
        }

        let path = self.document_path(kind)?;
        let content = read_document(&path).await?;
        log::debug!("Loaded {kind} document from {}", path.display());
        Ok(self.cache.insert_if_absent(kind, content).await)
    }

    /// Look up an entity by exact identifier match.
    pub async fn get_by_id(&self, collection: &Collection, id: &str) -> Result<Lookup> {
        let doc = self.load(collection.document).await?;
        let hit = document::entities(&doc, collection.name)
            .iter()
            .find(|entity| collection.id_of(entity) == Some(id));
        Ok(match hit {
            Some(entity) => Lookup::Found(entity.clone()),
            None => Lookup::NotFound(NotFound::new(collection.entity, id)),
        })
    }

    /// Whether an entity with `id` exists.
    pub async fn exists(&self, collection: &Collection, id: &str) -> Result<bool> {
        Ok(self.get_by_id(collection, id).await?.is_found())
    }

    /// Entities of a collection matching `predicate`, in document order.
    pub async fn query<P>(&self, collection: &Collection, predicate: P) -> Result<Vec<Value>>
    where
        P: Fn(&Value) -> bool,
    {
        let doc = self.load(collection.document).await?;
        Ok(document::entities(&doc, collection.name)
            .iter()
            .filter(|entity| predicate(entity))
            .cloned()
            .collect())
    }

    /// Every entity of a collection.
    pub async fn all(&self, collection: &Collection) -> Result<Vec<Value>> {
        self.query(collection, |_| true).await
    }

    /// A keyed section of a document, `{}` when absent.
    pub async fn section(&self, kind: DocumentKind, key: &str) -> Result<Value> {
        let doc = self.load(kind).await?;
        Ok(document::section(&doc, key))
    }

    /// Drop one cached document, or all of them.
    pub async fn clear_cache(&self, kind: Option<DocumentKind>) {
        match kind {
            Some(kind) => log::debug!("Clearing cached {kind} document"),
            None => log::debug!("Clearing document cache"),
        }
        self.cache.clear(kind).await;
    }

    /// Apply `f` to a copy of the document, persist it, then publish it.
    ///
    /// Mutations of the same document are serialized. If `f` fails or the
    /// write fails, neither the file nor the cache changes.
    pub async fn mutate<T, F>(&self, kind: DocumentKind, f: F) -> Result<T>
    where
        F: FnOnce(&mut Value) -> Result<T>,
    {
        let lock = self
            .write_locks
            .get(&kind)
            .ok_or_else(|| Error::operation(format!("no write lock for {kind} document")))?;
        let _guard = lock.lock().await;

        let current = self.load(kind).await?;
        let mut next = (*current).clone();
        let out = f(&mut next)?;

        let path = self.document_path(kind)?;
        write_document(&path, &next).await?;
        self.cache.replace(kind, Arc::new(next)).await;
        log::debug!("Persisted {kind} document to {}", path.display());
        Ok(out)
    }

    /// Append an entity to a collection and persist the document.
    ///
    /// The entity's identifier field is set from `next_id`, which is drawn
    /// again while the identifier is already taken. Returns the stored
    /// entity.
    pub async fn append<G>(&self, collection: &Collection, mut entity: Value, mut next_id: G) -> Result<Value>
    where
        G: FnMut() -> String,
    {
        self.mutate(collection.document, |doc| {
            let entities = document::entities_mut(doc, collection.name)?;
            let taken = |id: &str| {
                entities
                    .iter()
                    .any(|e| e.get(collection.id_field).and_then(Value::as_str) == Some(id))
            };
            let id = std::iter::repeat_with(&mut next_id)
                .take(MAX_ID_ATTEMPTS)
                .find(|id| !taken(id.as_str()))
                .ok_or_else(|| {
                    Error::operation(format!("no free {} identifier found", collection.entity))
                })?;

            let fields = entity.as_object_mut().ok_or_else(|| {
                Error::operation(format!("{} must be a JSON object", collection.entity))
            })?;
            fields.insert(collection.id_field.to_string(), Value::String(id));
            entities.push(entity.clone());
            Ok(entity)
        })
        .await
    }
}

// ============================================================================
// File I/O
// ============================================================================

async fn read_document(path: &Path) -> Result<Value> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| Error::data_unavailable(path, e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| Error::data_corrupt(path, e.to_string()))
}

async fn write_document(path: &Path, content: &Value) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(content)?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, &bytes)
        .await
        .map_err(|e| Error::io_with_path(e, &tmp))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| Error::io_with_path(e, path))
}
