use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{DocbaseError, DocbaseResult};
use crate::model::{Document, Value};
use crate::query::QueryDefinition;

pub mod codec;
pub(crate) mod evaluator;
mod memory;

pub use memory::MemoryStore;

pub type ListenerId = u64;

pub type SnapshotCallback = Arc<dyn Fn(StoreEvent) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(DocbaseError) + Send + Sync>;

/// What a live listener observes.
#[derive(Clone, Debug)]
pub enum ListenTarget {
    /// Every document of a collection.
    Collection(String),
    /// One document by id; deliveries carry zero or one documents.
    Document { collection: String, id: String },
    /// The matching set of a filtered query.
    Query(QueryDefinition),
}

impl ListenTarget {
    pub(crate) fn collection_name(&self) -> &str {
        match self {
            ListenTarget::Collection(name) => name,
            ListenTarget::Document { collection, .. } => collection,
            ListenTarget::Query(definition) => definition.collection_name(),
        }
    }
}

/// One delivery to a listener: the complete authoritative result set for the
/// target as of a commit, never an incremental diff.
#[derive(Clone, Debug)]
pub struct StoreEvent {
    documents: Vec<Document>,
}

impl StoreEvent {
    pub fn new(documents: Vec<Document>) -> Self {
        Self { documents }
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn into_documents(self) -> Vec<Document> {
        self.documents
    }
}

/// Snapshot callback plus an optional error channel. Store implementations
/// deliver registration-time and transport failures through the error
/// channel; after an error the listener is dead and receives nothing more.
#[derive(Clone)]
pub struct StoreListener {
    on_event: SnapshotCallback,
    on_error: Option<ErrorCallback>,
}

impl StoreListener {
    pub fn new(on_event: SnapshotCallback) -> Self {
        Self {
            on_event,
            on_error: None,
        }
    }

    pub fn with_error_handler(mut self, on_error: ErrorCallback) -> Self {
        self.on_error = Some(on_error);
        self
    }

    pub(crate) fn on_event(&self) -> &SnapshotCallback {
        &self.on_event
    }

    pub(crate) fn emit_error(&self, error: DocbaseError) {
        if let Some(on_error) = &self.on_error {
            (on_error)(error);
        }
    }
}

/// The document store a repository executes against.
///
/// `insert` assigns ids on the store side; `update` merges the supplied
/// fields into an existing document (dotted keys merge at the addressed leaf)
/// and fails with not-found when the id is unknown; `delete` is idempotent.
/// `run_count` aggregates over the definition's filters without materializing
/// documents. Listener registration is synchronous and infallible: anything
/// wrong with a live target (including a malformed query) reaches the
/// listener's error channel instead, and `unlisten` ignores unknown ids.
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    async fn insert(
        &self,
        collection: &str,
        fields: BTreeMap<String, Value>,
    ) -> DocbaseResult<String>;

    async fn get(&self, collection: &str, id: &str) -> DocbaseResult<Option<Document>>;

    async fn update(
        &self,
        collection: &str,
        id: &str,
        fields: BTreeMap<String, Value>,
    ) -> DocbaseResult<()>;

    async fn delete(&self, collection: &str, id: &str) -> DocbaseResult<()>;

    async fn run_query(&self, query: &QueryDefinition) -> DocbaseResult<Vec<Document>>;

    async fn run_count(&self, query: &QueryDefinition) -> DocbaseResult<u64>;

    fn listen(&self, target: ListenTarget, listener: StoreListener) -> ListenerId;

    fn unlisten(&self, listener_id: ListenerId);
}
