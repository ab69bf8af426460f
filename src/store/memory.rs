use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::{invalid_argument, not_found, DocbaseResult};
use crate::model::{Document, Timestamp, Value, ValueKind};
use crate::query::QueryDefinition;
use crate::store::evaluator;
use crate::store::{
    DocumentStore, ListenTarget, ListenerId, SnapshotCallback, StoreEvent, StoreListener,
};

type Fields = BTreeMap<String, Value>;
type Dispatch = (SnapshotCallback, StoreEvent);

struct ListenerEntry {
    target: ListenTarget,
    listener: StoreListener,
    /// Last delivered result set; a commit that leaves it unchanged is not a
    /// matching change and produces no delivery.
    last: Vec<Document>,
}

#[derive(Default)]
struct State {
    collections: BTreeMap<String, BTreeMap<String, Fields>>,
    listeners: BTreeMap<ListenerId, ListenerEntry>,
}

/// In-process implementation of [`DocumentStore`].
///
/// All state sits under one mutex, so a commit and the snapshot computation
/// for affected listeners are atomic. Listener callbacks never run under that
/// lock: deliveries are queued in commit order while the lock is held and
/// drained by whichever thread holds the drain flag, which keeps
/// per-listener delivery order equal to commit order.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    pending: Mutex<VecDeque<Dispatch>>,
    draining: AtomicBool,
    next_listener_id: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn queue_notifications(&self, state: &mut State, collection: &str, changed_id: &str) {
        let mut updates: Vec<(ListenerId, Vec<Document>)> = Vec::new();
        for (id, entry) in &state.listeners {
            if entry.target.collection_name() != collection {
                continue;
            }
            if let ListenTarget::Document { id: listened, .. } = &entry.target {
                if listened != changed_id {
                    continue;
                }
            }
            let documents = current_documents(state, &entry.target);
            if documents != entry.last {
                updates.push((*id, documents));
            }
        }

        let mut pending = self.pending.lock().unwrap();
        for (id, documents) in updates {
            if let Some(entry) = state.listeners.get_mut(&id) {
                entry.last = documents.clone();
                pending.push_back((
                    Arc::clone(entry.listener.on_event()),
                    StoreEvent::new(documents),
                ));
            }
        }
    }

    fn drain_pending(&self) {
        loop {
            if self.draining.swap(true, Ordering::SeqCst) {
                // Another thread is draining and will pick our entries up.
                return;
            }
            loop {
                let next = self.pending.lock().unwrap().pop_front();
                match next {
                    Some((callback, event)) => (callback)(event),
                    None => break,
                }
            }
            self.draining.store(false, Ordering::SeqCst);
            if self.pending.lock().unwrap().is_empty() {
                return;
            }
            // Entries raced in between the empty check and the flag reset.
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert(&self, collection: &str, fields: Fields) -> DocbaseResult<String> {
        let fields = resolve_sentinels(fields, Timestamp::now())?;
        let mut state = self.state.lock().unwrap();
        let documents = state.collections.entry(collection.to_string()).or_default();
        let mut id = generate_document_id();
        while documents.contains_key(&id) {
            id = generate_document_id();
        }
        documents.insert(id.clone(), fields);
        self.queue_notifications(&mut state, collection, &id);
        drop(state);
        self.drain_pending();
        Ok(id)
    }

    async fn get(&self, collection: &str, id: &str) -> DocbaseResult<Option<Document>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .collections
            .get(collection)
            .and_then(|documents| documents.get(id))
            .map(|fields| Document::new(id, fields.clone())))
    }

    async fn update(&self, collection: &str, id: &str, fields: Fields) -> DocbaseResult<()> {
        let fields = resolve_sentinels(fields, Timestamp::now())?;
        let mut state = self.state.lock().unwrap();
        let existing = state
            .collections
            .get_mut(collection)
            .and_then(|documents| documents.get_mut(id))
            .ok_or_else(|| not_found(format!("Document {collection}/{id} does not exist")))?;

        let mut updated = existing.clone();
        for (path, value) in fields {
            set_value_at_path(&mut updated, &path, value);
        }
        *existing = updated;

        self.queue_notifications(&mut state, collection, id);
        drop(state);
        self.drain_pending();
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> DocbaseResult<()> {
        let mut state = self.state.lock().unwrap();
        let removed = state
            .collections
            .get_mut(collection)
            .and_then(|documents| documents.remove(id))
            .is_some();
        if removed {
            self.queue_notifications(&mut state, collection, id);
        }
        drop(state);
        self.drain_pending();
        Ok(())
    }

    async fn run_query(&self, query: &QueryDefinition) -> DocbaseResult<Vec<Document>> {
        evaluator::validate_query(query)?;
        let documents = {
            let state = self.state.lock().unwrap();
            collection_documents(&state, query.collection_name())
        };
        Ok(evaluator::apply_query(documents, query))
    }

    async fn run_count(&self, query: &QueryDefinition) -> DocbaseResult<u64> {
        evaluator::validate_query(query)?;
        let state = self.state.lock().unwrap();
        let count = state
            .collections
            .get(query.collection_name())
            .map(|documents| {
                documents
                    .iter()
                    .filter(|(id, fields)| {
                        let document = Document::new(id.as_str(), (*fields).clone());
                        evaluator::document_matches(&document, query.filters())
                    })
                    .count()
            })
            .unwrap_or(0);
        Ok(count as u64)
    }

    fn listen(&self, target: ListenTarget, listener: StoreListener) -> ListenerId {
        let id = self.next_listener_id.fetch_add(1, Ordering::SeqCst);
        if let ListenTarget::Query(definition) = &target {
            if let Err(err) = evaluator::validate_query(definition) {
                log::warn!(
                    "Listener {id} on '{}' rejected: {err}",
                    definition.collection_name()
                );
                listener.emit_error(err);
                return id;
            }
        }

        let mut state = self.state.lock().unwrap();
        let documents = current_documents(&state, &target);
        let callback = Arc::clone(listener.on_event());
        let event = StoreEvent::new(documents.clone());
        state.listeners.insert(
            id,
            ListenerEntry {
                target,
                listener,
                last: documents,
            },
        );
        self.pending.lock().unwrap().push_back((callback, event));
        drop(state);
        log::debug!("Registered listener {id}");
        self.drain_pending();
        id
    }

    fn unlisten(&self, listener_id: ListenerId) {
        let removed = self
            .state
            .lock()
            .unwrap()
            .listeners
            .remove(&listener_id)
            .is_some();
        if removed {
            log::debug!("Removed listener {listener_id}");
        }
    }
}

fn current_documents(state: &State, target: &ListenTarget) -> Vec<Document> {
    match target {
        ListenTarget::Collection(name) => collection_documents(state, name),
        ListenTarget::Document { collection, id } => state
            .collections
            .get(collection)
            .and_then(|documents| documents.get(id))
            .map(|fields| vec![Document::new(id.as_str(), fields.clone())])
            .unwrap_or_default(),
        ListenTarget::Query(definition) => evaluator::apply_query(
            collection_documents(state, definition.collection_name()),
            definition,
        ),
    }
}

fn collection_documents(state: &State, collection: &str) -> Vec<Document> {
    state
        .collections
        .get(collection)
        .map(|documents| {
            documents
                .iter()
                .map(|(id, fields)| Document::new(id.as_str(), fields.clone()))
                .collect()
        })
        .unwrap_or_default()
}

fn generate_document_id() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .map(char::from)
        .take(20)
        .collect()
}

/// Resolves server-timestamp sentinels against one clock reading, so every
/// stamp in a single write shares the same instant.
fn resolve_sentinels(fields: Fields, now: Timestamp) -> DocbaseResult<Fields> {
    let mut resolved = BTreeMap::new();
    for (key, value) in fields {
        resolved.insert(key, resolve_value(value, now)?);
    }
    Ok(resolved)
}

fn resolve_value(value: Value, now: Timestamp) -> DocbaseResult<Value> {
    match value.kind() {
        ValueKind::ServerTimestamp => Ok(Value::from_timestamp(now)),
        ValueKind::Map(map) => {
            let mut resolved = BTreeMap::new();
            for (key, child) in map {
                resolved.insert(key.clone(), resolve_value(child.clone(), now)?);
            }
            Ok(Value::from_map(resolved))
        }
        ValueKind::Array(values) => {
            if values.iter().any(contains_sentinel) {
                return Err(invalid_argument(
                    "Sentinel values are not supported inside arrays",
                ));
            }
            Ok(value)
        }
        _ => Ok(value),
    }
}

fn contains_sentinel(value: &Value) -> bool {
    match value.kind() {
        ValueKind::ServerTimestamp => true,
        ValueKind::Array(values) => values.iter().any(contains_sentinel),
        ValueKind::Map(map) => map.values().any(contains_sentinel),
        _ => false,
    }
}

fn set_value_at_path(fields: &mut Fields, path: &str, value: Value) {
    let segments: Vec<&str> = path.split('.').collect();
    set_value_at_segments(fields, &segments, value);
}

fn set_value_at_segments(fields: &mut Fields, segments: &[&str], value: Value) {
    if segments.is_empty() {
        return;
    }

    if segments.len() == 1 {
        fields.insert(segments[0].to_string(), value);
        return;
    }

    let entry = fields
        .entry(segments[0].to_string())
        .or_insert_with(|| Value::from_map(BTreeMap::new()));

    let mut child_fields = match entry.kind() {
        ValueKind::Map(map) => map.clone(),
        _ => BTreeMap::new(),
    };

    set_value_at_segments(&mut child_fields, &segments[1..], value);
    *entry = Value::from_map(child_fields);
}
