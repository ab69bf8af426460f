//! Typed repository layer over a [`DocumentStore`].
//!
//! A [`Repository`] binds an entity type to one named collection and exposes
//! CRUD, filtered queries, aggregate counts, offset and cursor pagination,
//! and live subscriptions. It holds the store behind `Arc<dyn DocumentStore>`,
//! so any number of repositories can share one store instance.

mod pagination;
mod subscription;

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::{invalid_argument, DocbaseError, DocbaseResult};
use crate::model::{Document, Value};
use crate::query::{Filter, QueryDefinition, QueryOptions};
use crate::store::{
    DocumentStore, ErrorCallback, ListenTarget, SnapshotCallback, StoreEvent, StoreListener,
};

pub use pagination::{CursorRequest, Page, PageInfo, PageRequest, PageToken, Paginated};
pub use subscription::{Snapshots, Subscription};

use subscription::{DeliveryState, ErrorSlot};

const CREATED_AT_FIELD: &str = "created_at";
const UPDATED_AT_FIELD: &str = "updated_at";

/// Conversion between an entity type and its stored field map.
///
/// `to_fields` never includes the identifier; the store assigns ids and the
/// snapshot carries them back. `from_document` rebuilds the entity from a
/// snapshot, converting timestamp fields through the typed accessors.
pub trait EntityModel: Clone + Send + Sync + 'static {
    fn to_fields(&self) -> BTreeMap<String, Value>;

    fn from_document(document: &Document) -> DocbaseResult<Self>;
}

/// Data access for one entity type in one collection.
#[derive(Clone)]
pub struct Repository<M> {
    store: Arc<dyn DocumentStore>,
    collection: String,
    audit_fields: bool,
    _model: PhantomData<fn() -> M>,
}

impl<M: EntityModel> Repository<M> {
    pub fn new(store: Arc<dyn DocumentStore>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
            audit_fields: false,
            _model: PhantomData,
        }
    }

    /// Stamps `created_at`/`updated_at` server timestamps on `create` and
    /// refreshes `updated_at` on every `update`. Values the caller supplies
    /// under those keys win over the stamp.
    pub fn with_audit_fields(mut self) -> Self {
        self.audit_fields = true;
        self
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Persists a new entity and returns the store-assigned id. Whatever id
    /// the model itself carries is ignored.
    pub async fn create(&self, model: &M) -> DocbaseResult<String> {
        let mut fields = model.to_fields();
        if self.audit_fields {
            fields
                .entry(CREATED_AT_FIELD.to_string())
                .or_insert_with(Value::server_timestamp);
            fields
                .entry(UPDATED_AT_FIELD.to_string())
                .or_insert_with(Value::server_timestamp);
        }
        self.store.insert(&self.collection, fields).await
    }

    /// Absence is `Ok(None)`, not an error.
    pub async fn find_by_id(&self, id: &str) -> DocbaseResult<Option<M>> {
        match self.store.get(&self.collection, id).await? {
            Some(document) => Ok(Some(M::from_document(&document)?)),
            None => Ok(None),
        }
    }

    /// Merges the given fields into an existing entity. Top-level keys
    /// replace; dotted keys merge at the addressed leaf inside nested maps.
    /// Fails with `NotFound` when the id does not exist.
    pub async fn update(&self, id: &str, mut fields: BTreeMap<String, Value>) -> DocbaseResult<()> {
        if fields.is_empty() {
            return Err(invalid_argument(
                "Update requires at least one field/value pair",
            ));
        }
        if self.audit_fields {
            fields
                .entry(UPDATED_AT_FIELD.to_string())
                .or_insert_with(Value::server_timestamp);
        }
        self.store.update(&self.collection, id, fields).await
    }

    /// Idempotent; deleting an id that does not exist succeeds.
    pub async fn delete(&self, id: &str) -> DocbaseResult<()> {
        self.store.delete(&self.collection, id).await
    }

    /// Every entity in the collection, in the store's default id order.
    pub async fn find_all(&self) -> DocbaseResult<Vec<M>> {
        self.find_where(Vec::new(), QueryOptions::default()).await
    }

    /// Every entity matching all filters, honoring the given ordering/limit.
    pub async fn find_where(
        &self,
        filters: Vec<Filter>,
        options: QueryOptions,
    ) -> DocbaseResult<Vec<M>> {
        let definition = QueryDefinition::from_options(&self.collection, filters, &options)?;
        let documents = self.store.run_query(&definition).await?;
        decode_documents(&documents)
    }

    /// Store-side aggregate count of entities matching all filters. No
    /// documents are downloaded.
    pub async fn count(&self, filters: Vec<Filter>) -> DocbaseResult<u64> {
        let definition =
            QueryDefinition::from_options(&self.collection, filters, &QueryOptions::default())?;
        self.store.run_count(&definition).await
    }

    pub async fn exists(&self, id: &str) -> DocbaseResult<bool> {
        Ok(self.store.get(&self.collection, id).await?.is_some())
    }

    /// Offset-flavor pagination with totals: one aggregate count for the
    /// metadata plus one windowed query for the page, both store-side.
    /// A page past the end yields empty `data` with intact metadata. The two
    /// reads are independent; callers needing a race-free walk should prefer
    /// [`Repository::find_page`].
    pub async fn find_paginated(
        &self,
        filters: Vec<Filter>,
        request: PageRequest,
    ) -> DocbaseResult<Paginated<M>> {
        request.validate()?;
        let offset = request.offset()?;

        let mut definition =
            QueryDefinition::from_options(&self.collection, filters, &QueryOptions::default())?;
        let total = self.store.run_count(&definition).await?;

        if let Some(order) = request.ordering() {
            definition = definition.with_order(order.clone())?;
        }
        let definition = definition.with_offset(offset).with_limit(request.limit())?;
        let documents = self.store.run_query(&definition).await?;

        Ok(Paginated {
            data: decode_documents(&documents)?,
            pagination: PageInfo::new(request.page(), request.limit(), total),
        })
    }

    /// Cursor-flavor pagination: results order by the requested key with id
    /// as tiebreak, the query resumes after the token's position, and
    /// `next_page` is `None` once a page comes back short.
    pub async fn find_page(
        &self,
        filters: Vec<Filter>,
        request: CursorRequest,
    ) -> DocbaseResult<Page<M>> {
        request.validate()?;

        let mut definition =
            QueryDefinition::from_options(&self.collection, filters, &QueryOptions::default())?;
        if let Some(order) = request.ordering() {
            definition = definition.with_order(order.clone())?;
        }
        let mut definition = definition.with_limit(request.limit())?;
        if let Some(token) = request.token() {
            let cursor = pagination::cursor_from_token(token, &definition)?;
            definition = definition.starting_after(cursor);
        }

        let documents = self.store.run_query(&definition).await?;
        let next_page = match documents.last() {
            Some(last) if documents.len() == request.limit() as usize => {
                Some(pagination::mint_token(&definition, last)?)
            }
            _ => None,
        };

        Ok(Page {
            items: decode_documents(&documents)?,
            next_page,
        })
    }

    /// Subscribes to the whole collection. `on_data` fires immediately with
    /// the current result set and again after every change; each call
    /// delivers the complete snapshot, never a diff. `on_error` fires at most
    /// once and terminates the subscription.
    pub fn subscribe_to_collection(
        &self,
        on_data: impl Fn(Vec<M>) + Send + Sync + 'static,
        on_error: impl FnOnce(DocbaseError) + Send + 'static,
    ) -> Subscription {
        self.subscribe(
            ListenTarget::Collection(self.collection.clone()),
            on_data,
            on_error,
        )
    }

    /// Subscribes to a single document: `Some(entity)` while it exists,
    /// `None` when absent or deleted while subscribed.
    pub fn subscribe_to_document(
        &self,
        id: &str,
        on_data: impl Fn(Option<M>) + Send + Sync + 'static,
        on_error: impl FnOnce(DocbaseError) + Send + 'static,
    ) -> Subscription {
        let target = ListenTarget::Document {
            collection: self.collection.clone(),
            id: id.to_string(),
        };
        self.subscribe(
            target,
            move |mut models: Vec<M>| on_data(models.pop()),
            on_error,
        )
    }

    /// Subscribes to the entities matching a filtered query, with the same
    /// snapshot semantics as [`Repository::subscribe_to_collection`].
    pub fn subscribe_to_query(
        &self,
        filters: Vec<Filter>,
        options: QueryOptions,
        on_data: impl Fn(Vec<M>) + Send + Sync + 'static,
        on_error: impl FnOnce(DocbaseError) + Send + 'static,
    ) -> Subscription {
        let definition = match QueryDefinition::from_options(&self.collection, filters, &options) {
            Ok(definition) => definition,
            Err(err) => {
                on_error(err);
                return Subscription::failed(Arc::clone(&self.store));
            }
        };
        self.subscribe(ListenTarget::Query(definition), on_data, on_error)
    }

    /// Stream adapter over [`Repository::subscribe_to_collection`]; dropping
    /// the stream unsubscribes.
    pub fn watch_collection(&self) -> Snapshots<Vec<M>> {
        let (sender, receiver) = async_channel::unbounded();
        let data_sender = sender.clone();
        let subscription = self.subscribe_to_collection(
            move |models| {
                let _ = data_sender.try_send(Ok(models));
            },
            move |err| {
                let _ = sender.try_send(Err(err));
                sender.close();
            },
        );
        Snapshots {
            receiver,
            _subscription: subscription,
        }
    }

    /// Stream adapter over [`Repository::subscribe_to_query`]. A query that
    /// fails to build yields a single `Err` item and ends the stream.
    pub fn watch_query(&self, filters: Vec<Filter>, options: QueryOptions) -> Snapshots<Vec<M>> {
        let (sender, receiver) = async_channel::unbounded();
        let data_sender = sender.clone();
        let subscription = self.subscribe_to_query(
            filters,
            options,
            move |models| {
                let _ = data_sender.try_send(Ok(models));
            },
            move |err| {
                let _ = sender.try_send(Err(err));
                sender.close();
            },
        );
        Snapshots {
            receiver,
            _subscription: subscription,
        }
    }

    /// Stream adapter over [`Repository::subscribe_to_document`].
    pub fn watch_document(&self, id: &str) -> Snapshots<Option<M>> {
        let (sender, receiver) = async_channel::unbounded();
        let data_sender = sender.clone();
        let subscription = self.subscribe_to_document(
            id,
            move |model| {
                let _ = data_sender.try_send(Ok(model));
            },
            move |err| {
                let _ = sender.try_send(Err(err));
                sender.close();
            },
        );
        Snapshots {
            receiver,
            _subscription: subscription,
        }
    }

    fn subscribe(
        &self,
        target: ListenTarget,
        on_data: impl Fn(Vec<M>) + Send + Sync + 'static,
        on_error: impl FnOnce(DocbaseError) + Send + 'static,
    ) -> Subscription {
        let delivery = DeliveryState::new();
        let errors = ErrorSlot::new(on_error);

        let event_delivery = Arc::clone(&delivery);
        let event_errors = Arc::clone(&errors);
        let on_event: SnapshotCallback = Arc::new(move |event: StoreEvent| {
            if !event_delivery.is_active() {
                return;
            }
            match decode_documents::<M>(event.documents()) {
                Ok(models) => on_data(models),
                Err(err) => {
                    // A snapshot that fails decoding ends the subscription the
                    // same way a store error does.
                    event_delivery.deactivate();
                    log::warn!("Subscription stopped by decode failure: {err}");
                    event_errors.fire(err);
                }
            }
        });

        let error_delivery = Arc::clone(&delivery);
        let on_store_error: ErrorCallback = Arc::new(move |err: DocbaseError| {
            error_delivery.deactivate();
            errors.fire(err);
        });

        let listener = StoreListener::new(on_event).with_error_handler(on_store_error);
        let listener_id = self.store.listen(target, listener);
        Subscription::new(Arc::clone(&self.store), listener_id, delivery)
    }
}

fn decode_documents<M: EntityModel>(documents: &[Document]) -> DocbaseResult<Vec<M>> {
    documents.iter().map(M::from_document).collect()
}
