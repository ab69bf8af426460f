use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use docbase::{
    CursorRequest, DocbaseResult, Document, DocumentStore, EntityModel, Filter, FilterOperator,
    ListenTarget, ListenerId, MemoryStore, OrderDirection, PageRequest, QueryDefinition,
    Repository, StoreListener, Value,
};

#[derive(Clone, Debug, PartialEq)]
struct Item {
    id: String,
    name: String,
    rank: i64,
}

impl EntityModel for Item {
    fn to_fields(&self) -> BTreeMap<String, Value> {
        let mut fields = BTreeMap::new();
        fields.insert("name".to_string(), Value::from_string(self.name.clone()));
        fields.insert("rank".to_string(), Value::from_integer(self.rank));
        fields
    }

    fn from_document(document: &Document) -> DocbaseResult<Self> {
        Ok(Self {
            id: document.id().to_string(),
            name: document.string("name")?.unwrap_or_default().to_string(),
            rank: document.integer("rank")?.unwrap_or_default(),
        })
    }
}

fn items() -> Repository<Item> {
    Repository::new(Arc::new(MemoryStore::new()), "items")
}

async fn seed(repository: &Repository<Item>, count: i64) {
    for rank in 0..count {
        repository
            .create(&Item {
                id: String::new(),
                name: format!("item-{rank:02}"),
                rank,
            })
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn pages_partition_the_ordered_result_set() {
    let repository = items();
    seed(&repository, 25).await;

    let mut collected = Vec::new();
    for page in 1..=3 {
        let result = repository
            .find_paginated(
                Vec::new(),
                PageRequest::new(page, 10).order_by("rank", OrderDirection::Ascending),
            )
            .await
            .unwrap();

        assert_eq!(result.pagination.page, page);
        assert_eq!(result.pagination.limit, 10);
        assert_eq!(result.pagination.total, 25);
        assert_eq!(result.pagination.total_pages, 3);
        collected.extend(result.data.into_iter().map(|item| item.rank));
    }

    assert_eq!(collected, (0..25).collect::<Vec<i64>>());
}

#[tokio::test]
async fn pages_past_the_end_are_empty_with_intact_metadata() {
    let repository = items();
    seed(&repository, 25).await;

    let result = repository
        .find_paginated(
            Vec::new(),
            PageRequest::new(4, 10).order_by("rank", OrderDirection::Ascending),
        )
        .await
        .unwrap();

    assert!(result.data.is_empty());
    assert_eq!(result.pagination.total, 25);
    assert_eq!(result.pagination.total_pages, 3);
}

#[tokio::test]
async fn pagination_respects_filters() {
    let repository = items();
    seed(&repository, 10).await;

    let even = vec![Filter::new(
        "rank",
        FilterOperator::In,
        Value::from_array(vec![
            Value::from_integer(0),
            Value::from_integer(2),
            Value::from_integer(4),
            Value::from_integer(6),
            Value::from_integer(8),
        ]),
    )];
    let result = repository
        .find_paginated(
            even,
            PageRequest::new(2, 2).order_by("rank", OrderDirection::Ascending),
        )
        .await
        .unwrap();

    let ranks: Vec<i64> = result.data.iter().map(|item| item.rank).collect();
    assert_eq!(ranks, [4, 6]);
    assert_eq!(result.pagination.total, 5);
    assert_eq!(result.pagination.total_pages, 3);
}

struct UnreachableStore;

#[async_trait]
impl DocumentStore for UnreachableStore {
    async fn insert(
        &self,
        _collection: &str,
        _fields: BTreeMap<String, Value>,
    ) -> DocbaseResult<String> {
        unreachable!("request validation must reject before the store is reached")
    }

    async fn get(&self, _collection: &str, _id: &str) -> DocbaseResult<Option<Document>> {
        unreachable!("request validation must reject before the store is reached")
    }

    async fn update(
        &self,
        _collection: &str,
        _id: &str,
        _fields: BTreeMap<String, Value>,
    ) -> DocbaseResult<()> {
        unreachable!("request validation must reject before the store is reached")
    }

    async fn delete(&self, _collection: &str, _id: &str) -> DocbaseResult<()> {
        unreachable!("request validation must reject before the store is reached")
    }

    async fn run_query(&self, _query: &QueryDefinition) -> DocbaseResult<Vec<Document>> {
        unreachable!("request validation must reject before the store is reached")
    }

    async fn run_count(&self, _query: &QueryDefinition) -> DocbaseResult<u64> {
        unreachable!("request validation must reject before the store is reached")
    }

    fn listen(&self, _target: ListenTarget, _listener: StoreListener) -> ListenerId {
        unreachable!("request validation must reject before the store is reached")
    }

    fn unlisten(&self, _listener_id: ListenerId) {}
}

#[tokio::test]
async fn invalid_page_requests_never_reach_the_store() {
    let repository: Repository<Item> = Repository::new(Arc::new(UnreachableStore), "items");

    let err = repository
        .find_paginated(Vec::new(), PageRequest::new(0, 10))
        .await
        .unwrap_err();
    assert_eq!(err.code_str(), "docbase/invalid-argument");

    let err = repository
        .find_paginated(Vec::new(), PageRequest::new(1, 0))
        .await
        .unwrap_err();
    assert_eq!(err.code_str(), "docbase/invalid-argument");

    let err = repository
        .find_page(Vec::new(), CursorRequest::new(0))
        .await
        .unwrap_err();
    assert_eq!(err.code_str(), "docbase/invalid-argument");
}

#[tokio::test]
async fn token_walk_visits_every_item_exactly_once() {
    let repository = items();
    seed(&repository, 9).await;

    let mut request = CursorRequest::new(4).order_by("rank", OrderDirection::Ascending);
    let mut seen = Vec::new();
    let mut pages = 0;
    loop {
        let page = repository
            .find_page(Vec::new(), request.clone())
            .await
            .unwrap();
        seen.extend(page.items.iter().map(|item| item.rank));
        pages += 1;
        assert!(pages <= 4, "token walk failed to terminate");

        match page.next_page {
            Some(token) => {
                request = CursorRequest::new(4)
                    .order_by("rank", OrderDirection::Ascending)
                    .after(token);
            }
            None => break,
        }
    }

    assert_eq!(seen, (0..9).collect::<Vec<i64>>());
    assert_eq!(pages, 3);
}

#[tokio::test]
async fn token_walk_without_an_ordering_pages_by_id() {
    let repository = items();
    seed(&repository, 5).await;

    let first = repository
        .find_page(Vec::new(), CursorRequest::new(3))
        .await
        .unwrap();
    assert_eq!(first.items.len(), 3);
    let token = first.next_page.expect("full page mints a token");

    let second = repository
        .find_page(Vec::new(), CursorRequest::new(3).after(token))
        .await
        .unwrap();
    assert_eq!(second.items.len(), 2);
    assert!(second.next_page.is_none());

    let mut ids: Vec<String> = first
        .items
        .iter()
        .chain(second.items.iter())
        .map(|item| item.id.clone())
        .collect();
    let before = ids.clone();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 5);
    assert_eq!(before, ids, "pages follow ascending id order");
}

#[tokio::test]
async fn page_tokens_bind_to_the_query_they_were_minted_for() {
    let repository = items();
    seed(&repository, 5).await;

    let first = repository
        .find_page(
            Vec::new(),
            CursorRequest::new(2).order_by("rank", OrderDirection::Ascending),
        )
        .await
        .unwrap();
    let token = first.next_page.expect("full page mints a token");

    let err = repository
        .find_page(
            Vec::new(),
            CursorRequest::new(2)
                .order_by("rank", OrderDirection::Descending)
                .after(token),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code_str(), "docbase/invalid-argument");
}
