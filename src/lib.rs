#![doc = include_str!("RUSTDOC.md")]

pub mod error;
pub mod model;
pub mod query;
pub mod repository;
pub mod store;

pub use error::{DocbaseError, DocbaseErrorCode, DocbaseResult};
pub use model::{Document, Timestamp, Value, ValueKind};
pub use query::{Filter, FilterOperator, OrderBy, OrderDirection, QueryDefinition, QueryOptions};
pub use repository::{
    CursorRequest, EntityModel, Page, PageInfo, PageRequest, PageToken, Paginated, Repository,
    Snapshots, Subscription,
};
pub use store::{
    DocumentStore, ErrorCallback, ListenTarget, ListenerId, MemoryStore, SnapshotCallback,
    StoreEvent, StoreListener,
};
