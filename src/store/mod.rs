// src/store/mod.rs

//! The storage abstraction every subsystem persists through (spec.md
//! section 4.A). The core never speaks a concrete database driver; it
//! depends only on the `Store` trait, grounded in the teacher's pattern of
//! keeping the dataset behind a narrow trait (`core::storage::Storage`) so
//! the concrete backend is a pluggable collaborator.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("optimistic concurrency conflict: expected version {expected}, found {found}")]
    VersionConflict { expected: u64, found: u64 },
    #[error("backend error: {0}")]
    Backend(String),
}

/// A page request: zero-based offset and a bounded page size.
#[derive(Debug, Clone, Copy)]
pub struct PageRequest {
    pub offset: usize,
    pub limit: usize,
}

impl PageRequest {
    pub fn new(offset: usize, limit: usize) -> Self {
        Self { offset, limit }
    }
}

#[derive(Debug, Clone)]
pub struct PageResult<T> {
    pub items: Vec<T>,
    pub total: usize,
}

/// The storage contract every persisted entity goes through: single-row and
/// bulk CRUD, paged queries, and a transactional scope for multi-entity
/// writes (spec.md section 4.A). Entities are addressed by table name plus
/// a tenant-scoped key, mirroring the `HUB_*` table catalogue in section 6.
///
/// The trait itself is untyped (`serde_json::Value`) so it stays
/// object-safe and a single `Arc<dyn Store>` can be shared across every
/// subsystem; the `StoreExt` helpers below give callers a typed facade
/// without reflection or `interface{}`-style dispatch at the call site.
#[async_trait]
pub trait Store: Send + Sync {
    /// Fetches one row by primary key. Returns `StoreError::NotFound` if
    /// absent, never `Ok(None)` — callers that want existence-checking
    /// semantics should catch `NotFound` explicitly.
    async fn query_one_raw(&self, table: &str, tenant_id: &str, key: &str)
    -> Result<Value, StoreError>;

    /// Fetches a page of rows matching an opaque backend-specific filter
    /// (e.g. a SQL WHERE fragment or an equivalent structured predicate).
    async fn query_raw(
        &self,
        table: &str,
        tenant_id: &str,
        filter: &str,
        page: PageRequest,
    ) -> Result<PageResult<Value>, StoreError>;

    async fn insert_raw(
        &self,
        table: &str,
        tenant_id: &str,
        key: &str,
        value: Value,
    ) -> Result<(), StoreError>;

    /// Inserts many rows as a single atomic unit: all rows land or none do
    /// (spec.md section 8 all-or-nothing batch-commit property).
    async fn batch_insert_raw(
        &self,
        table: &str,
        tenant_id: &str,
        rows: Vec<(String, Value)>,
    ) -> Result<(), StoreError>;

    async fn update_raw(
        &self,
        table: &str,
        tenant_id: &str,
        key: &str,
        value: Value,
    ) -> Result<(), StoreError>;

    async fn delete(&self, table: &str, tenant_id: &str, key: &str) -> Result<(), StoreError>;

    /// Runs `body` inside a transactional scope with guaranteed
    /// commit-or-rollback on every exit path: if `body` returns `Err`, none
    /// of the writes it made through the store are observable afterward
    /// (spec.md section 4.A `InTx`). `body` is expected to close over its
    /// own `Arc<dyn Store>` handle (the `BoxFuture<'static, _>` shape is
    /// grounded in `control/handler.rs`'s `CommandService` future type in
    /// the ninelives pack), since a borrowed `&self` can't outlive the
    /// `'static` bound a boxed future needs.
    async fn in_tx(&self, body: Box<dyn FnOnce() -> BoxFuture<'static, Result<(), StoreError>> + Send>) -> Result<(), StoreError>;
}

/// Typed convenience wrappers over the object-safe [`Store`] trait.
#[async_trait]
pub trait StoreExt: Store {
    async fn query_one<T: DeserializeOwned>(
        &self,
        table: &str,
        tenant_id: &str,
        key: &str,
    ) -> Result<T, StoreError> {
        let value = self.query_one_raw(table, tenant_id, key).await?;
        serde_json::from_value(value).map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn query<T: DeserializeOwned>(
        &self,
        table: &str,
        tenant_id: &str,
        filter: &str,
        page: PageRequest,
    ) -> Result<PageResult<T>, StoreError> {
        let raw = self.query_raw(table, tenant_id, filter, page).await?;
        let items = raw
            .items
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<T>, _>>()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(PageResult {
            items,
            total: raw.total,
        })
    }

    async fn insert<T: Serialize + Sync>(
        &self,
        table: &str,
        tenant_id: &str,
        key: &str,
        value: &T,
    ) -> Result<(), StoreError> {
        let value = serde_json::to_value(value).map_err(|e| StoreError::Backend(e.to_string()))?;
        self.insert_raw(table, tenant_id, key, value).await
    }

    async fn update<T: Serialize + Sync>(
        &self,
        table: &str,
        tenant_id: &str,
        key: &str,
        value: &T,
    ) -> Result<(), StoreError> {
        let value = serde_json::to_value(value).map_err(|e| StoreError::Backend(e.to_string()))?;
        self.update_raw(table, tenant_id, key, value).await
    }
}

impl<S: Store + ?Sized> StoreExt for S {}
