// src/store/memory.rs

//! An in-memory `Store` implementation. Used by tests and as the reference
//! implementation that exercises the trait contract independent of any
//! concrete database driver (spec.md section 4.A Non-goals: "concrete
//! storage engine/driver selection").

use super::{PageRequest, PageResult, Store, StoreError};
use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::BoxFuture;
use serde_json::Value;
use tokio::sync::Mutex;

type Snapshot = Vec<(String, Vec<((String, String), Value)>)>;

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: DashMap<String, DashMap<(String, String), Value>>,
    /// Serializes transactional scopes so a concurrent `in_tx` body's
    /// snapshot/restore can't interleave with another one's writes
    /// (spec.md section 5: "row-level transaction to preserve totals under
    /// concurrent sends" — the in-memory reference backend widens this to
    /// the whole store rather than a single row/table).
    tx_lock: Mutex<()>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self, name: &str) -> dashmap::mapref::one::Ref<'_, String, DashMap<(String, String), Value>> {
        self.tables.entry(name.to_string()).or_default();
        self.tables.get(name).expect("just inserted")
    }

    fn snapshot(&self) -> Snapshot {
        self.tables
            .iter()
            .map(|entry| {
                let rows = entry.value().iter().map(|row| (row.key().clone(), row.value().clone())).collect();
                (entry.key().clone(), rows)
            })
            .collect()
    }

    fn restore(&self, snapshot: Snapshot) {
        self.tables.clear();
        for (name, rows) in snapshot {
            let table = DashMap::new();
            for (key, value) in rows {
                table.insert(key, value);
            }
            self.tables.insert(name, table);
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn query_one_raw(
        &self,
        table: &str,
        tenant_id: &str,
        key: &str,
    ) -> Result<Value, StoreError> {
        let rows = self.table(table);
        rows.get(&(tenant_id.to_string(), key.to_string()))
            .map(|v| v.clone())
            .ok_or(StoreError::NotFound)
    }

    async fn query_raw(
        &self,
        table: &str,
        tenant_id: &str,
        _filter: &str,
        page: PageRequest,
    ) -> Result<PageResult<Value>, StoreError> {
        let rows = self.table(table);
        let mut matching: Vec<Value> = rows
            .iter()
            .filter(|entry| entry.key().0 == tenant_id)
            .map(|entry| entry.value().clone())
            .collect();
        matching.sort_by_key(|v| v.to_string());
        let total = matching.len();
        let items = matching
            .into_iter()
            .skip(page.offset)
            .take(page.limit)
            .collect();
        Ok(PageResult { items, total })
    }

    async fn insert_raw(
        &self,
        table: &str,
        tenant_id: &str,
        key: &str,
        value: Value,
    ) -> Result<(), StoreError> {
        let rows = self.table(table);
        rows.insert((tenant_id.to_string(), key.to_string()), value);
        Ok(())
    }

    async fn batch_insert_raw(
        &self,
        table: &str,
        tenant_id: &str,
        rows: Vec<(String, Value)>,
    ) -> Result<(), StoreError> {
        // Held for the whole batch so no concurrent `in_tx` scope can
        // snapshot (or restore into) a half-applied batch.
        let _guard = self.tx_lock.lock().await;
        let table_rows = self.table(table);
        for (key, value) in rows {
            table_rows.insert((tenant_id.to_string(), key), value);
        }
        Ok(())
    }

    async fn update_raw(
        &self,
        table: &str,
        tenant_id: &str,
        key: &str,
        value: Value,
    ) -> Result<(), StoreError> {
        let rows = self.table(table);
        let map_key = (tenant_id.to_string(), key.to_string());
        if !rows.contains_key(&map_key) {
            return Err(StoreError::NotFound);
        }
        rows.insert(map_key, value);
        Ok(())
    }

    async fn delete(&self, table: &str, tenant_id: &str, key: &str) -> Result<(), StoreError> {
        let rows = self.table(table);
        rows.remove(&(tenant_id.to_string(), key.to_string()))
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    async fn in_tx(
        &self,
        body: Box<dyn FnOnce() -> BoxFuture<'static, Result<(), StoreError>> + Send>,
    ) -> Result<(), StoreError> {
        let _guard = self.tx_lock.lock().await;
        let snapshot = self.snapshot();
        let result = body().await;
        if result.is_err() {
            self.restore(snapshot);
        }
        result
    }
}
