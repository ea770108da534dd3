//! Process-wide table metadata cache.
//!
//! Metadata is keyed by table name and never invalidated automatically; a
//! schema change requires [`MetadataCache::clear`] or a process restart.

use crate::introspect::Introspector;
use crate::metadata::TableMetadata;
use asupersync::{Cx, Outcome};
use dewdrop_core::{Connection, Error};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Shared cache of loaded table metadata.
///
/// Create one per process and share it behind an `Arc`.
#[derive(Debug, Default)]
pub struct MetadataCache {
    tables: Mutex<HashMap<String, Arc<TableMetadata>>>,
    table_names: Mutex<Option<Arc<Vec<String>>>>,
}

impl MetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, HashMap<String, Arc<TableMetadata>>> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Cached metadata for `table`, if loaded.
    pub fn get(&self, table: &str) -> Option<Arc<TableMetadata>> {
        self.tables().get(table).cloned()
    }

    /// Seed the cache, e.g. from a metadata snapshot. Replaces any entry.
    pub fn insert(&self, meta: TableMetadata) -> Arc<TableMetadata> {
        let meta = Arc::new(meta);
        self.tables().insert(meta.name.clone(), Arc::clone(&meta));
        meta
    }

    /// Cached metadata for `table`, introspecting on first use.
    ///
    /// The lock is not held while the catalog is queried; if two callers
    /// race, the first stored entry wins and both receive it.
    #[tracing::instrument(level = "debug", skip(self, cx, conn))]
    pub async fn get_or_load<C: Connection>(
        &self,
        cx: &Cx,
        conn: &C,
        table: &str,
    ) -> Outcome<Arc<TableMetadata>, Error> {
        if let Some(meta) = self.get(table) {
            tracing::trace!(table, "Metadata cache hit");
            return Outcome::Ok(meta);
        }

        let introspector = Introspector::for_connection(conn);
        let meta = match introspector.load_table(cx, conn, table).await {
            Outcome::Ok(meta) => meta,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };

        tracing::debug!(table, columns = meta.columns().len(), "Metadata loaded");
        let stored = Arc::clone(
            self.tables()
                .entry(table.to_string())
                .or_insert_with(|| Arc::new(meta)),
        );
        Outcome::Ok(stored)
    }

    /// Catalog table names, listed once.
    pub async fn table_names<C: Connection>(
        &self,
        cx: &Cx,
        conn: &C,
    ) -> Outcome<Arc<Vec<String>>, Error> {
        {
            let names = self.table_names.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(names) = names.as_ref() {
                return Outcome::Ok(Arc::clone(names));
            }
        }

        let names = match Introspector::for_connection(conn).table_names(cx, conn).await {
            Outcome::Ok(names) => Arc::new(names),
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };

        let mut slot = self.table_names.lock().unwrap_or_else(|e| e.into_inner());
        Outcome::Ok(Arc::clone(slot.get_or_insert(names)))
    }

    pub fn len(&self) -> usize {
        self.tables().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables().is_empty()
    }

    /// Drop every cached entry.
    pub fn clear(&self) {
        self.tables().clear();
        *self.table_names.lock().unwrap_or_else(|e| e.into_inner()) = None;
        tracing::debug!("Metadata cache cleared");
    }
}
