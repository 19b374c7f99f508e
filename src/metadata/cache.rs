//! Process-wide cache of the fields, tables and joins exposed to views.
//!
//! Snapshots are built off to the side and installed by swapping a single
//! `Arc`, so concurrent readers observe either the previous snapshot or the
//! fully rebuilt one.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::{debug, info, trace};

use crate::metadata::schema::{FieldMetadata, SchemaDescriber};

/// Fields of one table in contribution order.
#[derive(Debug, Default)]
pub struct TableEntry {
    fields: Vec<Arc<FieldMetadata>>,
    index: FxHashMap<String, usize>,
}

impl TableEntry {
    /// Fields in contribution order.
    pub fn fields(&self) -> &[Arc<FieldMetadata>] {
        &self.fields
    }

    /// Looks up a field by column name.
    pub fn field(&self, name: &str) -> Option<&Arc<FieldMetadata>> {
        self.index.get(name).map(|&idx| &self.fields[idx])
    }

    /// Adds `meta` unless the column is already present; returns whether it
    /// was inserted.
    fn insert_first(&mut self, meta: FieldMetadata) -> bool {
        if self.index.contains_key(&meta.field) {
            return false;
        }
        self.index.insert(meta.field.clone(), self.fields.len());
        self.fields.push(Arc::new(meta));
        true
    }
}

/// Immutable, fully merged metadata.
#[derive(Debug, Default)]
pub struct MetadataSnapshot {
    epoch: u64,
    tables: BTreeMap<String, TableEntry>,
}

impl MetadataSnapshot {
    /// Rebuild counter this snapshot was produced by.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Whether `table` is exposed.
    pub fn has_table(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    /// Exposed table names in sorted order.
    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    /// Entry for `table`.
    pub fn table(&self, table: &str) -> Option<&TableEntry> {
        self.tables.get(table)
    }

    /// Metadata for `table.field`.
    pub fn field(&self, table: &str, field: &str) -> Option<&Arc<FieldMetadata>> {
        self.tables.get(table)?.field(field)
    }

    /// Total number of fields across all tables.
    pub fn field_count(&self) -> usize {
        self.tables.values().map(|entry| entry.fields.len()).sum()
    }
}

/// Lazily populated, wholesale-invalidated metadata cache.
pub struct MetadataCache {
    describers: Vec<Arc<dyn SchemaDescriber>>,
    current: RwLock<Option<Arc<MetadataSnapshot>>>,
    generation: AtomicU64,
    epochs: AtomicU64,
}

impl MetadataCache {
    /// Creates a cache that merges `describers` in order.
    pub fn new(describers: Vec<Arc<dyn SchemaDescriber>>) -> Self {
        Self {
            describers,
            current: RwLock::new(None),
            generation: AtomicU64::new(0),
            epochs: AtomicU64::new(0),
        }
    }

    /// Creates a cache over a single describer.
    pub fn with_describer(describer: impl SchemaDescriber + 'static) -> Self {
        let describer: Arc<dyn SchemaDescriber> = Arc::new(describer);
        Self::new(vec![describer])
    }

    /// Fields of `table`; empty when the table is not exposed.
    ///
    /// The returned records belong to the current snapshot; re-fetch after
    /// [`MetadataCache::invalidate`] instead of holding on to them.
    pub fn describe(&self, table: &str) -> Vec<Arc<FieldMetadata>> {
        self.snapshot()
            .table(table)
            .map(|entry| entry.fields().to_vec())
            .unwrap_or_default()
    }

    /// The current snapshot, building it on first access.
    pub fn snapshot(&self) -> Arc<MetadataSnapshot> {
        if let Some(snapshot) = self.current.read().as_ref() {
            return Arc::clone(snapshot);
        }
        let generation = self.generation.load(Ordering::Acquire);
        let built = Arc::new(self.build());
        let mut slot = self.current.write();
        if self.generation.load(Ordering::Acquire) != generation {
            // Invalidated while building: hand the complete snapshot to this
            // caller without installing it.
            return built;
        }
        match slot.as_ref() {
            Some(existing) => Arc::clone(existing),
            None => {
                *slot = Some(Arc::clone(&built));
                built
            }
        }
    }

    /// Discards the cached snapshot; the next read triggers a rebuild.
    pub fn invalidate(&self) {
        let mut slot = self.current.write();
        self.generation.fetch_add(1, Ordering::AcqRel);
        let previous = slot.take().map(|snapshot| snapshot.epoch());
        info!(previous_epoch = previous, "metadata.invalidate");
    }

    /// Whether a snapshot is currently installed.
    pub fn is_populated(&self) -> bool {
        self.current.read().is_some()
    }

    fn build(&self) -> MetadataSnapshot {
        let epoch = self.epochs.fetch_add(1, Ordering::AcqRel) + 1;
        let mut tables: BTreeMap<String, TableEntry> = BTreeMap::new();
        let mut shadowed = 0usize;
        for describer in &self.describers {
            for table in describer.tables() {
                let entry = tables.entry(table.clone()).or_default();
                for mut meta in describer.describe_table(&table) {
                    meta.table = table.clone();
                    let key = meta.key();
                    if !entry.insert_first(meta) {
                        shadowed += 1;
                        trace!(field = %key, "metadata.rebuild.shadowed");
                    }
                }
            }
        }
        let snapshot = MetadataSnapshot { epoch, tables };
        debug!(
            epoch,
            tables = snapshot.tables.len(),
            fields = snapshot.field_count(),
            shadowed,
            "metadata.rebuild"
        );
        snapshot
    }
}

impl std::fmt::Debug for MetadataCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataCache")
            .field("describers", &self.describers.len())
            .field("populated", &self.is_populated())
            .finish()
    }
}
