//! Schema catalog: tables by name, plus generated object names.

pub mod column_info;
pub mod index_info;
pub mod table;

pub use column_info::ColumnInfo;
pub use index_info::IndexInfo;
pub use table::{Table, TableId};

use crate::error::{SqlError, SqlResult};
use dashmap::DashMap;
use log::info;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

/// Registry of the tables visible to every session.
///
/// Structural changes replace the `Arc<Table>` stored under a name; sessions
/// holding the old handle keep a consistent view until they look it up again.
pub struct Catalog {
    tables: DashMap<String, Arc<Table>>,
    next_table_id: AtomicU32,
    next_constraint_id: AtomicU32,
    next_index_id: AtomicU32,
    schema_version: AtomicU64,
}

impl Catalog {
    pub fn new() -> Self {
        Self {
            tables: DashMap::new(),
            next_table_id: AtomicU32::new(1),
            next_constraint_id: AtomicU32::new(1),
            next_index_id: AtomicU32::new(1),
            schema_version: AtomicU64::new(0),
        }
    }

    pub fn next_table_id(&self) -> TableId {
        TableId(self.next_table_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Name for an unnamed constraint, e.g. `SYS_CT_7`
    pub fn generate_constraint_name(&self) -> String {
        format!("SYS_CT_{}", self.next_constraint_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Name for an index backing a constraint, e.g. `SYS_IDX_3`
    pub fn generate_index_name(&self) -> String {
        format!("SYS_IDX_{}", self.next_index_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Counter bumped by every schema change. Compiled statements record it
    /// and rebind when it moves.
    pub fn schema_version(&self) -> u64 {
        self.schema_version.load(Ordering::SeqCst)
    }

    /// Record an in-place schema change such as a new index or constraint
    pub fn mark_schema_changed(&self) {
        self.schema_version.fetch_add(1, Ordering::SeqCst);
    }

    /// Build and register an empty table
    pub fn create_table(&self, name: &str, columns: Vec<ColumnInfo>) -> SqlResult<Arc<Table>> {
        let table = Arc::new(Table::new(self.next_table_id(), name, columns));
        self.add_table(table.clone())?;
        Ok(table)
    }

    pub fn add_table(&self, table: Arc<Table>) -> SqlResult<()> {
        let name = table.name().to_string();
        match self.tables.entry(name.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(SqlError::ObjectExists(name)),
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                info!("created table {}", name);
                entry.insert(table);
                self.mark_schema_changed();
                Ok(())
            }
        }
    }

    pub fn find_table(&self, name: &str) -> Option<Arc<Table>> {
        self.tables.get(name).map(|t| t.value().clone())
    }

    pub fn get_table(&self, name: &str) -> SqlResult<Arc<Table>> {
        self.find_table(name)
            .ok_or_else(|| SqlError::ObjectNotFound(name.to_string()))
    }

    /// Swap in a structurally rewritten table under the same name
    pub fn replace_table(&self, table: Arc<Table>) -> SqlResult<Arc<Table>> {
        let name = table.name().to_string();
        match self.tables.get_mut(&name) {
            Some(mut entry) => {
                let old = std::mem::replace(entry.value_mut(), table);
                drop(entry);
                self.mark_schema_changed();
                Ok(old)
            }
            None => Err(SqlError::ObjectNotFound(name)),
        }
    }

    pub fn drop_table(&self, name: &str) -> SqlResult<Arc<Table>> {
        let (_, table) = self
            .tables
            .remove(name)
            .ok_or_else(|| SqlError::ObjectNotFound(name.to_string()))?;
        info!("dropped table {}", name);
        self.mark_schema_changed();
        Ok(table)
    }

    /// Tables ordered by id, i.e. creation order
    pub fn list_tables(&self) -> Vec<Arc<Table>> {
        let mut tables: Vec<Arc<Table>> = self.tables.iter().map(|e| e.value().clone()).collect();
        tables.sort_by_key(|t| t.id());
        tables
    }

    /// Find the table owning an index name
    pub fn find_index_owner(&self, index_name: &str) -> Option<Arc<Table>> {
        self.tables
            .iter()
            .find(|e| e.value().find_index(index_name).is_some())
            .map(|e| e.value().clone())
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}
