use crate::errors::StoreError;
use crate::filter::Filter;
use crate::row::Row;
use crate::store::TableStore;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// A store operation as observed by [`MemoryTableStore`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operation {
    Query { table: String },
    Insert { table: String, row_key: String },
    Update { table: String, row_key: String },
}

#[derive(Default)]
struct Inner {
    tables: HashMap<String, Vec<Row>>,
    operations: Vec<Operation>,
}

/// In-process table store with the same conflict and not-found behavior as
/// the table service. Rows keep insertion order, which stands in for the
/// service's default query order. Clones share the same tables.
#[derive(Clone, Default)]
pub struct MemoryTableStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryTableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_table(&self, table: &str) {
        self.inner
            .lock()
            .tables
            .entry(table.to_string())
            .or_default();
    }

    /// Creates `table` if needed and appends `rows` without recording operations.
    pub fn seed(&self, table: &str, rows: impl IntoIterator<Item = Row>) {
        self.inner
            .lock()
            .tables
            .entry(table.to_string())
            .or_default()
            .extend(rows);
    }

    /// Snapshot of everything stored in `table`.
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.inner
            .lock()
            .tables
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    pub fn operations(&self) -> Vec<Operation> {
        self.inner.lock().operations.clone()
    }
}

#[async_trait]
impl TableStore for MemoryTableStore {
    async fn query(
        &self,
        table: &str,
        filter: Option<&Filter>,
        top: Option<usize>,
    ) -> Result<Vec<Row>, StoreError> {
        let mut inner = self.inner.lock();
        inner.operations.push(Operation::Query {
            table: table.to_string(),
        });

        let rows = inner
            .tables
            .get(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;

        let matching = rows
            .iter()
            .filter(|row| filter.is_none_or(|f| f.matches(row)))
            .take(top.unwrap_or(usize::MAX))
            .cloned()
            .collect();

        Ok(matching)
    }

    async fn insert(&self, table: &str, row: &Row) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        inner.operations.push(Operation::Insert {
            table: table.to_string(),
            row_key: row.row_key().to_string(),
        });

        let rows = inner
            .tables
            .get_mut(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;

        if rows.iter().any(|r| same_identity(r, row)) {
            return Err(StoreError::Conflict {
                partition_key: row.partition_key().to_string(),
                row_key: row.row_key().to_string(),
            });
        }

        rows.push(row.clone());
        Ok(())
    }

    async fn update(&self, table: &str, row: &Row) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        inner.operations.push(Operation::Update {
            table: table.to_string(),
            row_key: row.row_key().to_string(),
        });

        let rows = inner
            .tables
            .get_mut(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;

        match rows.iter_mut().find(|r| same_identity(r, row)) {
            Some(stored) => {
                *stored = row.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound {
                partition_key: row.partition_key().to_string(),
                row_key: row.row_key().to_string(),
            }),
        }
    }
}

fn same_identity(a: &Row, b: &Row) -> bool {
    a.partition_key() == b.partition_key() && a.row_key() == b.row_key()
}
