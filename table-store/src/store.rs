use crate::errors::StoreError;
use crate::filter::Filter;
use crate::row::Row;
use async_trait::async_trait;

/// The operations the upsert path needs from a table service.
///
/// Implementations are expected to be cheap to create; callers build one per
/// invocation rather than sharing a long-lived handle.
#[async_trait]
pub trait TableStore: Send + Sync {
    /// Returns rows matching `filter` (all rows when `None`) in the service's
    /// default order, stopping after `top` rows when a limit is given.
    async fn query(
        &self,
        table: &str,
        filter: Option<&Filter>,
        top: Option<usize>,
    ) -> Result<Vec<Row>, StoreError>;

    /// Inserts a new row. Fails if the identity is already taken.
    async fn insert(&self, table: &str, row: &Row) -> Result<(), StoreError>;

    /// Replaces the stored row with the same identity, unconditionally.
    async fn update(&self, table: &str, row: &Row) -> Result<(), StoreError>;
}
