//! Table storage for pipeline rows: the row model, an equality filter, the
//! [`TableStore`] abstraction, and its Azure Table service and in-memory
//! implementations.

mod auth;
pub mod azure;
pub mod errors;
pub mod filter;
pub mod memory;
pub mod metrics_defs;
pub mod row;
pub mod store;

pub use azure::AzureTableStore;
pub use errors::StoreError;
pub use filter::Filter;
pub use memory::MemoryTableStore;
pub use row::{Row, generate_row_key};
pub use store::TableStore;
