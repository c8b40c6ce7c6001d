//! tgfin-ledger: persisted transaction store, merge/dedup, and read views

pub mod error;
pub mod format;
pub mod query;
pub mod store;

pub use error::StorageError;
pub use format::StoreState;
pub use query::{CategoryTotal, Summary, category_totals, list, summary};
pub use store::{LoadOutcome, MergeResult, TransactionStore};
