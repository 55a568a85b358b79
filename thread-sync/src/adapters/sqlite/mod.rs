pub mod observe;
pub mod pool;
pub mod schema;
pub mod store;
pub mod subscriptions;
pub mod threads;

// Re-export the store surface so callers can do `use crate::adapters::sqlite::ThreadStore`
pub use observe::{StoreSubscription, ThreadQuery};
pub use pool::DbPool;
pub use store::{PendingOp, ThreadStore};
