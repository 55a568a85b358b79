//! Thread list sync engine
//!
//! - `driver`: picks full load, delta sync or degraded mode for a parent
//! - `pagination`: offset pages with debounce and end-of-list detection
//! - `reconciler`: remote batch to minimal atomic store writes
//! - `view_model`: live list republished with unread badges
//! - `session`: one attached list owning all of the above

pub mod debounce;
pub mod driver;
pub mod events;
pub mod pagination;
pub mod reconciler;
pub mod session;
pub mod unread;
pub mod view_model;

pub use driver::{decide, SyncMode};
pub use events::{SessionEvent, ThreadSelection};
pub use pagination::{LoaderState, PageCursor};
pub use reconciler::{ReconcileOutcome, ReconcilePlan, Reconciler};
pub use session::ThreadListSession;
pub use unread::{classify, UnreadBadge};
pub use view_model::{ThreadListItem, ThreadListView};
