//! Live thread list state republished to the presentation layer
//!
//! The view model holds the latest subscription snapshot, the latest thread
//! list, and the loading/exhausted flags. Every change republishes a fresh
//! [`ThreadListView`] on a `watch` channel with badges recomputed. Until
//! [`ThreadListViewModel::mark_ready`] is called changes are only recorded;
//! the first publish happens on ready. After detach nothing is published.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::debug;

use super::unread::{classify, UnreadBadge};
use crate::types::{ParentSubscription, ThreadItem};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadListItem {
    pub thread: ThreadItem,
    pub badge: UnreadBadge,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadListView {
    pub items: Vec<ThreadListItem>,
    pub subscription: Option<ParentSubscription>,
    pub loading: bool,
    pub exhausted: bool,
}

impl ThreadListView {
    /// Nothing to show and nothing on the way
    pub fn is_empty(&self) -> bool {
        !self.loading && self.items.is_empty()
    }
}

#[derive(Default)]
struct ViewState {
    subscription: Option<ParentSubscription>,
    threads: Vec<ThreadItem>,
    loading: bool,
    exhausted: bool,
    ready: bool,
}

impl ViewState {
    fn render(&self) -> ThreadListView {
        let items = self
            .threads
            .iter()
            .map(|thread| ThreadListItem {
                badge: classify(&thread.id, self.subscription.as_ref()),
                thread: thread.clone(),
            })
            .collect();

        ThreadListView {
            items,
            subscription: self.subscription.clone(),
            loading: self.loading,
            exhausted: self.exhausted,
        }
    }
}

pub struct ThreadListViewModel {
    state: Mutex<ViewState>,
    attached: AtomicBool,
    tx: watch::Sender<ThreadListView>,
}

impl ThreadListViewModel {
    pub fn new() -> Arc<Self> {
        let (tx, _rx) = watch::channel(ThreadListView::default());
        Arc::new(Self {
            state: Mutex::new(ViewState::default()),
            attached: AtomicBool::new(true),
            tx,
        })
    }

    fn lock(&self) -> MutexGuard<'_, ViewState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn watch(&self) -> watch::Receiver<ThreadListView> {
        self.tx.subscribe()
    }

    /// Last published view
    pub fn current(&self) -> ThreadListView {
        self.tx.borrow().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.current().is_empty()
    }

    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }

    /// Publish the buffered state once; later calls do nothing
    pub fn mark_ready(&self) {
        let view = {
            let mut state = self.lock();
            if state.ready {
                return;
            }
            state.ready = true;
            state.render()
        };
        if self.is_attached() {
            self.tx.send_replace(view);
        }
    }

    /// Stop publishing; the last view stays readable
    pub fn mark_detached(&self) {
        self.attached.store(false, Ordering::SeqCst);
    }

    pub fn publish_subscription(&self, subscription: ParentSubscription) {
        self.update(|state| state.subscription = Some(subscription));
    }

    pub fn publish_threads(&self, threads: Vec<ThreadItem>) {
        self.update(|state| state.threads = threads);
    }

    pub fn set_loading(&self, loading: bool) {
        self.update(|state| state.loading = loading);
    }

    pub fn set_exhausted(&self, exhausted: bool) {
        self.update(|state| state.exhausted = exhausted);
    }

    /// Threads held in memory, in display order
    pub fn memory_items(&self) -> Vec<ThreadItem> {
        self.lock().threads.clone()
    }

    /// Append threads to the in-memory list (degraded mode has no store to observe)
    pub fn append_items(&self, items: Vec<ThreadItem>) {
        if items.is_empty() {
            return;
        }
        self.update(|state| state.threads.extend(items));
    }

    fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut ViewState),
    {
        if !self.is_attached() {
            debug!("Dropping view update after detach");
            return;
        }

        let view = {
            let mut state = self.lock();
            f(&mut state);
            if !state.ready {
                return;
            }
            state.render()
        };
        self.tx.send_replace(view);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::thread_item;

    #[test]
    fn test_buffers_until_ready_then_flushes_latest() {
        let vm = ThreadListViewModel::new();
        let mut rx = vm.watch();

        vm.publish_threads(vec![thread_item("a", "GENERAL", 1_000)]);
        vm.publish_threads(vec![
            thread_item("b", "GENERAL", 2_000),
            thread_item("a", "GENERAL", 1_000),
        ]);
        assert!(!rx.has_changed().unwrap());
        assert!(vm.current().items.is_empty());

        vm.mark_ready();
        assert!(rx.has_changed().unwrap());
        let view = rx.borrow_and_update().clone();
        assert_eq!(view.items.len(), 2);
        assert_eq!(view.items[0].thread.id, "b");

        // A second ready does not republish
        vm.mark_ready();
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_badges_follow_latest_subscription() {
        let vm = ThreadListViewModel::new();
        vm.mark_ready();
        vm.publish_threads(vec![thread_item("a", "GENERAL", 1_000)]);
        assert_eq!(vm.current().items[0].badge, UnreadBadge::None);

        let mut sub = ParentSubscription::new("GENERAL", "general");
        sub.unread_mentioning_me.insert("a".to_string());
        vm.publish_subscription(sub);
        assert_eq!(vm.current().items[0].badge, UnreadBadge::MentionsMe);
    }

    #[test]
    fn test_is_empty_considers_loading() {
        let vm = ThreadListViewModel::new();
        vm.mark_ready();
        assert!(vm.is_empty());
        vm.set_loading(true);
        assert!(!vm.is_empty());
        vm.set_loading(false);
        vm.append_items(vec![thread_item("a", "GENERAL", 1_000)]);
        assert!(!vm.is_empty());
    }

    #[test]
    fn test_no_publish_after_detach() {
        let vm = ThreadListViewModel::new();
        vm.mark_ready();
        vm.mark_detached();
        vm.append_items(vec![thread_item("a", "GENERAL", 1_000)]);
        assert!(vm.current().items.is_empty());
        assert!(vm.memory_items().is_empty());
    }
}
