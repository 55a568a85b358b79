//! One attached thread list
//!
//! Attaching binds the view model to the store, picks the sync mode and kicks
//! off the first fetch. The session is the single owner of its timers, store
//! observers and forwarding tasks; `detach` releases all of them.

use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::debounce::PressDebouncer;
use super::driver::{decide, SyncDriver, SyncMode};
use super::events::{SessionEvent, ThreadSelection};
use super::pagination::{LoaderState, PaginationLoader};
use super::reconciler::Reconciler;
use super::view_model::{ThreadListView, ThreadListViewModel};
use crate::adapters::remote::ThreadsApi;
use crate::adapters::sqlite::{StoreSubscription, ThreadQuery, ThreadStore};
use crate::config::SyncConfig;
use crate::types::error::SyncError;
use crate::types::ThreadItem;
use crate::utils::now_utc;

pub struct ThreadListSession {
    parent_id: String,
    mode: SyncMode,
    view: Arc<ThreadListViewModel>,
    loader: Option<Arc<PaginationLoader>>,
    press: PressDebouncer,
    events_tx: flume::Sender<SessionEvent>,
    events_rx: flume::Receiver<SessionEvent>,
    store_handles: Mutex<Vec<StoreSubscription>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Forward every store emission into the view model until the channel closes
fn forward<T, F>(rx: flume::Receiver<T>, publish: F) -> JoinHandle<()>
where
    T: Send + 'static,
    F: Fn(T) + Send + 'static,
{
    tokio::spawn(async move {
        while let Ok(value) = rx.recv_async().await {
            publish(value);
        }
    })
}

impl ThreadListSession {
    /// Attach to the thread list of `parent_id`. Must be called inside a tokio runtime.
    pub fn attach(
        parent_id: impl Into<String>,
        store: ThreadStore,
        api: Arc<dyn ThreadsApi>,
        config: &SyncConfig,
    ) -> Result<Arc<Self>, SyncError> {
        config.validate()?;
        let parent_id = parent_id.into();
        let view = ThreadListViewModel::new();
        let (events_tx, events_rx) = flume::unbounded();

        let subscription = match store.find_subscription(&parent_id) {
            Ok(sub) => Some(sub),
            Err(e) if e.is_not_found() => {
                warn!("No stored subscription for {}, keeping threads in memory", parent_id);
                None
            }
            Err(e) => return Err(e),
        };

        let mut store_handles = Vec::new();
        let mut tasks = Vec::new();
        if subscription.is_some() {
            let (sub_rx, sub_handle) = store.observe_subscription(&parent_id)?;
            let (threads_rx, threads_handle) =
                store.observe_threads(ThreadQuery::for_parent(parent_id.as_str()))?;

            // Current values land in the buffer before the first publish
            if let Ok(sub) = sub_rx.try_recv() {
                view.publish_subscription(sub);
            }
            if let Ok(threads) = threads_rx.try_recv() {
                view.publish_threads(threads);
            }

            let v = view.clone();
            tasks.push(forward(sub_rx, move |sub| v.publish_subscription(sub)));
            let v = view.clone();
            tasks.push(forward(threads_rx, move |threads| v.publish_threads(threads)));
            store_handles.push(sub_handle);
            store_handles.push(threads_handle);
        }

        let mode = decide(subscription.as_ref(), now_utc());
        info!("Attaching {} in {:?} mode", parent_id, mode);
        let _ = events_tx.send(SessionEvent::ModeSelected {
            parent_id: parent_id.clone(),
            mode: mode.clone(),
        });

        let persisted = || {
            Reconciler::persisted(
                store.clone(),
                parent_id.as_str(),
                config.preserve_local_fields.clone(),
            )
        };
        let new_loader = |reconciler: Reconciler| {
            PaginationLoader::new(
                parent_id.as_str(),
                config.page_size,
                config.load_debounce(),
                api.clone(),
                reconciler,
                view.clone(),
                events_tx.clone(),
            )
        };

        let (loader, first_watermark) = match &mode {
            SyncMode::Degraded => (
                Some(new_loader(Reconciler::in_memory(parent_id.as_str(), view.clone()))),
                None,
            ),
            SyncMode::FullLoad { watermark } => (Some(new_loader(persisted())), Some(*watermark)),
            SyncMode::Delta { since } => {
                let driver = SyncDriver::new(
                    parent_id.as_str(),
                    api.clone(),
                    persisted(),
                    view.clone(),
                    events_tx.clone(),
                );
                let since = *since;
                view.set_exhausted(true);
                // Not tracked: an in-flight fetch finishes and is discarded after detach
                tokio::spawn(async move { driver.delta_sync(since).await });
                (None, None)
            }
        };

        let session = Arc::new(Self {
            parent_id,
            mode,
            view,
            loader,
            press: PressDebouncer::new(config.press_debounce()),
            events_tx,
            events_rx,
            store_handles: Mutex::new(store_handles),
            tasks: Mutex::new(tasks),
        });

        session.view.mark_ready();
        if let Some(loader) = &session.loader {
            loader.start(first_watermark);
        }

        Ok(session)
    }

    pub fn parent_id(&self) -> &str {
        &self.parent_id
    }

    pub fn mode(&self) -> &SyncMode {
        &self.mode
    }

    /// Latest published view
    pub fn view(&self) -> ThreadListView {
        self.view.current()
    }

    pub fn watch(&self) -> watch::Receiver<ThreadListView> {
        self.view.watch()
    }

    pub fn events(&self) -> flume::Receiver<SessionEvent> {
        self.events_rx.clone()
    }

    pub fn is_attached(&self) -> bool {
        self.view.is_attached()
    }

    pub fn is_empty(&self) -> bool {
        self.view.is_empty()
    }

    /// `None` in delta mode, which never paginates
    pub fn loader_state(&self) -> Option<LoaderState> {
        self.loader.as_ref().map(|l| l.state())
    }

    /// Ask for the next page; ignored in delta mode
    pub fn load_more(&self) {
        match &self.loader {
            Some(loader) => loader.load_more(),
            None => debug!("Ignoring load more for {} in delta mode", self.parent_id),
        }
    }

    /// Open a thread unless a press was accepted within the debounce window
    pub fn press_thread(&self, thread: &ThreadItem) -> Option<ThreadSelection> {
        if !self.is_attached() || !self.press.try_press() {
            return None;
        }

        let selection = ThreadSelection {
            parent_id: self.parent_id.clone(),
            thread_id: thread.id.clone(),
            name: thread_name(thread),
        };
        let _ = self
            .events_tx
            .send(SessionEvent::OpenThread(selection.clone()));
        Some(selection)
    }

    /// Release observers and timers; fetches still in flight are discarded on arrival
    pub fn detach(&self) {
        if !self.view.is_attached() {
            return;
        }
        self.view.mark_detached();

        if let Some(loader) = &self.loader {
            loader.cancel();
        }
        self.press.cancel();

        let handles: Vec<StoreSubscription> = self
            .store_handles
            .lock()
            .map(|mut h| h.drain(..).collect())
            .unwrap_or_default();
        for handle in handles {
            handle.unsubscribe();
        }

        if let Ok(mut tasks) = self.tasks.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }

        info!("Detached {}", self.parent_id);
    }
}

impl Drop for ThreadListSession {
    fn drop(&mut self) {
        self.detach();
    }
}

fn thread_name(thread: &ThreadItem) -> String {
    let msg = thread.payload.msg.trim();
    if msg.is_empty() {
        format!("Thread {}", thread.id)
    } else {
        msg.lines().next().unwrap_or(msg).to_string()
    }
}
