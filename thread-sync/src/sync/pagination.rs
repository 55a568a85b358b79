//! Offset-based pagination loader
//!
//! `Idle -> Loading -> (Idle | Exhausted)`. A page shorter than the page
//! size ends the list; a failed fetch ends it too. Load requests are
//! coalesced by a trailing debounce and ignored while a fetch is in flight,
//! once exhausted, or after the owning view detached.
//!
//! The run's watermark is written only with the page that exhausts the list,
//! so a partial load leaves the parent without one and the next attach
//! paginates again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, error, info};

use super::debounce::Debouncer;
use super::events::SessionEvent;
use super::reconciler::Reconciler;
use super::view_model::ThreadListViewModel;
use crate::adapters::remote::ThreadsApi;
use crate::types::RemoteThreadBatch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoaderState {
    Idle,
    Loading,
    Exhausted,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageCursor {
    pub offset: usize,
    pub exhausted: bool,
}

struct LoaderInner {
    state: LoaderState,
    cursor: PageCursor,
    /// Recorded with the last page of the current run
    watermark: Option<DateTime<Utc>>,
    /// Bumped by `start`; a fetch from an older run is dropped on arrival
    generation: u64,
}

pub struct PaginationLoader {
    parent_id: String,
    page_size: usize,
    api: Arc<dyn ThreadsApi>,
    reconciler: Reconciler,
    view: Arc<ThreadListViewModel>,
    events: flume::Sender<SessionEvent>,
    debouncer: Debouncer,
    inner: Mutex<LoaderInner>,
}

impl PaginationLoader {
    pub fn new(
        parent_id: impl Into<String>,
        page_size: usize,
        debounce: Duration,
        api: Arc<dyn ThreadsApi>,
        reconciler: Reconciler,
        view: Arc<ThreadListViewModel>,
        events: flume::Sender<SessionEvent>,
    ) -> Arc<Self> {
        Arc::new(Self {
            parent_id: parent_id.into(),
            page_size,
            api,
            reconciler,
            view,
            events,
            debouncer: Debouncer::new(debounce),
            inner: Mutex::new(LoaderInner {
                state: LoaderState::Idle,
                cursor: PageCursor::default(),
                watermark: None,
                generation: 0,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, LoaderInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self) -> LoaderState {
        self.lock().state
    }

    pub fn cursor(&self) -> PageCursor {
        self.lock().cursor.clone()
    }

    /// Begin (or restart) a run from offset 0 and request the first page.
    ///
    /// `watermark` is written with the page that exhausts the list; `None`
    /// writes none. A fetch still in flight from an earlier run is discarded.
    pub fn start(self: &Arc<Self>, watermark: Option<DateTime<Utc>>) {
        self.debouncer.cancel();
        {
            let mut inner = self.lock();
            inner.state = LoaderState::Idle;
            inner.cursor = PageCursor::default();
            inner.watermark = watermark;
            inner.generation += 1;
        }
        self.view.set_exhausted(false);
        info!("Starting paginated load for {}", self.parent_id);
        self.load_more();
    }

    /// Request the next page after the debounce window
    pub fn load_more(self: &Arc<Self>) {
        if !self.can_load() {
            return;
        }
        let this = self.clone();
        self.debouncer.call(async move {
            this.fetch_next().await;
        });
    }

    /// Drop any pending debounced request
    pub fn cancel(&self) {
        self.debouncer.cancel();
    }

    fn can_load(&self) -> bool {
        self.view.is_attached() && self.state() == LoaderState::Idle
    }

    /// Fetch and reconcile the page at the current offset
    pub async fn fetch_next(&self) {
        let (offset, watermark, generation) = {
            let mut inner = self.lock();
            if inner.state != LoaderState::Idle || !self.view.is_attached() {
                return;
            }
            inner.state = LoaderState::Loading;
            (inner.cursor.offset, inner.watermark, inner.generation)
        };
        self.view.set_loading(true);
        debug!(
            "Fetching {} threads of {} at offset {}",
            self.page_size, self.parent_id, offset
        );

        let result = self
            .api
            .fetch_page(&self.parent_id, self.page_size, offset)
            .await;

        if !self.view.is_attached() {
            debug!("Discarding page for {} fetched after detach", self.parent_id);
            self.lock().state = LoaderState::Exhausted;
            return;
        }
        if self.lock().generation != generation {
            debug!("Discarding page for {} from a restarted run", self.parent_id);
            return;
        }

        let outcome = match result {
            Ok(page) => {
                let returned = page.items.len();
                let count = page.count;
                let exhausted = count < self.page_size;
                let as_of = if exhausted { watermark } else { None };
                self.reconciler
                    .apply(RemoteThreadBatch::append(page.items, as_of))
                    .map(|_| (returned, count, exhausted))
            }
            Err(e) => Err(e),
        };

        match outcome {
            Ok((returned, count, exhausted)) => {
                {
                    let mut inner = self.lock();
                    inner.cursor.offset += returned;
                    inner.cursor.exhausted = exhausted;
                    inner.state = if exhausted {
                        LoaderState::Exhausted
                    } else {
                        LoaderState::Idle
                    };
                }
                self.view.set_exhausted(exhausted);
                self.view.set_loading(false);
                let _ = self.events.send(SessionEvent::PageLoaded {
                    parent_id: self.parent_id.clone(),
                    offset,
                    count,
                    exhausted,
                });
            }
            Err(e) => {
                error!("Failed to load threads of {} at offset {}: {}", self.parent_id, offset, e);
                {
                    let mut inner = self.lock();
                    inner.state = LoaderState::Exhausted;
                    inner.cursor.exhausted = true;
                }
                self.view.set_exhausted(true);
                self.view.set_loading(false);
                let _ = self.events.send(SessionEvent::SyncFailed {
                    parent_id: self.parent_id.clone(),
                    message: e.to_string(),
                });
            }
        }
    }
}
