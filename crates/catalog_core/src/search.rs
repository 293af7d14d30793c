use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
    time::Duration,
};

use tokio::{runtime::Handle, task::JoinHandle};
use tracing::{debug, warn};

use crate::event_bus::{BusEvent, EventBus};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchEvent {
    /// The trimmed input changed; a commit is pending.
    Input { query: String },
    Query { query: String, immediate: bool },
    Clear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchTopic {
    Input,
    Query,
    Clear,
}

impl BusEvent for SearchEvent {
    type Topic = SearchTopic;

    fn topic(&self) -> SearchTopic {
        match self {
            Self::Input { .. } => SearchTopic::Input,
            Self::Query { .. } => SearchTopic::Query,
            Self::Clear => SearchTopic::Clear,
        }
    }
}

#[derive(Clone)]
pub struct SearchController {
    inner: Arc<SearchInner>,
}

struct SearchInner {
    events: EventBus<SearchEvent>,
    state: Mutex<SearchState>,
}

struct SearchState {
    committed: String,
    debounce: Duration,
    // Bumped on every input and commit; a timer only commits if its epoch is
    // still current.
    epoch: u64,
    pending: Option<JoinHandle<()>>,
}

impl SearchState {
    fn cancel_pending(&mut self) {
        if let Some(task) = self.pending.take() {
            task.abort();
        }
    }
}

impl Default for SearchController {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}

impl SearchController {
    pub fn new(debounce: Duration) -> Self {
        Self {
            inner: Arc::new(SearchInner {
                events: EventBus::new(),
                state: Mutex::new(SearchState {
                    committed: String::new(),
                    debounce,
                    epoch: 0,
                    pending: None,
                }),
            }),
        }
    }

    pub fn events(&self) -> &EventBus<SearchEvent> {
        &self.inner.events
    }

    pub fn current_query(&self) -> String {
        self.lock().committed.clone()
    }

    pub fn has_pending(&self) -> bool {
        self.lock().pending.is_some()
    }

    pub fn set_debounce_delay(&self, debounce: Duration) {
        self.lock().debounce = debounce;
    }

    /// Raw input change: restarts the debounce window.
    pub fn input(&self, raw: &str) {
        let query = raw.trim().to_string();
        let epoch = {
            let mut state = self.lock();
            state.cancel_pending();
            if query == state.committed {
                return;
            }
            state.epoch += 1;
            state.epoch
        };

        self.inner.events.publish(SearchEvent::Input {
            query: query.clone(),
        });

        let Ok(runtime) = Handle::try_current() else {
            warn!("no async runtime available, committing search without debounce");
            self.commit_if_current(epoch, query);
            return;
        };

        let mut state = self.lock();
        // An input handler may already have moved things on.
        if state.epoch != epoch {
            return;
        }
        let delay = state.debounce;
        let weak: Weak<SearchInner> = Arc::downgrade(&self.inner);
        state.pending = Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                SearchController { inner }.commit_if_current(epoch, query);
            }
        }));
    }

    /// Enter-key style submit, bypassing the debounce window.
    pub fn submit(&self, raw: &str) {
        self.commit(raw.trim().to_string(), true);
    }

    pub fn set_query(&self, raw: &str) {
        self.submit(raw);
    }

    pub fn clear(&self) {
        self.commit(String::new(), true);
    }

    /// Cancels any pending commit and drops every subscriber. Safe to call
    /// repeatedly.
    pub fn destroy(&self) {
        {
            let mut state = self.lock();
            state.cancel_pending();
            state.epoch += 1;
        }
        self.inner.events.clear();
    }

    fn commit_if_current(&self, epoch: u64, query: String) {
        {
            let mut state = self.lock();
            if state.epoch != epoch {
                debug!(%query, "discarding stale debounced search");
                return;
            }
            state.pending = None;
        }
        self.commit(query, false);
    }

    fn commit(&self, query: String, immediate: bool) {
        {
            let mut state = self.lock();
            state.cancel_pending();
            state.epoch += 1;
            state.committed = query.clone();
        }

        debug!(%query, immediate, "search committed");
        if query.is_empty() {
            self.inner.events.publish(SearchEvent::Clear);
        } else {
            self.inner
                .events
                .publish(SearchEvent::Query { query, immediate });
        }
    }

    fn lock(&self) -> MutexGuard<'_, SearchState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[path = "tests/search_tests.rs"]
mod tests;
