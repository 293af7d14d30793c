use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use shared::{
    domain::{ActiveFilters, Entity, EntityId, PageResult},
    error::CatalogError,
};
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tracing::{debug, info, warn};

use crate::{
    data_service::DataService,
    event_bus::{BusEvent, EventBus, SubscriptionId},
    filter::{FilterController, FilterEvent, FilterTopic},
    pagination::{PaginationController, PaginationEvent, PaginationTopic},
    search::{SearchController, SearchEvent, SearchTopic},
};

#[derive(Debug, Clone, PartialEq)]
pub enum RenderEvent {
    Loading { message: String },
    Rendered(PageResult),
    NoResults,
    Error { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderTopic {
    Loading,
    Rendered,
    NoResults,
    Error,
}

impl BusEvent for RenderEvent {
    type Topic = RenderTopic;

    fn topic(&self) -> RenderTopic {
        match self {
            Self::Loading { .. } => RenderTopic::Loading,
            Self::Rendered(_) => RenderTopic::Rendered,
            Self::NoResults => RenderTopic::NoResults,
            Self::Error { .. } => RenderTopic::Error,
        }
    }
}

/// Everything that decides which strategy runs and with which arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryState {
    pub search_query: String,
    pub filters: ActiveFilters,
    pub page: u32,
    pub page_size: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Search,
    Filter,
    Page,
}

impl QueryState {
    /// Search wins over filters; plain paging is the fallback.
    pub fn strategy(&self) -> Strategy {
        if !self.search_query.is_empty() {
            Strategy::Search
        } else if self.filters.is_active() {
            Strategy::Filter
        } else {
            Strategy::Page
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorStats {
    pub displayed: usize,
    pub total_count: u32,
    pub cache_size: usize,
    pub is_loading: bool,
}

#[derive(Debug, Default)]
struct ViewState {
    last: Option<PageResult>,
    loading: bool,
}

#[derive(Debug, Clone, Copy)]
struct Subscriptions {
    search_query: SubscriptionId,
    search_clear: SubscriptionId,
    filters: SubscriptionId,
    page: SubscriptionId,
}

/// Controller events only queue a refresh; `run` or `process_pending` resolves
/// the latest [`QueryState`] with exactly one data strategy.
pub struct Orchestrator {
    data: Arc<DataService>,
    search: SearchController,
    filters: FilterController,
    pagination: PaginationController,
    render: EventBus<RenderEvent>,
    state: Mutex<QueryState>,
    view: Mutex<ViewState>,
    refresh_tx: Mutex<Option<mpsc::UnboundedSender<()>>>,
    refresh_rx: AsyncMutex<mpsc::UnboundedReceiver<()>>,
    subscriptions: Mutex<Option<Subscriptions>>,
}

impl Orchestrator {
    pub fn new(
        data: Arc<DataService>,
        search: SearchController,
        filters: FilterController,
        pagination: PaginationController,
    ) -> Arc<Self> {
        let (refresh_tx, refresh_rx) = mpsc::unbounded_channel();
        let state = QueryState {
            search_query: search.current_query(),
            filters: filters.active_filters(),
            page: 1,
            page_size: pagination.page_size(),
        };

        let orchestrator = Arc::new(Self {
            data,
            search,
            filters,
            pagination,
            render: EventBus::new(),
            state: Mutex::new(state),
            view: Mutex::new(ViewState::default()),
            refresh_tx: Mutex::new(Some(refresh_tx)),
            refresh_rx: AsyncMutex::new(refresh_rx),
            subscriptions: Mutex::new(None),
        });
        orchestrator.wire();
        orchestrator
    }

    pub fn render_events(&self) -> &EventBus<RenderEvent> {
        &self.render
    }

    pub fn search(&self) -> &SearchController {
        &self.search
    }

    pub fn filters(&self) -> &FilterController {
        &self.filters
    }

    pub fn pagination(&self) -> &PaginationController {
        &self.pagination
    }

    pub fn query_state(&self) -> QueryState {
        lock(&self.state).clone()
    }

    /// Items of the last successful render.
    pub fn current_items(&self) -> Vec<Entity> {
        lock(&self.view)
            .last
            .as_ref()
            .map(|result| result.items.clone())
            .unwrap_or_default()
    }

    pub fn entity_by_id(&self, id: EntityId) -> Option<Entity> {
        lock(&self.view)
            .last
            .as_ref()
            .and_then(|result| result.items.iter().find(|entity| entity.id() == id))
            .cloned()
    }

    pub fn stats(&self) -> OrchestratorStats {
        let view = lock(&self.view);
        OrchestratorStats {
            displayed: view.last.as_ref().map_or(0, |result| result.items.len()),
            total_count: view.last.as_ref().map_or(0, |result| result.total_count),
            cache_size: self.data.cache_size(),
            is_loading: view.loading,
        }
    }

    /// Drains queued refresh requests until [`Orchestrator::destroy`] is called.
    pub async fn run(self: Arc<Self>) {
        let mut rx = self.refresh_rx.lock().await;
        while rx.recv().await.is_some() {
            let mut coalesced = 0usize;
            while rx.try_recv().is_ok() {
                coalesced += 1;
            }
            if coalesced > 0 {
                debug!(coalesced, "coalesced refresh requests");
            }
            self.resolve().await;
        }
        debug!("orchestrator loop finished");
    }

    /// Resolves once if any refresh is queued. Returns whether it did.
    pub async fn process_pending(&self) -> bool {
        let queued = {
            let Ok(mut rx) = self.refresh_rx.try_lock() else {
                return false;
            };
            let mut queued = false;
            while rx.try_recv().is_ok() {
                queued = true;
            }
            queued
        };
        if queued {
            self.resolve().await;
        }
        queued
    }

    /// Startup load of the first page.
    pub async fn load_initial(&self) -> Option<RenderEvent> {
        self.resolve().await
    }

    /// Drops every cached payload and reloads the current query.
    pub async fn refresh(&self) -> Option<RenderEvent> {
        self.data.clear_cache();
        self.resolve().await
    }

    /// Runs the strategy for the current snapshot and publishes the outcome.
    /// Returns `None` when the snapshot changed while fetching; a newer
    /// refresh is already queued in that case.
    pub async fn resolve(&self) -> Option<RenderEvent> {
        let snapshot = self.query_state();
        let strategy = snapshot.strategy();
        info!(?strategy, page = snapshot.page, "resolving catalog query");

        self.set_loading(true);
        self.render.publish(RenderEvent::Loading {
            message: loading_message(strategy, &snapshot),
        });

        let result = match strategy {
            Strategy::Search => {
                self.data
                    .search_by_name(&snapshot.search_query, snapshot.page, snapshot.page_size)
                    .await
            }
            Strategy::Filter => {
                self.data
                    .filter_entities(&snapshot.filters, snapshot.page, snapshot.page_size)
                    .await
            }
            Strategy::Page => self.data.fetch_page(snapshot.page, snapshot.page_size).await,
        };

        if *lock(&self.state) != snapshot {
            debug!(?strategy, "query changed while fetching, discarding result");
            return None;
        }
        self.set_loading(false);

        let event = match result {
            Ok(result) => self.accept(result),
            Err(err) => failure_event(strategy, &err),
        };
        self.render.publish(event.clone());
        Some(event)
    }

    /// Detaches from every controller, stops [`Orchestrator::run`] and drops
    /// render subscribers. Safe to call more than once.
    pub fn destroy(&self) {
        lock(&self.refresh_tx).take();
        if let Some(subscriptions) = lock(&self.subscriptions).take() {
            self.search.events().unsubscribe(subscriptions.search_query);
            self.search.events().unsubscribe(subscriptions.search_clear);
            self.filters.events().unsubscribe(subscriptions.filters);
            self.pagination.events().unsubscribe(subscriptions.page);
        }
        self.render.clear();
    }

    fn accept(&self, result: PageResult) -> RenderEvent {
        self.pagination.set_total_items(result.total_count);
        let event = if result.is_no_results() {
            RenderEvent::NoResults
        } else {
            RenderEvent::Rendered(result.clone())
        };
        lock(&self.view).last = Some(result);
        event
    }

    fn wire(self: &Arc<Self>) {
        let search_query = self.search.events().subscribe(SearchTopic::Query, {
            let weak = Arc::downgrade(self);
            move |event| {
                if let SearchEvent::Query { query, .. } = event {
                    with_live(&weak, |this| {
                        this.update(|state| state.search_query = query.clone(), true)
                    });
                }
                Ok(())
            }
        });

        let search_clear = self.search.events().subscribe(SearchTopic::Clear, {
            let weak = Arc::downgrade(self);
            move |_| {
                with_live(&weak, |this| {
                    this.update(|state| state.search_query.clear(), true)
                });
                Ok(())
            }
        });

        let filters = self.filters.events().subscribe(FilterTopic::Changed, {
            let weak = Arc::downgrade(self);
            move |event| {
                let FilterEvent::Changed(filters) = event;
                with_live(&weak, |this| {
                    this.update(|state| state.filters = filters.clone(), true)
                });
                Ok(())
            }
        });

        let page = self
            .pagination
            .events()
            .subscribe(PaginationTopic::PageChanged, {
                let weak = Arc::downgrade(self);
                move |event| {
                    let PaginationEvent::PageChanged { page, limit, .. } = *event;
                    with_live(&weak, |this| {
                        this.update(
                            |state| {
                                state.page = page;
                                state.page_size = limit;
                            },
                            false,
                        )
                    });
                    Ok(())
                }
            });

        *lock(&self.subscriptions) = Some(Subscriptions {
            search_query,
            search_clear,
            filters,
            page,
        });
    }

    fn update(&self, change: impl FnOnce(&mut QueryState), reset_page: bool) {
        let page_size = self.pagination.page_size();
        {
            let mut state = lock(&self.state);
            change(&mut state);
            if reset_page {
                state.page = 1;
                state.page_size = page_size;
            }
        }
        if reset_page {
            self.pagination.reset();
        }

        let sent = lock(&self.refresh_tx)
            .as_ref()
            .is_some_and(|tx| tx.send(()).is_ok());
        if !sent {
            warn!("refresh queue closed, dropping query update");
        }
    }

    fn set_loading(&self, loading: bool) {
        lock(&self.view).loading = loading;
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.destroy();
    }
}

fn with_live(weak: &Weak<Orchestrator>, apply: impl FnOnce(&Orchestrator)) {
    if let Some(this) = weak.upgrade() {
        apply(&this);
    }
}

fn loading_message(strategy: Strategy, state: &QueryState) -> String {
    match strategy {
        Strategy::Search => format!("Searching for \"{}\"...", state.search_query),
        Strategy::Filter => "Filtering Pokemon...".to_string(),
        Strategy::Page => "Loading Pokemon...".to_string(),
    }
}

fn failure_event(strategy: Strategy, err: &CatalogError) -> RenderEvent {
    let context = match strategy {
        Strategy::Search => "Search",
        Strategy::Filter => "Filtering",
        Strategy::Page => "Loading",
    };
    warn!(?strategy, error = %err, "catalog query failed");
    RenderEvent::Error {
        message: format!("{context} failed: {}", err.user_message()),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
#[path = "tests/orchestrator_tests.rs"]
mod tests;
