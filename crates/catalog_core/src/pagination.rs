use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use shared::domain::total_pages;
use tracing::debug;

use crate::event_bus::{BusEvent, EventBus};

pub const DEFAULT_MAX_VISIBLE_PAGES: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginationEvent {
    PageChanged { page: u32, offset: u64, limit: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaginationTopic {
    PageChanged,
}

impl BusEvent for PaginationEvent {
    type Topic = PaginationTopic;

    fn topic(&self) -> PaginationTopic {
        match self {
            Self::PageChanged { .. } => PaginationTopic::PageChanged,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageButton {
    Page { number: u32, active: bool },
    Ellipsis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationSnapshot {
    pub current_page: u32,
    pub total_pages: u32,
    pub page_size: u32,
    pub total_items: u32,
}

#[derive(Clone)]
pub struct PaginationController {
    inner: Arc<PaginationInner>,
}

struct PaginationInner {
    events: EventBus<PaginationEvent>,
    max_visible: u32,
    state: Mutex<PaginationSnapshot>,
}

impl PaginationController {
    pub fn new(page_size: u32) -> Self {
        Self::with_window(page_size, DEFAULT_MAX_VISIBLE_PAGES)
    }

    pub fn with_window(page_size: u32, max_visible: u32) -> Self {
        Self {
            inner: Arc::new(PaginationInner {
                events: EventBus::new(),
                max_visible: max_visible.max(1),
                state: Mutex::new(PaginationSnapshot {
                    current_page: 1,
                    total_pages: 1,
                    page_size: page_size.max(1),
                    total_items: 0,
                }),
            }),
        }
    }

    pub fn events(&self) -> &EventBus<PaginationEvent> {
        &self.inner.events
    }

    pub fn snapshot(&self) -> PaginationSnapshot {
        *self.lock()
    }

    pub fn current_page(&self) -> u32 {
        self.lock().current_page
    }

    pub fn total_pages(&self) -> u32 {
        self.lock().total_pages
    }

    pub fn page_size(&self) -> u32 {
        self.lock().page_size
    }

    pub fn total_items(&self) -> u32 {
        self.lock().total_items
    }

    pub fn set_total_items(&self, total_items: u32) {
        let mut state = self.lock();
        state.total_items = total_items;
        state.total_pages = total_pages(total_items, state.page_size);
        if state.current_page > state.total_pages {
            state.current_page = state.total_pages;
        }
    }

    /// Out-of-range pages and the current page are ignored.
    pub fn go_to_page(&self, page: u32) -> bool {
        let event = {
            let mut state = self.lock();
            if page == 0 || page > state.total_pages || page == state.current_page {
                return false;
            }
            state.current_page = page;
            PaginationEvent::PageChanged {
                page,
                offset: offset_of(page, state.page_size),
                limit: state.page_size,
            }
        };
        debug!(page, "page changed");
        self.inner.events.publish(event);
        true
    }

    pub fn next_page(&self) -> bool {
        let page = self.current_page();
        self.go_to_page(page.saturating_add(1))
    }

    pub fn previous_page(&self) -> bool {
        let page = self.current_page();
        page > 1 && self.go_to_page(page - 1)
    }

    pub fn reset(&self) {
        let mut state = self.lock();
        state.current_page = 1;
        state.total_items = 0;
        state.total_pages = 1;
    }

    /// Changing the page size returns to the first page without publishing.
    pub fn set_page_size(&self, page_size: u32) -> bool {
        let mut state = self.lock();
        if page_size == 0 || page_size == state.page_size {
            return false;
        }
        state.page_size = page_size;
        state.total_pages = total_pages(state.total_items, page_size);
        state.current_page = 1;
        true
    }

    pub fn current_offset(&self) -> u64 {
        let state = self.lock();
        offset_of(state.current_page, state.page_size)
    }

    /// 1-based inclusive item range of the current page, `None` when empty.
    pub fn current_range(&self) -> Option<(u64, u64)> {
        let state = self.lock();
        if state.total_items == 0 {
            return None;
        }
        let start = offset_of(state.current_page, state.page_size) + 1;
        let end = (u64::from(state.current_page) * u64::from(state.page_size))
            .min(u64::from(state.total_items));
        Some((start, end))
    }

    pub fn summary(&self) -> String {
        match self.current_range() {
            Some((start, end)) => {
                format!("Showing {start}-{end} of {} Pokemon", self.total_items())
            }
            None => "No Pokemon found".to_string(),
        }
    }

    pub fn buttons(&self) -> Vec<PageButton> {
        let state = self.lock();
        page_window(state.current_page, state.total_pages, self.inner.max_visible)
    }

    pub fn destroy(&self) {
        self.inner.events.clear();
    }

    fn lock(&self) -> MutexGuard<'_, PaginationSnapshot> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn offset_of(page: u32, page_size: u32) -> u64 {
    u64::from(page.saturating_sub(1)) * u64::from(page_size)
}

/// At most `max_visible` contiguous pages around `current`, with the first and
/// last page (plus an ellipsis for any gap) added when they fall outside.
pub fn page_window(current: u32, total: u32, max_visible: u32) -> Vec<PageButton> {
    let total = total.max(1);
    let current = current.clamp(1, total);
    let max_visible = max_visible.max(1);

    let mut start = current.saturating_sub(max_visible / 2).max(1);
    let end = start.saturating_add(max_visible - 1).min(total);
    start = end.saturating_sub(max_visible - 1).max(1);

    let mut buttons = Vec::with_capacity(max_visible as usize + 4);
    if start > 1 {
        buttons.push(PageButton::Page {
            number: 1,
            active: false,
        });
        if start > 2 {
            buttons.push(PageButton::Ellipsis);
        }
    }

    buttons.extend((start..=end).map(|number| PageButton::Page {
        number,
        active: number == current,
    }));

    if end < total {
        if end < total - 1 {
            buttons.push(PageButton::Ellipsis);
        }
        buttons.push(PageButton::Page {
            number: total,
            active: false,
        });
    }
    buttons
}

#[cfg(test)]
#[path = "tests/pagination_tests.rs"]
mod tests;
