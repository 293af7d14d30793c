use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use shared::domain::{stat_key, ActiveFilters, Entity, Generation, StatRange, KNOWN_TYPES};
use tracing::{debug, warn};

use crate::event_bus::{BusEvent, EventBus};

/// Stats that always carry a range, even when untouched.
pub const DEFAULT_RANGED_STATS: [&str; 2] = ["hp", "attack"];

#[derive(Debug, Clone, PartialEq)]
pub enum FilterEvent {
    Changed(ActiveFilters),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterTopic {
    Changed,
}

impl BusEvent for FilterEvent {
    type Topic = FilterTopic;

    fn topic(&self) -> FilterTopic {
        match self {
            Self::Changed(_) => FilterTopic::Changed,
        }
    }
}

#[derive(Clone)]
pub struct FilterController {
    inner: Arc<FilterInner>,
}

struct FilterInner {
    events: EventBus<FilterEvent>,
    state: Mutex<ActiveFilters>,
}

impl Default for FilterController {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterController {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(FilterInner {
                events: EventBus::new(),
                state: Mutex::new(default_filters()),
            }),
        }
    }

    pub fn events(&self) -> &EventBus<FilterEvent> {
        &self.inner.events
    }

    pub fn known_types() -> &'static [&'static str] {
        &KNOWN_TYPES
    }

    /// Returns the new selection state of `kind`, or `None` for an unknown type.
    pub fn toggle_type(&self, kind: &str) -> Option<bool> {
        let kind = kind.trim().to_lowercase();
        if !KNOWN_TYPES.contains(&kind.as_str()) {
            warn!(%kind, "ignoring unknown type filter");
            return None;
        }

        let selected = self.mutate(|filters| {
            if filters.types.remove(&kind) {
                false
            } else {
                filters.types.insert(kind.clone());
                true
            }
        });
        Some(selected)
    }

    pub fn set_generation(&self, generation: Option<Generation>) {
        self.mutate(|filters| filters.generation = generation);
    }

    pub fn set_stat_range(&self, stat: &str, min: u32, max: u32) {
        let key = stat_key(stat.trim());
        let range = StatRange::new(min, max);
        self.mutate(|filters| {
            filters.stat_ranges.insert(key, range);
        });
    }

    pub fn clear_all(&self) {
        self.mutate(|filters| *filters = default_filters());
    }

    pub fn active_filters(&self) -> ActiveFilters {
        self.lock().clone()
    }

    /// Types, a generation, or any narrowed stat range all count as active.
    pub fn has_active_filters(&self) -> bool {
        self.lock().is_active()
    }

    /// Pure evaluation against an already-fetched list; publishes nothing.
    pub fn apply_filters(&self, items: &[Entity]) -> Vec<Entity> {
        let filters = self.active_filters();
        items
            .iter()
            .filter(|entity| filters.matches(entity))
            .cloned()
            .collect()
    }

    pub fn destroy(&self) {
        self.inner.events.clear();
    }

    fn mutate<R>(&self, change: impl FnOnce(&mut ActiveFilters) -> R) -> R {
        let (result, snapshot) = {
            let mut filters = self.lock();
            let result = change(&mut filters);
            (result, filters.clone())
        };
        debug!(
            types = snapshot.types.len(),
            generation = ?snapshot.generation,
            "filters changed"
        );
        self.inner.events.publish(FilterEvent::Changed(snapshot));
        result
    }

    fn lock(&self) -> MutexGuard<'_, ActiveFilters> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn default_filters() -> ActiveFilters {
    ActiveFilters {
        stat_ranges: DEFAULT_RANGED_STATS
            .iter()
            .map(|stat| (stat.to_string(), StatRange::FULL))
            .collect(),
        ..ActiveFilters::default()
    }
}

#[cfg(test)]
#[path = "tests/filter_tests.rs"]
mod tests;
