use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use futures::{stream, StreamExt};
use serde_json::Value;
use shared::{
    domain::{ActiveFilters, Entity, EntityId, EntityRef, PageResult},
    error::CatalogError,
    protocol::{ListResponse, NamedResource, RawEntity},
};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::{
    config::CatalogSettings,
    transport::{CacheKey, CatalogRequest, CatalogTransport},
};

type CacheSlot = Arc<OnceCell<Value>>;

/// Names known to the remote list endpoint, fetched once per cache lifetime.
#[derive(Debug)]
struct NameIndex {
    total_count: u32,
    entries: Vec<NamedResource>,
}

/// `generation` moves on every cache clear, so an index fetched before the
/// clear is never stored after it.
#[derive(Debug, Default)]
struct IndexSlot {
    generation: u64,
    index: Option<Arc<NameIndex>>,
}

pub struct DataService {
    transport: Arc<dyn CatalogTransport>,
    catalog_limit: u32,
    batch_concurrency: usize,
    cache: Mutex<HashMap<CacheKey, CacheSlot>>,
    name_index: Mutex<IndexSlot>,
}

impl DataService {
    pub fn new(transport: Arc<dyn CatalogTransport>, settings: &CatalogSettings) -> Self {
        Self {
            transport,
            catalog_limit: settings.catalog_limit.max(1),
            batch_concurrency: settings.batch_concurrency.max(1),
            cache: Mutex::new(HashMap::new()),
            name_index: Mutex::new(IndexSlot::default()),
        }
    }

    pub async fn fetch_entity(
        &self,
        reference: impl Into<EntityRef>,
    ) -> Result<Entity, CatalogError> {
        let request = CatalogRequest::Entity(reference.into());
        let value = self.cached_fetch(&request).await?;
        let raw: RawEntity = serde_json::from_value(value)
            .map_err(|err| CatalogError::decode(request.to_string(), err.to_string()))?;
        Entity::from_raw(raw)
            .map_err(|message| CatalogError::decode(request.to_string(), message))
    }

    /// Fetches every reference concurrently and keeps the successes in input
    /// order. Individual failures are logged and dropped.
    pub async fn fetch_batch<I, R>(&self, references: I) -> Vec<Entity>
    where
        I: IntoIterator<Item = R>,
        R: Into<EntityRef>,
    {
        let references: Vec<EntityRef> = references.into_iter().map(Into::into).collect();
        let requested = references.len();

        let results: Vec<(EntityRef, Result<Entity, CatalogError>)> = stream::iter(references)
            .map(|reference| async move {
                let result = self.fetch_entity(reference.clone()).await;
                (reference, result)
            })
            .buffered(self.batch_concurrency)
            .collect()
            .await;

        let mut items = Vec::with_capacity(results.len());
        for (reference, result) in results {
            match result {
                Ok(entity) => items.push(entity),
                Err(err) => warn!(entity = %reference, error = %err, "dropping entity from batch"),
            }
        }

        if items.len() < requested {
            info!(
                requested,
                fetched = items.len(),
                "batch completed with partial failures"
            );
        }
        items
    }

    pub async fn fetch_page(&self, page: u32, page_size: u32) -> Result<PageResult, CatalogError> {
        let page = page.max(1);
        let page_size = page_size.max(1);
        let total = self.total_known_count().await?;

        let start = u64::from(page - 1) * u64::from(page_size) + 1;
        if start > u64::from(total) {
            debug!(page, total, "requested page is past the end of the catalog");
            return Ok(PageResult::new(Vec::new(), total, page, page_size));
        }

        // start <= total, so both ends fit in u32.
        let first = start as u32;
        let last = (start + u64::from(page_size) - 1).min(u64::from(total)) as u32;
        let items = self.fetch_batch((first..=last).map(EntityId)).await;
        Ok(PageResult::new(items, total, page, page_size))
    }

    /// Startup load: the first `count` entities.
    pub async fn initial_page(&self, count: u32) -> Result<PageResult, CatalogError> {
        self.fetch_page(1, count).await
    }

    pub async fn search_by_name(
        &self,
        query: &str,
        page: u32,
        page_size: u32,
    ) -> Result<PageResult, CatalogError> {
        let page_size = page_size.max(1);
        let term = query.trim().to_lowercase();
        if term.is_empty() {
            return Ok(PageResult::empty(page_size));
        }

        let index = self.name_index().await?;
        let matches: Vec<&NamedResource> = index
            .entries
            .iter()
            .filter(|entry| entry.name.contains(&term))
            .collect();

        if matches.is_empty() {
            debug!(query = %term, "no index match, falling back to direct lookup");
            return Ok(match self.fetch_entity(EntityRef::parse(&term)).await {
                Ok(entity) => PageResult::new(vec![entity], 1, 1, page_size),
                Err(err) => {
                    debug!(query = %term, error = %err, "direct lookup missed");
                    PageResult::empty(page_size)
                }
            });
        }

        let total = matches.len() as u32;
        let references: Vec<EntityRef> = page_slice(&matches, page, page_size)
            .iter()
            .map(|entry| match entry.id() {
                Some(id) if id > 0 => EntityRef::Id(EntityId(id)),
                _ => EntityRef::Name(entry.name.clone()),
            })
            .collect();

        let items = self.fetch_batch(references).await;
        Ok(PageResult::new(items, total, page, page_size))
    }

    /// Fetches the whole filter universe before narrowing, so this is the most
    /// expensive strategy.
    pub async fn filter_entities(
        &self,
        filters: &ActiveFilters,
        page: u32,
        page_size: u32,
    ) -> Result<PageResult, CatalogError> {
        let page_size = page_size.max(1);
        let total = self.total_known_count().await?;

        let (first, last) = match filters.generation {
            Some(generation) => {
                let (first, last) = generation.id_range();
                (first, last.min(total))
            }
            None => (1, total),
        };

        let universe: Vec<EntityId> = if first <= last {
            (first..=last).map(EntityId).collect()
        } else {
            Vec::new()
        };
        debug!(universe = universe.len(), "resolved filter universe");

        let matching: Vec<Entity> = self
            .fetch_batch(universe)
            .await
            .into_iter()
            .filter(|entity| filters.matches(entity))
            .collect();

        Ok(paginate(matching, page, page_size))
    }

    pub async fn total_known_count(&self) -> Result<u32, CatalogError> {
        Ok(self.name_index().await?.total_count)
    }

    /// Drops every cached payload and the name index.
    pub fn clear_cache(&self) {
        let dropped = {
            let mut cache = lock(&self.cache);
            let dropped = cache.len();
            cache.clear();
            dropped
        };
        {
            let mut slot = lock(&self.name_index);
            slot.generation += 1;
            slot.index = None;
        }
        info!(dropped, "catalog cache cleared");
    }

    /// Number of payloads currently held.
    pub fn cache_size(&self) -> usize {
        lock(&self.cache)
            .values()
            .filter(|slot| slot.initialized())
            .count()
    }

    async fn name_index(&self) -> Result<Arc<NameIndex>, CatalogError> {
        let generation = {
            let slot = lock(&self.name_index);
            if let Some(index) = &slot.index {
                return Ok(Arc::clone(index));
            }
            slot.generation
        };

        let request = CatalogRequest::List {
            limit: self.catalog_limit,
            offset: 0,
        };
        let value = self.cached_fetch(&request).await?;
        let list: ListResponse = serde_json::from_value(value)
            .map_err(|err| CatalogError::decode(request.to_string(), err.to_string()))?;

        let total_count = list.count.min(self.catalog_limit);
        let mut entries = list.results;
        entries.truncate(total_count as usize);
        let index = Arc::new(NameIndex {
            total_count,
            entries,
        });
        debug!(
            total = index.total_count,
            names = index.entries.len(),
            "name index materialized"
        );

        let mut slot = lock(&self.name_index);
        if slot.generation == generation {
            slot.index = Some(Arc::clone(&index));
        } else {
            debug!("cache cleared while fetching the name index, not keeping it");
        }
        Ok(index)
    }

    // Concurrent callers asking for the same key share one in-flight fetch;
    // failures leave the slot empty so a later call can try again.
    async fn cached_fetch(&self, request: &CatalogRequest) -> Result<Value, CatalogError> {
        let key = request.cache_key();
        let slot = Arc::clone(lock(&self.cache).entry(key.clone()).or_default());

        if let Some(value) = slot.get() {
            debug!(%key, "cache hit");
            return Ok(value.clone());
        }

        let value = slot
            .get_or_try_init(|| async {
                debug!(%key, "cache miss");
                self.transport.fetch(request).await
            })
            .await?;
        Ok(value.clone())
    }
}

fn paginate(items: Vec<Entity>, page: u32, page_size: u32) -> PageResult {
    let total = items.len() as u32;
    let visible = page_slice(&items, page, page_size).to_vec();
    PageResult::new(visible, total, page, page_size)
}

fn page_slice<T>(items: &[T], page: u32, page_size: u32) -> &[T] {
    let start = (page.saturating_sub(1) as usize).saturating_mul(page_size as usize);
    if start >= items.len() {
        return &[];
    }
    let end = start.saturating_add(page_size as usize).min(items.len());
    &items[start..end]
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
#[path = "tests/data_service_tests.rs"]
mod tests;
