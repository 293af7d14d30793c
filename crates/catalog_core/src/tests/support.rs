use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use serde_json::{json, Value};
use shared::{domain::EntityRef, error::CatalogError};

use crate::{
    config::CatalogSettings,
    transport::{CatalogRequest, CatalogTransport},
    DataService,
};

pub(crate) fn species(id: u32, name: &str, types: &[&str], hp: u32, attack: u32) -> Value {
    let types: Vec<Value> = types
        .iter()
        .enumerate()
        .map(|(slot, kind)| json!({ "slot": slot + 1, "type": { "name": kind, "url": "" } }))
        .collect();
    json!({
        "id": id,
        "name": name,
        "height": 7,
        "weight": 69,
        "types": types,
        "stats": [
            { "base_stat": hp, "stat": { "name": "hp", "url": "" } },
            { "base_stat": attack, "stat": { "name": "attack", "url": "" } }
        ],
        "sprites": { "front_default": format!("https://img.fixture/{id}.png") }
    })
}

/// Contiguous ids `1..=count`; every third is fire, the rest water.
pub(crate) fn numbered_catalog(count: u32) -> Vec<Value> {
    (1..=count)
        .map(|id| {
            let kind = if id % 3 == 0 { "fire" } else { "water" };
            species(id, &format!("species-{id}"), &[kind], 40 + id % 50, 50)
        })
        .collect()
}

pub(crate) fn starter_catalog() -> Vec<Value> {
    vec![
        species(1, "bulbasaur", &["grass", "poison"], 45, 49),
        species(2, "ivysaur", &["grass", "poison"], 60, 62),
        species(3, "charmander", &["fire"], 39, 52),
        species(4, "charizard", &["fire", "flying"], 78, 84),
        species(5, "pikachu", &["electric"], 35, 55),
        species(6, "raichu", &["electric"], 60, 90),
    ]
}

pub(crate) struct FixtureTransport {
    entities: HashMap<String, Value>,
    index: Vec<(u32, String)>,
    failures: HashMap<String, CatalogError>,
    list_failure: Mutex<Option<CatalogError>>,
    delay: Option<Duration>,
    calls: Mutex<HashMap<String, usize>>,
}

impl FixtureTransport {
    pub(crate) fn new(entities: Vec<Value>) -> Self {
        let mut by_key = HashMap::new();
        let mut index = Vec::new();
        for entity in entities {
            let id = entity["id"].as_u64().unwrap_or_default() as u32;
            let name = entity["name"].as_str().unwrap_or_default().to_string();
            index.push((id, name.clone()));
            by_key.insert(id.to_string(), entity.clone());
            by_key.insert(name, entity);
        }
        Self {
            entities: by_key,
            index,
            failures: HashMap::new(),
            list_failure: Mutex::new(None),
            delay: None,
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Serves `reference` with `error` instead of its payload.
    pub(crate) fn failing(mut self, reference: &str, error: CatalogError) -> Self {
        self.failures.insert(reference.to_string(), error);
        self
    }

    /// Serves `reference` with a payload that is valid JSON but not an entity.
    pub(crate) fn malformed(mut self, reference: &str) -> Self {
        self.entities
            .insert(reference.to_string(), json!({ "id": "not-a-number" }));
        self
    }

    pub(crate) fn failing_list(self, error: CatalogError) -> Self {
        self.fail_list_from_now(error);
        self
    }

    /// Makes every later list request fail, including on a shared transport.
    pub(crate) fn fail_list_from_now(&self, error: CatalogError) {
        *self.list_failure.lock().unwrap() = Some(error);
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn calls_for(&self, cache_key: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .get(cache_key)
            .copied()
            .unwrap_or_default()
    }

    pub(crate) fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    pub(crate) fn entity_calls(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(key, _)| key.starts_with("entity:"))
            .map(|(_, count)| count)
            .sum()
    }
}

#[async_trait]
impl CatalogTransport for FixtureTransport {
    async fn fetch(&self, request: &CatalogRequest) -> Result<Value, CatalogError> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(request.cache_key().to_string())
            .or_default() += 1;

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match request {
            CatalogRequest::List { limit, offset } => {
                if let Some(err) = self.list_failure.lock().unwrap().clone() {
                    return Err(err);
                }
                let results: Vec<Value> = self
                    .index
                    .iter()
                    .skip(*offset as usize)
                    .take(*limit as usize)
                    .map(|(id, name)| {
                        let url = format!("https://fixture.local/pokemon/{id}/");
                        json!({ "name": name, "url": url })
                    })
                    .collect();
                Ok(json!({ "count": self.index.len(), "results": results }))
            }
            CatalogRequest::Entity(reference) => {
                let key = match reference {
                    EntityRef::Id(id) => id.to_string(),
                    EntityRef::Name(name) => name.clone(),
                };
                if let Some(err) = self.failures.get(&key) {
                    return Err(err.clone());
                }
                self.entities
                    .get(&key)
                    .cloned()
                    .ok_or_else(|| CatalogError::not_found(request.to_string()))
            }
        }
    }
}

pub(crate) fn service_over(transport: Arc<FixtureTransport>) -> DataService {
    DataService::new(transport, &CatalogSettings::default())
}
