use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::protocol::RawEntity;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(pub u32);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(EntityId);

pub const PLACEHOLDER_IMAGE_URL: &str = "/placeholder-pokemon.png";
pub const OFFICIAL_ARTWORK_KEY: &str = "official-artwork";
pub const STAT_MIN: u32 = 0;
pub const STAT_MAX: u32 = 255;
const STAT_PERCENT_SCALE: f64 = 200.0;

pub const KNOWN_TYPES: [&str; 18] = [
    "normal", "fire", "water", "electric", "grass", "ice", "fighting", "poison", "ground",
    "flying", "psychic", "bug", "rock", "ghost", "dragon", "dark", "steel", "fairy",
];

/// Reference to a catalog entity by numeric id or by canonical name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityRef {
    Id(EntityId),
    Name(String),
}

impl EntityRef {
    /// Numeric strings become ids, everything else a lowercased name.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.parse::<u32>() {
            Ok(id) if id > 0 => Self::Id(EntityId(id)),
            _ => Self::Name(trimmed.to_lowercase()),
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Name(name) => f.write_str(name),
        }
    }
}

impl From<u32> for EntityRef {
    fn from(value: u32) -> Self {
        Self::Id(EntityId(value))
    }
}

impl From<EntityId> for EntityRef {
    fn from(value: EntityId) -> Self {
        Self::Id(value)
    }
}

impl From<&str> for EntityRef {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}

impl From<String> for EntityRef {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatEntry {
    pub display_name: String,
    pub value: u32,
    pub percentage: f64,
}

impl StatEntry {
    fn from_base(remote_name: &str, value: u32) -> Self {
        Self {
            display_name: title_case(remote_name),
            value,
            percentage: (f64::from(value) / STAT_PERCENT_SCALE * 100.0).min(100.0),
        }
    }
}

/// One species record. Built once from a raw payload and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    id: EntityId,
    name: String,
    types: Vec<String>,
    stats: BTreeMap<String, StatEntry>,
    height: f64,
    weight: f64,
    image_url: String,
}

impl Entity {
    pub fn from_raw(raw: RawEntity) -> Result<Self, String> {
        if raw.id == 0 {
            return Err("entity id must be positive".to_string());
        }
        let name = raw.name.trim().to_lowercase();
        if name.is_empty() {
            return Err(format!("entity {} has an empty name", raw.id));
        }

        let mut slots = raw.types;
        slots.sort_by_key(|slot| slot.slot);
        let mut types: Vec<String> = Vec::with_capacity(slots.len());
        for slot in slots {
            let kind = slot.kind.name.to_lowercase();
            if !types.contains(&kind) {
                types.push(kind);
            }
        }

        let stats = raw
            .stats
            .iter()
            .map(|stat| {
                (
                    stat_key(&stat.stat.name),
                    StatEntry::from_base(&stat.stat.name, stat.base_stat),
                )
            })
            .collect();

        let image_url = raw
            .sprites
            .other
            .get(OFFICIAL_ARTWORK_KEY)
            .and_then(|artwork| artwork.front_default.clone())
            .or(raw.sprites.front_default)
            .unwrap_or_else(|| PLACEHOLDER_IMAGE_URL.to_string());

        Ok(Self {
            id: EntityId(raw.id),
            name,
            types,
            stats,
            height: f64::from(raw.height) / 10.0,
            weight: f64::from(raw.weight) / 10.0,
            image_url,
        })
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn display_name(&self) -> String {
        capitalize(&self.name)
    }

    pub fn types(&self) -> &[String] {
        &self.types
    }

    pub fn primary_type(&self) -> &str {
        self.types.first().map_or("normal", String::as_str)
    }

    pub fn stats(&self) -> &BTreeMap<String, StatEntry> {
        &self.stats
    }

    pub fn stat_value(&self, key: &str) -> Option<u32> {
        self.stats.get(key).map(|entry| entry.value)
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn image_url(&self) -> &str {
        &self.image_url
    }

    pub fn type_colors(&self) -> Vec<&'static str> {
        self.types.iter().map(|kind| type_color(kind)).collect()
    }

    /// Empty queries match everything; otherwise name or any type contains the query.
    pub fn matches_search(&self, query: &str) -> bool {
        let term = query.trim().to_lowercase();
        if term.is_empty() {
            return true;
        }
        self.name.contains(&term) || self.types.iter().any(|kind| kind.contains(&term))
    }
}

pub fn type_color(kind: &str) -> &'static str {
    match kind {
        "fire" => "#F08030",
        "water" => "#6890F0",
        "electric" => "#F8D030",
        "grass" => "#78C850",
        "ice" => "#98D8D8",
        "fighting" => "#C03028",
        "poison" => "#A040A0",
        "ground" => "#E0C068",
        "flying" => "#A890F0",
        "psychic" => "#F85888",
        "bug" => "#A8B820",
        "rock" => "#B8A038",
        "ghost" => "#705898",
        "dragon" => "#7038F8",
        "dark" => "#705848",
        "steel" => "#B8B8D0",
        "fairy" => "#EE99AC",
        _ => "#A8A878",
    }
}

/// `special-attack` -> `special_attack`.
pub fn stat_key(remote_name: &str) -> String {
    remote_name.replace('-', "_")
}

fn title_case(remote_name: &str) -> String {
    remote_name
        .split('-')
        .map(capitalize)
        .collect::<Vec<_>>()
        .join(" ")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Generation {
    I,
    II,
    III,
    IV,
    V,
    VI,
    VII,
    VIII,
    IX,
}

impl Generation {
    pub const ALL: [Self; 9] = [
        Self::I,
        Self::II,
        Self::III,
        Self::IV,
        Self::V,
        Self::VI,
        Self::VII,
        Self::VIII,
        Self::IX,
    ];

    /// Inclusive national id range introduced by this generation.
    pub fn id_range(self) -> (u32, u32) {
        match self {
            Self::I => (1, 151),
            Self::II => (152, 251),
            Self::III => (252, 386),
            Self::IV => (387, 493),
            Self::V => (494, 649),
            Self::VI => (650, 721),
            Self::VII => (722, 809),
            Self::VIII => (810, 905),
            Self::IX => (906, 1025),
        }
    }

    pub fn contains(self, id: EntityId) -> bool {
        let (first, last) = self.id_range();
        (first..=last).contains(&id.0)
    }

    pub fn number(self) -> u8 {
        match self {
            Self::I => 1,
            Self::II => 2,
            Self::III => 3,
            Self::IV => 4,
            Self::V => 5,
            Self::VI => 6,
            Self::VII => 7,
            Self::VIII => 8,
            Self::IX => 9,
        }
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Generation {:?}", self)
    }
}

impl FromStr for Generation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(number) = trimmed.parse::<u8>() {
            return Self::ALL
                .into_iter()
                .find(|generation| generation.number() == number)
                .ok_or_else(|| format!("unknown generation: {trimmed}"));
        }
        let upper = trimmed.to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|generation| format!("{generation:?}") == upper)
            .ok_or_else(|| format!("unknown generation: {trimmed}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatRange {
    pub min: u32,
    pub max: u32,
}

impl StatRange {
    pub const FULL: Self = Self {
        min: STAT_MIN,
        max: STAT_MAX,
    };

    /// A min above max collapses onto max.
    pub fn new(min: u32, max: u32) -> Self {
        Self {
            min: min.min(max),
            max,
        }
    }

    pub fn contains(&self, value: u32) -> bool {
        (self.min..=self.max).contains(&value)
    }

    pub fn is_full(&self) -> bool {
        self.min <= STAT_MIN && self.max >= STAT_MAX
    }
}

impl Default for StatRange {
    fn default() -> Self {
        Self::FULL
    }
}

/// Immutable snapshot of the filter selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveFilters {
    pub types: BTreeSet<String>,
    pub generation: Option<Generation>,
    pub stat_ranges: BTreeMap<String, StatRange>,
}

impl ActiveFilters {
    pub fn has_narrowed_ranges(&self) -> bool {
        self.stat_ranges.values().any(|range| !range.is_full())
    }

    /// True when any part of the selection can exclude an entity.
    pub fn is_active(&self) -> bool {
        !self.types.is_empty() || self.generation.is_some() || self.has_narrowed_ranges()
    }

    pub fn matches(&self, entity: &Entity) -> bool {
        if !self.types.is_empty() && !entity.types().iter().any(|kind| self.types.contains(kind))
        {
            return false;
        }

        if let Some(generation) = self.generation {
            if !generation.contains(entity.id()) {
                return false;
            }
        }

        self.stat_ranges.iter().all(|(key, range)| {
            entity
                .stat_value(key)
                .map_or(true, |value| range.contains(value))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageResult {
    pub items: Vec<Entity>,
    pub total_count: u32,
    pub page: u32,
    pub total_pages: u32,
}

impl PageResult {
    /// Builds a result with `total_pages = ceil(total / size)` (at least 1) and the
    /// requested page clamped into range.
    pub fn new(items: Vec<Entity>, total_count: u32, page: u32, page_size: u32) -> Self {
        let total_pages = total_pages(total_count, page_size);
        Self {
            items,
            total_count,
            page: page.clamp(1, total_pages),
            total_pages,
        }
    }

    pub fn empty(page_size: u32) -> Self {
        Self::new(Vec::new(), 0, 1, page_size)
    }

    pub fn is_no_results(&self) -> bool {
        self.items.is_empty() && self.total_count == 0
    }
}

pub fn total_pages(total_count: u32, page_size: u32) -> u32 {
    total_count.div_ceil(page_size.max(1)).max(1)
}

#[cfg(test)]
#[path = "tests/domain_tests.rs"]
mod tests;
