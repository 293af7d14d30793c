pub mod config;
pub mod data_service;
pub mod event_bus;
pub mod filter;
pub mod orchestrator;
pub mod pagination;
pub mod search;
pub mod transport;

pub use config::{load_settings, CatalogSettings};
pub use data_service::DataService;
pub use event_bus::{BusEvent, EventBus, SubscriptionId};
pub use filter::{FilterController, FilterEvent, FilterTopic};
pub use orchestrator::{Orchestrator, OrchestratorStats, QueryState, RenderEvent, RenderTopic};
pub use pagination::{PageButton, PaginationController, PaginationEvent, PaginationTopic};
pub use search::{SearchController, SearchEvent, SearchTopic};
pub use transport::{CatalogRequest, CatalogTransport, HttpTransport};

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;
