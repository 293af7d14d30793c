use std::{fmt, time::Duration};

use anyhow::bail;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use shared::{domain::EntityRef, error::CatalogError};
use tracing::debug;
use url::Url;

const ENTITY_COLLECTION: &str = "pokemon";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One logical request against the remote catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CatalogRequest {
    Entity(EntityRef),
    List { limit: u32, offset: u32 },
}

impl CatalogRequest {
    pub fn cache_key(&self) -> CacheKey {
        match self {
            Self::Entity(reference) => CacheKey(format!("entity:{reference}")),
            Self::List { limit, offset } => CacheKey(format!("list:{limit}:{offset}")),
        }
    }
}

impl fmt::Display for CatalogRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entity(reference) => write!(f, "entity {reference}"),
            Self::List { limit, offset } => write!(f, "list (limit {limit}, offset {offset})"),
        }
    }
}

#[async_trait]
pub trait CatalogTransport: Send + Sync {
    async fn fetch(&self, request: &CatalogRequest) -> Result<Value, CatalogError>;
}

pub struct HttpTransport {
    http: Client,
    base_url: Url,
}

impl HttpTransport {
    pub fn new(base_url: Url, timeout: Option<Duration>) -> anyhow::Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        if base_url.cannot_be_a_base() {
            bail!("catalog base url '{base_url}' cannot carry a path");
        }
        Ok(Self {
            http: builder.build()?,
            base_url,
        })
    }

    /// Entity references become a single percent-encoded path segment, so a
    /// name can never add path segments or a query of its own.
    pub fn url_for(&self, request: &CatalogRequest) -> Result<Url, CatalogError> {
        let mut url = self.base_url.clone();
        let mut segments = url
            .path_segments_mut()
            .map_err(|()| CatalogError::transport(request.to_string(), "base url has no path"))?;
        segments.pop_if_empty().push(ENTITY_COLLECTION);

        match request {
            CatalogRequest::Entity(reference) => {
                let segment = reference.to_string();
                // `url` drops dot segments instead of encoding them.
                if segment.is_empty() || segment == "." || segment == ".." {
                    return Err(CatalogError::not_found(request.to_string()));
                }
                segments.push(&segment);
                drop(segments);
            }
            CatalogRequest::List { limit, offset } => {
                drop(segments);
                url.query_pairs_mut()
                    .append_pair("limit", &limit.to_string())
                    .append_pair("offset", &offset.to_string());
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl CatalogTransport for HttpTransport {
    async fn fetch(&self, request: &CatalogRequest) -> Result<Value, CatalogError> {
        let url = self.url_for(request)?;
        let resource = request.to_string();
        debug!(%url, "fetching catalog resource");

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|err| CatalogError::transport(&resource, err.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(CatalogError::not_found(resource));
        }
        if !status.is_success() {
            return Err(CatalogError::http_status(resource, status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|err| CatalogError::transport(&resource, err.to_string()))?;
        serde_json::from_slice(&body)
            .map_err(|err| CatalogError::decode(resource, err.to_string()))
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
