use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    NotFound,
    Transport,
    Decode,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("{resource} not found")]
    NotFound { resource: String },
    #[error("failed to fetch {resource}: {message}")]
    Transport {
        resource: String,
        message: String,
        status: Option<u16>,
    },
    #[error("failed to decode {resource}: {message}")]
    Decode { resource: String, message: String },
}

impl CatalogError {
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn transport(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            resource: resource.into(),
            message: message.into(),
            status: None,
        }
    }

    pub fn http_status(resource: impl Into<String>, status: u16) -> Self {
        Self::Transport {
            resource: resource.into(),
            message: format!("HTTP status {status}"),
            status: Some(status),
        }
    }

    pub fn decode(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            resource: resource.into(),
            message: message.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::Transport { .. } => ErrorCode::Transport,
            Self::Decode { .. } => ErrorCode::Decode,
        }
    }

    pub fn resource(&self) -> &str {
        match self {
            Self::NotFound { resource }
            | Self::Transport { resource, .. }
            | Self::Decode { resource, .. } => resource,
        }
    }

    /// User-facing text for the render boundary.
    pub fn user_message(&self) -> String {
        match self {
            Self::NotFound { resource } => format!("Nothing found for {resource}."),
            Self::Transport { .. } => {
                "Failed to load catalog data; check the connection and refresh.".to_string()
            }
            Self::Decode { resource, .. } => {
                format!("The catalog returned malformed data for {resource}.")
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/error_tests.rs"]
mod tests;
