// Written by Paul Clevett
// (C)Copyright Wolf Software Systems Ltd
// https://wolf.uk.com

//! Error taxonomy for the service lifecycle controller

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    /// Unknown service key, or a catalog service with no deployed stack
    #[error("{0}")]
    NotFound(String),

    /// Install attempted on a service that is already present
    #[error("{0}")]
    Conflict(String),

    /// Login failed, or the credential was rejected after one refresh
    #[error("Portainer authentication failed: {0}")]
    Authentication(String),

    /// Any other remote failure, with the remote HTTP status when there was one
    #[error("Portainer API error{}: {message}", status.map(|s| format!(" {}", s)).unwrap_or_default())]
    Upstream { status: Option<u16>, message: String },

    /// Required settings are missing; never retried
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Best-effort local filesystem fix-up failed
    #[error("permission error: {0}")]
    Permission(String),

    /// Controller construction gave up after the bootstrap retry bound
    #[error("service manager unavailable: {0}")]
    Unavailable(String),

    /// Malformed catalog source, or a key/stack-name collision
    #[error("invalid service catalog: {0}")]
    Catalog(String),
}

impl ServiceError {
    pub fn upstream(status: Option<u16>, message: impl Into<String>) -> Self {
        ServiceError::Upstream { status, message: message.into() }
    }

    /// HTTP status the routing layer should answer with
    pub fn status_hint(&self) -> u16 {
        match self {
            ServiceError::NotFound(_) => 404,
            ServiceError::Conflict(_) => 409,
            ServiceError::Authentication(_) | ServiceError::Upstream { .. } => 502,
            ServiceError::Configuration(_) | ServiceError::Unavailable(_) => 503,
            ServiceError::Permission(_) | ServiceError::Catalog(_) => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
