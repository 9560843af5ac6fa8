//! Error types for the zitadel-access operator

use thiserror::Error;

use crate::cloudflare::CloudflareError;
use crate::zitadel::ZitadelError;

/// Main error type for operator operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Zitadel Management API error
    #[error("zitadel error: {0}")]
    Zitadel(#[from] ZitadelError),

    /// Cloudflare Access API error
    #[error("cloudflare error: {0}")]
    Cloudflare(#[from] CloudflareError),

    /// Validation error for SecuredApplication specs
    #[error("validation error: {0}")]
    Validation(String),

    /// The health probe listener could not be bound or stopped serving
    #[error("probe server error on {addr}: {source}")]
    ProbeServer {
        /// Address the server was meant to listen on
        addr: std::net::SocketAddr,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Operator configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// A required object key (namespace, name) is missing
    #[error("missing object key: {0}")]
    MissingObjectKey(&'static str),

    /// The reconciliation pass was cancelled before it could finish
    #[error("reconciliation cancelled")]
    Cancelled,
}

impl Error {
    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a configuration error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Returns true if the Kubernetes API rejected a write because the
    /// object changed since it was read (HTTP 409).
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Kube(kube::Error::Api(ae)) if ae.code == 409)
    }
}
