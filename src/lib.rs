//! zitadel-access-operator - protect Kubernetes applications with Zitadel and Cloudflare Access
//!
//! A `SecuredApplication` declares a public host, the Zitadel project roles that may
//! reach it, and optionally a backend to route to. The operator converges that
//! declaration into three systems of record:
//!
//! - Zitadel: an OIDC application inside the named project
//! - Cloudflare Access: a self-hosted access application plus an allow policy with
//!   one OIDC claim rule per required role
//! - Kubernetes: a Secret holding the OIDC client credentials and, when requested,
//!   an Ingress pointing at the backend
//!
//! # Modules
//!
//! - [`crd`] - The `SecuredApplication` custom resource and its status
//! - [`controller`] - The reconciliation pipeline
//! - [`zitadel`] - Zitadel Management API adapter
//! - [`cloudflare`] - Cloudflare Access API adapter
//! - [`objects`] - Owned Kubernetes objects (credential Secret, route Ingress)
//! - [`config`] - Immutable operator configuration
//! - [`health`] - Liveness/readiness probe server
//! - [`leader_election`] - Lease-based leader election for multiple replicas
//! - [`retry`] - Backoff helpers for conflict-prone writes
//! - [`telemetry`] - Structured logging setup
//! - [`error`] - Error types for the operator

#![deny(missing_docs)]

pub mod cloudflare;
pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
pub mod health;
pub mod leader_election;
pub mod objects;
pub mod retry;
pub mod telemetry;
pub mod zitadel;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Default Configuration Constants
// =============================================================================

/// Field manager used for every server-side apply and patch
pub const FIELD_MANAGER: &str = "zitadel-access-operator";

/// Finalizer that gates deletion of a SecuredApplication until external cleanup ran
pub const FINALIZER: &str = "access.twiechert.de/finalizer";

/// Default Cloudflare Access session duration
pub const DEFAULT_SESSION_DURATION: &str = "24h";

/// Default address for the health probe server
pub const DEFAULT_PROBE_ADDR: &str = "0.0.0.0:8081";

/// Default timeout applied to every Zitadel and Cloudflare request
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default interval between full resyncs of every SecuredApplication
pub const DEFAULT_RESYNC_INTERVAL_SECS: u64 = 600;
