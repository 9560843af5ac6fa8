//! Cloudflare Access API adapter
//!
//! Manages self-hosted Access applications and the allow policy attached to
//! them. Requests and responses are typed; the desired-state request types
//! carry a `matches` check so callers can skip updates that would change nothing.

mod client;

pub use client::CloudflareClient;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default Cloudflare API base URL
pub const DEFAULT_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Access application type managed by the operator
pub const SELF_HOSTED: &str = "self_hosted";

/// Errors returned by the Cloudflare adapter
#[derive(Debug, Error)]
pub enum CloudflareError {
    /// Cloudflare answered with a non-success status or `success: false`
    #[error("{method} {path} returned {status}: {message}")]
    Api {
        /// HTTP method of the failed request
        method: String,
        /// Request path relative to the API base URL
        path: String,
        /// HTTP status code
        status: u16,
        /// Error messages reported by Cloudflare
        message: String,
    },

    /// The request never produced a response (connect error, timeout)
    #[error("{method} {path} failed: {message}")]
    Transport {
        /// HTTP method of the failed request
        method: String,
        /// Request path relative to the API base URL
        path: String,
        /// Underlying transport error
        message: String,
    },

    /// The response body did not match the expected shape
    #[error("invalid response from {path}: {message}")]
    Decode {
        /// Request path relative to the API base URL
        path: String,
        /// Decoder error
        message: String,
    },
}

impl CloudflareError {
    /// Create an API error for a failed response
    pub fn api(
        method: impl Into<String>,
        path: impl Into<String>,
        status: u16,
        message: impl Into<String>,
    ) -> Self {
        Self::Api {
            method: method.into(),
            path: path.into(),
            status,
            message: message.into(),
        }
    }

    /// Returns true if Cloudflare reported the object as missing
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Api { status: 404, .. })
    }
}

/// An Access application as stored by Cloudflare
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct AccessApp {
    /// Application ID
    pub id: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Protected domain
    #[serde(default)]
    pub domain: String,
    /// Application type, `self_hosted` for applications managed here
    #[serde(default, rename = "type")]
    pub app_type: String,
    /// Session duration, e.g. "24h"
    #[serde(default)]
    pub session_duration: String,
}

/// Desired state of an Access application
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AccessAppRequest {
    /// Display name
    pub name: String,
    /// Protected domain
    pub domain: String,
    /// Application type
    #[serde(rename = "type")]
    pub app_type: String,
    /// Session duration
    pub session_duration: String,
}

impl AccessAppRequest {
    /// A self-hosted application protecting `domain`
    pub fn self_hosted(
        name: impl Into<String>,
        domain: impl Into<String>,
        session_duration: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            domain: domain.into(),
            app_type: SELF_HOSTED.to_string(),
            session_duration: session_duration.into(),
        }
    }

    /// Returns true if `app` already has this state
    pub fn matches(&self, app: &AccessApp) -> bool {
        app.name == self.name
            && app.domain == self.domain
            && app.app_type == self.app_type
            && app.session_duration == self.session_duration
    }
}

/// Inline OIDC claim check
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub struct OidcClaimRule {
    /// Cloudflare Access identity provider ID
    pub identity_provider_id: String,
    /// Claim to inspect
    pub claim_name: String,
    /// Value the claim must contain
    pub claim_value: String,
}

/// One entry of a policy `include` list.
///
/// Only OIDC claim rules are modelled; other rule kinds deserialize as `oidc: None`
/// and therefore never match a desired policy.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
pub struct AccessRule {
    /// OIDC claim rule
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oidc: Option<OidcClaimRule>,
}

/// An Access policy as stored by Cloudflare
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct AccessPolicy {
    /// Policy ID
    pub id: String,
    /// Policy name
    #[serde(default)]
    pub name: String,
    /// Decision, e.g. "allow"
    #[serde(default)]
    pub decision: String,
    /// Evaluation order within the application
    #[serde(default)]
    pub precedence: i32,
    /// Rules of which at least one must match
    #[serde(default)]
    pub include: Vec<AccessRule>,
}

/// Desired state of an Access policy
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AccessPolicyRequest {
    /// Policy name
    pub name: String,
    /// Decision
    pub decision: String,
    /// Evaluation order
    pub precedence: i32,
    /// Rules of which at least one must match
    pub include: Vec<AccessRule>,
}

impl AccessPolicyRequest {
    /// An allow policy with one OIDC claim rule per role, at precedence 1
    pub fn allow_roles(
        name: impl Into<String>,
        identity_provider_id: &str,
        claim_name: &str,
        roles: &[String],
    ) -> Self {
        Self {
            name: name.into(),
            decision: "allow".to_string(),
            precedence: 1,
            include: roles
                .iter()
                .map(|role| AccessRule {
                    oidc: Some(OidcClaimRule {
                        identity_provider_id: identity_provider_id.to_string(),
                        claim_name: claim_name.to_string(),
                        claim_value: role.clone(),
                    }),
                })
                .collect(),
        }
    }

    /// Returns true if `policy` already has this state
    pub fn matches(&self, policy: &AccessPolicy) -> bool {
        policy.name == self.name
            && policy.decision == self.decision
            && policy.precedence == self.precedence
            && policy.include == self.include
    }
}

/// Access-control operations used by the reconciler
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AccessControl: Send + Sync {
    /// Find the Access application protecting `domain`
    async fn find_access_app_by_domain(
        &self,
        domain: &str,
    ) -> Result<Option<AccessApp>, CloudflareError>;

    /// Read an Access application by ID
    async fn get_access_app(&self, app_id: &str) -> Result<Option<AccessApp>, CloudflareError>;

    /// Create an Access application
    async fn create_access_app(
        &self,
        request: &AccessAppRequest,
    ) -> Result<AccessApp, CloudflareError>;

    /// Replace an Access application
    async fn update_access_app(
        &self,
        app_id: &str,
        request: &AccessAppRequest,
    ) -> Result<(), CloudflareError>;

    /// Delete an Access application. Deleting a missing application succeeds.
    async fn delete_access_app(&self, app_id: &str) -> Result<(), CloudflareError>;

    /// Read a policy of an Access application by ID
    async fn get_access_policy(
        &self,
        app_id: &str,
        policy_id: &str,
    ) -> Result<Option<AccessPolicy>, CloudflareError>;

    /// Find a policy of an Access application by name
    async fn find_access_policy_by_name(
        &self,
        app_id: &str,
        name: &str,
    ) -> Result<Option<AccessPolicy>, CloudflareError>;

    /// Create a policy on an Access application
    async fn create_access_policy(
        &self,
        app_id: &str,
        request: &AccessPolicyRequest,
    ) -> Result<AccessPolicy, CloudflareError>;

    /// Replace a policy of an Access application
    async fn update_access_policy(
        &self,
        app_id: &str,
        policy_id: &str,
        request: &AccessPolicyRequest,
    ) -> Result<(), CloudflareError>;
}
