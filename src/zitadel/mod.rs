//! Zitadel Management API adapter
//!
//! Exposes the narrow slice of the Management API v1 the operator needs: project
//! lookup by name, role listing, and OIDC application CRUD. Lookups return
//! `Ok(None)` for a missing object so callers can branch between adopt and create.

mod client;

pub use client::ZitadelClient;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::Serialize;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::crd::OidcConfig;

/// Errors returned by the Zitadel adapter
#[derive(Debug, Error)]
pub enum ZitadelError {
    /// Zitadel answered with a non-success status
    #[error("{method} {path} returned {status}: {body}")]
    Api {
        /// HTTP method of the failed request
        method: String,
        /// Request path relative to the Zitadel base URL
        path: String,
        /// HTTP status code
        status: u16,
        /// Response body as returned by Zitadel
        body: String,
    },

    /// The request never produced a response (connect error, timeout)
    #[error("{method} {path} failed: {message}")]
    Transport {
        /// HTTP method of the failed request
        method: String,
        /// Request path relative to the Zitadel base URL
        path: String,
        /// Underlying transport error
        message: String,
    },

    /// The response body did not match the expected shape
    #[error("invalid response from {path}: {message}")]
    Decode {
        /// Request path relative to the Zitadel base URL
        path: String,
        /// Decoder error
        message: String,
    },
}

impl ZitadelError {
    /// Create an API error for a non-success response
    pub fn api(
        method: impl Into<String>,
        path: impl Into<String>,
        status: u16,
        body: impl Into<String>,
    ) -> Self {
        Self::Api {
            method: method.into(),
            path: path.into(),
            status,
            body: body.into(),
        }
    }

    /// Returns true if Zitadel reported the object as missing
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Api { status: 404, .. })
    }

    /// Returns true if Zitadel rejected an update because nothing would change
    pub fn is_no_changes(&self) -> bool {
        match self {
            Self::Api { status, body, .. } => {
                (400..500).contains(status)
                    && (body.contains("No changes") || body.contains("NoChangesFound"))
            }
            _ => false,
        }
    }
}

/// A Zitadel project
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Project {
    /// Project ID
    pub id: String,
    /// Project name
    pub name: String,
}

/// A role defined in a Zitadel project
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Role {
    /// Role key, the value that ends up in token claims
    pub key: String,
    /// Human readable name
    pub display_name: String,
}

/// An existing OIDC application found by name
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct App {
    /// Application ID
    pub id: String,
    /// OIDC client ID
    pub client_id: String,
}

/// A freshly created OIDC application.
///
/// `client_secret` is only ever returned here; Zitadel never reveals it again.
#[derive(Clone, PartialEq, Eq)]
pub struct CreatedApp {
    /// Application ID
    pub id: String,
    /// OIDC client ID
    pub client_id: String,
    /// OIDC client secret, empty for public clients
    pub client_secret: Zeroizing<String>,
}

impl std::fmt::Debug for CreatedApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreatedApp")
            .field("id", &self.id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .finish()
    }
}

/// Outcome of an in-place OIDC configuration update
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppUpdate {
    /// The configuration was changed
    Updated,
    /// The configuration already matched
    Unchanged,
    /// The application no longer exists
    NotFound,
}

const DEFAULT_RESPONSE_TYPE: &str = "OIDC_RESPONSE_TYPE_CODE";
const DEFAULT_GRANT_TYPE: &str = "OIDC_GRANT_TYPE_AUTHORIZATION_CODE";
const DEFAULT_APP_TYPE: &str = "OIDC_APP_TYPE_WEB";
const DEFAULT_AUTH_METHOD: &str = "OIDC_AUTH_METHOD_TYPE_BASIC";
const DEFAULT_ACCESS_TOKEN_TYPE: &str = "OIDC_TOKEN_TYPE_BEARER";

/// Desired OIDC application configuration, as sent on create and update
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    /// Application name
    pub name: String,
    /// Redirect URIs
    pub redirect_uris: Vec<String>,
    /// Post-logout redirect URIs
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub post_logout_redirect_uris: Vec<String>,
    /// OIDC response types
    pub response_types: Vec<String>,
    /// OIDC grant types
    pub grant_types: Vec<String>,
    /// Application type
    pub app_type: String,
    /// Client authentication method
    pub auth_method_type: String,
    /// Access token type
    pub access_token_type: String,
    /// Allow non-https redirect URIs
    pub dev_mode: bool,
    /// Include roles in the ID token
    pub id_token_role_assertion: bool,
    /// Include userinfo in the ID token
    pub id_token_userinfo_assertion: bool,
    /// Include roles in the access token
    pub access_token_role_assertion: bool,
}

impl AppConfig {
    /// Resolve the configuration for an application named `name` serving `host`.
    ///
    /// Overrides win when present and non-empty; everything else takes the
    /// operator defaults.
    pub fn resolve(name: &str, host: &str, overrides: Option<&OidcConfig>) -> Self {
        let empty = OidcConfig::default();
        let o = overrides.unwrap_or(&empty);

        let list_or = |values: &[String], default: Vec<String>| {
            if values.is_empty() {
                default
            } else {
                values.to_vec()
            }
        };
        let value_or = |value: &Option<String>, default: &str| {
            value
                .as_deref()
                .filter(|v| !v.is_empty())
                .unwrap_or(default)
                .to_string()
        };

        Self {
            name: name.to_string(),
            redirect_uris: list_or(&o.redirect_uris, vec![format!("https://{host}/callback")]),
            post_logout_redirect_uris: o.post_logout_redirect_uris.clone(),
            response_types: list_or(&o.response_types, vec![DEFAULT_RESPONSE_TYPE.to_string()]),
            grant_types: list_or(&o.grant_types, vec![DEFAULT_GRANT_TYPE.to_string()]),
            app_type: value_or(&o.app_type, DEFAULT_APP_TYPE),
            auth_method_type: value_or(&o.auth_method_type, DEFAULT_AUTH_METHOD),
            access_token_type: value_or(&o.access_token_type, DEFAULT_ACCESS_TOKEN_TYPE),
            dev_mode: o.dev_mode,
            id_token_role_assertion: o.id_token_role_assertion,
            id_token_userinfo_assertion: o.id_token_userinfo_assertion,
            access_token_role_assertion: o.access_token_role_assertion,
        }
    }
}

/// Identity provider operations used by the reconciler
#[cfg_attr(test, automock)]
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Find a project by its exact name
    async fn find_project_by_name(&self, name: &str) -> Result<Option<Project>, ZitadelError>;

    /// List every role defined in a project
    async fn list_project_roles(&self, project_id: &str) -> Result<Vec<Role>, ZitadelError>;

    /// Find an application in a project by its exact name
    async fn find_app_by_name(
        &self,
        project_id: &str,
        name: &str,
    ) -> Result<Option<App>, ZitadelError>;

    /// Create an OIDC application. This is the only call that yields a client secret.
    async fn create_app(
        &self,
        project_id: &str,
        config: &AppConfig,
    ) -> Result<CreatedApp, ZitadelError>;

    /// Replace the OIDC configuration of an existing application
    async fn update_app(
        &self,
        project_id: &str,
        app_id: &str,
        config: &AppConfig,
    ) -> Result<AppUpdate, ZitadelError>;

    /// Delete an application. Deleting a missing application succeeds.
    async fn delete_app(&self, project_id: &str, app_id: &str) -> Result<(), ZitadelError>;
}
