//! Shared types for the SecuredApplication CRD

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Zitadel project and roles required to reach the application
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Access {
    /// Zitadel project name. The operator resolves this to a project ID.
    pub project: String,

    /// Zitadel project roles allowed to access this application
    #[schemars(length(min = 1))]
    pub roles: Vec<String>,
}

/// Overrides for the Zitadel OIDC application
///
/// Every field is optional; absent or empty fields fall back to the defaults
/// documented on each field.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OidcConfig {
    /// Redirect URIs. Defaults to `["https://{host}/callback"]`.
    #[serde(
        rename = "redirectURIs",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub redirect_uris: Vec<String>,

    /// Post-logout redirect URIs
    #[serde(
        rename = "postLogoutRedirectURIs",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub post_logout_redirect_uris: Vec<String>,

    /// Defaults to `["OIDC_RESPONSE_TYPE_CODE"]`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub response_types: Vec<String>,

    /// Defaults to `["OIDC_GRANT_TYPE_AUTHORIZATION_CODE"]`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub grant_types: Vec<String>,

    /// Defaults to `OIDC_APP_TYPE_WEB`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_type: Option<String>,

    /// Defaults to `OIDC_AUTH_METHOD_TYPE_BASIC`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_method_type: Option<String>,

    /// Defaults to `OIDC_TOKEN_TYPE_BEARER`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token_type: Option<String>,

    /// Allow non-https redirect URIs
    #[serde(default)]
    pub dev_mode: bool,

    /// Include roles in the ID token
    #[serde(default)]
    pub id_token_role_assertion: bool,

    /// Include userinfo in the ID token
    #[serde(default)]
    pub id_token_userinfo_assertion: bool,

    /// Include roles in the access token
    #[serde(default)]
    pub access_token_role_assertion: bool,

    /// Name of the Secret receiving `clientId` and `clientSecret`.
    /// Defaults to `{name}-oidc`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret_ref: Option<String>,
}

/// Routing request. When present, an Ingress is generated for the host.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TunnelConfig {
    /// Kubernetes Service receiving the traffic
    pub backend: Backend,

    /// Overrides for the generated Ingress
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress: Option<IngressConfig>,
}

/// Backend Service reference
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Backend {
    /// Name of the Kubernetes Service
    pub service_name: String,

    /// Port number on the Service
    pub service_port: i32,

    /// Backend protocol override (e.g. "https")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
}

/// Overrides for the generated Ingress
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IngressConfig {
    /// Ingress class, defaults to "cloudflare-tunnel"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,

    /// Extra annotations for the Ingress
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,

    /// Path, defaults to "/"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Path type, defaults to "Prefix"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_type: Option<String>,
}

/// A Zitadel OIDC application that is no longer used but still has to be deleted
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RetiredApp {
    /// Project the application lives in
    pub project_id: String,

    /// Zitadel application ID
    pub app_id: String,

    /// The client secret of this application was never stored
    #[serde(default)]
    pub credentials_lost: bool,
}

/// Condition status following Kubernetes conventions
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    /// Condition is true
    True,
    /// Condition is false
    False,
    /// Condition status is unknown
    #[default]
    Unknown,
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::True => write!(f, "True"),
            Self::False => write!(f, "False"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

impl From<bool> for ConditionStatus {
    fn from(value: bool) -> Self {
        if value {
            Self::True
        } else {
            Self::False
        }
    }
}

/// Kubernetes-style condition for status reporting
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct Condition {
    /// Type of condition (always "Ready" for SecuredApplication)
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition (True, False, Unknown)
    pub status: ConditionStatus,

    /// Machine-readable reason for the condition
    pub reason: String,

    /// Human-readable message
    pub message: String,

    /// Last time the condition status flipped
    #[serde(rename = "lastTransitionTime")]
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    /// Create a new condition with the current timestamp
    pub fn new(
        type_: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_: type_.into(),
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: Utc::now(),
        }
    }
}
