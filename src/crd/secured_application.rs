//! SecuredApplication Custom Resource Definition
//!
//! A SecuredApplication registers an OIDC application in Zitadel, protects the
//! host with a Cloudflare Access policy built from Zitadel roles, and optionally
//! routes the host to a backend Service through an Ingress.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{Access, Condition, ConditionStatus, OidcConfig, RetiredApp, TunnelConfig};

/// The single condition type maintained on a SecuredApplication
pub const READY_CONDITION: &str = "Ready";

/// Specification for a SecuredApplication
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "access.twiechert.de",
    version = "v1alpha1",
    kind = "SecuredApplication",
    plural = "securedapplications",
    shortname = "sapp",
    status = "SecuredApplicationStatus",
    namespaced,
    printcolumn = r#"{"name":"Host","type":"string","jsonPath":".spec.host"}"#,
    printcolumn = r#"{"name":"Project","type":"string","jsonPath":".spec.access.project"}"#,
    printcolumn = r#"{"name":"Client ID","type":"string","jsonPath":".status.clientId"}"#,
    printcolumn = r#"{"name":"Ready","type":"boolean","jsonPath":".status.ready"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct SecuredApplicationSpec {
    /// Public hostname for this application
    pub host: String,

    /// Zitadel project and roles required to access this application
    pub access: Access,

    /// Zitadel OIDC application overrides
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oidc: Option<OidcConfig>,

    /// Create an Ingress for routing (e.g. via Cloudflare Tunnel).
    /// When omitted, no Ingress is created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tunnel: Option<TunnelConfig>,

    /// Keep the Zitadel and Cloudflare objects when this resource is deleted
    #[serde(default)]
    pub delete_protection: bool,
}

impl SecuredApplicationSpec {
    /// Validate the specification
    ///
    /// Runs before any external call; everything checked here is a mistake the
    /// user has to fix in the resource.
    pub fn validate(&self) -> Result<(), crate::Error> {
        let host = self.host.trim();
        if host.is_empty() {
            return Err(crate::Error::validation("spec.host must not be empty"));
        }
        if host.contains("://") || host.contains('/') {
            return Err(crate::Error::validation(format!(
                "spec.host must be a bare hostname without scheme or path, got {:?}",
                self.host
            )));
        }

        if self.access.project.trim().is_empty() {
            return Err(crate::Error::validation(
                "spec.access.project must not be empty",
            ));
        }
        if self.access.roles.is_empty() {
            return Err(crate::Error::validation(
                "spec.access.roles must list at least one role",
            ));
        }
        if self.access.roles.iter().any(|r| r.trim().is_empty()) {
            return Err(crate::Error::validation(
                "spec.access.roles must not contain empty role names",
            ));
        }

        if let Some(tunnel) = &self.tunnel {
            if tunnel.backend.service_name.trim().is_empty() {
                return Err(crate::Error::validation(
                    "spec.tunnel.backend.serviceName must not be empty",
                ));
            }
            if !(1..=65535).contains(&tunnel.backend.service_port) {
                return Err(crate::Error::validation(format!(
                    "spec.tunnel.backend.servicePort must be between 1 and 65535, got {}",
                    tunnel.backend.service_port
                )));
            }
        }

        Ok(())
    }

    /// Name of the Secret that receives the OIDC client credentials
    pub fn credential_secret_name(&self, app_name: &str) -> String {
        self.oidc
            .as_ref()
            .and_then(|o| o.client_secret_ref.as_deref())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("{app_name}-oidc"))
    }
}

/// Status for a SecuredApplication
///
/// Identifier fields are `None` until the matching external object has been
/// created or adopted. They serialize as `null` so a merge patch can clear them.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SecuredApplicationStatus {
    /// Resolved Zitadel project ID
    #[serde(default)]
    pub project_id: Option<String>,

    /// Zitadel OIDC application ID
    #[serde(default)]
    pub zitadel_app_id: Option<String>,

    /// OIDC client ID (never the secret)
    #[serde(default)]
    pub client_id: Option<String>,

    /// Cloudflare Access application ID
    #[serde(default)]
    pub access_application_id: Option<String>,

    /// Cloudflare Access policy ID
    #[serde(default)]
    pub access_policy_id: Option<String>,

    /// OIDC application waiting to be deleted before a new one is made
    #[serde(default)]
    pub retired_app: Option<RetiredApp>,

    /// True once every resource is converged
    #[serde(default)]
    pub ready: bool,

    /// Latest observations; holds exactly one `Ready` condition once reconciled
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl SecuredApplicationStatus {
    /// Record the outcome of a reconciliation pass.
    ///
    /// Sets `ready` to `success` and replaces the `Ready` condition. The
    /// transition time is carried over while the condition status stays the
    /// same, so repeating an identical outcome yields an identical status.
    pub fn with_outcome(
        mut self,
        success: bool,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let status = ConditionStatus::from(success);
        let mut condition = Condition::new(READY_CONDITION, status, reason, message);

        if let Some(previous) = self.ready_condition() {
            if previous.status == condition.status {
                condition.last_transition_time = previous.last_transition_time;
            }
        }

        self.ready = success;
        self.conditions.clear();
        self.conditions.push(condition);
        self
    }

    /// The current `Ready` condition, if any
    pub fn ready_condition(&self) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == READY_CONDITION)
    }

    /// Forget the Zitadel application (e.g. it vanished or the project changed)
    pub fn forget_zitadel_app(&mut self) {
        self.zitadel_app_id = None;
        self.client_id = None;
    }

    /// Move the Zitadel application to `retired_app` so it gets deleted.
    ///
    /// Uses the current `project_id`, so call it before recording a new project.
    pub fn retire_zitadel_app(&mut self, credentials_lost: bool) {
        if let (Some(project_id), Some(app_id)) = (&self.project_id, &self.zitadel_app_id) {
            self.retired_app = Some(RetiredApp {
                project_id: project_id.clone(),
                app_id: app_id.clone(),
                credentials_lost,
            });
        }
        self.forget_zitadel_app();
    }

    /// Forget the Cloudflare Access application and the policy attached to it
    pub fn forget_access_application(&mut self) {
        self.access_application_id = None;
        self.access_policy_id = None;
    }
}
