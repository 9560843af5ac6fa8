//! Condition reasons and the requeue policy attached to them

use std::time::Duration;

/// Requeue delay after failures that may clear up by themselves
pub const TRANSIENT_RETRY: Duration = Duration::from_secs(30);

/// Requeue delay after failures that need someone to fix the resource or Zitadel
pub const POLICY_RETRY: Duration = Duration::from_secs(300);

/// Machine-readable reason recorded on the `Ready` condition
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Reason {
    /// The resource failed validation
    InvalidSpec,
    /// Searching Zitadel for the project failed
    ProjectLookupFailed,
    /// No Zitadel project carries the requested name
    ProjectNotFound,
    /// Listing the project roles failed
    RoleLookupFailed,
    /// At least one requested role is not defined in the project
    RoleNotFound,
    /// Creating, adopting or updating the OIDC application failed
    ZitadelAppFailed,
    /// Writing the credential Secret failed
    SecretFailed,
    /// Reading Cloudflare Access applications failed
    CloudflareLookupFailed,
    /// Updating the Cloudflare Access application failed
    CloudflareUpdateFailed,
    /// Creating the Cloudflare Access application failed
    CloudflareCreateFailed,
    /// Converging the Access policy failed
    PolicyFailed,
    /// Applying the Ingress failed
    IngressFailed,
    /// Deleting external objects during teardown failed
    TeardownFailed,
    /// Everything is converged
    Reconciled,
}

impl Reason {
    /// The wire representation used in the condition
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidSpec => "InvalidSpec",
            Self::ProjectLookupFailed => "ProjectLookupFailed",
            Self::ProjectNotFound => "ProjectNotFound",
            Self::RoleLookupFailed => "RoleLookupFailed",
            Self::RoleNotFound => "RoleNotFound",
            Self::ZitadelAppFailed => "ZitadelAppFailed",
            Self::SecretFailed => "SecretFailed",
            Self::CloudflareLookupFailed => "CloudflareLookupFailed",
            Self::CloudflareUpdateFailed => "CloudflareUpdateFailed",
            Self::CloudflareCreateFailed => "CloudflareCreateFailed",
            Self::PolicyFailed => "PolicyFailed",
            Self::IngressFailed => "IngressFailed",
            Self::TeardownFailed => "TeardownFailed",
            Self::Reconciled => "Reconciled",
        }
    }

    /// True for failures that will not clear up until the resource or the
    /// Zitadel project is changed
    pub fn needs_correction(&self) -> bool {
        matches!(
            self,
            Self::InvalidSpec | Self::ProjectNotFound | Self::RoleNotFound
        )
    }

    /// Delay before the next pass, `None` when the pass succeeded
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Reconciled => None,
            r if r.needs_correction() => Some(POLICY_RETRY),
            _ => Some(TRANSIENT_RETRY),
        }
    }
}

impl std::fmt::Display for Reason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
