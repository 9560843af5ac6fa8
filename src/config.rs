//! Immutable operator configuration
//!
//! Built once in `main` from command-line flags and the two token environment
//! variables, validated, and then handed to the controller context. Nothing in
//! the reconciliation pipeline reads process state directly.

use std::time::Duration;

use zeroize::Zeroizing;

use crate::cloudflare::DEFAULT_API_BASE;
use crate::{Error, DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_RESYNC_INTERVAL_SECS, DEFAULT_SESSION_DURATION};

/// Environment variable holding the Zitadel personal access token
pub const ZITADEL_TOKEN_ENV: &str = "ZITADEL_TOKEN";

/// Environment variable holding the Cloudflare API token
pub const CLOUDFLARE_TOKEN_ENV: &str = "CLOUDFLARE_API_TOKEN";

/// Claim carrying the flattened Zitadel project roles.
///
/// Zitadel's own role claim is a nested object Cloudflare cannot match on, so a
/// Zitadel action publishes the role keys as a flat array under this name.
pub const DEFAULT_ROLE_CLAIM: &str = "custom:roles";

/// Name of the single allow policy managed per Access application
pub const DEFAULT_POLICY_NAME: &str = "Allow Zitadel roles";

/// Connection settings for the Zitadel Management API
#[derive(Clone)]
pub struct ZitadelSettings {
    /// Base URL of the Zitadel instance
    pub url: String,
    /// Personal access token
    pub token: Zeroizing<String>,
}

impl std::fmt::Debug for ZitadelSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZitadelSettings")
            .field("url", &self.url)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// Connection settings for the Cloudflare API
#[derive(Clone)]
pub struct CloudflareSettings {
    /// API base URL
    pub api_base: String,
    /// Account owning the Access applications
    pub account_id: String,
    /// API token with Access edit permissions
    pub api_token: Zeroizing<String>,
}

impl std::fmt::Debug for CloudflareSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareSettings")
            .field("api_base", &self.api_base)
            .field("account_id", &self.account_id)
            .field("api_token", &"[REDACTED]")
            .finish()
    }
}

/// Values the reconciler needs to build desired state
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconcileSettings {
    /// Cloudflare Access identity provider configured for Zitadel
    pub identity_provider_id: String,
    /// Access application session duration, e.g. "24h"
    pub session_duration: String,
    /// Token claim matched by the policy rules
    pub role_claim_name: String,
    /// Name of the managed allow policy
    pub policy_name: String,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            identity_provider_id: String::new(),
            session_duration: DEFAULT_SESSION_DURATION.to_string(),
            role_claim_name: DEFAULT_ROLE_CLAIM.to_string(),
            policy_name: DEFAULT_POLICY_NAME.to_string(),
        }
    }
}

/// Complete operator configuration
#[derive(Clone, Debug)]
pub struct OperatorConfig {
    /// Zitadel connection
    pub zitadel: ZitadelSettings,
    /// Cloudflare connection
    pub cloudflare: CloudflareSettings,
    /// Desired-state parameters
    pub reconcile: ReconcileSettings,
    /// Timeout applied to every external API request
    pub request_timeout: Duration,
    /// Interval between full resyncs
    pub resync_interval: Duration,
    /// Restrict the watch to one namespace; `None` watches all namespaces
    pub namespace: Option<String>,
}

impl OperatorConfig {
    /// Configuration with defaults for everything but the required values
    pub fn new(
        zitadel_url: impl Into<String>,
        zitadel_token: Zeroizing<String>,
        account_id: impl Into<String>,
        cloudflare_token: Zeroizing<String>,
        identity_provider_id: impl Into<String>,
    ) -> Self {
        Self {
            zitadel: ZitadelSettings {
                url: zitadel_url.into(),
                token: zitadel_token,
            },
            cloudflare: CloudflareSettings {
                api_base: DEFAULT_API_BASE.to_string(),
                account_id: account_id.into(),
                api_token: cloudflare_token,
            },
            reconcile: ReconcileSettings {
                identity_provider_id: identity_provider_id.into(),
                ..Default::default()
            },
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            resync_interval: Duration::from_secs(DEFAULT_RESYNC_INTERVAL_SECS),
            namespace: None,
        }
    }

    /// Check the configuration before any client is built
    pub fn validate(&self) -> Result<(), Error> {
        let url = self.zitadel.url.trim();
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(Error::config(format!(
                "zitadel url must start with http:// or https://, got {:?}",
                self.zitadel.url
            )));
        }
        if self.zitadel.token.trim().is_empty() {
            return Err(Error::config(format!("{ZITADEL_TOKEN_ENV} is empty")));
        }
        if self.cloudflare.account_id.trim().is_empty() {
            return Err(Error::config("cloudflare account id is required"));
        }
        if self.cloudflare.api_token.trim().is_empty() {
            return Err(Error::config(format!("{CLOUDFLARE_TOKEN_ENV} is empty")));
        }
        if self.reconcile.identity_provider_id.trim().is_empty() {
            return Err(Error::config(
                "cloudflare identity provider id is required",
            ));
        }
        validate_session_duration(&self.reconcile.session_duration)?;
        if self.request_timeout.is_zero() {
            return Err(Error::config("request timeout must be greater than zero"));
        }
        if self.resync_interval.is_zero() {
            return Err(Error::config("resync interval must be greater than zero"));
        }
        Ok(())
    }
}

/// Read a required secret from the environment
pub fn token_from_env(var: &str) -> Result<Zeroizing<String>, Error> {
    match std::env::var(var) {
        Ok(value) if !value.trim().is_empty() => Ok(Zeroizing::new(value)),
        Ok(_) => Err(Error::config(format!("{var} is empty"))),
        Err(_) => Err(Error::config(format!("{var} is not set"))),
    }
}

/// Accepts Cloudflare session durations: one or more `<number><unit>` groups
/// with units `ns`, `us`, `µs`, `ms`, `s`, `m`, `h` (e.g. "24h", "1h30m").
pub fn validate_session_duration(value: &str) -> Result<(), Error> {
    let invalid = || Error::config(format!("invalid session duration {value:?}"));

    let mut rest = value;
    if rest.is_empty() {
        return Err(invalid());
    }
    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(invalid)?;
        let number = &rest[..digits];
        if number.is_empty() || number.parse::<f64>().is_err() {
            return Err(invalid());
        }
        rest = &rest[digits..];

        let unit = ["ns", "us", "µs", "ms", "s", "m", "h"]
            .into_iter()
            .filter(|u| rest.starts_with(u))
            .max_by_key(|u| u.len())
            .ok_or_else(invalid)?;
        rest = &rest[unit.len()..];
    }
    Ok(())
}
