//! SecuredApplication controller implementation
//!
//! A pass walks a fixed pipeline: validate, resolve the Zitadel project, check
//! the roles, converge the OIDC application, store fresh credentials, converge
//! the Cloudflare Access application and its policy, then the Ingress. The first
//! failing step ends the pass with a failure condition and a requeue; every step
//! is idempotent, so the next pass simply starts over.
//!
//! Identifiers are collected on a working copy of the status as they are
//! resolved and written back together with the outcome, so objects created by
//! a pass that later failed are reused instead of duplicated.

use std::sync::Arc;

use async_trait::async_trait;
use kube::api::{Api, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::{Client, ResourceExt};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

#[cfg(test)]
use mockall::automock;

use crate::cloudflare::{
    AccessAppRequest, AccessControl, AccessPolicyRequest, CloudflareClient, CloudflareError,
};
use crate::config::{OperatorConfig, ReconcileSettings};
use crate::crd::{SecuredApplication, SecuredApplicationStatus};
use crate::objects::{credential_secret, route_ingress, ClusterObjects, KubeClusterObjects};
use crate::retry::{retry_with_backoff, retry_with_backoff_if, RetryConfig};
use crate::zitadel::{AppConfig, AppUpdate, IdentityProvider, ZitadelClient, ZitadelError};
use crate::{Error, FINALIZER};

use super::lifecycle::{Lifecycle, Step};
use super::reason::{Reason, TRANSIENT_RETRY};

/// Attempts for a finalizer edit that keeps losing optimistic-concurrency races
const FINALIZER_ATTEMPTS: u32 = 5;

/// Attempts for the credential Secret write right after the app was created
const SECRET_ATTEMPTS: u32 = 3;

/// Requeue delay applied by [`error_policy`] for store errors
const ERROR_REQUEUE: std::time::Duration = std::time::Duration::from_secs(5);

/// Access to SecuredApplication objects themselves
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DescriptorStore: Send + Sync {
    /// Replace the status sub-resource
    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: &SecuredApplicationStatus,
    ) -> Result<(), Error>;

    /// Add the cleanup finalizer if it is missing
    async fn add_finalizer(&self, namespace: &str, name: &str) -> Result<(), Error>;

    /// Remove the cleanup finalizer if it is present
    async fn remove_finalizer(&self, namespace: &str, name: &str) -> Result<(), Error>;
}

/// [`DescriptorStore`] backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeDescriptorStore {
    client: Client,
}

impl KubeDescriptorStore {
    /// Create a new store around a Kubernetes client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<SecuredApplication> {
        Api::namespaced(self.client.clone(), namespace)
    }

    /// Rewrite the finalizer list from a fresh read, retrying lost races.
    async fn edit_finalizers(
        &self,
        namespace: &str,
        name: &str,
        operation: &'static str,
        edit: fn(&mut Vec<String>) -> bool,
    ) -> Result<(), Error> {
        let api = self.api(namespace);
        retry_with_backoff_if(
            &RetryConfig::with_max_attempts(FINALIZER_ATTEMPTS),
            operation,
            Error::is_conflict,
            || try_edit_finalizers(&api, name, edit),
        )
        .await
    }
}

/// One read-modify-write of the finalizer list.
///
/// The patch carries the read `resourceVersion`, so a concurrent writer makes
/// it fail with 409.
async fn try_edit_finalizers(
    api: &Api<SecuredApplication>,
    name: &str,
    edit: fn(&mut Vec<String>) -> bool,
) -> Result<(), Error> {
    let Some(current) = api.get_opt(name).await? else {
        return Ok(());
    };
    let mut finalizers = current.finalizers().to_vec();
    if !edit(&mut finalizers) {
        return Ok(());
    }

    let patch = json!({
        "metadata": {
            "finalizers": finalizers,
            "resourceVersion": current.resource_version(),
        }
    });
    api.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
        .await?;
    Ok(())
}

fn insert_marker(finalizers: &mut Vec<String>) -> bool {
    if finalizers.iter().any(|f| f == FINALIZER) {
        return false;
    }
    finalizers.push(FINALIZER.to_string());
    true
}

fn drop_marker(finalizers: &mut Vec<String>) -> bool {
    let before = finalizers.len();
    finalizers.retain(|f| f != FINALIZER);
    finalizers.len() != before
}

#[async_trait]
impl DescriptorStore for KubeDescriptorStore {
    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: &SecuredApplicationStatus,
    ) -> Result<(), Error> {
        let patch = json!({ "status": status });
        self.api(namespace)
            .patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn add_finalizer(&self, namespace: &str, name: &str) -> Result<(), Error> {
        self.edit_finalizers(namespace, name, "add_finalizer", insert_marker)
            .await
    }

    async fn remove_finalizer(&self, namespace: &str, name: &str) -> Result<(), Error> {
        self.edit_finalizers(namespace, name, "remove_finalizer", drop_marker)
            .await
    }
}

/// Controller context shared by every reconciliation
///
/// Use [`Context::builder`] in production; [`Context::new`] takes every adapter
/// explicitly and is what tests use.
pub struct Context {
    /// SecuredApplication store (finalizers and status)
    pub store: Arc<dyn DescriptorStore>,
    /// Zitadel adapter
    pub zitadel: Arc<dyn IdentityProvider>,
    /// Cloudflare Access adapter
    pub cloudflare: Arc<dyn AccessControl>,
    /// Owned Kubernetes objects adapter
    pub objects: Arc<dyn ClusterObjects>,
    /// Desired-state parameters
    pub settings: ReconcileSettings,
    /// Cancelled on shutdown; checked between pipeline steps
    pub cancel: CancellationToken,
}

impl Context {
    /// Create a builder wiring the real adapters from `client` and `config`
    pub fn builder(client: Client, config: OperatorConfig) -> ContextBuilder {
        ContextBuilder::new(client, config)
    }

    /// Create a context from explicit adapters
    pub fn new(
        store: Arc<dyn DescriptorStore>,
        zitadel: Arc<dyn IdentityProvider>,
        cloudflare: Arc<dyn AccessControl>,
        objects: Arc<dyn ClusterObjects>,
        settings: ReconcileSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            zitadel,
            cloudflare,
            objects,
            settings,
            cancel,
        }
    }

    fn checkpoint(&self) -> Result<(), Error> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }
}

/// Builder for constructing [`Context`] instances
///
/// ```ignore
/// let ctx = Context::builder(client, config)
///     .cancellation(token.clone())
///     .build()?;
/// ```
pub struct ContextBuilder {
    client: Client,
    config: OperatorConfig,
    cancel: CancellationToken,
}

impl ContextBuilder {
    fn new(client: Client, config: OperatorConfig) -> Self {
        Self {
            client,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Use `token` to stop in-flight passes on shutdown
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Build the Context, creating the HTTP clients for Zitadel and Cloudflare
    pub fn build(self) -> Result<Context, Error> {
        let config = self.config;

        let zitadel = ZitadelClient::new(
            config.zitadel.url.clone(),
            config.zitadel.token.clone(),
            config.request_timeout,
        )?;
        let cloudflare = CloudflareClient::new(
            config.cloudflare.api_base.clone(),
            config.cloudflare.account_id.clone(),
            config.cloudflare.api_token.clone(),
            config.request_timeout,
        )?;

        Ok(Context::new(
            Arc::new(KubeDescriptorStore::new(self.client.clone())),
            Arc::new(zitadel),
            Arc::new(cloudflare),
            Arc::new(KubeClusterObjects::new(self.client)),
            config.reconcile,
            self.cancel,
        ))
    }
}

/// Why a pass stopped early
enum Halt {
    /// A step failed; recorded on the condition
    Step(Reason, String),
    /// Cancellation or a store error; nothing is recorded
    Abort(Error),
}

impl From<Error> for Halt {
    fn from(e: Error) -> Self {
        Self::Abort(e)
    }
}

fn fail(reason: Reason, message: impl std::fmt::Display) -> Halt {
    Halt::Step(reason, message.to_string())
}

/// Reconcile a SecuredApplication
///
/// Returns `Action::await_change()` once converged (periodic resync is driven
/// by the controller), a requeue after a failed step, or an error for store
/// failures and cancellation.
#[instrument(skip(app, ctx), fields(app = %app.name_any(), namespace = %app.namespace().unwrap_or_default()))]
pub async fn reconcile(app: Arc<SecuredApplication>, ctx: Arc<Context>) -> Result<Action, Error> {
    ctx.checkpoint()?;

    let name = app.name_any();
    let namespace = app
        .namespace()
        .ok_or(Error::MissingObjectKey("metadata.namespace"))?;

    match Lifecycle::of(&app).next_step(app.spec.delete_protection) {
        Step::Release => {
            debug!("deletion already cleaned up");
            Ok(Action::await_change())
        }
        Step::Teardown { delete_external } => {
            teardown(&app, &ctx, &namespace, &name, delete_external).await
        }
        Step::AddMarker => {
            ctx.store.add_finalizer(&namespace, &name).await?;
            debug!("added finalizer");
            converge(&app, &ctx, &namespace, &name).await
        }
        Step::Converge => converge(&app, &ctx, &namespace, &name).await,
    }
}

/// Error policy for the controller
///
/// Cancelled passes are not requeued; shutdown or a newer pass takes over.
pub fn error_policy(app: Arc<SecuredApplication>, error: &Error, _ctx: Arc<Context>) -> Action {
    if matches!(error, Error::Cancelled) {
        debug!(app = %app.name_any(), "reconciliation cancelled");
        return Action::await_change();
    }

    error!(
        ?error,
        app = %app.name_any(),
        "reconciliation failed"
    );
    Action::requeue(ERROR_REQUEUE)
}

async fn converge(
    app: &SecuredApplication,
    ctx: &Context,
    namespace: &str,
    name: &str,
) -> Result<Action, Error> {
    let observed = app.status.clone().unwrap_or_default();
    let mut working = observed.clone();

    match run_pipeline(app, ctx, name, &mut working).await {
        Ok(()) => {
            record(ctx, namespace, name, &observed, working, Reason::Reconciled, "All resources are up to date")
                .await?;
            info!("reconciled");
            Ok(Action::await_change())
        }
        Err(Halt::Step(reason, message)) => {
            warn!(reason = %reason, message = %message, "reconciliation step failed");
            record(ctx, namespace, name, &observed, working, reason, &message).await?;
            Ok(Action::requeue(reason.retry_after().unwrap_or(TRANSIENT_RETRY)))
        }
        Err(Halt::Abort(e)) => Err(e),
    }
}

/// Write the outcome if it changes the stored status
async fn record(
    ctx: &Context,
    namespace: &str,
    name: &str,
    observed: &SecuredApplicationStatus,
    working: SecuredApplicationStatus,
    reason: Reason,
    message: &str,
) -> Result<(), Error> {
    let status = working.with_outcome(reason == Reason::Reconciled, reason.as_str(), message);
    if &status == observed {
        debug!("status unchanged, skipping write");
        return Ok(());
    }
    ctx.store.patch_status(namespace, name, &status).await
}

async fn run_pipeline(
    app: &SecuredApplication,
    ctx: &Context,
    name: &str,
    working: &mut SecuredApplicationStatus,
) -> Result<(), Halt> {
    app.spec
        .validate()
        .map_err(|e| fail(Reason::InvalidSpec, e))?;

    ctx.checkpoint()?;
    let project_id = resolve_project(app, ctx, working).await?;

    ctx.checkpoint()?;
    check_roles(app, ctx, &project_id).await?;

    ctx.checkpoint()?;
    converge_oidc_app(app, ctx, name, &project_id, working).await?;

    ctx.checkpoint()?;
    let access_app_id = converge_access_app(app, ctx, name, working).await?;

    ctx.checkpoint()?;
    converge_policy(app, ctx, &access_app_id, working).await?;

    ctx.checkpoint()?;
    converge_route(app, ctx).await
}

async fn resolve_project(
    app: &SecuredApplication,
    ctx: &Context,
    working: &mut SecuredApplicationStatus,
) -> Result<String, Halt> {
    let project_name = &app.spec.access.project;
    let project = ctx
        .zitadel
        .find_project_by_name(project_name)
        .await
        .map_err(|e| fail(Reason::ProjectLookupFailed, e))?
        .ok_or_else(|| {
            fail(
                Reason::ProjectNotFound,
                format!("Zitadel project {project_name:?} not found"),
            )
        })?;

    if working.project_id.as_deref() != Some(project.id.as_str()) {
        if let Some(previous) = &working.project_id {
            warn!(previous = %previous, current = %project.id, "project changed, retiring OIDC application");
            working.retire_zitadel_app(false);
        }
        working.project_id = Some(project.id.clone());
    }
    Ok(project.id)
}

async fn check_roles(app: &SecuredApplication, ctx: &Context, project_id: &str) -> Result<(), Halt> {
    let defined = ctx
        .zitadel
        .list_project_roles(project_id)
        .await
        .map_err(|e| fail(Reason::RoleLookupFailed, e))?;

    let missing: Vec<&str> = app
        .spec
        .access
        .roles
        .iter()
        .filter(|wanted| !defined.iter().any(|r| &r.key == *wanted))
        .map(String::as_str)
        .collect();

    if missing.is_empty() {
        return Ok(());
    }
    Err(fail(
        Reason::RoleNotFound,
        format!(
            "roles {:?} do not exist in Zitadel project {:?}",
            missing, app.spec.access.project
        ),
    ))
}

async fn converge_oidc_app(
    app: &SecuredApplication,
    ctx: &Context,
    name: &str,
    project_id: &str,
    working: &mut SecuredApplicationStatus,
) -> Result<(), Halt> {
    let config = AppConfig::resolve(name, &app.spec.host, app.spec.oidc.as_ref());
    let zitadel_failed = |e: ZitadelError| fail(Reason::ZitadelAppFailed, e);

    // A retired application shares the name; it must be gone before adoption.
    if let Some(retired) = working.retired_app.clone() {
        let reason = if retired.credentials_lost {
            Reason::SecretFailed
        } else {
            Reason::ZitadelAppFailed
        };
        delete_retired_app(ctx, working).await.map_err(|e| {
            fail(
                reason,
                format!("deleting retired OIDC application {}: {e}", retired.app_id),
            )
        })?;
    }

    if let Some(app_id) = working.zitadel_app_id.clone() {
        match ctx
            .zitadel
            .update_app(project_id, &app_id, &config)
            .await
            .map_err(zitadel_failed)?
        {
            AppUpdate::Updated => {
                info!(app_id = %app_id, "updated OIDC application");
                return Ok(());
            }
            AppUpdate::Unchanged => return Ok(()),
            AppUpdate::NotFound => {
                warn!(app_id = %app_id, "OIDC application vanished, looking it up again");
                working.forget_zitadel_app();
            }
        }
    }

    if let Some(existing) = ctx
        .zitadel
        .find_app_by_name(project_id, name)
        .await
        .map_err(zitadel_failed)?
    {
        match ctx
            .zitadel
            .update_app(project_id, &existing.id, &config)
            .await
            .map_err(zitadel_failed)?
        {
            AppUpdate::NotFound => {
                return Err(fail(
                    Reason::ZitadelAppFailed,
                    format!("OIDC application {} disappeared during adoption", existing.id),
                ))
            }
            AppUpdate::Updated | AppUpdate::Unchanged => {}
        }
        info!(app_id = %existing.id, "adopted existing OIDC application");
        working.zitadel_app_id = Some(existing.id);
        working.client_id = Some(existing.client_id);
        return Ok(());
    }

    let created = ctx
        .zitadel
        .create_app(project_id, &config)
        .await
        .map_err(zitadel_failed)?;
    info!(app_id = %created.id, client_id = %created.client_id, "created OIDC application");
    working.zitadel_app_id = Some(created.id.clone());
    working.client_id = Some(created.client_id.clone());

    if created.client_secret.is_empty() {
        return Ok(());
    }

    // The secret is only available now; no cancellation checkpoint before it is stored.
    if let Err(message) =
        store_credentials(app, ctx, &created.client_id, created.client_secret.as_str()).await
    {
        working.retire_zitadel_app(true);
        if let Err(e) = delete_retired_app(ctx, working).await {
            error!(
                app_id = %created.id,
                error = %e,
                "credentials were lost and the OIDC application could not be deleted yet"
            );
        }
        return Err(fail(Reason::SecretFailed, message));
    }
    Ok(())
}

async fn store_credentials(
    app: &SecuredApplication,
    ctx: &Context,
    client_id: &str,
    client_secret: &str,
) -> Result<(), String> {
    let secret = credential_secret(app, client_id, client_secret).map_err(|e| e.to_string())?;
    retry_with_backoff(
        &RetryConfig::with_max_attempts(SECRET_ATTEMPTS),
        "apply_credential_secret",
        || ctx.objects.apply_secret(&secret),
    )
    .await
    .map_err(|e| e.to_string())?;

    info!(secret = secret.metadata.name.as_deref().unwrap_or_default(), "stored OIDC credentials");
    Ok(())
}

/// Delete the application recorded in `retired_app` and clear the record.
///
/// A failed delete keeps the record, so every later pass retries it first.
async fn delete_retired_app(
    ctx: &Context,
    working: &mut SecuredApplicationStatus,
) -> Result<(), ZitadelError> {
    let Some(retired) = &working.retired_app else {
        return Ok(());
    };
    ctx.zitadel
        .delete_app(&retired.project_id, &retired.app_id)
        .await?;
    warn!(
        app_id = %retired.app_id,
        project_id = %retired.project_id,
        credentials_lost = retired.credentials_lost,
        "deleted retired OIDC application"
    );
    working.retired_app = None;
    Ok(())
}

async fn converge_access_app(
    app: &SecuredApplication,
    ctx: &Context,
    name: &str,
    working: &mut SecuredApplicationStatus,
) -> Result<String, Halt> {
    let desired =
        AccessAppRequest::self_hosted(name, &app.spec.host, &ctx.settings.session_duration);
    let lookup_failed = |e: CloudflareError| fail(Reason::CloudflareLookupFailed, e);
    let update_failed = |e: CloudflareError| fail(Reason::CloudflareUpdateFailed, e);

    if let Some(app_id) = working.access_application_id.clone() {
        match ctx
            .cloudflare
            .get_access_app(&app_id)
            .await
            .map_err(lookup_failed)?
        {
            Some(existing) => {
                if !desired.matches(&existing) {
                    ctx.cloudflare
                        .update_access_app(&app_id, &desired)
                        .await
                        .map_err(update_failed)?;
                    info!(access_app_id = %app_id, "updated Access application");
                }
                return Ok(app_id);
            }
            None => {
                warn!(access_app_id = %app_id, "Access application vanished, looking it up again");
                working.forget_access_application();
            }
        }
    }

    if let Some(existing) = ctx
        .cloudflare
        .find_access_app_by_domain(&app.spec.host)
        .await
        .map_err(lookup_failed)?
    {
        if !desired.matches(&existing) {
            ctx.cloudflare
                .update_access_app(&existing.id, &desired)
                .await
                .map_err(update_failed)?;
        }
        info!(access_app_id = %existing.id, "adopted existing Access application");
        working.forget_access_application();
        working.access_application_id = Some(existing.id.clone());
        return Ok(existing.id);
    }

    let created = ctx
        .cloudflare
        .create_access_app(&desired)
        .await
        .map_err(|e| fail(Reason::CloudflareCreateFailed, e))?;
    info!(access_app_id = %created.id, "created Access application");
    working.forget_access_application();
    working.access_application_id = Some(created.id.clone());
    Ok(created.id)
}

async fn converge_policy(
    app: &SecuredApplication,
    ctx: &Context,
    access_app_id: &str,
    working: &mut SecuredApplicationStatus,
) -> Result<(), Halt> {
    let mut roles: Vec<String> = Vec::with_capacity(app.spec.access.roles.len());
    for role in &app.spec.access.roles {
        if !roles.contains(role) {
            roles.push(role.clone());
        }
    }
    let desired = AccessPolicyRequest::allow_roles(
        &ctx.settings.policy_name,
        &ctx.settings.identity_provider_id,
        &ctx.settings.role_claim_name,
        &roles,
    );
    let policy_failed = |e: CloudflareError| fail(Reason::PolicyFailed, e);

    let existing = match working.access_policy_id.clone() {
        Some(policy_id) => {
            let found = ctx
                .cloudflare
                .get_access_policy(access_app_id, &policy_id)
                .await
                .map_err(policy_failed)?;
            if found.is_none() {
                warn!(policy_id = %policy_id, "Access policy vanished, looking it up again");
                working.access_policy_id = None;
            }
            found
        }
        None => None,
    };
    let existing = match existing {
        Some(policy) => Some(policy),
        None => ctx
            .cloudflare
            .find_access_policy_by_name(access_app_id, &desired.name)
            .await
            .map_err(policy_failed)?,
    };

    match existing {
        Some(policy) => {
            if !desired.matches(&policy) {
                ctx.cloudflare
                    .update_access_policy(access_app_id, &policy.id, &desired)
                    .await
                    .map_err(policy_failed)?;
                info!(policy_id = %policy.id, roles = ?roles, "updated Access policy");
            }
            working.access_policy_id = Some(policy.id);
        }
        None => {
            let created = ctx
                .cloudflare
                .create_access_policy(access_app_id, &desired)
                .await
                .map_err(policy_failed)?;
            info!(policy_id = %created.id, roles = ?roles, "created Access policy");
            working.access_policy_id = Some(created.id);
        }
    }
    Ok(())
}

async fn converge_route(app: &SecuredApplication, ctx: &Context) -> Result<(), Halt> {
    let Some(ingress) = route_ingress(app).map_err(|e| fail(Reason::IngressFailed, e))? else {
        return Ok(());
    };
    ctx.objects
        .apply_ingress(&ingress)
        .await
        .map_err(|e| fail(Reason::IngressFailed, e))?;
    debug!("applied Ingress");
    Ok(())
}

async fn teardown(
    app: &SecuredApplication,
    ctx: &Context,
    namespace: &str,
    name: &str,
    delete_external: bool,
) -> Result<Action, Error> {
    let observed = app.status.clone().unwrap_or_default();

    if delete_external {
        if let Err(message) = delete_external_objects(ctx, &observed).await? {
            warn!(message = %message, "teardown failed, keeping finalizer");
            record(ctx, namespace, name, &observed, observed.clone(), Reason::TeardownFailed, &message)
                .await?;
            return Ok(Action::requeue(TRANSIENT_RETRY));
        }
    } else {
        info!("delete protection enabled, keeping external resources");
    }

    // Ingress and Secret are collected through their owner reference.
    ctx.store.remove_finalizer(namespace, name).await?;
    info!("released finalizer");
    Ok(Action::await_change())
}

/// Delete the Zitadel and Cloudflare objects recorded in `status`.
///
/// The outer error aborts the pass (cancellation); the inner one is a failed delete.
async fn delete_external_objects(
    ctx: &Context,
    status: &SecuredApplicationStatus,
) -> Result<Result<(), String>, Error> {
    ctx.checkpoint()?;
    if let Some(retired) = &status.retired_app {
        if let Err(e) = ctx.zitadel.delete_app(&retired.project_id, &retired.app_id).await {
            return Ok(Err(format!(
                "deleting retired OIDC application {}: {e}",
                retired.app_id
            )));
        }
        info!(app_id = %retired.app_id, "deleted retired OIDC application");
    }

    if let (Some(app_id), Some(project_id)) = (&status.zitadel_app_id, &status.project_id) {
        if let Err(e) = ctx.zitadel.delete_app(project_id, app_id).await {
            return Ok(Err(format!("deleting OIDC application {app_id}: {e}")));
        }
        info!(app_id = %app_id, "deleted OIDC application");
    }

    ctx.checkpoint()?;
    if let Some(access_app_id) = &status.access_application_id {
        if let Err(e) = ctx.cloudflare.delete_access_app(access_app_id).await {
            return Ok(Err(format!(
                "deleting Access application {access_app_id}: {e}"
            )));
        }
        info!(access_app_id = %access_app_id, "deleted Access application");
    }
    Ok(Ok(()))
}
