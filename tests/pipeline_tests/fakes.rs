//! In-memory stand-ins for the external systems
//!
//! Each fake keeps its state behind a mutex and counts every write, so tests can
//! assert that a converged pass performs no mutations at all.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::api::networking::v1::Ingress;
use tokio_util::sync::CancellationToken;
use zeroize::Zeroizing;

use zitadel_access_operator::cloudflare::{
    AccessApp, AccessAppRequest, AccessControl, AccessPolicy, AccessPolicyRequest,
    CloudflareError,
};
use zitadel_access_operator::config::ReconcileSettings;
use zitadel_access_operator::controller::{Context, DescriptorStore};
use zitadel_access_operator::crd::SecuredApplicationStatus;
use zitadel_access_operator::objects::ClusterObjects;
use zitadel_access_operator::zitadel::{
    App, AppConfig, AppUpdate, CreatedApp, IdentityProvider, Project, Role, ZitadelError,
};
use zitadel_access_operator::{Error, FINALIZER};

// =============================================================================
// Zitadel
// =============================================================================

#[derive(Clone, Debug)]
pub struct StoredApp {
    pub project_id: String,
    pub client_id: String,
    pub config: AppConfig,
}

#[derive(Default)]
pub struct FakeZitadel {
    projects: Mutex<Vec<Project>>,
    roles: Mutex<BTreeMap<String, Vec<Role>>>,
    pub apps: Mutex<BTreeMap<String, StoredApp>>,
    next_id: AtomicUsize,
    pub mutations: AtomicUsize,
}

impl FakeZitadel {
    /// Zitadel with one project defining `roles`
    pub fn with_project(name: &str, id: &str, roles: &[&str]) -> Self {
        let fake = Self::default();
        fake.add_project(name, id, roles);
        fake
    }

    pub fn add_project(&self, name: &str, id: &str, roles: &[&str]) {
        self.projects.lock().unwrap().push(Project {
            id: id.to_string(),
            name: name.to_string(),
        });
        self.roles.lock().unwrap().insert(
            id.to_string(),
            roles
                .iter()
                .map(|r| Role {
                    key: r.to_string(),
                    display_name: r.to_string(),
                })
                .collect(),
        );
    }

    /// IDs of the applications stored under `project_id`
    pub fn apps_in(&self, project_id: &str) -> Vec<String> {
        self.apps
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, a)| a.project_id == project_id)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn mutations(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    pub fn app_count(&self) -> usize {
        self.apps.lock().unwrap().len()
    }
}

#[async_trait]
impl IdentityProvider for FakeZitadel {
    async fn find_project_by_name(&self, name: &str) -> Result<Option<Project>, ZitadelError> {
        Ok(self
            .projects
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.name == name)
            .cloned())
    }

    async fn list_project_roles(&self, project_id: &str) -> Result<Vec<Role>, ZitadelError> {
        Ok(self
            .roles
            .lock()
            .unwrap()
            .get(project_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn find_app_by_name(
        &self,
        project_id: &str,
        name: &str,
    ) -> Result<Option<App>, ZitadelError> {
        Ok(self
            .apps
            .lock()
            .unwrap()
            .iter()
            .find(|(_, a)| a.project_id == project_id && a.config.name == name)
            .map(|(id, a)| App {
                id: id.clone(),
                client_id: a.client_id.clone(),
            }))
    }

    async fn create_app(
        &self,
        project_id: &str,
        config: &AppConfig,
    ) -> Result<CreatedApp, ZitadelError> {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("z-{n}");
        let client_id = format!("client-{n}@project");
        self.apps.lock().unwrap().insert(
            id.clone(),
            StoredApp {
                project_id: project_id.to_string(),
                client_id: client_id.clone(),
                config: config.clone(),
            },
        );
        self.mutations.fetch_add(1, Ordering::SeqCst);
        Ok(CreatedApp {
            id,
            client_id,
            client_secret: Zeroizing::new(format!("secret-{n}")),
        })
    }

    async fn update_app(
        &self,
        _project_id: &str,
        app_id: &str,
        config: &AppConfig,
    ) -> Result<AppUpdate, ZitadelError> {
        let mut apps = self.apps.lock().unwrap();
        let Some(stored) = apps.get_mut(app_id) else {
            return Ok(AppUpdate::NotFound);
        };
        if &stored.config == config {
            return Ok(AppUpdate::Unchanged);
        }
        stored.config = config.clone();
        self.mutations.fetch_add(1, Ordering::SeqCst);
        Ok(AppUpdate::Updated)
    }

    async fn delete_app(&self, project_id: &str, app_id: &str) -> Result<(), ZitadelError> {
        let mut apps = self.apps.lock().unwrap();
        if apps.get(app_id).map(|a| a.project_id.as_str()) != Some(project_id) {
            return Ok(());
        }
        if apps.remove(app_id).is_some() {
            self.mutations.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

// =============================================================================
// Cloudflare
// =============================================================================

#[derive(Default)]
pub struct FakeCloudflare {
    pub apps: Mutex<BTreeMap<String, AccessApp>>,
    pub policies: Mutex<BTreeMap<String, Vec<AccessPolicy>>>,
    next_id: AtomicUsize,
    pub mutations: AtomicUsize,
}

impl FakeCloudflare {
    pub fn mutations(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    fn next(&self, prefix: &str) -> String {
        format!("{prefix}-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Pre-existing application created outside the operator
    pub fn insert_app(&self, app: AccessApp) {
        self.apps.lock().unwrap().insert(app.id.clone(), app);
    }
}

fn stored_app(id: String, request: &AccessAppRequest) -> AccessApp {
    AccessApp {
        id,
        name: request.name.clone(),
        domain: request.domain.clone(),
        app_type: request.app_type.clone(),
        session_duration: request.session_duration.clone(),
    }
}

fn stored_policy(id: String, request: &AccessPolicyRequest) -> AccessPolicy {
    AccessPolicy {
        id,
        name: request.name.clone(),
        decision: request.decision.clone(),
        precedence: request.precedence,
        include: request.include.clone(),
    }
}

fn missing(path: String) -> CloudflareError {
    CloudflareError::api("PUT", path, 404, "not found")
}

#[async_trait]
impl AccessControl for FakeCloudflare {
    async fn find_access_app_by_domain(
        &self,
        domain: &str,
    ) -> Result<Option<AccessApp>, CloudflareError> {
        Ok(self
            .apps
            .lock()
            .unwrap()
            .values()
            .find(|a| a.domain == domain)
            .cloned())
    }

    async fn get_access_app(&self, app_id: &str) -> Result<Option<AccessApp>, CloudflareError> {
        Ok(self.apps.lock().unwrap().get(app_id).cloned())
    }

    async fn create_access_app(
        &self,
        request: &AccessAppRequest,
    ) -> Result<AccessApp, CloudflareError> {
        let app = stored_app(self.next("cf"), request);
        self.apps.lock().unwrap().insert(app.id.clone(), app.clone());
        self.mutations.fetch_add(1, Ordering::SeqCst);
        Ok(app)
    }

    async fn update_access_app(
        &self,
        app_id: &str,
        request: &AccessAppRequest,
    ) -> Result<(), CloudflareError> {
        let mut apps = self.apps.lock().unwrap();
        if !apps.contains_key(app_id) {
            return Err(missing(format!("/access/apps/{app_id}")));
        }
        apps.insert(app_id.to_string(), stored_app(app_id.to_string(), request));
        self.mutations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete_access_app(&self, app_id: &str) -> Result<(), CloudflareError> {
        if self.apps.lock().unwrap().remove(app_id).is_some() {
            self.policies.lock().unwrap().remove(app_id);
            self.mutations.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn get_access_policy(
        &self,
        app_id: &str,
        policy_id: &str,
    ) -> Result<Option<AccessPolicy>, CloudflareError> {
        Ok(self
            .policies
            .lock()
            .unwrap()
            .get(app_id)
            .and_then(|ps| ps.iter().find(|p| p.id == policy_id).cloned()))
    }

    async fn find_access_policy_by_name(
        &self,
        app_id: &str,
        name: &str,
    ) -> Result<Option<AccessPolicy>, CloudflareError> {
        Ok(self
            .policies
            .lock()
            .unwrap()
            .get(app_id)
            .and_then(|ps| ps.iter().find(|p| p.name == name).cloned()))
    }

    async fn create_access_policy(
        &self,
        app_id: &str,
        request: &AccessPolicyRequest,
    ) -> Result<AccessPolicy, CloudflareError> {
        let policy = stored_policy(self.next("pol"), request);
        self.policies
            .lock()
            .unwrap()
            .entry(app_id.to_string())
            .or_default()
            .push(policy.clone());
        self.mutations.fetch_add(1, Ordering::SeqCst);
        Ok(policy)
    }

    async fn update_access_policy(
        &self,
        app_id: &str,
        policy_id: &str,
        request: &AccessPolicyRequest,
    ) -> Result<(), CloudflareError> {
        let mut policies = self.policies.lock().unwrap();
        let existing = policies
            .get_mut(app_id)
            .and_then(|ps| ps.iter_mut().find(|p| p.id == policy_id))
            .ok_or_else(|| missing(format!("/access/apps/{app_id}/policies/{policy_id}")))?;
        *existing = stored_policy(policy_id.to_string(), request);
        self.mutations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// =============================================================================
// Kubernetes
// =============================================================================

#[derive(Default)]
pub struct FakeObjects {
    pub secrets: Mutex<Vec<Secret>>,
    pub ingresses: Mutex<Vec<Ingress>>,
}

#[async_trait]
impl ClusterObjects for FakeObjects {
    async fn apply_secret(&self, secret: &Secret) -> Result<(), Error> {
        self.secrets.lock().unwrap().push(secret.clone());
        Ok(())
    }

    async fn apply_ingress(&self, ingress: &Ingress) -> Result<(), Error> {
        self.ingresses.lock().unwrap().push(ingress.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeStore {
    pub statuses: Mutex<Vec<SecuredApplicationStatus>>,
    pub finalizers: Mutex<Vec<String>>,
}

impl FakeStore {
    pub fn last_status(&self) -> Option<SecuredApplicationStatus> {
        self.statuses.lock().unwrap().last().cloned()
    }

    pub fn status_writes(&self) -> usize {
        self.statuses.lock().unwrap().len()
    }

    pub fn has_marker(&self) -> bool {
        self.finalizers.lock().unwrap().iter().any(|f| f == FINALIZER)
    }
}

#[async_trait]
impl DescriptorStore for FakeStore {
    async fn patch_status(
        &self,
        _namespace: &str,
        _name: &str,
        status: &SecuredApplicationStatus,
    ) -> Result<(), Error> {
        self.statuses.lock().unwrap().push(status.clone());
        Ok(())
    }

    async fn add_finalizer(&self, _namespace: &str, _name: &str) -> Result<(), Error> {
        let mut finalizers = self.finalizers.lock().unwrap();
        if !finalizers.iter().any(|f| f == FINALIZER) {
            finalizers.push(FINALIZER.to_string());
        }
        Ok(())
    }

    async fn remove_finalizer(&self, _namespace: &str, _name: &str) -> Result<(), Error> {
        self.finalizers.lock().unwrap().retain(|f| f != FINALIZER);
        Ok(())
    }
}

// =============================================================================
// World
// =============================================================================

/// All fakes plus a context wired to them
pub struct World {
    pub zitadel: Arc<FakeZitadel>,
    pub cloudflare: Arc<FakeCloudflare>,
    pub objects: Arc<FakeObjects>,
    pub store: Arc<FakeStore>,
    pub ctx: Arc<Context>,
}

impl World {
    pub fn new(zitadel: FakeZitadel, cloudflare: FakeCloudflare) -> Self {
        let zitadel = Arc::new(zitadel);
        let cloudflare = Arc::new(cloudflare);
        let objects = Arc::new(FakeObjects::default());
        let store = Arc::new(FakeStore::default());
        let ctx = Arc::new(Context::new(
            store.clone(),
            zitadel.clone(),
            cloudflare.clone(),
            objects.clone(),
            ReconcileSettings {
                identity_provider_id: "idp-zitadel".to_string(),
                ..Default::default()
            },
            CancellationToken::new(),
        ));
        Self {
            zitadel,
            cloudflare,
            objects,
            store,
            ctx,
        }
    }

    /// Writes to the external systems so far
    pub fn external_mutations(&self) -> usize {
        self.zitadel.mutations() + self.cloudflare.mutations()
    }
}
