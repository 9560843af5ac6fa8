//! Convergence scenarios
//!
//! Each test plays a sequence of passes the way the controller would: the
//! status written by one pass is what the next pass observes.

use std::sync::Arc;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::runtime::controller::Action;

use zitadel_access_operator::cloudflare::AccessApp;
use zitadel_access_operator::controller::reconcile;
use zitadel_access_operator::crd::{
    Access, Backend, SecuredApplication, SecuredApplicationSpec, TunnelConfig,
};
use zitadel_access_operator::FINALIZER;

use super::fakes::{FakeCloudflare, FakeZitadel, World};

// =============================================================================
// Test Fixtures
// =============================================================================

const HOST: &str = "grafana.example.com";

fn grafana(roles: &[&str]) -> SecuredApplication {
    let mut app = SecuredApplication::new(
        "grafana",
        SecuredApplicationSpec {
            host: HOST.to_string(),
            access: Access {
                project: "observability".to_string(),
                roles: roles.iter().map(|r| r.to_string()).collect(),
            },
            oidc: None,
            tunnel: None,
            delete_protection: false,
        },
    );
    app.metadata.namespace = Some("monitoring".to_string());
    app.metadata.uid = Some("6f1c2c1e-grafana".to_string());
    app.metadata.finalizers = Some(vec![FINALIZER.to_string()]);
    app
}

fn world() -> World {
    World::new(
        FakeZitadel::with_project("observability", "proj-obs", &["admin", "viewer"]),
        FakeCloudflare::default(),
    )
}

/// Run one pass and feed the written status back into the object
async fn pass(world: &World, app: &mut SecuredApplication) -> Action {
    let action = reconcile(Arc::new(app.clone()), world.ctx.clone())
        .await
        .expect("pass should not error");
    if let Some(status) = world.store.last_status() {
        app.status = Some(status);
    }
    action
}

// =============================================================================
// Stories
// =============================================================================

/// Story: the second pass over a converged application changes nothing:
/// no external writes, no new Secret, no status write
#[tokio::test]
async fn story_second_pass_is_a_no_op() {
    let world = world();
    let mut app = grafana(&["admin"]);

    assert_eq!(pass(&world, &mut app).await, Action::await_change());
    let status = app.status.clone().expect("status written");
    assert!(status.ready);
    assert_eq!(status.project_id.as_deref(), Some("proj-obs"));
    assert!(status.client_id.is_some());
    assert!(status.access_application_id.is_some());
    assert!(status.access_policy_id.is_some());

    // OIDC app, Access app, policy
    assert_eq!(world.external_mutations(), 3);
    assert_eq!(world.objects.secrets.lock().unwrap().len(), 1);
    assert_eq!(world.store.status_writes(), 1);

    assert_eq!(pass(&world, &mut app).await, Action::await_change());
    assert_eq!(world.external_mutations(), 3);
    assert_eq!(world.objects.secrets.lock().unwrap().len(), 1);
    assert_eq!(world.store.status_writes(), 1);
    assert_eq!(app.status, Some(status));
}

/// Story: the credential Secret carries the client ID and the one-time secret
#[tokio::test]
async fn story_credentials_land_in_owned_secret() {
    let world = world();
    let mut app = grafana(&["admin"]);
    pass(&world, &mut app).await;

    let secrets = world.objects.secrets.lock().unwrap();
    let secret = &secrets[0];
    assert_eq!(secret.metadata.name.as_deref(), Some("grafana-oidc"));
    assert_eq!(secret.metadata.namespace.as_deref(), Some("monitoring"));

    let owner = &secret.metadata.owner_references.as_ref().expect("owner")[0];
    assert_eq!(owner.kind, "SecuredApplication");
    assert_eq!(owner.uid, "6f1c2c1e-grafana");

    let data = secret.data.as_ref().expect("data");
    let client_id = app.status.as_ref().and_then(|s| s.client_id.clone()).expect("client id");
    assert_eq!(data["clientId"].0, client_id.into_bytes());
    assert_eq!(data["clientSecret"].0, b"secret-1".to_vec());
}

/// Story: a fresh resource first gets the cleanup marker
#[tokio::test]
async fn story_new_resource_gets_marker_first() {
    let world = world();
    let mut app = grafana(&["admin"]);
    app.metadata.finalizers = None;

    pass(&world, &mut app).await;
    assert!(world.store.has_marker());
    assert!(app.status.expect("status").ready);
}

/// Story: adding a role to the resource only rewrites the policy
#[tokio::test]
async fn story_role_change_rewrites_policy_only() {
    let world = world();
    let mut app = grafana(&["admin"]);
    pass(&world, &mut app).await;
    let before = world.external_mutations();

    app.spec.access.roles.push("viewer".to_string());
    pass(&world, &mut app).await;

    assert_eq!(world.external_mutations(), before + 1);
    let app_id = app
        .status
        .as_ref()
        .and_then(|s| s.access_application_id.clone())
        .expect("access app");
    let policies = world.cloudflare.policies.lock().unwrap();
    let policy = &policies[&app_id][0];
    let claims: Vec<_> = policy
        .include
        .iter()
        .filter_map(|r| r.oidc.as_ref())
        .map(|r| r.claim_value.as_str())
        .collect();
    assert_eq!(claims, vec!["admin", "viewer"]);
}

/// Story: a role missing in Zitadel blocks the whole pipeline
#[tokio::test]
async fn story_unknown_role_creates_nothing() {
    let world = world();
    let mut app = grafana(&["admin", "superuser"]);

    let action = pass(&world, &mut app).await;

    assert_eq!(action, Action::requeue(std::time::Duration::from_secs(300)));
    assert_eq!(world.external_mutations(), 0);
    assert!(world.objects.secrets.lock().unwrap().is_empty());
    let status = app.status.expect("status");
    assert!(!status.ready);
    let condition = status.ready_condition().expect("condition");
    assert_eq!(condition.reason, "RoleNotFound");
    assert!(condition.message.contains("superuser"));
}

/// Story: an Access application made by hand for the host is taken over and
/// brought in line instead of duplicated
#[tokio::test]
async fn story_hand_made_access_app_is_taken_over() {
    let cloudflare = FakeCloudflare::default();
    cloudflare.insert_app(AccessApp {
        id: "cf-manual".to_string(),
        name: "Grafana (manual)".to_string(),
        domain: HOST.to_string(),
        app_type: "self_hosted".to_string(),
        session_duration: "730h".to_string(),
    });
    let world = World::new(
        FakeZitadel::with_project("observability", "proj-obs", &["admin"]),
        cloudflare,
    );
    let mut app = grafana(&["admin"]);

    pass(&world, &mut app).await;

    let apps = world.cloudflare.apps.lock().unwrap();
    assert_eq!(apps.len(), 1);
    assert_eq!(apps["cf-manual"].name, "grafana");
    assert_eq!(apps["cf-manual"].session_duration, "24h");
    assert_eq!(
        app.status.and_then(|s| s.access_application_id).as_deref(),
        Some("cf-manual")
    );
}

/// Story: pointing the resource at another project moves its OIDC application
/// there and deletes the one left in the old project
#[tokio::test]
async fn story_project_move_leaves_no_orphan() {
    let world = world();
    world.zitadel.add_project("platform", "proj-platform", &["admin"]);
    let mut app = grafana(&["admin"]);
    pass(&world, &mut app).await;
    assert_eq!(world.zitadel.apps_in("proj-obs").len(), 1);

    app.spec.access.project = "platform".to_string();
    assert_eq!(pass(&world, &mut app).await, Action::await_change());

    assert!(world.zitadel.apps_in("proj-obs").is_empty());
    assert_eq!(world.zitadel.apps_in("proj-platform").len(), 1);
    let status = app.status.expect("status");
    assert!(status.ready);
    assert_eq!(status.project_id.as_deref(), Some("proj-platform"));
    assert_eq!(status.retired_app, None);
    // A new app means a new secret
    assert_eq!(world.objects.secrets.lock().unwrap().len(), 2);
}

/// Story: deleting the resource removes the remote objects, then the marker
#[tokio::test]
async fn story_deletion_cleans_up_remote_objects() {
    let world = world();
    let mut app = grafana(&["admin"]);
    app.metadata.finalizers = None;
    pass(&world, &mut app).await;
    assert_eq!(world.zitadel.app_count(), 1);
    assert_eq!(world.cloudflare.apps.lock().unwrap().len(), 1);

    app.metadata.finalizers = Some(vec![FINALIZER.to_string()]);
    app.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));
    let action = pass(&world, &mut app).await;

    assert_eq!(action, Action::await_change());
    assert_eq!(world.zitadel.app_count(), 0);
    assert!(world.cloudflare.apps.lock().unwrap().is_empty());
    assert!(!world.store.has_marker());
}

/// Story: delete protection leaves the remote objects in place
#[tokio::test]
async fn story_protected_deletion_keeps_remote_objects() {
    let world = world();
    let mut app = grafana(&["admin"]);
    app.spec.delete_protection = true;
    pass(&world, &mut app).await;

    app.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));
    pass(&world, &mut app).await;

    assert_eq!(world.zitadel.app_count(), 1);
    assert_eq!(world.cloudflare.apps.lock().unwrap().len(), 1);
}

/// Story: a tunnel backend gets an Ingress owned by the resource
#[tokio::test]
async fn story_tunnel_backend_gets_ingress() {
    let world = world();
    let mut app = grafana(&["admin"]);
    app.spec.tunnel = Some(TunnelConfig {
        backend: Backend {
            service_name: "grafana".to_string(),
            service_port: 3000,
            protocol: None,
        },
        ingress: None,
    });

    pass(&world, &mut app).await;

    let ingresses = world.objects.ingresses.lock().unwrap();
    assert_eq!(ingresses.len(), 1);
    let spec = ingresses[0].spec.as_ref().expect("spec");
    assert_eq!(spec.ingress_class_name.as_deref(), Some("cloudflare-tunnel"));
    let rule = &spec.rules.as_ref().expect("rules")[0];
    assert_eq!(rule.host.as_deref(), Some(HOST));
    let backend = rule.http.as_ref().expect("http").paths[0]
        .backend
        .service
        .as_ref()
        .expect("service backend");
    assert_eq!(backend.name, "grafana");
    assert_eq!(
        backend.port.as_ref().and_then(|p| p.number),
        Some(3000)
    );
}
