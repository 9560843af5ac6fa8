//! Cluster-native objects owned by a SecuredApplication
//!
//! The operator never deletes these objects itself. Each one carries a controller
//! owner reference to its SecuredApplication and is collected by the Kubernetes
//! garbage collector when the application goes away.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, Resource, ResourceExt};
#[cfg(test)]
use mockall::automock;
use tracing::debug;

use crate::crd::SecuredApplication;
use crate::{Error, FIELD_MANAGER};

/// Secret key holding the OIDC client ID
pub const CLIENT_ID_KEY: &str = "clientId";

/// Secret key holding the OIDC client secret
pub const CLIENT_SECRET_KEY: &str = "clientSecret";

/// Ingress class used when the tunnel does not name one
pub const DEFAULT_INGRESS_CLASS: &str = "cloudflare-tunnel";

/// Annotation telling the tunnel ingress controller which protocol the backend speaks
pub const BACKEND_PROTOCOL_ANNOTATION: &str =
    "cloudflare-tunnel-ingress-controller.strrl.dev/backend-protocol";

/// Label marking objects written by this operator
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

const DEFAULT_PATH: &str = "/";
const DEFAULT_PATH_TYPE: &str = "Prefix";

/// Make `parent` the controlling owner of `child`.
///
/// Replaces any previous owner reference to the same parent; other owners are kept.
pub fn link_ownership(child: &mut ObjectMeta, parent: &SecuredApplication) -> Result<(), Error> {
    let owner = parent
        .controller_owner_ref(&())
        .ok_or(Error::MissingObjectKey("metadata.uid"))?;

    let owners = child.owner_references.get_or_insert_with(Vec::new);
    owners.retain(|o| o.uid != owner.uid);
    owners.push(owner);
    Ok(())
}

fn owned_metadata(name: String, app: &SecuredApplication) -> Result<ObjectMeta, Error> {
    let namespace = app
        .namespace()
        .ok_or(Error::MissingObjectKey("metadata.namespace"))?;

    let mut meta = ObjectMeta {
        name: Some(name),
        namespace: Some(namespace),
        labels: Some(BTreeMap::from([(
            MANAGED_BY_LABEL.to_string(),
            FIELD_MANAGER.to_string(),
        )])),
        ..Default::default()
    };
    link_ownership(&mut meta, app)?;
    Ok(meta)
}

/// Build the Secret that stores freshly issued OIDC credentials
pub fn credential_secret(
    app: &SecuredApplication,
    client_id: &str,
    client_secret: &str,
) -> Result<Secret, Error> {
    let name = app.spec.credential_secret_name(&app.name_any());

    Ok(Secret {
        metadata: owned_metadata(name, app)?,
        type_: Some("Opaque".to_string()),
        data: Some(BTreeMap::from([
            (
                CLIENT_ID_KEY.to_string(),
                ByteString(client_id.as_bytes().to_vec()),
            ),
            (
                CLIENT_SECRET_KEY.to_string(),
                ByteString(client_secret.as_bytes().to_vec()),
            ),
        ])),
        ..Default::default()
    })
}

/// Build the Ingress routing `spec.host` to the tunnel backend.
///
/// Returns `None` when the application does not request routing.
pub fn route_ingress(app: &SecuredApplication) -> Result<Option<Ingress>, Error> {
    let Some(tunnel) = &app.spec.tunnel else {
        return Ok(None);
    };
    let overrides = tunnel.ingress.clone().unwrap_or_default();

    let mut annotations = overrides.annotations;
    if let Some(protocol) = tunnel.backend.protocol.as_deref().filter(|p| !p.is_empty()) {
        annotations.insert(BACKEND_PROTOCOL_ANNOTATION.to_string(), protocol.to_string());
    }

    let non_empty = |value: Option<String>, default: &str| {
        value
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| default.to_string())
    };

    let mut metadata = owned_metadata(app.name_any(), app)?;
    if !annotations.is_empty() {
        metadata.annotations = Some(annotations);
    }

    let path = HTTPIngressPath {
        path: Some(non_empty(overrides.path, DEFAULT_PATH)),
        path_type: non_empty(overrides.path_type, DEFAULT_PATH_TYPE),
        backend: IngressBackend {
            service: Some(IngressServiceBackend {
                name: tunnel.backend.service_name.clone(),
                port: Some(ServiceBackendPort {
                    number: Some(tunnel.backend.service_port),
                    ..Default::default()
                }),
            }),
            ..Default::default()
        },
    };

    Ok(Some(Ingress {
        metadata,
        spec: Some(IngressSpec {
            ingress_class_name: Some(non_empty(overrides.class_name, DEFAULT_INGRESS_CLASS)),
            rules: Some(vec![IngressRule {
                host: Some(app.spec.host.clone()),
                http: Some(HTTPIngressRuleValue { paths: vec![path] }),
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }))
}

/// Create-or-update access to cluster-native objects
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterObjects: Send + Sync {
    /// Create or replace the credential Secret
    async fn apply_secret(&self, secret: &Secret) -> Result<(), Error>;

    /// Create or replace the route Ingress
    async fn apply_ingress(&self, ingress: &Ingress) -> Result<(), Error>;
}

/// [`ClusterObjects`] backed by server-side apply
#[derive(Clone)]
pub struct KubeClusterObjects {
    client: Client,
}

impl KubeClusterObjects {
    /// Create a new adapter around a Kubernetes client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn apply<K>(&self, object: &K) -> Result<(), Error>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope>
            + Clone
            + std::fmt::Debug
            + serde::Serialize
            + serde::de::DeserializeOwned,
        K::DynamicType: Default,
    {
        let name = object
            .meta()
            .name
            .as_deref()
            .ok_or(Error::MissingObjectKey("metadata.name"))?;
        let namespace = object
            .meta()
            .namespace
            .as_deref()
            .ok_or(Error::MissingObjectKey("metadata.namespace"))?;

        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        let params = PatchParams::apply(FIELD_MANAGER).force();
        api.patch(name, &params, &Patch::Apply(object)).await?;

        debug!(kind = %K::kind(&K::DynamicType::default()), name = %name, namespace = %namespace, "Applied object");
        Ok(())
    }
}

#[async_trait]
impl ClusterObjects for KubeClusterObjects {
    async fn apply_secret(&self, secret: &Secret) -> Result<(), Error> {
        self.apply(secret).await
    }

    async fn apply_ingress(&self, ingress: &Ingress) -> Result<(), Error> {
        self.apply(ingress).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{Access, Backend, IngressConfig, OidcConfig, SecuredApplicationSpec, TunnelConfig};

    fn sample_app(tunnel: Option<TunnelConfig>) -> SecuredApplication {
        let mut app = SecuredApplication::new(
            "wiki",
            SecuredApplicationSpec {
                host: "wiki.example.com".to_string(),
                access: Access {
                    project: "infra".to_string(),
                    roles: vec!["admin".to_string()],
                },
                oidc: None,
                tunnel,
                delete_protection: false,
            },
        );
        app.metadata.namespace = Some("apps".to_string());
        app.metadata.uid = Some("uid-1234".to_string());
        app
    }

    fn backend(protocol: Option<&str>) -> TunnelConfig {
        TunnelConfig {
            backend: Backend {
                service_name: "wiki-svc".to_string(),
                service_port: 8080,
                protocol: protocol.map(str::to_string),
            },
            ingress: None,
        }
    }

    /// Story: every generated object is owned by its SecuredApplication so the
    /// garbage collector removes it together with the application
    #[test]
    fn story_objects_are_linked_to_their_owner() {
        let app = sample_app(Some(backend(None)));

        let secret = credential_secret(&app, "client", "secret").expect("secret builds");
        let ingress = route_ingress(&app).expect("ingress builds").expect("requested");

        for meta in [&secret.metadata, &ingress.metadata] {
            let owners = meta.owner_references.as_ref().expect("owner refs");
            assert_eq!(owners.len(), 1);
            assert_eq!(owners[0].uid, "uid-1234");
            assert_eq!(owners[0].kind, "SecuredApplication");
            assert_eq!(owners[0].controller, Some(true));
            assert_eq!(meta.namespace.as_deref(), Some("apps"));
        }
    }

    #[test]
    fn test_link_ownership_is_idempotent_and_keeps_other_owners() {
        let app = sample_app(None);
        let mut meta = ObjectMeta {
            owner_references: Some(vec![k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference {
                api_version: "v1".to_string(),
                kind: "ConfigMap".to_string(),
                name: "other".to_string(),
                uid: "uid-other".to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        };

        link_ownership(&mut meta, &app).expect("linked");
        link_ownership(&mut meta, &app).expect("linked again");

        let owners = meta.owner_references.expect("owner refs");
        assert_eq!(owners.len(), 2);
        assert_eq!(owners.iter().filter(|o| o.uid == "uid-1234").count(), 1);
    }

    #[test]
    fn test_link_ownership_requires_uid() {
        let mut app = sample_app(None);
        app.metadata.uid = None;
        let mut meta = ObjectMeta::default();
        assert!(matches!(
            link_ownership(&mut meta, &app),
            Err(Error::MissingObjectKey(_))
        ));
    }

    #[test]
    fn test_credential_secret_holds_both_keys() {
        let app = sample_app(None);
        let secret = credential_secret(&app, "client-1", "s3cr3t").expect("secret builds");

        assert_eq!(secret.metadata.name.as_deref(), Some("wiki-oidc"));
        let data = secret.data.expect("data");
        assert_eq!(data[CLIENT_ID_KEY].0, b"client-1".to_vec());
        assert_eq!(data[CLIENT_SECRET_KEY].0, b"s3cr3t".to_vec());
        assert_eq!(
            secret.metadata.labels.expect("labels")[MANAGED_BY_LABEL],
            FIELD_MANAGER
        );
    }

    #[test]
    fn test_credential_secret_honours_name_override() {
        let mut app = sample_app(None);
        app.spec.oidc = Some(OidcConfig {
            client_secret_ref: Some("wiki-credentials".to_string()),
            ..Default::default()
        });
        let secret = credential_secret(&app, "c", "s").expect("secret builds");
        assert_eq!(secret.metadata.name.as_deref(), Some("wiki-credentials"));
    }

    /// Story: without a tunnel no routing object is produced at all
    #[test]
    fn story_no_tunnel_means_no_ingress() {
        let app = sample_app(None);
        assert!(route_ingress(&app).expect("ok").is_none());
    }

    /// Story: a bare tunnel gets the Cloudflare tunnel class, `/` and `Prefix`
    #[test]
    fn story_ingress_defaults() {
        let app = sample_app(Some(backend(None)));
        let ingress = route_ingress(&app).expect("ok").expect("requested");

        assert_eq!(ingress.metadata.name.as_deref(), Some("wiki"));
        assert!(ingress.metadata.annotations.is_none());
        let spec = ingress.spec.expect("spec");
        assert_eq!(spec.ingress_class_name.as_deref(), Some("cloudflare-tunnel"));

        let rules = spec.rules.expect("rules");
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].host.as_deref(), Some("wiki.example.com"));
        let paths = &rules[0].http.as_ref().expect("http").paths;
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].path.as_deref(), Some("/"));
        assert_eq!(paths[0].path_type, "Prefix");
        let service = paths[0].backend.service.as_ref().expect("service backend");
        assert_eq!(service.name, "wiki-svc");
        assert_eq!(service.port.as_ref().and_then(|p| p.number), Some(8080));
    }

    #[test]
    fn test_ingress_overrides_and_backend_protocol() {
        let mut tunnel = backend(Some("https"));
        tunnel.ingress = Some(IngressConfig {
            class_name: Some("nginx".to_string()),
            annotations: BTreeMap::from([("team".to_string(), "docs".to_string())]),
            path: Some("/wiki".to_string()),
            path_type: Some("Exact".to_string()),
        });
        let app = sample_app(Some(tunnel));
        let ingress = route_ingress(&app).expect("ok").expect("requested");

        let annotations = ingress.metadata.annotations.expect("annotations");
        assert_eq!(annotations["team"], "docs");
        assert_eq!(annotations[BACKEND_PROTOCOL_ANNOTATION], "https");

        let spec = ingress.spec.expect("spec");
        assert_eq!(spec.ingress_class_name.as_deref(), Some("nginx"));
        let rules = spec.rules.expect("rules");
        let path = &rules[0].http.as_ref().expect("http").paths[0];
        assert_eq!(path.path.as_deref(), Some("/wiki"));
        assert_eq!(path.path_type, "Exact");
    }

    #[test]
    fn test_objects_require_a_namespace() {
        let mut app = sample_app(Some(backend(None)));
        app.metadata.namespace = None;
        assert!(credential_secret(&app, "c", "s").is_err());
        assert!(route_ingress(&app).is_err());
    }
}
