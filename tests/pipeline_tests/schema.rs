//! CRD schema checks
//!
//! The generated CustomResourceDefinition is what `--crd` prints and
//! `--install-crd` applies, so its shape is part of the public contract.

use kube::CustomResourceExt;
use serde_json::Value;

use zitadel_access_operator::crd::SecuredApplication;

fn spec_schema() -> Value {
    let crd = SecuredApplication::crd();
    let version = &crd.spec.versions[0];
    let schema = version
        .schema
        .as_ref()
        .and_then(|s| s.open_api_v3_schema.as_ref())
        .expect("schema");
    serde_json::to_value(schema).expect("serializable schema")
}

/// Story: users address the resource as access.twiechert.de/v1alpha1 with the
/// `sapp` short name, and status is a sub-resource
#[test]
fn story_crd_identity() {
    let crd = SecuredApplication::crd();

    assert_eq!(
        crd.metadata.name.as_deref(),
        Some("securedapplications.access.twiechert.de")
    );
    assert_eq!(crd.spec.group, "access.twiechert.de");
    assert_eq!(crd.spec.scope, "Namespaced");
    assert_eq!(crd.spec.names.kind, "SecuredApplication");
    assert_eq!(crd.spec.names.short_names, Some(vec!["sapp".to_string()]));

    let version = &crd.spec.versions[0];
    assert_eq!(version.name, "v1alpha1");
    assert!(version
        .subresources
        .as_ref()
        .and_then(|s| s.status.as_ref())
        .is_some());
}

#[test]
fn test_printer_columns() {
    let crd = SecuredApplication::crd();
    let columns: Vec<_> = crd.spec.versions[0]
        .additional_printer_columns
        .as_ref()
        .expect("columns")
        .iter()
        .map(|c| c.name.clone())
        .collect();
    assert_eq!(columns, vec!["Host", "Project", "Client ID", "Ready", "Age"]);
}

/// Story: the schema requires host and access and uses camelCase field names
#[test]
fn story_spec_schema_fields() {
    let schema = spec_schema();
    let spec = &schema["properties"]["spec"];

    let required: Vec<&str> = spec["required"]
        .as_array()
        .expect("required list")
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert!(required.contains(&"host"));
    assert!(required.contains(&"access"));

    let properties = spec["properties"].as_object().expect("properties");
    for field in ["host", "access", "oidc", "tunnel", "deleteProtection"] {
        assert!(properties.contains_key(field), "missing spec.{field}");
    }

    let status = schema["properties"]["status"]["properties"]
        .as_object()
        .expect("status properties");
    for field in [
        "projectId",
        "zitadelAppId",
        "clientId",
        "accessApplicationId",
        "accessPolicyId",
        "retiredApp",
        "ready",
        "conditions",
    ] {
        assert!(status.contains_key(field), "missing status.{field}");
    }
}

#[test]
fn test_crd_renders_as_yaml() {
    let yaml = serde_yaml::to_string(&SecuredApplication::crd()).expect("yaml");
    assert!(yaml.contains("kind: CustomResourceDefinition"));
    assert!(yaml.contains("securedapplications"));
}
