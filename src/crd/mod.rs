//! Custom Resource Definitions for the access operator
//!
//! This module contains the `SecuredApplication` CRD and the types it is built from.

mod secured_application;
mod types;

pub use secured_application::{
    SecuredApplication, SecuredApplicationSpec, SecuredApplicationStatus, READY_CONDITION,
};
pub use types::{
    Access, Backend, Condition, ConditionStatus, IngressConfig, OidcConfig, RetiredApp,
    TunnelConfig,
};
