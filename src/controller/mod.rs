//! Controller for SecuredApplication resources
//!
//! Reconciliation follows the observe-diff-act loop: read remote state, compare
//! it with the desired state, and only write what differs.

mod lifecycle;
mod reason;
mod secured_application;

pub use lifecycle::{Lifecycle, Step};
pub use reason::{Reason, POLICY_RETRY, TRANSIENT_RETRY};
pub use secured_application::{
    error_policy, reconcile, Context, ContextBuilder, DescriptorStore, KubeDescriptorStore,
};
