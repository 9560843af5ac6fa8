//! Finalizer lifecycle of a SecuredApplication
//!
//! Two flags decide what a pass does: whether deletion was requested and whether
//! our cleanup marker (finalizer) is still present. Everything else is derived.

use kube::ResourceExt;

use crate::crd::SecuredApplication;
use crate::FINALIZER;

/// What the reconciler should do with an object in a given lifecycle state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    /// Add the cleanup marker, then converge
    AddMarker,
    /// Converge external state
    Converge,
    /// Run teardown, then drop the marker
    Teardown {
        /// Delete the Zitadel and Cloudflare objects (false under delete protection)
        delete_external: bool,
    },
    /// Deletion is in progress and cleanup already ran; nothing to do
    Release,
}

/// Deletion-relevant state of an object
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Lifecycle {
    /// Deletion has been requested
    pub pending_deletion: bool,
    /// Our cleanup marker is present
    pub cleanup_marker: bool,
}

impl Lifecycle {
    /// Read the lifecycle flags from object metadata
    pub fn of(app: &SecuredApplication) -> Self {
        Self {
            pending_deletion: app.metadata.deletion_timestamp.is_some(),
            cleanup_marker: app.finalizers().iter().any(|f| f == FINALIZER),
        }
    }

    /// Decide the next step
    pub fn next_step(&self, delete_protection: bool) -> Step {
        match (self.pending_deletion, self.cleanup_marker) {
            (false, false) => Step::AddMarker,
            (false, true) => Step::Converge,
            (true, true) => Step::Teardown {
                delete_external: !delete_protection,
            },
            (true, false) => Step::Release,
        }
    }
}
