#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod install;
pub mod naming;
pub mod wrap;

pub use self::{
    install::{aggregate, Convergence, InstallerOutcome},
    wrap::{ModuleWrapper, TemplateError},
};

/// The finalizer that blocks deletion of a policy until its module store has
/// been removed.
pub const FINALIZER: &str = "selinuxpolicy.finalizers.selinuxpolicy.openshift.io";
