#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use selinux_policy_controller_core as core;
pub use selinux_policy_controller_k8s_api as k8s;
pub use selinux_policy_controller_k8s_reconcile as reconcile;

mod admission;
mod args;
mod controller;
mod validation;

pub use self::{
    admission::Admission,
    args::Args,
    validation::{PolicyLookup, Verdict},
};
