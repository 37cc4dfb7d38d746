#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod labels;
pub mod policy;

pub use self::policy::{PolicyState, SelinuxPolicy, SelinuxPolicySpec, SelinuxPolicyStatus};
pub use k8s_openapi::{
    api::{
        self,
        core::v1::{
            ConfigMap, Container, ContainerStatus, Namespace, Node, Pod, PodSecurityContext,
            PodSpec, PodStatus, SELinuxOptions, SecurityContext,
        },
    },
    apimachinery::{
        self,
        pkg::apis::meta::v1::{OwnerReference, Time},
    },
};
pub use kube::{
    api::{Api, DeleteParams, ListParams, ObjectMeta, PostParams, ResourceExt},
    Client, Error, Resource,
};
