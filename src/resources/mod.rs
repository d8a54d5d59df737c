//! Kubernetes resource generation for MariaDB clusters

pub mod common;
pub mod configmap;
pub mod pdb;
pub mod secret;
pub mod service;
pub mod statefulset;
