//! Cluster services: node bootstrap, CNI installation and orchestration

pub mod cluster;
pub mod cni;
pub mod k3s;
