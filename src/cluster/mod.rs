//! Cluster configuration managed on behalf of a profile

pub mod patcher;
