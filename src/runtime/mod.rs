//! Cluster runtime: subprocess plumbing, platform primitives and profile state

pub mod adapter;
pub mod command;
pub mod platform;
pub mod state;
