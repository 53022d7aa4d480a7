//! Profile user accounts

pub mod manager;
pub mod store;
