//! Profile lifecycle orchestration

pub mod controller;
