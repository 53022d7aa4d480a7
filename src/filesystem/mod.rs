//! Host filesystem resources owned by profiles

pub mod volume;
