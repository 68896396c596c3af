//! CLI command implementations.

pub mod build;
pub mod check;
pub mod common;
pub mod live;
pub mod render;
