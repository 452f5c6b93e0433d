//! CLI command implementations.

pub mod collectstatic;
pub mod migrate;
