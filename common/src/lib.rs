//! Shared ambient concerns for the workspace crates.

pub mod logger;
