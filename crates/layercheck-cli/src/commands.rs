//! Subcommand implementations.

pub mod check;
pub mod edge_kinds;
pub mod init;
pub mod output;
