//! CLI command implementations
//!
//! Each subcommand has its own module with a `run` function.

pub mod init_db;
pub mod load;
pub mod status;
pub mod write;
