//! CLI command implementations.

pub mod init;
pub mod migrate;
pub mod parse;
pub mod validate;
