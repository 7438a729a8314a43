//! Group assignment history CLI library.
//!
//! This crate provides the CLI interface for syncing GLPI ticket logs and
//! reporting per-group assignment time.

mod cli;
pub mod commands;
mod config;

pub use cli::{Cli, Commands};
pub use config::Config;
