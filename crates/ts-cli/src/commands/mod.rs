//! CLI subcommand implementations.

pub mod report;
pub mod status;
pub mod sync;
pub mod ticket;
pub mod util;
