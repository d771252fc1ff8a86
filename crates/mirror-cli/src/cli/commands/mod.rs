//! CLI command handlers, one file per command.

mod client;
mod run;
mod serve;
mod staging;

pub use client::{run_cancel, run_start, run_status};
pub use run::run_job;
pub use serve::run_serve;
pub use staging::run_staging;

#[cfg(test)]
pub(crate) use run::progress_line;
