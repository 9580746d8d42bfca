//! Command implementations for the logmon CLI

#[cfg(unix)]
pub mod monitor;
pub mod serve;
