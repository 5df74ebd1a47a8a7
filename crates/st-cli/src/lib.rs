//! subterm: Command-line interface for remote terminal windows
//!
//! Provides the `subterm` CLI for opening a window driven from this
//! process and for managing the configuration file.

pub mod commands;
pub mod output;
