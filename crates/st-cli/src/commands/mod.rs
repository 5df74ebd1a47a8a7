//! CLI command implementations

mod config;
mod open;

pub use config::{config_init, config_path, config_show, load};
pub use open::{open_command, OpenOptions};
