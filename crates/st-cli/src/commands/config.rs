//! Config command implementations

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::output::{print_error, print_info, print_success, print_warning};
use st_core::config::{self, SubtermConfig};

fn resolve(config_path: Option<&PathBuf>) -> PathBuf {
    config_path
        .cloned()
        .unwrap_or_else(config::default_config_path)
}

/// Load the configuration, falling back to defaults when the file is missing
pub fn load(config_path: Option<&PathBuf>) -> Result<SubtermConfig> {
    let path = resolve(config_path);
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        return Ok(SubtermConfig::default());
    }
    config::load_config(&path).with_context(|| format!("Failed to load config file: {:?}", path))
}

/// Show current configuration
pub fn config_show(config_path: Option<&PathBuf>) -> Result<()> {
    let path = resolve(config_path);

    if !path.exists() {
        print_warning(&format!("No configuration file found at {:?}", path));
        print_info("Run 'subterm config init' to create one");
        print_info("Defaults in effect:");
        println!();
        println!("{}", toml::to_string_pretty(&SubtermConfig::default())?);
        return Ok(());
    }

    print_info(&format!("Configuration file: {:?}", path));
    println!();

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;
    println!("{}", content);

    Ok(())
}

/// Write the default configuration
pub fn config_init(config_path: Option<&PathBuf>, force: bool) -> Result<()> {
    let config_file = resolve(config_path);

    if config_file.exists() && !force {
        print_error(&format!("Config file already exists: {:?}", config_file));
        print_info("Use --force to overwrite");
        return Ok(());
    }

    write_default(&config_file)?;
    print_success(&format!("Created configuration file: {:?}", config_file));
    Ok(())
}

/// Print where the configuration file lives
pub fn config_path(config_path: Option<&PathBuf>) -> Result<()> {
    println!("{}", resolve(config_path).display());
    Ok(())
}

fn write_default(path: &Path) -> Result<()> {
    config::save_config(path, &SubtermConfig::default())
        .with_context(|| format!("Failed to write config file: {:?}", path))
}
