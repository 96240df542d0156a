//! Config command implementation

use std::path::Path;

use anyhow::Result;
use recur_core::config::default_config_path;

use super::load_detector_config;

pub fn cmd_config(path: Option<&Path>) -> Result<()> {
    let config = load_detector_config(path)?;

    match path {
        Some(path) => println!("# Loaded from {}", path.display()),
        None => match default_config_path() {
            Some(default) if default.exists() => {
                println!("# Loaded from {}", default.display())
            }
            Some(default) => {
                println!("# Built-in defaults (override: {})", default.display())
            }
            None => println!("# Built-in defaults"),
        },
    }
    println!("{}", config.to_toml()?);

    Ok(())
}
