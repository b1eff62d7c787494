//! Config command implementation.

use anyhow::{Context, Result};

use bigdrop_core::config::Config;

use super::{ConfigAction, ConfigArgs};

/// Run the config command.
pub fn run(args: ConfigArgs) -> Result<()> {
    match args.action {
        ConfigAction::Show => {
            let config = super::load_config();
            let rendered = toml::to_string_pretty(&config).context("serialize config")?;
            print!("{rendered}");
        }
        ConfigAction::Path => {
            println!("{}", Config::config_path().display());
        }
        ConfigAction::Init => {
            let path = Config::config_path();
            if path.exists() {
                println!("Config already exists at {}", path.display());
                return Ok(());
            }
            Config::default().save().context("write default config")?;
            println!("Wrote default config to {}", path.display());
        }
    }
    Ok(())
}
