//! Stitch - a static site generator for Markdown trees.

mod build;
mod cli;
mod compiler;
mod config;
mod error;
mod logger;
mod reload;
mod serve;

use anyhow::Result;
use build::build_site;
use clap::{Parser, error::ErrorKind};
use cli::{Cli, USAGE};
use config::SiteConfig;
use serve::serve_site;

fn main() -> Result<()> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            err.print()?;
            return Ok(());
        }
        Err(_) => {
            println!("{USAGE}");
            return Ok(());
        }
    };
    let config = load_config(&cli)?;
    if config.config_path.is_file() {
        log!("config"; "using {}", config.config_path.display());
    }

    if cli.is_dev() {
        log!("serve"; "running development server");
        serve_site(&config)
    } else {
        build_site(&config)?;
        log!("build"; "build completed");
        Ok(())
    }
}

/// Load and validate configuration from CLI arguments
fn load_config(cli: &Cli) -> Result<SiteConfig> {
    let root = cli.root.clone().unwrap_or_else(|| "./".into());
    let config_path = root.join(&cli.config);

    let mut config = if config_path.exists() {
        SiteConfig::from_path(&config_path)?
    } else {
        SiteConfig::default()
    };
    config.config_path = config_path;
    config.update_with_cli(cli);
    config.validate()?;

    Ok(config)
}
