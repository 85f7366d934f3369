//! Transcoder availability and configuration commands.

use tokio::runtime::Runtime;

use super::print_tool_install_instructions;
use crate::config::{self, Config};
use crate::tool::{ToolRunner, Transcoder};

/// Check that the configured transcoder can be invoked
pub fn cmd_check_tools(rt: &Runtime, config: &Config) -> anyhow::Result<()> {
    println!("Checking transcoder...\n");

    let transcoder = Transcoder::new(&config.tool.path);
    rt.block_on(async {
        if transcoder.is_available().await {
            let version = transcoder
                .version()
                .await
                .unwrap_or_else(|| "unknown version".to_string());
            println!("✓ {}: {}", config.tool.path.display(), version);
        } else {
            println!("✗ {}: NOT FOUND", config.tool.path.display());
            print_tool_install_instructions(&config.tool.path);
        }
    });

    println!();
    println!("Archive: {}", config.archive.root.display());
    Ok(())
}

/// Print the effective configuration
pub fn cmd_config(config: &Config, init: bool) -> anyhow::Result<()> {
    match config::config_path() {
        Some(path) if path.exists() => println!("Config file: {}", path.display()),
        Some(path) if init => {
            config::save(config)?;
            println!("Wrote default config to {}", path.display());
        }
        Some(path) => println!("Config file: {} (not created, using defaults)", path.display()),
        None => println!("Config file: unavailable on this platform"),
    }

    println!();
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}
