use std::error::Error;
use std::path::Path;

use crate::cli::ConfigCommands;
use crate::core::config::data::path_display;
use crate::core::config::{Config, ServerConfig};

pub fn run_config(config_path: &Path, command: ConfigCommands) -> Result<(), Box<dyn Error>> {
    match command {
        ConfigCommands::Show => {
            let config = Config::load_from_path(config_path)?;
            println!("Config file: {}", path_display(config_path));
            config.print_all();
        }
        ConfigCommands::Path => println!("{}", config_path.display()),
        ConfigCommands::Init { force } => match init_config(config_path, force) {
            Ok(()) => println!("✅ Wrote starter config to {}", path_display(config_path)),
            Err(err) => {
                eprintln!("❌ {err}");
                std::process::exit(1);
            }
        },
    }
    Ok(())
}

/// A config that launches the bundled `toolbridge-server`.
pub fn starter_config() -> Config {
    Config {
        default_server: Some("demo".to_string()),
        servers: vec![ServerConfig {
            id: "demo".to_string(),
            command: "toolbridge-server".to_string(),
            args: Vec::new(),
            cwd: None,
            enabled: Some(true),
            env: None,
        }],
        ..Config::default()
    }
}

pub fn init_config(config_path: &Path, force: bool) -> Result<(), Box<dyn Error>> {
    if config_path.exists() && !force {
        return Err(format!(
            "{} already exists; pass --force to replace it",
            path_display(config_path)
        )
        .into());
    }
    starter_config().save_to_path(config_path)?;
    Ok(())
}
