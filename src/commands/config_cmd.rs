use clap::{Args, Subcommand};
use std::fmt::Display;

use super::OutputFormat;
use trafego::config::{Config, ConfigValue};

#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show current configuration values
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

fn print_value<T>(name: &str, value: &ConfigValue<T>, shown: impl Display) {
    println!("{}: {}  ({})", name, shown, value.source);
}

impl ConfigCommand {
    pub fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        let ConfigSubcommand::Show { format } = &self.command;
        if let OutputFormat::Json = format {
            println!("{}", serde_json::to_string_pretty(config)?);
            return Ok(());
        }

        match &config.config_file {
            Some(path) => println!("Config file: {}\n", path.display()),
            None => println!(
                "Config file: {} (not found)\n",
                Config::default_config_path().display()
            ),
        }

        print_value(
            "database_path",
            &config.database_path,
            config.database_path.value.display(),
        );
        print_value("local_user", &config.local_user, &config.local_user.value);

        match (&config.backend.server_url, config.backend.is_configured()) {
            (Some(url), true) => println!("backend: {}", url),
            (Some(url), false) => println!("backend: {} (no api_key, using local database)", url),
            (None, _) => println!("backend: local database"),
        }

        println!("sync:");
        println!("  subscribe_delay_ms: {}", config.sync.subscribe_delay_ms);
        println!("  status_reset_ms: {}", config.sync.status_reset_ms);
        println!("  autosave_debounce_ms: {}", config.sync.autosave_debounce_ms);
        Ok(())
    }
}
