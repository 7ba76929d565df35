use crate::config::WorkerConfig;
use anyhow::Result;
use clap::{Args, Subcommand};

#[derive(Debug, Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigSubcommand {
    /// Print the resolved configuration
    Show {
        /// Output format (toml or json)
        #[arg(short, long, default_value = "toml")]
        format: String,
    },

    /// Check that the configuration loads
    #[command(alias = "check")]
    Validate,
}

impl ConfigCommand {
    pub fn execute(&self, config: &WorkerConfig) -> Result<()> {
        match &self.command {
            ConfigSubcommand::Show { format } => {
                let rendered = match format.as_str() {
                    "json" => serde_json::to_string_pretty(config)?,
                    "toml" => config.to_toml()?,
                    other => anyhow::bail!("Unknown format {other}, expected toml or json"),
                };
                println!("{rendered}");
            }
            ConfigSubcommand::Validate => {
                config.receiver.validate()?;
                println!("Configuration OK");
            }
        }
        Ok(())
    }
}
