use anyhow::Result;
use clap::{Args, ValueEnum};

use crate::config::ParForConfig;

#[derive(Args)]
pub struct ConfigArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value_t = ConfigFormat::Toml)]
    pub format: ConfigFormat,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum ConfigFormat {
    Toml,
    Json,
}

pub fn execute(args: ConfigArgs, config: &ParForConfig) -> Result<()> {
    let rendered = match args.format {
        ConfigFormat::Toml => config.to_toml()?,
        ConfigFormat::Json => config.to_json()?,
    };
    println!("{}", rendered.trim_end());
    Ok(())
}
