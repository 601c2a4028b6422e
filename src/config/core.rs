use anyhow::{Context, Result, bail};
use figment::{
    Figment,
    providers::{Env, Format, Json, Toml, Yaml},
};
use std::path::Path;
use std::sync::OnceLock;

use super::ParForConfig;

// Embed the default config at compile time
const DEFAULT_CONFIG: &str = include_str!("../../default-config.toml");

/// Configuration used by the shared pool and by `ParFor::new`
static GLOBAL: OnceLock<ParForConfig> = OnceLock::new();

impl ParForConfig {
    /// Load from the standard locations
    pub fn load() -> Result<Self> {
        Self::load_with_custom_config(None)
    }

    /// Load from `custom_config` only (plus defaults and environment), or from
    /// the standard locations when `None`
    pub fn load_with_custom_config(custom_config: Option<&Path>) -> Result<Self> {
        let config: ParForConfig = Self::figment(custom_config)?
            .extract()
            .context("Failed to parse parfor configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// The layered provider stack, lowest priority first
    pub fn figment(custom_config: Option<&Path>) -> Result<Figment> {
        let mut figment = Figment::new().merge(Toml::string(DEFAULT_CONFIG)); // Embedded defaults

        if let Some(custom_path) = custom_config {
            if !custom_path.exists() {
                bail!("Config file not found: {}", custom_path.display());
            }
            figment = match custom_path.extension().and_then(|ext| ext.to_str()) {
                Some("json") => figment.merge(Json::file(custom_path)),
                Some("yaml") | Some("yml") => figment.merge(Yaml::file(custom_path)),
                _ => figment.merge(Toml::file(custom_path)),
            };
        } else {
            // Standard priority: user config -> working directory config
            figment = figment
                .merge(Toml::file(Self::user_config_path()))
                .merge(Toml::file("parfor.toml"))
                .merge(Json::file("parfor.json"))
                .merge(Yaml::file("parfor.yaml"))
                .merge(Yaml::file("parfor.yml"));
        }

        // Environment variables always have highest priority
        Ok(figment.merge(Env::prefixed("PARFOR_").split("__")))
    }

    /// Reject values the engine cannot honor
    pub fn validate(&self) -> Result<()> {
        if !(1..=100).contains(&self.pool.thread_percentage) {
            bail!(
                "pool.thread_percentage must be between 1 and 100, got {}",
                self.pool.thread_percentage
            );
        }
        if self.run.check_interval == 0 {
            bail!("run.check_interval must be at least 1");
        }
        if !(self.run.oversubscription.is_finite() && self.run.oversubscription > 0.0) {
            bail!(
                "run.oversubscription must be a positive number, got {}",
                self.run.oversubscription
            );
        }
        if self.progress.fast_update_ms >= self.progress.slow_update_ms {
            bail!(
                "progress.fast_update_ms ({}) must be below progress.slow_update_ms ({})",
                self.progress.fast_update_ms,
                self.progress.slow_update_ms
            );
        }
        Ok(())
    }

    /// Process-wide configuration, loaded from the standard locations on
    /// first use unless [`install_global`](Self::install_global) ran first
    pub fn global() -> &'static ParForConfig {
        GLOBAL.get_or_init(|| {
            Self::load().unwrap_or_else(|err| {
                tracing::warn!("Falling back to default parfor configuration: {err:#}");
                ParForConfig::default()
            })
        })
    }

    /// Make `config` the process-wide configuration; fails once it is in use
    pub fn install_global(config: ParForConfig) -> Result<()> {
        GLOBAL
            .set(config)
            .map_err(|_| anyhow::anyhow!("parfor configuration is already in use"))
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration as TOML")
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize configuration as JSON")
    }

    fn user_config_path() -> String {
        match std::env::var("HOME") {
            Ok(home) => format!("{home}/.config/parfor/config.toml"),
            Err(_) => "~/.config/parfor/config.toml".to_string(),
        }
    }
}
