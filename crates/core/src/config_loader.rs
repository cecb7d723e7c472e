use crate::config::AppConfig;
use anyhow::Result;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use tracing::info;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads configuration by merging the TOML file (if present) with
    /// `MACRO_TRADE_`-prefixed environment variables. Missing keys fall
    /// back to the built-in defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a present file cannot be parsed or a value
    /// has the wrong type.
    pub fn load(path: Option<&str>) -> Result<AppConfig> {
        let file = path.unwrap_or("config/Config.toml");
        let config: AppConfig = Figment::new()
            .merge(Toml::file(file))
            .merge(Env::prefixed("MACRO_TRADE_").split("__"))
            .extract()?;

        info!(%file, symbol = %config.symbol, "configuration loaded");
        Ok(config)
    }
}
