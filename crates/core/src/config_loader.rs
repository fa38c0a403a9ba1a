use crate::config::AppConfig;
use anyhow::Result;
use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "config/Config.toml";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads configuration by merging defaults, TOML, `VW_` environment variables, and JSON.
    ///
    /// Nested keys use a double underscore, e.g. `VW_COLLECTOR__POLL_INTERVAL_SECS`.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration files cannot be read or parsed.
    pub fn load() -> Result<AppConfig> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Loads configuration from a specific TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration files cannot be read or parsed.
    pub fn load_from(path: &str) -> Result<AppConfig> {
        tracing::debug!(path, "Loading configuration");
        let figment = Self::base().merge(Toml::file(path));
        Self::finish(figment, path)
    }

    /// Loads configuration from `path` with a profile file layered on top.
    ///
    /// The profile file sits next to `path`: `config/Config.toml` with
    /// profile `dev` reads `config/Config.dev.toml`.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration files cannot be read or parsed.
    pub fn load_with_profile(path: &str, profile: &str) -> Result<AppConfig> {
        let profile_path = profile_path(Path::new(path), profile);
        tracing::debug!(path, profile, profile_path = %profile_path.display(), "Loading configuration");
        let figment = Self::base()
            .merge(Toml::file(path))
            .merge(Toml::file(profile_path));
        Self::finish(figment, path)
    }

    fn base() -> Figment {
        Figment::from(Serialized::defaults(AppConfig::default()))
    }

    fn finish(figment: Figment, path: &str) -> Result<AppConfig> {
        let config: AppConfig = figment
            .merge(Env::prefixed("VW_").split("__"))
            .join(Json::file(Path::new(path).with_extension("json")))
            .extract()
            .inspect_err(|e| tracing::error!(path, error = %e, "Invalid configuration"))?;

        Ok(config)
    }
}

/// `dir/name.ext` becomes `dir/name.{profile}.ext`.
fn profile_path(base: &Path, profile: &str) -> PathBuf {
    let stem = base
        .file_stem()
        .map_or_else(|| "Config".into(), |s| s.to_string_lossy());
    let file_name = match base.extension() {
        Some(ext) => format!("{stem}.{profile}.{}", ext.to_string_lossy()),
        None => format!("{stem}.{profile}"),
    };
    base.with_file_name(file_name)
}
