use std::path::Path;

use clap::{Args, ValueEnum};
use express_api::{
    DEFAULT_REQUEST_TIMEOUT_SECS, ExpressApiConfig, ExpressApiCredentials, ExpressEnvironment,
};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Production,
    Staging,
}

impl From<Environment> for ExpressEnvironment {
    fn from(environment: Environment) -> Self {
        match environment {
            Environment::Production => ExpressEnvironment::Production,
            Environment::Staging => ExpressEnvironment::Staging,
        }
    }
}

#[derive(Clone, Args, Debug, Serialize, Deserialize)]
pub struct Settings {
    /// Express backend environment
    #[arg(long, value_enum, default_value = "staging")]
    pub environment: Environment,

    /// Overrides the backend URL of the environment
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[arg(long, default_value = "")]
    pub api_key: String,

    #[arg(long, default_value = "")]
    pub user_id: String,

    #[arg(long, default_value = "")]
    pub session_id: String,

    #[arg(long, default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS)]
    pub timeout_secs: u64,

    /// Loglevel to use. Can be used to filter logs through the env filter
    /// format.
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Settings {
    pub fn api_config(&self) -> ExpressApiConfig {
        let mut config = ExpressApiConfig::default_config(
            &self.environment.into(),
            ExpressApiCredentials {
                api_key: self.api_key.clone(),
                user_id: self.user_id.clone(),
                session_id: self.session_id.clone(),
            },
        );
        if let Some(base_url) = &self.base_url {
            config.base_url.clone_from(base_url);
        }
        config.timeout_secs = self.timeout_secs;
        config
    }
}

/// Layers the settings: command line defaults, then the TOML file when it
/// exists, then `EXPRESS_` prefixed environment variables.
pub fn load(defaults: Settings, config_file: &Path) -> Result<Settings, figment::Error> {
    let config_file = std::fs::canonicalize(config_file).ok();
    let mut figment = Figment::new().merge(Serialized::defaults(defaults));
    if let Some(config_file) = &config_file {
        figment = figment.merge(Toml::file(config_file));
    }
    figment.merge(Env::prefixed("EXPRESS_")).extract()
}
