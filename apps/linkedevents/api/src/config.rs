use axum_helpers::JwtConfig;
use chrono_tz::Tz;
use core_config::{
    app_info, env_flag, env_list, env_optional, env_or_default, server::ServerConfig, AppInfo,
    ConfigError, FromEnv,
};
use database::postgres::PostgresConfig;
use domain_linked_events::{LanguageSet, ServiceSettings};

pub use core_config::Environment;

const DEFAULT_LANGUAGES: &str = "fi,sv,en";
const DEFAULT_TIME_ZONE: &str = "Europe/Helsinki";
const DEFAULT_INDEX_PREFIX: &str = "linkedevents";

/// Settings that shape the rendered API documents.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub languages: LanguageSet,
    pub time_zone: Tz,
    /// Absolute URL the API is served under, including the version segment.
    pub base_url: String,
    pub camelcase: bool,
}

impl ApiConfig {
    pub fn service_settings(&self) -> ServiceSettings {
        ServiceSettings {
            languages: self.languages.clone(),
            time_zone: self.time_zone,
            base_url: self.base_url.clone(),
            camelcase: self.camelcase,
        }
    }
}

impl FromEnv for ApiConfig {
    /// `LANGUAGES`, `TIME_ZONE`, `API_BASE_URL` and `API_CAMELCASE`.
    fn from_env() -> Result<Self, ConfigError> {
        let languages = LanguageSet::new(env_list("LANGUAGES", DEFAULT_LANGUAGES))
            .map_err(|e| ConfigError::parse("LANGUAGES", e))?;
        let time_zone = env_or_default("TIME_ZONE", DEFAULT_TIME_ZONE)
            .parse::<Tz>()
            .map_err(|e| ConfigError::parse("TIME_ZONE", e))?;

        let base_url = match env_optional("API_BASE_URL") {
            Some(url) => url,
            None => format!("http://localhost:{}/v1", env_or_default("PORT", "8080")),
        };

        Ok(Self {
            languages,
            time_zone,
            base_url: base_url.trim_end_matches('/').to_string(),
            camelcase: env_flag("API_CAMELCASE", false)?,
        })
    }
}

/// Search backend selection. Without a URL the in-memory index is used.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchConfig {
    pub elasticsearch_url: Option<String>,
    pub index_prefix: String,
}

impl FromEnv for SearchConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            elasticsearch_url: env_optional("ELASTICSEARCH_URL")
                .map(|url| url.trim_end_matches('/').to_string()),
            index_prefix: env_or_default("ELASTICSEARCH_INDEX_PREFIX", DEFAULT_INDEX_PREFIX),
        })
    }
}

/// Application configuration, composed from the shared config components
#[derive(Clone, Debug)]
pub struct Config {
    pub app: AppInfo,
    pub environment: Environment,
    pub server: ServerConfig,
    pub database: PostgresConfig,
    pub jwt: JwtConfig,
    pub api: ApiConfig,
    pub search: SearchConfig,
}

impl Config {
    pub fn from_env() -> eyre::Result<Self> {
        Ok(Self {
            app: app_info!(),
            environment: Environment::from_env(),
            server: ServerConfig::from_env()?,
            database: PostgresConfig::from_env()?,
            jwt: JwtConfig::from_env()?,
            api: ApiConfig::from_env()?,
            search: SearchConfig::from_env()?,
        })
    }
}
