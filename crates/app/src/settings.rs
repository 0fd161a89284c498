//! Handles settings for the worker.
//!
//! Sources, lowest priority first:
//!
//! 1. the optional `config/settings.toml` file (or the `--config` path);
//! 2. `EXPENSE_WORKER_*` environment variables, with `__` between section and
//!    key (`EXPENSE_WORKER_DATABASE__KIND=sqlite`);
//! 3. the deployment variables `POSTGRES_DB`, `POSTGRES_USER`,
//!    `POSTGRES_PASSWORD`, `POSTGRES_HOST`, `POSTGRES_PORT` and
//!    `OPENAI_API_KEY`.
//!
//! See `config/settings.toml.example`.
use std::time::Duration;

use config::{Config, ConfigBuilder, ConfigError, Environment, File, builder::DefaultState};
use engine::ConsumerConfig;
use serde::Deserialize;
use url::Url;

pub const DEFAULT_CONFIG_PATH: &str = "config/settings";

const ENV_OVERRIDES: [(&str, &str); 6] = [
    ("database.name", "POSTGRES_DB"),
    ("database.user", "POSTGRES_USER"),
    ("database.password", "POSTGRES_PASSWORD"),
    ("database.host", "POSTGRES_HOST"),
    ("database.port", "POSTGRES_PORT"),
    ("extractor.api_key", "OPENAI_API_KEY"),
];

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("missing required settings: {}", .0.join(", "))]
    Missing(Vec<&'static str>),
    #[error("invalid database {0}")]
    InvalidDatabase(&'static str),
}

#[derive(Debug, Deserialize)]
pub struct App {
    pub level: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum DatabaseKind {
    Postgres,
    Sqlite,
    Memory,
}

#[derive(Debug, Deserialize)]
struct RawDatabase {
    kind: DatabaseKind,
    name: Option<String>,
    user: Option<String>,
    password: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    path: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawExtractor {
    endpoint: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    timeout_secs: u64,
}

impl Default for RawExtractor {
    fn default() -> Self {
        Self {
            endpoint: extractor::DEFAULT_ENDPOINT.to_string(),
            api_key: None,
            model: extractor::DEFAULT_MODEL.to_string(),
            temperature: extractor::DEFAULT_TEMPERATURE,
            timeout_secs: extractor::DEFAULT_TIMEOUT.as_secs(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawConsumer {
    poll_interval_ms: u64,
    /// `0` retries failed extractions forever.
    max_attempts: u32,
    extraction_timeout_secs: u64,
}

impl Default for RawConsumer {
    fn default() -> Self {
        let defaults = ConsumerConfig::default();
        Self {
            poll_interval_ms: defaults.poll_interval.as_millis() as u64,
            max_attempts: defaults.max_attempts.unwrap_or(0),
            extraction_timeout_secs: defaults.extraction_timeout.as_secs(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawSettings {
    app: App,
    database: RawDatabase,
    #[serde(default)]
    extractor: RawExtractor,
    #[serde(default)]
    consumer: RawConsumer,
}

#[derive(Debug)]
pub struct ExtractorSettings {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub timeout: Duration,
}

/// Validated settings.
#[derive(Debug)]
pub struct Settings {
    pub app: App,
    pub database_url: String,
    pub extractor: ExtractorSettings,
    pub consumer: ConsumerConfig,
}

impl Settings {
    pub fn new(path: Option<&str>) -> Result<Self, SettingsError> {
        let mut builder = defaults()?
            .add_source(File::with_name(path.unwrap_or(DEFAULT_CONFIG_PATH)).required(false))
            .add_source(
                Environment::with_prefix("EXPENSE_WORKER")
                    .prefix_separator("_")
                    .separator("__"),
            );
        for (key, var) in ENV_OVERRIDES {
            builder = builder.set_override_option(key, std::env::var(var).ok())?;
        }

        Self::from_config(builder.build()?)
    }

    fn from_config(config: Config) -> Result<Self, SettingsError> {
        let raw: RawSettings = config.try_deserialize()?;
        let mut missing = Vec::new();

        let db = raw.database;
        let database_url = match db.kind {
            DatabaseKind::Postgres => {
                let name = require(db.name, "POSTGRES_DB", &mut missing);
                let user = require(db.user, "POSTGRES_USER", &mut missing);
                let password = require(db.password, "POSTGRES_PASSWORD", &mut missing);
                let host = require(db.host, "POSTGRES_HOST", &mut missing);
                let port = require(db.port, "POSTGRES_PORT", &mut missing);
                match (name, user, password, host, port) {
                    (Some(name), Some(user), Some(password), Some(host), Some(port)) => {
                        Some(postgres_url(&name, &user, &password, &host, port)?)
                    }
                    _ => None,
                }
            }
            DatabaseKind::Sqlite => require(db.path, "database.path", &mut missing)
                .map(|path| format!("sqlite:{path}?mode=rwc")),
            DatabaseKind::Memory => Some("sqlite::memory:".to_string()),
        };

        let api_key = raw.extractor.api_key.filter(|key| !key.is_empty());
        if api_key.is_none() {
            missing.push("OPENAI_API_KEY");
        }

        if !missing.is_empty() {
            return Err(SettingsError::Missing(missing));
        }
        let (Some(database_url), Some(api_key)) = (database_url, api_key) else {
            return Err(SettingsError::Missing(missing));
        };

        Ok(Self {
            app: raw.app,
            database_url,
            extractor: ExtractorSettings {
                endpoint: raw.extractor.endpoint,
                api_key,
                model: raw.extractor.model,
                temperature: raw.extractor.temperature,
                timeout: Duration::from_secs(raw.extractor.timeout_secs),
            },
            consumer: ConsumerConfig {
                poll_interval: Duration::from_millis(raw.consumer.poll_interval_ms),
                max_attempts: Some(raw.consumer.max_attempts).filter(|max| *max > 0),
                extraction_timeout: Duration::from_secs(raw.consumer.extraction_timeout_secs),
            },
        })
    }
}

fn require<T>(value: Option<T>, name: &'static str, missing: &mut Vec<&'static str>) -> Option<T> {
    if value.is_none() {
        missing.push(name);
    }
    value
}

/// Connection URL with every component percent-encoded, so credentials may
/// contain `@`, `/`, `:` or `#`.
fn postgres_url(
    name: &str,
    user: &str,
    password: &str,
    host: &str,
    port: u16,
) -> Result<String, SettingsError> {
    let mut url =
        Url::parse("postgres://localhost").map_err(|_| SettingsError::InvalidDatabase("url"))?;
    url.set_host(Some(host))
        .map_err(|_| SettingsError::InvalidDatabase("host"))?;
    url.set_port(Some(port))
        .map_err(|()| SettingsError::InvalidDatabase("port"))?;
    url.set_username(user)
        .map_err(|()| SettingsError::InvalidDatabase("user"))?;
    url.set_password(Some(password))
        .map_err(|()| SettingsError::InvalidDatabase("password"))?;
    url.set_path(name);
    Ok(url.into())
}

fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("app.level", "info")?
        .set_default("database.kind", "postgres")
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn settings(toml: &str) -> Result<Settings, SettingsError> {
        let config = defaults()
            .unwrap()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .unwrap();
        Settings::from_config(config)
    }

    #[test]
    fn postgres_from_deployment_variables() {
        let config = defaults()
            .unwrap()
            .set_override("database.name", "expenses")
            .unwrap()
            .set_override("database.user", "bot")
            .unwrap()
            .set_override("database.password", "secret")
            .unwrap()
            .set_override("database.host", "db")
            .unwrap()
            .set_override("database.port", "5432")
            .unwrap()
            .set_override("extractor.api_key", "sk-test")
            .unwrap()
            .build()
            .unwrap();

        let settings = Settings::from_config(config).unwrap();

        assert_eq!(
            settings.database_url,
            "postgres://bot:secret@db:5432/expenses"
        );
        assert_eq!(settings.app.level, "info");
        assert_eq!(settings.extractor.api_key, "sk-test");
        assert_eq!(settings.extractor.model, extractor::DEFAULT_MODEL);
        assert_eq!(settings.consumer, ConsumerConfig::default());
    }

    #[test]
    fn postgres_credentials_are_percent_encoded() {
        let config = defaults()
            .unwrap()
            .set_override("database.name", "expenses")
            .unwrap()
            .set_override("database.user", "bot")
            .unwrap()
            .set_override("database.password", "p@ss/w#rd")
            .unwrap()
            .set_override("database.host", "db")
            .unwrap()
            .set_override("database.port", "5432")
            .unwrap()
            .set_override("extractor.api_key", "sk-test")
            .unwrap()
            .build()
            .unwrap();

        let settings = Settings::from_config(config).unwrap();

        assert_eq!(
            settings.database_url,
            "postgres://bot:p%40ss%2Fw%23rd@db:5432/expenses"
        );
        let url = Url::parse(&settings.database_url).unwrap();
        assert_eq!(url.host_str(), Some("db"));
        assert_eq!(url.port(), Some(5432));
        assert_eq!(url.username(), "bot");
        assert_eq!(url.path(), "/expenses");
    }

    #[test]
    fn missing_postgres_parameters_are_reported_together() {
        let err = settings(
            r#"
            [database]
            host = "db"
            port = 5432

            [extractor]
            api_key = "sk-test"
            "#,
        )
        .unwrap_err();

        match err {
            SettingsError::Missing(missing) => assert_eq!(
                missing,
                vec!["POSTGRES_DB", "POSTGRES_USER", "POSTGRES_PASSWORD"]
            ),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn api_key_is_required() {
        let err = settings(
            r#"
            [database]
            kind = "memory"
            "#,
        )
        .unwrap_err();

        assert_eq!(err.to_string(), "missing required settings: OPENAI_API_KEY");
    }

    #[test]
    fn sqlite_with_custom_consumer() {
        let settings = settings(
            r#"
            [app]
            level = "debug"

            [database]
            kind = "sqlite"
            path = "./expenses.db"

            [extractor]
            api_key = "sk-test"
            endpoint = "http://localhost:8080/v1"
            timeout_secs = 5

            [consumer]
            poll_interval_ms = 250
            max_attempts = 0
            extraction_timeout_secs = 10
            "#,
        )
        .unwrap();

        assert_eq!(settings.app.level, "debug");
        assert_eq!(settings.database_url, "sqlite:./expenses.db?mode=rwc");
        assert_eq!(settings.extractor.endpoint, "http://localhost:8080/v1");
        assert_eq!(settings.extractor.timeout, Duration::from_secs(5));
        assert_eq!(
            settings.consumer,
            ConsumerConfig {
                poll_interval: Duration::from_millis(250),
                max_attempts: None,
                extraction_timeout: Duration::from_secs(10),
            }
        );
    }
}
