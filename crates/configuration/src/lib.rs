use crate::error::ConfigError;
use std::path::Path;

// Declare the modules that make up this crate.
pub mod error;
pub mod settings;
pub mod telemetry;

// Re-export the core types to provide a clean public API.
pub use settings::{DatabaseSettings, LoggingSettings, ServerSettings, Settings};
pub use telemetry::init_tracing;

/// Default configuration file, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

const ENV_PREFIX: &str = "TRADELEDGER";

/// Loads settings from `config.toml` (if present) and the environment.
pub fn load_config() -> Result<Settings, ConfigError> {
    load_config_from(Path::new(DEFAULT_CONFIG_FILE), false)
}

/// Loads settings in increasing precedence from built-in defaults, the TOML
/// file at `path`, `TRADELEDGER__SECTION__KEY` variables, and `DATABASE_URL`
/// (a `.env` file is honoured). The file may be absent unless `required`.
pub fn load_config_from(path: &Path, required: bool) -> Result<Settings, ConfigError> {
    dotenvy::dotenv().ok();

    let file = config::File::from(path)
        .format(config::FileFormat::Toml)
        .required(required);
    let mut settings = build(config::Config::builder().add_source(file))?;

    if let Ok(url) = std::env::var("DATABASE_URL") {
        settings.database.url = Some(url);
    }
    settings.validate()?;
    Ok(settings)
}

fn build(
    builder: config::ConfigBuilder<config::builder::DefaultState>,
) -> Result<Settings, ConfigError> {
    let settings = builder
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize::<Settings>()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{Config, File, FileFormat};

    fn from_toml(toml: &str) -> Result<Settings, ConfigError> {
        let settings = build(Config::builder().add_source(File::from_str(toml, FileFormat::Toml)))?;
        settings.validate()?;
        Ok(settings)
    }

    #[test]
    fn empty_file_yields_defaults() {
        let settings = from_toml("").unwrap();
        assert_eq!(settings.database.max_connections, 10);
        assert_eq!(settings.database.acquire_timeout_secs, 5);
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.logging.level, "info");
        assert!(settings.logging.directory.is_none());
    }

    #[test]
    fn file_values_override_defaults() {
        let settings = from_toml(
            r#"
            [database]
            url = "postgres://localhost/ledger"
            max_connections = 3

            [server]
            host = "0.0.0.0"
            port = 9000

            [logging]
            level = "debug"
            directory = "logs"
            "#,
        )
        .unwrap();
        assert_eq!(settings.database.require_url().unwrap(), "postgres://localhost/ledger");
        assert_eq!(settings.database.max_connections, 3);
        assert_eq!(settings.server.socket_addr().unwrap().to_string(), "0.0.0.0:9000");
        assert_eq!(settings.logging.directory.as_deref(), Some(Path::new("logs")));
    }

    #[test]
    fn rejects_zero_pool_and_blank_level() {
        let err = from_toml("[database]\nmax_connections = 0").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));

        let err = from_toml("[logging]\nlevel = \"  \"").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));

        let err = from_toml("[server]\nhost = \"not an ip\"").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn missing_url_is_reported() {
        let settings = Settings::default();
        assert!(settings.database.require_url().is_err());
    }

    #[test]
    fn missing_optional_file_is_not_an_error() {
        let path = std::env::temp_dir().join("tradeledger-does-not-exist.toml");
        assert!(load_config_from(&path, false).is_ok());
        assert!(load_config_from(&path, true).is_err());
    }
}
