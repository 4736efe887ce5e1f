//! Load: layered configuration: defaults, then files, then environment.

use anyhow::{Context, Result};

use super::model::ConsoleConfig;

const CONFIG_PATHS: [&str; 3] = [
    "/etc/console-sync/console",
    "config/console",
    "crates/console-sync/config/console",
];

impl ConsoleConfig {
    /// Load configuration from console.toml and environment variables
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        // Compile-time defaults are the base layer so that keys missing from
        // files and the environment still resolve
        let defaults = config::Config::try_from(&ConsoleConfig::default())
            .context("Failed to serialize default configuration")?;

        let mut builder = config::Config::builder().add_source(defaults);

        for path in CONFIG_PATHS {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        // Double underscore for nested keys: CONSOLE_BACKEND__BASE_URL
        builder = builder.add_source(
            config::Environment::with_prefix("CONSOLE")
                .separator("__")
                .try_parsing(true),
        );

        builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let base = &self.backend.base_url;
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            anyhow::bail!("backend.base_url must be an http(s) URL, got '{}'", base);
        }

        for (name, path) in [
            ("backend.long_query_path", &self.backend.long_query_path),
            ("backend.request_graph_path", &self.backend.request_graph_path),
        ] {
            if !path.starts_with('/') {
                anyhow::bail!("{} must start with '/', got '{}'", name, path);
            }
        }

        if self.backend.max_url_length == 0 {
            anyhow::bail!("backend.max_url_length must be > 0");
        }
        if self.query.default_page_limit == 0 {
            anyhow::bail!("query.default_page_limit must be > 0");
        }
        if self.poller.interval_ms == 0 {
            anyhow::bail!("poller.interval_ms must be > 0");
        }
        if self.poller.max_duration_secs == Some(0) {
            anyhow::bail!("poller.max_duration_secs must be > 0 when set");
        }
        if self.stages.node_height == 0 {
            anyhow::bail!("stages.node_height must be > 0");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conf::LogFormat;

    #[test]
    fn defaults_are_valid() {
        let config = ConsoleConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.backend.max_url_length, 1950);
        assert_eq!(config.poller.interval_ms, 2000);
        assert!(config.poller.max_duration().is_none());
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn rejects_relative_long_query_path() {
        let mut config = ConsoleConfig::default();
        config.backend.long_query_path = "long-uri-get".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("long_query_path"));
    }

    #[test]
    fn rejects_non_http_base_url() {
        let mut config = ConsoleConfig::default();
        config.backend.base_url = "ftp://backend".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_max_duration() {
        let mut config = ConsoleConfig::default();
        config.poller.max_duration_secs = Some(0);
        assert!(config.validate().is_err());

        config.poller.max_duration_secs = Some(600);
        assert!(config.validate().is_ok());
        assert_eq!(config.poller.max_duration().map(|d| d.as_secs()), Some(600));
    }

    #[test]
    fn defaults_round_trip_through_config_source() {
        let source = config::Config::try_from(&ConsoleConfig::default()).unwrap();
        let loaded: ConsoleConfig = source.try_deserialize().unwrap();
        assert_eq!(loaded.backend.long_query_path, "/long-uri-get");
        assert_eq!(loaded.stages, crate::conf::StageLayoutConfig::default());
    }
}
