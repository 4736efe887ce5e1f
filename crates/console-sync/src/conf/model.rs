use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConsoleConfig {
    pub backend: BackendConfig,
    pub query: QueryConfig,
    pub poller: PollerConfig,
    pub stages: StageLayoutConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    /// Scheme, host and port of the document store, without a trailing path.
    pub base_url: String,
    /// Endpoint accepting `{"uri": ...}` for queries too long to send as a URL.
    pub long_query_path: String,
    /// Encoded GET URLs longer than this are rerouted through `long_query_path`.
    pub max_url_length: usize,
    pub request_graph_path: String,
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueryConfig {
    pub default_page_limit: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PollerConfig {
    pub interval_ms: u64,
    /// Unset means a poll runs until a terminal stage or cancellation.
    #[serde(default)]
    pub max_duration_secs: Option<u64>,
}

impl PollerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn max_duration(&self) -> Option<Duration> {
        self.max_duration_secs.map(Duration::from_secs)
    }
}

/// Vertical layout constants for the stage graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct StageLayoutConfig {
    pub base_offset: u32,
    pub node_height: u32,
    pub padding: u32,
    pub lane_width: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub output: LogOutput,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    Stderr,
    File { path: String },
}

impl Default for StageLayoutConfig {
    fn default() -> Self {
        Self {
            base_offset: 20,
            node_height: 40,
            padding: 20,
            lane_width: 220,
        }
    }
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig {
                base_url: "http://localhost:8282".to_string(),
                long_query_path: "/long-uri-get".to_string(),
                max_url_length: 1950,
                request_graph_path: "/request-graph".to_string(),
                connect_timeout_secs: 10,
            },
            query: QueryConfig {
                default_page_limit: 20,
            },
            poller: PollerConfig {
                interval_ms: 2000,
                max_duration_secs: None,
            },
            stages: StageLayoutConfig::default(),
            logging: LoggingConfig {
                level: "info,console_sync=debug".to_string(),
                format: LogFormat::Pretty,
                output: LogOutput::Stderr,
            },
        }
    }
}
