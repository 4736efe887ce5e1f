//! Conf module: configuration model and layered loading.

pub mod load;
pub mod model;

pub use model::{
    BackendConfig, ConsoleConfig, LogFormat, LogOutput, LoggingConfig, PollerConfig, QueryConfig,
    StageLayoutConfig,
};
