//! Engine configuration

pub mod engine_config;
pub mod logging_config;

pub use engine_config::{
    DeadPolicy, EngineConfig, NegotiationConfig, PipelineConfig, TransportConfig,
    CONFIG_FILE_NAME,
};
pub use logging_config::LoggingConfig;
