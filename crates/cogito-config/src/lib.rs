//! Process configuration shared by the Cogito crates: where the native engine
//! lives and how tracing is wired up.

pub mod engine;
pub mod tracing;

pub use engine::{
    config, configure, ConfigError, EngineConfig, BUILD_DIR_ENV, LIBRARY_NAME_ENV,
    LIBRARY_PATH_ENV,
};
