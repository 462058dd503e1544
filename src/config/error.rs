//! Configuration error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or checking `md2article.toml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file `{0}`")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("config file is not valid TOML")]
    Toml(#[from] toml::de::Error),

    #[error("{0} is required")]
    Missing(&'static str),

    #[error("invalid config: {0}")]
    Validation(String),
}
