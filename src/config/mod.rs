//! Configuration management for `md2article.toml`.
//!
//! # Sections
//!
//! | Section          | Purpose                                          |
//! |------------------|--------------------------------------------------|
//! | `[watch]`        | Watched root, settling delay, ignored names      |
//! | `[upload]`       | Image hosting endpoint, hosted markers, retries  |
//! | `[classify]`     | Image extensions and the magic-number table      |
//! | `[rewrite]`      | Link redirect prefix, code block HTML cleanup    |
//! | `[front_matter]` | Generated title/date/tags block                  |
//! | `[tagger]`       | External title/tag service                       |
//! | `[publish]`      | Rename-after-publish mode                        |
//!
//! # Example
//!
//! ```toml
//! [upload]
//! endpoint = "https://img.example.com/upload"
//!
//! [rewrite]
//! redirect_base = "https://go.example.com/?url="
//!
//! [front_matter]
//! author = "Alice"
//!
//! [tagger]
//! endpoint = "https://dify.example.com/v1/chat-messages"
//! api_key_env = "TAGGER_API_KEY"
//! ```

mod classify;
pub mod defaults;
mod error;
mod front_matter;
mod publish;
mod rewrite;
mod tagger;
mod upload;
mod watch;

pub use classify::{ClassifyConfig, Signature};
pub use error::ConfigError;
pub use front_matter::FrontMatterConfig;
pub use publish::PublishConfig;
pub use rewrite::RewriteConfig;
pub use tagger::{TaggerConfig, TaggerInput};
pub use upload::UploadConfig;
pub use watch::WatchConfig;

use crate::cli::Cli;
use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration structure representing md2article.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArticleConfig {
    /// Absolute path to the config file (set after loading)
    #[serde(skip)]
    pub config_path: PathBuf,

    #[serde(default)]
    pub watch: WatchConfig,

    #[serde(default)]
    pub upload: UploadConfig,

    #[serde(default)]
    pub classify: ClassifyConfig,

    #[serde(default)]
    pub rewrite: RewriteConfig,

    #[serde(default)]
    pub front_matter: FrontMatterConfig,

    #[serde(default)]
    pub tagger: TaggerConfig,

    #[serde(default)]
    pub publish: PublishConfig,
}

impl ArticleConfig {
    /// Parse configuration from TOML string
    pub fn from_str(content: &str) -> Result<Self> {
        let config: ArticleConfig = toml::from_str(content).map_err(ConfigError::from)?;
        Ok(config)
    }

    /// Load configuration from file path
    pub fn from_path(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;
        Self::from_str(&content)
    }

    /// Get the watched root directory
    pub fn get_root(&self) -> &Path {
        self.watch.root.as_deref().unwrap_or(Path::new("./"))
    }

    /// Set the watched root directory
    pub fn set_root(&mut self, path: &Path) {
        self.watch.root = Some(path.to_path_buf())
    }

    /// Update configuration with CLI arguments and normalize paths
    pub fn update_with_cli(&mut self, cli: &Cli) {
        let root = cli
            .root
            .as_ref()
            .cloned()
            .unwrap_or_else(|| self.get_root().to_owned());

        let root = Self::normalize_path(&root);
        self.set_root(&root);
        self.config_path = Self::normalize_path(&root.join(&cli.config));

        if let Some(temp_dir) = self.upload.temp_dir.take() {
            let expanded = shellexpand::tilde(&temp_dir.to_string_lossy()).into_owned();
            let path = PathBuf::from(expanded);
            self.upload.temp_dir = Some(if path.is_relative() {
                Self::normalize_path(&root.join(path))
            } else {
                path
            });
        }
    }

    /// Normalize a path to absolute, using canonicalize if the path exists
    fn normalize_path(path: &Path) -> PathBuf {
        path.canonicalize().unwrap_or_else(|_| {
            if path.is_absolute() {
                path.to_path_buf()
            } else {
                std::env::current_dir()
                    .map(|cwd| cwd.join(path))
                    .unwrap_or_else(|_| path.to_path_buf())
            }
        })
    }

    /// Validate configuration before the pipeline is built
    pub fn validate(&self) -> Result<()> {
        let root = self.get_root();
        if !root.is_dir() {
            bail!(ConfigError::Validation(format!(
                "watched root `{}` is not a directory",
                root.display()
            )));
        }

        match self.upload.endpoint.as_deref() {
            None => bail!(ConfigError::Missing("[upload.endpoint]")),
            Some(endpoint) if !endpoint.starts_with("http") => {
                bail!(ConfigError::Validation(
                    "[upload.endpoint] must start with http:// or https://".into()
                ))
            }
            _ => {}
        }

        if self.upload.max_attempts == 0 {
            bail!(ConfigError::Validation(
                "[upload.max_attempts] must be at least 1".into()
            ));
        }

        if self.upload.field.trim().is_empty() {
            bail!(ConfigError::Validation(
                "[upload.field] must not be empty".into()
            ));
        }

        if self.watch.extension.trim().is_empty() || self.watch.extension.starts_with('.') {
            bail!(ConfigError::Validation(
                "[watch.extension] must be a bare extension such as \"md\"".into()
            ));
        }

        if let Some(signature) = self.classify.signatures.iter().find(|s| s.magic.is_empty()) {
            bail!(ConfigError::Validation(format!(
                "[classify.signatures] entry `{}` has an empty magic",
                signature.ext
            )));
        }

        if self.front_matter.step_secs <= 0 {
            bail!(ConfigError::Validation(
                "[front_matter.step_secs] must be positive".into()
            ));
        }

        if let Some(endpoint) = self.tagger.endpoint.as_deref() {
            if !endpoint.starts_with("http") {
                bail!(ConfigError::Validation(
                    "[tagger.endpoint] must start with http:// or https://".into()
                ));
            }
            if self.tagger.resolve_api_key().is_none() {
                bail!(ConfigError::Missing(
                    "[tagger.api_key] or [tagger.api_key_env]"
                ));
            }
            if self.tagger.max_attempts == 0 {
                bail!(ConfigError::Validation(
                    "[tagger.max_attempts] must be at least 1".into()
                ));
            }
        }

        if let Some(endpoint) = self.publish.endpoint.as_deref()
            && !endpoint.starts_with("http")
        {
            bail!(ConfigError::Validation(
                "[publish.endpoint] must start with http:// or https://".into()
            ));
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config(root: &Path) -> ArticleConfig {
        let mut config = ArticleConfig::from_str(
            r#"
            [upload]
            endpoint = "https://img.example.com/upload"
        "#,
        )
        .unwrap();
        config.set_root(root);
        config
    }

    #[test]
    fn test_from_str() {
        let config = ArticleConfig::from_str(
            r#"
            [upload]
            endpoint = "https://img.example.com/upload"

            [front_matter]
            author = "Alice"
        "#,
        )
        .unwrap();

        assert_eq!(
            config.upload.endpoint.as_deref(),
            Some("https://img.example.com/upload")
        );
        assert_eq!(config.front_matter.author, "Alice");
    }

    #[test]
    fn test_from_str_invalid_toml() {
        let result = ArticleConfig::from_str("[upload\nendpoint = 1");
        assert!(result.is_err());
    }

    #[test]
    fn test_from_path_missing_file() {
        let err = ArticleConfig::from_path(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(err.downcast_ref::<ConfigError>().is_some());
    }

    #[test]
    fn test_get_root_default() {
        let config = ArticleConfig::default();
        assert_eq!(config.get_root(), Path::new("./"));
    }

    #[test]
    fn test_unknown_top_level_field_rejection() {
        let result = ArticleConfig::from_str(
            r#"
            [server]
            port = 8080
        "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_accepts_minimal_config() {
        let dir = tempfile::tempdir().unwrap();
        assert!(valid_config(dir.path()).validate().is_ok());
    }

    #[test]
    fn test_validate_requires_upload_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = valid_config(dir.path());
        config.upload.endpoint = None;

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("[upload.endpoint]"));
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = valid_config(dir.path());
        config.upload.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_tagger_needs_key() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = valid_config(dir.path());
        config.tagger.endpoint = Some("https://dify.example.com/v1/chat-messages".into());
        config.tagger.api_key_env = Some("MD2ARTICLE_TEST_UNSET_KEY".into());
        assert!(config.validate().is_err());

        config.tagger.api_key = Some("app-123".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_magic() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = valid_config(dir.path());
        config.classify.signatures.push(Signature::new("raw", 0, b""));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let config = valid_config(&dir.path().join("missing"));
        assert!(config.validate().is_err());
    }
}
