//! `[upload]` section configuration.
//!
//! Describes the image hosting endpoint and which URLs are already hosted.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, path::PathBuf, time::Duration};

/// `[upload]` section in md2article.toml.
///
/// # Example
/// ```toml
/// [upload]
/// endpoint = "https://img.example.com/upload"
/// hosted_markers = ["img.example.com", "jsdelivr"]
///
/// [upload.format_params]
/// "qpic.cn" = "wx_fmt"
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(default, deny_unknown_fields)]
pub struct UploadConfig {
    /// Multipart upload endpoint. Required.
    pub endpoint: Option<String>,

    /// Multipart form field carrying the file.
    #[serde(default = "defaults::upload::field")]
    #[educe(Default = defaults::upload::field())]
    pub field: String,

    /// Substrings marking a URL as already hosted; such URLs are never rewritten.
    #[serde(default = "defaults::upload::hosted_markers")]
    #[educe(Default = defaults::upload::hosted_markers())]
    pub hosted_markers: Vec<String>,

    /// Attempts per image, the first one included.
    #[serde(default = "defaults::upload::max_attempts")]
    #[educe(Default = defaults::upload::max_attempts())]
    pub max_attempts: usize,

    /// Per-request timeout for downloads and uploads.
    #[serde(default = "defaults::upload::timeout_secs")]
    #[educe(Default = defaults::upload::timeout_secs())]
    pub timeout_secs: u64,

    /// Where downloaded images are staged. Defaults to the system temp dir.
    #[serde(default = "defaults::upload::temp_dir")]
    #[educe(Default = defaults::upload::temp_dir())]
    pub temp_dir: Option<PathBuf>,

    /// Host marker → query parameter holding the real image format.
    #[serde(default = "defaults::upload::format_params")]
    #[educe(Default = defaults::upload::format_params())]
    pub format_params: BTreeMap<String, String>,
}

impl UploadConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Staging directory, falling back to the system temp dir.
    pub fn staging_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::super::ArticleConfig;

    #[test]
    fn test_upload_config_defaults() {
        let config: ArticleConfig = toml::from_str("").unwrap();

        assert!(config.upload.endpoint.is_none());
        assert_eq!(config.upload.field, "file");
        assert_eq!(config.upload.max_attempts, 2);
        assert!(config.upload.hosted_markers.iter().any(|m| m == "jsdelivr"));
        assert_eq!(
            config.upload.format_params.get("qpic.cn").map(String::as_str),
            Some("wx_fmt")
        );
    }

    #[test]
    fn test_upload_config_override() {
        let config: ArticleConfig = toml::from_str(
            r#"
            [upload]
            endpoint = "https://img.example.com/upload"
            hosted_markers = ["img.example.com"]
            max_attempts = 3

            [upload.format_params]
            "cdn.example.com" = "fmt"
        "#,
        )
        .unwrap();

        assert_eq!(
            config.upload.endpoint.as_deref(),
            Some("https://img.example.com/upload")
        );
        assert_eq!(config.upload.hosted_markers, vec!["img.example.com"]);
        assert_eq!(config.upload.max_attempts, 3);
        // A configured table replaces the default one
        assert!(!config.upload.format_params.contains_key("qpic.cn"));
    }
}
