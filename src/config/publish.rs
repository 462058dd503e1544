//! `[publish]` section configuration.

use educe::Educe;
use serde::{Deserialize, Serialize};

/// `[publish]` section in md2article.toml - rename-after-publish mode.
///
/// When enabled, an article that just received front matter is moved to a
/// file named after its title, optionally posted to `endpoint`, and the
/// old file is removed.
///
/// # Example
/// ```toml
/// [publish]
/// enable = true
/// endpoint = "http://192.168.1.20:8080/upload"
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(default, deny_unknown_fields)]
pub struct PublishConfig {
    pub enable: bool,

    /// Multipart endpoint receiving the finished article.
    pub endpoint: Option<String>,
}
