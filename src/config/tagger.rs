//! `[tagger]` section configuration.
//!
//! The tagger is the external text service that proposes titles and tags.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What the tagger gets to read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaggerInput {
    /// Only the title derived from the file name (default).
    #[default]
    Filename,
    /// The whole article body.
    Body,
}

/// `[tagger]` section in md2article.toml.
///
/// Leaving `endpoint` unset disables the service; titles then come from
/// file names and tags from directory names.
///
/// # Example
/// ```toml
/// [tagger]
/// endpoint = "https://dify.example.com/v1/chat-messages"
/// api_key_env = "TAGGER_API_KEY"
/// input = "body"
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(default, deny_unknown_fields)]
pub struct TaggerConfig {
    #[serde(default = "defaults::tagger::endpoint")]
    #[educe(Default = defaults::tagger::endpoint())]
    pub endpoint: Option<String>,

    /// Bearer token. Prefer `api_key_env` to keep secrets out of the file.
    pub api_key: Option<String>,

    /// Environment variable holding the bearer token.
    pub api_key_env: Option<String>,

    /// Value of the `user` field sent with every request.
    #[serde(default = "defaults::tagger::user")]
    #[educe(Default = defaults::tagger::user())]
    pub user: String,

    #[serde(default = "defaults::tagger::input")]
    #[educe(Default = defaults::tagger::input())]
    pub input: TaggerInput,

    /// Attempts per article before falling back to the file name.
    #[serde(default = "defaults::tagger::max_attempts")]
    #[educe(Default = defaults::tagger::max_attempts())]
    pub max_attempts: usize,

    #[serde(default = "defaults::tagger::timeout_secs")]
    #[educe(Default = defaults::tagger::timeout_secs())]
    pub timeout_secs: u64,

    /// Have the service rewrite long prose runs of new articles.
    #[serde(default = "defaults::r#false")]
    #[educe(Default = false)]
    pub rewrite_prose: bool,

    /// Prose runs shorter than this many bytes are never rewritten.
    #[serde(default = "defaults::tagger::rewrite_min_len")]
    #[educe(Default = defaults::tagger::rewrite_min_len())]
    pub rewrite_min_len: usize,
}

impl TaggerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Bearer token from the file or, failing that, the environment.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| {
                self.api_key_env
                    .as_deref()
                    .and_then(|name| std::env::var(name).ok())
            })
            .filter(|k| !k.trim().is_empty())
    }
}
