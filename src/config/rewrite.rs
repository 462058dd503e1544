//! `[rewrite]` section configuration.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};

/// `[rewrite]` section in md2article.toml - link and code block rewriting.
///
/// # Example
/// ```toml
/// [rewrite]
/// redirect_base = "https://go.example.com/?url="   # "" disables link rewriting
/// clean_code_html = true
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(default, deny_unknown_fields)]
pub struct RewriteConfig {
    /// Prefix put in front of every plain outbound link.
    #[serde(default = "defaults::rewrite::redirect_base")]
    #[educe(Default = defaults::rewrite::redirect_base())]
    pub redirect_base: String,

    /// Turn stray HTML inside fenced code blocks into markdown.
    #[serde(default = "defaults::r#true")]
    #[educe(Default = true)]
    pub clean_code_html: bool,
}
