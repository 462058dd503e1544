//! `[watch]` section configuration.
//!
//! Controls which tree is observed and how file events are admitted.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// `[watch]` section in md2article.toml.
///
/// # Example
/// ```toml
/// [watch]
/// root = "posts"
/// settle_ms = 500
/// ignore_prefixes = [".~", "~$"]
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(default, deny_unknown_fields)]
pub struct WatchConfig {
    /// Directory watched recursively (usually set via CLI `--root`).
    #[serde(default = "defaults::watch::root")]
    #[educe(Default = defaults::watch::root())]
    pub root: Option<PathBuf>,

    /// Extension of article files, without the dot.
    #[serde(default = "defaults::watch::extension")]
    #[educe(Default = defaults::watch::extension())]
    pub extension: String,

    /// Pause after an event before the file is read.
    #[serde(default = "defaults::watch::settle_ms")]
    #[educe(Default = defaults::watch::settle_ms())]
    pub settle_ms: u64,

    /// Size polls while waiting for a writer to finish.
    #[serde(default = "defaults::watch::stable_retries")]
    #[educe(Default = defaults::watch::stable_retries())]
    pub stable_retries: usize,

    /// Run every existing article through the pipeline before watching.
    #[serde(default = "defaults::r#true")]
    #[educe(Default = true)]
    pub scan_on_start: bool,

    /// File name prefixes of editor temp/swap files.
    #[serde(default = "defaults::watch::ignore_prefixes")]
    #[educe(Default = defaults::watch::ignore_prefixes())]
    pub ignore_prefixes: Vec<String>,
}

impl WatchConfig {
    /// Whether `path` names an article this tool should touch.
    pub fn is_article(&self, path: &Path) -> bool {
        let ext_matches = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(&self.extension));
        ext_matches && !self.is_ignored(path)
    }

    /// Whether `path` is an editor artifact or hidden file.
    pub fn is_ignored(&self, path: &Path) -> bool {
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        name.is_empty()
            || self.ignore_prefixes.iter().any(|p| name.starts_with(p.as_str()))
            || name.starts_with('.')
            || name.ends_with('~')
    }
}
