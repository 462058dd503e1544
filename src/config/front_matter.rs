//! `[front_matter]` section configuration.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};

/// `[front_matter]` section in md2article.toml - generated metadata block.
///
/// # Example
/// ```toml
/// [front_matter]
/// author = "Alice"
/// category = "notes"
/// title_suffix = " --Alice's notes"
/// title_noise = ["-今日头条", " - Medium"]
/// body_noise = ["Subscribe for more >>"]
/// clock_offset_hours = 8
/// step_secs = 60
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(default, deny_unknown_fields)]
pub struct FrontMatterConfig {
    /// Generate a front matter block for articles lacking one.
    #[serde(default = "defaults::r#true")]
    #[educe(Default = true)]
    pub enable: bool,

    pub author: String,

    /// Single category entry. Falls back to `author` when empty.
    pub category: String,

    /// Appended to every generated title.
    pub title_suffix: String,

    /// Strings removed from file names before they become titles.
    pub title_noise: Vec<String>,

    /// Strings removed from article bodies.
    pub body_noise: Vec<String>,

    /// The date sequence starts this many hours before process start.
    #[serde(default = "defaults::front_matter::clock_offset_hours")]
    #[educe(Default = defaults::front_matter::clock_offset_hours())]
    pub clock_offset_hours: i64,

    /// Distance between two consecutive generated dates.
    #[serde(default = "defaults::front_matter::step_secs")]
    #[educe(Default = defaults::front_matter::step_secs())]
    pub step_secs: i64,

    /// Use parent directory names as tags when the tagger gives none.
    #[serde(default = "defaults::r#true")]
    #[educe(Default = true)]
    pub tags_from_dirs: bool,
}

impl FrontMatterConfig {
    pub fn category(&self) -> &str {
        if self.category.is_empty() {
            &self.author
        } else {
            &self.category
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::ArticleConfig;

    #[test]
    fn test_front_matter_defaults() {
        let config: ArticleConfig = toml::from_str("").unwrap();
        let fm = &config.front_matter;

        assert!(fm.enable);
        assert!(fm.tags_from_dirs);
        assert_eq!(fm.clock_offset_hours, 8);
        assert_eq!(fm.step_secs, 60);
        assert!(fm.title_noise.is_empty());
    }

    #[test]
    fn test_category_falls_back_to_author() {
        let config: ArticleConfig = toml::from_str(
            r#"
            [front_matter]
            author = "Alice"
        "#,
        )
        .unwrap();
        assert_eq!(config.front_matter.category(), "Alice");

        let config: ArticleConfig = toml::from_str(
            r#"
            [front_matter]
            author = "Alice"
            category = "rust"
        "#,
        )
        .unwrap();
        assert_eq!(config.front_matter.category(), "rust");
    }
}
