//! Generated front matter for articles that have none.
//!
//! ```text
//! ---
//! title: Async Rust --notes
//! description: Async Rust --notes
//! date: 2024-03-01 09:00:00
//! author: Alice
//! category:
//! - Alice
//! tags:
//! - rust
//! - async
//! ---
//! <body>
//! ```
//!
//! A document whose first line is `---` already has a block and is left
//! alone, which makes generation idempotent.

pub mod clock;
pub mod tagger;

use crate::{
    config::{FrontMatterConfig, TaggerConfig, TaggerInput},
    debug, log,
    markdown::rewrite_prose,
    utils::{
        path::tags_from_path,
        retry::{RetryPolicy, with_retry},
    },
};
use anyhow::{Context, Result};
use clock::{DATE_FORMAT, SequenceClock};
use serde::Serialize;
use std::{path::Path, sync::Arc};
use tagger::Tagger;

/// Front matter delimiter line.
pub const DELIMITER: &str = "---";

#[derive(Debug, Serialize)]
struct FrontMatter<'a> {
    title: &'a str,
    description: &'a str,
    date: String,
    author: &'a str,
    category: Vec<&'a str>,
    tags: &'a [String],
}

/// Whether `doc` already opens with a front matter block.
pub fn has_front_matter(doc: &str) -> bool {
    let doc = doc.strip_prefix('\u{feff}').unwrap_or(doc);
    doc.lines()
        .next()
        .is_some_and(|first| first.trim_end() == DELIMITER)
}

pub struct FrontMatterGenerator {
    config: FrontMatterConfig,
    input: TaggerInput,
    /// Minimum run length when prose rewriting is on.
    rewrite_min_len: Option<usize>,
    clock: Arc<SequenceClock>,
    tagger: Option<Arc<dyn Tagger>>,
    policy: RetryPolicy,
}

impl FrontMatterGenerator {
    pub fn new(
        config: &FrontMatterConfig,
        tagger_config: &TaggerConfig,
        clock: Arc<SequenceClock>,
        tagger: Option<Arc<dyn Tagger>>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            config: config.clone(),
            input: tagger_config.input,
            rewrite_min_len: tagger_config
                .rewrite_prose
                .then_some(tagger_config.rewrite_min_len),
            clock,
            tagger,
            policy,
        }
    }

    /// Prepend a front matter block unless `doc` already has one.
    ///
    /// Returns the title used (`None` when nothing was generated) and the
    /// resulting document.
    pub fn ensure_front_matter(&self, doc: &str, path: &Path) -> Result<(Option<String>, String)> {
        if !self.config.enable || has_front_matter(doc) {
            return Ok((None, doc.to_owned()));
        }

        let base_title = self.base_title(path);
        let mut body = strip_noise(doc, &self.config.body_noise);
        let date = self.clock.tick();

        let (mut title, mut tags) = match self.suggest(&base_title, &body, path) {
            Some(suggestion) => (suggestion.title, suggestion.tags),
            None => (base_title, Vec::new()),
        };
        if tags.is_empty() && self.config.tags_from_dirs {
            tags = tags_from_path(path);
        }

        if let (Some(min_len), Some(tagger)) = (self.rewrite_min_len, &self.tagger) {
            let rewritten = rewrite_prose(&body, min_len, tagger.as_ref());
            if rewritten.rewritten > 0 {
                debug!("tagger"; "rewrote {} prose runs", rewritten.rewritten);
                body = rewritten.content;
                for tag in rewritten.tags {
                    if !tags.contains(&tag) {
                        tags.push(tag);
                    }
                }
            }
        }

        title.push_str(&self.config.title_suffix);

        let category = Some(self.config.category())
            .filter(|c| !c.is_empty())
            .into_iter()
            .collect();
        let block = FrontMatter {
            title: &title,
            description: &title,
            date: date.format(DATE_FORMAT).to_string(),
            author: &self.config.author,
            category,
            tags: &tags,
        };
        let yaml = serde_yaml::to_string(&block).context("failed to render front matter")?;

        let body = body.strip_prefix('\u{feff}').unwrap_or(&body);
        let doc = format!("{DELIMITER}\n{yaml}{DELIMITER}\n{body}");
        Ok((Some(title), doc))
    }

    /// File stem with configured noise removed.
    fn base_title(&self, path: &Path) -> String {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let title = strip_noise(&stem, &self.config.title_noise);
        let title = title.trim();
        if title.is_empty() {
            stem.trim().to_owned()
        } else {
            title.to_owned()
        }
    }

    /// Ask the tagger, within the attempt budget. `None` means fall back.
    fn suggest(&self, base_title: &str, body: &str, path: &Path) -> Option<tagger::Suggestion> {
        let tagger = self.tagger.as_ref()?;
        let input = match self.input {
            TaggerInput::Filename => base_title,
            TaggerInput::Body => body,
        };

        let result = with_retry(
            self.policy,
            |_| true,
            |attempt| {
                let result = tagger.suggest(input);
                if let Err(err) = &result {
                    debug!("tagger"; "attempt {attempt} for {}: {err}", path.display());
                }
                result
            },
        );

        match result {
            Ok(suggestion) => Some(suggestion),
            Err(err) => {
                log!("tagger"; "falling back to file name for {}: {err}", path.display());
                None
            }
        }
    }
}

fn strip_noise(text: &str, noise: &[String]) -> String {
    noise
        .iter()
        .filter(|n| !n.is_empty())
        .fold(text.to_owned(), |acc, n| acc.replace(n.as_str(), ""))
}
