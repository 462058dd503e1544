//! Image, link and code block rewriting.
//!
//! Three passes, each rescanning the output of the previous one:
//!
//! 1. **Images**: every image URL (including images nested in link text) is
//!    uploaded once and all of its occurrences are replaced.
//! 2. **Links**: plain absolute links get the redirect prefix.
//! 3. **Code**: fenced blocks carrying HTML are cleaned.

use super::{
    html::clean_fenced,
    segment::{Segment, segment},
};
use crate::{
    classify::{UrlClassifier, UrlKind, is_remote},
    config::RewriteConfig,
    debug, log,
    upload::{SourceRef, Upload},
};
use rustc_hash::FxHashMap;
use std::path::Path;

/// Result of one rewrite pass over a document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transformed {
    pub content: String,
    /// Images that received a new locator.
    pub uploads: usize,
    /// Links that received the redirect prefix.
    pub links: usize,
    /// Code blocks that were cleaned.
    pub code_blocks: usize,
    /// Image URLs kept as they were because their upload failed.
    pub failed: Vec<String>,
}

/// Per-document memo of upload outcomes: `None` keeps the original URL.
#[derive(Default)]
struct UploadCache {
    order: Vec<String>,
    outcomes: FxHashMap<String, Option<String>>,
}

impl UploadCache {
    fn contains(&self, url: &str) -> bool {
        self.outcomes.contains_key(url)
    }

    fn insert(&mut self, url: &str, outcome: Option<String>) {
        self.order.push(url.to_owned());
        self.outcomes.insert(url.to_owned(), outcome);
    }

    /// `(original, locator)` pairs that actually change something.
    fn replacements(&self) -> Vec<(&str, &str)> {
        let mut pairs: Vec<_> = self
            .order
            .iter()
            .filter_map(|url| match self.outcomes.get(url) {
                Some(Some(locator)) if locator != url => Some((url.as_str(), locator.as_str())),
                _ => None,
            })
            .collect();
        // Longer URLs first so a URL that prefixes another one cannot clobber it
        pairs.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        pairs
    }
}

pub struct MarkdownTransformer {
    redirect_base: String,
    clean_code_html: bool,
}

impl MarkdownTransformer {
    pub fn new(config: &RewriteConfig) -> Self {
        Self {
            redirect_base: config.redirect_base.clone(),
            clean_code_html: config.clean_code_html,
        }
    }

    pub fn transform(
        &self,
        doc: &str,
        doc_dir: &Path,
        uploader: &dyn Upload,
        classifier: &UrlClassifier,
    ) -> Transformed {
        let mut failed = Vec::new();
        let (content, uploads) = self.rewrite_images(doc, doc_dir, uploader, classifier, &mut failed);
        let (content, links) = self.rewrite_links(&content, classifier);
        let (content, code_blocks) = self.clean_code(&content);

        Transformed {
            content,
            uploads,
            links,
            code_blocks,
            failed,
        }
    }

    fn rewrite_images(
        &self,
        doc: &str,
        doc_dir: &Path,
        uploader: &dyn Upload,
        classifier: &UrlClassifier,
        failed: &mut Vec<String>,
    ) -> (String, usize) {
        let mut urls = Vec::new();
        collect_image_urls(&segment(doc), &mut urls);

        let mut cache = UploadCache::default();
        for url in urls {
            if url.is_empty()
                || url.starts_with("data:")
                || cache.contains(url)
                || classifier.is_hosted(url)
            {
                continue;
            }

            let source = SourceRef::resolve(url, doc_dir);
            match uploader.upload(&source) {
                Ok(locator) => {
                    debug!("upload"; "{url} -> {locator}");
                    cache.insert(url, Some(locator));
                }
                Err(err) => {
                    log!("upload"; "keeping {url}: {err}");
                    failed.push(url.to_owned());
                    cache.insert(url, None);
                }
            }
        }

        let replacements = cache.replacements();
        (replace_in_one_pass(doc, &replacements), replacements.len())
    }

    fn rewrite_links(&self, doc: &str, classifier: &UrlClassifier) -> (String, usize) {
        if self.redirect_base.is_empty() {
            return (doc.to_owned(), 0);
        }

        let mut kinds: FxHashMap<&str, UrlKind> = FxHashMap::default();
        let mut count = 0;
        let mut out = String::with_capacity(doc.len());

        for seg in segment(doc) {
            let Segment::Link { reference, .. } = &seg else {
                out.push_str(seg.raw());
                continue;
            };

            let url = reference.url();
            let redirect = is_remote(url)
                && !url.starts_with(&self.redirect_base)
                && *kinds
                    .entry(url)
                    .or_insert_with(|| classifier.classify(url))
                    == UrlKind::Plain;

            if redirect {
                out.push_str(&reference.with_url(&format!("{}{url}", self.redirect_base)));
                count += 1;
            } else {
                out.push_str(reference.raw);
            }
        }
        (out, count)
    }

    fn clean_code(&self, doc: &str) -> (String, usize) {
        if !self.clean_code_html {
            return (doc.to_owned(), 0);
        }

        let mut count = 0;
        let mut out = String::with_capacity(doc.len());
        for seg in segment(doc) {
            match seg {
                Segment::CodeBlock(raw) => match clean_fenced(raw) {
                    Some(cleaned) => {
                        out.push_str(&cleaned);
                        count += 1;
                    }
                    None => out.push_str(raw),
                },
                other => out.push_str(other.raw()),
            }
        }
        (out, count)
    }
}

/// Image URLs in document order, descending into link text.
fn collect_image_urls<'a>(segments: &[Segment<'a>], urls: &mut Vec<&'a str>) {
    for seg in segments {
        match seg {
            Segment::Image(reference) | Segment::HtmlImage(reference) => urls.push(reference.url()),
            Segment::Link { text, .. } => collect_image_urls(&segment(*text), urls),
            _ => {}
        }
    }
}

/// Swap every occurrence of each `from` for its `to`, scanning `doc` once
/// left to right. Inserted text is never scanned again. `pairs` must be
/// ordered longest `from` first.
fn replace_in_one_pass(doc: &str, pairs: &[(&str, &str)]) -> String {
    if pairs.is_empty() {
        return doc.to_owned();
    }

    let mut out = String::with_capacity(doc.len());
    let mut rest = doc;
    'scan: while let Some(ch) = rest.chars().next() {
        for (from, to) in pairs {
            if rest.starts_with(from) {
                out.push_str(to);
                rest = &rest[from.len()..];
                continue 'scan;
            }
        }
        out.push(ch);
        rest = &rest[ch.len_utf8()..];
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{ClassifyConfig, UploadConfig},
        upload::UploadError,
        utils::http::{Fetch, FetchError},
    };
    use parking_lot::Mutex;
    use reqwest::StatusCode;
    use std::{path::PathBuf, sync::Arc};

    /// Every probe fails, so extensionless links stay plain.
    struct NoFetch;

    impl Fetch for NoFetch {
        fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
            self.fetch_head(url, 0)
        }

        fn fetch_head(&self, url: &str, _limit: usize) -> Result<Vec<u8>, FetchError> {
            Err(FetchError::Status {
                url: url.to_owned(),
                status: StatusCode::NOT_FOUND,
            })
        }
    }

    /// Answers `http://cdn.site/<file name>` and records each call.
    #[derive(Default)]
    struct StubUploader {
        calls: Mutex<Vec<SourceRef>>,
        failing: bool,
    }

    impl Upload for StubUploader {
        fn upload(&self, source: &SourceRef) -> Result<String, UploadError> {
            self.calls.lock().push(source.clone());
            if self.failing {
                return Err(UploadError::Status(StatusCode::BAD_GATEWAY));
            }
            let name = source.to_string().rsplit('/').next().unwrap_or("").to_owned();
            Ok(format!("http://cdn.site/{name}"))
        }
    }

    fn classifier() -> UrlClassifier {
        UrlClassifier::new(
            &UploadConfig::default(),
            &ClassifyConfig::default(),
            Arc::new(NoFetch),
        )
    }

    fn transformer() -> MarkdownTransformer {
        MarkdownTransformer::new(&RewriteConfig::default())
    }

    fn run(doc: &str, uploader: &StubUploader) -> Transformed {
        transformer().transform(doc, Path::new("/notes/rust"), uploader, &classifier())
    }

    #[test]
    fn test_image_is_rehosted() {
        let uploader = StubUploader::default();
        let out = run("![x](http://a.com/i.png)", &uploader);

        assert_eq!(out.content, "![x](http://cdn.site/i.png)");
        assert_eq!(out.uploads, 1);
    }

    #[test]
    fn test_link_gets_redirect_prefix() {
        let uploader = StubUploader::default();
        let out = run("[doc](http://example.com/p)", &uploader);

        assert_eq!(
            out.content,
            "[doc](http://zshipu.com/t/index.html?url=http://example.com/p)"
        );
        assert_eq!(out.links, 1);
        assert!(uploader.calls.lock().is_empty());
    }

    #[test]
    fn test_duplicate_url_uploaded_once() {
        let uploader = StubUploader::default();
        let doc = "![a](http://a.com/i.png)\ntext\n<img src=\"http://a.com/i.png\">\n![b](http://a.com/i.png)";
        let out = run(doc, &uploader);

        assert_eq!(uploader.calls.lock().len(), 1);
        assert_eq!(out.content.matches("http://cdn.site/i.png").count(), 3);
        assert!(!out.content.contains("http://a.com/i.png"));
    }

    #[test]
    fn test_suffix_url_not_replaced_inside_new_locator() {
        let uploader = StubUploader::default();
        let out = run("![a](a.png) ![b](banana.png)", &uploader);

        assert_eq!(
            out.content,
            "![a](http://cdn.site/a.png) ![b](http://cdn.site/banana.png)"
        );
        assert_eq!(out.uploads, 2);
    }

    #[test]
    fn test_one_pass_replacement() {
        let pairs = [("banana.png", "http://cdn.site/banana.png"), ("a.png", "http://cdn.site/a.png")];
        assert_eq!(
            replace_in_one_pass("知 a.png banana.png a.png", &pairs),
            "知 http://cdn.site/a.png http://cdn.site/banana.png http://cdn.site/a.png"
        );
        assert_eq!(replace_in_one_pass("none here", &pairs), "none here");
    }

    #[test]
    fn test_hosted_never_uploaded() {
        let uploader = StubUploader::default();
        let doc = "![a](https://cdn.jsdelivr.net/gh/u/a.png) [b](https://zshipu.com/x)";
        let out = run(doc, &uploader);

        assert!(uploader.calls.lock().is_empty());
        assert_eq!(out.content, doc);
    }

    #[test]
    fn test_failed_upload_keeps_url() {
        let uploader = StubUploader {
            failing: true,
            ..Default::default()
        };
        let out = run("![x](http://a.com/i.png) ![y](http://a.com/i.png)", &uploader);

        assert_eq!(out.content, "![x](http://a.com/i.png) ![y](http://a.com/i.png)");
        assert_eq!(out.failed, vec!["http://a.com/i.png".to_string()]);
        assert_eq!(out.uploads, 0);
        assert_eq!(uploader.calls.lock().len(), 1);
    }

    #[test]
    fn test_local_image_resolved_against_doc_dir() {
        let uploader = StubUploader::default();
        let out = run("![x](./img/a.png \"Fig\")", &uploader);

        assert_eq!(
            uploader.calls.lock()[0],
            SourceRef::Local(PathBuf::from("/notes/rust/img/a.png"))
        );
        assert_eq!(out.content, "![x](http://cdn.site/a.png \"Fig\")");
    }

    #[test]
    fn test_data_uri_skipped() {
        let uploader = StubUploader::default();
        let doc = "![x](data:image/png;base64,AAAA)";
        assert_eq!(run(doc, &uploader).content, doc);
        assert!(uploader.calls.lock().is_empty());
    }

    #[test]
    fn test_image_in_link_text() {
        let uploader = StubUploader::default();
        let out = run("[![b](http://a.com/b.svg)](http://a.com/b.svg)", &uploader);

        assert_eq!(uploader.calls.lock().len(), 1);
        // Global replace reaches the link target too; the result is hosted
        assert_eq!(out.content, "[![b](http://cdn.site/b.svg)](http://cdn.site/b.svg)");
        assert_eq!(out.links, 0);
    }

    #[test]
    fn test_links_left_alone() {
        let uploader = StubUploader::default();
        let doc = concat!(
            "[img](http://a.com/pic.jpg) ",
            "[rel](../other.md) ",
            "[mail](mailto:a@b.c) ",
            "[done](http://zshipu.com/t/index.html?url=http://e.com) ",
            "`[code](http://e.com)`\n",
            "```\n[fenced](http://e.com)\n```\n",
        );
        let out = run(doc, &uploader);
        assert_eq!(out.content, doc);
        assert_eq!(out.links, 0);
    }

    #[test]
    fn test_empty_redirect_base_disables_links() {
        let transformer = MarkdownTransformer::new(&RewriteConfig {
            redirect_base: String::new(),
            clean_code_html: true,
        });
        let doc = "[doc](http://example.com/p)";
        let out = transformer.transform(doc, Path::new("/"), &StubUploader::default(), &classifier());
        assert_eq!(out.content, doc);
    }

    #[test]
    fn test_code_html_cleaned() {
        let uploader = StubUploader::default();
        let out = run("intro\n```\n<b>x</b>\n```\n", &uploader);
        assert_eq!(out.content, "intro\n```\n**x**\n```\n");
        assert_eq!(out.code_blocks, 1);
    }

    #[test]
    fn test_code_cleanup_can_be_disabled() {
        let transformer = MarkdownTransformer::new(&RewriteConfig {
            clean_code_html: false,
            ..Default::default()
        });
        let doc = "```\n<b>x</b>\n```\n";
        let out = transformer.transform(doc, Path::new("/"), &StubUploader::default(), &classifier());
        assert_eq!(out.content, doc);
    }

    #[test]
    fn test_unchanged_document() {
        let uploader = StubUploader::default();
        let doc = "# Title\n\nJust words, `code`, and [local](./a.md).\n";
        let out = run(doc, &uploader);
        assert_eq!(out, Transformed {
            content: doc.to_owned(),
            ..Default::default()
        });
    }
}
