//! URL classification: already hosted, image, or plain link.
//!
//! Extensions decide when present. A remote URL without one is probed by
//! reading a handful of leading bytes and matching them against the
//! configured signature table. Probe failures mean "not an image".
//!
//! The upload endpoint's own host always counts as hosted, so locators
//! written on one pass are left alone on the next.

use crate::{
    config::{ClassifyConfig, Signature, UploadConfig},
    debug,
    utils::{http::Fetch, path::strip_title},
};
use rustc_hash::FxHashSet;
use std::{collections::BTreeMap, path::Path, sync::Arc};
use url::Url;

/// What a URL is, as far as rewriting goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlKind {
    /// Points at the hosting service already. Never touched.
    AlreadyHosted,
    /// Image that should be re-hosted.
    Image,
    /// Ordinary link target.
    Plain,
}

pub struct UrlClassifier {
    hosted_markers: Vec<String>,
    format_params: BTreeMap<String, String>,
    image_exts: FxHashSet<String>,
    signatures: Vec<Signature>,
    signatures_version: String,
    probe_limit: usize,
    fetcher: Arc<dyn Fetch>,
}

impl UrlClassifier {
    pub fn new(upload: &UploadConfig, classify: &ClassifyConfig, fetcher: Arc<dyn Fetch>) -> Self {
        let mut hosted_markers = upload.hosted_markers.clone();
        if let Some(host) = upload
            .endpoint
            .as_deref()
            .and_then(|endpoint| Url::parse(endpoint).ok())
            .and_then(|endpoint| endpoint.host_str().map(str::to_owned))
            && !hosted_markers.contains(&host)
        {
            hosted_markers.push(host);
        }

        Self {
            hosted_markers,
            format_params: upload.format_params.clone(),
            image_exts: classify
                .image_extensions
                .iter()
                .map(|e| e.to_ascii_lowercase())
                .collect(),
            signatures: classify.signatures.clone(),
            signatures_version: classify.signatures_version.clone(),
            probe_limit: classify.probe_bytes,
            fetcher,
        }
    }

    pub fn classify(&self, url: &str) -> UrlKind {
        let url = strip_title(url);
        if self.is_hosted(url) {
            return UrlKind::AlreadyHosted;
        }
        if self.is_image(url) {
            UrlKind::Image
        } else {
            UrlKind::Plain
        }
    }

    /// Whether `url` carries one of the hosting markers.
    pub fn is_hosted(&self, url: &str) -> bool {
        self.hosted_markers
            .iter()
            .any(|marker| !marker.is_empty() && url.contains(marker.as_str()))
    }

    fn is_image(&self, url: &str) -> bool {
        if url.starts_with("data:image/") {
            return true;
        }
        if let Some(ext) = self.declared_format(url).or_else(|| extension_of(url)) {
            return self.image_exts.contains(&ext);
        }
        if !is_remote(url) {
            return false;
        }

        match self.fetcher.fetch_head(url, self.probe_limit) {
            Ok(head) => {
                let found = self.probe_bytes(&head);
                debug!(
                    "classify";
                    "probed {url} with signatures v{}: {}",
                    self.signatures_version,
                    found.unwrap_or("no signature")
                );
                found.is_some()
            }
            Err(err) => {
                debug!("classify"; "probe failed, treating as link: {err}");
                false
            }
        }
    }

    pub fn signatures_version(&self) -> &str {
        &self.signatures_version
    }

    /// Extension whose signature matches the leading `bytes`, first match wins.
    pub fn probe_bytes(&self, bytes: &[u8]) -> Option<&str> {
        self.signatures
            .iter()
            .find(|signature| signature.matches(bytes))
            .map(|signature| signature.ext.as_str())
    }

    /// Format named in a query parameter of a known CDN, e.g. `?wx_fmt=png`.
    pub fn declared_format(&self, url: &str) -> Option<String> {
        let (_, param) = self
            .format_params
            .iter()
            .find(|(marker, _)| url.contains(marker.as_str()))?;
        let parsed = Url::parse(url).ok()?;
        parsed
            .query_pairs()
            .find(|(key, _)| key == param.as_str())
            .map(|(_, value)| value.to_ascii_lowercase())
            .filter(|value| !value.is_empty())
    }
}

/// `http://` or `https://`, any case.
pub fn is_remote(url: &str) -> bool {
    let lower = url.get(..8).unwrap_or(url).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Lowercase extension of the URL path, ignoring query and fragment.
pub fn extension_of(url: &str) -> Option<String> {
    let path = if is_remote(url) {
        Url::parse(url).ok()?.path().to_owned()
    } else {
        url.split(['?', '#']).next().unwrap_or(url).to_owned()
    };
    Path::new(&path)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .map(str::to_ascii_lowercase)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::http::FetchError;
    use parking_lot::Mutex;
    use reqwest::StatusCode;

    /// Serves fixed leading bytes and records what was asked for.
    #[derive(Default)]
    struct StubFetch {
        head: Option<Vec<u8>>,
        requests: Mutex<Vec<(String, usize)>>,
    }

    impl StubFetch {
        fn serving(bytes: &[u8]) -> Self {
            Self {
                head: Some(bytes.to_vec()),
                ..Default::default()
            }
        }
    }

    impl Fetch for StubFetch {
        fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
            self.fetch_head(url, usize::MAX)
        }

        fn fetch_head(&self, url: &str, limit: usize) -> Result<Vec<u8>, FetchError> {
            self.requests.lock().push((url.to_owned(), limit));
            match &self.head {
                Some(bytes) => Ok(bytes.iter().copied().take(limit).collect()),
                None => Err(FetchError::Status {
                    url: url.to_owned(),
                    status: StatusCode::NOT_FOUND,
                }),
            }
        }
    }

    fn classifier(fetch: Arc<StubFetch>) -> UrlClassifier {
        UrlClassifier::new(&UploadConfig::default(), &ClassifyConfig::default(), fetch)
    }

    #[test]
    fn test_hosted_marker_wins() {
        let fetch = Arc::new(StubFetch::default());
        let classifier = classifier(fetch.clone());
        assert_eq!(
            classifier.classify("https://cdn.jsdelivr.net/gh/a/b.png"),
            UrlKind::AlreadyHosted
        );
        assert!(fetch.requests.lock().is_empty());
    }

    #[test]
    fn test_endpoint_host_counts_as_hosted() {
        let upload = UploadConfig {
            endpoint: Some("https://img.example.com/upload".into()),
            ..Default::default()
        };
        let fetch = Arc::new(StubFetch::default());
        let classifier = UrlClassifier::new(&upload, &ClassifyConfig::default(), fetch.clone());

        assert!(classifier.is_hosted("https://img.example.com/files/1.png"));
        assert_eq!(
            classifier.classify("https://img.example.com/files/1"),
            UrlKind::AlreadyHosted
        );
        assert!(!classifier.is_hosted("https://example.com/files/1.png"));
        assert!(fetch.requests.lock().is_empty());
    }

    #[test]
    fn test_signatures_version_kept() {
        let classify = ClassifyConfig {
            signatures_version: "site-7".into(),
            ..Default::default()
        };
        let classifier =
            UrlClassifier::new(&UploadConfig::default(), &classify, Arc::new(StubFetch::default()));
        assert_eq!(classifier.signatures_version(), "site-7");
    }

    #[test]
    fn test_extension_decides_without_probe() {
        let fetch = Arc::new(StubFetch::serving(b"\x89PNG\r\n\x1a\n"));
        let classifier = classifier(fetch.clone());

        assert_eq!(classifier.classify("http://a.com/i.PNG?x=1"), UrlKind::Image);
        assert_eq!(classifier.classify("http://a.com/page.html"), UrlKind::Plain);
        assert_eq!(classifier.classify("img/local.jpg \"title\""), UrlKind::Image);
        assert!(fetch.requests.lock().is_empty());
    }

    #[test]
    fn test_probe_for_extensionless_remote() {
        let fetch = Arc::new(StubFetch::serving(b"GIF89a\x01\x00\x01\x00\x00\x00\x00\x00\x00\x00\x00\x00"));
        let classifier = classifier(fetch.clone());

        assert_eq!(classifier.classify("http://a.com/render/42"), UrlKind::Image);
        let requests = fetch.requests.lock();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].1, 16);
    }

    #[test]
    fn test_probe_failure_is_plain() {
        let classifier = classifier(Arc::new(StubFetch::default()));
        assert_eq!(classifier.classify("http://example.com/p"), UrlKind::Plain);
    }

    #[test]
    fn test_local_never_probed() {
        let fetch = Arc::new(StubFetch::serving(b"\x89PNG\r\n\x1a\n"));
        let classifier = classifier(fetch.clone());
        assert_eq!(classifier.classify("img/diagram"), UrlKind::Plain);
        assert!(fetch.requests.lock().is_empty());
    }

    #[test]
    fn test_declared_format() {
        let classifier = classifier(Arc::new(StubFetch::default()));
        let url = "https://mmbiz.qpic.cn/mmbiz_png/abc/640?wx_fmt=PNG&from=appmsg";
        assert_eq!(classifier.declared_format(url).as_deref(), Some("png"));
        assert_eq!(classifier.classify(url), UrlKind::Image);
        assert_eq!(classifier.declared_format("https://a.com/x?wx_fmt=png"), None);
    }

    #[test]
    fn test_probe_bytes() {
        let classifier = classifier(Arc::new(StubFetch::default()));
        assert_eq!(classifier.probe_bytes(b"\xFF\xD8\xFF\xE0"), Some("jpg"));
        assert_eq!(classifier.probe_bytes(b"RIFF\0\0\0\0WEBPVP8 "), Some("webp"));
        assert_eq!(classifier.probe_bytes(b"<html>"), None);
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("http://a.com/x/y.JPeG#frag").as_deref(), Some("jpeg"));
        assert_eq!(extension_of("http://a.com/x/"), None);
        assert_eq!(extension_of("./img/a.png?v=2").as_deref(), Some("png"));
        assert_eq!(extension_of("http://a.com"), None);
    }

    #[test]
    fn test_is_remote() {
        assert!(is_remote("HTTPS://a.com"));
        assert!(is_remote("http://a.com"));
        assert!(!is_remote("ftp://a.com"));
        assert!(!is_remote("img/a.png"));
    }
}
