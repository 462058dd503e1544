//! Rename-after-publish: move a freshly titled article to `<title>.md`.

use crate::{
    config::PublishConfig,
    debug,
    pipeline::DocumentStore,
    utils::path::sanitize_file_name,
};
use anyhow::{Context, Result, bail};
use reqwest::blocking::{
    Client,
    multipart::{Form, Part},
};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

/// Form field carrying the published article.
const PUBLISH_FIELD: &str = "file";

/// Publish endpoint timeout.
const PUBLISH_TIMEOUT: Duration = Duration::from_secs(60);

pub struct Publisher {
    store: Arc<dyn DocumentStore>,
    remote: Option<(Client, String)>,
}

impl Publisher {
    pub fn new(config: &PublishConfig, store: Arc<dyn DocumentStore>) -> Result<Self> {
        let remote = match &config.endpoint {
            Some(endpoint) => {
                let client = Client::builder()
                    .timeout(PUBLISH_TIMEOUT)
                    .build()
                    .context("failed to build publish HTTP client")?;
                Some((client, endpoint.clone()))
            }
            None => None,
        };
        Ok(Self { store, remote })
    }

    /// File the article would be published as, next to `source`.
    pub fn target_for(source: &Path, title: &str) -> Option<PathBuf> {
        let stem = sanitize_file_name(title);
        if stem.is_empty() {
            return None;
        }
        let ext = source
            .extension()
            .map_or_else(|| "md".to_owned(), |e| e.to_string_lossy().into_owned());
        Some(source.with_file_name(format!("{stem}.{ext}")))
    }

    /// Write `content` to the title-derived file, post it, then drop `source`.
    ///
    /// Returns the new path, or `None` when publishing was skipped.
    pub fn publish(&self, source: &Path, title: &str, content: &str) -> Result<Option<PathBuf>> {
        let Some(target) = Self::target_for(source, title) else {
            return Ok(None);
        };
        if target == source || self.store.exists(&target) {
            debug!("publish"; "skipping {}: target exists", target.display());
            return Ok(None);
        }

        self.store
            .write(&target, content.as_bytes())
            .with_context(|| format!("cannot write {}", target.display()))?;

        if let Some((client, endpoint)) = &self.remote {
            let name = target
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let part = Part::bytes(content.as_bytes().to_vec()).file_name(name);
            let response = client
                .post(endpoint)
                .multipart(Form::new().part(PUBLISH_FIELD, part))
                .send()
                .with_context(|| format!("cannot post {}", target.display()))?;
            if !response.status().is_success() {
                bail!("publish endpoint answered {}", response.status());
            }
        }

        self.store
            .remove(source)
            .with_context(|| format!("cannot remove {}", source.display()))?;
        Ok(Some(target))
    }
}
