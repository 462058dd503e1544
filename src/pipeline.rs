//! Per-article processing: front matter, rewrites, write-back, publish.
//!
//! The original bytes are kept as a snapshot. Nothing touches the file until
//! the new content is complete; if the write-back then fails, the snapshot
//! is written back verbatim. A result identical to the snapshot is never
//! written, so the watcher does not see its own no-op edits.

use crate::{
    classify::UrlClassifier,
    debug,
    front_matter::FrontMatterGenerator,
    log,
    markdown::MarkdownTransformer,
    publish::Publisher,
    upload::Upload,
    utils::path::rel_path,
};
use anyhow::{Context, Result};
use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

// ============================================================================
// Storage Seam
// ============================================================================

/// Where articles are read from and written to.
pub trait DocumentStore: Send + Sync {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;
    fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()>;
    fn remove(&self, path: &Path) -> io::Result<()>;
    fn exists(&self, path: &Path) -> bool;
}

/// The real filesystem.
pub struct FsStore;

impl DocumentStore for FsStore {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        fs::write(path, bytes)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

// ============================================================================
// Outcome
// ============================================================================

/// Counters of one rewrite, for logging.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    /// Title of freshly generated front matter.
    pub title: Option<String>,
    pub uploads: usize,
    pub links: usize,
    pub code_blocks: usize,
    pub failed: usize,
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts = Vec::new();
        if let Some(title) = &self.title {
            parts.push(format!("titled \"{title}\""));
        }
        for (count, what) in [
            (self.uploads, "images"),
            (self.links, "links"),
            (self.code_blocks, "code blocks"),
        ] {
            if count > 0 {
                parts.push(format!("{count} {what}"));
            }
        }
        if self.failed > 0 {
            parts.push(format!("{} uploads kept", self.failed));
        }
        if parts.is_empty() {
            return f.write_str("rewritten");
        }
        f.write_str(&parts.join(", "))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing to change; the file was not written.
    Unchanged,
    Rewritten(Summary),
    /// Rewritten, then moved to `to`.
    Published { summary: Summary, to: PathBuf },
}

// ============================================================================
// Pipeline
// ============================================================================

pub struct Pipeline {
    store: Arc<dyn DocumentStore>,
    front_matter: FrontMatterGenerator,
    transformer: MarkdownTransformer,
    uploader: Arc<dyn Upload>,
    classifier: Arc<UrlClassifier>,
    publisher: Option<Publisher>,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        front_matter: FrontMatterGenerator,
        transformer: MarkdownTransformer,
        uploader: Arc<dyn Upload>,
        classifier: Arc<UrlClassifier>,
        publisher: Option<Publisher>,
    ) -> Self {
        Self {
            store,
            front_matter,
            transformer,
            uploader,
            classifier,
            publisher,
        }
    }

    /// Run one article through every stage.
    ///
    /// On error the file on disk holds its original bytes.
    pub fn process(&self, path: &Path) -> Result<Outcome> {
        let snapshot = self
            .store
            .read(path)
            .with_context(|| format!("cannot read {}", path.display()))?;

        let Some((content, summary)) = self.rewrite(path, &snapshot)? else {
            return Ok(Outcome::Unchanged);
        };

        if let Err(err) = self.store.write(path, content.as_bytes()) {
            self.restore(path, &snapshot);
            return Err(err).with_context(|| format!("cannot write {}", path.display()));
        }

        if let (Some(publisher), Some(title)) = (&self.publisher, &summary.title) {
            match publisher.publish(path, title, &content) {
                Ok(Some(to)) => return Ok(Outcome::Published { summary, to }),
                Ok(None) => {}
                Err(err) => log!("publish"; "{}: {err:#}", path.display()),
            }
        }

        Ok(Outcome::Rewritten(summary))
    }

    /// New content, or `None` when it would equal the snapshot.
    fn rewrite(&self, path: &Path, snapshot: &[u8]) -> Result<Option<(String, Summary)>> {
        let doc = std::str::from_utf8(snapshot)
            .with_context(|| format!("{} is not valid UTF-8", path.display()))?;
        let doc_dir = path.parent().unwrap_or(Path::new("."));

        let (title, doc_with_meta) = self.front_matter.ensure_front_matter(doc, path)?;
        let transformed =
            self.transformer
                .transform(&doc_with_meta, doc_dir, self.uploader.as_ref(), &self.classifier);

        if transformed.content == doc {
            return Ok(None);
        }

        let summary = Summary {
            title,
            uploads: transformed.uploads,
            links: transformed.links,
            code_blocks: transformed.code_blocks,
            failed: transformed.failed.len(),
        };
        Ok(Some((transformed.content, summary)))
    }

    fn restore(&self, path: &Path, snapshot: &[u8]) {
        if let Err(err) = self.store.write(path, snapshot) {
            log!("error"; "cannot restore {}: {err}", path.display());
        }
    }
}

/// Log the result of [`Pipeline::process`] under `module`.
pub fn report(module: &str, path: &Path, root: &Path, result: Result<Outcome>) {
    let rel = rel_path(path, root);
    match result {
        Ok(Outcome::Unchanged) => debug!(module; "{rel}: unchanged"),
        Ok(Outcome::Rewritten(summary)) => log!(module; "{rel}: {summary}"),
        Ok(Outcome::Published { summary, to }) => {
            log!("publish"; "{rel} -> {}: {summary}", rel_path(&to, root));
        }
        Err(err) => log!("error"; "{rel}: {err:#}"),
    }
}

// ============================================================================
// Tests
// ============================================================================
