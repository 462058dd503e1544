//! One-shot pass over every article already under the root.

use crate::{
    config::ArticleConfig,
    log,
    logger::ScanProgress,
    pipeline::{Pipeline, report},
    watch::{InFlightRegistry, articles_under},
};
use rayon::prelude::*;
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

/// Counts of a finished scan.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanStats {
    pub total: usize,
    pub processed: usize,
    /// Files a watcher worker owned at the time.
    pub skipped: usize,
}

/// Run every article through `pipeline` in parallel.
pub fn scan_existing(
    config: &ArticleConfig,
    pipeline: &Pipeline,
    registry: &Arc<InFlightRegistry>,
) -> ScanStats {
    let root = config.get_root();
    let files = articles_under(root, &config.watch);
    if files.is_empty() {
        log!("scan"; "no articles under {}", root.display());
        return ScanStats::default();
    }

    let skipped = AtomicUsize::new(0);
    let progress = ScanProgress::new("scan", files.len());

    files.par_iter().for_each(|path| {
        match registry.try_admit(path) {
            Some(_guard) => report("scan", path, root, pipeline.process(path)),
            None => {
                skipped.fetch_add(1, Ordering::Relaxed);
            }
        }
        progress.inc();
    });
    progress.finish();

    let stats = ScanStats {
        total: files.len(),
        processed: files.len() - skipped.load(Ordering::Relaxed),
        skipped: skipped.into_inner(),
    };
    log!("scan"; "{} articles checked", stats.processed);
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{FsStore, tests::pipeline};
    use std::{fs, path::PathBuf};

    fn config(root: &std::path::Path) -> ArticleConfig {
        let mut config = ArticleConfig::default();
        config.set_root(root);
        config
    }

    #[test]
    fn test_scan_rewrites_articles() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("rust")).unwrap();
        let article = dir.path().join("rust/Intro.md");
        fs::write(&article, "hello\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "untouched").unwrap();
        fs::write(dir.path().join(".~Intro.md"), "swap").unwrap();

        let pipeline = pipeline(Arc::new(FsStore), false);
        let stats = scan_existing(&config(dir.path()), &pipeline, &InFlightRegistry::new());

        assert_eq!(stats, ScanStats { total: 1, processed: 1, skipped: 0 });
        assert!(fs::read_to_string(&article).unwrap().starts_with("---\ntitle: Intro\n"));
        assert_eq!(fs::read_to_string(dir.path().join(".~Intro.md")).unwrap(), "swap");
    }

    #[test]
    fn test_scan_skips_files_in_flight() {
        let dir = tempfile::tempdir().unwrap();
        let busy: PathBuf = dir.path().join("busy.md");
        fs::write(&busy, "hello\n").unwrap();

        let registry = InFlightRegistry::new();
        let _held = registry.try_admit(&busy).unwrap();

        let pipeline = pipeline(Arc::new(FsStore), false);
        let stats = scan_existing(&config(dir.path()), &pipeline, &registry);

        assert_eq!(stats.skipped, 1);
        assert_eq!(fs::read_to_string(&busy).unwrap(), "hello\n");
    }
}
