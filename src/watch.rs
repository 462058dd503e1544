//! File system watcher that feeds articles into the pipeline.
//!
//! ```text
//! notify ──▶ event loop ──▶ InFlightRegistry ──▶ worker thread
//!  events    (filter,        (at most one         (settle, wait until
//!            new dirs)        worker per path)     stable, process)
//! ```
//!
//! Every directory under the root is watched on its own, so directories
//! created later are registered as they appear. Workers are fire-and-forget;
//! the loop never waits for one to finish.

use crate::{
    config::{ArticleConfig, WatchConfig},
    debug, log,
    pipeline::{Pipeline, report},
    utils::path::{rel_path, wait_until_stable},
};
use anyhow::{Context, Result};
use notify::{
    Event, EventKind, RecursiveMode, Watcher,
    event::{CreateKind, ModifyKind},
};
use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
        mpsc::{self, RecvTimeoutError},
    },
    thread,
    time::Duration,
};
use walkdir::WalkDir;

/// How often the event loop checks for Ctrl+C while idle.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

// =============================================================================
// In-flight Registry
// =============================================================================

/// Paths currently owned by a worker.
#[derive(Default)]
pub struct InFlightRegistry {
    paths: Mutex<FxHashSet<PathBuf>>,
}

/// Proof of admission; releases the path when dropped.
pub struct InFlightGuard {
    registry: Arc<InFlightRegistry>,
    path: PathBuf,
}

impl InFlightRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Admit `path` unless a worker already owns it.
    pub fn try_admit(self: &Arc<Self>, path: &Path) -> Option<InFlightGuard> {
        if !self.paths.lock().insert(path.to_path_buf()) {
            return None;
        }
        Some(InFlightGuard {
            registry: Arc::clone(self),
            path: path.to_path_buf(),
        })
    }

    #[cfg(test)]
    pub fn contains(&self, path: &Path) -> bool {
        self.paths.lock().contains(path)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.paths.lock().len()
    }
}

impl InFlightGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.registry.paths.lock().remove(&self.path);
    }
}

// =============================================================================
// Event Filtering
// =============================================================================

/// Create, write and rename events; metadata-only changes are ignored.
const fn is_relevant(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_)
            | EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Name(_) | ModifyKind::Any)
    )
}

/// What an event asks the coordinator to do.
#[derive(Debug, Default, PartialEq, Eq)]
struct Targets {
    /// New directories to watch.
    dirs: Vec<PathBuf>,
    /// Articles to admit.
    files: Vec<PathBuf>,
}

fn targets_of(event: &Event, config: &WatchConfig) -> Targets {
    let mut targets = Targets::default();
    if !is_relevant(&event.kind) {
        return targets;
    }

    for path in &event.paths {
        // Vanished paths (the old side of a rename) fail here
        let Ok(meta) = fs::metadata(path) else {
            continue;
        };
        if meta.is_dir() {
            if matches!(event.kind, EventKind::Create(CreateKind::Folder | CreateKind::Any))
                || matches!(event.kind, EventKind::Modify(ModifyKind::Name(_)))
            {
                targets.dirs.push(path.clone());
            }
        } else if config.is_article(path) {
            targets.files.push(path.clone());
        }
    }
    targets
}

/// Directories at and below `dir`, skipping hidden ones.
fn dirs_under(dir: &Path) -> impl Iterator<Item = PathBuf> {
    WalkDir::new(dir)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir())
        .map(walkdir::DirEntry::into_path)
}

/// Articles at and below `dir`.
pub fn articles_under(dir: &Path, config: &WatchConfig) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && config.is_article(e.path()))
        .map(walkdir::DirEntry::into_path)
        .collect()
}

// =============================================================================
// Coordinator
// =============================================================================

pub struct WatchCoordinator {
    config: &'static ArticleConfig,
    pipeline: Arc<Pipeline>,
    registry: Arc<InFlightRegistry>,
}

impl WatchCoordinator {
    pub fn new(
        config: &'static ArticleConfig,
        pipeline: Arc<Pipeline>,
        registry: Arc<InFlightRegistry>,
    ) -> Self {
        Self {
            config,
            pipeline,
            registry,
        }
    }

    /// Watch the root until Ctrl+C. Failing to start watching is fatal.
    pub fn run(&self) -> Result<()> {
        let root = self.config.get_root();

        let (tx, rx) = mpsc::channel();
        let mut watcher = notify::recommended_watcher(tx).context("Failed to create file watcher")?;
        let count = self.register(&mut watcher, root)?;

        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        ctrlc::set_handler(move || {
            log!("watch"; "shutting down...");
            flag.store(false, Ordering::SeqCst);
        })
        .context("Failed to set Ctrl+C handler")?;

        log!("watch"; "watching {} ({count} directories)", root.display());

        while running.load(Ordering::SeqCst) {
            match rx.recv_timeout(POLL_INTERVAL) {
                Ok(Ok(event)) => self.handle_event(&mut watcher, &event),
                Ok(Err(e)) => log!("watch"; "error: {e}"),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        Ok(())
    }

    /// Watch `dir` and every directory below it. Returns how many were added.
    fn register(&self, watcher: &mut impl Watcher, dir: &Path) -> Result<usize> {
        let mut count = 0;
        for dir in dirs_under(dir) {
            watcher
                .watch(&dir, RecursiveMode::NonRecursive)
                .with_context(|| format!("Failed to watch {}", dir.display()))?;
            count += 1;
        }
        Ok(count)
    }

    fn handle_event(&self, watcher: &mut impl Watcher, event: &Event) {
        let Targets { dirs, mut files } = targets_of(event, &self.config.watch);

        for dir in dirs {
            let rel = rel_path(&dir, self.config.get_root());
            match self.register(watcher, &dir) {
                Ok(_) => {
                    debug!("watch"; "now watching {rel}/");
                    files.extend(articles_under(&dir, &self.config.watch));
                }
                Err(err) => log!("watch"; "{rel}: {err:#}"),
            }
        }

        for file in files {
            self.admit(file);
        }
    }

    /// Hand `path` to a worker thread unless one already owns it.
    pub fn admit(&self, path: PathBuf) -> bool {
        let Some(guard) = self.registry.try_admit(&path) else {
            debug!("watch"; "{} already in flight", path.display());
            return false;
        };

        let pipeline = Arc::clone(&self.pipeline);
        let config = self.config;
        let name = format!(
            "article:{}",
            path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default()
        );

        let spawned = thread::Builder::new()
            .name(name)
            .spawn(move || work(&pipeline, config, &guard));
        if let Err(err) = spawned {
            log!("error"; "cannot start worker for {}: {err}", path.display());
            return false;
        }
        true
    }
}

/// Body of one worker; the guard is released when it returns.
fn work(pipeline: &Pipeline, config: &ArticleConfig, guard: &InFlightGuard) {
    let path = guard.path();
    let root = config.get_root();

    thread::sleep(Duration::from_millis(config.watch.settle_ms));
    if let Err(err) = wait_until_stable(path, config.watch.stable_retries) {
        log!("watch"; "{}: {err:#}", rel_path(path, root));
        return;
    }

    report("watch", path, root, pipeline.process(path));
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::UploadConfig,
        pipeline::tests::{MemStore, pipeline_with},
        upload::{SourceRef, Upload, UploadError},
    };
    use notify::event::{DataChange, MetadataKind, RenameMode};
    use std::{
        sync::{Barrier, atomic::AtomicUsize},
        time::Instant,
    };

    fn event<P: AsRef<Path>>(kind: EventKind, paths: &[P]) -> Event {
        paths
            .iter()
            .fold(Event::new(kind), |e, p| e.add_path(p.as_ref().to_path_buf()))
    }

    #[test]
    fn test_try_admit_once() {
        let registry = InFlightRegistry::new();
        let path = Path::new("/n/a.md");

        let guard = registry.try_admit(path).unwrap();
        assert!(registry.try_admit(path).is_none());
        assert!(registry.contains(path));

        drop(guard);
        assert!(!registry.contains(path));
        assert!(registry.try_admit(path).is_some());
    }

    #[test]
    fn test_concurrent_admission_single_winner() {
        const THREADS: usize = 8;
        let registry = InFlightRegistry::new();
        let barrier = Arc::new(Barrier::new(THREADS));

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    // Keep the guard alive so losers see the path taken
                    let guard = registry.try_admit(Path::new("/n/same.md"));
                    barrier.wait();
                    guard.is_some()
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&won| won)
            .count();
        assert_eq!(winners, 1);
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_event_kinds() {
        assert!(is_relevant(&EventKind::Create(CreateKind::File)));
        assert!(is_relevant(&EventKind::Modify(ModifyKind::Data(DataChange::Content))));
        assert!(is_relevant(&EventKind::Modify(ModifyKind::Name(RenameMode::To))));
        assert!(!is_relevant(&EventKind::Modify(ModifyKind::Metadata(MetadataKind::Any))));
        assert!(!is_relevant(&EventKind::Access(notify::event::AccessKind::Any)));
    }

    #[test]
    fn test_targets_of_filters_files() {
        let dir = tempfile::tempdir().unwrap();
        let article = dir.path().join("a.md");
        let swap = dir.path().join(".~a.md");
        let image = dir.path().join("a.png");
        for p in [&article, &swap, &image] {
            fs::write(p, "x").unwrap();
        }
        let gone = dir.path().join("gone.md");
        let config = WatchConfig::default();

        let targets = targets_of(
            &event(
                EventKind::Modify(ModifyKind::Data(DataChange::Any)),
                &[&article, &swap, &image, &gone],
            ),
            &config,
        );
        assert_eq!(targets.files, vec![article.clone()]);
        assert!(targets.dirs.is_empty());

        let metadata_only = event(EventKind::Modify(ModifyKind::Metadata(MetadataKind::Any)), &[&article]);
        assert_eq!(targets_of(&metadata_only, &config), Targets::default());
    }

    #[test]
    fn test_new_directory_and_its_articles() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("new");
        fs::create_dir_all(sub.join("deeper")).unwrap();
        fs::write(sub.join("one.md"), "x").unwrap();
        fs::write(sub.join("deeper/two.md"), "x").unwrap();
        fs::write(sub.join("skip.txt"), "x").unwrap();

        let targets = targets_of(
            &event(EventKind::Create(CreateKind::Folder), &[&sub]),
            &WatchConfig::default(),
        );
        assert_eq!(targets.dirs, vec![sub.clone()]);

        let mut dirs: Vec<_> = dirs_under(&sub).collect();
        dirs.sort();
        assert_eq!(dirs, vec![sub.clone(), sub.join("deeper")]);

        let mut articles = articles_under(&sub, &WatchConfig::default());
        articles.sort();
        assert_eq!(articles, vec![sub.join("deeper/two.md"), sub.join("one.md")]);
    }

    /// Reports when an upload starts, then blocks until released.
    struct GateUploader {
        calls: AtomicUsize,
        entered: mpsc::Sender<()>,
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl Upload for GateUploader {
        fn upload(&self, _source: &SourceRef) -> Result<String, UploadError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.entered.send(()).ok();
            self.release.lock().recv().ok();
            Ok("http://cdn.site/i.png".into())
        }
    }

    #[test]
    fn test_coordinator_runs_one_worker_per_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.md");
        let doc = b"![x](http://a.com/i.png)\n";
        fs::write(&path, doc).unwrap();

        let mut config = ArticleConfig::default();
        config.set_root(dir.path());
        config.watch.settle_ms = 0;
        let config: &'static ArticleConfig = Box::leak(Box::new(config));

        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let uploader = Arc::new(GateUploader {
            calls: AtomicUsize::new(0),
            entered: entered_tx,
            release: Mutex::new(release_rx),
        });
        let store = Arc::new(MemStore::with(&path, doc));
        let pipeline = pipeline_with(store.clone(), false, &UploadConfig::default(), uploader.clone());
        let registry = InFlightRegistry::new();
        let coordinator = WatchCoordinator::new(config, Arc::new(pipeline), Arc::clone(&registry));

        assert!(coordinator.admit(path.clone()));
        entered_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("worker never reached the pipeline");

        // Still running: a second event for the same file is dropped
        assert!(!coordinator.admit(path.clone()));
        assert!(registry.contains(&path));

        release_tx.send(()).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while registry.contains(&path) {
            assert!(Instant::now() < deadline, "guard never released");
            thread::sleep(Duration::from_millis(10));
        }

        assert_eq!(registry.len(), 0);
        assert_eq!(uploader.calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.writes.load(Ordering::SeqCst), 1);
        let written = String::from_utf8(store.get(&path).unwrap()).unwrap();
        assert!(written.contains("![x](http://cdn.site/i.png)"));
    }
}
