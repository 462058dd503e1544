//! Path helpers shared by the uploader, the front matter generator and the watcher.

use anyhow::{Result, bail};
use std::{
    fs,
    path::{Path, PathBuf},
    thread,
    time::Duration,
};

/// Drop a markdown title from a link target: `img.png "Figure 1"` → `img.png`.
pub fn strip_title(reference: &str) -> &str {
    let reference = reference.trim();
    reference
        .split_once([' ', '\t', '\n'])
        .map_or(reference, |(target, _)| target)
        .trim_start_matches('<')
        .trim_end_matches('>')
}

/// Resolve a local image reference against the article's directory.
///
/// Absolute paths are kept. Otherwise everything up to and including the last
/// `../` is dropped, a leading `./` is stripped, and the rest is joined onto
/// `doc_dir`.
///
/// `../../assets/a.png` in `/notes/rust` → `/notes/rust/assets/a.png`
pub fn resolve_local(reference: &str, doc_dir: &Path) -> PathBuf {
    let reference = strip_title(reference);
    let path = Path::new(reference);
    if path.is_absolute() {
        return path.to_path_buf();
    }

    let tail = reference
        .rfind("../")
        .map_or(reference, |index| &reference[index + 3..]);
    let tail = tail.trim_start_matches("./").trim_start_matches('/');
    doc_dir.join(tail)
}

/// Tags from the directories holding `path`: grandparent first, then parent.
///
/// `/notes/rust/async/tokio.md` → `["rust", "async"]`
pub fn tags_from_path(path: &Path) -> Vec<String> {
    let dir_name = |p: Option<&Path>| {
        p.and_then(Path::file_name)
            .and_then(|n| n.to_str())
            .filter(|n| !n.is_empty())
            .map(str::to_owned)
    };

    let parent = path.parent();
    let grandparent = parent.and_then(Path::parent);
    [dir_name(grandparent), dir_name(parent)]
        .into_iter()
        .flatten()
        .collect()
}

/// Characters never allowed in a generated file name.
const FORBIDDEN_NAME_CHARS: &[char] = &[
    '<', '>', ':', '|', '?', '*', '#', '\\', '(', ')', '[', ']', '"', '/',
];

/// Turn a title into something safe to use as a file stem.
pub fn sanitize_file_name(title: &str) -> String {
    title
        .chars()
        .filter(|c| !c.is_control() && !FORBIDDEN_NAME_CHARS.contains(c))
        .collect::<String>()
        .trim()
        .to_owned()
}

/// Wait for file to stop being written to
pub fn wait_until_stable(path: &Path, max_retries: usize) -> Result<()> {
    const POLL_INTERVAL: Duration = Duration::from_millis(50);

    let mut last_size = fs::metadata(path)?.len();

    for _ in 0..max_retries {
        thread::sleep(POLL_INTERVAL);
        let current_size = fs::metadata(path)?.len();
        if current_size == last_size {
            return Ok(());
        }
        last_size = current_size;
    }

    bail!("File did not stabilize after {max_retries} retries")
}

/// Format path relative to root for log display.
pub fn rel_path(path: &Path, root: &Path) -> String {
    path.strip_prefix(root).unwrap_or(path).display().to_string()
}
