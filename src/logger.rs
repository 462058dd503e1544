//! Logging utilities with colored output and a scan progress line.
//!
//! This module provides:
//! - `log!` macro for formatted terminal output with colored prefixes
//! - `debug!` macro, silent unless `--verbose` was passed
//! - `ScanProgress` for the single progress line of the initial scan
//!
//! # Example
//!
//! ```ignore
//! log!("watch"; "admitted {}", path.display());
//! debug!("upload"; "staged {} bytes", len);
//!
//! let progress = ScanProgress::new("scan", files.len());
//! progress.inc();
//! progress.finish();
//! ```

use colored::{ColoredString, Colorize};
use crossterm::{
    cursor, execute,
    terminal::{Clear, ClearType, size},
};
use std::{
    io::{Write, stdout},
    sync::{
        Mutex, OnceLock,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

/// Cached terminal width (fetched once on first use)
static TERMINAL_WIDTH: OnceLock<u16> = OnceLock::new();

/// Whether a progress line currently occupies the last terminal row
static BAR_ACTIVE: AtomicBool = AtomicBool::new(false);

/// Debug output switch, set once from the CLI
static VERBOSE: AtomicBool = AtomicBool::new(false);

// ============================================================================
// Layout Constants
// ============================================================================
//
// Progress line format: "[scan] [████░░░░] 42/100"
//                        ^----^ ^-------^ ^----^
//                        prefix  bar       count

/// Length of brackets around module name: "[]"
const BRACKET_LEN: usize = 2;
/// Space after prefix: "[module] " <- this space
const SPACE_AFTER_PREFIX: usize = 1;
/// Bar wrapper: " []" (space + brackets around progress bar)
const BAR_WRAPPER_LEN: usize = 3;
/// Space before count: "...] 42/100" <- this space
const SPACE_BEFORE_COUNT: usize = 1;
const MIN_BAR_WIDTH: usize = 10;
const MAX_BAR_WIDTH: usize = 40;

/// Total prefix length for a module name: `[`, `]` and the trailing space.
#[inline]
const fn calc_prefix_len(module_len: usize) -> usize {
    module_len + BRACKET_LEN + SPACE_AFTER_PREFIX
}

/// Get terminal width, cached after first call.
/// Falls back to 120 columns if detection fails.
fn get_terminal_width() -> u16 {
    *TERMINAL_WIDTH.get_or_init(|| size().map(|(w, _)| w).unwrap_or(120))
}

/// Enable or disable `debug!` output.
pub fn set_verbose(verbose: bool) {
    VERBOSE.store(verbose, Ordering::Relaxed);
}

/// Whether `debug!` output is enabled.
#[inline]
pub fn is_verbose() -> bool {
    VERBOSE.load(Ordering::Relaxed)
}

// ============================================================================
// Log Macros
// ============================================================================

/// Log a message with a colored module prefix.
///
/// # Usage
/// ```ignore
/// log!("module"; "message with {} formatting", args);
/// ```
#[macro_export]
macro_rules! log {
    ($module:expr; $($arg:tt)*) => {{
        $crate::logger::log($module, &format!($($arg)*))
    }};
}

/// Like `log!`, but only printed when verbose output is enabled.
/// Arguments are not formatted at all otherwise.
#[macro_export]
macro_rules! debug {
    ($module:expr; $($arg:tt)*) => {{
        if $crate::logger::is_verbose() {
            $crate::logger::log($module, &format!($($arg)*))
        }
    }};
}

// ============================================================================
// Scan Progress
// ============================================================================

/// A single progress line for the initial scan.
///
/// The line lives on the last terminal row. Log lines printed while it is
/// active are written above it, and the bar is redrawn underneath.
pub struct ScanProgress {
    prefix: ColoredString,
    prefix_len: usize,
    total: usize,
    current: AtomicUsize,
    lock: Mutex<()>,
}

impl ScanProgress {
    /// Reserve a terminal line and draw an empty bar.
    pub fn new(module: &'static str, total: usize) -> Self {
        let mut out = stdout().lock();
        writeln!(out).ok();
        out.flush().ok();
        drop(out);

        BAR_ACTIVE.store(true, Ordering::SeqCst);

        let progress = Self {
            prefix: colorize_prefix(module, &module.to_ascii_lowercase()),
            prefix_len: calc_prefix_len(module.len()),
            total,
            current: AtomicUsize::new(0),
            lock: Mutex::new(()),
        };
        progress.display(0);
        progress
    }

    /// Count one finished file.
    pub fn inc(&self) {
        let current = self.current.fetch_add(1, Ordering::Relaxed) + 1;
        self.display(current);
    }

    fn display(&self, current: usize) {
        let _guard = self.lock.lock().ok();

        let width = get_terminal_width() as usize;
        let progress_text = format!("{}/{}", current, self.total);
        let overhead =
            self.prefix_len + BAR_WRAPPER_LEN + SPACE_BEFORE_COUNT + progress_text.len();
        let bar_width = width
            .saturating_sub(overhead)
            .clamp(MIN_BAR_WIDTH, MAX_BAR_WIDTH);

        let filled = if self.total > 0 {
            (current.min(self.total) * bar_width) / self.total
        } else {
            0
        };
        let bar: String = "█".repeat(filled) + &"░".repeat(bar_width - filled);

        let mut out = stdout().lock();
        execute!(out, cursor::MoveUp(1)).ok();
        execute!(out, Clear(ClearType::CurrentLine)).ok();
        writeln!(out, "{} [{}] {}", self.prefix, bar, progress_text).ok();
        out.flush().ok();
    }

    /// Clear the progress line.
    pub fn finish(&self) {
        if !BAR_ACTIVE.swap(false, Ordering::SeqCst) {
            return;
        }
        let _guard = self.lock.lock().ok();
        let mut out = stdout().lock();
        execute!(out, cursor::MoveUp(1)).ok();
        execute!(out, Clear(ClearType::CurrentLine)).ok();
        out.flush().ok();
    }
}

impl Drop for ScanProgress {
    fn drop(&mut self) {
        self.finish();
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Log a message with a colored module prefix.
///
/// Automatically truncates long single-line messages to fit terminal width.
#[inline]
pub fn log(module: &str, message: &str) {
    let module_lower = module.to_ascii_lowercase();
    let prefix = colorize_prefix(module, &module_lower);
    let width = get_terminal_width() as usize;

    let mut out = stdout().lock();

    let bar_active = BAR_ACTIVE.load(Ordering::SeqCst);
    if bar_active {
        execute!(out, cursor::MoveUp(1)).ok();
        execute!(out, Clear(ClearType::FromCursorDown)).ok();
    }

    if message.contains('\n') {
        writeln!(out, "{prefix} {message}").ok();
    } else {
        let max_msg_len = width.saturating_sub(calc_prefix_len(module.len()));
        writeln!(out, "{prefix} {}", truncate_str(message, max_msg_len)).ok();
    }

    // Leave an empty row for the bar to redraw into
    if bar_active {
        writeln!(out).ok();
    }

    out.flush().ok();
}

/// Apply color to a module prefix based on module type.
#[inline]
fn colorize_prefix(module: &str, module_lower: &str) -> ColoredString {
    let prefix = format!("[{module}]");
    match module_lower {
        "watch" | "scan" => prefix.bright_green().bold(),
        "upload" | "publish" => prefix.bright_blue().bold(),
        "tagger" | "meta" => prefix.bright_magenta().bold(),
        "error" => prefix.bright_red().bold(),
        _ => prefix.bright_yellow().bold(),
    }
}

/// Truncate a string to fit within `max_len` bytes on a UTF-8 boundary.
#[inline]
fn truncate_str(s: &str, max_len: usize) -> &str {
    if s.len() <= max_len {
        return s;
    }
    let mut end = max_len;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calc_prefix_len() {
        // "watch" -> "[watch] " = 5 + 2 + 1
        assert_eq!(calc_prefix_len(5), 8);
        assert_eq!(calc_prefix_len(0), 3);
    }

    #[test]
    fn test_truncate_str_short_string() {
        assert_eq!(truncate_str("hello", 10), "hello");
        assert_eq!(truncate_str("hello", 5), "hello");
    }

    #[test]
    fn test_truncate_str_needs_truncation() {
        assert_eq!(truncate_str("hello world", 5), "hello");
        assert_eq!(truncate_str("hello", 0), "");
    }

    #[test]
    fn test_truncate_str_unicode_boundary() {
        // "知识" is 6 bytes, 3 per char
        assert_eq!(truncate_str("知识", 4), "知");
        assert_eq!(truncate_str("知识", 2), "");
        assert_eq!(truncate_str("a知b", 4), "a知");
    }

    #[test]
    fn test_verbose_toggle() {
        set_verbose(true);
        assert!(is_verbose());
        set_verbose(false);
        assert!(!is_verbose());
    }

    #[test]
    fn test_bar_width_constraints() {
        assert!(MIN_BAR_WIDTH < MAX_BAR_WIDTH);
    }
}
