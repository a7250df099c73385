//! Transfer progress display
//!
//! Two indicatif bars (files and bytes) under a spinner naming the entry in
//! flight. The engine announces the plan once with [`ProgressReporter::begin`]
//! and then reports every entry's start and outcome; counters are atomics
//! so rayon workers report without locking.

use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Trailing path components shown next to the spinner
const SHOWN_COMPONENTS: usize = 3;

const FILES_TEMPLATE: &str = "{prefix:.bold.dim} [{bar:40.cyan/blue}] {pos}/{len} {msg}";
const BYTES_TEMPLATE: &str =
    "{prefix:.bold.dim} [{bar:40.green/white}] {bytes}/{total_bytes} ({bytes_per_sec}, ETA {eta})";

/// How one entry ended, as far as the display cares
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryProgress {
    /// Written, with the bytes it took
    Copied(u64),
    /// Left alone by the conflict policy
    Skipped,
    /// Gave up
    Failed,
}

#[derive(Default)]
struct Counters {
    total_files: AtomicU64,
    total_bytes: AtomicU64,
    copied: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
    bytes: AtomicU64,
}

/// Progress display fed by a [`TransferEngine`](crate::core::TransferEngine)
pub struct ProgressReporter {
    multi: MultiProgress,
    current: ProgressBar,
    files: ProgressBar,
    bytes: ProgressBar,
    counters: Counters,
    started: Instant,
    visible: AtomicBool,
}

fn bar(multi: &MultiProgress, template: &str, prefix: &'static str) -> ProgressBar {
    let bar = multi.add(ProgressBar::new(0));
    bar.set_style(
        ProgressStyle::default_bar()
            .template(template)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    bar.set_prefix(prefix);
    bar
}

/// Last few components of `path`, prefixed with `…` when shortened
fn short_name(path: &Path) -> String {
    let parts: Vec<_> = path.components().collect();
    if parts.len() <= SHOWN_COMPONENTS {
        return path.display().to_string();
    }
    let tail: PathBuf = parts[parts.len() - SHOWN_COMPONENTS..].iter().collect();
    format!("…/{}", tail.display())
}

impl ProgressReporter {
    /// Reporter drawing to stderr
    pub fn new() -> Self {
        let multi = MultiProgress::new();

        let current = multi.add(ProgressBar::new_spinner());
        current.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        let files = bar(&multi, FILES_TEMPLATE, "Files");
        let bytes = bar(&multi, BYTES_TEMPLATE, "Data ");

        Self {
            multi,
            current,
            files,
            bytes,
            counters: Counters::default(),
            started: Instant::now(),
            visible: AtomicBool::new(true),
        }
    }

    /// Reporter that counts without drawing (quiet mode, JSON output)
    pub fn disabled() -> Self {
        let reporter = Self::new();
        reporter.multi.set_draw_target(ProgressDrawTarget::hidden());
        reporter.visible.store(false, Ordering::Relaxed);
        reporter
    }

    /// Whether anything is drawn
    pub fn is_visible(&self) -> bool {
        self.visible.load(Ordering::Relaxed)
    }

    /// Announce the planned work
    pub fn begin(&self, files: u64, bytes: u64) {
        self.counters.total_files.store(files, Ordering::Relaxed);
        self.counters.total_bytes.store(bytes, Ordering::Relaxed);
        self.files.set_length(files);
        self.bytes.set_length(bytes);
    }

    /// An entry left the queue
    pub fn entry_started(&self, source: &Path) {
        self.current.set_message(short_name(source));
        self.current.tick();
    }

    /// An entry reached a terminal state
    pub fn entry_finished(&self, outcome: EntryProgress) {
        let c = &self.counters;
        match outcome {
            EntryProgress::Copied(n) => {
                c.copied.fetch_add(1, Ordering::Relaxed);
                c.bytes.fetch_add(n, Ordering::Relaxed);
                self.bytes.inc(n);
            }
            EntryProgress::Skipped => {
                c.skipped.fetch_add(1, Ordering::Relaxed);
            }
            EntryProgress::Failed => {
                c.failed.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.files.inc(1);

        let skipped = c.skipped.load(Ordering::Relaxed);
        let failed = c.failed.load(Ordering::Relaxed);
        if skipped + failed > 0 {
            self.files
                .set_message(format!("({} skipped, {} failed)", skipped, failed));
        }
    }

    /// Stop drawing, leaving a final line
    pub fn finish(&self, success: bool, message: &str) {
        if success {
            self.current
                .finish_with_message(format!("{} {}", style("✓").green(), message));
            self.files.finish();
            self.bytes.finish();
        } else {
            self.current
                .finish_with_message(format!("{} {}", style("✗").red(), message));
            self.files.abandon();
            self.bytes.abandon();
        }
    }

    /// Snapshot of the counters
    pub fn summary(&self) -> ProgressSummary {
        let c = &self.counters;
        let elapsed = self.started.elapsed();
        let bytes_copied = c.bytes.load(Ordering::Relaxed);
        let secs = elapsed.as_secs_f64();
        ProgressSummary {
            total_files: c.total_files.load(Ordering::Relaxed),
            total_bytes: c.total_bytes.load(Ordering::Relaxed),
            files_copied: c.copied.load(Ordering::Relaxed),
            files_skipped: c.skipped.load(Ordering::Relaxed),
            files_failed: c.failed.load(Ordering::Relaxed),
            bytes_copied,
            elapsed,
            throughput: if secs > 0.0 { bytes_copied as f64 / secs } else { 0.0 },
        }
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("visible", &self.is_visible())
            .field("summary", &self.summary())
            .finish()
    }
}

/// Counters at one point in time
#[derive(Debug, Clone, Serialize)]
pub struct ProgressSummary {
    /// Entries planned
    pub total_files: u64,
    /// Bytes planned
    pub total_bytes: u64,
    /// Entries written
    pub files_copied: u64,
    /// Entries left alone by the conflict policy
    pub files_skipped: u64,
    /// Entries that failed
    pub files_failed: u64,
    /// Bytes written
    pub bytes_copied: u64,
    /// Time since the reporter was created
    pub elapsed: Duration,
    /// Bytes/second
    pub throughput: f64,
}

impl ProgressSummary {
    /// Entries in a terminal state
    pub fn files_done(&self) -> u64 {
        self.files_copied + self.files_skipped + self.files_failed
    }

    /// Completion by entries, 100 for an empty plan
    pub fn percentage(&self) -> f64 {
        if self.total_files == 0 {
            100.0
        } else {
            self.files_done() as f64 * 100.0 / self.total_files as f64
        }
    }
}

impl fmt::Display for ProgressSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} files ({} skipped, {} failed), {} in {} ({}/s)",
            self.files_done(),
            self.total_files,
            self.files_skipped,
            self.files_failed,
            humansize::format_size(self.bytes_copied, humansize::BINARY),
            humantime::format_duration(Duration::from_millis(self.elapsed.as_millis() as u64)),
            humansize::format_size(self.throughput as u64, humansize::BINARY)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_by_outcome() {
        let reporter = ProgressReporter::disabled();
        assert!(!reporter.is_visible());
        reporter.begin(4, 1000);

        reporter.entry_started(Path::new("a"));
        reporter.entry_finished(EntryProgress::Copied(600));
        reporter.entry_finished(EntryProgress::Skipped);
        reporter.entry_finished(EntryProgress::Failed);

        let summary = reporter.summary();
        assert_eq!(summary.files_copied, 1);
        assert_eq!(summary.files_skipped, 1);
        assert_eq!(summary.files_failed, 1);
        assert_eq!(summary.bytes_copied, 600);
        assert_eq!(summary.files_done(), 3);
        assert_eq!(summary.percentage(), 75.0);
        assert!(summary.to_string().starts_with("3/4 files (1 skipped, 1 failed)"));
    }

    #[test]
    fn test_empty_plan_is_complete() {
        let reporter = ProgressReporter::disabled();
        reporter.begin(0, 0);
        assert_eq!(reporter.summary().percentage(), 100.0);
    }

    #[test]
    fn test_short_name() {
        assert_eq!(short_name(Path::new("a/b")), "a/b");
        let shown = short_name(Path::new("/very/deep/tree/of/files/x.txt"));
        assert!(shown.starts_with('…'));
        assert!(shown.ends_with("x.txt"));
        assert!(shown.contains("files"));
    }
}
