//! Transfer orchestrator
//!
//! Drives single files and whole trees through resolution, space checks,
//! the streaming copy, metadata application and optional verification.
//! Every file runs through the [`EntryState`] machine; trees aggregate the
//! per-file outcomes into one [`TransferResult`].

use crate::config::{ConflictPolicy, PathStyle, TransferConfig};
use crate::core::{ClaimGuard, DestinationClaims};
use crate::error::{ErrorKind, FilekitError, IoResultExt, Result};
use crate::fs::{
    collect_file_metadata_with, create_directory_structure, create_symlink, discard_partial,
    is_hidden, is_same_file, AppliedReport, FileCopier, MetadataApplier, PatternFilter,
};
use crate::hash::{hash_file_with_buffer, Hasher};
use crate::path::{ensure_unique_path, HostCapabilities, PathResolver, PlatformCapabilities};
use crate::progress::{EntryProgress, ProgressReporter};
use crate::system::ensure_disk_space;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf, Prefix};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};
use walkdir::WalkDir;

/// Lifecycle of one file inside a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryState {
    /// Not started
    Pending,
    /// Conflict policy and destination claim
    Resolving,
    /// Space confirmed, destination claimed
    SpaceChecked,
    /// Bytes in flight
    Copying,
    /// Metadata applied (or not requested)
    MetadataApplied,
    /// Re-reading the destination
    Verifying,
    /// Finished, including skips
    Done,
    /// Gave up
    Failed,
}

impl EntryState {
    /// No further transitions possible
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Whether `next` may follow `self`
    pub fn can_advance_to(self, next: EntryState) -> bool {
        use EntryState::*;
        match (self, next) {
            (Done | Failed, _) => false,
            (_, Failed) => true,
            (Pending, Resolving)
            | (Resolving, SpaceChecked)
            | (Resolving, Done)
            | (SpaceChecked, Copying)
            | (Copying, MetadataApplied)
            | (MetadataApplied, Verifying)
            | (MetadataApplied, Done)
            | (Verifying, Done) => true,
            _ => false,
        }
    }
}

struct EntryTracker<'a> {
    source: &'a Path,
    state: EntryState,
}

impl<'a> EntryTracker<'a> {
    fn new(source: &'a Path) -> Self {
        Self {
            source,
            state: EntryState::Pending,
        }
    }

    fn advance(&mut self, next: EntryState) -> Result<()> {
        if !self.state.can_advance_to(next) {
            return Err(FilekitError::config(format!(
                "invalid transfer state change for {}: {:?} -> {:?}",
                self.source.display(),
                self.state,
                next
            )));
        }
        trace!("{}: {:?} -> {:?}", self.source.display(), self.state, next);
        self.state = next;
        Ok(())
    }

    fn fail(&mut self, error: &FilekitError) {
        if !self.state.is_terminal() {
            trace!(
                "{}: {:?} -> Failed ({})",
                self.source.display(),
                self.state,
                error
            );
            self.state = EntryState::Failed;
        }
    }
}

/// Why one file of a transfer failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferFailure {
    /// Error classification
    pub kind: ErrorKind,
    /// Human-readable message
    pub message: String,
}

impl From<&FilekitError> for TransferFailure {
    fn from(error: &FilekitError) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

/// Outcome of a copy or move
#[derive(Debug, Clone, Serialize)]
pub struct TransferResult {
    copied: Vec<PathBuf>,
    skipped: Vec<PathBuf>,
    failed: BTreeMap<PathBuf, TransferFailure>,
    verified: Option<bool>,
    dereferenced: Vec<PathBuf>,
    destinations: BTreeMap<PathBuf, PathBuf>,
    metadata_reports: BTreeMap<PathBuf, AppliedReport>,
    bytes_copied: u64,
    duration: Duration,
    cancelled: bool,
}

impl TransferResult {
    /// Sources written to their destination
    pub fn copied(&self) -> &[PathBuf] {
        &self.copied
    }

    /// Sources left alone by the conflict policy
    pub fn skipped(&self) -> &[PathBuf] {
        &self.skipped
    }

    /// Failed sources
    pub fn failed(&self) -> &BTreeMap<PathBuf, TransferFailure> {
        &self.failed
    }

    /// `None` when no file was hashed, otherwise whether every hashed file matched
    pub fn verified(&self) -> Option<bool> {
        self.verified
    }

    /// Links written as a copy of their target's content
    ///
    /// The destination could not hold a symbolic link.
    pub fn dereferenced(&self) -> &[PathBuf] {
        &self.dereferenced
    }

    /// Source to final destination, including renamed and skipped files
    pub fn destinations(&self) -> &BTreeMap<PathBuf, PathBuf> {
        &self.destinations
    }

    /// Final destination of `source`
    pub fn destination_of(&self, source: &Path) -> Option<&Path> {
        self.destinations.get(source).map(PathBuf::as_path)
    }

    /// Metadata application reports keyed by source
    pub fn metadata_reports(&self) -> &BTreeMap<PathBuf, AppliedReport> {
        &self.metadata_reports
    }

    /// Bytes written
    pub fn bytes_copied(&self) -> u64 {
        self.bytes_copied
    }

    /// Wall time
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Stopped early by [`TransferEngine::cancel`]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Average throughput in bytes/second
    pub fn throughput(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.bytes_copied as f64 / secs
        } else {
            0.0
        }
    }

    /// Nothing failed, nothing mismatched and the run was not cancelled
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && !self.cancelled && self.verified != Some(false)
    }

    /// Print summary to console
    pub fn print_summary(&self) {
        println!("\n=== Transfer Summary ===");
        println!("Files copied:    {}", self.copied.len());
        println!("Files skipped:   {}", self.skipped.len());
        println!("Bytes copied:    {}", humansize::format_size(self.bytes_copied, humansize::BINARY));
        println!(
            "Duration:        {}",
            humantime::format_duration(Duration::from_millis(self.duration.as_millis() as u64))
        );
        println!("Throughput:      {}/s", humansize::format_size(self.throughput() as u64, humansize::BINARY));
        match self.verified {
            Some(true) => println!("Verification:    passed"),
            Some(false) => println!("Verification:    FAILED"),
            None => {}
        }
        if !self.dereferenced.is_empty() {
            println!("Links copied as files: {}", self.dereferenced.len());
        }
        if self.cancelled {
            println!("Cancelled before completion");
        }

        let warnings: Vec<_> = self
            .metadata_reports
            .values()
            .flat_map(AppliedReport::warnings)
            .collect();
        if !warnings.is_empty() {
            println!("\nMetadata warnings: {}", warnings.len());
            for warning in &warnings {
                println!("  {}", warning);
            }
        }

        if !self.failed.is_empty() {
            println!("\nFailures: {}", self.failed.len());
            for (path, failure) in &self.failed {
                println!("  {} - {}", path.display(), failure.message);
            }
        }
    }
}

pub(crate) struct TransferResultBuilder {
    result: TransferResult,
    start: Instant,
}

impl TransferResultBuilder {
    pub(crate) fn new() -> Self {
        Self {
            result: TransferResult {
                copied: Vec::new(),
                skipped: Vec::new(),
                failed: BTreeMap::new(),
                verified: None,
                dereferenced: Vec::new(),
                destinations: BTreeMap::new(),
                metadata_reports: BTreeMap::new(),
                bytes_copied: 0,
                duration: Duration::ZERO,
                cancelled: false,
            },
            start: Instant::now(),
        }
    }

    fn record(&mut self, source: PathBuf, outcome: Result<EntryOutcome>) {
        let result = &mut self.result;
        match outcome {
            Ok(EntryOutcome::Copied {
                destination,
                bytes,
                report,
                verified,
                dereferenced,
            }) => {
                result.bytes_copied += bytes;
                if let Some(ok) = verified {
                    result.verified = Some(result.verified.unwrap_or(true) && ok);
                }
                if dereferenced {
                    result.dereferenced.push(source.clone());
                }
                if let Some(report) = report {
                    result.metadata_reports.insert(source.clone(), report);
                }
                result.destinations.insert(source.clone(), destination);
                result.copied.push(source);
            }
            Ok(EntryOutcome::Skipped { destination }) => {
                result.destinations.insert(source.clone(), destination);
                result.skipped.push(source);
            }
            Err(error) => {
                if error.kind() == ErrorKind::VerificationMismatch {
                    result.verified = Some(false);
                }
                result.failed.insert(source, TransferFailure::from(&error));
            }
        }
    }

    fn mark_cancelled(&mut self) {
        self.result.cancelled = true;
    }

    fn finish(mut self) -> TransferResult {
        self.result.copied.sort();
        self.result.skipped.sort();
        self.result.dereferenced.sort();
        self.result.duration = self.start.elapsed();
        self.result
    }
}

enum EntryOutcome {
    Copied {
        destination: PathBuf,
        bytes: u64,
        report: Option<AppliedReport>,
        verified: Option<bool>,
        dereferenced: bool,
    },
    Skipped {
        destination: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Copy,
    Move,
}

#[derive(Default)]
struct TreePlan {
    dirs: Vec<PathBuf>,
    files: Vec<PathBuf>,
    errors: Vec<(PathBuf, FilekitError)>,
}

/// Copy/move engine
pub struct TransferEngine {
    config: TransferConfig,
    copier: FileCopier,
    resolver: PathResolver,
    caps: Option<Arc<dyn PlatformCapabilities>>,
    claims: DestinationClaims,
    progress: Option<ProgressReporter>,
    cancelled: Arc<AtomicBool>,
}

impl TransferEngine {
    /// Create an engine for `config`
    pub fn new(config: TransferConfig) -> Self {
        let copier = FileCopier::with_buffer_size(config.buffer_size.max(1));
        Self {
            config,
            copier,
            resolver: PathResolver::host(),
            caps: None,
            claims: DestinationClaims::new(),
            progress: None,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Use fixed destination capabilities instead of probing each volume
    pub fn with_capabilities(mut self, caps: Arc<dyn PlatformCapabilities>) -> Self {
        self.caps = Some(caps);
        self
    }

    /// Share a claim registry with other engines
    pub fn with_claims(mut self, claims: DestinationClaims) -> Self {
        self.claims = claims;
        self
    }

    /// Report progress while transferring
    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Active configuration
    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Claim registry in use
    pub fn claims(&self) -> &DestinationClaims {
        &self.claims
    }

    /// Attached progress reporter
    pub fn progress(&self) -> Option<&ProgressReporter> {
        self.progress.as_ref()
    }

    /// Flag that stops the engine at the next file boundary
    pub fn cancellation_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn resolve(&self, path: &Path) -> Result<PathBuf> {
        match path.to_str() {
            Some(text) => self.resolver.resolve(text),
            None => Ok(path.to_path_buf()),
        }
    }

    fn capabilities_for(&self, destination: &Path) -> Arc<dyn PlatformCapabilities> {
        match &self.caps {
            Some(caps) => Arc::clone(caps),
            None => Arc::new(HostCapabilities::for_volume(destination)),
        }
    }

    /// Whether link sources are read as their target's content
    fn reads_through_links(&self, caps: &Arc<dyn PlatformCapabilities>) -> bool {
        self.config.follow_symlinks || !caps.supports_symlinks()
    }

    /// Copy one file
    ///
    /// An existing directory as `destination` receives the file under its
    /// own name. A skipped file is reported in [`TransferResult::skipped`];
    /// any other failure is returned as the error.
    pub fn copy_file(&self, source: &Path, destination: &Path) -> Result<TransferResult> {
        self.transfer_single(source, destination, Operation::Copy)
    }

    /// Move one file: copy (and verify), then remove the source
    pub fn move_file(&self, source: &Path, destination: &Path) -> Result<TransferResult> {
        self.transfer_single(source, destination, Operation::Move)
    }

    /// Copy a directory tree
    pub fn copy_tree(&self, source: &Path, destination: &Path) -> Result<TransferResult> {
        self.transfer_tree(source, destination, Operation::Copy)
    }

    /// Move a directory tree, pruning emptied source directories
    pub fn move_tree(&self, source: &Path, destination: &Path) -> Result<TransferResult> {
        self.transfer_tree(source, destination, Operation::Move)
    }

    /// Copy individual files below `dest_base`, laid out by `style`
    ///
    /// Each source maps to `(success, destination)`; a failed source maps
    /// to itself.
    pub fn copy_files_with_path<P: AsRef<Path>>(
        &self,
        sources: &[P],
        source_base: &Path,
        dest_base: &Path,
        style: PathStyle,
        include_base: bool,
    ) -> Result<BTreeMap<PathBuf, (bool, PathBuf)>> {
        self.transfer_files_with_path(sources, source_base, dest_base, style, include_base, Operation::Copy)
    }

    /// Move individual files below `dest_base`, laid out by `style`
    pub fn move_files_with_path<P: AsRef<Path>>(
        &self,
        sources: &[P],
        source_base: &Path,
        dest_base: &Path,
        style: PathStyle,
        include_base: bool,
    ) -> Result<BTreeMap<PathBuf, (bool, PathBuf)>> {
        self.transfer_files_with_path(sources, source_base, dest_base, style, include_base, Operation::Move)
    }

    fn transfer_files_with_path<P: AsRef<Path>>(
        &self,
        sources: &[P],
        source_base: &Path,
        dest_base: &Path,
        style: PathStyle,
        include_base: bool,
        op: Operation,
    ) -> Result<BTreeMap<PathBuf, (bool, PathBuf)>> {
        fs::create_dir_all(dest_base).with_path(dest_base)?;

        let mut outcomes = BTreeMap::new();
        for source in sources {
            let source = source.as_ref();
            let outcome = destination_for(source, source_base, dest_base, style, include_base)
                .and_then(|dest| self.transfer_single(source, &dest, op).map(|r| (r, dest)));
            let entry = match outcome {
                Ok((result, dest)) => {
                    let written = result.destinations().values().next().cloned().unwrap_or(dest);
                    (!result.copied().is_empty(), written)
                }
                Err(e) => {
                    warn!("Failed to transfer {}: {}", source.display(), e);
                    (false, source.to_path_buf())
                }
            };
            outcomes.insert(source.to_path_buf(), entry);
        }
        Ok(outcomes)
    }

    fn transfer_single(&self, source: &Path, destination: &Path, op: Operation) -> Result<TransferResult> {
        self.config.validate()?;
        if self.is_cancelled() {
            return Err(FilekitError::Cancelled);
        }

        let source = self.resolve(source)?;
        let destination = self.resolve(destination)?;
        let link_meta = fs::symlink_metadata(&source).with_path(&source)?;
        let is_link = link_meta.file_type().is_symlink();
        if !is_link || self.config.follow_symlinks {
            let meta = fs::metadata(&source).with_path(&source)?;
            if !meta.is_file() {
                return Err(FilekitError::NotAFile(source));
            }
        }

        let destination = if destination.is_dir() {
            let name = source
                .file_name()
                .ok_or_else(|| FilekitError::NotAFile(source.clone()))?;
            destination.join(name)
        } else {
            destination
        };

        let parent = match destination.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let caps = self.capabilities_for(&destination);
        if self.config.check_space {
            ensure_disk_space(
                &parent,
                &[&source],
                self.config.safety_margin,
                self.reads_through_links(&caps),
            )?;
        }
        fs::create_dir_all(&parent).with_path(&parent)?;

        if let Some(progress) = &self.progress {
            progress.begin(1, link_meta.len());
        }

        let outcome = self.transfer_entry(&source, &destination, op, &caps)?;

        let mut builder = TransferResultBuilder::new();
        builder.record(source, Ok(outcome));
        Ok(builder.finish())
    }

    fn transfer_tree(&self, source: &Path, destination: &Path, op: Operation) -> Result<TransferResult> {
        self.config.validate()?;
        let source = self.resolve(source)?;
        let destination = self.resolve(destination)?;

        let meta = fs::metadata(&source).with_path(&source)?;
        if !meta.is_dir() {
            return Err(FilekitError::config(format!(
                "not a directory: {}",
                source.display()
            )));
        }
        if is_same_file(&source, &destination) {
            return Err(FilekitError::SameSourceAndDestination(destination));
        }
        if anchored(&destination).starts_with(anchored(&source)) {
            return Err(FilekitError::config(format!(
                "destination {} lies inside source {}",
                destination.display(),
                source.display()
            )));
        }

        let plan = self.plan_tree(&source)?;
        info!(
            "Transferring {} files from {} to {}",
            plan.files.len(),
            source.display(),
            destination.display()
        );

        let absolute_files: Vec<PathBuf> = plan.files.iter().map(|f| source.join(f)).collect();
        let caps = self.capabilities_for(&destination);
        if self.config.check_space {
            ensure_disk_space(
                &destination,
                &absolute_files,
                self.config.safety_margin,
                self.reads_through_links(&caps),
            )?;
        }
        fs::create_dir_all(&destination).with_path(&destination)?;
        let created = create_directory_structure(&destination, &plan.dirs)?;
        debug!("Created {} directories", created);

        if let Some(progress) = &self.progress {
            progress.begin(
                plan.files.len() as u64,
                crate::system::calculate_total_size(&absolute_files, self.reads_through_links(&caps)),
            );
        }

        let mut builder = TransferResultBuilder::new();
        for (path, error) in plan.errors {
            if self.config.fail_fast {
                return Err(error);
            }
            builder.record(path, Err(error));
        }

        let threads = self.config.effective_threads();
        if threads > 1 {
            self.run_parallel(&plan.files, &source, &destination, op, &caps, threads, &mut builder)?;
        } else {
            for relative in &plan.files {
                if self.is_cancelled() {
                    builder.mark_cancelled();
                    break;
                }
                let src = source.join(relative);
                let outcome = self.transfer_entry(&src, &destination.join(relative), op, &caps);
                match outcome {
                    Err(e) if self.config.fail_fast => return Err(e),
                    outcome => builder.record(src, outcome),
                }
            }
        }

        let result = builder.finish();
        if op == Operation::Move && !result.is_cancelled() {
            prune_empty_dirs(&source, &plan.dirs);
        }
        info!(
            "Transfer finished: {} copied, {} skipped, {} failed",
            result.copied().len(),
            result.skipped().len(),
            result.failed().len()
        );
        Ok(result)
    }

    #[allow(clippy::too_many_arguments)]
    fn run_parallel(
        &self,
        files: &[PathBuf],
        source: &Path,
        destination: &Path,
        op: Operation,
        caps: &Arc<dyn PlatformCapabilities>,
        threads: usize,
        builder: &mut TransferResultBuilder,
    ) -> Result<()> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|e| FilekitError::config(format!("Failed to create thread pool: {}", e)))?;

        let stop = AtomicBool::new(false);
        let mut outcomes: Vec<(PathBuf, Option<Result<EntryOutcome>>)> = pool.install(|| {
            files
                .par_iter()
                .map(|relative| {
                    let src = source.join(relative);
                    if self.is_cancelled() || stop.load(Ordering::SeqCst) {
                        return (src, None);
                    }
                    let outcome = self.transfer_entry(&src, &destination.join(relative), op, caps);
                    if outcome.is_err() && self.config.fail_fast {
                        stop.store(true, Ordering::SeqCst);
                    }
                    (src, Some(outcome))
                })
                .collect()
        });
        outcomes.sort_by(|a, b| a.0.cmp(&b.0));

        for (src, outcome) in outcomes {
            match outcome {
                None => {
                    if self.is_cancelled() {
                        builder.mark_cancelled();
                    }
                }
                Some(Err(e)) if self.config.fail_fast => return Err(e),
                Some(outcome) => builder.record(src, outcome),
            }
        }
        Ok(())
    }

    fn plan_tree(&self, source: &Path) -> Result<TreePlan> {
        let case_insensitive = !HostCapabilities::for_volume(source).case_sensitive();
        let filter = PatternFilter::new(
            &self.config.include_patterns,
            &self.config.exclude_patterns,
            case_insensitive,
        )?;
        let include_hidden = self.config.include_hidden;

        let mut plan = TreePlan::default();
        let walker = WalkDir::new(source)
            .follow_links(self.config.follow_symlinks)
            .sort_by_file_name()
            .min_depth(1)
            .into_iter()
            .filter_entry(|e| include_hidden || !is_hidden(e));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().unwrap_or(source).to_path_buf();
                    warn!("Cannot read {}: {}", path.display(), e);
                    plan.errors.push((path.clone(), FilekitError::io(path, std::io::Error::from(e))));
                    continue;
                }
            };
            let relative = match entry.path().strip_prefix(source) {
                Ok(relative) => relative.to_path_buf(),
                Err(_) => continue,
            };
            if entry.file_type().is_dir() {
                plan.dirs.push(relative);
            } else if filter.is_match(&relative) {
                plan.files.push(relative);
            } else {
                trace!("Filtered out {}", entry.path().display());
            }
        }
        Ok(plan)
    }

    fn transfer_entry(
        &self,
        source: &Path,
        destination: &Path,
        op: Operation,
        caps: &Arc<dyn PlatformCapabilities>,
    ) -> Result<EntryOutcome> {
        if let Some(progress) = &self.progress {
            progress.entry_started(source);
        }

        let mut entry = EntryTracker::new(source);
        let outcome = self.run_entry(&mut entry, source, destination, op, caps);

        if let Err(e) = &outcome {
            entry.fail(e);
            warn!("Failed to transfer {}: {}", source.display(), e);
        }
        if let Some(progress) = &self.progress {
            progress.entry_finished(match &outcome {
                Ok(EntryOutcome::Copied { bytes, .. }) => EntryProgress::Copied(*bytes),
                Ok(EntryOutcome::Skipped { .. }) => EntryProgress::Skipped,
                Err(_) => EntryProgress::Failed,
            });
        }
        outcome
    }

    fn run_entry(
        &self,
        entry: &mut EntryTracker<'_>,
        source: &Path,
        destination: &Path,
        op: Operation,
        caps: &Arc<dyn PlatformCapabilities>,
    ) -> Result<EntryOutcome> {
        entry.advance(EntryState::Resolving)?;

        let link_meta = fs::symlink_metadata(source).with_path(source)?;
        let is_link = link_meta.file_type().is_symlink() && !self.config.follow_symlinks;
        let dereference = is_link && !caps.supports_symlinks();
        if dereference {
            debug!(
                "Destination cannot hold links, copying content of {}",
                source.display()
            );
        }
        let as_link = is_link && !dereference;
        let size = if as_link {
            0
        } else {
            let meta = fs::metadata(source).with_path(source)?;
            if !meta.is_file() {
                return Err(FilekitError::NotAFile(source.to_path_buf()));
            }
            meta.len()
        };
        if is_same_file(source, destination) {
            return Err(FilekitError::SameSourceAndDestination(destination.to_path_buf()));
        }

        let (target, _claim) = match self.claim_target(destination)? {
            Some(claimed) => claimed,
            None => {
                entry.advance(EntryState::Done)?;
                return Ok(EntryOutcome::Skipped {
                    destination: destination.to_path_buf(),
                });
            }
        };
        entry.advance(EntryState::SpaceChecked)?;
        entry.advance(EntryState::Copying)?;

        if op == Operation::Move
            && self.config.verify.is_none()
            && self.config.rename_when_possible
            && !dereference
        {
            match fs::rename(source, &target) {
                Ok(()) => {
                    debug!("Renamed {} -> {}", source.display(), target.display());
                    entry.advance(EntryState::MetadataApplied)?;
                    entry.advance(EntryState::Done)?;
                    return Ok(EntryOutcome::Copied {
                        destination: target,
                        bytes: size,
                        report: None,
                        verified: None,
                        dereferenced: false,
                    });
                }
                Err(e) => debug!(
                    "Rename of {} failed ({}), copying instead",
                    source.display(),
                    e
                ),
            }
        }

        let metadata = if self.config.preserve_metadata {
            Some(collect_file_metadata_with(source, !as_link)?)
        } else {
            None
        };

        let mut expected = None;
        let bytes = if as_link {
            let link_target = fs::read_link(source).with_path(source)?;
            create_symlink(&link_target, &target, true)?;
            0
        } else if let Some(algorithm) = self.config.verify {
            let mut hasher = Hasher::new(algorithm);
            let stats = self.copier.copy_with_hash(source, &target, &mut hasher)?;
            expected = Some((algorithm, hasher.finalize()));
            stats.bytes_copied
        } else {
            self.copier.copy(source, &target)?.bytes_copied
        };

        let finished = (|| -> Result<(Option<AppliedReport>, Option<bool>)> {
            entry.advance(EntryState::MetadataApplied)?;
            let report = match &metadata {
                Some(md) => Some(
                    MetadataApplier::new(Arc::clone(caps))
                        .follow_symlinks(false)
                        .apply(&target, md)?,
                ),
                None => None,
            };

            let verified = match expected {
                Some((algorithm, expected)) => {
                    entry.advance(EntryState::Verifying)?;
                    let actual = hash_file_with_buffer(&target, algorithm, self.config.buffer_size)?.hash;
                    if actual != expected {
                        return Err(FilekitError::verification_mismatch(
                            &target, algorithm, expected, actual,
                        ));
                    }
                    trace!("Verified {} ({})", target.display(), algorithm);
                    Some(true)
                }
                None => None,
            };
            Ok((report, verified))
        })();

        let (report, verified) = match finished {
            Ok(done) => done,
            Err(e) => {
                discard_partial(&target);
                return Err(e);
            }
        };

        if op == Operation::Move {
            fs::remove_file(source).with_path(source)?;
        }
        entry.advance(EntryState::Done)?;

        Ok(EntryOutcome::Copied {
            destination: target,
            bytes,
            report,
            verified,
            dereferenced: dereference,
        })
    }

    /// Apply the conflict policy and claim the destination
    ///
    /// `None` means the file is skipped.
    fn claim_target(&self, destination: &Path) -> Result<Option<(PathBuf, ClaimGuard)>> {
        let occupied = |p: &Path| fs::symlink_metadata(p).is_ok();
        let policy = self.config.conflict;

        if !occupied(destination) {
            match self.claims.claim(destination) {
                Ok(guard) => return Ok(Some((destination.to_path_buf(), guard))),
                Err(e) if policy != ConflictPolicy::RenameUnique => return Err(e),
                Err(_) => {}
            }
        } else {
            match policy {
                ConflictPolicy::Overwrite => {
                    if destination.is_dir() {
                        return Err(FilekitError::DestinationExists(destination.to_path_buf()));
                    }
                    let guard = self.claims.claim(destination)?;
                    return Ok(Some((destination.to_path_buf(), guard)));
                }
                ConflictPolicy::Skip => {
                    debug!("Skipping existing {}", destination.display());
                    return Ok(None);
                }
                ConflictPolicy::Fail => {
                    return Err(FilekitError::DestinationExists(destination.to_path_buf()));
                }
                ConflictPolicy::RenameUnique => {}
            }
        }

        let candidates = ensure_unique_path(destination);
        let attempts = candidates.cap();
        for candidate in candidates {
            if occupied(&candidate) {
                continue;
            }
            if let Ok(guard) = self.claims.claim(&candidate) {
                debug!("Renamed destination to {}", candidate.display());
                return Ok(Some((candidate, guard)));
            }
        }
        Err(FilekitError::UniquePathExhausted {
            path: destination.to_path_buf(),
            attempts,
        })
    }
}

/// Absolute, symlink-resolved form of `path` as far as it exists
fn anchored(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    let mut existing = absolute.as_path();
    let mut rest = Vec::new();
    loop {
        if let Ok(canonical) = existing.canonicalize() {
            return rest.iter().rev().fold(canonical, |acc, part| acc.join(part));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                rest.push(name.to_os_string());
                existing = parent;
            }
            _ => return absolute,
        }
    }
}

fn prune_empty_dirs(root: &Path, dirs: &[PathBuf]) {
    let mut dirs: Vec<&PathBuf> = dirs.iter().collect();
    dirs.sort_by_key(|d| std::cmp::Reverse(d.components().count()));
    for dir in dirs.into_iter().map(|d| root.join(d)).chain(std::iter::once(root.to_path_buf())) {
        match fs::remove_dir(&dir) {
            Ok(()) => trace!("Pruned {}", dir.display()),
            Err(e) => trace!("Kept {}: {}", dir.display(), e),
        }
    }
}

/// Destination of `source` under `dest_base` for a batch layout
pub fn destination_for(
    source: &Path,
    source_base: &Path,
    dest_base: &Path,
    style: PathStyle,
    include_base: bool,
) -> Result<PathBuf> {
    let traversal = || FilekitError::PathTraversal {
        path: source.display().to_string(),
        base: source_base.to_path_buf(),
    };

    let mut dest = dest_base.to_path_buf();
    if include_base {
        if let Some(name) = source_base.file_name() {
            dest.push(name);
        }
    }

    match style {
        PathStyle::Relative => {
            let relative = source.strip_prefix(source_base).map_err(|_| traversal())?;
            for component in relative.components() {
                match component {
                    Component::Normal(part) => dest.push(part),
                    Component::CurDir => {}
                    _ => return Err(traversal()),
                }
            }
        }
        PathStyle::Absolute => {
            for component in source.components() {
                match component {
                    Component::Prefix(prefix) => match prefix.kind() {
                        Prefix::Disk(letter) | Prefix::VerbatimDisk(letter) => {
                            dest.push((letter as char).to_string())
                        }
                        Prefix::UNC(server, share) | Prefix::VerbatimUNC(server, share) => {
                            dest.push(server);
                            dest.push(share);
                        }
                        Prefix::Verbatim(part) | Prefix::DeviceNS(part) => dest.push(part),
                    },
                    Component::Normal(part) => dest.push(part),
                    Component::RootDir | Component::CurDir => {}
                    Component::ParentDir => return Err(traversal()),
                }
            }
        }
        PathStyle::Flat => {
            let name = source
                .file_name()
                .ok_or_else(|| FilekitError::NotAFile(source.to_path_buf()))?;
            dest.push(name);
        }
    }
    Ok(dest)
}

/// Copy `source` to `destination`, leaving an existing destination alone
///
/// Returns `false` when the destination already existed.
pub fn copy_file(source: &Path, destination: &Path, preserve_metadata: bool) -> Result<bool> {
    let engine = TransferEngine::new(TransferConfig {
        preserve_metadata,
        ..Default::default()
    });
    Ok(!engine.copy_file(source, destination)?.copied().is_empty())
}

/// Move `source` to `destination`, leaving an existing destination alone
///
/// Returns `false` when the destination already existed; the source is
/// then kept.
pub fn move_file(source: &Path, destination: &Path, preserve_metadata: bool) -> Result<bool> {
    let engine = TransferEngine::new(TransferConfig {
        preserve_metadata,
        ..Default::default()
    });
    Ok(!engine.move_file(source, destination)?.copied().is_empty())
}
