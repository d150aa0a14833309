use std::any::Any;
use std::collections::HashMap;
use std::fs;
use std::ops::Range;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use crate::config::PipelineConfig;

use super::associated::resolve_associated;
use super::atomic_io::write_artifact_atomic;
use super::compiler::{
    AssetCompiler, CompileError, CompileInput, CompileResult, CompileState, TransformOutput,
};
use super::container::Container;
use super::discovery::collect_files;
use super::guard::{check_up_to_date, GuardDecision};
use super::registry::CompilerRegistry;
use super::types::{BuildError, BuildReport, BuildSummary, FileOutcome, FileStatus};

/// Completion counter shared with the caller while a build runs.
#[derive(Debug, Default)]
pub struct BuildProgress {
    completed: AtomicUsize,
    total: AtomicUsize,
}

impl BuildProgress {
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Acquire)
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::Acquire)
    }

    fn reset(&self, total: usize) {
        self.completed.store(0, Ordering::Release);
        self.total.store(total, Ordering::Release);
    }

    fn record(&self) {
        self.completed.fetch_add(1, Ordering::AcqRel);
    }
}

struct WorkItem<'r> {
    source: PathBuf,
    destination: PathBuf,
    compiler: &'r dyn AssetCompiler,
}

impl WorkItem<'_> {
    fn outcome(&self, result: CompileResult) -> FileOutcome {
        FileOutcome {
            source: self.source.clone(),
            kind: Some(self.compiler.kind()),
            status: FileStatus::Compiled(result),
        }
    }
}

pub struct Scheduler<'r> {
    registry: &'r CompilerRegistry,
    workers: usize,
    output_root: Option<PathBuf>,
    progress: Arc<BuildProgress>,
}

impl<'r> Scheduler<'r> {
    pub fn new(registry: &'r CompilerRegistry, config: &PipelineConfig) -> Self {
        Self {
            registry,
            workers: config.worker_count(),
            output_root: config.output_root.clone(),
            progress: Arc::new(BuildProgress::default()),
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_output_root(mut self, output_root: Option<PathBuf>) -> Self {
        self.output_root = output_root;
        self
    }

    pub fn progress(&self) -> Arc<BuildProgress> {
        Arc::clone(&self.progress)
    }

    /// Compiles a single file or every recognized file below a directory.
    pub fn build(&self, target: &Path) -> Result<BuildReport, BuildError> {
        let started = Instant::now();
        if target.is_file() {
            return Ok(self.build_file(target, started));
        }
        if !target.is_dir() {
            return Err(BuildError::TargetMissing {
                path: target.to_path_buf(),
            });
        }

        let files = collect_files(target)?;
        let (worklist, mut outcomes) = self.plan(target, files);
        self.progress.reset(worklist.len());

        let desired_batches = self.workers.max(1);
        info!(
            target = %target.display(),
            queued = worklist.len(),
            skipped = outcomes.len(),
            workers = desired_batches,
            "build_started"
        );

        let batches = if worklist.len() < desired_batches || desired_batches == 1 {
            outcomes.extend(run_batch(&worklist, &self.progress));
            usize::from(!worklist.is_empty())
        } else {
            outcomes.extend(self.run_parallel(&worklist, desired_batches));
            desired_batches
        };

        outcomes.sort_by(|a, b| a.source.cmp(&b.source));
        let summary = BuildSummary::tally(&outcomes, batches, started.elapsed());
        log_summary(&summary);
        Ok(BuildReport { outcomes, summary })
    }

    fn build_file(&self, source: &Path, started: Instant) -> BuildReport {
        let outcome = match self.registry.find_for_path(source) {
            None => {
                self.progress.reset(0);
                log_skipped(source);
                FileOutcome::skipped(source.to_path_buf())
            }
            Some(compiler) => {
                self.progress.reset(1);
                let item = WorkItem {
                    source: source.to_path_buf(),
                    destination: self.destination_for(None, source, compiler),
                    compiler,
                };
                let outcome = run_item(&item);
                self.progress.record();
                outcome
            }
        };
        let outcomes = vec![outcome];
        let batches = usize::from(!outcomes[0].is_skipped());
        let summary = BuildSummary::tally(&outcomes, batches, started.elapsed());
        log_summary(&summary);
        BuildReport { outcomes, summary }
    }

    fn plan(&self, root: &Path, files: Vec<PathBuf>) -> (Vec<WorkItem<'r>>, Vec<FileOutcome>) {
        let mut worklist = Vec::<WorkItem<'r>>::new();
        let mut outcomes = Vec::<FileOutcome>::new();
        let mut claimed = HashMap::<PathBuf, PathBuf>::new();

        for source in files {
            let Some(compiler) = self.registry.find_for_path(&source) else {
                log_skipped(&source);
                outcomes.push(FileOutcome::skipped(source));
                continue;
            };
            let destination = self.destination_for(Some(root), &source, compiler);
            if let Some(claimed_by) = claimed.get(&destination) {
                warn!(
                    source = %source.display(),
                    destination = %destination.display(),
                    claimed_by = %claimed_by.display(),
                    "asset_destination_conflict"
                );
                let error = CompileError::DestinationConflict {
                    destination: destination.clone(),
                    claimed_by: claimed_by.clone(),
                };
                let item = WorkItem {
                    source,
                    destination,
                    compiler,
                };
                outcomes.push(item.outcome(CompileResult::failed(
                    Some(item.destination.clone()),
                    error,
                )));
                continue;
            }
            claimed.insert(destination.clone(), source.clone());
            worklist.push(WorkItem {
                source,
                destination,
                compiler,
            });
        }
        (worklist, outcomes)
    }

    fn destination_for(
        &self,
        root: Option<&Path>,
        source: &Path,
        compiler: &dyn AssetCompiler,
    ) -> PathBuf {
        let extension = source
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default();
        let mut name = source.file_stem().unwrap_or_default().to_os_string();
        name.push(".");
        name.push(compiler.destination_extension(extension));

        match (&self.output_root, root) {
            (Some(output_root), Some(root)) => {
                let relative_dir = source
                    .parent()
                    .and_then(|parent| parent.strip_prefix(root).ok())
                    .unwrap_or_else(|| Path::new(""));
                output_root.join(relative_dir).join(name)
            }
            (Some(output_root), None) => output_root.join(name),
            (None, _) => source.with_file_name(name),
        }
    }

    fn run_parallel(&self, worklist: &[WorkItem<'r>], batch_count: usize) -> Vec<FileOutcome> {
        let ranges = partition(worklist.len(), batch_count);
        let progress = self.progress.as_ref();

        thread::scope(|scope| {
            let mut outcomes = Vec::with_capacity(worklist.len());
            let mut pending = Vec::with_capacity(ranges.len());
            for (batch_index, range) in ranges.into_iter().enumerate() {
                let batch = &worklist[range];
                debug!(batch_index, files = batch.len(), "batch_started");
                let spawned = thread::Builder::new()
                    .name(format!("assetc-batch-{batch_index}"))
                    .spawn_scoped(scope, move || run_batch(batch, progress));
                match spawned {
                    Ok(handle) => pending.push((batch_index, batch, handle)),
                    Err(spawn_error) => {
                        warn!(
                            batch_index,
                            error = %spawn_error,
                            "batch_spawn_failed_running_inline"
                        );
                        outcomes.extend(run_batch(batch, progress));
                    }
                }
            }

            for (batch_index, batch, handle) in pending {
                match handle.join() {
                    Ok(batch_outcomes) => outcomes.extend(batch_outcomes),
                    Err(payload) => {
                        let message = panic_message(payload.as_ref());
                        error!(batch_index, panic = %message, "batch_worker_panicked");
                        outcomes.extend(batch.iter().map(|item| {
                            item.outcome(CompileResult::failed(
                                Some(item.destination.clone()),
                                CompileError::Panicked(message.clone()),
                            ))
                        }));
                    }
                }
            }
            outcomes
        })
    }
}

/// Runs one file through resolve -> guard -> compile -> write. Never panics
/// and never returns an error: every failure is folded into the result.
pub fn compile_file(
    compiler: &dyn AssetCompiler,
    source: &Path,
    destination: &Path,
) -> CompileResult {
    match try_compile_file(compiler, source, destination) {
        Ok(CompileState::UpToDate) => CompileResult::up_to_date(destination.to_path_buf()),
        Ok(_) => CompileResult::compiled(destination.to_path_buf()),
        Err(error) => CompileResult::failed(Some(destination.to_path_buf()), error),
    }
}

fn try_compile_file(
    compiler: &dyn AssetCompiler,
    source: &Path,
    destination: &Path,
) -> Result<CompileState, CompileError> {
    let primary = fs::read(source).map_err(|io_error| CompileError::Read {
        path: source.to_path_buf(),
        source: io_error,
    })?;
    let associated = resolve_associated(source, compiler.associated_patterns())?;
    let input = CompileInput::new(Some(source.to_path_buf()), primary, associated);

    match check_up_to_date(compiler, destination, input.digest()) {
        GuardDecision::UpToDate => return Ok(CompileState::UpToDate),
        GuardDecision::Stale(reason) => debug!(
            source = %source.display(),
            reason = ?reason,
            "asset_stale"
        ),
    }

    let payload = run_compiler(compiler, &input)?;
    // Digest and payload go out in the same write.
    let bytes = if compiler.uses_container() {
        Container::new(input.digest(), payload).encode()?
    } else {
        payload
    };
    write_artifact_atomic(destination, &bytes).map_err(|io_error| CompileError::Write {
        path: destination.to_path_buf(),
        source: io_error,
    })?;
    Ok(CompileState::Succeeded)
}

fn run_compiler(compiler: &dyn AssetCompiler, input: &CompileInput) -> TransformOutput {
    panic::catch_unwind(AssertUnwindSafe(|| compiler.compile(input)))
        .unwrap_or_else(|payload| Err(CompileError::Panicked(panic_message(payload.as_ref()))))
}

fn run_batch(batch: &[WorkItem<'_>], progress: &BuildProgress) -> Vec<FileOutcome> {
    let mut outcomes = Vec::with_capacity(batch.len());
    for item in batch {
        outcomes.push(run_item(item));
        progress.record();
    }
    outcomes
}

fn run_item(item: &WorkItem<'_>) -> FileOutcome {
    let result = compile_file(item.compiler, &item.source, &item.destination);
    match (&result.state, &result.error) {
        (CompileState::UpToDate, _) => debug!(
            source = %item.source.display(),
            kind = item.compiler.kind(),
            "asset_up_to_date"
        ),
        (CompileState::Succeeded, _) => info!(
            source = %item.source.display(),
            destination = %item.destination.display(),
            kind = item.compiler.kind(),
            "asset_compiled"
        ),
        (CompileState::Failed, error) => warn!(
            source = %item.source.display(),
            kind = item.compiler.kind(),
            error = %error.as_ref().map(ToString::to_string).unwrap_or_default(),
            "asset_compile_failed"
        ),
    }
    item.outcome(result)
}

/// Splits `len` items into at most `batch_count` contiguous, non-overlapping
/// ranges. Earlier batches absorb the remainder one item each.
pub(crate) fn partition(len: usize, batch_count: usize) -> Vec<Range<usize>> {
    if len == 0 || batch_count == 0 {
        return Vec::new();
    }
    let batch_count = batch_count.min(len);
    let base = len / batch_count;
    let remainder = len % batch_count;

    let mut ranges = Vec::with_capacity(batch_count);
    let mut start = 0usize;
    for index in 0..batch_count {
        let size = base + usize::from(index < remainder);
        ranges.push(start..start + size);
        start += size;
    }
    ranges
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn log_skipped(source: &Path) {
    info!(source = %source.display(), "asset_skipped_unknown_type");
}

fn log_summary(summary: &BuildSummary) {
    info!(
        succeeded = summary.succeeded,
        up_to_date = summary.up_to_date,
        failed = summary.failed,
        skipped = summary.skipped,
        batches = summary.batches,
        elapsed_ms = summary.elapsed.as_millis() as u64,
        "build_summary"
    );
}
