use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use super::compiler::{CompileResult, CompileState};

#[derive(Debug)]
pub enum FileStatus {
    /// No compiler claims the extension.
    Skipped,
    Compiled(CompileResult),
}

#[derive(Debug)]
pub struct FileOutcome {
    pub source: PathBuf,
    pub kind: Option<&'static str>,
    pub status: FileStatus,
}

impl FileOutcome {
    pub(crate) fn skipped(source: PathBuf) -> Self {
        Self {
            source,
            kind: None,
            status: FileStatus::Skipped,
        }
    }

    pub fn state(&self) -> Option<CompileState> {
        match &self.status {
            FileStatus::Skipped => None,
            FileStatus::Compiled(result) => Some(result.state),
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.status, FileStatus::Skipped)
    }

    fn label(&self) -> &'static str {
        match self.state() {
            None => "skipped",
            Some(CompileState::UpToDate) => "up_to_date",
            Some(CompileState::Succeeded) => "succeeded",
            Some(CompileState::Failed) => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildSummary {
    pub succeeded: usize,
    pub up_to_date: usize,
    pub failed: usize,
    pub skipped: usize,
    pub batches: usize,
    pub elapsed: Duration,
}

impl BuildSummary {
    pub(crate) fn tally(outcomes: &[FileOutcome], batches: usize, elapsed: Duration) -> Self {
        let mut summary = Self {
            batches,
            elapsed,
            ..Self::default()
        };
        for outcome in outcomes {
            match outcome.state() {
                None => summary.skipped += 1,
                Some(CompileState::UpToDate) => summary.up_to_date += 1,
                Some(CompileState::Succeeded) => summary.succeeded += 1,
                Some(CompileState::Failed) => summary.failed += 1,
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.up_to_date + self.failed + self.skipped
    }
}

#[derive(Debug)]
pub struct BuildReport {
    pub outcomes: Vec<FileOutcome>,
    pub summary: BuildSummary,
}

impl BuildReport {
    pub fn outcome_for(&self, source: &Path) -> Option<&FileOutcome> {
        self.outcomes.iter().find(|outcome| outcome.source == source)
    }

    pub fn has_failures(&self) -> bool {
        self.summary.failed > 0
    }

    pub fn render_human_readable(&self) -> String {
        let summary = &self.summary;
        let mut output = format!(
            "succeeded={} up_to_date={} failed={} skipped={} batches={} elapsed_ms={}",
            summary.succeeded,
            summary.up_to_date,
            summary.failed,
            summary.skipped,
            summary.batches,
            summary.elapsed.as_millis()
        );
        for outcome in &self.outcomes {
            output.push('\n');
            output.push_str(&format!(
                "{} kind={} source={}",
                outcome.label(),
                outcome.kind.unwrap_or("-"),
                outcome.source.display()
            ));
            if let FileStatus::Compiled(result) = &outcome.status {
                if let Some(destination) = &result.destination {
                    output.push_str(&format!(" destination={}", destination.display()));
                }
                if let Some(error) = &result.error {
                    output.push_str(&format!(" error=\"{error}\""));
                }
            }
        }
        output
    }
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("build target does not exist: {path}")]
    TargetMissing { path: PathBuf },
    #[error("failed to read directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read directory entry in {path}: {source}")]
    ReadDirEntry {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("compiler '{kind}' declares no source extensions")]
    NoExtensions { kind: &'static str },
    #[error("extension '{extension}' is claimed by both '{first}' and '{second}'")]
    DuplicateExtension {
        extension: String,
        first: &'static str,
        second: &'static str,
    },
}
