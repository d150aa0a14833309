use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::associated::AssociatedPattern;
use super::container::ContainerError;
use super::hashing::{digest_inputs, ContentDigest};

/// Appended to a source extension to form the compiled extension
/// (`png` -> `pngc`).
pub const COMPILED_SUFFIX: &str = "c";

/// Associated-file bytes keyed by pattern name.
pub type AssociatedData = BTreeMap<String, Vec<u8>>;

/// What a transformer hands back: the payload bytes to store, or the cause
/// of the failure.
pub type TransformOutput = Result<Vec<u8>, CompileError>;

pub fn succeeded(payload: Vec<u8>) -> TransformOutput {
    Ok(payload)
}

pub fn failed(cause: impl Into<CompileError>) -> TransformOutput {
    Err(cause.into())
}

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed {kind} source: {message}")]
    Malformed { kind: &'static str, message: String },
    #[error("missing required resource: {0}")]
    MissingResource(String),
    #[error("failed to launch {tool}: {source}")]
    HelperLaunch {
        tool: String,
        #[source]
        source: io::Error,
    },
    #[error("{tool} exited unsuccessfully (exit code {code:?})")]
    HelperExit { tool: String, code: Option<i32> },
    #[error("destination {destination} is already claimed by {claimed_by}")]
    DestinationConflict {
        destination: PathBuf,
        claimed_by: PathBuf,
    },
    #[error("compiler panicked: {0}")]
    Panicked(String),
    #[error(transparent)]
    Container(#[from] ContainerError),
}

impl CompileError {
    pub fn malformed(kind: &'static str, message: impl Into<String>) -> Self {
        Self::Malformed {
            kind,
            message: message.into(),
        }
    }
}

/// Everything a transformer may look at for one compile attempt.
#[derive(Debug, Clone)]
pub struct CompileInput {
    source_path: Option<PathBuf>,
    primary: Vec<u8>,
    associated: AssociatedData,
    digest: ContentDigest,
}

impl CompileInput {
    pub fn new(source_path: Option<PathBuf>, primary: Vec<u8>, associated: AssociatedData) -> Self {
        let digest = digest_inputs(&primary, &associated);
        Self {
            source_path,
            primary,
            associated,
            digest,
        }
    }

    pub fn from_bytes(primary: Vec<u8>) -> Self {
        Self::new(None, primary, AssociatedData::new())
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }

    pub fn primary(&self) -> &[u8] {
        &self.primary
    }

    pub fn associated(&self, name: &str) -> Option<&[u8]> {
        self.associated.get(name).map(Vec::as_slice)
    }

    pub fn associated_data(&self) -> &AssociatedData {
        &self.associated
    }

    pub fn digest(&self) -> &ContentDigest {
        &self.digest
    }

    pub(crate) fn source_extension(&self) -> Option<String> {
        self.source_path
            .as_deref()
            .and_then(|path| path.extension())
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompileState {
    UpToDate,
    Succeeded,
    Failed,
}

#[derive(Debug)]
pub struct CompileResult {
    pub state: CompileState,
    pub destination: Option<PathBuf>,
    pub error: Option<CompileError>,
}

impl CompileResult {
    pub(crate) fn up_to_date(destination: PathBuf) -> Self {
        Self {
            state: CompileState::UpToDate,
            destination: Some(destination),
            error: None,
        }
    }

    pub(crate) fn compiled(destination: PathBuf) -> Self {
        Self {
            state: CompileState::Succeeded,
            destination: Some(destination),
            error: None,
        }
    }

    pub(crate) fn failed(destination: Option<PathBuf>, error: CompileError) -> Self {
        Self {
            state: CompileState::Failed,
            destination,
            error: Some(error),
        }
    }
}

/// A format transformer. Implementations are shared across worker threads
/// and must not keep mutable state between calls.
pub trait AssetCompiler: Send + Sync {
    /// Human-readable asset kind, e.g. `"texture"`.
    fn kind(&self) -> &'static str;

    /// Lowercase source extensions without the leading dot.
    fn extensions(&self) -> &'static [&'static str];

    /// Pass-through formats return `false`; their output is written raw and
    /// never considered up to date.
    fn uses_container(&self) -> bool {
        true
    }

    fn associated_patterns(&self) -> &'static [AssociatedPattern] {
        &[]
    }

    fn destination_extension(&self, source_extension: &str) -> String {
        format!("{}{COMPILED_SUFFIX}", source_extension.to_ascii_lowercase())
    }

    fn compile(&self, input: &CompileInput) -> TransformOutput;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    impl AssetCompiler for Echo {
        fn kind(&self) -> &'static str {
            "echo"
        }

        fn extensions(&self) -> &'static [&'static str] {
            &["echo"]
        }

        fn compile(&self, input: &CompileInput) -> TransformOutput {
            if input.primary().is_empty() {
                return failed(CompileError::MissingResource("empty".to_string()));
            }
            succeeded(input.primary().to_vec())
        }
    }

    #[test]
    fn default_destination_extension_appends_marker() {
        assert_eq!(Echo.destination_extension("ECHO"), "echoc");
        assert!(Echo.uses_container());
        assert!(Echo.associated_patterns().is_empty());
    }

    #[test]
    fn helpers_build_both_outcomes() {
        assert_eq!(
            Echo.compile(&CompileInput::from_bytes(b"hi".to_vec()))
                .expect("payload"),
            b"hi".to_vec()
        );
        assert!(matches!(
            Echo.compile(&CompileInput::from_bytes(Vec::new())),
            Err(CompileError::MissingResource(_))
        ));
    }

    #[test]
    fn input_digest_tracks_associated_bytes() {
        let plain = CompileInput::from_bytes(b"font".to_vec());
        let with_charset = CompileInput::new(
            Some(PathBuf::from("ui/Body.TTF")),
            b"font".to_vec(),
            AssociatedData::from([("charset".to_string(), b"abc".to_vec())]),
        );
        assert_ne!(plain.digest(), with_charset.digest());
        assert_eq!(with_charset.associated("charset"), Some(&b"abc"[..]));
        assert_eq!(with_charset.associated("missing"), None);
        assert_eq!(with_charset.source_extension().as_deref(), Some("ttf"));
        assert!(plain.source_path().is_none());
    }
}
