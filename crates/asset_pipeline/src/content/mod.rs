mod associated;
mod atomic_io;
mod compiler;
mod container;
mod discovery;
mod guard;
mod hashing;
mod registry;
mod scheduler;
mod types;

pub use associated::{resolve_associated, AssociatedPattern, BASE_PLACEHOLDER};
pub use compiler::{
    failed, succeeded, AssetCompiler, AssociatedData, CompileError, CompileInput, CompileResult,
    CompileState, TransformOutput, COMPILED_SUFFIX,
};
pub use container::{
    decode_payload, encode_payload, read_container, read_header, Container, ContainerError,
    ContainerHeader, CONTAINER_MAJOR_VERSION, CONTAINER_MINOR_VERSION,
};
pub use guard::{check_up_to_date, GuardDecision, StaleReason};
pub use hashing::{to_hex_lower, ContentDigest, DIGEST_LEN};
pub use registry::{CompilerDescriptor, CompilerRegistry};
pub use scheduler::{compile_file, BuildProgress, Scheduler};
pub use types::{BuildError, BuildReport, BuildSummary, FileOutcome, FileStatus, RegistryError};
