pub mod compilers;
pub mod config;
pub mod content;

pub use compilers::{builtin_registry, BUILTIN_COMPILERS};
pub use config::{ConfigError, PipelineConfig, FONT_HELPER_ENV_VAR, WORKERS_ENV_VAR};
pub use content::{
    read_container, read_header, AssetCompiler, BuildError, BuildProgress, BuildReport,
    BuildSummary, CompileError, CompileState, CompilerRegistry, Container, ContainerError,
    ContainerHeader, FileOutcome, FileStatus, RegistryError, Scheduler,
};
