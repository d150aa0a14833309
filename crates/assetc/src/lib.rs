use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use asset_pipeline::content::{to_hex_lower, AssetCompiler};
use asset_pipeline::{
    builtin_registry, read_header, BuildError, BuildReport, CompilerRegistry, ConfigError,
    Container, ContainerError, PipelineConfig, RegistryError, Scheduler,
};
use thiserror::Error;
use tracing::info;

const PROGRESS_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error("failed to read {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path} is not a compiled asset of any registered kind")]
    UnknownCompiledKind { path: PathBuf },
    #[error("failed to decode {path}: {source}")]
    Inspect {
        path: PathBuf,
        #[source]
        source: ContainerError,
    },
    #[error("build thread panicked")]
    BuildPanicked,
}

/// Command-line overrides for `build`. `None` leaves the lower layer alone.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    pub target: PathBuf,
    pub config_file: Option<PathBuf>,
    pub output_root: Option<PathBuf>,
    pub workers: Option<usize>,
}

/// File, then environment, then flags.
pub fn resolve_config(
    options: &BuildOptions,
    env_lookup: impl Fn(&'static str) -> Option<String>,
) -> Result<PipelineConfig, AppError> {
    let mut config = match &options.config_file {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    config.apply_env(env_lookup)?;
    if let Some(workers) = options.workers {
        config.workers = Some(workers);
    }
    if let Some(output_root) = &options.output_root {
        config.output_root = Some(output_root.clone());
    }
    config.validate()?;
    Ok(config)
}

pub fn run_build(options: &BuildOptions) -> Result<BuildReport, AppError> {
    let config = resolve_config(options, |var| env::var(var).ok())?;
    let registry = builtin_registry(&config)?;
    info!(
        target = %options.target.display(),
        workers = config.worker_count(),
        compilers = registry.len(),
        "build_requested"
    );
    build_with_progress(&Scheduler::new(&registry, &config), &options.target)
}

/// Runs the build on a scoped thread and logs progress until it finishes.
pub fn build_with_progress(
    scheduler: &Scheduler<'_>,
    target: &Path,
) -> Result<BuildReport, AppError> {
    let progress = scheduler.progress();
    thread::scope(|scope| {
        let (done_tx, done_rx) = mpsc::channel::<()>();
        let handle = scope.spawn(move || {
            let result = scheduler.build(target);
            let _ = done_tx.send(());
            result
        });

        let mut last_reported = 0usize;
        loop {
            match done_rx.recv_timeout(PROGRESS_INTERVAL) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {
                    let completed = progress.completed();
                    if completed != last_reported {
                        last_reported = completed;
                        info!(completed, total = progress.total(), "build_progress");
                    }
                }
            }
        }

        match handle.join() {
            Ok(result) => result.map_err(AppError::from),
            Err(_) => Err(AppError::BuildPanicked),
        }
    })
}

/// Header summary of a compiled file. Pass-through outputs have no header.
pub fn inspect(path: &Path, registry: &CompilerRegistry) -> Result<String, AppError> {
    let compiler = registry
        .find_for_compiled(path)
        .ok_or_else(|| AppError::UnknownCompiledKind {
            path: path.to_path_buf(),
        })?;
    let bytes = fs::read(path).map_err(|source| AppError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;

    let mut lines = vec![
        format!("path: {}", path.display()),
        format!("kind: {}", compiler.kind()),
    ];
    if !compiler.uses_container() {
        lines.push("container: none (pass-through)".to_string());
        lines.push(format!("size_bytes: {}", bytes.len()));
        return Ok(lines.join("\n"));
    }

    let inspect_error = |source| AppError::Inspect {
        path: path.to_path_buf(),
        source,
    };
    let header = read_header(&bytes).map_err(inspect_error)?;
    let container = Container::decode(&bytes).map_err(inspect_error)?;
    lines.push(format!("version: {}.{}", header.major, header.minor));
    lines.push(format!("digest: {}", to_hex_lower(&header.digest)));
    lines.push(format!("compressed_payload_bytes: {}", header.compressed_len));
    lines.push(format!("payload_bytes: {}", container.payload.len()));
    Ok(lines.join("\n"))
}

pub fn list_compilers(registry: &CompilerRegistry) -> String {
    registry
        .compilers()
        .map(describe_compiler)
        .collect::<Vec<_>>()
        .join("\n")
}

fn describe_compiler(compiler: &dyn AssetCompiler) -> String {
    let mut line = format!(
        "{} extensions={} container={}",
        compiler.kind(),
        compiler.extensions().join(","),
        if compiler.uses_container() { "yes" } else { "no" }
    );
    let patterns = compiler.associated_patterns();
    if !patterns.is_empty() {
        let associated = patterns
            .iter()
            .map(|pattern| format!("{}={}", pattern.name, pattern.template))
            .collect::<Vec<_>>()
            .join(",");
        line.push_str(&format!(" associated={associated}"));
    }
    line
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use asset_pipeline::{CompileState, WORKERS_ENV_VAR};
    use tempfile::TempDir;

    use super::*;

    fn no_env(_: &'static str) -> Option<String> {
        None
    }

    #[test]
    fn flags_override_environment_which_overrides_file() {
        let temp = TempDir::new().expect("temp");
        let config_file = temp.path().join("assetc.toml");
        fs::write(&config_file, "workers = 2\n[texture]\nmip_levels = 3\n").expect("write");
        let vars = HashMap::from([(WORKERS_ENV_VAR, "5".to_string())]);

        let mut options = BuildOptions {
            target: temp.path().to_path_buf(),
            config_file: Some(config_file),
            ..BuildOptions::default()
        };
        let from_env = resolve_config(&options, |var| vars.get(var).cloned()).expect("config");
        assert_eq!(from_env.workers, Some(5));
        assert_eq!(from_env.texture.mip_levels, 3);

        options.workers = Some(7);
        options.output_root = Some(temp.path().join("out"));
        let from_flags = resolve_config(&options, |var| vars.get(var).cloned()).expect("config");
        assert_eq!(from_flags.workers, Some(7));
        assert_eq!(from_flags.output_root, Some(temp.path().join("out")));
    }

    #[test]
    fn zero_workers_flag_is_rejected() {
        let options = BuildOptions {
            workers: Some(0),
            ..BuildOptions::default()
        };
        assert!(matches!(
            resolve_config(&options, no_env),
            Err(AppError::Config(ConfigError::Invalid(_)))
        ));
    }

    #[test]
    fn build_then_inspect_material() {
        let temp = TempDir::new().expect("temp");
        fs::write(temp.path().join("stone.mat"), r#"{ "shader": "lit" }"#).expect("write");
        fs::write(temp.path().join("readme.txt"), "skip me").expect("write");

        let config = PipelineConfig::default();
        let registry = builtin_registry(&config).expect("registry");
        let scheduler = Scheduler::new(&registry, &config).with_workers(2);
        let report = build_with_progress(&scheduler, temp.path()).expect("build");
        assert_eq!(report.summary.succeeded, 1);
        assert_eq!(report.summary.skipped, 1);
        assert!(!report.has_failures());

        let compiled = temp.path().join("stone.matc");
        let text = inspect(&compiled, &registry).expect("inspect");
        assert!(text.contains("kind: material"));
        assert!(text.contains("version: 1.0"));
        let digest_line = text
            .lines()
            .find(|line| line.starts_with("digest: "))
            .expect("digest line");
        assert_eq!(digest_line.len(), "digest: ".len() + 64);

        let again = build_with_progress(&scheduler, temp.path()).expect("rebuild");
        assert_eq!(
            again
                .outcome_for(&temp.path().join("stone.mat"))
                .and_then(|outcome| outcome.state()),
            Some(CompileState::UpToDate)
        );
    }

    #[test]
    fn inspect_rejects_unregistered_and_corrupt_files() {
        let temp = TempDir::new().expect("temp");
        let registry = builtin_registry(&PipelineConfig::default()).expect("registry");

        let stray = temp.path().join("notes.txtc");
        fs::write(&stray, b"x").expect("write");
        assert!(matches!(
            inspect(&stray, &registry),
            Err(AppError::UnknownCompiledKind { .. })
        ));

        let corrupt = temp.path().join("stone.matc");
        fs::write(&corrupt, b"\x01\x00").expect("write");
        assert!(matches!(
            inspect(&corrupt, &registry),
            Err(AppError::Inspect { .. })
        ));
    }

    #[test]
    fn pass_through_outputs_inspect_without_header() {
        let temp = TempDir::new().expect("temp");
        let registry = builtin_registry(&PipelineConfig::default()).expect("registry");
        let clip = temp.path().join("hit.wavc");
        fs::write(&clip, b"RIFF").expect("write");
        let text = inspect(&clip, &registry).expect("inspect");
        assert!(text.contains("kind: raw"));
        assert!(text.contains("size_bytes: 4"));
    }

    #[test]
    fn compiler_listing_names_every_builtin() {
        let registry = builtin_registry(&PipelineConfig::default()).expect("registry");
        let listing = list_compilers(&registry);
        assert_eq!(listing.lines().count(), registry.len());
        assert!(listing.contains("texture extensions=png,jpg,jpeg,tga container=yes"));
        assert!(listing.contains("raw extensions=wav,ogg,bin container=no"));
        assert!(listing.contains("associated=include={base}.inc.glsl"));
    }
}
