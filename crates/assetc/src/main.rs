use std::path::PathBuf;
use std::process::ExitCode;

use asset_pipeline::{builtin_registry, PipelineConfig};
use assetc::{inspect, list_compilers, run_build, AppError, BuildOptions};
use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Offline asset compiler.
#[derive(Parser, Debug)]
#[command(name = "assetc", version, about = "Compile source assets into runtime-ready files")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile one file, or every recognized file under a directory.
    Build {
        target: PathBuf,
        /// Mirror compiled outputs under this directory.
        #[arg(long = "out")]
        output_root: Option<PathBuf>,
        /// Number of parallel batches.
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        workers: Option<u64>,
        /// TOML settings file.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print the container header of a compiled file.
    Inspect { path: PathBuf },
    /// List registered compilers.
    Compilers,
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    match run(cli.command) {
        Ok(code) => code,
        Err(err) => {
            error!(error = %err, "assetc_failed");
            eprintln!("{err}");
            ExitCode::from(2)
        }
    }
}

fn run(command: Command) -> Result<ExitCode, AppError> {
    match command {
        Command::Build {
            target,
            output_root,
            workers,
            config,
        } => {
            let options = BuildOptions {
                target,
                config_file: config,
                output_root,
                workers: workers.map(|workers| workers as usize),
            };
            let report = run_build(&options)?;
            println!("{}", report.render_human_readable());
            Ok(if report.has_failures() {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            })
        }
        Command::Inspect { path } => {
            let registry = builtin_registry(&PipelineConfig::default())?;
            println!("{}", inspect(&path, &registry)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Compilers => {
            let registry = builtin_registry(&PipelineConfig::default())?;
            println!("{}", list_compilers(&registry));
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}
