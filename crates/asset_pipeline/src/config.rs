use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::thread;

use serde::Deserialize;
use thiserror::Error;

pub const WORKERS_ENV_VAR: &str = "ASSETC_WORKERS";
pub const FONT_HELPER_ENV_VAR: &str = "ASSETC_FONT_HELPER";

/// Build settings. Sources are layered: file, then environment, then the
/// command line, each overriding the previous.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Desired number of parallel batches. `None` means one per available core.
    pub workers: Option<usize>,
    /// Mirror compiled outputs under this directory instead of next to sources.
    pub output_root: Option<PathBuf>,
    pub texture: TextureConfig,
    pub shader: ShaderConfig,
    pub font: FontConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TextureConfig {
    pub mip_levels: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ShaderConfig {
    pub glsl_version: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FontConfig {
    /// Executable used to rasterize glyph atlases.
    pub helper: PathBuf,
}

impl Default for TextureConfig {
    fn default() -> Self {
        Self { mip_levels: 4 }
    }
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self { glsl_version: 450 }
    }
}

impl Default for FontConfig {
    fn default() -> Self {
        Self {
            helper: PathBuf::from("msdf-atlas-gen"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("invalid value for {var}: '{value}' (expected a positive integer)")]
    InvalidEnvValue { var: &'static str, value: String },
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw).map_err(|error| match error {
            ConfigError::Parse { message, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                message,
            },
            other => other,
        })
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw).map_err(|error| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            message: error.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&'static str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(value) = lookup(WORKERS_ENV_VAR) {
            let workers = value
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|workers| *workers > 0)
                .ok_or_else(|| ConfigError::InvalidEnvValue {
                    var: WORKERS_ENV_VAR,
                    value: value.clone(),
                })?;
            self.workers = Some(workers);
        }
        if let Some(value) = lookup(FONT_HELPER_ENV_VAR) {
            if !value.trim().is_empty() {
                self.font.helper = PathBuf::from(value);
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == Some(0) {
            return Err(ConfigError::Invalid("workers must be at least 1".to_string()));
        }
        if self.texture.mip_levels == 0 {
            return Err(ConfigError::Invalid(
                "texture.mip_levels must be at least 1".to_string(),
            ));
        }
        if self.font.helper.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("font.helper must not be empty".to_string()));
        }
        Ok(())
    }

    /// Configured worker count, or the machine's available parallelism.
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1)
        })
    }
}
