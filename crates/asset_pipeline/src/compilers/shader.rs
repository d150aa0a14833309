use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::content::{
    encode_payload, AssetCompiler, AssociatedPattern, CompileError, CompileInput, TransformOutput,
};

const KIND: &str = "shader";
const INCLUDE: &str = "include";
const ASSOCIATED: &[AssociatedPattern] = &[AssociatedPattern::new(INCLUDE, "{base}.inc.glsl")];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub const ALL: [Self; 2] = [Self::Vertex, Self::Fragment];

    fn define(self) -> &'static str {
        match self {
            Self::Vertex => "VERTEX_SHADER",
            Self::Fragment => "FRAGMENT_SHADER",
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vertex => write!(f, "vertex"),
            Self::Fragment => write!(f, "fragment"),
        }
    }
}

/// Turns one preprocessed stage source into bytecode.
pub trait StageCompiler: Send + Sync {
    fn compile_stage(&self, stage: ShaderStage, source: &str) -> Result<Vec<u32>, CompileError>;
}

/// In-process GLSL -> SPIR-V through naga.
#[derive(Debug, Default)]
pub struct NagaStageCompiler;

impl StageCompiler for NagaStageCompiler {
    fn compile_stage(&self, stage: ShaderStage, source: &str) -> Result<Vec<u32>, CompileError> {
        let options = naga::front::glsl::Options {
            stage: match stage {
                ShaderStage::Vertex => naga::ShaderStage::Vertex,
                ShaderStage::Fragment => naga::ShaderStage::Fragment,
            },
            defines: Default::default(),
        };
        let module = naga::front::glsl::Frontend::default()
            .parse(&options, source)
            .map_err(|errors| CompileError::malformed(KIND, format!("{stage} stage: {errors:?}")))?;

        let info = naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::default(),
        )
        .validate(&module)
        .map_err(|error| {
            CompileError::malformed(KIND, format!("{stage} stage validation: {}", error.as_inner()))
        })?;

        naga::back::spv::write_vec(&module, &info, &naga::back::spv::Options::default(), None)
            .map_err(|error| CompileError::malformed(KIND, format!("{stage} stage spir-v: {error}")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShaderPayload {
    pub vertex: Vec<u32>,
    pub fragment: Vec<u32>,
}

pub struct ShaderCompiler {
    glsl_version: u32,
    stages: Box<dyn StageCompiler>,
}

impl ShaderCompiler {
    pub fn new(glsl_version: u32) -> Self {
        Self::with_stage_compiler(glsl_version, Box::new(NagaStageCompiler))
    }

    pub fn with_stage_compiler(glsl_version: u32, stages: Box<dyn StageCompiler>) -> Self {
        Self {
            glsl_version,
            stages,
        }
    }

    pub(crate) fn from_config(config: &PipelineConfig) -> Box<dyn AssetCompiler> {
        Box::new(Self::new(config.shader.glsl_version))
    }

    fn stage_source(&self, stage: ShaderStage, include: Option<&str>, body: &str) -> String {
        let mut source = format!("#version {}\n#define {}\n", self.glsl_version, stage.define());
        if let Some(include) = include {
            source.push_str(include);
            if !include.ends_with('\n') {
                source.push('\n');
            }
        }
        source.push_str(body);
        source
    }
}

impl AssetCompiler for ShaderCompiler {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["glsl"]
    }

    fn associated_patterns(&self) -> &'static [AssociatedPattern] {
        ASSOCIATED
    }

    fn compile(&self, input: &CompileInput) -> TransformOutput {
        let body = utf8(input.primary(), "source")?;
        if declares_version(body) {
            return Err(CompileError::malformed(
                KIND,
                "source must not declare #version; it is supplied by the pipeline",
            ));
        }
        let include = input
            .associated(INCLUDE)
            .map(|bytes| utf8(bytes, "include"))
            .transpose()?;

        let mut outputs = Vec::with_capacity(ShaderStage::ALL.len());
        for stage in ShaderStage::ALL {
            let source = self.stage_source(stage, include, body);
            outputs.push(self.stages.compile_stage(stage, &source)?);
        }
        let fragment = outputs.pop().unwrap_or_default();
        let vertex = outputs.pop().unwrap_or_default();
        Ok(encode_payload(&ShaderPayload { vertex, fragment })?)
    }
}

fn utf8<'a>(bytes: &'a [u8], what: &str) -> Result<&'a str, CompileError> {
    std::str::from_utf8(bytes)
        .map_err(|error| CompileError::malformed(KIND, format!("{what} is not utf-8: {error}")))
}

fn declares_version(source: &str) -> bool {
    source
        .lines()
        .any(|line| line.trim_start().starts_with("#version"))
}
