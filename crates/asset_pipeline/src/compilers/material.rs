use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::content::{encode_payload, AssetCompiler, CompileError, CompileInput, TransformOutput};

const KIND: &str = "material";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendMode {
    #[default]
    Opaque,
    Masked,
    Alpha,
    Additive,
}

/// Surface description authored as JSON. Stored in the container unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Material {
    pub shader: String,
    #[serde(default)]
    pub textures: BTreeMap<String, String>,
    #[serde(default)]
    pub scalars: BTreeMap<String, f32>,
    #[serde(default)]
    pub vectors: BTreeMap<String, [f32; 4]>,
    #[serde(default)]
    pub blend: BlendMode,
    #[serde(default)]
    pub double_sided: bool,
}

pub struct MaterialCompiler;

impl MaterialCompiler {
    pub(crate) fn from_config(_config: &PipelineConfig) -> Box<dyn AssetCompiler> {
        Box::new(Self)
    }
}

impl AssetCompiler for MaterialCompiler {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["mat"]
    }

    fn compile(&self, input: &CompileInput) -> TransformOutput {
        let material = parse_material(input.primary())?;
        Ok(encode_payload(&material)?)
    }
}

pub fn parse_material(bytes: &[u8]) -> Result<Material, CompileError> {
    let mut deserializer = serde_json::Deserializer::from_slice(bytes);
    let material = match serde_path_to_error::deserialize::<_, Material>(&mut deserializer) {
        Ok(material) => material,
        Err(error) => {
            let path = error.path().to_string();
            let source = error.into_inner();
            return Err(if path.is_empty() || path == "." {
                CompileError::malformed(KIND, source.to_string())
            } else {
                CompileError::malformed(KIND, format!("at {path}: {source}"))
            });
        }
    };
    if material.shader.trim().is_empty() {
        return Err(CompileError::malformed(KIND, "at shader: must not be empty"));
    }
    Ok(material)
}
