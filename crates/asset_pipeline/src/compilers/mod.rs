pub mod block;
pub mod font;
pub mod material;
pub mod raw;
pub mod shader;
pub mod texture;

use crate::config::PipelineConfig;
use crate::content::{CompilerDescriptor, CompilerRegistry, RegistryError};

/// Every transformer shipped with the pipeline, in registration order.
pub const BUILTIN_COMPILERS: &[CompilerDescriptor] = &[
    CompilerDescriptor {
        kind: "texture",
        create: texture::TextureCompiler::from_config,
    },
    CompilerDescriptor {
        kind: "material",
        create: material::MaterialCompiler::from_config,
    },
    CompilerDescriptor {
        kind: "shader",
        create: shader::ShaderCompiler::from_config,
    },
    CompilerDescriptor {
        kind: "font",
        create: font::FontCompiler::from_config,
    },
    CompilerDescriptor {
        kind: "raw",
        create: raw::RawCompiler::from_config,
    },
];

pub fn builtin_registry(config: &PipelineConfig) -> Result<CompilerRegistry, RegistryError> {
    CompilerRegistry::from_descriptors(BUILTIN_COMPILERS, config)
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    #[test]
    fn builtin_extensions_do_not_overlap() {
        let registry = builtin_registry(&PipelineConfig::default()).expect("registry");
        assert_eq!(registry.len(), BUILTIN_COMPILERS.len());
        for descriptor in BUILTIN_COMPILERS {
            assert!(registry.compilers().any(|c| c.kind() == descriptor.kind));
        }
    }

    #[test]
    fn builtin_lookup_covers_every_format() {
        let registry = builtin_registry(&PipelineConfig::default()).expect("registry");
        let kind = |name: &str| registry.find_for_path(Path::new(name)).map(|c| c.kind());
        assert_eq!(kind("brick.PNG"), Some("texture"));
        assert_eq!(kind("photo.jpeg"), Some("texture"));
        assert_eq!(kind("stone.mat"), Some("material"));
        assert_eq!(kind("lit.glsl"), Some("shader"));
        assert_eq!(kind("body.otf"), Some("font"));
        assert_eq!(kind("hit.ogg"), Some("raw"));
        assert_eq!(kind("notes.txt"), None);
        assert_eq!(
            registry
                .find_for_compiled(Path::new("brick.pngc"))
                .map(|c| c.kind()),
            Some("texture")
        );
    }
}
