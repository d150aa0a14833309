use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use tracing::info;

use crate::config::PipelineConfig;

use super::compiler::{AssetCompiler, COMPILED_SUFFIX};
use super::types::RegistryError;

/// Static registration record. Every built-in transformer exposes one of
/// these and the registry instantiates it exactly once.
#[derive(Clone, Copy)]
pub struct CompilerDescriptor {
    pub kind: &'static str,
    pub create: fn(&PipelineConfig) -> Box<dyn AssetCompiler>,
}

impl fmt::Debug for CompilerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompilerDescriptor")
            .field("kind", &self.kind)
            .finish()
    }
}

/// Extension -> compiler lookup. Immutable once built.
pub struct CompilerRegistry {
    compilers: Vec<Box<dyn AssetCompiler>>,
    by_extension: HashMap<String, usize>,
}

impl fmt::Debug for CompilerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompilerRegistry")
            .field(
                "kinds",
                &self.compilers.iter().map(|c| c.kind()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl CompilerRegistry {
    pub fn from_descriptors(
        descriptors: &[CompilerDescriptor],
        config: &PipelineConfig,
    ) -> Result<Self, RegistryError> {
        Self::from_compilers(
            descriptors
                .iter()
                .map(|descriptor| (descriptor.create)(config))
                .collect(),
        )
    }

    pub fn from_compilers(compilers: Vec<Box<dyn AssetCompiler>>) -> Result<Self, RegistryError> {
        let mut by_extension = HashMap::<String, usize>::new();
        for (index, compiler) in compilers.iter().enumerate() {
            if compiler.extensions().is_empty() {
                return Err(RegistryError::NoExtensions {
                    kind: compiler.kind(),
                });
            }
            for extension in compiler.extensions() {
                let key = extension.to_ascii_lowercase();
                if let Some(&existing) = by_extension.get(&key) {
                    return Err(RegistryError::DuplicateExtension {
                        extension: key,
                        first: compilers[existing].kind(),
                        second: compiler.kind(),
                    });
                }
                by_extension.insert(key, index);
            }
            info!(
                kind = compiler.kind(),
                extensions = ?compiler.extensions(),
                uses_container = compiler.uses_container(),
                "compiler_registered"
            );
        }
        Ok(Self {
            compilers,
            by_extension,
        })
    }

    pub fn find(&self, extension: &str) -> Option<&dyn AssetCompiler> {
        self.by_extension
            .get(&extension.to_ascii_lowercase())
            .map(|&index| self.compilers[index].as_ref())
    }

    /// Source lookup used for compilation. Compiled artifacts do not match.
    pub fn find_for_path(&self, path: &Path) -> Option<&dyn AssetCompiler> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| self.find(ext))
    }

    /// Maps an already-compiled file back to the compiler that produced it.
    pub fn find_for_compiled(&self, path: &Path) -> Option<&dyn AssetCompiler> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        let source_extension = extension.strip_suffix(COMPILED_SUFFIX)?;
        let compiler = self.find(source_extension)?;
        (compiler.destination_extension(source_extension) == extension).then_some(compiler)
    }

    pub fn compilers(&self) -> impl Iterator<Item = &dyn AssetCompiler> {
        self.compilers.iter().map(|compiler| compiler.as_ref())
    }

    pub fn len(&self) -> usize {
        self.compilers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compilers.is_empty()
    }
}
