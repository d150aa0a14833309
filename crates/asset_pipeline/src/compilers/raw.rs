use crate::config::PipelineConfig;
use crate::content::{succeeded, AssetCompiler, CompileInput, TransformOutput};

/// Copies the source bytes verbatim. Output carries no digest, so these
/// files are rebuilt on every run.
pub struct RawCompiler;

impl RawCompiler {
    pub(crate) fn from_config(_config: &PipelineConfig) -> Box<dyn AssetCompiler> {
        Box::new(Self)
    }
}

impl AssetCompiler for RawCompiler {
    fn kind(&self) -> &'static str {
        "raw"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["wav", "ogg", "bin"]
    }

    fn uses_container(&self) -> bool {
        false
    }

    fn compile(&self, input: &CompileInput) -> TransformOutput {
        succeeded(input.primary().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;
    use crate::content::{compile_file, CompileState};

    #[test]
    fn output_is_a_byte_copy_and_never_up_to_date() {
        let temp = TempDir::new().expect("temp");
        let source = temp.path().join("hit.wav");
        let destination = temp.path().join("hit.wavc");
        fs::write(&source, b"RIFF\x00\x00\x00\x00WAVE").expect("write");

        for _ in 0..2 {
            let result = compile_file(&RawCompiler, &source, &destination);
            assert_eq!(result.state, CompileState::Succeeded);
        }
        assert_eq!(
            fs::read(&destination).expect("read"),
            fs::read(&source).expect("read")
        );
    }
}
