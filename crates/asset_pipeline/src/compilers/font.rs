use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tracing::info;

use crate::config::PipelineConfig;
use crate::content::{
    encode_payload, AssetCompiler, AssociatedPattern, CompileError, CompileInput,
    TransformOutput,
};

use super::block::BlockFormat;
use super::texture::{decode_image, TextureCompiler, TexturePayload};

const KIND: &str = "font";
const CHARSET: &str = "charset";
const ASSOCIATED: &[AssociatedPattern] = &[AssociatedPattern::new(CHARSET, "{base}.charset")];

/// Paths handed to the atlas helper. All of them live in a per-call work
/// directory that is removed when the compile returns.
#[derive(Debug, Clone, Copy)]
pub struct AtlasRequest<'a> {
    pub font: &'a Path,
    pub charset: Option<&'a Path>,
    pub atlas_image: &'a Path,
    pub metrics_json: &'a Path,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtlasResponse {
    /// `None` when the helper was killed by a signal.
    pub exit_code: Option<i32>,
}

impl AtlasResponse {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Produces a glyph atlas image and its metrics for one font file.
pub trait AtlasGenerator: Send + Sync {
    fn tool(&self) -> String;

    /// Errors only when the helper could not be run at all. A helper that ran
    /// and failed reports through the exit code.
    fn generate(&self, request: &AtlasRequest<'_>) -> Result<AtlasResponse, CompileError>;
}

/// Runs an msdf-atlas-gen compatible executable.
#[derive(Debug, Clone)]
pub struct ProcessAtlasGenerator {
    program: PathBuf,
}

impl ProcessAtlasGenerator {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl AtlasGenerator for ProcessAtlasGenerator {
    fn tool(&self) -> String {
        self.program.display().to_string()
    }

    fn generate(&self, request: &AtlasRequest<'_>) -> Result<AtlasResponse, CompileError> {
        let mut command = Command::new(&self.program);
        command.arg("-font").arg(request.font);
        if let Some(charset) = request.charset {
            command.arg("-charset").arg(charset);
        }
        command
            .args(["-type", "msdf", "-format", "png"])
            .arg("-imageout")
            .arg(request.atlas_image)
            .arg("-json")
            .arg(request.metrics_json)
            .stdin(Stdio::null())
            .stdout(Stdio::null());

        info!(
            tool = %self.program.display(),
            font = %request.font.display(),
            charset = request.charset.is_some(),
            "font_helper_invoked"
        );
        let status = command.status().map_err(|source| CompileError::HelperLaunch {
            tool: self.tool(),
            source,
        })?;
        Ok(AtlasResponse {
            exit_code: status.code(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FontMetrics {
    pub atlas: AtlasLayout,
    pub metrics: LineMetrics,
    #[serde(default)]
    pub glyphs: Vec<Glyph>,
    #[serde(default)]
    pub kerning: Vec<KerningPair>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AtlasLayout {
    #[serde(rename = "type")]
    pub kind: String,
    pub distance_range: f32,
    pub size: f32,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub y_origin: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineMetrics {
    pub em_size: f32,
    pub line_height: f32,
    pub ascender: f32,
    pub descender: f32,
    #[serde(default)]
    pub underline_y: f32,
    #[serde(default)]
    pub underline_thickness: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Glyph {
    pub unicode: u32,
    pub advance: f32,
    #[serde(default)]
    pub plane_bounds: Option<Bounds>,
    #[serde(default)]
    pub atlas_bounds: Option<Bounds>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub left: f32,
    pub bottom: f32,
    pub right: f32,
    pub top: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KerningPair {
    pub unicode1: u32,
    pub unicode2: u32,
    pub advance: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FontPayload {
    pub metrics: FontMetrics,
    pub atlas: TexturePayload,
}

pub struct FontCompiler {
    generator: Box<dyn AtlasGenerator>,
    atlas: TextureCompiler,
}

impl FontCompiler {
    pub fn new(generator: Box<dyn AtlasGenerator>) -> Self {
        Self {
            generator,
            // Distance fields do not survive downsampling; one level only.
            atlas: TextureCompiler::new(1),
        }
    }

    pub(crate) fn from_config(config: &PipelineConfig) -> Box<dyn AssetCompiler> {
        Box::new(Self::new(Box::new(ProcessAtlasGenerator::new(
            config.font.helper.clone(),
        ))))
    }

    fn read_outputs(&self, atlas_path: &Path, metrics_path: &Path) -> TransformOutput {
        let metrics_bytes = read_helper_output(metrics_path)?;
        let mut deserializer = serde_json::Deserializer::from_slice(&metrics_bytes);
        let metrics = serde_path_to_error::deserialize::<_, FontMetrics>(&mut deserializer)
            .map_err(|error| {
                CompileError::malformed(KIND, format!("metrics at {}: {}", error.path(), error.inner()))
            })?;

        let atlas_bytes = read_helper_output(atlas_path)?;
        let image = decode_image(&atlas_bytes, Some("png"))?;
        let atlas = self.atlas.compress_image(&image, BlockFormat::Bc3);
        Ok(encode_payload(&FontPayload { metrics, atlas })?)
    }
}

impl AssetCompiler for FontCompiler {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["ttf", "otf"]
    }

    fn associated_patterns(&self) -> &'static [AssociatedPattern] {
        ASSOCIATED
    }

    fn compile(&self, input: &CompileInput) -> TransformOutput {
        let workdir = TempDir::new().map_err(|source| CompileError::Write {
            path: std::env::temp_dir(),
            source,
        })?;
        let extension = input.source_extension().unwrap_or_else(|| "ttf".to_string());
        let font_path = workdir.path().join(format!("font.{extension}"));
        write_input(&font_path, input.primary())?;
        let charset_path = match input.associated(CHARSET) {
            Some(bytes) => {
                let path = workdir.path().join("glyphs.charset");
                write_input(&path, bytes)?;
                Some(path)
            }
            None => None,
        };
        let atlas_path = workdir.path().join("atlas.png");
        let metrics_path = workdir.path().join("metrics.json");

        let request = AtlasRequest {
            font: &font_path,
            charset: charset_path.as_deref(),
            atlas_image: &atlas_path,
            metrics_json: &metrics_path,
        };
        let response = self.generator.generate(&request)?;
        if !response.success() {
            return Err(CompileError::HelperExit {
                tool: self.generator.tool(),
                code: response.exit_code,
            });
        }
        self.read_outputs(&atlas_path, &metrics_path)
    }
}

fn write_input(path: &Path, bytes: &[u8]) -> Result<(), CompileError> {
    fs::write(path, bytes).map_err(|source| CompileError::Write {
        path: path.to_path_buf(),
        source,
    })
}

fn read_helper_output(path: &Path) -> Result<Vec<u8>, CompileError> {
    fs::read(path).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            CompileError::MissingResource(format!("atlas helper output {}", path.display()))
        } else {
            CompileError::Read {
                path: path.to_path_buf(),
                source,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};

    use image::{ImageFormat, RgbaImage};

    use super::*;
    use crate::content::{decode_payload, AssociatedData};

    const METRICS: &str = r#"{
        "atlas": { "type": "msdf", "distanceRange": 2, "size": 32.5, "width": 8, "height": 8, "yOrigin": "bottom" },
        "metrics": { "emSize": 1, "lineHeight": 1.2, "ascender": -0.9, "descender": 0.25 },
        "glyphs": [
            { "unicode": 32, "advance": 0.25 },
            { "unicode": 65, "advance": 0.6,
              "planeBounds": { "left": 0.0, "bottom": 0.0, "right": 0.6, "top": 0.7 },
              "atlasBounds": { "left": 0.5, "bottom": 0.5, "right": 7.5, "top": 7.5 } }
        ],
        "kerning": []
    }"#;

    #[derive(Default)]
    struct Seen {
        charset: Option<String>,
        outputs: Vec<PathBuf>,
    }

    /// Writes canned outputs, optionally failing after a partial write.
    struct FakeHelper {
        exit_code: i32,
        seen: Arc<Mutex<Seen>>,
    }

    impl AtlasGenerator for FakeHelper {
        fn tool(&self) -> String {
            "fake-atlas".to_string()
        }

        fn generate(&self, request: &AtlasRequest<'_>) -> Result<AtlasResponse, CompileError> {
            let mut seen = self.seen.lock().expect("lock");
            seen.charset = request
                .charset
                .map(|path| fs::read_to_string(path).expect("charset"));
            seen.outputs = vec![
                request.atlas_image.to_path_buf(),
                request.metrics_json.to_path_buf(),
            ];

            let mut png = Vec::new();
            image::DynamicImage::ImageRgba8(RgbaImage::new(8, 8))
                .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
                .expect("png");
            fs::write(request.atlas_image, png).expect("atlas");
            if self.exit_code == 0 {
                fs::write(request.metrics_json, METRICS).expect("metrics");
            }
            Ok(AtlasResponse {
                exit_code: Some(self.exit_code),
            })
        }
    }

    fn font_input(charset: Option<&str>) -> CompileInput {
        let mut associated = AssociatedData::new();
        if let Some(charset) = charset {
            associated.insert(CHARSET.to_string(), charset.as_bytes().to_vec());
        }
        CompileInput::new(
            Some(PathBuf::from("ui/body.ttf")),
            b"\x00\x01\x00\x00font".to_vec(),
            associated,
        )
    }

    #[test]
    fn helper_outputs_merge_into_one_payload() {
        let seen = Arc::new(Mutex::new(Seen::default()));
        let compiler = FontCompiler::new(Box::new(FakeHelper {
            exit_code: 0,
            seen: Arc::clone(&seen),
        }));

        let bytes = compiler
            .compile(&font_input(Some("\"ABC\"")))
            .expect("compile");
        let payload: FontPayload = decode_payload(&bytes).expect("payload");
        assert_eq!(payload.metrics.atlas.width, 8);
        assert_eq!(payload.metrics.glyphs.len(), 2);
        assert!(payload.metrics.glyphs[0].plane_bounds.is_none());
        assert_eq!(payload.atlas.mips.len(), 1);
        assert_eq!(
            seen.lock().expect("lock").charset.as_deref(),
            Some("\"ABC\"")
        );
    }

    #[test]
    fn charset_is_optional() {
        let seen = Arc::new(Mutex::new(Seen::default()));
        let compiler = FontCompiler::new(Box::new(FakeHelper {
            exit_code: 0,
            seen: Arc::clone(&seen),
        }));
        compiler.compile(&font_input(None)).expect("compile");
        assert!(seen.lock().expect("lock").charset.is_none());
    }

    #[test]
    fn nonzero_exit_fails_and_removes_partial_outputs() {
        let seen = Arc::new(Mutex::new(Seen::default()));
        let compiler = FontCompiler::new(Box::new(FakeHelper {
            exit_code: 3,
            seen: Arc::clone(&seen),
        }));

        let error = compiler.compile(&font_input(None)).expect_err("helper failed");
        assert!(matches!(
            error,
            CompileError::HelperExit { code: Some(3), ref tool } if tool == "fake-atlas"
        ));
        let seen = seen.lock().expect("lock");
        assert_eq!(seen.outputs.len(), 2);
        for output in &seen.outputs {
            assert!(!output.exists(), "{} left behind", output.display());
            let workdir = output.parent().expect("workdir");
            assert!(!workdir.exists(), "{} left behind", workdir.display());
        }
    }

    #[test]
    fn missing_helper_executable_is_a_launch_error() {
        let compiler = FontCompiler::new(Box::new(ProcessAtlasGenerator::new(
            "assetc-definitely-not-installed-atlas-helper",
        )));
        let error = compiler.compile(&font_input(None)).expect_err("launch");
        assert!(matches!(error, CompileError::HelperLaunch { .. }));
    }
}
