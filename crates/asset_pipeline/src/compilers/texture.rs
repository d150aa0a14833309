use std::path::Path;

use image::imageops::{self, FilterType};
use image::{ImageFormat, RgbaImage};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::PipelineConfig;
use crate::content::{encode_payload, AssetCompiler, CompileError, CompileInput, TransformOutput};

use super::block::{compress_level, BlockFormat};

const KIND: &str = "texture";
const NORMAL_MAP_SUFFIXES: &[&str] = &["_n", "_nrm", "_normal"];

/// Block-compressed mip chain. `mips[0]` is the full-resolution level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TexturePayload {
    pub format: BlockFormat,
    pub width: u32,
    pub height: u32,
    pub mip_lengths: Vec<u32>,
    pub mips: Vec<Vec<u8>>,
}

pub struct TextureCompiler {
    mip_levels: u32,
}

impl TextureCompiler {
    pub fn new(mip_levels: u32) -> Self {
        Self {
            mip_levels: mip_levels.max(1),
        }
    }

    pub(crate) fn from_config(config: &PipelineConfig) -> Box<dyn AssetCompiler> {
        Box::new(Self::new(config.texture.mip_levels))
    }

    /// Builds the mip chain for an already-decoded image.
    pub fn compress_image(&self, image: &RgbaImage, format: BlockFormat) -> TexturePayload {
        let (width, height) = image.dimensions();
        let levels = self.mip_levels.min(full_chain_len(width, height));

        let mut mips = Vec::with_capacity(levels as usize);
        mips.push(compress_level(image.as_raw(), width, height, format));
        for level in 1..levels {
            let level_width = (width >> level).max(1);
            let level_height = (height >> level).max(1);
            let scaled = imageops::resize(image, level_width, level_height, FilterType::Triangle);
            mips.push(compress_level(scaled.as_raw(), level_width, level_height, format));
        }

        TexturePayload {
            format,
            width,
            height,
            mip_lengths: mips.iter().map(|mip| mip.len() as u32).collect(),
            mips,
        }
    }
}

impl AssetCompiler for TextureCompiler {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["png", "jpg", "jpeg", "tga"]
    }

    fn compile(&self, input: &CompileInput) -> TransformOutput {
        let image = decode_image(input.primary(), input.source_extension().as_deref())?;
        let format = input
            .source_path()
            .map(format_for_path)
            .unwrap_or(BlockFormat::Bc3);
        let payload = self.compress_image(&image, format);
        debug!(
            width = payload.width,
            height = payload.height,
            mips = payload.mips.len(),
            format = format.label(),
            "texture_encoded"
        );
        Ok(encode_payload(&payload)?)
    }
}

pub(crate) fn decode_image(bytes: &[u8], extension: Option<&str>) -> Result<RgbaImage, CompileError> {
    let decoded = match extension.and_then(ImageFormat::from_extension) {
        Some(format) => image::load_from_memory_with_format(bytes, format),
        None => image::load_from_memory(bytes),
    };
    decoded
        .map(|image| image.to_rgba8())
        .map_err(|error| CompileError::malformed(KIND, error.to_string()))
}

/// Normal maps are recognized by their file stem and get two-channel BC5.
pub fn format_for_path(path: &Path) -> BlockFormat {
    let stem = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    if NORMAL_MAP_SUFFIXES
        .iter()
        .any(|suffix| stem.ends_with(suffix))
    {
        BlockFormat::Bc5
    } else {
        BlockFormat::Bc3
    }
}

fn full_chain_len(width: u32, height: u32) -> u32 {
    u32::BITS - width.max(height).max(1).leading_zeros()
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::path::PathBuf;

    use super::*;
    use crate::compilers::block::level_len;
    use crate::content::{decode_payload, AssociatedData};

    fn png(width: u32, height: u32) -> Vec<u8> {
        let image = RgbaImage::from_fn(width, height, |x, y| {
            image::Rgba([(x * 7) as u8, (y * 11) as u8, 128, 255])
        });
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgba8(image)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .expect("encode png");
        bytes
    }

    fn input(name: &str, bytes: Vec<u8>) -> CompileInput {
        CompileInput::new(Some(PathBuf::from(name)), bytes, AssociatedData::new())
    }

    #[test]
    fn mip_chain_halves_each_level() {
        let compiler = TextureCompiler::new(4);
        let bytes = compiler.compile(&input("wall.png", png(32, 16))).expect("compile");
        let payload: TexturePayload = decode_payload(&bytes).expect("payload");

        assert_eq!(payload.format, BlockFormat::Bc3);
        assert_eq!((payload.width, payload.height), (32, 16));
        assert_eq!(payload.mips.len(), 4);
        let expected = [level_len(32, 16), level_len(16, 8), level_len(8, 4), level_len(4, 2)];
        for (level, mip) in payload.mips.iter().enumerate() {
            assert_eq!(mip.len(), expected[level]);
            assert_eq!(payload.mip_lengths[level] as usize, mip.len());
        }
    }

    #[test]
    fn mip_count_stops_at_one_by_one() {
        let compiler = TextureCompiler::new(8);
        let payload = compiler.compress_image(&RgbaImage::new(4, 2), BlockFormat::Bc3);
        assert_eq!(payload.mips.len(), 3);
        assert_eq!(full_chain_len(1, 1), 1);
        assert_eq!(full_chain_len(1024, 1), 11);
    }

    #[test]
    fn normal_map_stems_select_bc5() {
        assert_eq!(format_for_path(Path::new("rock_n.png")), BlockFormat::Bc5);
        assert_eq!(format_for_path(Path::new("rock_NRM.tga")), BlockFormat::Bc5);
        assert_eq!(format_for_path(Path::new("rock_normal.jpg")), BlockFormat::Bc5);
        assert_eq!(format_for_path(Path::new("rock.png")), BlockFormat::Bc3);
        assert_eq!(format_for_path(Path::new("rock_nice.png")), BlockFormat::Bc3);

        let bytes = TextureCompiler::new(1)
            .compile(&input("rock_n.png", png(8, 8)))
            .expect("compile");
        let payload: TexturePayload = decode_payload(&bytes).expect("payload");
        assert_eq!(payload.format, BlockFormat::Bc5);
    }

    #[test]
    fn corrupt_image_is_malformed() {
        let error = TextureCompiler::new(4)
            .compile(&input("broken.png", b"not a png".to_vec()))
            .expect_err("corrupt");
        assert!(matches!(error, CompileError::Malformed { kind: "texture", .. }));
    }
}
