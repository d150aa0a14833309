use serde::{Deserialize, Serialize};

pub const BLOCK_DIM: u32 = 4;
pub const BLOCK_BYTES: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockFormat {
    Bc3,
    Bc5,
}

impl BlockFormat {
    pub fn label(self) -> &'static str {
        match self {
            Self::Bc3 => "bc3",
            Self::Bc5 => "bc5",
        }
    }
}

pub fn level_len(width: u32, height: u32) -> usize {
    blocks_along(width) as usize * blocks_along(height) as usize * BLOCK_BYTES
}

/// Partial edge blocks repeat the last row/column.
pub fn compress_level(rgba: &[u8], width: u32, height: u32, format: BlockFormat) -> Vec<u8> {
    let mut out = Vec::with_capacity(level_len(width, height));
    for block_y in 0..blocks_along(height) {
        for block_x in 0..blocks_along(width) {
            let texels = gather_block(rgba, width, height, block_x, block_y);
            match format {
                BlockFormat::Bc3 => {
                    out.extend_from_slice(&encode_bc4(&channel(&texels, 3)));
                    out.extend_from_slice(&encode_color(&texels));
                }
                BlockFormat::Bc5 => {
                    out.extend_from_slice(&encode_bc4(&channel(&texels, 0)));
                    out.extend_from_slice(&encode_bc4(&channel(&texels, 1)));
                }
            }
        }
    }
    out
}

fn blocks_along(extent: u32) -> u32 {
    extent.max(1).div_ceil(BLOCK_DIM)
}

fn gather_block(rgba: &[u8], width: u32, height: u32, block_x: u32, block_y: u32) -> [[u8; 4]; 16] {
    let mut texels = [[0u8; 4]; 16];
    for (index, texel) in texels.iter_mut().enumerate() {
        let x = (block_x * BLOCK_DIM + index as u32 % BLOCK_DIM).min(width.saturating_sub(1));
        let y = (block_y * BLOCK_DIM + index as u32 / BLOCK_DIM).min(height.saturating_sub(1));
        let offset = (y as usize * width as usize + x as usize) * 4;
        if let Some(pixel) = rgba.get(offset..offset + 4) {
            texel.copy_from_slice(pixel);
        }
    }
    texels
}

fn channel(texels: &[[u8; 4]; 16], index: usize) -> [u8; 16] {
    let mut values = [0u8; 16];
    for (value, texel) in values.iter_mut().zip(texels) {
        *value = texel[index];
    }
    values
}

pub(crate) fn bc4_palette(e0: u8, e1: u8) -> [u8; 8] {
    let (a, b) = (u16::from(e0), u16::from(e1));
    let mut palette = [e0, e1, 0, 0, 0, 0, 0, 0];
    if e0 > e1 {
        for step in 1..7u16 {
            palette[step as usize + 1] = (((7 - step) * a + step * b) / 7) as u8;
        }
    } else {
        for step in 1..5u16 {
            palette[step as usize + 1] = (((5 - step) * a + step * b) / 5) as u8;
        }
        palette[6] = 0;
        palette[7] = 255;
    }
    palette
}

pub(crate) fn encode_bc4(values: &[u8; 16]) -> [u8; 8] {
    let max = values.iter().copied().max().unwrap_or(0);
    let min = values.iter().copied().min().unwrap_or(0);
    let mut block = [max, min, 0, 0, 0, 0, 0, 0];
    if max == min {
        return block;
    }

    let palette = bc4_palette(max, min);
    let mut bits = 0u64;
    for (texel, &value) in values.iter().enumerate() {
        let index = nearest(&palette, |entry| {
            let delta = i32::from(*entry) - i32::from(value);
            (delta * delta) as u32
        });
        bits |= (index as u64) << (3 * texel);
    }
    block[2..8].copy_from_slice(&bits.to_le_bytes()[..6]);
    block
}

// Endpoints are the two texels farthest apart.
pub(crate) fn encode_color(texels: &[[u8; 4]; 16]) -> [u8; 8] {
    let (first, second) = farthest_pair(texels);
    let (mut c0, mut c1) = (to_565(first), to_565(second));
    if c0 < c1 {
        std::mem::swap(&mut c0, &mut c1);
    }

    let mut block = [0u8; 8];
    block[0..2].copy_from_slice(&c0.to_le_bytes());
    block[2..4].copy_from_slice(&c1.to_le_bytes());
    if c0 == c1 {
        return block;
    }

    let palette = color_palette(c0, c1);
    let mut bits = 0u32;
    for (index, texel) in texels.iter().enumerate() {
        let entry = nearest(&palette, |candidate| rgb_distance(*candidate, rgb(texel)));
        bits |= (entry as u32) << (2 * index);
    }
    block[4..8].copy_from_slice(&bits.to_le_bytes());
    block
}

fn farthest_pair(texels: &[[u8; 4]; 16]) -> ([u8; 3], [u8; 3]) {
    let mut best = (rgb(&texels[0]), rgb(&texels[0]));
    let mut best_distance = 0;
    for (index, a) in texels.iter().enumerate() {
        for b in &texels[index + 1..] {
            let distance = rgb_distance(rgb(a), rgb(b));
            if distance > best_distance {
                best_distance = distance;
                best = (rgb(a), rgb(b));
            }
        }
    }
    best
}

fn rgb(texel: &[u8; 4]) -> [u8; 3] {
    [texel[0], texel[1], texel[2]]
}

fn rgb_distance(a: [u8; 3], b: [u8; 3]) -> u32 {
    (0..3)
        .map(|c| {
            let delta = i32::from(a[c]) - i32::from(b[c]);
            (delta * delta) as u32
        })
        .sum()
}

pub(crate) fn color_palette(c0: u16, c1: u16) -> [[u8; 3]; 4] {
    let a = from_565(c0);
    let b = from_565(c1);
    let mut palette = [a, b, [0; 3], [0; 3]];
    for c in 0..3 {
        let (x, y) = (u32::from(a[c]), u32::from(b[c]));
        palette[2][c] = ((2 * x + y) / 3) as u8;
        palette[3][c] = ((x + 2 * y) / 3) as u8;
    }
    palette
}

fn to_565(rgb: [u8; 3]) -> u16 {
    (u16::from(rgb[0] >> 3) << 11) | (u16::from(rgb[1] >> 2) << 5) | u16::from(rgb[2] >> 3)
}

fn from_565(packed: u16) -> [u8; 3] {
    let r = ((packed >> 11) & 0x1f) as u8;
    let g = ((packed >> 5) & 0x3f) as u8;
    let b = (packed & 0x1f) as u8;
    [(r << 3) | (r >> 2), (g << 2) | (g >> 4), (b << 3) | (b >> 2)]
}

fn nearest<T>(palette: &[T], distance: impl Fn(&T) -> u32) -> usize {
    palette
        .iter()
        .enumerate()
        .min_by_key(|(_, entry)| distance(entry))
        .map(|(index, _)| index)
        .unwrap_or(0)
}
