//! Indexed-color support: palette expansion to direct formats and the
//! octree quantizer used when an encoder prefers indexed output.

use raster_core::{
    area::PixelArea,
    buffer::{rent_local_aligned, BufferLease},
    error::Error,
    invalid_param_error,
    pixel::PixelFormat,
    source::{check_copy_args, ChainedPixelSource, PixelSource},
    Result,
};

pub const MAX_PALETTE: usize = 256;

/// Palette entries are packed `0xAARRGGBB`.
#[inline]
fn entry_bgra(entry: u32) -> [u8; 4] {
    [(entry & 0xFF) as u8, (entry >> 8) as u8, (entry >> 16) as u8, (entry >> 24) as u8]
}

fn palette_is_opaque(palette: &[u32]) -> bool {
    palette.iter().all(|e| e >> 24 == 0xFF)
}

fn palette_is_grey(palette: &[u32]) -> bool {
    palette.iter().all(|e| {
        let [b, g, r, _] = entry_bgra(*e);
        b == g && g == r
    })
}

/// Expands `Indexed8` to the narrowest direct format the palette allows:
/// `Grey8` for an opaque greyscale palette, `Bgr24` when merely opaque,
/// `Bgra32` otherwise.
pub struct PaletteSource {
    source: Box<dyn PixelSource>,
    palette: Vec<u32>,
    format: PixelFormat,
    index_line: BufferLease,
}

impl PaletteSource {
    pub fn new(source: Box<dyn PixelSource>, palette: Vec<u32>) -> Result<Self> {
        if source.format() != PixelFormat::Indexed8 {
            return Err(invalid_param_error!(source.format()));
        }
        if palette.is_empty() || palette.len() > MAX_PALETTE {
            return Err(invalid_param_error!(palette.len()));
        }

        let format = if palette_is_opaque(&palette) {
            if palette_is_grey(&palette) {
                PixelFormat::Grey8
            } else {
                PixelFormat::Bgr24
            }
        } else {
            PixelFormat::Bgra32
        };

        let index_line = rent_local_aligned(source.width() as usize);

        Ok(Self {
            source,
            palette,
            format,
            index_line,
        })
    }
}

impl PixelSource for PaletteSource {
    fn format(&self) -> PixelFormat {
        self.format
    }

    fn width(&self) -> u32 {
        self.source.width()
    }

    fn height(&self) -> u32 {
        self.source.height()
    }

    fn copy_pixels(&mut self, area: PixelArea, stride: usize, buf: &mut [u8]) -> Result<()> {
        let line_bytes = check_copy_args(self, &area, stride, buf.len())?;

        for row in 0..area.height {
            let line_area = PixelArea::new(area.x, area.y + row, area.width, 1);
            let width = area.width as usize;
            self.source.copy_pixels(line_area, width, &mut self.index_line[..width])?;

            let dst = &mut buf[row as usize * stride..][..line_bytes];
            match self.format {
                PixelFormat::Grey8 => {
                    for (i, d) in self.index_line[..width].iter().zip(dst.iter_mut()) {
                        let entry = *self.palette.get(*i as usize).ok_or(invalid_param_error!(i))?;
                        *d = (entry & 0xFF) as u8;
                    }
                }
                PixelFormat::Bgr24 => {
                    for (i, d) in self.index_line[..width].iter().zip(dst.chunks_exact_mut(3)) {
                        let entry = *self.palette.get(*i as usize).ok_or(invalid_param_error!(i))?;
                        d.copy_from_slice(&entry_bgra(entry)[..3]);
                    }
                }
                PixelFormat::Bgra32 => {
                    for (i, d) in self.index_line[..width].iter().zip(dst.chunks_exact_mut(4)) {
                        let entry = *self.palette.get(*i as usize).ok_or(invalid_param_error!(i))?;
                        d.copy_from_slice(&entry_bgra(entry));
                    }
                }
                _ => unreachable!(),
            }
        }

        Ok(())
    }

    fn as_chained_ref(&self) -> Option<&dyn ChainedPixelSource> {
        Some(self)
    }

    fn as_chained_mut(&mut self) -> Option<&mut dyn ChainedPixelSource> {
        Some(self)
    }
}

impl ChainedPixelSource for PaletteSource {
    fn source(&self) -> &dyn PixelSource {
        self.source.as_ref()
    }

    fn source_mut(&mut self) -> &mut dyn PixelSource {
        self.source.as_mut()
    }

    fn replace_source(&mut self, source: Box<dyn PixelSource>) {
        self.source = source;
    }
}

/// Dithering policy for quantized output.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum DitherMode {
    #[default]
    ErrorDiffusion,
    None,
}

/// Result of quantizing a frame to at most 256 palette entries.
pub struct QuantizedFrame {
    pub width: u32,
    pub height: u32,
    pub palette: Vec<u32>,
    pub indices: Vec<u8>,
    /// True when the source held no more distinct colors than the palette;
    /// dithering is skipped in that case.
    pub is_exact: bool,
}

const TREE_DEPTH: usize = 6;

#[derive(Default)]
struct OctreeNode {
    children: [u32; 8],
    count: u64,
    b: u64,
    g: u64,
    r: u64,
    a: u64,
    leaf: bool,
}

/// Octree color quantizer over `Bgra32` input.
pub struct OctreeQuantizer {
    nodes: Vec<OctreeNode>,
    leaves: usize,
}

const NO_CHILD: u32 = 0;

impl OctreeQuantizer {
    pub fn new() -> Self {
        Self {
            nodes: vec![OctreeNode::default()],
            leaves: 0,
        }
    }

    fn child_slot(pixel: &[u8], level: usize) -> usize {
        let shift = 7 - level;
        (((pixel[2] >> shift) & 1) << 2 | ((pixel[1] >> shift) & 1) << 1 | ((pixel[0] >> shift) & 1)) as usize
    }

    fn insert(&mut self, pixel: &[u8]) {
        let mut node = 0usize;
        for level in 0..TREE_DEPTH {
            let slot = Self::child_slot(pixel, level);
            let mut next = self.nodes[node].children[slot];
            if next == NO_CHILD {
                self.nodes.push(OctreeNode::default());
                next = (self.nodes.len() - 1) as u32;
                self.nodes[node].children[slot] = next;
                if level == TREE_DEPTH - 1 {
                    self.nodes[next as usize].leaf = true;
                    self.leaves += 1;
                }
            }
            node = next as usize;
        }

        let leaf = &mut self.nodes[node];
        leaf.count += 1;
        leaf.b += pixel[0] as u64;
        leaf.g += pixel[1] as u64;
        leaf.r += pixel[2] as u64;
        leaf.a += pixel[3] as u64;
    }

    /// Merges the deepest interior nodes until at most `limit` leaves remain.
    fn reduce(&mut self, limit: usize) {
        for level in (0..TREE_DEPTH - 1).rev() {
            if self.leaves <= limit {
                return;
            }
            let interior = self.interior_at_level(level);
            for node in interior {
                if self.leaves <= limit {
                    return;
                }
                self.merge_children(node);
            }
        }
    }

    fn interior_at_level(&self, target: usize) -> Vec<usize> {
        let mut out = Vec::new();
        let mut stack = vec![(0usize, 0usize)];
        while let Some((node, level)) = stack.pop() {
            if level == target {
                if !self.nodes[node].leaf && self.nodes[node].children.iter().any(|&c| c != NO_CHILD) {
                    out.push(node);
                }
                continue;
            }
            for &child in &self.nodes[node].children {
                if child != NO_CHILD {
                    stack.push((child as usize, level + 1));
                }
            }
        }
        // merge sparse branches first so dense colors keep their precision
        out.sort_by_key(|&n| self.subtree_count(n));
        out
    }

    fn subtree_count(&self, node: usize) -> u64 {
        let n = &self.nodes[node];
        if n.leaf {
            return n.count;
        }
        n.children.iter().filter(|&&c| c != NO_CHILD).map(|&c| self.subtree_count(c as usize)).sum()
    }

    fn merge_children(&mut self, node: usize) {
        let children = self.nodes[node].children;
        let mut merged = 0usize;
        for &child in &children {
            if child == NO_CHILD {
                continue;
            }
            let child = child as usize;
            if !self.nodes[child].leaf {
                self.merge_children(child);
            }
            let (count, b, g, r, a) = {
                let c = &self.nodes[child];
                (c.count, c.b, c.g, c.r, c.a)
            };
            let parent = &mut self.nodes[node];
            parent.count += count;
            parent.b += b;
            parent.g += g;
            parent.r += r;
            parent.a += a;
            merged += 1;
        }

        let parent = &mut self.nodes[node];
        parent.children = [NO_CHILD; 8];
        parent.leaf = true;
        self.leaves = self.leaves + 1 - merged;
    }

    fn collect_palette(&self, node: usize, palette: &mut Vec<u32>) {
        let n = &self.nodes[node];
        if n.leaf {
            if n.count > 0 {
                let b = (n.b / n.count) as u32;
                let g = (n.g / n.count) as u32;
                let r = (n.r / n.count) as u32;
                let a = (n.a / n.count) as u32;
                palette.push(a << 24 | r << 16 | g << 8 | b);
            }
            return;
        }
        for &child in &n.children {
            if child != NO_CHILD {
                self.collect_palette(child as usize, palette);
            }
        }
    }

    /// Builds an indexed rendition of a `Bgra32` source.
    pub fn quantize(source: &mut dyn PixelSource, dither: DitherMode) -> Result<QuantizedFrame> {
        if source.format() != PixelFormat::Bgra32 {
            return Err(Error::Unsupported(format!("quantize of {}", source.format()).into()));
        }

        let (width, height) = (source.width(), source.height());
        let line_bytes = width as usize * 4;
        let mut pixels = vec![0u8; line_bytes * height as usize];
        source.copy_pixels(PixelArea::from_size(width, height), line_bytes, &mut pixels)?;

        // exact-color check tracks distinct quads until they outnumber the
        // palette
        let mut distinct: Vec<u32> = Vec::new();
        let mut is_exact = true;
        for quad in pixels.chunks_exact(4) {
            let key = u32::from_le_bytes([quad[0], quad[1], quad[2], quad[3]]);
            if !distinct.contains(&key) {
                if distinct.len() == MAX_PALETTE {
                    is_exact = false;
                    break;
                }
                distinct.push(key);
            }
        }

        let (palette, indices) = if is_exact {
            let palette: Vec<u32> = distinct
                .iter()
                .map(|key| {
                    let [b, g, r, a] = key.to_le_bytes();
                    (a as u32) << 24 | (r as u32) << 16 | (g as u32) << 8 | b as u32
                })
                .collect();
            let indices = pixels
                .chunks_exact(4)
                .map(|quad| {
                    let key = u32::from_le_bytes([quad[0], quad[1], quad[2], quad[3]]);
                    distinct.iter().position(|&k| k == key).unwrap() as u8
                })
                .collect();
            (palette, indices)
        } else {
            let mut tree = OctreeQuantizer::new();
            for quad in pixels.chunks_exact(4) {
                tree.insert(quad);
            }
            tree.reduce(MAX_PALETTE);

            let mut palette = Vec::with_capacity(MAX_PALETTE);
            tree.collect_palette(0, &mut palette);
            log::debug!("quantized {}x{} to {} palette entries", width, height, palette.len());

            let indices = match dither {
                DitherMode::ErrorDiffusion => diffuse_map(&pixels, width, height, &palette),
                DitherMode::None => pixels.chunks_exact(4).map(|q| nearest_entry(&palette, q)).collect(),
            };
            (palette, indices)
        };

        Ok(QuantizedFrame {
            width,
            height,
            palette,
            indices,
            is_exact,
        })
    }
}

impl Default for OctreeQuantizer {
    fn default() -> Self {
        Self::new()
    }
}

fn nearest_entry(palette: &[u32], quad: &[u8]) -> u8 {
    let mut best = 0usize;
    let mut best_distance = u32::MAX;
    for (i, entry) in palette.iter().enumerate() {
        let [b, g, r, a] = entry_bgra(*entry);
        let db = b as i32 - quad[0] as i32;
        let dg = g as i32 - quad[1] as i32;
        let dr = r as i32 - quad[2] as i32;
        let da = a as i32 - quad[3] as i32;
        let distance = (db * db + dg * dg + dr * dr + da * da) as u32;
        if distance < best_distance {
            best_distance = distance;
            best = i;
            if distance == 0 {
                break;
            }
        }
    }
    best as u8
}

/// Floyd–Steinberg error diffusion over the color channels.
fn diffuse_map(pixels: &[u8], width: u32, height: u32, palette: &[u32]) -> Vec<u8> {
    let w = width as usize;
    let mut indices = vec![0u8; w * height as usize];
    let mut errors = vec![[0i16; 3]; w * height as usize];

    for y in 0..height as usize {
        for x in 0..w {
            let i = y * w + x;
            let quad = &pixels[i * 4..i * 4 + 4];
            let e = errors[i];
            let adjusted = [
                (quad[0] as i16 + e[0] / 16).clamp(0, 255) as u8,
                (quad[1] as i16 + e[1] / 16).clamp(0, 255) as u8,
                (quad[2] as i16 + e[2] / 16).clamp(0, 255) as u8,
                quad[3],
            ];
            let index = nearest_entry(palette, &adjusted);
            indices[i] = index;

            let [pb, pg, pr, _] = entry_bgra(palette[index as usize]);
            let err = [
                adjusted[0] as i16 - pb as i16,
                adjusted[1] as i16 - pg as i16,
                adjusted[2] as i16 - pr as i16,
            ];

            let mut push = |dx: i64, dy: i64, factor: i16| {
                let nx = x as i64 + dx;
                let ny = y as i64 + dy;
                if nx >= 0 && nx < w as i64 && ny < height as i64 {
                    let n = &mut errors[ny as usize * w + nx as usize];
                    for c in 0..3 {
                        n[c] = n[c].saturating_add(err[c] * factor);
                    }
                }
            };
            push(1, 0, 7);
            push(-1, 1, 3);
            push(0, 1, 5);
            push(1, 1, 1);
        }
    }

    indices
}

#[cfg(test)]
mod tests {
    use raster_core::source::MemoryPixelSource;

    use super::*;

    #[test]
    fn greyscale_palette_expands_to_grey8() {
        let palette = vec![0xFF000000, 0xFFFFFFFF];
        let data = vec![0u8, 1, 1, 0];
        let source = MemoryPixelSource::new(PixelFormat::Indexed8, 2, 2, data).unwrap();
        let mut expanded = PaletteSource::new(Box::new(source), palette).unwrap();
        assert_eq!(expanded.format(), PixelFormat::Grey8);

        let mut out = [0u8; 4];
        expanded.copy_pixels(PixelArea::from_size(2, 2), 2, &mut out).unwrap();
        assert_eq!(out, [0, 255, 255, 0]);
    }

    #[test]
    fn color_palette_expands_to_bgr24() {
        let palette = vec![0xFF0000FF, 0xFF00FF00];
        let source = MemoryPixelSource::new(PixelFormat::Indexed8, 2, 1, vec![0, 1]).unwrap();
        let mut expanded = PaletteSource::new(Box::new(source), palette).unwrap();
        assert_eq!(expanded.format(), PixelFormat::Bgr24);

        let mut out = [0u8; 6];
        expanded.copy_pixels(PixelArea::from_size(2, 1), 6, &mut out).unwrap();
        assert_eq!(out, [255, 0, 0, 0, 255, 0]);
    }

    #[test]
    fn translucent_palette_expands_to_bgra32() {
        let palette = vec![0x800000FF];
        let source = MemoryPixelSource::new(PixelFormat::Indexed8, 1, 1, vec![0]).unwrap();
        let expanded = PaletteSource::new(Box::new(source), palette).unwrap();
        assert_eq!(expanded.format(), PixelFormat::Bgra32);
    }

    #[test]
    fn exact_quantize_round_trips() {
        let data = vec![
            255u8, 0, 0, 255, //
            0, 255, 0, 255, //
            255, 0, 0, 255, //
            0, 0, 255, 255,
        ];
        let mut source = MemoryPixelSource::new(PixelFormat::Bgra32, 2, 2, data.clone()).unwrap();
        let quantized = OctreeQuantizer::quantize(&mut source, DitherMode::ErrorDiffusion).unwrap();

        assert!(quantized.is_exact);
        assert_eq!(quantized.palette.len(), 3);

        // map back through the palette and compare
        for (i, quad) in data.chunks_exact(4).enumerate() {
            let entry = quantized.palette[quantized.indices[i] as usize];
            assert_eq!(entry_bgra(entry), [quad[0], quad[1], quad[2], quad[3]]);
        }
    }

    #[test]
    fn inexact_quantize_bounds_palette() {
        // 1024 distinct colors forces reduction
        let mut data = Vec::new();
        for i in 0..1024u32 {
            data.extend_from_slice(&[(i % 256) as u8, (i / 4 % 256) as u8, (i / 16 % 256) as u8, 255]);
        }
        let mut source = MemoryPixelSource::new(PixelFormat::Bgra32, 32, 32, data).unwrap();
        let quantized = OctreeQuantizer::quantize(&mut source, DitherMode::None).unwrap();

        assert!(!quantized.is_exact);
        assert!(quantized.palette.len() <= MAX_PALETTE);
        assert!(quantized.palette.len() > 64);
        assert!(quantized.indices.iter().all(|&i| (i as usize) < quantized.palette.len()));
    }
}
