//! Separable resampling with precomputed per-axis weight tables.
//!
//! For each output position the table stores the first source sample and a
//! fixed number of taps. Float weights are normalized to sum exactly 1.0;
//! Q15 weights are post-normalized so their sum is exactly `UQ15_ONE`.

use bytemuck::try_cast_slice;
use smallvec::SmallVec;
use raster_core::{
    area::PixelArea,
    buffer::{rent_local_aligned, BufferLease},
    error::Error,
    pixel::{PixelFormat, PixelNumeric},
    profiler::SourceProfiler,
    source::{check_copy_args, ChainedPixelSource, PixelSource},
    Result,
};

use crate::convert::UQ15_ONE;

/// Interpolation kernel for resampling.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum InterpolationKernel {
    NearestNeighbor,
    Linear,
    /// Catmull-Rom cubic (B=0, C=0.5).
    CatmullRom,
    /// Windowed sinc with the given lobe count.
    Lanczos(u8),
    Spline36,
}

impl Default for InterpolationKernel {
    fn default() -> Self {
        InterpolationKernel::Lanczos(3)
    }
}

impl InterpolationKernel {
    pub fn support(&self) -> f64 {
        match self {
            InterpolationKernel::NearestNeighbor => 0.5,
            InterpolationKernel::Linear => 1.0,
            InterpolationKernel::CatmullRom => 2.0,
            InterpolationKernel::Lanczos(n) => *n as f64,
            InterpolationKernel::Spline36 => 3.0,
        }
    }

    pub fn is_point_sampler(&self) -> bool {
        matches!(self, InterpolationKernel::NearestNeighbor)
    }

    pub fn weight(&self, x: f64) -> f64 {
        let x = x.abs();
        match self {
            InterpolationKernel::NearestNeighbor => {
                if x < 0.5 {
                    1.0
                } else {
                    0.0
                }
            }
            InterpolationKernel::Linear => {
                if x < 1.0 {
                    1.0 - x
                } else {
                    0.0
                }
            }
            InterpolationKernel::CatmullRom => {
                if x < 1.0 {
                    (1.5 * x - 2.5) * x * x + 1.0
                } else if x < 2.0 {
                    ((-0.5 * x + 2.5) * x - 4.0) * x + 2.0
                } else {
                    0.0
                }
            }
            InterpolationKernel::Lanczos(n) => {
                let a = *n as f64;
                if x < 1e-8 {
                    1.0
                } else if x < a {
                    let pi_x = std::f64::consts::PI * x;
                    let pi_x_a = pi_x / a;
                    (pi_x.sin() / pi_x) * (pi_x_a.sin() / pi_x_a)
                } else {
                    0.0
                }
            }
            InterpolationKernel::Spline36 => {
                if x < 1.0 {
                    ((13.0 / 11.0 * x - 453.0 / 209.0) * x - 3.0 / 209.0) * x + 1.0
                } else if x < 2.0 {
                    let x = x - 1.0;
                    ((-6.0 / 11.0 * x + 270.0 / 209.0) * x - 156.0 / 209.0) * x
                } else if x < 3.0 {
                    let x = x - 2.0;
                    ((1.0 / 11.0 * x - 45.0 / 209.0) * x + 26.0 / 209.0) * x
                } else {
                    0.0
                }
            }
        }
    }
}

/// Per-axis resampling weights: `taps` source samples per output position,
/// stored flat.
pub struct WeightTable {
    pub taps: usize,
    pub starts: Vec<u32>,
    pub weights: Vec<f32>,
}

impl WeightTable {
    /// Builds weights mapping `in_size` source samples to `out_size` output
    /// samples. `offset` shifts every sample position by a constant amount
    /// of source pixels, used to align subsampled chroma grids.
    pub fn build(kernel: InterpolationKernel, in_size: u32, out_size: u32, offset: f64) -> WeightTable {
        let scale = in_size as f64 / out_size as f64;

        if kernel.is_point_sampler() {
            let starts = (0..out_size)
                .map(|i| {
                    let center = (i as f64 + 0.5) * scale - 0.5 + offset;
                    ((center + 0.5).floor().max(0.0) as u32).min(in_size - 1)
                })
                .collect();
            return WeightTable {
                taps: 1,
                starts,
                weights: vec![1.0; out_size as usize],
            };
        }

        let support_scale = scale.max(1.0);
        let support = kernel.support() * support_scale;
        let taps = ((support * 2.0).ceil() as usize + 1).min(in_size as usize);

        let mut starts = Vec::with_capacity(out_size as usize);
        let mut weights = vec![0.0f32; out_size as usize * taps];

        for i in 0..out_size {
            let center = (i as f64 + 0.5) * scale - 0.5 + offset;
            let left = (center - support).ceil() as i64;
            let right = (center + support).floor() as i64;
            let start = left.clamp(0, in_size as i64 - taps as i64) as u32;
            starts.push(start);

            let row = &mut weights[i as usize * taps..(i as usize + 1) * taps];
            let mut sum = 0.0f64;
            for j in left..=right {
                let w = kernel.weight((j as f64 - center) / support_scale);
                sum += w;
                let folded = j.clamp(0, in_size as i64 - 1) as u32;
                row[(folded - start) as usize] += w as f32;
            }

            if sum.abs() < 1e-8 {
                row.fill(0.0);
                row[((center.round() as i64).clamp(start as i64, (start as usize + taps - 1) as i64) - start as i64)
                    as usize] = 1.0;
            } else {
                // normalize in f64, then fold the residual rounding drift
                // into the largest tap until the f32 sum is exactly 1
                let inverse = 1.0 / sum;
                for w in row.iter_mut() {
                    *w = (*w as f64 * inverse) as f32;
                }
                let largest = (0..taps).max_by(|&a, &b| row[a].abs().total_cmp(&row[b].abs())).unwrap();
                for _ in 0..8 {
                    let drift: f32 = 1.0 - row.iter().sum::<f32>();
                    if drift == 0.0 {
                        break;
                    }
                    row[largest] += drift;
                }
            }
        }

        WeightTable {
            taps,
            starts,
            weights,
        }
    }

    fn row(&self, i: usize) -> &[f32] {
        &self.weights[i * self.taps..(i + 1) * self.taps]
    }
}

/// Q15 rendition of a weight table. Rounding drift is folded into the
/// largest tap so every row sums to exactly `UQ15_ONE`.
pub struct WeightTableQ15 {
    pub taps: usize,
    pub starts: Vec<u32>,
    pub weights: Vec<i32>,
}

impl From<&WeightTable> for WeightTableQ15 {
    fn from(table: &WeightTable) -> Self {
        let taps = table.taps;
        let mut weights = vec![0i32; table.weights.len()];

        for (row, out) in table.weights.chunks_exact(taps).zip(weights.chunks_exact_mut(taps)) {
            for (w, q) in row.iter().zip(out.iter_mut()) {
                *q = (*w * UQ15_ONE as f32).round() as i32;
            }
            let drift = UQ15_ONE as i32 - out.iter().sum::<i32>();
            let largest = (0..taps).max_by_key(|&i| out[i].abs()).unwrap();
            out[largest] += drift;
        }

        WeightTableQ15 {
            taps,
            starts: table.starts.clone(),
            weights,
        }
    }
}

impl WeightTableQ15 {
    fn row(&self, i: usize) -> &[i32] {
        &self.weights[i * self.taps..(i + 1) * self.taps]
    }
}

const MAX_CHANNELS: usize = 4;

enum RingData {
    F32(Vec<f32>),
    I32(Vec<i32>),
    U16(Vec<u16>),
}

struct RingRow {
    y: i64,
    data: RingData,
}

/// Chained source performing a separable two-pass resample. The horizontal
/// pass runs once per source line into a small ring of resampled rows; the
/// vertical pass emits one output line per pull.
pub struct ConvolutionSource {
    source: Box<dyn PixelSource>,
    format: PixelFormat,
    out_width: u32,
    out_height: u32,
    channels: usize,
    x_weights: WeightTable,
    y_weights: WeightTable,
    x_q15: Option<WeightTableQ15>,
    y_q15: Option<WeightTableQ15>,
    ring: Vec<RingRow>,
    src_line: BufferLease,
    profiler: SourceProfiler,
}

impl ConvolutionSource {
    pub fn new(
        source: Box<dyn PixelSource>,
        out_width: u32,
        out_height: u32,
        kernel: InterpolationKernel,
        offset_x: f64,
        offset_y: f64,
    ) -> Result<Self> {
        let format = source.format();
        if format.is_indexed() || out_width == 0 || out_height == 0 {
            return Err(Error::Unsupported(format!("resample of {format}").into()));
        }

        let channels = format.channels() as usize;
        debug_assert!(channels <= MAX_CHANNELS);

        let x_weights = WeightTable::build(kernel, source.width(), out_width, offset_x);
        let y_weights = WeightTable::build(kernel, source.height(), out_height, offset_y);

        let integer = format.numeric() != PixelNumeric::Float;
        let (x_q15, y_q15) = if integer {
            (Some(WeightTableQ15::from(&x_weights)), Some(WeightTableQ15::from(&y_weights)))
        } else {
            (None, None)
        };

        let row_len = out_width as usize * channels;
        let ring = (0..y_weights.taps)
            .map(|_| RingRow {
                y: -1,
                data: match format.numeric() {
                    PixelNumeric::Float => RingData::F32(vec![0.0; row_len]),
                    PixelNumeric::UnsignedInt => RingData::I32(vec![0; row_len]),
                    PixelNumeric::FixedQ15 => RingData::U16(vec![0; row_len]),
                },
            })
            .collect();

        let src_line = rent_local_aligned(format.line_bytes(source.width()));

        Ok(Self {
            source,
            format,
            out_width,
            out_height,
            channels,
            x_weights,
            y_weights,
            x_q15,
            y_q15,
            ring,
            src_line,
            profiler: SourceProfiler::new("resample"),
        })
    }

    fn ensure_row(&mut self, src_y: u32) -> Result<usize> {
        let slot = src_y as usize % self.ring.len();
        if self.ring[slot].y == src_y as i64 {
            return Ok(slot);
        }

        let src_width = self.source.width();
        let line_bytes = self.format.line_bytes(src_width);
        self.profiler.pause();
        self.source.copy_pixels(PixelArea::new(0, src_y, src_width, 1), line_bytes, &mut self.src_line[..line_bytes])?;
        self.profiler.resume();

        let channels = self.channels;
        let out_width = self.out_width as usize;
        let taps = self.x_weights.taps;

        match &mut self.ring[slot].data {
            RingData::F32(row) => {
                let src: &[f32] = try_cast_slice(&self.src_line[..line_bytes]).expect("aligned scratch");
                for x in 0..out_width {
                    let start = self.x_weights.starts[x] as usize;
                    let weights = self.x_weights.row(x);
                    let mut acc = [0.0f32; MAX_CHANNELS];
                    for (t, w) in weights.iter().enumerate() {
                        let p = &src[(start + t) * channels..];
                        for (a, s) in acc[..channels].iter_mut().zip(p) {
                            *a += w * s;
                        }
                    }
                    row[x * channels..x * channels + channels].copy_from_slice(&acc[..channels]);
                }
            }
            RingData::I32(row) => {
                let q15 = self.x_q15.as_ref().unwrap();
                let src = &self.src_line[..line_bytes];
                for x in 0..out_width {
                    let start = q15.starts[x] as usize;
                    let weights = q15.row(x);
                    let mut acc = [0i32; MAX_CHANNELS];
                    for (t, w) in weights.iter().enumerate() {
                        let p = &src[(start + t) * channels..];
                        for (a, s) in acc[..channels].iter_mut().zip(p) {
                            *a += w * *s as i32;
                        }
                    }
                    row[x * channels..x * channels + channels].copy_from_slice(&acc[..channels]);
                }
            }
            RingData::U16(row) => {
                let q15 = self.x_q15.as_ref().unwrap();
                let src: &[u16] = try_cast_slice(&self.src_line[..line_bytes]).expect("aligned scratch");
                for x in 0..out_width {
                    let start = q15.starts[x] as usize;
                    let weights = q15.row(x);
                    let mut acc = [0i64; MAX_CHANNELS];
                    for (t, w) in weights.iter().enumerate() {
                        let p = &src[(start + t) * channels..];
                        for (a, s) in acc[..channels].iter_mut().zip(p) {
                            *a += *w as i64 * *s as i64;
                        }
                    }
                    for (c, a) in acc[..channels].iter().enumerate() {
                        let v = (a + (1 << 14)) >> 15;
                        row[x * channels + c] = v.clamp(0, UQ15_ONE as i64) as u16;
                    }
                }
            }
        }

        self.ring[slot].y = src_y as i64;
        Ok(slot)
    }

    fn emit_row(&mut self, out_y: u32, x0: u32, width: u32, dst: &mut [u8]) -> Result<()> {
        let y_start = self.y_weights.starts[out_y as usize];
        let taps = self.y_weights.taps;

        let mut slots: SmallVec<[usize; 16]> = SmallVec::with_capacity(taps);
        for t in 0..taps {
            slots.push(self.ensure_row(y_start + t as u32)?);
        }

        let channels = self.channels;
        match self.format.numeric() {
            PixelNumeric::Float => {
                let weights = self.y_weights.row(out_y as usize);
                for x in 0..width as usize {
                    let col = (x0 as usize + x) * channels;
                    let mut acc = [0.0f32; MAX_CHANNELS];
                    for (t, w) in weights.iter().enumerate() {
                        if let RingData::F32(row) = &self.ring[slots[t]].data {
                            for (a, s) in acc[..channels].iter_mut().zip(&row[col..col + channels]) {
                                *a += w * s;
                            }
                        }
                    }
                    for (c, v) in acc[..channels].iter().enumerate() {
                        let bytes = v.to_ne_bytes();
                        dst[(x * channels + c) * 4..(x * channels + c) * 4 + 4].copy_from_slice(&bytes);
                    }
                }
            }
            PixelNumeric::UnsignedInt => {
                let weights = self.y_q15.as_ref().unwrap().row(out_y as usize);
                for x in 0..width as usize {
                    let col = (x0 as usize + x) * channels;
                    let mut acc = [0i64; MAX_CHANNELS];
                    for (t, w) in weights.iter().enumerate() {
                        if let RingData::I32(row) = &self.ring[slots[t]].data {
                            for (a, s) in acc[..channels].iter_mut().zip(&row[col..col + channels]) {
                                *a += *w as i64 * *s as i64;
                            }
                        }
                    }
                    for (c, a) in acc[..channels].iter().enumerate() {
                        // two Q15 passes leave the value scaled by 2^30
                        let v = (a + (1 << 29)) >> 30;
                        dst[x * channels + c] = v.clamp(0, 255) as u8;
                    }
                }
            }
            PixelNumeric::FixedQ15 => {
                let weights = self.y_q15.as_ref().unwrap().row(out_y as usize);
                for x in 0..width as usize {
                    let col = (x0 as usize + x) * channels;
                    let mut acc = [0i64; MAX_CHANNELS];
                    for (t, w) in weights.iter().enumerate() {
                        if let RingData::U16(row) = &self.ring[slots[t]].data {
                            for (a, s) in acc[..channels].iter_mut().zip(&row[col..col + channels]) {
                                *a += *w as i64 * *s as i64;
                            }
                        }
                    }
                    for (c, a) in acc[..channels].iter().enumerate() {
                        let v = ((a + (1 << 14)) >> 15).clamp(0, UQ15_ONE as i64) as u16;
                        let bytes = v.to_ne_bytes();
                        dst[(x * channels + c) * 2..(x * channels + c) * 2 + 2].copy_from_slice(&bytes);
                    }
                }
            }
        }

        Ok(())
    }
}

impl PixelSource for ConvolutionSource {
    fn format(&self) -> PixelFormat {
        self.format
    }

    fn width(&self) -> u32 {
        self.out_width
    }

    fn height(&self) -> u32 {
        self.out_height
    }

    fn copy_pixels(&mut self, area: PixelArea, stride: usize, buf: &mut [u8]) -> Result<()> {
        let line_bytes = check_copy_args(self, &area, stride, buf.len())?;
        self.profiler.start();

        for row in 0..area.height {
            let dst = &mut buf[row as usize * stride..][..line_bytes];
            self.emit_row(area.y + row, area.x, area.width, dst)?;
        }

        self.profiler.stop(area.size());
        Ok(())
    }

    fn profiler(&self) -> Option<&SourceProfiler> {
        Some(&self.profiler)
    }

    fn as_chained_ref(&self) -> Option<&dyn ChainedPixelSource> {
        Some(self)
    }

    fn as_chained_mut(&mut self) -> Option<&mut dyn ChainedPixelSource> {
        Some(self)
    }
}

impl ChainedPixelSource for ConvolutionSource {
    fn source(&self) -> &dyn PixelSource {
        self.source.as_ref()
    }

    fn source_mut(&mut self) -> &mut dyn PixelSource {
        self.source.as_mut()
    }

    fn replace_source(&mut self, source: Box<dyn PixelSource>) {
        for row in self.ring.iter_mut() {
            row.y = -1;
        }
        self.source = source;
    }
}

#[cfg(test)]
mod tests {
    use raster_core::source::MemoryPixelSource;

    use super::*;

    #[test]
    fn weights_sum_to_one() {
        for kernel in [
            InterpolationKernel::Linear,
            InterpolationKernel::CatmullRom,
            InterpolationKernel::Lanczos(2),
            InterpolationKernel::Lanczos(3),
            InterpolationKernel::Spline36,
        ] {
            for (input, output) in [(100, 33), (33, 100), (7, 7), (640, 480), (3, 1)] {
                let table = WeightTable::build(kernel, input, output, 0.0);
                for i in 0..output as usize {
                    let sum: f32 = table.row(i).iter().sum();
                    assert_eq!(sum, 1.0, "{kernel:?} {input}->{output} row {i}");
                }

                let q15 = WeightTableQ15::from(&table);
                for i in 0..output as usize {
                    let sum: i32 = q15.row(i).iter().sum();
                    assert_eq!(sum, UQ15_ONE as i32, "{kernel:?} {input}->{output} row {i}");
                }
            }
        }
    }

    #[test]
    fn point_sampler_identity() {
        let data: Vec<u8> = (0..64).collect();
        let source = MemoryPixelSource::new(PixelFormat::Grey8, 8, 8, data.clone()).unwrap();
        let mut resampled =
            ConvolutionSource::new(Box::new(source), 8, 8, InterpolationKernel::NearestNeighbor, 0.0, 0.0).unwrap();

        let mut out = vec![0u8; 64];
        resampled.copy_pixels(PixelArea::from_size(8, 8), 8, &mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn constant_image_preserved_by_lanczos() {
        let data = vec![0x80u8; 100 * 100 * 3];
        let source = MemoryPixelSource::new(PixelFormat::Bgr24, 100, 100, data).unwrap();
        let mut resampled =
            ConvolutionSource::new(Box::new(source), 50, 50, InterpolationKernel::Lanczos(3), 0.0, 0.0).unwrap();

        let mut out = vec![0u8; 50 * 50 * 3];
        resampled.copy_pixels(PixelArea::from_size(50, 50), 150, &mut out).unwrap();
        assert!(out.iter().all(|&b| b == 0x80), "normalized kernel must preserve constants");
    }

    #[test]
    fn float_path_matches_constant() {
        let mut data = vec![0u8; 16 * 4];
        for chunk in data.chunks_exact_mut(4) {
            chunk.copy_from_slice(&0.25f32.to_ne_bytes());
        }
        let source = MemoryPixelSource::new(PixelFormat::Grey32Float, 4, 4, data).unwrap();
        let mut resampled =
            ConvolutionSource::new(Box::new(source), 2, 2, InterpolationKernel::CatmullRom, 0.0, 0.0).unwrap();

        let mut out = vec![0u8; 2 * 2 * 4];
        resampled.copy_pixels(PixelArea::from_size(2, 2), 8, &mut out).unwrap();
        for chunk in out.chunks_exact(4) {
            let v = f32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            assert!((v - 0.25).abs() < 1e-6);
        }
    }

    #[test]
    fn arbitrary_rect_access() {
        let data: Vec<u8> = (0..100).collect();
        let source = MemoryPixelSource::new(PixelFormat::Grey8, 10, 10, data).unwrap();
        let mut resampled =
            ConvolutionSource::new(Box::new(source), 10, 10, InterpolationKernel::NearestNeighbor, 0.0, 0.0).unwrap();

        // Pull bottom rows first, then top: caching must tolerate backwards
        // access.
        let mut bottom = vec![0u8; 10];
        resampled.copy_pixels(PixelArea::new(0, 9, 10, 1), 10, &mut bottom).unwrap();
        assert_eq!(bottom, (90..100).collect::<Vec<u8>>());

        let mut top = vec![0u8; 5];
        resampled.copy_pixels(PixelArea::new(2, 0, 5, 1), 5, &mut top).unwrap();
        assert_eq!(top, (2..7).collect::<Vec<u8>>());
    }
}
