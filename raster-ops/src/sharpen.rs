//! Unsharp mask sharpening.
//!
//! A separable gaussian blur of the luma channel drives a thresholded
//! delta that is added back to the color channels.

use bytemuck::try_cast_slice;
use raster_core::{
    area::PixelArea,
    buffer::{rent_local_aligned, BufferLease},
    error::Error,
    pixel::{ColorModel, PixelFormat, PixelNumeric},
    profiler::SourceProfiler,
    source::{check_copy_args, ChainedPixelSource, PixelSource},
    Result,
};
use smallvec::SmallVec;

/// Rec.601 luma weights in BGR order.
const LUMA_B: f32 = 0.114;
const LUMA_G: f32 = 0.587;
const LUMA_R: f32 = 0.299;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UnsharpMaskSettings {
    /// Gaussian sigma in pixels.
    pub radius: f32,
    /// Fraction of the delta added back, typically 0.25..=2.0.
    pub amount: f32,
    /// Minimum 8-bit delta that triggers sharpening.
    pub threshold: u8,
}

impl UnsharpMaskSettings {
    pub fn is_enabled(&self) -> bool {
        self.amount > 0.0 && self.radius > 0.0
    }
}

type Kernel = SmallVec<[f32; 16]>;

fn gaussian_kernel(sigma: f32) -> Kernel {
    let taps = ((sigma * 3.0).ceil() as usize).max(1) * 2 + 1;
    let mut kernel: Kernel = SmallVec::with_capacity(taps);
    let half = (taps / 2) as i32;
    let denom = 2.0 * sigma * sigma;
    let mut sum = 0.0f32;
    for i in -half..=half {
        let w = (-(i * i) as f32 / denom).exp();
        sum += w;
        kernel.push(w);
    }
    for w in kernel.iter_mut() {
        *w /= sum;
    }
    kernel
}

struct LumaRow {
    y: i64,
    luma: Vec<f32>,
    hblur: Vec<f32>,
}

/// Chained sharpening source. Operates on the luma channel only; for planar
/// pipelines the builder attaches it to the Y plane.
pub struct UnsharpMaskSource {
    source: Box<dyn PixelSource>,
    settings: UnsharpMaskSettings,
    kernel: Kernel,
    ring: Vec<LumaRow>,
    src_line: BufferLease,
    profiler: SourceProfiler,
}

impl UnsharpMaskSource {
    pub fn new(source: Box<dyn PixelSource>, settings: UnsharpMaskSettings) -> Result<Self> {
        let format = source.format();
        let supported = !format.is_indexed()
            && matches!(format.color(), ColorModel::Bgr | ColorModel::Grey | ColorModel::Y)
            && format.numeric() != PixelNumeric::FixedQ15;
        if !supported || !settings.is_enabled() {
            return Err(Error::Unsupported(format!("unsharp mask of {format}").into()));
        }

        let kernel = gaussian_kernel(settings.radius);
        let width = source.width() as usize;
        let ring = (0..kernel.len())
            .map(|_| LumaRow {
                y: -1,
                luma: vec![0.0; width],
                hblur: vec![0.0; width],
            })
            .collect();
        let src_line = rent_local_aligned(format.line_bytes(source.width()));

        Ok(Self {
            source,
            settings,
            kernel,
            ring,
            src_line,
            profiler: SourceProfiler::new("sharpen"),
        })
    }

    fn compute_luma(format: PixelFormat, line: &[u8], luma: &mut [f32]) {
        let channels = format.channels() as usize;
        match format.numeric() {
            PixelNumeric::UnsignedInt => {
                if channels == 1 {
                    for (s, d) in line.iter().zip(luma.iter_mut()) {
                        *d = *s as f32 / 255.0;
                    }
                } else {
                    for (s, d) in line.chunks_exact(channels).zip(luma.iter_mut()) {
                        *d = (LUMA_B * s[0] as f32 + LUMA_G * s[1] as f32 + LUMA_R * s[2] as f32) / 255.0;
                    }
                }
            }
            PixelNumeric::Float => {
                let samples: &[f32] = try_cast_slice(line).expect("aligned scratch");
                if channels == 1 {
                    luma.copy_from_slice(&samples[..luma.len()]);
                } else {
                    for (s, d) in samples.chunks_exact(channels).zip(luma.iter_mut()) {
                        *d = LUMA_B * s[0] + LUMA_G * s[1] + LUMA_R * s[2];
                    }
                }
            }
            PixelNumeric::FixedQ15 => unreachable!("rejected in new"),
        }
    }

    fn ensure_row(&mut self, src_y: u32) -> Result<usize> {
        let slot = src_y as usize % self.ring.len();
        if self.ring[slot].y == src_y as i64 {
            return Ok(slot);
        }

        let format = self.source.format();
        let width = self.source.width();
        let line_bytes = format.line_bytes(width);

        self.profiler.pause();
        self.source.copy_pixels(PixelArea::new(0, src_y, width, 1), line_bytes, &mut self.src_line[..line_bytes])?;
        self.profiler.resume();

        let row = &mut self.ring[slot];
        Self::compute_luma(format, &self.src_line[..line_bytes], &mut row.luma);

        let half = (self.kernel.len() / 2) as i64;
        let w = width as i64;
        for x in 0..w {
            let mut acc = 0.0f32;
            for (t, k) in self.kernel.iter().enumerate() {
                let sx = (x + t as i64 - half).clamp(0, w - 1) as usize;
                acc += k * row.luma[sx];
            }
            row.hblur[x as usize] = acc;
        }
        row.y = src_y as i64;

        Ok(slot)
    }

    fn emit_row(&mut self, y: u32, x0: u32, width: u32, dst: &mut [u8]) -> Result<()> {
        let half = (self.kernel.len() / 2) as i64;
        let src_h = self.source.height() as i64;

        let taps = self.kernel.len();
        let mut slots: SmallVec<[usize; 16]> = SmallVec::with_capacity(taps);
        for t in 0..taps {
            let sy = (y as i64 + t as i64 - half).clamp(0, src_h - 1) as u32;
            slots.push(self.ensure_row(sy)?);
        }
        let center = self.ensure_row(y)?;

        let format = self.source.format();
        let line_bytes = format.line_bytes(width);
        self.profiler.pause();
        self.source.copy_pixels(PixelArea::new(x0, y, width, 1), line_bytes, &mut self.src_line[..line_bytes])?;
        self.profiler.resume();

        let channels = format.channels() as usize;
        let threshold = self.settings.threshold as f32 / 255.0;
        let amount = self.settings.amount;

        for x in 0..width as usize {
            let col = x0 as usize + x;
            let mut blur = 0.0f32;
            for (t, k) in self.kernel.iter().enumerate() {
                blur += k * self.ring[slots[t]].hblur[col];
            }
            let delta = self.ring[center].luma[col] - blur;

            let src_pixel = &self.src_line[x * channels * format.bytes_per_channel()..];
            let dst_pixel = &mut dst[x * channels * format.bytes_per_channel()..];

            let sharpen = delta.abs() >= threshold;
            match format.numeric() {
                PixelNumeric::UnsignedInt => {
                    let add = if sharpen {
                        (amount * delta * 255.0).round() as i32
                    } else {
                        0
                    };
                    let color_channels = if format.has_alpha() {
                        channels - 1
                    } else {
                        channels
                    };
                    for c in 0..channels {
                        let v = src_pixel[c] as i32;
                        dst_pixel[c] = if c < color_channels {
                            (v + add).clamp(0, 255) as u8
                        } else {
                            v as u8
                        };
                    }
                }
                PixelNumeric::Float => {
                    let add = if sharpen {
                        amount * delta
                    } else {
                        0.0
                    };
                    let color_channels = if format.has_alpha() {
                        channels - 1
                    } else {
                        channels
                    };
                    for c in 0..channels {
                        let v = f32::from_ne_bytes(src_pixel[c * 4..c * 4 + 4].try_into().unwrap());
                        let out = if c < color_channels {
                            v + add
                        } else {
                            v
                        };
                        dst_pixel[c * 4..c * 4 + 4].copy_from_slice(&out.to_ne_bytes());
                    }
                }
                PixelNumeric::FixedQ15 => unreachable!(),
            }
        }

        Ok(())
    }
}

impl PixelSource for UnsharpMaskSource {
    fn format(&self) -> PixelFormat {
        self.source.format()
    }

    fn width(&self) -> u32 {
        self.source.width()
    }

    fn height(&self) -> u32 {
        self.source.height()
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

impl ChainedPixelSource for UnsharpMaskSource {
    fn source(&self) -> &dyn PixelSource {
        self.source.as_ref()
    }

    fn source_mut(&mut self) -> &mut dyn PixelSource {
        self.source.as_mut()
    }

    fn passthrough(&self) -> bool {
        false
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

    const SETTINGS: UnsharpMaskSettings = UnsharpMaskSettings {
        radius: 1.0,
        amount: 1.0,
        threshold: 0,
    };

    #[test]
    fn kernel_normalized() {
        let kernel = gaussian_kernel(1.5);
        let sum: f32 = kernel.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert_eq!(kernel.len() % 2, 1);
    }

    #[test]
    fn flat_region_unchanged() {
        let source = MemoryPixelSource::new(PixelFormat::Grey8, 8, 8, vec![100; 64]).unwrap();
        let mut sharpened = UnsharpMaskSource::new(Box::new(source), SETTINGS).unwrap();

        let mut out = vec![0u8; 64];
        sharpened.copy_pixels(PixelArea::from_size(8, 8), 8, &mut out).unwrap();
        assert!(out.iter().all(|&v| v == 100));
    }

    #[test]
    fn edge_contrast_increases() {
        // vertical step edge: left 64, right 192
        let mut data = vec![0u8; 8 * 8];
        for y in 0..8 {
            for x in 0..8 {
                data[y * 8 + x] = if x < 4 { 64 } else { 192 };
            }
        }
        let source = MemoryPixelSource::new(PixelFormat::Grey8, 8, 8, data).unwrap();
        let mut sharpened = UnsharpMaskSource::new(Box::new(source), SETTINGS).unwrap();

        let mut out = vec![0u8; 64];
        sharpened.copy_pixels(PixelArea::from_size(8, 8), 8, &mut out).unwrap();

        // just left of the edge darkens, just right brightens
        assert!(out[8 * 4 + 3] < 64, "left of edge: {}", out[8 * 4 + 3]);
        assert!(out[8 * 4 + 4] > 192, "right of edge: {}", out[8 * 4 + 4]);
    }

    #[test]
    fn threshold_gates_small_deltas() {
        let mut data = vec![100u8; 64];
        data[27] = 102;
        let source = MemoryPixelSource::new(PixelFormat::Grey8, 8, 8, data.clone()).unwrap();
        let mut sharpened = UnsharpMaskSource::new(
            Box::new(source),
            UnsharpMaskSettings {
                radius: 1.0,
                amount: 1.0,
                threshold: 16,
            },
        )
        .unwrap();

        let mut out = vec![0u8; 64];
        sharpened.copy_pixels(PixelArea::from_size(8, 8), 8, &mut out).unwrap();
        assert_eq!(out, data, "deltas below the threshold must pass through");
    }
}
