//! Integer box pre-scaler for large downscale ratios.
//!
//! Averages `ratio x ratio` blocks at a power-of-two ratio before the
//! high-quality resample finishes the residual factor. Only 8-bit channel
//! inputs qualify, and point samplers bypass it entirely.

use raster_core::{
    area::PixelArea,
    buffer::{rent_local_aligned, BufferLease},
    error::Error,
    pixel::{PixelFormat, PixelNumeric},
    profiler::SourceProfiler,
    source::{check_copy_args, ChainedPixelSource, PixelSource},
    Result,
};

pub struct HybridScaleSource {
    source: Box<dyn PixelSource>,
    format: PixelFormat,
    ratio: u32,
    out_width: u32,
    out_height: u32,
    src_line: BufferLease,
    acc: Vec<u32>,
    profiler: SourceProfiler,
}

impl HybridScaleSource {
    /// True when the box pre-scale can run on `format`.
    pub fn supports(format: PixelFormat) -> bool {
        format.numeric() == PixelNumeric::UnsignedInt && format.bytes_per_channel() == 1 && !format.is_indexed()
    }

    /// `ratio` must be a power of two greater than 1.
    pub fn new(source: Box<dyn PixelSource>, ratio: u32) -> Result<Self> {
        let format = source.format();
        if !Self::supports(format) || !ratio.is_power_of_two() || ratio < 2 {
            return Err(Error::Unsupported(format!("hybrid scale of {format} by {ratio}").into()));
        }

        let out_width = (source.width() / ratio).max(1);
        let out_height = (source.height() / ratio).max(1);
        let src_line = rent_local_aligned(format.line_bytes(source.width()));
        let acc = vec![0u32; out_width as usize * format.channels() as usize];

        Ok(Self {
            source,
            format,
            ratio,
            out_width,
            out_height,
            src_line,
            acc,
            profiler: SourceProfiler::new("hybrid-scale"),
        })
    }

    fn emit_row(&mut self, out_y: u32, x0: u32, width: u32, dst: &mut [u8]) -> Result<()> {
        let channels = self.format.channels() as usize;
        let ratio = self.ratio;
        let src_width = self.source.width();
        let src_height = self.source.height();
        let line_bytes = self.format.line_bytes(src_width);

        // the last box on each axis absorbs the remainder rows/columns
        let y_begin = out_y * ratio;
        let y_end = if out_y == self.out_height - 1 {
            src_height
        } else {
            y_begin + ratio
        };

        self.acc.fill(0);
        for src_y in y_begin..y_end {
            self.profiler.pause();
            self.source.copy_pixels(PixelArea::new(0, src_y, src_width, 1), line_bytes, &mut self.src_line[..line_bytes])?;
            self.profiler.resume();

            for out_x in 0..self.out_width {
                let x_begin = out_x * ratio;
                let x_end = if out_x == self.out_width - 1 {
                    src_width
                } else {
                    x_begin + ratio
                };
                let acc = &mut self.acc[out_x as usize * channels..(out_x as usize + 1) * channels];
                for src_x in x_begin..x_end {
                    let p = &self.src_line[src_x as usize * channels..];
                    for (a, s) in acc.iter_mut().zip(p) {
                        *a += *s as u32;
                    }
                }
            }
        }

        let rows = y_end - y_begin;
        for x in 0..width {
            let out_x = x0 + x;
            let x_begin = out_x * ratio;
            let x_end = if out_x == self.out_width - 1 {
                src_width
            } else {
                x_begin + ratio
            };
            let count = rows * (x_end - x_begin);
            let acc = &self.acc[out_x as usize * channels..(out_x as usize + 1) * channels];
            let out = &mut dst[x as usize * channels..(x as usize + 1) * channels];
            for (d, a) in out.iter_mut().zip(acc) {
                *d = ((a + count / 2) / count) as u8;
            }
        }

        Ok(())
    }
}

impl PixelSource for HybridScaleSource {
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

impl ChainedPixelSource for HybridScaleSource {
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

#[cfg(test)]
mod tests {
    use raster_core::source::MemoryPixelSource;

    use super::*;

    #[test]
    fn averages_blocks() {
        // 4x4 grey: top-left 2x2 block holds 0/2/8/10, average 5
        let data: Vec<u8> = (0..16).collect();
        let source = MemoryPixelSource::new(PixelFormat::Grey8, 4, 4, data).unwrap();
        let mut scaled = HybridScaleSource::new(Box::new(source), 2).unwrap();
        assert_eq!((scaled.width(), scaled.height()), (2, 2));

        let mut out = [0u8; 4];
        scaled.copy_pixels(PixelArea::from_size(2, 2), 2, &mut out).unwrap();
        assert_eq!(out, [3, 5, 11, 13]);
    }

    #[test]
    fn remainder_folds_into_last_box() {
        // 5 wide at ratio 2: second box spans columns 2..5
        let data: Vec<u8> = vec![10, 10, 20, 20, 20, 10, 10, 20, 20, 20];
        let source = MemoryPixelSource::new(PixelFormat::Grey8, 5, 2, data).unwrap();
        let mut scaled = HybridScaleSource::new(Box::new(source), 2).unwrap();
        assert_eq!((scaled.width(), scaled.height()), (2, 1));

        let mut out = [0u8; 2];
        scaled.copy_pixels(PixelArea::from_size(2, 1), 2, &mut out).unwrap();
        assert_eq!(out, [10, 20]);
    }

    #[test]
    fn rejects_float_input() {
        let source = MemoryPixelSource::new(PixelFormat::Grey32Float, 4, 4, vec![0; 64]).unwrap();
        assert!(HybridScaleSource::new(Box::new(source), 2).is_err());
        assert!(!HybridScaleSource::supports(PixelFormat::Bgr48UQ15Linear));
        assert!(HybridScaleSource::supports(PixelFormat::Bgra32));
    }
}
