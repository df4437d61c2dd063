//! Planar YCbCr → interleaved RGB conversion.
//!
//! By the time planes reach the merge they share the luma dimensions; chroma
//! upsampling happens in the resample step with siting offsets. The merge
//! applies the inverted YCC matrix row by row.

use bytemuck::try_cast_slice;
use raster_core::{
    area::PixelArea,
    buffer::{rent_local_aligned, BufferLease},
    color::{ColorRange, YccMatrix, YccToRgb, VIDEO_LUMA_OFFSET, VIDEO_LUMA_SCALE},
    error::Error,
    pixel::{PixelFormat, PixelNumeric},
    profiler::SourceProfiler,
    source::{check_copy_args, PixelSource, PlanarPixelSource},
    Result,
};

use crate::convert::UQ15_ONE;

/// Merges three same-sized Y/Cb/Cr planes into `Bgr24` (8-bit planes) or
/// `Bgrx128Float` (float planes).
pub struct PlanarConversionSource {
    planes: PlanarPixelSource,
    format: PixelFormat,
    coefficients: YccToRgb,
    // Q15 path only
    luma_scale: i32,
    luma_offset: i32,
    y_line: BufferLease,
    cb_line: BufferLease,
    cr_line: BufferLease,
    profiler: SourceProfiler,
}

impl PlanarConversionSource {
    pub fn new(planes: PlanarPixelSource, matrix: YccMatrix) -> Result<Self> {
        if planes.cb.width() != planes.y.width()
            || planes.cb.height() != planes.y.height()
            || planes.cr.width() != planes.y.width()
            || planes.cr.height() != planes.y.height()
        {
            return Err(Error::Invalid("chroma planes not upsampled".into()));
        }

        let y_format = planes.y.format();
        let (format, range, coefficients) = match y_format.numeric() {
            PixelNumeric::UnsignedInt => {
                let range = y_format.range();
                // raw 8-bit values; the matrix carries the chroma expansion
                (PixelFormat::Bgr24, range, matrix.inverse_coefficients(range))
            }
            PixelNumeric::Float => {
                // widened planes are already range-expanded
                (PixelFormat::Bgrx128Float, ColorRange::Full, matrix.inverse_coefficients(ColorRange::Full))
            }
            PixelNumeric::FixedQ15 => {
                return Err(Error::Unsupported("fixed point planar merge".into()));
            }
        };

        let (luma_scale, luma_offset) = match range {
            ColorRange::Full => (UQ15_ONE as i32, 0),
            ColorRange::Video => (
                ((255.0 / VIDEO_LUMA_SCALE as f64) * UQ15_ONE as f64).round() as i32,
                VIDEO_LUMA_OFFSET as i32,
            ),
        };

        let line_bytes = y_format.line_bytes(planes.y.width());
        Ok(Self {
            y_line: rent_local_aligned(line_bytes),
            cb_line: rent_local_aligned(line_bytes),
            cr_line: rent_local_aligned(line_bytes),
            planes,
            format,
            coefficients,
            luma_scale,
            luma_offset,
            profiler: SourceProfiler::new("planar-merge"),
        })
    }
}

impl PixelSource for PlanarConversionSource {
    fn format(&self) -> PixelFormat {
        self.format
    }

    fn width(&self) -> u32 {
        self.planes.y.width()
    }

    fn height(&self) -> u32 {
        self.planes.y.height()
    }

    fn copy_pixels(&mut self, area: PixelArea, stride: usize, buf: &mut [u8]) -> Result<()> {
        let line_bytes = check_copy_args(self, &area, stride, buf.len())?;
        self.profiler.start();

        let plane_bytes = self.planes.y.format().line_bytes(area.width);
        let c = self.coefficients;

        for row in 0..area.height {
            let line_area = PixelArea::new(area.x, area.y + row, area.width, 1);

            self.profiler.pause();
            self.planes.y.copy_pixels(line_area, plane_bytes, &mut self.y_line[..plane_bytes])?;
            self.planes.cb.copy_pixels(line_area, plane_bytes, &mut self.cb_line[..plane_bytes])?;
            self.planes.cr.copy_pixels(line_area, plane_bytes, &mut self.cr_line[..plane_bytes])?;
            self.profiler.resume();

            let dst = &mut buf[row as usize * stride..][..line_bytes];
            match self.format {
                PixelFormat::Bgr24 => {
                    let cr_r = (c.cr_r * UQ15_ONE as f32).round() as i32;
                    let cb_g = (c.cb_g * UQ15_ONE as f32).round() as i32;
                    let cr_g = (c.cr_g * UQ15_ONE as f32).round() as i32;
                    let cb_b = (c.cb_b * UQ15_ONE as f32).round() as i32;
                    let half = (UQ15_ONE / 2) as i32;

                    for (x, out) in dst.chunks_exact_mut(3).enumerate() {
                        let y = (self.y_line[x] as i32 - self.luma_offset).max(0) * self.luma_scale;
                        let cb = self.cb_line[x] as i32 - 128;
                        let cr = self.cr_line[x] as i32 - 128;

                        let b = (y + cb_b * cb + half) >> 15;
                        let g = (y + cb_g * cb + cr_g * cr + half) >> 15;
                        let r = (y + cr_r * cr + half) >> 15;

                        out[0] = b.clamp(0, 255) as u8;
                        out[1] = g.clamp(0, 255) as u8;
                        out[2] = r.clamp(0, 255) as u8;
                    }
                }
                PixelFormat::Bgrx128Float => {
                    let y_row: &[f32] = try_cast_slice(&self.y_line[..plane_bytes]).expect("aligned scratch");
                    let cb_row: &[f32] = try_cast_slice(&self.cb_line[..plane_bytes]).expect("aligned scratch");
                    let cr_row: &[f32] = try_cast_slice(&self.cr_line[..plane_bytes]).expect("aligned scratch");

                    for (x, out) in dst.chunks_exact_mut(16).enumerate() {
                        let (y, cb, cr) = (y_row[x], cb_row[x], cr_row[x]);
                        let b = y + c.cb_b * cb;
                        let g = y + c.cb_g * cb + c.cr_g * cr;
                        let r = y + c.cr_r * cr;

                        out[0..4].copy_from_slice(&b.to_ne_bytes());
                        out[4..8].copy_from_slice(&g.to_ne_bytes());
                        out[8..12].copy_from_slice(&r.to_ne_bytes());
                        out[12..16].copy_from_slice(&0.0f32.to_ne_bytes());
                    }
                }
                _ => unreachable!(),
            }
        }

        self.profiler.stop(area.size());
        Ok(())
    }

    fn profiler(&self) -> Option<&SourceProfiler> {
        Some(&self.profiler)
    }
}

#[cfg(test)]
mod tests {
    use raster_core::{color::ChromaSubsampling, source::MemoryPixelSource};

    use super::*;

    fn plane(format: PixelFormat, value: u8) -> Box<dyn PixelSource> {
        Box::new(MemoryPixelSource::new(format, 2, 2, vec![value; 4]).unwrap())
    }

    fn merge_single(y: u8, cb: u8, cr: u8) -> [u8; 3] {
        let planes = PlanarPixelSource::new(
            plane(PixelFormat::Y8, y),
            plane(PixelFormat::Cb8, cb),
            plane(PixelFormat::Cr8, cr),
            ChromaSubsampling::Subsample444,
        )
        .unwrap();
        let mut merged = PlanarConversionSource::new(planes, YccMatrix::Bt601).unwrap();

        let mut out = [0u8; 12];
        merged.copy_pixels(PixelArea::from_size(2, 2), 6, &mut out).unwrap();
        [out[0], out[1], out[2]]
    }

    #[test]
    fn bt601_full_range_red() {
        // (Y=76, Cb=85, Cr=255) is pure red in BT.601 full range
        let bgr = merge_single(76, 85, 255);
        assert!(bgr[0] <= 1, "b={}", bgr[0]);
        assert!(bgr[1] <= 1, "g={}", bgr[1]);
        assert!(bgr[2] >= 254, "r={}", bgr[2]);
    }

    #[test]
    fn grey_passthrough() {
        // neutral chroma leaves luma untouched
        let bgr = merge_single(128, 128, 128);
        assert_eq!(bgr, [128, 128, 128]);
    }

    #[test]
    fn video_range_expands() {
        let planes = PlanarPixelSource::new(
            plane(PixelFormat::Y8Video, 235),
            plane(PixelFormat::Cb8Video, 128),
            plane(PixelFormat::Cr8Video, 128),
            ChromaSubsampling::Subsample444,
        )
        .unwrap();
        let mut merged = PlanarConversionSource::new(planes, YccMatrix::Bt601).unwrap();

        let mut out = [0u8; 12];
        merged.copy_pixels(PixelArea::from_size(2, 2), 6, &mut out).unwrap();
        assert_eq!(&out[..3], &[255, 255, 255]);
    }

    #[test]
    fn rejects_subsampled_planes() {
        let y = Box::new(MemoryPixelSource::new(PixelFormat::Y8, 4, 4, vec![0; 16]).unwrap());
        let cb = Box::new(MemoryPixelSource::new(PixelFormat::Cb8, 2, 2, vec![0; 4]).unwrap());
        let cr = Box::new(MemoryPixelSource::new(PixelFormat::Cr8, 2, 2, vec![0; 4]).unwrap());
        let planes = PlanarPixelSource::new(y, cb, cr, ChromaSubsampling::Subsample420).unwrap();
        assert!(PlanarConversionSource::new(planes, YccMatrix::Bt601).is_err());
    }
}
