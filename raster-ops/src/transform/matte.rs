use bytemuck::try_cast_slice_mut;
use raster_core::{
    area::PixelArea,
    buffer::{rent_local_aligned, BufferLease},
    error::Error,
    pixel::PixelFormat,
    source::{check_copy_args, ChainedPixelSource, PixelSource},
    Result,
};

use crate::{
    convert::{fix15, unfix15, UQ15_ONE},
    gamma::{linearize_8, linearize_8_q15},
};

/// Flattens alpha onto a solid background color.
///
/// Premultiplied linear formats blend in linear light; companded formats
/// blend on the stored values. The matte color is given as 8-bit sRGB BGRA.
pub struct MatteSource {
    source: Box<dyn PixelSource>,
    matte_f32: [f32; 4],
    matte_q15: [i32; 4],
    matte_u8: [u8; 4],
    scratch: BufferLease,
}

impl MatteSource {
    pub fn new(source: Box<dyn PixelSource>, color: [u8; 4]) -> Result<Self> {
        let format = source.format();
        let alpha = color[3] as f32 / 255.0;

        let matte_f32 = match format {
            PixelFormat::Pbgra128FloatLinear => [
                linearize_8(color[0]) * alpha,
                linearize_8(color[1]) * alpha,
                linearize_8(color[2]) * alpha,
                alpha,
            ],
            PixelFormat::Pbgra128Float => [
                color[0] as f32 / 255.0 * alpha,
                color[1] as f32 / 255.0 * alpha,
                color[2] as f32 / 255.0 * alpha,
                alpha,
            ],
            PixelFormat::Pbgra64UQ15Linear | PixelFormat::Bgra32 => [0.0; 4],
            _ => return Err(Error::Unsupported(format!("matte over {format}").into())),
        };

        let alpha_q15 = fix15(color[3]) as i32;
        let matte_q15 = [
            unfix15(linearize_8_q15(color[0]) as i32 * alpha_q15),
            unfix15(linearize_8_q15(color[1]) as i32 * alpha_q15),
            unfix15(linearize_8_q15(color[2]) as i32 * alpha_q15),
            alpha_q15,
        ];

        let scratch = rent_local_aligned(format.line_bytes(source.width()));

        Ok(Self {
            source,
            matte_f32,
            matte_q15,
            matte_u8: color,
            scratch,
        })
    }

    fn blend_line(format: PixelFormat, matte_f32: &[f32; 4], matte_q15: &[i32; 4], matte_u8: &[u8; 4], dst: &mut [u8]) {
        match format {
            PixelFormat::Pbgra128FloatLinear | PixelFormat::Pbgra128Float => {
                let line: &mut [f32] = try_cast_slice_mut(dst).expect("pooled scratch is vector aligned");
                let m = matte_f32;
                for quad in line.chunks_exact_mut(4) {
                    let inverse = 1.0 - quad[3];
                    quad[0] += m[0] * inverse;
                    quad[1] += m[1] * inverse;
                    quad[2] += m[2] * inverse;
                    quad[3] += m[3] * inverse;
                }
            }
            PixelFormat::Pbgra64UQ15Linear => {
                let line: &mut [u16] = try_cast_slice_mut(dst).expect("pooled scratch is vector aligned");
                let m = matte_q15;
                for quad in line.chunks_exact_mut(4) {
                    let inverse = UQ15_ONE as i32 - quad[3] as i32;
                    quad[0] = (quad[0] as i32 + unfix15(m[0] * inverse)).min(UQ15_ONE as i32) as u16;
                    quad[1] = (quad[1] as i32 + unfix15(m[1] * inverse)).min(UQ15_ONE as i32) as u16;
                    quad[2] = (quad[2] as i32 + unfix15(m[2] * inverse)).min(UQ15_ONE as i32) as u16;
                    quad[3] = (quad[3] as i32 + unfix15(m[3] * inverse)).min(UQ15_ONE as i32) as u16;
                }
            }
            PixelFormat::Bgra32 => {
                // straight over straight on the companded values
                let m = matte_u8;
                let ma = m[3] as f32 / 255.0;
                for quad in dst.chunks_exact_mut(4) {
                    let fa = quad[3] as f32 / 255.0;
                    let oa = fa + ma * (1.0 - fa);
                    if oa <= 0.0 {
                        quad.fill(0);
                        continue;
                    }
                    for c in 0..3 {
                        let v = (quad[c] as f32 * fa + m[c] as f32 * ma * (1.0 - fa)) / oa;
                        quad[c] = (v + 0.5).clamp(0.0, 255.5) as u8;
                    }
                    quad[3] = (oa * 255.0 + 0.5).clamp(0.0, 255.5) as u8;
                }
            }
            _ => unreachable!("validated in new"),
        }
    }
}

impl PixelSource for MatteSource {
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
        let format = self.source.format();

        let (matte_f32, matte_q15, matte_u8) = (self.matte_f32, self.matte_q15, self.matte_u8);
        for row in 0..area.height {
            let line_area = PixelArea::new(area.x, area.y + row, area.width, 1);
            self.source.copy_pixels(line_area, line_bytes, &mut self.scratch[..line_bytes])?;

            Self::blend_line(format, &matte_f32, &matte_q15, &matte_u8, &mut self.scratch[..line_bytes]);
            buf[row as usize * stride..][..line_bytes].copy_from_slice(&self.scratch[..line_bytes]);
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

impl ChainedPixelSource for MatteSource {
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
