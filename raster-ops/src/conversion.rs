//! Pixel format conversion as a chained source.
//!
//! A [`ConversionSource`] pulls lines from its upstream and runs one of the
//! line converters below, pairing the widening/narrowing kernels with the
//! transfer-curve tables the format pair calls for.

use bytemuck::{try_cast_slice, try_cast_slice_mut};
use raster_core::{
    area::PixelArea,
    buffer::{rent_local_aligned, BufferLease},
    error::Error,
    pixel::PixelFormat,
    profiler::SourceProfiler,
    source::{check_copy_args, ChainedPixelSource, PixelSource},
    Result,
};

use crate::{
    convert::{
        extract_3_of_4, narrow_f32_to_u8, narrow_f32_to_u8_3a, narrow_f32_to_u8_3x, premultiply_u8, swap_channels_3,
        swap_channels_4, unpremultiply_u8, widen_u8_to_f32, widen_u8_to_f32_3a, widen_u8_to_f32_3x, ValueRange,
    },
    gamma::{
        compand_q15_to_u8, compand_to_u8, linear_q15_table_8, linear_q15_table_video_luma, linear_table_8,
        linear_table_video_luma, widen_u8_to_q15_3a_linear, InterpolatingLut,
    },
};

/// One line-level conversion step.
enum LineConverter {
    /// Same byte layout, different label.
    Copy,
    /// u8 → f32 through a widening table.
    Widen(&'static [f32; 256]),
    /// u8 quads → premultiplied f32 quads.
    Widen3A(&'static [f32; 256]),
    /// u8 triples → 4-lane f32, pad 0.
    Widen3X(&'static [f32; 256]),
    /// Premultiplied u8 quads → premultiplied linear f32 quads.
    WidenLinearFromPremult,
    /// f32 → u8.
    Narrow(ValueRange),
    /// Linear f32 → companded u8.
    NarrowCompand,
    /// Premultiplied f32 quads → straight u8 quads.
    Narrow3A {
        compand: bool,
    },
    /// 4-lane f32 → tight u8 triples.
    Narrow3X {
        range: ValueRange,
        compand: bool,
    },
    /// Companded u8 → linear UQ15 through a table.
    WidenQ15(&'static [u16; 256]),
    /// Straight u8 quads → premultiplied linear UQ15 quads.
    WidenQ15Linear3A,
    /// Straight u8 quads → premultiplied UQ15 quads, no curve.
    WidenQ15Straight3A,
    /// Linear UQ15 → companded u8.
    NarrowQ15Compand,
    /// Premultiplied linear UQ15 quads → straight companded u8 quads.
    NarrowQ15Compand3A,
    /// Transfer-curve conversion between float formats, in place.
    FloatGamma {
        to_linear: bool,
        alpha: bool,
    },
    Swap3,
    Swap4,
    GreyToBgr,
    GreyToBgra,
    Drop4To3,
    Pad3To4 {
        fill: u8,
    },
    Premultiply8,
    Unpremultiply8,
}

impl LineConverter {
    fn for_pair(from: PixelFormat, to: PixelFormat) -> Result<LineConverter> {
        use PixelFormat::*;

        let converter = match (from, to) {
            (a, b) if a == b => LineConverter::Copy,
            (Grey8, Y8) | (Y8, Grey8) => LineConverter::Copy,

            // u8 → f32
            (Grey8 | Y8, Grey32Float | Y32Float) => LineConverter::Widen(ValueRange::Full.table()),
            (Grey8 | Y8, Grey32FloatLinear | Y32FloatLinear) => LineConverter::Widen(linear_table_8()),
            (Y8Video, Y32Float) => LineConverter::Widen(ValueRange::VideoLuma.table()),
            (Y8Video, Y32FloatLinear) => LineConverter::Widen(linear_table_video_luma()),
            (Cb8, Cb32Float) | (Cr8, Cr32Float) => LineConverter::Widen(ValueRange::FullChroma.table()),
            (Cb8Video, Cb32Float) | (Cr8Video, Cr32Float) => LineConverter::Widen(ValueRange::VideoChroma.table()),
            (Bgr24, Bgr96Float) => LineConverter::Widen(ValueRange::Full.table()),
            (Bgr24, Bgr96FloatLinear) => LineConverter::Widen(linear_table_8()),
            (Bgr24, Bgrx128Float) => LineConverter::Widen3X(ValueRange::Full.table()),
            (Bgr24, Bgrx128FloatLinear) => LineConverter::Widen3X(linear_table_8()),
            (Bgrx32, Bgrx128Float) => LineConverter::Widen(ValueRange::Full.table()),
            (Bgrx32, Bgrx128FloatLinear) => LineConverter::Widen(linear_table_8()),
            (Bgra32, Pbgra128Float) => LineConverter::Widen3A(ValueRange::Full.table()),
            (Bgra32, Pbgra128FloatLinear) => LineConverter::Widen3A(linear_table_8()),
            (Pbgra32, Pbgra128Float) => LineConverter::Widen(ValueRange::Full.table()),
            (Pbgra32, Pbgra128FloatLinear) => LineConverter::WidenLinearFromPremult,

            // f32 → u8
            (Grey32Float | Y32Float, Grey8 | Y8) => LineConverter::Narrow(ValueRange::Full),
            (Grey32FloatLinear | Y32FloatLinear, Grey8 | Y8) => LineConverter::NarrowCompand,
            (Cb32Float, Cb8) | (Cr32Float, Cr8) => LineConverter::Narrow(ValueRange::FullChroma),
            (Bgr96Float, Bgr24) => LineConverter::Narrow(ValueRange::Full),
            (Bgr96FloatLinear, Bgr24) => LineConverter::NarrowCompand,
            (Bgrx128Float, Bgr24) => LineConverter::Narrow3X {
                range: ValueRange::Full,
                compand: false,
            },
            (Bgrx128FloatLinear, Bgr24) => LineConverter::Narrow3X {
                range: ValueRange::Full,
                compand: true,
            },
            (Bgrx128Float, Bgrx32) => LineConverter::Narrow(ValueRange::Full),
            (Pbgra128Float, Bgra32) => LineConverter::Narrow3A {
                compand: false,
            },
            (Pbgra128FloatLinear, Bgra32) => LineConverter::Narrow3A {
                compand: true,
            },
            (Pbgra128Float, Pbgra32) => LineConverter::Narrow(ValueRange::Full),

            // u8 → UQ15
            (Grey8 | Y8, Grey16UQ15Linear | Y16UQ15Linear) => LineConverter::WidenQ15(linear_q15_table_8()),
            (Y8Video, Y16UQ15Linear) => LineConverter::WidenQ15(linear_q15_table_video_luma()),
            (Bgr24, Bgr48UQ15Linear) => LineConverter::WidenQ15(linear_q15_table_8()),
            (Bgra32, Pbgra64UQ15Linear) => LineConverter::WidenQ15Linear3A,
            (Pbgra32, Pbgra64UQ15Linear) => LineConverter::WidenQ15Straight3A,

            // UQ15 → u8
            (Grey16UQ15Linear | Y16UQ15Linear, Grey8 | Y8) => LineConverter::NarrowQ15Compand,
            (Bgr48UQ15Linear, Bgr24) => LineConverter::NarrowQ15Compand,
            (Pbgra64UQ15Linear, Bgra32) => LineConverter::NarrowQ15Compand3A,

            // float ↔ float
            (Grey32Float, Grey32FloatLinear)
            | (Y32Float, Y32FloatLinear)
            | (Bgr96Float, Bgr96FloatLinear)
            | (Bgrx128Float, Bgrx128FloatLinear) => LineConverter::FloatGamma {
                to_linear: true,
                alpha: false,
            },
            (Grey32FloatLinear, Grey32Float)
            | (Y32FloatLinear, Y32Float)
            | (Bgr96FloatLinear, Bgr96Float)
            | (Bgrx128FloatLinear, Bgrx128Float) => LineConverter::FloatGamma {
                to_linear: false,
                alpha: false,
            },
            (Pbgra128Float, Pbgra128FloatLinear) => LineConverter::FloatGamma {
                to_linear: true,
                alpha: true,
            },
            (Pbgra128FloatLinear, Pbgra128Float) => LineConverter::FloatGamma {
                to_linear: false,
                alpha: true,
            },

            // u8 ↔ u8
            (Grey8, Bgr24) => LineConverter::GreyToBgr,
            (Grey8, Bgra32) => LineConverter::GreyToBgra,
            (Rgb24, Bgr24) | (Bgr24, Rgb24) => LineConverter::Swap3,
            (Rgba32, Bgra32) | (Bgra32, Rgba32) => LineConverter::Swap4,
            (Bgrx32 | Bgra32 | Pbgra32, Bgr24) => LineConverter::Drop4To3,
            (Bgr24, Bgrx32) => LineConverter::Pad3To4 {
                fill: 0,
            },
            (Bgr24, Bgra32) => LineConverter::Pad3To4 {
                fill: 0xFF,
            },
            (Bgra32, Pbgra32) => LineConverter::Premultiply8,
            (Pbgra32, Bgra32) => LineConverter::Unpremultiply8,

            _ => return Err(Error::Unsupported(format!("conversion {from} -> {to}").into())),
        };

        Ok(converter)
    }

    fn run(&self, src: &[u8], dst: &mut [u8], scratch: &mut [u8]) {
        match self {
            LineConverter::Copy => dst.copy_from_slice(src),
            LineConverter::Widen(table) => with_f32_dst(dst, scratch, src.len(), |out| widen_u8_to_f32(table, src, out)),
            LineConverter::Widen3A(table) => {
                with_f32_dst(dst, scratch, src.len(), |out| widen_u8_to_f32_3a(table, src, out))
            }
            LineConverter::Widen3X(table) => {
                with_f32_dst(dst, scratch, src.len() / 3 * 4, |out| widen_u8_to_f32_3x(table, src, out))
            }
            LineConverter::WidenLinearFromPremult => {
                with_f32_dst(dst, scratch, src.len(), |out| {
                    widen_u8_to_f32(ValueRange::Full.table(), src, out);
                    InterpolatingLut::to_linear().convert_float_3a(out);
                });
            }
            LineConverter::Narrow(range) => with_f32_src(src, scratch, |input| narrow_f32_to_u8(*range, input, dst)),
            LineConverter::NarrowCompand => with_f32_src(src, scratch, |input| {
                for (s, d) in input.iter().zip(dst.iter_mut()) {
                    *d = compand_to_u8(*s);
                }
            }),
            LineConverter::Narrow3A {
                compand,
            } => with_f32_src(src, scratch, |input| {
                if *compand {
                    narrow_linear_premult_to_u8(input, dst);
                } else {
                    narrow_f32_to_u8_3a(input, dst);
                }
            }),
            LineConverter::Narrow3X {
                range,
                compand,
            } => with_f32_src(src, scratch, |input| {
                if *compand {
                    for (s, d) in input.chunks_exact(4).zip(dst.chunks_exact_mut(3)) {
                        d[0] = compand_to_u8(s[0]);
                        d[1] = compand_to_u8(s[1]);
                        d[2] = compand_to_u8(s[2]);
                    }
                } else {
                    narrow_f32_to_u8_3x(*range, input, dst);
                }
            }),
            LineConverter::WidenQ15(table) => with_q15_dst(dst, scratch, src.len(), |out| {
                for (s, d) in src.iter().zip(out.iter_mut()) {
                    *d = table[*s as usize];
                }
            }),
            LineConverter::WidenQ15Linear3A => {
                with_q15_dst(dst, scratch, src.len(), |out| widen_u8_to_q15_3a_linear(src, out))
            }
            LineConverter::WidenQ15Straight3A => with_q15_dst(dst, scratch, src.len(), |out| {
                // premultiplied u8 has the curve applied to premultiplied
                // values; go through straight before linearizing
                let mut straight = [0u8; 4];
                for (s, d) in src.chunks_exact(4).zip(out.chunks_exact_mut(4)) {
                    straight.copy_from_slice(s);
                    unpremultiply_u8(&mut straight);
                    let mut quad = [0u16; 4];
                    widen_u8_to_q15_3a_linear(&straight, &mut quad);
                    d.copy_from_slice(&quad);
                }
            }),
            LineConverter::NarrowQ15Compand => with_q15_src(src, scratch, |input| {
                for (s, d) in input.iter().zip(dst.iter_mut()) {
                    *d = compand_q15_to_u8(*s);
                }
            }),
            LineConverter::NarrowQ15Compand3A => {
                with_q15_src(src, scratch, |input| narrow_q15_linear_premult_to_u8(input, dst))
            }
            LineConverter::FloatGamma {
                to_linear,
                alpha,
            } => {
                dst.copy_from_slice(src);
                let lut = if *to_linear {
                    InterpolatingLut::to_linear()
                } else {
                    InterpolatingLut::to_companded()
                };
                match try_cast_slice_mut::<u8, f32>(dst) {
                    Ok(line) => run_float_gamma(lut, *alpha, line),
                    Err(_) => {
                        let line = cast_scratch_f32(scratch, src.len() / 4);
                        line_from_bytes(src, line);
                        run_float_gamma(lut, *alpha, line);
                        line_to_bytes(line, dst);
                    }
                }
            }
            LineConverter::Swap3 => {
                dst.copy_from_slice(src);
                swap_channels_3(dst);
            }
            LineConverter::Swap4 => {
                dst.copy_from_slice(src);
                swap_channels_4(dst);
            }
            LineConverter::GreyToBgr => {
                for (s, d) in src.iter().zip(dst.chunks_exact_mut(3)) {
                    d.fill(*s);
                }
            }
            LineConverter::GreyToBgra => {
                for (s, d) in src.iter().zip(dst.chunks_exact_mut(4)) {
                    d[..3].fill(*s);
                    d[3] = 0xFF;
                }
            }
            LineConverter::Drop4To3 => extract_3_of_4(src, dst),
            LineConverter::Pad3To4 {
                fill,
            } => {
                for (s, d) in src.chunks_exact(3).zip(dst.chunks_exact_mut(4)) {
                    d[..3].copy_from_slice(s);
                    d[3] = *fill;
                }
            }
            LineConverter::Premultiply8 => {
                dst.copy_from_slice(src);
                premultiply_u8(dst);
            }
            LineConverter::Unpremultiply8 => {
                dst.copy_from_slice(src);
                unpremultiply_u8(dst);
            }
        }
    }
}

fn run_float_gamma(lut: &InterpolatingLut, alpha: bool, line: &mut [f32]) {
    if alpha {
        lut.convert_float_3a(line);
    } else {
        lut.convert_float(line);
    }
}

/// Premultiplied linear f32 quads → straight companded u8 quads.
fn narrow_linear_premult_to_u8(src: &[f32], dst: &mut [u8]) {
    const MIN_ALPHA: f32 = 0.5 / 255.0;
    for (s, d) in src.chunks_exact(4).zip(dst.chunks_exact_mut(4)) {
        let alpha = s[3];
        if alpha < MIN_ALPHA {
            d.fill(0);
        } else {
            let inverse = 1.0 / alpha;
            d[0] = compand_to_u8(s[0] * inverse);
            d[1] = compand_to_u8(s[1] * inverse);
            d[2] = compand_to_u8(s[2] * inverse);
            d[3] = (alpha * 255.0 + 0.5).clamp(0.0, 255.5) as u8;
        }
    }
}

/// Premultiplied linear UQ15 quads → straight companded u8 quads.
fn narrow_q15_linear_premult_to_u8(src: &[u16], dst: &mut [u8]) {
    use crate::convert::{unfix15_to_u8, UQ15_ONE};

    for (s, d) in src.chunks_exact(4).zip(dst.chunks_exact_mut(4)) {
        let alpha = s[3] as u32;
        if alpha == 0 {
            d.fill(0);
        } else {
            let unmultiply = |c: u16| {
                let straight = ((c as u32 * UQ15_ONE as u32 + alpha / 2) / alpha).min(UQ15_ONE as u32);
                compand_q15_to_u8(straight as u16)
            };
            d[0] = unmultiply(s[0]);
            d[1] = unmultiply(s[1]);
            d[2] = unmultiply(s[2]);
            d[3] = unfix15_to_u8(alpha as u16);
        }
    }
}

// The destination buffer supplied by a consumer is not guaranteed to be
// aligned for wide stores; fall back to an aligned scratch line when the
// cast fails.

fn cast_scratch_f32(scratch: &mut [u8], samples: usize) -> &mut [f32] {
    &mut try_cast_slice_mut::<u8, f32>(scratch).expect("pooled scratch is vector aligned")[..samples]
}

fn line_from_bytes(src: &[u8], dst: &mut [f32]) {
    for (s, d) in src.chunks_exact(4).zip(dst.iter_mut()) {
        *d = f32::from_ne_bytes([s[0], s[1], s[2], s[3]]);
    }
}

fn line_to_bytes(src: &[f32], dst: &mut [u8]) {
    for (s, d) in src.iter().zip(dst.chunks_exact_mut(4)) {
        d.copy_from_slice(&s.to_ne_bytes());
    }
}

fn with_f32_dst<F: FnOnce(&mut [f32])>(dst: &mut [u8], scratch: &mut [u8], samples: usize, f: F) {
    match try_cast_slice_mut::<u8, f32>(dst) {
        Ok(out) => f(&mut out[..samples]),
        Err(_) => {
            let out = cast_scratch_f32(scratch, samples);
            f(out);
            line_to_bytes(out, &mut dst[..samples * 4]);
        }
    }
}

fn with_f32_src<F: FnOnce(&[f32])>(src: &[u8], scratch: &mut [u8], f: F) {
    match try_cast_slice::<u8, f32>(src) {
        Ok(input) => f(input),
        Err(_) => {
            let samples = src.len() / 4;
            let input = cast_scratch_f32(scratch, samples);
            line_from_bytes(src, input);
            f(input);
        }
    }
}

fn with_q15_dst<F: FnOnce(&mut [u16])>(dst: &mut [u8], scratch: &mut [u8], samples: usize, f: F) {
    match try_cast_slice_mut::<u8, u16>(dst) {
        Ok(out) => f(&mut out[..samples]),
        Err(_) => {
            let out = &mut try_cast_slice_mut::<u8, u16>(scratch).expect("pooled scratch is vector aligned")[..samples];
            f(out);
            for (s, d) in out.iter().zip(dst.chunks_exact_mut(2)) {
                d.copy_from_slice(&s.to_ne_bytes());
            }
        }
    }
}

fn with_q15_src<F: FnOnce(&[u16])>(src: &[u8], scratch: &mut [u8], f: F) {
    match try_cast_slice::<u8, u16>(src) {
        Ok(input) => f(input),
        Err(_) => {
            let samples = src.len() / 2;
            let input = &mut try_cast_slice_mut::<u8, u16>(scratch).expect("pooled scratch is vector aligned")[..samples];
            for (s, d) in src.chunks_exact(2).zip(input.iter_mut()) {
                *d = u16::from_ne_bytes([s[0], s[1]]);
            }
            f(input);
        }
    }
}

/// Chained source converting between two pixel formats line at a time.
pub struct ConversionSource {
    source: Box<dyn PixelSource>,
    format: PixelFormat,
    converter: LineConverter,
    src_line: BufferLease,
    scratch: BufferLease,
    profiler: SourceProfiler,
}

impl ConversionSource {
    pub fn new(source: Box<dyn PixelSource>, format: PixelFormat) -> Result<Self> {
        let converter = LineConverter::for_pair(source.format(), format)?;
        let src_line = rent_local_aligned(source.format().line_bytes(source.width()));
        let scratch = rent_local_aligned(
            format.line_bytes(source.width()).max(source.format().line_bytes(source.width())),
        );

        Ok(Self {
            source,
            format,
            converter,
            src_line,
            scratch,
            profiler: SourceProfiler::new("convert"),
        })
    }

    pub fn supported(from: PixelFormat, to: PixelFormat) -> bool {
        LineConverter::for_pair(from, to).is_ok()
    }
}

impl PixelSource for ConversionSource {
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
        self.profiler.start();

        let src_bytes = self.source.format().line_bytes(area.width);
        for row in 0..area.height {
            let line_area = PixelArea::new(area.x, area.y + row, area.width, 1);

            self.profiler.pause();
            self.source.copy_pixels(line_area, src_bytes, &mut self.src_line[..src_bytes])?;
            self.profiler.resume();

            let dst = &mut buf[row as usize * stride..][..line_bytes];
            self.converter.run(&self.src_line[..src_bytes], dst, &mut self.scratch);
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

impl ChainedPixelSource for ConversionSource {
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

    fn convert(from: PixelFormat, to: PixelFormat, width: u32, data: Vec<u8>) -> Vec<u8> {
        let source = MemoryPixelSource::new(from, width, 1, data).unwrap();
        let mut conversion = ConversionSource::new(Box::new(source), to).unwrap();
        let mut out = vec![0u8; to.line_bytes(width)];
        let line = out.len();
        conversion.copy_pixels(PixelArea::from_size(width, 1), line, &mut out).unwrap();
        out
    }

    #[test]
    fn widen_then_narrow_is_identity() {
        let src: Vec<u8> = vec![0, 1, 127, 128, 200, 255];
        let wide = convert(PixelFormat::Bgr24, PixelFormat::Bgr96Float, 2, src.clone());
        let source = MemoryPixelSource::new(PixelFormat::Bgr96Float, 2, 1, wide).unwrap();
        let mut back = ConversionSource::new(Box::new(source), PixelFormat::Bgr24).unwrap();
        let mut out = vec![0u8; 6];
        back.copy_pixels(PixelArea::from_size(2, 1), 6, &mut out).unwrap();
        assert_eq!(out, src);
    }

    #[test]
    fn linear_q15_round_trip() {
        let src: Vec<u8> = vec![0, 32, 64, 96, 128, 192, 250, 255, 10, 20, 30, 40];
        let wide = convert(PixelFormat::Bgr24, PixelFormat::Bgr48UQ15Linear, 4, src.clone());
        let source = MemoryPixelSource::new(PixelFormat::Bgr48UQ15Linear, 4, 1, wide).unwrap();
        let mut back = ConversionSource::new(Box::new(source), PixelFormat::Bgr24).unwrap();
        let mut out = vec![0u8; 12];
        back.copy_pixels(PixelArea::from_size(4, 1), 12, &mut out).unwrap();
        assert_eq!(out, src);
    }

    #[test]
    fn premultiplied_linear_float_round_trip() {
        let src: Vec<u8> = vec![255, 0, 0, 128, 0, 255, 0, 64];
        let wide = convert(PixelFormat::Bgra32, PixelFormat::Pbgra128FloatLinear, 2, src.clone());
        let source = MemoryPixelSource::new(PixelFormat::Pbgra128FloatLinear, 2, 1, wide).unwrap();
        let mut back = ConversionSource::new(Box::new(source), PixelFormat::Bgra32).unwrap();
        let mut out = vec![0u8; 8];
        back.copy_pixels(PixelArea::from_size(2, 1), 8, &mut out).unwrap();
        for (a, b) in src.iter().zip(out.iter()) {
            assert!((*a as i32 - *b as i32).abs() <= 1, "{src:?} -> {out:?}");
        }
    }

    #[test]
    fn unsupported_pair_rejected() {
        assert!(!ConversionSource::supported(PixelFormat::Cmyk32, PixelFormat::Bgr24));
        assert!(ConversionSource::supported(PixelFormat::Bgra32, PixelFormat::Pbgra64UQ15Linear));
    }

    #[test]
    fn rgb_swizzle() {
        let out = convert(PixelFormat::Rgb24, PixelFormat::Bgr24, 2, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(out, vec![3, 2, 1, 6, 5, 4]);
    }
}
