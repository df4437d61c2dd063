use std::fmt::{Display, Formatter};

use bitflags::bitflags;
use num_enum::TryFromPrimitive;
use strum::EnumIter;

use crate::{color::ColorRange, invalid_param_error, utils::div_ceil, Result};

/// Numeric representation of a single channel sample.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[repr(u8)]
pub enum PixelNumeric {
    #[default]
    UnsignedInt,
    /// Unsigned fixed point, 15 fractional bits. `UQ15_ONE` represents 1.0.
    FixedQ15,
    Float,
}

/// Alpha channel representation.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[repr(u8)]
pub enum AlphaMode {
    #[default]
    None,
    Straight,
    Premultiplied,
}

/// Color interpretation of the channel set.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[repr(u8)]
pub enum ColorModel {
    #[default]
    Bgr,
    Grey,
    Y,
    Cb,
    Cr,
    Cmyk,
    Indexed,
}

/// Transfer encoding of the stored values.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[repr(u8)]
pub enum ValueEncoding {
    #[default]
    Companded,
    Linear,
    Unspecified,
}

#[repr(u8)]
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, TryFromPrimitive, EnumIter)]
pub enum PixelFormat {
    #[default]
    Grey8 = 0,
    Y8,
    Y8Video,
    Cb8,
    Cr8,
    Cb8Video,
    Cr8Video,
    Bgr24,
    Bgra32,
    Pbgra32,
    Bgrx32,
    Rgb24,
    Rgba32,
    Cmyk32,
    Indexed8,
    Grey32Float,
    Grey32FloatLinear,
    Grey16UQ15Linear,
    Y32Float,
    Y32FloatLinear,
    Y16UQ15Linear,
    Cb32Float,
    Cr32Float,
    Bgr96Float,
    Bgr96FloatLinear,
    Bgrx128Float,
    Bgrx128FloatLinear,
    Pbgra128Float,
    Pbgra128FloatLinear,
    Bgr48UQ15Linear,
    Pbgra64UQ15Linear,
    MAX,
}

impl Display for PixelFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

bitflags! {
    #[repr(transparent)]
    struct PixelFormatFlags: u32 {
        const Alpha         = 1 << 0;
        const Premultiplied = 1 << 1;
        const Linear        = 1 << 2;
        const Video         = 1 << 3;
        const RgbOrder      = 1 << 4;
        const Indexed       = 1 << 5;
    }
}

struct PixelFormatDescriptor {
    channels: u8,
    bits_per_pixel: u8,
    numeric: PixelNumeric,
    alpha: AlphaMode,
    color: ColorModel,
    encoding: ValueEncoding,
    range: ColorRange,
    flags: PixelFormatFlags,
}

macro_rules! pix_fmt_flags {
    () => {
        PixelFormatFlags::empty()
    };
    ($($flag:ident)|+) => {
        PixelFormatFlags::from_bits_truncate(0 $(| PixelFormatFlags::$flag.bits())+)
    };
}

macro_rules! pix_fmt_desc {
    ($channels:expr, $bpp:expr, $numeric:ident, $alpha:ident, $color:ident, $encoding:ident, $range:ident, [$($flag:ident)|*]) => {
        PixelFormatDescriptor {
            channels: $channels,
            bits_per_pixel: $bpp,
            numeric: PixelNumeric::$numeric,
            alpha: AlphaMode::$alpha,
            color: ColorModel::$color,
            encoding: ValueEncoding::$encoding,
            range: ColorRange::$range,
            flags: pix_fmt_flags!($($flag)|*),
        }
    };
}

#[rustfmt::skip]
static PIXEL_FORMAT_DESC: [PixelFormatDescriptor; PixelFormat::MAX as usize] = [
    // Grey8
    pix_fmt_desc!(1, 8, UnsignedInt, None, Grey, Companded, Full, []),
    // Y8
    pix_fmt_desc!(1, 8, UnsignedInt, None, Y, Companded, Full, []),
    // Y8Video
    pix_fmt_desc!(1, 8, UnsignedInt, None, Y, Companded, Video, [Video]),
    // Cb8
    pix_fmt_desc!(1, 8, UnsignedInt, None, Cb, Unspecified, Full, []),
    // Cr8
    pix_fmt_desc!(1, 8, UnsignedInt, None, Cr, Unspecified, Full, []),
    // Cb8Video
    pix_fmt_desc!(1, 8, UnsignedInt, None, Cb, Unspecified, Video, [Video]),
    // Cr8Video
    pix_fmt_desc!(1, 8, UnsignedInt, None, Cr, Unspecified, Video, [Video]),
    // Bgr24
    pix_fmt_desc!(3, 24, UnsignedInt, None, Bgr, Companded, Full, []),
    // Bgra32
    pix_fmt_desc!(4, 32, UnsignedInt, Straight, Bgr, Companded, Full, [Alpha]),
    // Pbgra32
    pix_fmt_desc!(4, 32, UnsignedInt, Premultiplied, Bgr, Companded, Full, [Alpha | Premultiplied]),
    // Bgrx32
    pix_fmt_desc!(4, 32, UnsignedInt, None, Bgr, Companded, Full, []),
    // Rgb24
    pix_fmt_desc!(3, 24, UnsignedInt, None, Bgr, Companded, Full, [RgbOrder]),
    // Rgba32
    pix_fmt_desc!(4, 32, UnsignedInt, Straight, Bgr, Companded, Full, [Alpha | RgbOrder]),
    // Cmyk32
    pix_fmt_desc!(4, 32, UnsignedInt, None, Cmyk, Unspecified, Full, []),
    // Indexed8
    pix_fmt_desc!(1, 8, UnsignedInt, Straight, Indexed, Unspecified, Full, [Alpha | Indexed]),
    // Grey32Float
    pix_fmt_desc!(1, 32, Float, None, Grey, Companded, Full, []),
    // Grey32FloatLinear
    pix_fmt_desc!(1, 32, Float, None, Grey, Linear, Full, [Linear]),
    // Grey16UQ15Linear
    pix_fmt_desc!(1, 16, FixedQ15, None, Grey, Linear, Full, [Linear]),
    // Y32Float
    pix_fmt_desc!(1, 32, Float, None, Y, Companded, Full, []),
    // Y32FloatLinear
    pix_fmt_desc!(1, 32, Float, None, Y, Linear, Full, [Linear]),
    // Y16UQ15Linear
    pix_fmt_desc!(1, 16, FixedQ15, None, Y, Linear, Full, [Linear]),
    // Cb32Float
    pix_fmt_desc!(1, 32, Float, None, Cb, Unspecified, Full, []),
    // Cr32Float
    pix_fmt_desc!(1, 32, Float, None, Cr, Unspecified, Full, []),
    // Bgr96Float
    pix_fmt_desc!(3, 96, Float, None, Bgr, Companded, Full, []),
    // Bgr96FloatLinear
    pix_fmt_desc!(3, 96, Float, None, Bgr, Linear, Full, [Linear]),
    // Bgrx128Float
    pix_fmt_desc!(4, 128, Float, None, Bgr, Companded, Full, []),
    // Bgrx128FloatLinear
    pix_fmt_desc!(4, 128, Float, None, Bgr, Linear, Full, [Linear]),
    // Pbgra128Float
    pix_fmt_desc!(4, 128, Float, Premultiplied, Bgr, Companded, Full, [Alpha | Premultiplied]),
    // Pbgra128FloatLinear
    pix_fmt_desc!(4, 128, Float, Premultiplied, Bgr, Linear, Full, [Alpha | Premultiplied | Linear]),
    // Bgr48UQ15Linear
    pix_fmt_desc!(3, 48, FixedQ15, None, Bgr, Linear, Full, [Linear]),
    // Pbgra64UQ15Linear
    pix_fmt_desc!(4, 64, FixedQ15, Premultiplied, Bgr, Linear, Full, [Alpha | Premultiplied | Linear]),
];

impl PixelFormat {
    /// Stable identifier for the external pixel source contract.
    pub fn id(&self) -> u8 {
        *self as u8
    }

    pub fn from_id(id: u8) -> Result<Self> {
        let format = PixelFormat::try_from(id).map_err(|_| invalid_param_error!(id))?;
        if format == PixelFormat::MAX {
            return Err(invalid_param_error!(id));
        }
        Ok(format)
    }

    pub fn channels(&self) -> u8 {
        PIXEL_FORMAT_DESC[*self as usize].channels
    }

    pub fn bits_per_pixel(&self) -> u8 {
        PIXEL_FORMAT_DESC[*self as usize].bits_per_pixel
    }

    pub fn bytes_per_pixel(&self) -> usize {
        self.bits_per_pixel() as usize / 8
    }

    /// Bytes per channel sample. Indexed formats store one palette index per pixel.
    pub fn bytes_per_channel(&self) -> usize {
        let desc = &PIXEL_FORMAT_DESC[*self as usize];
        if desc.flags.contains(PixelFormatFlags::Indexed) {
            1
        } else {
            desc.bits_per_pixel as usize / desc.channels as usize / 8
        }
    }

    pub fn numeric(&self) -> PixelNumeric {
        PIXEL_FORMAT_DESC[*self as usize].numeric
    }

    pub fn alpha(&self) -> AlphaMode {
        PIXEL_FORMAT_DESC[*self as usize].alpha
    }

    pub fn color(&self) -> ColorModel {
        PIXEL_FORMAT_DESC[*self as usize].color
    }

    pub fn encoding(&self) -> ValueEncoding {
        PIXEL_FORMAT_DESC[*self as usize].encoding
    }

    pub fn range(&self) -> ColorRange {
        PIXEL_FORMAT_DESC[*self as usize].range
    }

    pub fn has_alpha(&self) -> bool {
        PIXEL_FORMAT_DESC[*self as usize].flags.contains(PixelFormatFlags::Alpha)
    }

    pub fn is_premultiplied(&self) -> bool {
        PIXEL_FORMAT_DESC[*self as usize].flags.contains(PixelFormatFlags::Premultiplied)
    }

    pub fn is_linear(&self) -> bool {
        PIXEL_FORMAT_DESC[*self as usize].flags.contains(PixelFormatFlags::Linear)
    }

    pub fn is_video_range(&self) -> bool {
        PIXEL_FORMAT_DESC[*self as usize].flags.contains(PixelFormatFlags::Video)
    }

    pub fn is_rgb_order(&self) -> bool {
        PIXEL_FORMAT_DESC[*self as usize].flags.contains(PixelFormatFlags::RgbOrder)
    }

    pub fn is_indexed(&self) -> bool {
        PIXEL_FORMAT_DESC[*self as usize].flags.contains(PixelFormatFlags::Indexed)
    }

    /// True for the single-channel Y/Cb/Cr formats carried by planar frames.
    pub fn is_planar_component(&self) -> bool {
        matches!(self.color(), ColorModel::Y | ColorModel::Cb | ColorModel::Cr)
    }

    pub fn is_float(&self) -> bool {
        self.numeric() == PixelNumeric::Float
    }

    pub fn is_fixed(&self) -> bool {
        self.numeric() == PixelNumeric::FixedQ15
    }

    /// Tight packed byte count for `width` pixels of one row.
    pub fn line_bytes(&self, width: u32) -> usize {
        div_ceil(width as usize * self.bits_per_pixel() as usize, 8)
    }

    /// The internal working format used when a pipeline widens this format,
    /// governed by the gamma mode and the availability of vector floats.
    pub fn working_equivalent(&self, linear: bool, float: bool) -> PixelFormat {
        use PixelFormat::*;

        match (self, linear, float) {
            (Grey8, false, true) => Grey32Float,
            (Grey8, true, true) => Grey32FloatLinear,
            (Grey8, true, false) => Grey16UQ15Linear,
            (Y8 | Y8Video, false, true) => Y32Float,
            (Y8 | Y8Video, true, true) => Y32FloatLinear,
            (Y8 | Y8Video, true, false) => Y16UQ15Linear,
            (Cb8 | Cb8Video, _, true) => Cb32Float,
            (Cr8 | Cr8Video, _, true) => Cr32Float,
            (Bgr24, false, true) => Bgr96Float,
            (Bgr24, true, true) => Bgr96FloatLinear,
            (Bgr24, true, false) => Bgr48UQ15Linear,
            (Bgra32 | Pbgra32, false, true) => Pbgra128Float,
            (Bgra32 | Pbgra32, true, true) => Pbgra128FloatLinear,
            (Bgra32 | Pbgra32, true, false) => Pbgra64UQ15Linear,
            // straight alpha must premultiply even when staying 8-bit
            (Bgra32, false, false) => Pbgra32,
            (Bgrx32, false, true) => Bgrx128Float,
            (Bgrx32, true, true) => Bgrx128FloatLinear,
            (Bgrx32, true, false) => Bgr48UQ15Linear,
            // companded float working formats have linear siblings
            (Grey32Float, true, true) => Grey32FloatLinear,
            (Y32Float, true, true) => Y32FloatLinear,
            (Bgr96Float, true, true) => Bgr96FloatLinear,
            (Bgrx128Float, true, true) => Bgrx128FloatLinear,
            (Pbgra128Float, true, true) => Pbgra128FloatLinear,
            _ => *self,
        }
    }

    /// The 8-bit external format a working format narrows back to.
    pub fn external_equivalent(&self) -> PixelFormat {
        use PixelFormat::*;

        match self {
            Grey32Float | Grey32FloatLinear | Grey16UQ15Linear => Grey8,
            Y32Float | Y32FloatLinear | Y16UQ15Linear => Y8,
            Cb32Float => Cb8,
            Cr32Float => Cr8,
            Bgr96Float | Bgr96FloatLinear | Bgr48UQ15Linear => Bgr24,
            Bgrx128Float | Bgrx128FloatLinear => Bgrx32,
            Pbgra128Float | Pbgra128FloatLinear | Pbgra64UQ15Linear => Bgra32,
            _ => *self,
        }
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn channel_width_invariant() {
        for format in PixelFormat::iter().filter(|f| *f != PixelFormat::MAX) {
            if format.is_indexed() {
                assert_eq!(format.bits_per_pixel(), 8);
                continue;
            }
            let per_channel = format.bytes_per_channel() * 8;
            assert_eq!(
                format.channels() as usize * per_channel,
                format.bits_per_pixel() as usize,
                "{format}"
            );
        }
    }

    #[test]
    fn line_bytes_packed() {
        assert_eq!(PixelFormat::Bgr24.line_bytes(3), 9);
        assert_eq!(PixelFormat::Grey8.line_bytes(5), 5);
        assert_eq!(PixelFormat::Pbgra128Float.line_bytes(2), 32);
    }

    #[test]
    fn id_round_trip() {
        for format in PixelFormat::iter().filter(|f| *f != PixelFormat::MAX) {
            assert_eq!(PixelFormat::from_id(format.id()).unwrap(), format);
        }
        assert!(PixelFormat::from_id(PixelFormat::MAX as u8).is_err());
    }

    #[test]
    fn working_format_round_trip() {
        let working = PixelFormat::Bgra32.working_equivalent(true, true);
        assert_eq!(working, PixelFormat::Pbgra128FloatLinear);
        assert!(working.is_linear() && working.is_premultiplied());
        assert_eq!(working.external_equivalent(), PixelFormat::Bgra32);

        let fixed = PixelFormat::Bgr24.working_equivalent(true, false);
        assert_eq!(fixed, PixelFormat::Bgr48UQ15Linear);
        assert_eq!(fixed.external_equivalent(), PixelFormat::Bgr24);
    }
}
