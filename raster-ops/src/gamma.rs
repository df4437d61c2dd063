//! sRGB transfer curve and the companded ↔ linear lookup machinery.

use std::sync::OnceLock;

use crate::convert::{fix15, UQ15_ONE};

pub fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

pub fn linear_to_srgb(c: f32) -> f32 {
    if c <= 0.0031308 {
        c * 12.92
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    }
}

/// u8 companded → linear f32.
pub fn linear_table_8() -> &'static [f32; 256] {
    static TABLE: OnceLock<[f32; 256]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = [0.0f32; 256];
        for (i, v) in table.iter_mut().enumerate() {
            *v = srgb_to_linear(i as f32 / 255.0);
        }
        table
    })
}

/// Video-range u8 companded luma → linear f32.
pub fn linear_table_video_luma() -> &'static [f32; 256] {
    static TABLE: OnceLock<[f32; 256]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let expand = crate::convert::ValueRange::VideoLuma.table();
        let mut table = [0.0f32; 256];
        for (i, v) in table.iter_mut().enumerate() {
            *v = srgb_to_linear(expand[i].clamp(0.0, 1.0));
        }
        table
    })
}

/// Video-range u8 companded luma → linear UQ15.
pub fn linear_q15_table_video_luma() -> &'static [u16; 256] {
    static TABLE: OnceLock<[u16; 256]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let expand = crate::convert::ValueRange::VideoLuma.table();
        let mut table = [0u16; 256];
        for (i, v) in table.iter_mut().enumerate() {
            *v = (srgb_to_linear(expand[i].clamp(0.0, 1.0)) * UQ15_ONE as f32 + 0.5) as u16;
        }
        table
    })
}

/// u8 companded → linear UQ15.
pub fn linear_q15_table_8() -> &'static [u16; 256] {
    static TABLE: OnceLock<[u16; 256]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = [0u16; 256];
        for (i, v) in table.iter_mut().enumerate() {
            *v = (srgb_to_linear(i as f32 / 255.0) * UQ15_ONE as f32 + 0.5) as u16;
        }
        table
    })
}

/// Linear UQ15 → companded u8, one entry per fixed-point value.
pub fn srgb_q15_table() -> &'static [u8] {
    static TABLE: OnceLock<Vec<u8>> = OnceLock::new();
    TABLE.get_or_init(|| {
        (0..=UQ15_ONE as usize)
            .map(|i| (linear_to_srgb(i as f32 / UQ15_ONE as f32) * 255.0 + 0.5).min(255.0) as u8)
            .collect()
    })
}

/// Companded u8 → linear UQ15, inverting through [`srgb_q15_table`] so the
/// two tables round-trip exactly.
pub fn u8_round_trips(v: u8) -> bool {
    srgb_q15_table()[linear_q15_table_8()[v as usize] as usize] == v
}

/// LUT-interpolating transfer curve over f32 lines.
///
/// Lookup: `f = clamp(x·max, 0, max)`, `i = trunc(f)`,
/// `lerp(lut[i], lut[i+1], f - i)`. The table carries one guard entry past
/// `max` so the edge lerp stays in bounds.
pub struct InterpolatingLut {
    values: Vec<f32>,
    max_index: f32,
}

const LUT_MAX: usize = 1023;

impl InterpolatingLut {
    pub fn new<F: Fn(f32) -> f32>(max_index: usize, curve: F) -> Self {
        let mut values: Vec<f32> = (0..=max_index).map(|i| curve(i as f32 / max_index as f32)).collect();
        values.push(values[max_index]);

        Self {
            values,
            max_index: max_index as f32,
        }
    }

    /// Shared companded → linear instance.
    pub fn to_linear() -> &'static InterpolatingLut {
        static LUT: OnceLock<InterpolatingLut> = OnceLock::new();
        LUT.get_or_init(|| InterpolatingLut::new(LUT_MAX, srgb_to_linear))
    }

    /// Shared linear → companded instance.
    pub fn to_companded() -> &'static InterpolatingLut {
        static LUT: OnceLock<InterpolatingLut> = OnceLock::new();
        LUT.get_or_init(|| InterpolatingLut::new(LUT_MAX, linear_to_srgb))
    }

    #[inline]
    pub fn lookup(&self, x: f32) -> f32 {
        let f = (x * self.max_index).clamp(0.0, self.max_index);
        let i = f as usize;
        let frac = f - i as f32;
        let low = self.values[i];
        low + (self.values[i + 1] - low) * frac
    }

    /// Converts every sample of `line` in place.
    pub fn convert_float(&self, line: &mut [f32]) {
        for v in line.iter_mut() {
            *v = self.lookup(*v);
        }
    }

    /// Converts premultiplied quads: divides by alpha before the lookup and
    /// multiplies after, leaving alpha untouched.
    pub fn convert_float_3a(&self, line: &mut [f32]) {
        for quad in line.chunks_exact_mut(4) {
            let alpha = quad[3];
            if alpha <= 0.0 {
                continue;
            }
            let inverse = 1.0 / alpha;
            quad[0] = self.lookup(quad[0] * inverse) * alpha;
            quad[1] = self.lookup(quad[1] * inverse) * alpha;
            quad[2] = self.lookup(quad[2] * inverse) * alpha;
        }
    }
}

/// Linearizes one straight u8 color sample through the 8-bit table.
#[inline]
pub fn linearize_8(v: u8) -> f32 {
    linear_table_8()[v as usize]
}

/// Narrows a linear f32 sample to companded u8.
#[inline]
pub fn compand_to_u8(v: f32) -> u8 {
    (linear_to_srgb(v.clamp(0.0, 1.0)) * 255.0 + 0.5) as u8
}

/// Linear UQ15 → companded u8 through the fixed-point table.
#[inline]
pub fn compand_q15_to_u8(v: u16) -> u8 {
    srgb_q15_table()[(v.min(UQ15_ONE)) as usize]
}

/// Companded u8 → linear UQ15.
#[inline]
pub fn linearize_8_q15(v: u8) -> u16 {
    linear_q15_table_8()[v as usize]
}

/// Widens a straight u8 quad line into premultiplied linear UQ15.
pub fn widen_u8_to_q15_3a_linear(src: &[u8], dst: &mut [u16]) {
    for (s, d) in src.chunks_exact(4).zip(dst.chunks_exact_mut(4)) {
        let alpha = fix15(s[3]) as i32;
        d[0] = crate::convert::unfix15(linearize_8_q15(s[0]) as i32 * alpha) as u16;
        d[1] = crate::convert::unfix15(linearize_8_q15(s[1]) as i32 * alpha) as u16;
        d[2] = crate::convert::unfix15(linearize_8_q15(s[2]) as i32 * alpha) as u16;
        d[3] = alpha as u16;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn curve_round_trip() {
        for i in 0..=255u32 {
            let c = i as f32 / 255.0;
            let there_and_back = linear_to_srgb(srgb_to_linear(c));
            assert!((there_and_back - c).abs() < 1e-5);
        }
    }

    #[test]
    fn q15_tables_round_trip() {
        for v in 0..=255u8 {
            assert!(u8_round_trips(v), "{v}");
        }
    }

    #[test]
    fn interpolating_lut_tracks_curve() {
        let lut = InterpolatingLut::to_linear();
        for i in 0..=1000 {
            let x = i as f32 / 1000.0;
            assert!((lut.lookup(x) - srgb_to_linear(x)).abs() < 1e-4, "{x}");
        }
        // Out-of-range input clamps instead of indexing out of bounds.
        assert!((lut.lookup(2.0) - 1.0).abs() < 1e-4);
        assert_eq!(lut.lookup(-1.0), 0.0);
    }

    #[test]
    fn lut_3a_divides_by_alpha() {
        let lut = InterpolatingLut::to_linear();
        // A premultiplied half-intensity white: color/alpha = 1.0, which is
        // linear 1.0, re-multiplied back to alpha.
        let mut quad = [0.5f32, 0.5, 0.5, 0.5];
        lut.convert_float_3a(&mut quad);
        for c in &quad[..3] {
            assert!((c - 0.5).abs() < 1e-4);
        }
        assert_eq!(quad[3], 0.5);
    }
}
