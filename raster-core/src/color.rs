use std::{
    collections::HashMap,
    hash::{DefaultHasher, Hash, Hasher},
    sync::{Arc, Mutex, OnceLock},
};

use crate::{unsupported_error, Result};

/// Sample value range. Video range compresses luma to 16..=235 and chroma to
/// 16..=240.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[repr(u8)]
pub enum ColorRange {
    #[default]
    Full,
    Video,
}

pub const VIDEO_LUMA_OFFSET: u32 = 16;
pub const VIDEO_LUMA_SCALE: u32 = 219;
pub const VIDEO_CHROMA_SCALE: u32 = 224;

/// Chroma subsampling ratio of a planar frame.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ChromaSubsampling {
    #[default]
    Subsample444,
    Subsample440,
    Subsample422,
    Subsample420,
}

impl ChromaSubsampling {
    pub const fn ratio_x(&self) -> u32 {
        match self {
            ChromaSubsampling::Subsample444 | ChromaSubsampling::Subsample440 => 1,
            ChromaSubsampling::Subsample422 | ChromaSubsampling::Subsample420 => 2,
        }
    }

    pub const fn ratio_y(&self) -> u32 {
        match self {
            ChromaSubsampling::Subsample444 | ChromaSubsampling::Subsample422 => 1,
            ChromaSubsampling::Subsample440 | ChromaSubsampling::Subsample420 => 2,
        }
    }

    pub fn is_subsampled(&self) -> bool {
        self.ratio_x() > 1 || self.ratio_y() > 1
    }
}

/// Position of the subsampled chroma sample relative to the luma samples it
/// covers.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ChromaPosition {
    #[default]
    Center,
    Left,
    TopLeft,
    Top,
    BottomLeft,
    Bottom,
}

impl ChromaPosition {
    /// Half-pixel displacement of the chroma grid against the luma grid.
    pub fn offset_x(&self, subsampling: ChromaSubsampling) -> f32 {
        if subsampling.ratio_x() == 1 {
            return 0.0;
        }
        match self {
            ChromaPosition::Left | ChromaPosition::TopLeft | ChromaPosition::BottomLeft => 0.5,
            _ => 0.0,
        }
    }

    pub fn offset_y(&self, subsampling: ChromaSubsampling) -> f32 {
        if subsampling.ratio_y() == 1 {
            return 0.0;
        }
        match self {
            ChromaPosition::TopLeft | ChromaPosition::Top => 0.5,
            ChromaPosition::BottomLeft | ChromaPosition::Bottom => -0.5,
            _ => 0.0,
        }
    }
}

/// Y'CbCr ↔ R'G'B' matrix family. BT.601 is the compatibility default when a
/// frame declares nothing.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum YccMatrix {
    #[default]
    Bt601,
    Bt709,
    Bt2020,
}

impl YccMatrix {
    pub const fn kr(&self) -> f64 {
        match self {
            YccMatrix::Bt601 => 0.299,
            YccMatrix::Bt709 => 0.2126,
            YccMatrix::Bt2020 => 0.2627,
        }
    }

    pub const fn kb(&self) -> f64 {
        match self {
            YccMatrix::Bt601 => 0.114,
            YccMatrix::Bt709 => 0.0722,
            YccMatrix::Bt2020 => 0.0593,
        }
    }

    /// Forward matrix mapping `[R, G, B]` to `[Y, Cb, Cr]`, full range.
    pub fn forward(&self) -> Mat3 {
        let kr = self.kr();
        let kb = self.kb();
        let kg = 1.0 - kr - kb;
        let cb_scale = 0.5 / (1.0 - kb);
        let cr_scale = 0.5 / (1.0 - kr);

        Mat3([
            [kr, kg, kb],
            [-kr * cb_scale, -kg * cb_scale, 0.5],
            [0.5, -kg * cr_scale, -kb * cr_scale],
        ])
    }

    /// Coefficients of the inverted matrix used by the planar conversion:
    /// `R = Y + cr_r·Cr`, `G = Y + cb_g·Cb + cr_g·Cr`, `B = Y + cb_b·Cb`.
    /// For video range the chroma terms are pre-scaled by `255/224` and the
    /// luma term by `255/219` is applied separately by the caller.
    pub fn inverse_coefficients(&self, range: ColorRange) -> YccToRgb {
        let inverse = self.forward().invert();
        let chroma_scale = match range {
            ColorRange::Full => 1.0,
            ColorRange::Video => 255.0 / VIDEO_CHROMA_SCALE as f64,
        };

        YccToRgb {
            cr_r: (inverse.0[0][2] * chroma_scale) as f32,
            cb_g: (inverse.0[1][1] * chroma_scale) as f32,
            cr_g: (inverse.0[1][2] * chroma_scale) as f32,
            cb_b: (inverse.0[2][1] * chroma_scale) as f32,
        }
    }
}

/// Inverted-matrix coefficients for YCC → RGB.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct YccToRgb {
    pub cr_r: f32,
    pub cb_g: f32,
    pub cr_g: f32,
    pub cb_b: f32,
}

/// Row-major 3×3 matrix.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Mat3(pub [[f64; 3]; 3]);

impl Mat3 {
    pub const IDENTITY: Mat3 = Mat3([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]);

    pub fn invert(&self) -> Mat3 {
        let m = &self.0;
        let det = m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
            - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
            + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0]);

        let inv_det = 1.0 / det;
        let mut out = [[0.0; 3]; 3];
        out[0][0] = (m[1][1] * m[2][2] - m[1][2] * m[2][1]) * inv_det;
        out[0][1] = (m[0][2] * m[2][1] - m[0][1] * m[2][2]) * inv_det;
        out[0][2] = (m[0][1] * m[1][2] - m[0][2] * m[1][1]) * inv_det;
        out[1][0] = (m[1][2] * m[2][0] - m[1][0] * m[2][2]) * inv_det;
        out[1][1] = (m[0][0] * m[2][2] - m[0][2] * m[2][0]) * inv_det;
        out[1][2] = (m[0][2] * m[1][0] - m[0][0] * m[1][2]) * inv_det;
        out[2][0] = (m[1][0] * m[2][1] - m[1][1] * m[2][0]) * inv_det;
        out[2][1] = (m[0][1] * m[2][0] - m[0][0] * m[2][1]) * inv_det;
        out[2][2] = (m[0][0] * m[1][1] - m[0][1] * m[1][0]) * inv_det;

        Mat3(out)
    }

    pub fn as_f32(&self) -> [[f32; 3]; 3] {
        self.0.map(|row| row.map(|v| v as f32))
    }
}

/// Table-based color transform supplied by an external profile provider. The
/// engine treats it as an opaque per-line lookup over linear float pixels.
pub trait ColorLookup: Send + Sync {
    fn channels(&self) -> u8;
    fn lookup_line(&self, line: &mut [f32]);
}

/// Parsed color profile as the engine sees it: either a matrix over linear
/// RGB or an opaque lookup. ICC parsing itself happens outside the engine.
pub enum ProfileTransform {
    Identity,
    Matrix([[f32; 3]; 3]),
    Table(Arc<dyn ColorLookup>),
}

pub struct ColorProfile {
    pub transform: ProfileTransform,
    pub is_srgb: bool,
}

impl ColorProfile {
    pub fn srgb() -> Arc<ColorProfile> {
        static SRGB: OnceLock<Arc<ColorProfile>> = OnceLock::new();
        SRGB.get_or_init(|| {
            Arc::new(ColorProfile {
                transform: ProfileTransform::Identity,
                is_srgb: true,
            })
        })
        .clone()
    }
}

type ProfileCache = Mutex<HashMap<(usize, u64), Arc<ColorProfile>>>;

fn profile_cache() -> &'static ProfileCache {
    static CACHE: OnceLock<ProfileCache> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Returns the cached parse of `bytes`, invoking `parse` on first sight.
/// The cache is process-wide, append-only and keyed by the profile bytes.
pub fn cached_profile<F>(bytes: &[u8], parse: F) -> Result<Arc<ColorProfile>>
where
    F: FnOnce(&[u8]) -> Result<ColorProfile>,
{
    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    let key = (bytes.len(), hasher.finish());

    let mut cache = profile_cache().lock().map_err(|_| unsupported_error!("profile cache poisoned"))?;
    if let Some(profile) = cache.get(&key) {
        return Ok(profile.clone());
    }

    let profile = Arc::new(parse(bytes)?);
    cache.insert(key, profile.clone());
    Ok(profile)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bt601_inverse_matches_reference() {
        let coefficients = YccMatrix::Bt601.inverse_coefficients(ColorRange::Full);
        assert!((coefficients.cr_r - 1.402).abs() < 1e-4);
        assert!((coefficients.cb_g - -0.344136).abs() < 1e-4);
        assert!((coefficients.cr_g - -0.714136).abs() < 1e-4);
        assert!((coefficients.cb_b - 1.772).abs() < 1e-4);
    }

    #[test]
    fn matrix_inversion_round_trip() {
        let forward = YccMatrix::Bt709.forward();
        let round = forward.invert().invert();
        for (a, b) in forward.0.iter().flatten().zip(round.0.iter().flatten()) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn profile_cache_dedups() {
        let bytes = b"fake profile";
        let first = cached_profile(bytes, |_| {
            Ok(ColorProfile {
                transform: ProfileTransform::Identity,
                is_srgb: false,
            })
        })
        .unwrap();
        let second = cached_profile(bytes, |_| panic!("parsed twice")).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn chroma_siting_offsets() {
        let s420 = ChromaSubsampling::Subsample420;
        assert_eq!(ChromaPosition::TopLeft.offset_x(s420), 0.5);
        assert_eq!(ChromaPosition::TopLeft.offset_y(s420), 0.5);
        assert_eq!(ChromaPosition::Center.offset_x(s420), 0.0);
        assert_eq!(ChromaPosition::Left.offset_x(ChromaSubsampling::Subsample444), 0.0);
    }
}
