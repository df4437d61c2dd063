//! Processing settings and their resolution against a concrete source.

use std::sync::Arc;

use raster_core::{area::PixelArea, color::{ColorProfile, YccMatrix}, invalid_param_error, Result};
use raster_ops::{palette::DitherMode, resample::InterpolationKernel, sharpen::UnsharpMaskSettings};

/// External ICC parsing hook. The engine treats profiles as opaque bytes;
/// a parser turns them into the matrix or lookup the pipeline can apply.
pub trait ColorProfileParser: Send + Sync {
    fn parse(&self, bytes: &[u8]) -> Result<ColorProfile>;
}

/// How the source maps onto the requested target dimensions.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ResizeMode {
    /// Scale to fit within the target, preserving aspect ratio.
    #[default]
    Contain,
    /// Scale to cover the target, cropping the overflow.
    Cover,
    /// Scale both axes independently to the target.
    Stretch,
    /// No scaling; crop a target-sized window from the source.
    Crop,
}

/// Whether the box pre-scaler may run ahead of the resampler.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum HybridMode {
    Off,
    #[default]
    FavorQuality,
    FavorSpeed,
    Turbo,
}

impl HybridMode {
    pub fn allows_prescale(&self) -> bool {
        matches!(self, HybridMode::FavorSpeed | HybridMode::Turbo)
    }
}

/// Light domain used for scaling and blending.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum GammaMode {
    #[default]
    Linear,
    Companded,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum OrientationMode {
    /// Apply the frame's Exif orientation and emit normalized pixels.
    #[default]
    Normalize,
    /// Leave pixels in storage order and pass the tag through.
    Preserve,
}

/// Frames to process from an animated container.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FrameRange {
    pub start: u32,
    pub count: Option<u32>,
}

impl Default for FrameRange {
    fn default() -> Self {
        Self {
            start: 0,
            count: None,
        }
    }
}

#[derive(Clone, Default)]
pub struct ProcessImageSettings {
    /// Target width; 0 derives from height (or the crop when both are 0).
    pub width: u32,
    /// Target height; 0 derives from width.
    pub height: u32,
    /// Source crop in presentation coordinates. Defaults to the full frame.
    pub crop: Option<PixelArea>,
    pub resize_mode: ResizeMode,
    pub interpolation: InterpolationKernel,
    pub hybrid_mode: HybridMode,
    pub gamma_mode: GammaMode,
    pub orientation_mode: OrientationMode,
    /// Background for matting and padding, 8-bit sRGB BGRA.
    pub matte_color: Option<[u8; 4]>,
    pub sharpen: Option<UnsharpMaskSettings>,
    pub dither: DitherMode,
    pub frame_range: FrameRange,
    /// Overrides the matrix declared by (or defaulted for) planar frames.
    pub ycc_matrix: Option<YccMatrix>,
    /// Forces the float or fixed-point working path; `None` follows the
    /// platform's vector support.
    pub prefer_float: Option<bool>,
    /// Parses embedded ICC profiles into applicable transforms. Without a
    /// parser, embedded profiles pass through (or drop) untouched.
    pub profile_parser: Option<Arc<dyn ColorProfileParser>>,
}

/// Geometry resolved by [`fixup`]: everything downstream works from these.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ResolvedLayout {
    /// Source rectangle, presentation coordinates.
    pub crop: PixelArea,
    /// Scaled content size.
    pub inner_size: (u32, u32),
    /// Canvas size; equals `inner_size` unless padding extends it.
    pub outer_size: (u32, u32),
    /// Content position within the canvas.
    pub inner_rect: PixelArea,
    /// Power-of-two box pre-scale factor, 1 when disabled.
    pub hybrid_ratio: u32,
}

/// Resolves settings against the presentation dimensions of the source
/// (post-orientation).
pub fn fixup(settings: &ProcessImageSettings, source_width: u32, source_height: u32) -> Result<ResolvedLayout> {
    if source_width == 0 || source_height == 0 {
        return Err(invalid_param_error!(source_width));
    }

    let full = PixelArea::from_size(source_width, source_height);
    let mut crop = settings.crop.unwrap_or(full);
    if crop.is_empty() || !full.contains(&crop) {
        return Err(invalid_param_error!(crop));
    }

    // resolve target size, deriving missing axes from the crop aspect
    let (mut target_w, mut target_h) = (settings.width, settings.height);
    if target_w == 0 && target_h == 0 {
        target_w = crop.width;
        target_h = crop.height;
    } else if target_w == 0 {
        target_w = ((target_h as u64 * crop.width as u64 + crop.height as u64 / 2) / crop.height as u64).max(1) as u32;
    } else if target_h == 0 {
        target_h = ((target_w as u64 * crop.height as u64 + crop.width as u64 / 2) / crop.width as u64).max(1) as u32;
    }

    let inner_size;
    match settings.resize_mode {
        ResizeMode::Contain => {
            let scale_w = target_w as f64 / crop.width as f64;
            let scale_h = target_h as f64 / crop.height as f64;
            let scale = scale_w.min(scale_h);
            inner_size = (
                ((crop.width as f64 * scale).round() as u32).max(1).min(target_w),
                ((crop.height as f64 * scale).round() as u32).max(1).min(target_h),
            );
        }
        ResizeMode::Stretch => {
            inner_size = (target_w, target_h);
        }
        ResizeMode::Cover => {
            // shrink the crop to the target aspect, centered
            let crop_aspect = crop.width as f64 / crop.height as f64;
            let target_aspect = target_w as f64 / target_h as f64;
            if crop_aspect > target_aspect {
                let w = ((crop.height as f64 * target_aspect).round() as u32).clamp(1, crop.width);
                crop = PixelArea::new(crop.x + (crop.width - w) / 2, crop.y, w, crop.height);
            } else {
                let h = ((crop.width as f64 / target_aspect).round() as u32).clamp(1, crop.height);
                crop = PixelArea::new(crop.x, crop.y + (crop.height - h) / 2, crop.width, h);
            }
            inner_size = (target_w, target_h);
        }
        ResizeMode::Crop => {
            let w = target_w.min(crop.width);
            let h = target_h.min(crop.height);
            crop = PixelArea::new(crop.x + (crop.width - w) / 2, crop.y + (crop.height - h) / 2, w, h);
            inner_size = (w, h);
        }
    }

    // padding extends the canvas only when a matte color is available
    let pad = settings.matte_color.is_some()
        && matches!(settings.resize_mode, ResizeMode::Contain | ResizeMode::Crop);
    let outer_size = if pad {
        (target_w, target_h)
    } else {
        inner_size
    };
    let inner_rect = PixelArea::new(
        (outer_size.0 - inner_size.0) / 2,
        (outer_size.1 - inner_size.1) / 2,
        inner_size.0,
        inner_size.1,
    );

    let hybrid_ratio = if settings.hybrid_mode.allows_prescale() && !settings.interpolation.is_point_sampler() {
        let ratio = (crop.width / inner_size.0.max(1)).min(crop.height / inner_size.1.max(1));
        if ratio >= 2 {
            1u32 << (31 - ratio.leading_zeros())
        } else {
            1
        }
    } else {
        1
    };

    Ok(ResolvedLayout {
        crop,
        inner_size,
        outer_size,
        inner_rect,
        hybrid_ratio,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> ProcessImageSettings {
        ProcessImageSettings {
            width: 100,
            height: 100,
            ..Default::default()
        }
    }

    #[test]
    fn contain_letterboxes() {
        let layout = fixup(&base(), 200, 100).unwrap();
        assert_eq!(layout.inner_size, (100, 50));
        assert_eq!(layout.outer_size, (100, 50));

        let padded = fixup(
            &ProcessImageSettings {
                matte_color: Some([0, 0, 0, 255]),
                ..base()
            },
            200,
            100,
        )
        .unwrap();
        assert_eq!(padded.outer_size, (100, 100));
        assert_eq!(padded.inner_rect, PixelArea::new(0, 25, 100, 50));
    }

    #[test]
    fn cover_crops_to_aspect() {
        let layout = fixup(&base(), 200, 100).unwrap();
        assert_eq!(layout.crop, PixelArea::from_size(200, 100));

        let covered = fixup(
            &ProcessImageSettings {
                resize_mode: ResizeMode::Cover,
                ..base()
            },
            200,
            100,
        )
        .unwrap();
        assert_eq!(covered.inner_size, (100, 100));
        assert_eq!(covered.crop, PixelArea::new(50, 0, 100, 100));
    }

    #[test]
    fn derived_axis_keeps_aspect() {
        let settings = ProcessImageSettings {
            width: 50,
            height: 0,
            ..Default::default()
        };
        let layout = fixup(&settings, 200, 100).unwrap();
        assert_eq!(layout.inner_size, (50, 25));
    }

    #[test]
    fn hybrid_ratio_power_of_two() {
        let settings = ProcessImageSettings {
            width: 100,
            height: 100,
            hybrid_mode: HybridMode::Turbo,
            ..Default::default()
        };
        // 1000/100 = 10x -> floor to 8
        let layout = fixup(&settings, 1000, 1000).unwrap();
        assert_eq!(layout.hybrid_ratio, 8);

        // point samplers disable the prescaler
        let nearest = ProcessImageSettings {
            interpolation: InterpolationKernel::NearestNeighbor,
            ..settings
        };
        assert_eq!(fixup(&nearest, 1000, 1000).unwrap().hybrid_ratio, 1);

        // ratios below 2 never prescale
        let slight = ProcessImageSettings {
            width: 600,
            height: 600,
            hybrid_mode: HybridMode::Turbo,
            ..Default::default()
        };
        assert_eq!(fixup(&slight, 1000, 1000).unwrap().hybrid_ratio, 1);
    }

    #[test]
    fn crop_mode_windows_without_scaling() {
        let settings = ProcessImageSettings {
            width: 50,
            height: 40,
            resize_mode: ResizeMode::Crop,
            ..Default::default()
        };
        let layout = fixup(&settings, 200, 100).unwrap();
        assert_eq!(layout.inner_size, (50, 40));
        assert_eq!(layout.crop, PixelArea::new(75, 30, 50, 40));
        assert_eq!(layout.hybrid_ratio, 1);
    }

    #[test]
    fn invalid_crop_rejected() {
        let settings = ProcessImageSettings {
            crop: Some(PixelArea::new(150, 0, 100, 50)),
            ..base()
        };
        assert!(fixup(&settings, 200, 100).is_err());
    }
}
