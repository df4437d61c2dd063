//! Pipeline assembly.
//!
//! Transforms are appended in a fixed order; every step is a no-op when the
//! settings and source make it unnecessary. Planar chains keep their planes
//! separate until the merge, so the steps between crop and merge run per
//! plane.

use cfg_if::cfg_if;
use log::debug;
use raster_core::{
    area::PixelArea,
    color::ProfileTransform,
    error::Error,
    pixel::{PixelFormat, PixelNumeric, ValueEncoding},
    source::PixelSource,
    Result,
};
use raster_codec::encoder::ImageEncoder;
use raster_ops::{
    ColorTransformSource, ConversionSource, ConvolutionSource, CropSource, HybridScaleSource, MatteSource,
    OrientSource, PadSource, PlanarConversionSource, UnsharpMaskSource,
};

use crate::{
    context::{PipelineContext, PipelinePixels},
    settings::GammaMode,
};

cfg_if! {
    if #[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))] {
        const VECTOR_FLOAT_DEFAULT: bool = true;
    } else {
        const VECTOR_FLOAT_DEFAULT: bool = false;
    }
}

/// Assembles the transform chain for the current frame, leaving the final
/// head in `ctx.pixels`.
pub fn build<E: ImageEncoder + ?Sized>(ctx: &mut PipelineContext, encoder: &E) -> Result<()> {
    apply_orientation(ctx)?;
    apply_crop(ctx)?;
    normalize_format(ctx)?;
    apply_hybrid(ctx)?;

    let plan = WorkingPlan::resolve(ctx);
    debug!(
        "pipeline: working linear={} float={} resample={}",
        plan.linear, plan.float, plan.needs_resample
    );

    widen_to_working(ctx, &plan)?;
    resample(ctx, &plan)?;

    if matches!(ctx.pixels, Some(PipelinePixels::Planar(_))) {
        sharpen_luma(ctx)?;
        merge_planar(ctx)?;
        color_transform(ctx)?;
    } else {
        color_transform(ctx)?;
        sharpen_luma(ctx)?;
    }

    apply_matte(ctx)?;
    narrow_to_external(ctx)?;
    apply_pad(ctx)?;
    negotiate_encoder_format(ctx, encoder)?;

    Ok(())
}

struct WorkingPlan {
    linear: bool,
    float: bool,
    needs_resample: bool,
    needs_working: bool,
}

impl WorkingPlan {
    fn resolve(ctx: &PipelineContext) -> WorkingPlan {
        let pixels = ctx.pixels.as_ref().expect("pipeline source set");
        let (inner_w, inner_h) = ctx.layout.inner_size;

        let needs_resample = match pixels {
            PipelinePixels::Interleaved(source) => source.width() != inner_w || source.height() != inner_h,
            // subsampled chroma always resamples up to the luma grid
            PipelinePixels::Planar(planes) => {
                planes.y.width() != inner_w
                    || planes.y.height() != inner_h
                    || planes.cb.width() != inner_w
                    || planes.cb.height() != inner_h
            }
        };

        let format = match pixels {
            PipelinePixels::Interleaved(source) => source.format(),
            PipelinePixels::Planar(planes) => planes.y.format(),
        };

        let linear = ctx.settings.gamma_mode == GammaMode::Linear && format.encoding() == ValueEncoding::Companded;
        let has_profile_transform = !matches!(ctx.source_profile.transform, ProfileTransform::Identity);
        // profile transforms only have a float implementation
        let float = ctx.settings.prefer_float.unwrap_or(VECTOR_FLOAT_DEFAULT) || has_profile_transform;
        let needs_working = needs_resample
            || ctx.settings.sharpen.map(|s| s.is_enabled()).unwrap_or(false)
            || (ctx.settings.matte_color.is_some() && format.has_alpha())
            || has_profile_transform;

        WorkingPlan {
            linear: linear && needs_working,
            float,
            needs_resample,
            needs_working,
        }
    }
}

fn apply_orientation(ctx: &mut PipelineContext) -> Result<()> {
    let orientation = ctx.orientation;
    if orientation == raster_core::area::Orientation::Normal {
        return Ok(());
    }

    match ctx.take_pixels()? {
        PipelinePixels::Interleaved(source) => {
            ctx.pixels = Some(PipelinePixels::Interleaved(Box::new(OrientSource::new(source, orientation))));
        }
        PipelinePixels::Planar(mut planes) => {
            planes.y = Box::new(OrientSource::new(planes.y, orientation));
            planes.cb = Box::new(OrientSource::new(planes.cb, orientation));
            planes.cr = Box::new(OrientSource::new(planes.cr, orientation));
            ctx.pixels = Some(PipelinePixels::Planar(planes));
        }
    }

    Ok(())
}

fn apply_crop(ctx: &mut PipelineContext) -> Result<()> {
    let crop = ctx.layout.crop;

    match ctx.take_pixels()? {
        PipelinePixels::Interleaved(source) => {
            let full = source.area();
            if crop == full {
                ctx.pixels = Some(PipelinePixels::Interleaved(source));
            } else {
                ctx.pixels = Some(PipelinePixels::Interleaved(Box::new(CropSource::new(source, crop)?)));
            }
        }
        PipelinePixels::Planar(mut planes) => {
            if crop == planes.y.area() {
                ctx.pixels = Some(PipelinePixels::Planar(planes));
                return Ok(());
            }

            let rx = planes.subsampling.ratio_x();
            let ry = planes.subsampling.ratio_y();

            // luma is cropped exactly; chroma snaps down to the grid and
            // records the half-pixel compensation for the resample step
            let chroma = PixelArea::new(
                crop.x / rx,
                crop.y / ry,
                raster_core::div_ceil(crop.x % rx + crop.width, rx),
                raster_core::div_ceil(crop.y % ry + crop.height, ry),
            );
            planes.crop_offset_x += (crop.x % rx) as f32 / rx as f32;
            planes.crop_offset_y += (crop.y % ry) as f32 / ry as f32;

            planes.y = Box::new(CropSource::new(planes.y, crop)?);
            planes.cb = Box::new(CropSource::new(planes.cb, chroma)?);
            planes.cr = Box::new(CropSource::new(planes.cr, chroma)?);
            ctx.pixels = Some(PipelinePixels::Planar(planes));
        }
    }

    Ok(())
}

/// Normalizes interleaved input to one of Grey8 / Bgr24 / Bgra32 / Pbgra32.
fn normalize_format(ctx: &mut PipelineContext) -> Result<()> {
    let pixels = ctx.pixels.as_ref().expect("pipeline source set");
    let format = match pixels {
        PipelinePixels::Planar(_) => return Ok(()),
        PipelinePixels::Interleaved(source) => source.format(),
    };

    // float and fixed-point inputs are already richer than the normalized
    // set; they narrow at the end of the chain instead
    if format.numeric() != PixelNumeric::UnsignedInt {
        return Ok(());
    }

    let target = match format {
        PixelFormat::Grey8 | PixelFormat::Bgr24 | PixelFormat::Bgra32 | PixelFormat::Pbgra32 => return Ok(()),
        PixelFormat::Y8 => PixelFormat::Grey8,
        PixelFormat::Rgb24 | PixelFormat::Bgrx32 => PixelFormat::Bgr24,
        PixelFormat::Rgba32 => PixelFormat::Bgra32,
        PixelFormat::Cmyk32 => {
            return Err(Error::Unsupported("CMYK requires a color transform provider".into()));
        }
        other => return Err(Error::Unsupported(format!("pipeline input {other}").into())),
    };

    ctx.wrap(|source| Ok(Box::new(ConversionSource::new(source, target)?)))
}

fn apply_hybrid(ctx: &mut PipelineContext) -> Result<()> {
    let ratio = ctx.layout.hybrid_ratio / ctx.native_scale.max(1);
    if ratio < 2 {
        return Ok(());
    }

    match ctx.take_pixels()? {
        PipelinePixels::Interleaved(source) => {
            if !HybridScaleSource::supports(source.format()) {
                ctx.pixels = Some(PipelinePixels::Interleaved(source));
                return Ok(());
            }
            ctx.pixels = Some(PipelinePixels::Interleaved(Box::new(HybridScaleSource::new(source, ratio)?)));
        }
        PipelinePixels::Planar(mut planes) => {
            if HybridScaleSource::supports(planes.y.format()) {
                planes.y = Box::new(HybridScaleSource::new(planes.y, ratio)?);
                planes.cb = Box::new(HybridScaleSource::new(planes.cb, ratio)?);
                planes.cr = Box::new(HybridScaleSource::new(planes.cr, ratio)?);
            }
            ctx.pixels = Some(PipelinePixels::Planar(planes));
        }
    }

    Ok(())
}

fn widen_to_working(ctx: &mut PipelineContext, plan: &WorkingPlan) -> Result<()> {
    if !plan.needs_working {
        return Ok(());
    }

    match ctx.take_pixels()? {
        PipelinePixels::Interleaved(source) => {
            let target = source.format().working_equivalent(plan.linear, plan.float);
            if target == source.format() {
                ctx.pixels = Some(PipelinePixels::Interleaved(source));
            } else {
                ctx.pixels = Some(PipelinePixels::Interleaved(Box::new(ConversionSource::new(source, target)?)));
            }
        }
        PipelinePixels::Planar(mut planes) => {
            // the YCC matrix applies to companded values, so planes widen
            // without linearizing; gamma-aware work happens after the merge
            if plan.float {
                let y_target = planes.y.format().working_equivalent(false, true);
                let cb_target = planes.cb.format().working_equivalent(false, true);
                let cr_target = planes.cr.format().working_equivalent(false, true);
                planes.y = Box::new(ConversionSource::new(planes.y, y_target)?);
                planes.cb = Box::new(ConversionSource::new(planes.cb, cb_target)?);
                planes.cr = Box::new(ConversionSource::new(planes.cr, cr_target)?);
            }
            ctx.pixels = Some(PipelinePixels::Planar(planes));
        }
    }

    Ok(())
}

fn resample(ctx: &mut PipelineContext, plan: &WorkingPlan) -> Result<()> {
    if !plan.needs_resample {
        return Ok(());
    }

    let (inner_w, inner_h) = ctx.layout.inner_size;
    let kernel = ctx.settings.interpolation;

    match ctx.take_pixels()? {
        PipelinePixels::Interleaved(source) => {
            if source.width() == inner_w && source.height() == inner_h {
                ctx.pixels = Some(PipelinePixels::Interleaved(source));
            } else {
                ctx.pixels = Some(PipelinePixels::Interleaved(Box::new(ConvolutionSource::new(
                    source, inner_w, inner_h, kernel, 0.0, 0.0,
                )?)));
            }
        }
        PipelinePixels::Planar(mut planes) => {
            if planes.y.width() != inner_w || planes.y.height() != inner_h {
                planes.y = Box::new(ConvolutionSource::new(planes.y, inner_w, inner_h, kernel, 0.0, 0.0)?);
            }

            // chroma upsamples to the luma grid; siting and odd-crop
            // compensation land here as constant sample offsets
            let rx = planes.subsampling.ratio_x() as f32;
            let ry = planes.subsampling.ratio_y() as f32;
            let offset_x = (planes.crop_offset_x - planes.chroma_offset_x / rx) as f64;
            let offset_y = (planes.crop_offset_y - planes.chroma_offset_y / ry) as f64;

            if planes.cb.width() != inner_w || planes.cb.height() != inner_h || offset_x != 0.0 || offset_y != 0.0 {
                planes.cb = Box::new(ConvolutionSource::new(planes.cb, inner_w, inner_h, kernel, offset_x, offset_y)?);
                planes.cr = Box::new(ConvolutionSource::new(planes.cr, inner_w, inner_h, kernel, offset_x, offset_y)?);
            }

            planes.crop_offset_x = 0.0;
            planes.crop_offset_y = 0.0;
            planes.chroma_offset_x = 0.0;
            planes.chroma_offset_y = 0.0;
            planes.subsampling = raster_core::color::ChromaSubsampling::Subsample444;
            ctx.pixels = Some(PipelinePixels::Planar(planes));
        }
    }

    Ok(())
}

fn sharpen_luma(ctx: &mut PipelineContext) -> Result<()> {
    let Some(settings) = ctx.settings.sharpen else {
        return Ok(());
    };
    if !settings.is_enabled() {
        return Ok(());
    }

    match ctx.take_pixels()? {
        PipelinePixels::Interleaved(source) => {
            ctx.pixels = Some(PipelinePixels::Interleaved(Box::new(UnsharpMaskSource::new(source, settings)?)));
        }
        PipelinePixels::Planar(mut planes) => {
            planes.y = Box::new(UnsharpMaskSource::new(planes.y, settings)?);
            ctx.pixels = Some(PipelinePixels::Planar(planes));
        }
    }

    Ok(())
}

fn merge_planar(ctx: &mut PipelineContext) -> Result<()> {
    let PipelinePixels::Planar(planes) = ctx.take_pixels()? else {
        return Err(Error::Invalid("merge of interleaved pipeline".into()));
    };

    let matrix = ctx.settings.ycc_matrix.or(ctx.ycc.map(|d| d.matrix)).unwrap_or_default();
    let merged = PlanarConversionSource::new(planes, matrix)?;
    ctx.pixels = Some(PipelinePixels::Interleaved(Box::new(merged)));
    Ok(())
}

fn color_transform(ctx: &mut PipelineContext) -> Result<()> {
    if matches!(ctx.source_profile.transform, ProfileTransform::Identity) {
        return Ok(());
    }

    // matrix math runs on linear light; linearize companded float first
    let format = match ctx.pixels.as_ref().expect("pipeline source set") {
        PipelinePixels::Interleaved(source) => source.format(),
        PipelinePixels::Planar(_) => return Err(Error::Invalid("color transform of planar pipeline".into())),
    };
    if matches!(ctx.source_profile.transform, ProfileTransform::Matrix(_))
        && format.numeric() == PixelNumeric::Float
        && !format.is_linear()
    {
        let linear = format.working_equivalent(true, true);
        if linear != format {
            ctx.wrap(|source| Ok(Box::new(ConversionSource::new(source, linear)?)))?;
        }
    }

    match &ctx.source_profile.transform {
        ProfileTransform::Identity => Ok(()),
        ProfileTransform::Matrix(matrix) => {
            let matrix = *matrix;
            ctx.wrap(|source| Ok(Box::new(ColorTransformSource::with_matrix(source, matrix)?)))
        }
        ProfileTransform::Table(table) => {
            let table = table.clone();
            ctx.wrap(|source| Ok(Box::new(ColorTransformSource::with_table(source, table)?)))
        }
    }
}

fn apply_matte(ctx: &mut PipelineContext) -> Result<()> {
    let Some(color) = ctx.settings.matte_color else {
        return Ok(());
    };

    let has_alpha = match ctx.pixels.as_ref().expect("pipeline source set") {
        PipelinePixels::Interleaved(source) => source.format().has_alpha(),
        PipelinePixels::Planar(_) => false,
    };
    if !has_alpha {
        return Ok(());
    }

    ctx.wrap(|source| Ok(Box::new(MatteSource::new(source, color)?)))?;
    if color[3] == 255 {
        ctx.matted_opaque = true;
    }
    Ok(())
}

fn narrow_to_external(ctx: &mut PipelineContext) -> Result<()> {
    let format = match ctx.pixels.as_ref().expect("pipeline source set") {
        PipelinePixels::Interleaved(source) => source.format(),
        PipelinePixels::Planar(_) => return Err(Error::Invalid("pipeline still planar".into())),
    };

    let target = format.external_equivalent();
    if target != format {
        ctx.wrap(|source| Ok(Box::new(ConversionSource::new(source, target)?)))?;
    }

    // opaque matte on a still image leaves no useful alpha behind
    let drop_alpha = ctx.matted_opaque && !ctx.animated;
    if drop_alpha && target == PixelFormat::Bgra32 {
        ctx.wrap(|source| Ok(Box::new(ConversionSource::new(source, PixelFormat::Bgr24)?)))?;
    }

    Ok(())
}

fn apply_pad(ctx: &mut PipelineContext) -> Result<()> {
    let (outer_w, outer_h) = ctx.layout.outer_size;
    let inner_rect = ctx.layout.inner_rect;
    if (outer_w, outer_h) == (inner_rect.width, inner_rect.height) {
        return Ok(());
    }

    let color = ctx.settings.matte_color.unwrap_or([0, 0, 0, 255]);
    ctx.wrap(|source| {
        let fill = pad_fill(source.format(), color)?;
        Ok(Box::new(PadSource::new(source, outer_w, outer_h, inner_rect, &fill)?))
    })
}

fn pad_fill(format: PixelFormat, color: [u8; 4]) -> Result<Vec<u8>> {
    Ok(match format {
        PixelFormat::Grey8 => {
            let luma = 0.114 * color[0] as f32 + 0.587 * color[1] as f32 + 0.299 * color[2] as f32;
            vec![(luma + 0.5) as u8]
        }
        PixelFormat::Bgr24 => color[..3].to_vec(),
        PixelFormat::Bgra32 | PixelFormat::Pbgra32 => color.to_vec(),
        other => return Err(Error::Unsupported(format!("pad of {other}").into())),
    })
}

fn negotiate_encoder_format<E: ImageEncoder + ?Sized>(ctx: &mut PipelineContext, encoder: &E) -> Result<()> {
    let format = match ctx.pixels.as_ref().expect("pipeline source set") {
        PipelinePixels::Interleaved(source) => source.format(),
        PipelinePixels::Planar(_) => return Err(Error::Invalid("pipeline still planar".into())),
    };

    if encoder.supports_pixel_format(format) {
        return Ok(());
    }

    let closest = encoder.closest_pixel_format(format);
    debug!("pipeline: encoder forcing {format} -> {closest}");
    if !ConversionSource::supported(format, closest) {
        return Err(Error::Unsupported(format!("encoder format {closest}").into()));
    }

    ctx.wrap(|source| Ok(Box::new(ConversionSource::new(source, closest)?)))
}

/// Logs per-source self-times for the finished chain.
pub fn log_profile(head: &dyn PixelSource) {
    if log::log_enabled!(log::Level::Debug) {
        let mut stats = Vec::new();
        raster_core::source::collect_profiles(head, &mut stats);
        for profiler in stats {
            debug!("pipeline: {profiler}");
        }
    }
}
