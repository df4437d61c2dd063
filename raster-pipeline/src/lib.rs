//! Top-level image processing orchestration: decode, build the transform
//! chain, pull through the encoder, commit.

pub mod animation;
pub mod builder;
pub mod context;
pub mod settings;

use log::debug;
use raster_core::{
    area::Orientation,
    color::cached_profile,
    corrupt_error,
    error::Error,
    pixel::PixelFormat,
    source::{MemoryPixelSource, PixelSource},
    Result,
};
use raster_codec::{
    container::{FramePixels, ImageContainer},
    encoder::{AnimatedImageEncoder, ImageEncoder},
    metadata::{AnimationFrame, FrameBlend, FrameDisposal, FrameMetadata},
};
use raster_ops::{ConversionSource, InvertSource, OctreeQuantizer, PaletteSource};

use crate::context::{PipelineContext, PipelinePixels};
pub use crate::settings::{
    fixup, ColorProfileParser, FrameRange, GammaMode, HybridMode, OrientationMode, ProcessImageSettings, ResizeMode,
};

/// Processes one frame of `container` through `encoder`.
pub fn process_image(
    container: &mut dyn ImageContainer,
    settings: &ProcessImageSettings,
    encoder: &mut dyn ImageEncoder,
) -> Result<()> {
    if container.frame_count() == 0 {
        return Err(corrupt_error!("container has no frames"));
    }

    let index = settings.frame_range.start.min(container.frame_count() - 1);
    let mut ctx = create_context(container, settings, &*encoder, index, false)?;
    builder::build(&mut ctx, &*encoder)?;
    write_still_frame(&mut ctx, settings, encoder)?;
    encoder.commit()
}

/// Processes the selected frame range of an animated container.
pub fn process_animation(
    container: &mut dyn ImageContainer,
    settings: &ProcessImageSettings,
    encoder: &mut dyn AnimatedImageEncoder,
) -> Result<()> {
    let anim = container.animation().ok_or(Error::Invalid("container is not animated".into()))?;
    let frame_count = container.frame_count();
    if frame_count == 0 {
        return Err(corrupt_error!("container has no frames"));
    }

    let start = settings.frame_range.start.min(frame_count - 1);
    let end = settings.frame_range.count.map(|c| (start + c).min(frame_count)).unwrap_or(frame_count);

    encoder.write_animation_metadata(&anim)?;
    let mut screen = animation::AnimationPipelineContext::new(&anim)?;

    // skipped leading frames replay into the screen buffer when any of
    // them persists
    let must_replay = (0..start)
        .any(|i| container.animation_frame(i).map(|f| f.disposal == FrameDisposal::Preserve).unwrap_or(false));
    if must_replay {
        debug!("animation: replaying {start} skipped frames");
        for i in 0..start {
            composite_frame(container, &mut screen, i)?;
        }
    }

    let (screen_w, screen_h) = screen.screen_size();
    let layout = settings::fixup(settings, screen_w, screen_h)?;

    for i in start..end {
        let frame_meta = composite_frame(container, &mut screen, i)?;

        let mut ctx = PipelineContext::new(settings.clone(), layout);
        ctx.animated = true;
        ctx.pixels = Some(PipelinePixels::Interleaved(Box::new(screen.screen_source()?)));
        builder::build(&mut ctx, &*encoder)?;

        let mut head = ctx.take_pixels()?.into_interleaved()?;
        let out_meta = AnimationFrame {
            offset_left: 0,
            offset_top: 0,
            duration: frame_meta.duration,
            has_alpha: head.format().has_alpha(),
            blend: FrameBlend::Source,
            disposal: FrameDisposal::None,
        };
        encoder.write_animated_frame(head.as_mut(), &ctx.metadata, &out_meta)?;
        builder::log_profile(head.as_ref());
    }

    encoder.commit()
}

/// Composites frame `index` onto the animation screen, returning its
/// animation metadata.
fn composite_frame(
    container: &mut dyn ImageContainer,
    screen: &mut animation::AnimationPipelineContext,
    index: u32,
) -> Result<AnimationFrame> {
    let meta = container.animation_frame(index).unwrap_or_default();
    let mut frame = container.frame(index)?;

    let mut source: Box<dyn PixelSource> = match frame.take_pixels()? {
        FramePixels::Interleaved(source) => source,
        FramePixels::Indexed {
            source,
            palette,
        } => Box::new(PaletteSource::new(source, palette)?),
        FramePixels::Planar(_) => {
            return Err(Error::Unsupported("planar animation frames".into()));
        }
    };

    if source.format() != PixelFormat::Bgra32 {
        source = Box::new(ConversionSource::new(source, PixelFormat::Bgra32)?);
    }

    screen.advance(source.as_mut(), &meta)?;
    Ok(meta)
}

fn try_native_scale(container: &mut dyn ImageContainer, settings: &ProcessImageSettings) -> u32 {
    let Some((width, height)) = container.dimensions() else {
        return 1;
    };
    let Ok(layout) = settings::fixup(settings, width, height) else {
        return 1;
    };

    if layout.hybrid_ratio >= 2 {
        if let Some((scaled_w, _)) = container.set_decode_scale(layout.hybrid_ratio) {
            let applied = (width / scaled_w.max(1)).max(1);
            debug!("pipeline: decoder prescaled by {applied}");
            return applied;
        }
    }
    1
}

fn create_context<E: ImageEncoder + ?Sized>(
    container: &mut dyn ImageContainer,
    settings: &ProcessImageSettings,
    encoder: &E,
    index: u32,
    animated: bool,
) -> Result<PipelineContext> {
    // step 1: ask the decoder for a pre-downscaled frame when eligible
    let native_scale = if !animated && settings.crop.is_none() {
        try_native_scale(container, settings)
    } else {
        1
    };

    let mut frame = container.frame(index)?;
    let frame_orientation = frame.orientation();
    let orientation = match settings.orientation_mode {
        OrientationMode::Normalize => frame_orientation,
        OrientationMode::Preserve => Orientation::Normal,
    };
    let icc = frame.icc_profile().map(<[u8]>::to_vec);
    let exif = frame.exif().map(<[u8]>::to_vec);
    let ycc = frame.ycc_description();

    let pixels = match frame.take_pixels()? {
        FramePixels::Interleaved(source) => PipelinePixels::Interleaved(source),
        FramePixels::Indexed {
            source,
            palette,
        } => PipelinePixels::Interleaved(Box::new(PaletteSource::new(source, palette)?)),
        FramePixels::Planar(planes) => PipelinePixels::Planar(planes),
    };

    let (mut pres_w, mut pres_h) = (pixels.width(), pixels.height());
    if orientation.swaps_dimensions() {
        std::mem::swap(&mut pres_w, &mut pres_h);
    }
    let layout = settings::fixup(settings, pres_w, pres_h)?;

    // some CMYK decoders hand back inverted ink values when the decode
    // width differs from the frame width; only trust the flagged ones
    let pixels = match pixels {
        PipelinePixels::Interleaved(source)
            if source.format() == PixelFormat::Cmyk32
                && container.known_buggy_cmyk()
                && layout.crop.width != source.width() =>
        {
            PipelinePixels::Interleaved(Box::new(InvertSource::new(source)?))
        }
        other => other,
    };

    let mut ctx = PipelineContext::new(settings.clone(), layout);
    ctx.orientation = orientation;
    ctx.ycc = ycc;
    ctx.animated = animated;
    ctx.native_scale = native_scale;
    ctx.pixels = Some(pixels);
    ctx.metadata = FrameMetadata {
        icc_profile: None,
        exif,
        orientation: match settings.orientation_mode {
            OrientationMode::Normalize => Orientation::Normal,
            OrientationMode::Preserve => frame_orientation,
        },
    };

    // step 3: color-profile read. An encoder that embeds profiles gets the
    // bytes untouched; otherwise fall back to converting to sRGB.
    if let Some(bytes) = icc {
        if encoder.supports_color_profile() {
            ctx.metadata.icc_profile = Some(bytes);
        } else if let Some(parser) = &settings.profile_parser {
            ctx.source_profile = cached_profile(&bytes, |b| parser.parse(b))?;
        }
    }

    Ok(ctx)
}

fn write_still_frame(
    ctx: &mut PipelineContext,
    settings: &ProcessImageSettings,
    encoder: &mut dyn ImageEncoder,
) -> Result<()> {
    let mut head = ctx.take_pixels()?.into_interleaved()?;
    let area = head.area();

    if encoder.prefers_indexed() {
        if head.format() != PixelFormat::Bgra32 {
            head = Box::new(ConversionSource::new(head, PixelFormat::Bgra32)?);
        }
        let quantized = OctreeQuantizer::quantize(head.as_mut(), settings.dither)?;
        let mut indexed =
            MemoryPixelSource::new(PixelFormat::Indexed8, quantized.width, quantized.height, quantized.indices)?;
        encoder.write_indexed_frame(&mut indexed, &quantized.palette, &ctx.metadata)?;
    } else {
        encoder.write_frame(head.as_mut(), &ctx.metadata, area)?;
    }

    builder::log_profile(head.as_ref());
    Ok(())
}
