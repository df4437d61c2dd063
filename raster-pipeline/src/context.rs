use std::sync::Arc;

use raster_core::{
    area::Orientation,
    color::ColorProfile,
    error::Error,
    source::{PixelSource, PlanarPixelSource},
    Result,
};
use raster_codec::{container::YccDescription, metadata::FrameMetadata};

use crate::settings::{ProcessImageSettings, ResolvedLayout};

/// Current head of the pipeline: a single interleaved chain, or one chain
/// per plane while the pipeline is still planar.
pub enum PipelinePixels {
    Interleaved(Box<dyn PixelSource>),
    Planar(PlanarPixelSource),
}

impl PipelinePixels {
    pub fn width(&self) -> u32 {
        match self {
            PipelinePixels::Interleaved(source) => source.width(),
            PipelinePixels::Planar(planes) => planes.y.width(),
        }
    }

    pub fn height(&self) -> u32 {
        match self {
            PipelinePixels::Interleaved(source) => source.height(),
            PipelinePixels::Planar(planes) => planes.y.height(),
        }
    }

    pub fn into_interleaved(self) -> Result<Box<dyn PixelSource>> {
        match self {
            PipelinePixels::Interleaved(source) => Ok(source),
            PipelinePixels::Planar(_) => Err(Error::Invalid("pipeline still planar".into())),
        }
    }
}

/// Per-image pipeline state. Created for each processed image, finalized by
/// the builder once, dropped as a unit; transforms release in reverse
/// construction order through their ownership chain.
pub struct PipelineContext {
    pub settings: ProcessImageSettings,
    pub layout: ResolvedLayout,
    pub orientation: Orientation,
    pub pixels: Option<PipelinePixels>,
    pub ycc: Option<YccDescription>,
    pub metadata: FrameMetadata,
    pub source_profile: Arc<ColorProfile>,
    pub dest_profile: Arc<ColorProfile>,
    /// Whether this frame belongs to an animation; animated output keeps
    /// its alpha channel.
    pub animated: bool,
    /// Downscale factor already applied by the decoder (step 1); the hybrid
    /// pre-scaler covers the remainder.
    pub native_scale: u32,
    /// Set when an opaque matte ran, allowing the alpha channel to drop.
    pub matted_opaque: bool,
}

impl PipelineContext {
    pub fn new(settings: ProcessImageSettings, layout: ResolvedLayout) -> Self {
        Self {
            settings,
            layout,
            orientation: Orientation::Normal,
            pixels: None,
            ycc: None,
            metadata: FrameMetadata::default(),
            source_profile: ColorProfile::srgb(),
            dest_profile: ColorProfile::srgb(),
            animated: false,
            native_scale: 1,
            matted_opaque: false,
        }
    }

    pub fn take_pixels(&mut self) -> Result<PipelinePixels> {
        self.pixels.take().ok_or(Error::Invalid("pipeline has no source".into()))
    }

    /// Maps over the interleaved chain head, replacing it with the wrapped
    /// result.
    pub fn wrap<F>(&mut self, wrap: F) -> Result<()>
    where
        F: FnOnce(Box<dyn PixelSource>) -> Result<Box<dyn PixelSource>>,
    {
        let source = self.take_pixels()?.into_interleaved()?;
        self.pixels = Some(PipelinePixels::Interleaved(wrap(source)?));
        Ok(())
    }
}
