use raster_core::{area::PixelArea, pixel::PixelFormat, source::PixelSource, Result};
use x_variant::Variant;

use crate::metadata::{AnimationContainer, AnimationFrame, FrameMetadata};

/// Encoder configuration. Format-specific knobs travel through
/// [`ImageEncoder::configure_with_option`].
#[derive(Clone, Debug, Default)]
pub struct EncoderOptions {
    pub quality: Option<u8>,
    pub lossless: Option<bool>,
}

/// Encoder adapter contract.
pub trait ImageEncoder {
    fn supports_pixel_format(&self, format: PixelFormat) -> bool;

    /// The nearest format the encoder can take when `format` itself is
    /// unsupported. The pipeline inserts a final conversion to this.
    fn closest_pixel_format(&self, format: PixelFormat) -> PixelFormat {
        if self.supports_pixel_format(format) {
            format
        } else {
            PixelFormat::Bgr24
        }
    }

    /// Whether the encoder can embed an ICC profile. When it cannot, the
    /// pipeline converts to sRGB instead of passing the profile through.
    fn supports_color_profile(&self) -> bool {
        false
    }

    /// Encoders that want palettized input, e.g. GIF.
    fn prefers_indexed(&self) -> bool {
        false
    }

    fn write_frame(&mut self, source: &mut dyn PixelSource, metadata: &FrameMetadata, area: PixelArea) -> Result<()>;

    /// Writes an indexed frame: `source` is `Indexed8`, `palette` packed
    /// `0xAARRGGBB`.
    fn write_indexed_frame(
        &mut self,
        _source: &mut dyn PixelSource,
        _palette: &[u32],
        _metadata: &FrameMetadata,
    ) -> Result<()> {
        Err(raster_core::error::Error::NotImplemented)
    }

    /// Finalizes the stream. No pixels reach the consumer before this
    /// returns.
    fn commit(&mut self) -> Result<()>;

    fn configure_with_option(&mut self, _key: &str, _value: &Variant) -> Result<()> {
        Ok(())
    }
}

/// Encoders that accept multi-frame animations.
pub trait AnimatedImageEncoder: ImageEncoder {
    /// Must precede the first frame.
    fn write_animation_metadata(&mut self, container: &AnimationContainer) -> Result<()>;

    fn write_animated_frame(
        &mut self,
        source: &mut dyn PixelSource,
        metadata: &FrameMetadata,
        frame: &AnimationFrame,
    ) -> Result<()>;
}
