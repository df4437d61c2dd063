use raster_core::{
    area::{Orientation, PixelArea},
    color::{ChromaPosition, ColorRange, YccMatrix},
    invalid_param_error,
    pixel::PixelFormat,
    source::{check_copy_args, PixelSource, PlanarPixelSource},
    Result,
};

use crate::metadata::{AnimationContainer, AnimationFrame};

/// Pixel payload of a decoded frame.
///
/// Planar and indexed payloads carry the extra state the pipeline needs to
/// take them to a direct interleaved format.
pub enum FramePixels {
    Interleaved(Box<dyn PixelSource>),
    Planar(PlanarPixelSource),
    Indexed {
        source: Box<dyn PixelSource>,
        palette: Vec<u32>,
    },
}

impl FramePixels {
    pub fn format(&self) -> PixelFormat {
        match self {
            FramePixels::Interleaved(source) => source.format(),
            FramePixels::Planar(planes) => planes.y.format(),
            FramePixels::Indexed {
                source, ..
            } => source.format(),
        }
    }

    pub fn width(&self) -> u32 {
        match self {
            FramePixels::Interleaved(source) => source.width(),
            FramePixels::Planar(planes) => planes.y.width(),
            FramePixels::Indexed {
                source, ..
            } => source.width(),
        }
    }

    pub fn height(&self) -> u32 {
        match self {
            FramePixels::Interleaved(source) => source.height(),
            FramePixels::Planar(planes) => planes.y.height(),
            FramePixels::Indexed {
                source, ..
            } => source.height(),
        }
    }
}

/// YCC geometry and matrix details declared by a planar frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct YccDescription {
    pub matrix: YccMatrix,
    pub position: ChromaPosition,
    pub range: ColorRange,
}

/// One decoded frame.
pub trait ImageFrame {
    /// Exif orientation declared for the frame.
    fn orientation(&self) -> Orientation {
        Orientation::Normal
    }

    /// Embedded ICC profile bytes, if any.
    fn icc_profile(&self) -> Option<&[u8]> {
        None
    }

    /// Embedded Exif blob, if any.
    fn exif(&self) -> Option<&[u8]> {
        None
    }

    /// YCC details when the payload is planar.
    fn ycc_description(&self) -> Option<YccDescription> {
        None
    }

    /// Yields the pixel payload. Callable once; subsequent calls fail.
    fn take_pixels(&mut self) -> Result<FramePixels>;
}

/// A decoded image container: the decoder adapter's view of one file or
/// stream.
pub trait ImageContainer {
    fn mime_type(&self) -> &str;
    fn frame_count(&self) -> u32;

    /// Storage dimensions of frame 0 when the header exposes them without a
    /// full decode. Enables the native-scale negotiation.
    fn dimensions(&self) -> Option<(u32, u32)> {
        None
    }

    fn frame(&mut self, index: u32) -> Result<Box<dyn ImageFrame>>;

    /// Animation properties when the container declares an animation.
    fn animation(&self) -> Option<AnimationContainer> {
        None
    }

    fn animation_frame(&self, _index: u32) -> Option<AnimationFrame> {
        None
    }

    /// Asks the decoder to crop during decode. Returns false when
    /// unsupported; the pipeline crops itself in that case.
    fn set_decode_crop(&mut self, _area: PixelArea) -> bool {
        false
    }

    /// Asks the decoder for a natively downscaled frame. Returns the
    /// resulting dimensions when supported.
    fn set_decode_scale(&mut self, _ratio: u32) -> Option<(u32, u32)> {
        None
    }

    /// Decoders known to hand back inverted CMYK when the crop width
    /// differs from the frame width. Gates the invert workaround.
    fn known_buggy_cmyk(&self) -> bool {
        false
    }
}

/// User-supplied pixel source, identified by stable format id. The engine
/// never consumes one directly; it wraps it in [`ExternalSourceAdapter`].
pub trait ExternalPixelSource: Send {
    fn format_id(&self) -> u8;
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn copy_pixels(&mut self, area: PixelArea, stride: usize, buf: &mut [u8]) -> Result<()>;
}

/// Internal adapter over an [`ExternalPixelSource`], re-validating the
/// request before handing it through.
pub struct ExternalSourceAdapter {
    inner: Box<dyn ExternalPixelSource>,
    format: PixelFormat,
}

impl ExternalSourceAdapter {
    pub fn new(inner: Box<dyn ExternalPixelSource>) -> Result<Self> {
        let format = PixelFormat::from_id(inner.format_id())?;
        if inner.width() == 0 || inner.height() == 0 {
            return Err(invalid_param_error!(inner.width()));
        }

        Ok(Self {
            inner,
            format,
        })
    }
}

impl PixelSource for ExternalSourceAdapter {
    fn format(&self) -> PixelFormat {
        self.format
    }

    fn width(&self) -> u32 {
        self.inner.width()
    }

    fn height(&self) -> u32 {
        self.inner.height()
    }

    fn copy_pixels(&mut self, area: PixelArea, stride: usize, buf: &mut [u8]) -> Result<()> {
        check_copy_args(self, &area, stride, buf.len())?;
        self.inner.copy_pixels(area, stride, buf)
    }
}
