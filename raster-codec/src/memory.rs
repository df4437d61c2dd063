//! In-memory container and encoder adapters. Useful as the simplest real
//! implementations of the contracts and as harnesses for pipeline tests.

use raster_core::{
    area::{Orientation, PixelArea},
    codec_error,
    color::ChromaSubsampling,
    div_ceil, invalid_param_error,
    pixel::PixelFormat,
    source::{MemoryPixelSource, PixelSource, PlanarPixelSource},
    Result,
};

use crate::{
    container::{FramePixels, ImageContainer, ImageFrame, YccDescription},
    encoder::{AnimatedImageEncoder, ImageEncoder},
    metadata::{AnimationContainer, AnimationFrame, FrameMetadata},
};

/// One predecoded frame held in memory.
pub struct MemoryFrame {
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    pub orientation: Orientation,
    pub icc_profile: Option<Vec<u8>>,
    pub exif: Option<Vec<u8>>,
    pub palette: Option<Vec<u32>>,
    pub ycc: Option<YccDescription>,
    /// Cb and Cr plane bytes for a planar frame; `data` then holds the Y
    /// plane at `width x height`.
    pub chroma_planes: Option<(Vec<u8>, Vec<u8>, ChromaSubsampling)>,
}

impl MemoryFrame {
    pub fn new(format: PixelFormat, width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            format,
            width,
            height,
            data,
            orientation: Orientation::Normal,
            icc_profile: None,
            exif: None,
            palette: None,
            ycc: None,
            chroma_planes: None,
        }
    }
}

struct MemoryFrameHandle {
    frame: MemoryFrame,
    taken: bool,
}

impl ImageFrame for MemoryFrameHandle {
    fn orientation(&self) -> Orientation {
        self.frame.orientation
    }

    fn icc_profile(&self) -> Option<&[u8]> {
        self.frame.icc_profile.as_deref()
    }

    fn exif(&self) -> Option<&[u8]> {
        self.frame.exif.as_deref()
    }

    fn ycc_description(&self) -> Option<YccDescription> {
        self.frame.ycc
    }

    fn take_pixels(&mut self) -> Result<FramePixels> {
        if self.taken {
            return Err(invalid_param_error!(self.taken));
        }
        self.taken = true;

        if let Some((cb, cr, subsampling)) = self.frame.chroma_planes.take() {
            let range = self.frame.format.range();
            let (cb_format, cr_format) = match range {
                raster_core::color::ColorRange::Video => (PixelFormat::Cb8Video, PixelFormat::Cr8Video),
                raster_core::color::ColorRange::Full => (PixelFormat::Cb8, PixelFormat::Cr8),
            };
            let chroma_w = div_ceil(self.frame.width, subsampling.ratio_x());
            let chroma_h = div_ceil(self.frame.height, subsampling.ratio_y());

            let y = MemoryPixelSource::new(
                self.frame.format,
                self.frame.width,
                self.frame.height,
                std::mem::take(&mut self.frame.data),
            )?;
            let cb = MemoryPixelSource::new(cb_format, chroma_w, chroma_h, cb)?;
            let cr = MemoryPixelSource::new(cr_format, chroma_w, chroma_h, cr)?;
            let mut planes = PlanarPixelSource::new(Box::new(y), Box::new(cb), Box::new(cr), subsampling)?;

            if let Some(ycc) = self.frame.ycc {
                planes.chroma_offset_x = ycc.position.offset_x(subsampling);
                planes.chroma_offset_y = ycc.position.offset_y(subsampling);
            }
            return Ok(FramePixels::Planar(planes));
        }

        let source = MemoryPixelSource::new(
            self.frame.format,
            self.frame.width,
            self.frame.height,
            std::mem::take(&mut self.frame.data),
        )?;

        Ok(match self.frame.palette.take() {
            Some(palette) => FramePixels::Indexed {
                source: Box::new(source),
                palette,
            },
            None => FramePixels::Interleaved(Box::new(source)),
        })
    }
}

/// Container over predecoded frames.
pub struct MemoryImageContainer {
    mime_type: String,
    frames: Vec<Option<MemoryFrame>>,
    pub animation: Option<AnimationContainer>,
    pub animation_frames: Vec<AnimationFrame>,
}

impl MemoryImageContainer {
    pub fn new(mime_type: &str, frames: Vec<MemoryFrame>) -> Self {
        Self {
            mime_type: mime_type.to_string(),
            frames: frames.into_iter().map(Some).collect(),
            animation: None,
            animation_frames: Vec::new(),
        }
    }
}

impl ImageContainer for MemoryImageContainer {
    fn mime_type(&self) -> &str {
        &self.mime_type
    }

    fn frame_count(&self) -> u32 {
        self.frames.len() as u32
    }

    fn dimensions(&self) -> Option<(u32, u32)> {
        self.frames.first().and_then(|f| f.as_ref()).map(|f| (f.width, f.height))
    }

    fn frame(&mut self, index: u32) -> Result<Box<dyn ImageFrame>> {
        let frame = self
            .frames
            .get_mut(index as usize)
            .and_then(Option::take)
            .ok_or_else(|| codec_error!(format!("frame {index} unavailable")))?;

        Ok(Box::new(MemoryFrameHandle {
            frame,
            taken: false,
        }))
    }

    fn animation(&self) -> Option<AnimationContainer> {
        self.animation
    }

    fn animation_frame(&self, index: u32) -> Option<AnimationFrame> {
        self.animation_frames.get(index as usize).copied()
    }
}

/// Captured encoder output: pixels pulled from the final chain plus the
/// metadata the pipeline attached.
pub struct EncodedFrame {
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    pub metadata: FrameMetadata,
    pub palette: Option<Vec<u32>>,
    pub animation: Option<AnimationFrame>,
}

/// Encoder adapter that buffers frames in memory.
pub struct MemoryEncoder {
    pub supported: Vec<PixelFormat>,
    pub embeds_profile: bool,
    pub indexed: bool,
    pub frames: Vec<EncodedFrame>,
    pub animation: Option<AnimationContainer>,
    pub committed: bool,
}

impl MemoryEncoder {
    pub fn new(supported: Vec<PixelFormat>) -> Self {
        Self {
            supported,
            embeds_profile: false,
            indexed: false,
            frames: Vec::new(),
            animation: None,
            committed: false,
        }
    }

    fn pull(source: &mut dyn PixelSource, area: PixelArea) -> Result<Vec<u8>> {
        let stride = source.format().line_bytes(area.width);
        let mut data = vec![0u8; stride * area.height as usize];
        source.copy_pixels(area, stride, &mut data)?;
        Ok(data)
    }
}

impl ImageEncoder for MemoryEncoder {
    fn supports_pixel_format(&self, format: PixelFormat) -> bool {
        self.supported.contains(&format)
    }

    fn closest_pixel_format(&self, format: PixelFormat) -> PixelFormat {
        if self.supports_pixel_format(format) {
            format
        } else {
            *self.supported.first().unwrap_or(&PixelFormat::Bgr24)
        }
    }

    fn supports_color_profile(&self) -> bool {
        self.embeds_profile
    }

    fn prefers_indexed(&self) -> bool {
        self.indexed
    }

    fn write_frame(&mut self, source: &mut dyn PixelSource, metadata: &FrameMetadata, area: PixelArea) -> Result<()> {
        let data = Self::pull(source, area)?;
        self.frames.push(EncodedFrame {
            format: source.format(),
            width: area.width,
            height: area.height,
            data,
            metadata: metadata.clone(),
            palette: None,
            animation: None,
        });
        Ok(())
    }

    fn write_indexed_frame(
        &mut self,
        source: &mut dyn PixelSource,
        palette: &[u32],
        metadata: &FrameMetadata,
    ) -> Result<()> {
        let area = source.area();
        let data = Self::pull(source, area)?;
        self.frames.push(EncodedFrame {
            format: source.format(),
            width: area.width,
            height: area.height,
            data,
            metadata: metadata.clone(),
            palette: Some(palette.to_vec()),
            animation: None,
        });
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.committed = true;
        Ok(())
    }
}

impl AnimatedImageEncoder for MemoryEncoder {
    fn write_animation_metadata(&mut self, container: &AnimationContainer) -> Result<()> {
        self.animation = Some(*container);
        Ok(())
    }

    fn write_animated_frame(
        &mut self,
        source: &mut dyn PixelSource,
        metadata: &FrameMetadata,
        frame: &AnimationFrame,
    ) -> Result<()> {
        let area = source.area();
        let data = Self::pull(source, area)?;
        self.frames.push(EncodedFrame {
            format: source.format(),
            width: area.width,
            height: area.height,
            data,
            metadata: metadata.clone(),
            palette: None,
            animation: Some(*frame),
        });
        Ok(())
    }
}
