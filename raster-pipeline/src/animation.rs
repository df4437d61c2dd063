//! Animation screen-buffer replay.
//!
//! The screen buffer is the only mutable pixel storage in a pipeline. It is
//! owned here and mutated strictly between frames.

use log::trace;
use raster_core::{
    area::PixelArea,
    invalid_param_error,
    pixel::PixelFormat,
    source::{FrameBufferSource, MemoryPixelSource, PixelSource},
    Result,
};
use raster_codec::metadata::{AnimationContainer, AnimationFrame, FrameBlend, FrameDisposal};
use raster_ops::transform::{overlay_frame, BlendMode};

pub struct AnimationPipelineContext {
    screen: FrameBufferSource,
    background: [u8; 4],
    last_disposal: FrameDisposal,
    last_area: PixelArea,
    saved: Option<Vec<u8>>,
}

impl AnimationPipelineContext {
    pub fn new(container: &AnimationContainer) -> Result<Self> {
        if container.screen_width == 0 || container.screen_height == 0 {
            return Err(invalid_param_error!(container.screen_width));
        }

        let mut screen = FrameBufferSource::new(PixelFormat::Bgra32, container.screen_width, container.screen_height);
        let background = [
            (container.background_color & 0xFF) as u8,
            (container.background_color >> 8) as u8,
            (container.background_color >> 16) as u8,
            (container.background_color >> 24) as u8,
        ];
        screen.clear();

        Ok(Self {
            screen,
            background,
            last_disposal: FrameDisposal::None,
            last_area: PixelArea::default(),
            saved: None,
        })
    }

    fn snapshot(&self) -> Vec<u8> {
        let stride = self.screen.stride();
        let mut copy = vec![0u8; stride * self.screen.height() as usize];
        for y in 0..self.screen.height() {
            copy[y as usize * stride..(y as usize + 1) * stride].copy_from_slice(self.screen.line(y));
        }
        copy
    }

    /// Applies the previous frame's disposal, then composites `frame` onto
    /// the screen.
    pub fn advance(&mut self, source: &mut dyn PixelSource, meta: &AnimationFrame) -> Result<()> {
        match self.last_disposal {
            FrameDisposal::RestoreBackground => {
                trace!("animation: clearing {} to background", self.last_area);
                let area = self.last_area;
                self.screen.fill_area(&area, &self.background)?;
            }
            FrameDisposal::RestorePrevious => {
                if let Some(saved) = self.saved.take() {
                    trace!("animation: restoring previous screen");
                    self.screen.write_pixels(&self.screen.area(), self.screen.stride(), &saved)?;
                }
            }
            FrameDisposal::None | FrameDisposal::Preserve => {}
        }

        if meta.disposal == FrameDisposal::RestorePrevious {
            self.saved = Some(self.snapshot());
        }

        let blend = match meta.blend {
            FrameBlend::Source => BlendMode::Source,
            FrameBlend::Over => BlendMode::Over,
        };
        overlay_frame(&mut self.screen, source, meta.offset_left, meta.offset_top, blend)?;

        self.last_disposal = meta.disposal;
        self.last_area = PixelArea::new(meta.offset_left, meta.offset_top, source.width(), source.height());
        Ok(())
    }

    /// Snapshot of the current screen as an owned source, used as the chain
    /// root for the emitted frame.
    pub fn screen_source(&self) -> Result<MemoryPixelSource> {
        MemoryPixelSource::new(PixelFormat::Bgra32, self.screen.width(), self.screen.height(), self.snapshot())
    }

    pub fn screen_size(&self) -> (u32, u32) {
        (self.screen.width(), self.screen.height())
    }
}
