use num_rational::Rational64;
use raster_core::{area::Orientation, Result};

/// Opaque ICC profile bytes carried by a container.
pub trait IccProfileSource {
    fn profile_length(&self) -> usize;
    fn copy_profile(&self, buf: &mut [u8]) -> Result<()>;
}

/// Opaque Exif blob carried by a container.
pub trait ExifSource {
    fn exif_length(&self) -> usize;
    fn copy_exif(&self, buf: &mut [u8]) -> Result<()>;
}

/// Metadata handed to an encoder alongside the pixels. The orientation tag
/// is rewritten to `Normal` once the pipeline has normalized it.
#[derive(Clone, Debug, Default)]
pub struct FrameMetadata {
    pub icc_profile: Option<Vec<u8>>,
    pub exif: Option<Vec<u8>>,
    pub orientation: Orientation,
}

/// Per-frame directive for what happens to the canvas before the next
/// frame is drawn.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum FrameDisposal {
    #[default]
    None,
    Preserve,
    RestoreBackground,
    RestorePrevious,
}

/// How a frame's pixels combine with the screen buffer.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum FrameBlend {
    #[default]
    Source,
    Over,
}

/// Animation-level properties of a multi-frame container.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnimationContainer {
    pub screen_width: u32,
    pub screen_height: u32,
    pub frame_count: u32,
    pub loop_count: u32,
    /// Packed `0xAARRGGBB` background.
    pub background_color: u32,
    /// Whether frames must composite onto a persistent screen buffer.
    pub requires_screen_buffer: bool,
}

/// Placement and timing of one animation frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnimationFrame {
    pub offset_left: u32,
    pub offset_top: u32,
    /// Display duration in seconds.
    pub duration: Rational64,
    pub has_alpha: bool,
    pub blend: FrameBlend,
    pub disposal: FrameDisposal,
}

impl Default for AnimationFrame {
    fn default() -> Self {
        Self {
            offset_left: 0,
            offset_top: 0,
            duration: Rational64::new(1, 10),
            has_alpha: false,
            blend: FrameBlend::Source,
            disposal: FrameDisposal::None,
        }
    }
}
