pub mod container;
pub mod encoder;
pub mod memory;
pub mod metadata;

pub use container::{
    ExternalPixelSource, ExternalSourceAdapter, FramePixels, ImageContainer, ImageFrame, YccDescription,
};
pub use encoder::{AnimatedImageEncoder, EncoderOptions, ImageEncoder};
pub use metadata::{
    AnimationContainer, AnimationFrame, ExifSource, FrameBlend, FrameDisposal, FrameMetadata, IccProfileSource,
};

pub use raster_core::Result;
