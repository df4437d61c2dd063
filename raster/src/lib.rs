pub use raster_codec as codec;
pub use raster_ops as ops;
pub use raster_pipeline as pipeline;

pub use raster_core::{
    area::{Orientation, PixelArea},
    error::Error,
    pixel::PixelFormat,
    source::{ChainedPixelSource, PixelSource},
    Result,
};
pub use raster_pipeline::{process_animation, process_image, ProcessImageSettings};
