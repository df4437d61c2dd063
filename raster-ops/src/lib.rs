pub mod conversion;
pub mod convert;
pub mod gamma;
pub mod hybrid;
pub mod palette;
pub mod planar;
pub mod profile;
pub mod resample;
pub mod sharpen;
pub mod transform;

pub use conversion::ConversionSource;
pub use hybrid::HybridScaleSource;
pub use palette::{DitherMode, OctreeQuantizer, PaletteSource, QuantizedFrame};
pub use planar::PlanarConversionSource;
pub use profile::ColorTransformSource;
pub use resample::{ConvolutionSource, InterpolationKernel};
pub use sharpen::{UnsharpMaskSettings, UnsharpMaskSource};
pub use transform::{overlay_frame, BlendMode, CropSource, InvertSource, MatteSource, OrientSource, PadSource};

pub use raster_core::Result;
