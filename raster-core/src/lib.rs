pub mod area;
pub mod buffer;
pub mod color;
pub mod error;
pub mod pixel;
pub mod profiler;
pub mod source;

mod utils;

pub use area::{Orientation, PixelArea};
pub use pixel::{AlphaMode, ColorModel, PixelFormat, PixelNumeric, ValueEncoding};
pub use source::{ChainedPixelSource, PixelSource};
pub use utils::{align_to, div_ceil};

use crate::error::Error;

pub type Result<T> = std::result::Result<T, Error>;
