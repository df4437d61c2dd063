mod crop;
mod invert;
mod matte;
mod orient;
mod overlay;
mod pad;

pub use crop::CropSource;
pub use invert::InvertSource;
pub use matte::MatteSource;
pub use orient::OrientSource;
pub use overlay::{overlay_frame, BlendMode};
pub use pad::PadSource;
