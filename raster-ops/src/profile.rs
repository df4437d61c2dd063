//! Color-space transform step: a 3×3 matrix over linear RGB for matrix
//! profiles, or an opaque provider lookup for table profiles.

use std::sync::Arc;

use bytemuck::try_cast_slice_mut;
use raster_core::{
    area::PixelArea,
    buffer::{rent_local_aligned, BufferLease},
    color::ColorLookup,
    error::Error,
    pixel::PixelFormat,
    source::{check_copy_args, ChainedPixelSource, PixelSource},
    Result,
};

enum Transform {
    /// Row-major matrix over linear RGB.
    Matrix([[f32; 3]; 3]),
    Table(Arc<dyn ColorLookup>),
}

/// Applies a parsed color profile transform to a float pipeline.
pub struct ColorTransformSource {
    source: Box<dyn PixelSource>,
    transform: Transform,
    scratch: BufferLease,
}

impl ColorTransformSource {
    fn supported_matrix(format: PixelFormat) -> bool {
        matches!(
            format,
            PixelFormat::Bgr96FloatLinear | PixelFormat::Bgrx128FloatLinear | PixelFormat::Pbgra128FloatLinear
        )
    }

    pub fn with_matrix(source: Box<dyn PixelSource>, matrix: [[f32; 3]; 3]) -> Result<Self> {
        if !Self::supported_matrix(source.format()) {
            return Err(Error::Unsupported(format!("matrix transform of {}", source.format()).into()));
        }

        let scratch = rent_local_aligned(source.format().line_bytes(source.width()));
        Ok(Self {
            source,
            transform: Transform::Matrix(matrix),
            scratch,
        })
    }

    pub fn with_table(source: Box<dyn PixelSource>, table: Arc<dyn ColorLookup>) -> Result<Self> {
        if source.format().numeric() != raster_core::pixel::PixelNumeric::Float {
            return Err(Error::Unsupported(format!("table transform of {}", source.format()).into()));
        }

        let scratch = rent_local_aligned(source.format().line_bytes(source.width()));
        Ok(Self {
            source,
            transform: Transform::Table(table),
            scratch,
        })
    }
}

impl PixelSource for ColorTransformSource {
    fn format(&self) -> PixelFormat {
        self.source.format()
    }

    fn width(&self) -> u32 {
        self.source.width()
    }

    fn height(&self) -> u32 {
        self.source.height()
    }

    fn copy_pixels(&mut self, area: PixelArea, stride: usize, buf: &mut [u8]) -> Result<()> {
        let line_bytes = check_copy_args(self, &area, stride, buf.len())?;
        let channels = self.source.format().channels() as usize;

        for row in 0..area.height {
            let line_area = PixelArea::new(area.x, area.y + row, area.width, 1);
            self.source.copy_pixels(line_area, line_bytes, &mut self.scratch[..line_bytes])?;

            {
                let line: &mut [f32] =
                    try_cast_slice_mut(&mut self.scratch[..line_bytes]).expect("pooled scratch is vector aligned");
                match &self.transform {
                    Transform::Matrix(m) => {
                        for pixel in line.chunks_exact_mut(channels) {
                            let (b, g, r) = (pixel[0], pixel[1], pixel[2]);
                            pixel[2] = m[0][0] * r + m[0][1] * g + m[0][2] * b;
                            pixel[1] = m[1][0] * r + m[1][1] * g + m[1][2] * b;
                            pixel[0] = m[2][0] * r + m[2][1] * g + m[2][2] * b;
                        }
                    }
                    Transform::Table(table) => table.lookup_line(line),
                }
            }

            buf[row as usize * stride..][..line_bytes].copy_from_slice(&self.scratch[..line_bytes]);
        }

        Ok(())
    }

    fn as_chained_ref(&self) -> Option<&dyn ChainedPixelSource> {
        Some(self)
    }

    fn as_chained_mut(&mut self) -> Option<&mut dyn ChainedPixelSource> {
        Some(self)
    }
}

impl ChainedPixelSource for ColorTransformSource {
    fn source(&self) -> &dyn PixelSource {
        self.source.as_ref()
    }

    fn source_mut(&mut self) -> &mut dyn PixelSource {
        self.source.as_mut()
    }

    fn replace_source(&mut self, source: Box<dyn PixelSource>) {
        self.source = source;
    }
}

#[cfg(test)]
mod tests {
    use raster_core::source::MemoryPixelSource;

    use super::*;

    fn float_source(values: &[f32], width: u32) -> MemoryPixelSource {
        let data: Vec<u8> = values.iter().flat_map(|v| v.to_ne_bytes()).collect();
        MemoryPixelSource::new(PixelFormat::Bgr96FloatLinear, width, 1, data).unwrap()
    }

    #[test]
    fn identity_matrix_is_noop() {
        let source = float_source(&[0.25, 0.5, 0.75], 1);
        let identity = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
        let mut transformed = ColorTransformSource::with_matrix(Box::new(source), identity).unwrap();

        let mut out = vec![0u8; 12];
        transformed.copy_pixels(PixelArea::from_size(1, 1), 12, &mut out).unwrap();
        let values: Vec<f32> = out.chunks_exact(4).map(|c| f32::from_ne_bytes(c.try_into().unwrap())).collect();
        assert_eq!(values, vec![0.25, 0.5, 0.75]);
    }

    #[test]
    fn channel_swap_matrix() {
        // matrix moving all energy from blue into red
        let source = float_source(&[1.0, 0.0, 0.0], 1);
        let matrix = [[0.0, 0.0, 1.0], [0.0, 1.0, 0.0], [0.0, 0.0, 0.0]];
        let mut transformed = ColorTransformSource::with_matrix(Box::new(source), matrix).unwrap();

        let mut out = vec![0u8; 12];
        transformed.copy_pixels(PixelArea::from_size(1, 1), 12, &mut out).unwrap();
        let values: Vec<f32> = out.chunks_exact(4).map(|c| f32::from_ne_bytes(c.try_into().unwrap())).collect();
        // b,g,r lanes: red now carries the old blue value
        assert_eq!(values, vec![0.0, 0.0, 1.0]);
    }

    #[test]
    fn rejects_integer_formats() {
        let source = MemoryPixelSource::new(PixelFormat::Bgr24, 1, 1, vec![0; 3]).unwrap();
        let identity = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
        assert!(ColorTransformSource::with_matrix(Box::new(source), identity).is_err());
    }
}
