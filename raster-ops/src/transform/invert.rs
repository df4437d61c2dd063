use raster_core::{
    area::PixelArea,
    error::Error,
    pixel::{PixelFormat, PixelNumeric},
    source::{check_copy_args, ChainedPixelSource, PixelSource},
    Result,
};

/// Inverts every color sample. Works around decoders that hand back
/// inverted CMYK; alpha channels pass through untouched.
pub struct InvertSource {
    source: Box<dyn PixelSource>,
}

impl InvertSource {
    pub fn new(source: Box<dyn PixelSource>) -> Result<Self> {
        let format = source.format();
        if format.numeric() != PixelNumeric::UnsignedInt || format.is_indexed() {
            return Err(Error::Unsupported(format!("invert of {format}").into()));
        }

        Ok(Self {
            source,
        })
    }
}

impl PixelSource for InvertSource {
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
        self.source.copy_pixels(area, stride, buf)?;

        let format = self.source.format();
        let pixel_bytes = format.bytes_per_pixel();
        let color_bytes = if format.has_alpha() {
            pixel_bytes - 1
        } else {
            pixel_bytes
        };

        for row in 0..area.height as usize {
            let line = &mut buf[row * stride..row * stride + line_bytes];
            for pixel in line.chunks_exact_mut(pixel_bytes) {
                for b in &mut pixel[..color_bytes] {
                    *b = !*b;
                }
            }
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

impl ChainedPixelSource for InvertSource {
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

    #[test]
    fn inverts_colors_not_alpha() {
        let source = MemoryPixelSource::new(PixelFormat::Bgra32, 1, 1, vec![0, 255, 16, 200]).unwrap();
        let mut inverted = InvertSource::new(Box::new(source)).unwrap();

        let mut out = [0u8; 4];
        inverted.copy_pixels(PixelArea::from_size(1, 1), 4, &mut out).unwrap();
        assert_eq!(out, [255, 0, 239, 200]);
    }

    #[test]
    fn inverts_cmyk() {
        let source = MemoryPixelSource::new(PixelFormat::Cmyk32, 1, 1, vec![10, 20, 30, 40]).unwrap();
        let mut inverted = InvertSource::new(Box::new(source)).unwrap();

        let mut out = [0u8; 4];
        inverted.copy_pixels(PixelArea::from_size(1, 1), 4, &mut out).unwrap();
        assert_eq!(out, [245, 235, 225, 215]);
    }
}
