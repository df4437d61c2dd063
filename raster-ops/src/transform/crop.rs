use raster_core::{
    area::PixelArea,
    invalid_param_error,
    pixel::PixelFormat,
    source::{check_copy_args, ChainedPixelSource, PixelSource},
    Result,
};

/// Remaps output coordinates into a sub-rectangle of the upstream source.
pub struct CropSource {
    source: Box<dyn PixelSource>,
    crop: PixelArea,
}

impl CropSource {
    pub fn new(source: Box<dyn PixelSource>, crop: PixelArea) -> Result<Self> {
        if crop.is_empty() || !source.area().contains(&crop) {
            return Err(invalid_param_error!(crop));
        }

        Ok(Self {
            source,
            crop,
        })
    }
}

impl PixelSource for CropSource {
    fn format(&self) -> PixelFormat {
        self.source.format()
    }

    fn width(&self) -> u32 {
        self.crop.width
    }

    fn height(&self) -> u32 {
        self.crop.height
    }

    fn copy_pixels(&mut self, area: PixelArea, stride: usize, buf: &mut [u8]) -> Result<()> {
        check_copy_args(self, &area, stride, buf.len())?;
        self.source.copy_pixels(area.offset(self.crop.x, self.crop.y), stride, buf)
    }

    fn as_chained_ref(&self) -> Option<&dyn ChainedPixelSource> {
        Some(self)
    }

    fn as_chained_mut(&mut self) -> Option<&mut dyn ChainedPixelSource> {
        Some(self)
    }
}

impl ChainedPixelSource for CropSource {
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
    fn crop_offsets_requests() {
        let data: Vec<u8> = (0..16).collect();
        let source = MemoryPixelSource::new(PixelFormat::Grey8, 4, 4, data).unwrap();
        let mut crop = CropSource::new(Box::new(source), PixelArea::new(1, 1, 2, 2)).unwrap();

        let mut out = [0u8; 4];
        crop.copy_pixels(PixelArea::from_size(2, 2), 2, &mut out).unwrap();
        assert_eq!(out, [5, 6, 9, 10]);
    }

    #[test]
    fn crop_must_be_contained() {
        let source = MemoryPixelSource::new(PixelFormat::Grey8, 4, 4, vec![0; 16]).unwrap();
        assert!(CropSource::new(Box::new(source), PixelArea::new(3, 3, 2, 2)).is_err());
    }
}
