use raster_core::{
    area::PixelArea,
    invalid_param_error,
    pixel::PixelFormat,
    source::{check_copy_args, ChainedPixelSource, PixelSource},
    Result,
};

/// Extends the canvas around the upstream content, filling with a solid
/// color. Supports 1-, 3- and 4-byte pixels.
pub struct PadSource {
    source: Box<dyn PixelSource>,
    width: u32,
    height: u32,
    inner: PixelArea,
    fill: [u8; 4],
    pixel_bytes: usize,
}

impl PadSource {
    pub fn new(source: Box<dyn PixelSource>, width: u32, height: u32, inner: PixelArea, fill: &[u8]) -> Result<Self> {
        let pixel_bytes = source.format().bytes_per_pixel();
        if !matches!(pixel_bytes, 1 | 3 | 4) || fill.len() != pixel_bytes {
            return Err(invalid_param_error!(fill));
        }
        if inner.width != source.width()
            || inner.height != source.height()
            || !PixelArea::from_size(width, height).contains(&inner)
        {
            return Err(invalid_param_error!(inner));
        }

        let mut fill_pixel = [0u8; 4];
        fill_pixel[..pixel_bytes].copy_from_slice(fill);

        Ok(Self {
            source,
            width,
            height,
            inner,
            fill: fill_pixel,
            pixel_bytes,
        })
    }

    fn fill_span(&self, dst: &mut [u8]) {
        for pixel in dst.chunks_exact_mut(self.pixel_bytes) {
            pixel.copy_from_slice(&self.fill[..self.pixel_bytes]);
        }
    }
}

impl PixelSource for PadSource {
    fn format(&self) -> PixelFormat {
        self.source.format()
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn copy_pixels(&mut self, area: PixelArea, stride: usize, buf: &mut [u8]) -> Result<()> {
        let line_bytes = check_copy_args(self, &area, stride, buf.len())?;
        let pixel_bytes = self.pixel_bytes;

        for row in 0..area.height {
            let y = area.y + row;
            let dst = &mut buf[row as usize * stride..][..line_bytes];

            let inside_y = y >= self.inner.y && y < self.inner.y + self.inner.height;
            let overlap = if inside_y {
                PixelArea::new(area.x, y, area.width, 1).intersect(&PixelArea::new(self.inner.x, y, self.inner.width, 1))
            } else {
                PixelArea::default()
            };

            if overlap.is_empty() {
                self.fill_span(dst);
                continue;
            }

            let left = (overlap.x - area.x) as usize * pixel_bytes;
            let right = left + overlap.width as usize * pixel_bytes;
            self.fill_span(&mut dst[..left]);
            self.source.copy_pixels(
                PixelArea::new(overlap.x - self.inner.x, y - self.inner.y, overlap.width, 1),
                right - left,
                &mut dst[left..right],
            )?;
            self.fill_span(&mut dst[right..]);
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

impl ChainedPixelSource for PadSource {
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
    fn pad_border_and_interior() {
        // 2x2 red padded to 4x4 green, inner at (1,1)
        let red = [255u8, 0, 0];
        let green = [0u8, 255, 0];
        let data: Vec<u8> = red.repeat(4);
        let source = MemoryPixelSource::new(PixelFormat::Bgr24, 2, 2, data).unwrap();
        let mut pad = PadSource::new(Box::new(source), 4, 4, PixelArea::new(1, 1, 2, 2), &green).unwrap();

        let mut out = vec![0u8; 4 * 4 * 3];
        pad.copy_pixels(PixelArea::from_size(4, 4), 12, &mut out).unwrap();

        for y in 0..4u32 {
            for x in 0..4u32 {
                let p = &out[(y * 4 + x) as usize * 3..][..3];
                let interior = (1..3).contains(&x) && (1..3).contains(&y);
                assert_eq!(p, if interior { &red } else { &green }, "{x},{y}");
            }
        }
    }

    #[test]
    fn pad_partial_rows() {
        let source = MemoryPixelSource::new(PixelFormat::Grey8, 2, 1, vec![7, 8]).unwrap();
        let mut pad = PadSource::new(Box::new(source), 4, 3, PixelArea::new(1, 1, 2, 1), &[1]).unwrap();

        // read a sub-rect overlapping fill and content
        let mut out = [0u8; 6];
        pad.copy_pixels(PixelArea::new(1, 0, 3, 2), 3, &mut out).unwrap();
        assert_eq!(out, [1, 1, 1, 7, 8, 1]);
    }
}
