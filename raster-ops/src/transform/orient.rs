use raster_core::{
    area::{Orientation, PixelArea},
    buffer::{rent_local_aligned, BufferLease},
    pixel::PixelFormat,
    profiler::SourceProfiler,
    source::{check_copy_args, ChainedPixelSource, PixelSource},
    Result,
};

/// Realizes one of the eight Exif orientations. Pure flips stream line at a
/// time; transposing orientations buffer the whole frame on first pull.
pub struct OrientSource {
    source: Box<dyn PixelSource>,
    orientation: Orientation,
    width: u32,
    height: u32,
    cache: Option<BufferLease>,
    profiler: SourceProfiler,
}

impl OrientSource {
    pub fn new(source: Box<dyn PixelSource>, orientation: Orientation) -> Self {
        let (width, height) = if orientation.swaps_dimensions() {
            (source.height(), source.width())
        } else {
            (source.width(), source.height())
        };

        Self {
            source,
            orientation,
            width,
            height,
            cache: None,
            profiler: SourceProfiler::new("orient"),
        }
    }

    fn populate_cache(&mut self) -> Result<()> {
        if self.cache.is_some() {
            return Ok(());
        }

        let format = self.source.format();
        let pixel_bytes = format.bytes_per_pixel();
        let src_w = self.source.width();
        let src_h = self.source.height();
        let src_stride = format.line_bytes(src_w);

        let mut src_buf = rent_local_aligned(src_stride * src_h as usize);
        self.profiler.pause();
        self.source.copy_pixels(PixelArea::from_size(src_w, src_h), src_stride, &mut src_buf)?;
        self.profiler.resume();

        let out_stride = format.line_bytes(self.width);
        let mut out = rent_local_aligned(out_stride * self.height as usize);

        for y in 0..self.height {
            for x in 0..self.width {
                // presentation pixel (x, y) pulled from its storage position
                let src = self.orientation.de_orient(PixelArea::new(x, y, 1, 1), src_w, src_h);
                let from = src.y as usize * src_stride + src.x as usize * pixel_bytes;
                let to = y as usize * out_stride + x as usize * pixel_bytes;
                out[to..to + pixel_bytes].copy_from_slice(&src_buf[from..from + pixel_bytes]);
            }
        }

        self.cache = Some(out);
        Ok(())
    }
}

fn reverse_pixels(line: &mut [u8], pixel_bytes: usize) {
    let count = line.len() / pixel_bytes;
    for i in 0..count / 2 {
        let j = count - 1 - i;
        for b in 0..pixel_bytes {
            line.swap(i * pixel_bytes + b, j * pixel_bytes + b);
        }
    }
}

impl PixelSource for OrientSource {
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
        self.profiler.start();

        let format = self.source.format();
        let pixel_bytes = format.bytes_per_pixel();

        if self.orientation.requires_cache() {
            self.populate_cache()?;
            let cache = self.cache.as_ref().unwrap();
            let cache_stride = format.line_bytes(self.width);
            for row in 0..area.height as usize {
                let from = (area.y as usize + row) * cache_stride + area.x as usize * pixel_bytes;
                buf[row * stride..row * stride + line_bytes].copy_from_slice(&cache[from..from + line_bytes]);
            }
        } else {
            let src_h = self.source.height();
            for row in 0..area.height {
                let y = area.y + row;
                let src_y = if self.orientation.flips_y() {
                    src_h - 1 - y
                } else {
                    y
                };
                let src_x = if self.orientation.flips_x() {
                    self.width - area.x - area.width
                } else {
                    area.x
                };

                let dst = &mut buf[row as usize * stride..][..line_bytes];
                self.profiler.pause();
                self.source.copy_pixels(PixelArea::new(src_x, src_y, area.width, 1), line_bytes, dst)?;
                self.profiler.resume();

                if self.orientation.flips_x() {
                    reverse_pixels(dst, pixel_bytes);
                }
            }
        }

        self.profiler.stop(area.size());
        Ok(())
    }

    fn profiler(&self) -> Option<&SourceProfiler> {
        Some(&self.profiler)
    }

    fn as_chained_ref(&self) -> Option<&dyn ChainedPixelSource> {
        Some(self)
    }

    fn as_chained_mut(&mut self) -> Option<&mut dyn ChainedPixelSource> {
        Some(self)
    }
}

impl ChainedPixelSource for OrientSource {
    fn source(&self) -> &dyn PixelSource {
        self.source.as_ref()
    }

    fn source_mut(&mut self) -> &mut dyn PixelSource {
        self.source.as_mut()
    }

    fn passthrough(&self) -> bool {
        !self.orientation.requires_cache()
    }

    fn replace_source(&mut self, source: Box<dyn PixelSource>) {
        self.cache = None;
        self.source = source;
    }
}
