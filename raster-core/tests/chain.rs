use raster_core::{
    area::PixelArea,
    pixel::PixelFormat,
    source::{check_copy_args, ChainedPixelSource, MemoryPixelSource, PixelSource},
};

/// Minimal chained transform that inverts every byte of its upstream.
struct InvertBytes {
    source: Box<dyn PixelSource>,
}

impl PixelSource for InvertBytes {
    fn format(&self) -> PixelFormat {
        self.source.format()
    }

    fn width(&self) -> u32 {
        self.source.width()
    }

    fn height(&self) -> u32 {
        self.source.height()
    }

    fn copy_pixels(&mut self, area: PixelArea, stride: usize, buf: &mut [u8]) -> raster_core::Result<()> {
        check_copy_args(self, &area, stride, buf.len())?;
        self.source.copy_pixels(area, stride, buf)?;
        for b in buf.iter_mut() {
            *b = !*b;
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

impl ChainedPixelSource for InvertBytes {
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

/// Grey8 transform that doubles its upstream in both axes by replication.
struct Double {
    source: Box<dyn PixelSource>,
}

impl PixelSource for Double {
    fn format(&self) -> PixelFormat {
        self.source.format()
    }

    fn width(&self) -> u32 {
        self.source.width() * 2
    }

    fn height(&self) -> u32 {
        self.source.height() * 2
    }

    fn copy_pixels(&mut self, area: PixelArea, stride: usize, buf: &mut [u8]) -> raster_core::Result<()> {
        check_copy_args(self, &area, stride, buf.len())?;

        let src_w = self.source.width();
        let mut line = vec![0u8; src_w as usize];
        for row in 0..area.height {
            let src_y = (area.y + row) / 2;
            self.source.copy_pixels(PixelArea::new(0, src_y, src_w, 1), src_w as usize, &mut line)?;
            let out = &mut buf[row as usize * stride..][..area.width as usize];
            for (i, b) in out.iter_mut().enumerate() {
                *b = line[(area.x + i as u32) as usize / 2];
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

impl ChainedPixelSource for Double {
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

fn grey_source(width: u32, height: u32, fill: u8) -> MemoryPixelSource {
    MemoryPixelSource::new(PixelFormat::Grey8, width, height, vec![fill; (width * height) as usize]).unwrap()
}

#[test]
fn reinit_equals_fresh_construction() {
    let mut chained = InvertBytes {
        source: Box::new(grey_source(4, 4, 0x0F)),
    };
    chained.reinit(Box::new(grey_source(4, 4, 0xF0))).unwrap();

    let mut fresh = InvertBytes {
        source: Box::new(grey_source(4, 4, 0xF0)),
    };

    let area = PixelArea::from_size(4, 4);
    let (mut a, mut b) = ([0u8; 16], [0u8; 16]);
    chained.copy_pixels(area, 4, &mut a).unwrap();
    fresh.copy_pixels(area, 4, &mut b).unwrap();
    assert_eq!(a, b);
}

#[test]
fn reinit_propagates_down_passthrough_chain() {
    // base 2x2 -> Double (4x4) -> InvertBytes (4x4). A 2x2 replacement does
    // not match the invert node's upstream, so it lands on the doubler.
    let double = Double {
        source: Box::new(grey_source(2, 2, 1)),
    };
    let mut outer = InvertBytes {
        source: Box::new(double),
    };

    outer.reinit(Box::new(grey_source(2, 2, 7))).unwrap();

    let mut buf = [0u8; 16];
    outer.copy_pixels(PixelArea::from_size(4, 4), 4, &mut buf).unwrap();
    assert!(buf.iter().all(|&b| b == !7));
}

#[test]
fn reinit_rejects_mismatched_dimensions() {
    let mut chained = InvertBytes {
        source: Box::new(grey_source(4, 4, 0)),
    };
    // Neither the upstream nor anything below it matches a 3x3 source.
    assert!(chained.reinit(Box::new(grey_source(3, 3, 0))).is_err());
}
