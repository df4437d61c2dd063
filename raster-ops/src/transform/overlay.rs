use raster_core::{
    area::PixelArea,
    buffer::rent_local_aligned,
    error::Error,
    invalid_param_error,
    pixel::PixelFormat,
    source::{FrameBufferSource, PixelSource},
    Result,
};

/// How a frame merges onto the screen buffer.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum BlendMode {
    /// Replace the covered pixels.
    #[default]
    Source,
    /// Straight-alpha over.
    Over,
}

/// Composites `frame` onto `screen` at `(offset_x, offset_y)`.
///
/// Both must be `Bgra32`; animation screen buffers always are.
pub fn overlay_frame(
    screen: &mut FrameBufferSource,
    frame: &mut dyn PixelSource,
    offset_x: u32,
    offset_y: u32,
    blend: BlendMode,
) -> Result<()> {
    if screen.format() != PixelFormat::Bgra32 || frame.format() != PixelFormat::Bgra32 {
        return Err(Error::Unsupported("overlay requires Bgra32".into()));
    }

    let target = PixelArea::new(offset_x, offset_y, frame.width(), frame.height());
    if !screen.area().contains(&target) {
        return Err(invalid_param_error!(target));
    }

    let line_bytes = frame.format().line_bytes(frame.width());
    let mut line = rent_local_aligned(line_bytes);

    for row in 0..frame.height() {
        frame.copy_pixels(PixelArea::new(0, row, frame.width(), 1), line_bytes, &mut line)?;

        match blend {
            BlendMode::Source => {
                screen.write_pixels(&PixelArea::new(offset_x, offset_y + row, frame.width(), 1), line_bytes, &line)?;
            }
            BlendMode::Over => {
                let dst = screen.line_mut(offset_y + row);
                let dst = &mut dst[offset_x as usize * 4..][..line_bytes];
                for (fg, bg) in line.chunks_exact(4).zip(dst.chunks_exact_mut(4)) {
                    blend_over(fg, bg);
                }
            }
        }
    }

    Ok(())
}

/// Straight-alpha `src over dst` on companded 8-bit values.
fn blend_over(fg: &[u8], bg: &mut [u8]) {
    let fa = fg[3] as u32;
    if fa == 255 {
        bg.copy_from_slice(fg);
        return;
    }
    if fa == 0 {
        return;
    }

    let ba = bg[3] as u32;
    let blended_ba = ba * (255 - fa);
    let oa = fa * 255 + blended_ba;
    for c in 0..3 {
        let v = (fg[c] as u32 * fa * 255 + bg[c] as u32 * blended_ba + oa / 2) / oa;
        bg[c] = v.min(255) as u8;
    }
    bg[3] = ((oa + 127) / 255).min(255) as u8;
}

#[cfg(test)]
mod tests {
    use raster_core::source::MemoryPixelSource;

    use super::*;

    #[test]
    fn source_blend_replaces() {
        let mut screen = FrameBufferSource::new(PixelFormat::Bgra32, 4, 4);
        screen.fill_area(&PixelArea::from_size(4, 4), &[9, 9, 9, 255]).unwrap();

        let mut frame = MemoryPixelSource::new(PixelFormat::Bgra32, 2, 2, vec![1, 2, 3, 0].repeat(4)).unwrap();
        overlay_frame(&mut screen, &mut frame, 1, 1, BlendMode::Source).unwrap();

        let mut out = [0u8; 16];
        screen.copy_pixels(PixelArea::new(0, 1, 4, 1), 16, &mut out).unwrap();
        assert_eq!(&out[..4], &[9, 9, 9, 255]);
        // Source mode copies even fully transparent pixels
        assert_eq!(&out[4..8], &[1, 2, 3, 0]);
    }

    #[test]
    fn over_blend_mixes() {
        let mut screen = FrameBufferSource::new(PixelFormat::Bgra32, 1, 1);
        screen.fill_area(&PixelArea::from_size(1, 1), &[0, 0, 0, 255]).unwrap();

        let mut frame = MemoryPixelSource::new(PixelFormat::Bgra32, 1, 1, vec![255, 255, 255, 128]).unwrap();
        overlay_frame(&mut screen, &mut frame, 0, 0, BlendMode::Over).unwrap();

        let mut out = [0u8; 4];
        screen.copy_pixels(PixelArea::from_size(1, 1), 4, &mut out).unwrap();
        // half white over opaque black
        assert_eq!(out[3], 255);
        assert!((out[0] as i32 - 128).abs() <= 1);
    }

    #[test]
    fn overlay_must_fit() {
        let mut screen = FrameBufferSource::new(PixelFormat::Bgra32, 2, 2);
        let mut frame = MemoryPixelSource::new(PixelFormat::Bgra32, 2, 2, vec![0; 16]).unwrap();
        assert!(overlay_frame(&mut screen, &mut frame, 1, 1, BlendMode::Source).is_err());
    }
}
