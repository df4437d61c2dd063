use raster_core::{
    area::{Orientation, PixelArea},
    pixel::PixelFormat,
    source::{MemoryPixelSource, PixelSource},
};
use raster_ops::{
    ConversionSource, ConvolutionSource, CropSource, InterpolationKernel, MatteSource, OrientSource, PadSource,
};

fn bgr_pixels(source: &mut dyn PixelSource) -> Vec<[u8; 3]> {
    let stride = source.format().line_bytes(source.width());
    let mut out = vec![0u8; stride * source.height() as usize];
    source.copy_pixels(PixelArea::from_size(source.width(), source.height()), stride, &mut out).unwrap();
    out.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect()
}

#[test]
fn crop_then_rotate90() {
    // row0 = [A,B,C,D], row1 = [E,F,G,H]; crop (1,0,2,2) then rotate 90 CW
    // must produce [[F,B],[G,C]]
    let pixels: Vec<u8> = (1..=8).flat_map(|v| [v, v, v]).collect();
    let source = MemoryPixelSource::new(PixelFormat::Bgr24, 4, 2, pixels).unwrap();

    let cropped = CropSource::new(Box::new(source), PixelArea::new(1, 0, 2, 2)).unwrap();
    let mut oriented = OrientSource::new(Box::new(cropped), Orientation::Rotate90);

    assert_eq!((oriented.width(), oriented.height()), (2, 2));
    let out = bgr_pixels(&mut oriented);
    let expected: Vec<[u8; 3]> = [6, 2, 7, 3].iter().map(|&v| [v, v, v]).collect();
    assert_eq!(out, expected);
}

#[test]
fn resize_constant_through_working_format() {
    // 100x100 solid grey through widen -> lanczos3 -> narrow stays solid
    let data = vec![0x80u8; 100 * 100 * 3];
    let source = MemoryPixelSource::new(PixelFormat::Bgr24, 100, 100, data).unwrap();

    let widened = ConversionSource::new(Box::new(source), PixelFormat::Bgr96Float).unwrap();
    let resampled = ConvolutionSource::new(Box::new(widened), 50, 50, InterpolationKernel::Lanczos(3), 0.0, 0.0).unwrap();
    let mut narrowed = ConversionSource::new(Box::new(resampled), PixelFormat::Bgr24).unwrap();

    let out = bgr_pixels(&mut narrowed);
    assert_eq!(out.len(), 50 * 50);
    assert!(out.iter().all(|p| *p == [0x80, 0x80, 0x80]));
}

#[test]
fn matte_flatten_linear() {
    // BGRA (255,0,0,128) and (0,255,0,128) matted onto white with linear
    // blending: the saturated channel stays saturated, the empty channels
    // blend to sRGB(0.498) = 187
    let data = vec![255u8, 0, 0, 128, 0, 255, 0, 128];
    let source = MemoryPixelSource::new(PixelFormat::Bgra32, 2, 1, data).unwrap();

    let widened = ConversionSource::new(Box::new(source), PixelFormat::Pbgra128FloatLinear).unwrap();
    let matted = MatteSource::new(Box::new(widened), [255, 255, 255, 255]).unwrap();
    let mut narrowed = ConversionSource::new(Box::new(matted), PixelFormat::Bgra32).unwrap();

    let mut out = [0u8; 8];
    narrowed.copy_pixels(PixelArea::from_size(2, 1), 8, &mut out).unwrap();

    let expected = [255u8, 187, 187, 255, 187, 255, 187, 255];
    for (got, want) in out.iter().zip(expected.iter()) {
        assert!((*got as i32 - *want as i32).abs() <= 1, "{out:?}");
    }
}

#[test]
fn pad_after_resize() {
    let data = vec![0xFFu8, 0, 0].repeat(4);
    let source = MemoryPixelSource::new(PixelFormat::Bgr24, 2, 2, data).unwrap();
    let mut padded = PadSource::new(Box::new(source), 4, 4, PixelArea::new(1, 1, 2, 2), &[0, 0xFF, 0]).unwrap();

    let out = bgr_pixels(&mut padded);
    let green = out.iter().filter(|p| **p == [0, 0xFF, 0]).count();
    let red = out.iter().filter(|p| **p == [0xFF, 0, 0]).count();
    assert_eq!((green, red), (12, 4));
}
