use num_rational::Rational64;
use raster_core::{area::{Orientation, PixelArea}, color::ChromaSubsampling, pixel::PixelFormat};
use raster_codec::{
    container::YccDescription,
    memory::{MemoryEncoder, MemoryFrame, MemoryImageContainer},
    metadata::{AnimationContainer, AnimationFrame, FrameBlend, FrameDisposal},
};
use raster_ops::resample::InterpolationKernel;
use raster_pipeline::{process_animation, process_image, ProcessImageSettings, ResizeMode};

fn settings() -> ProcessImageSettings {
    ProcessImageSettings {
        interpolation: InterpolationKernel::Lanczos(3),
        prefer_float: Some(true),
        ..Default::default()
    }
}

#[test]
fn resize_only_preserves_constant() {
    let data = vec![0x80u8; 100 * 100 * 3];
    let frame = MemoryFrame::new(PixelFormat::Bgr24, 100, 100, data);
    let mut container = MemoryImageContainer::new("image/png", vec![frame]);
    let mut encoder = MemoryEncoder::new(vec![PixelFormat::Bgr24]);

    let settings = ProcessImageSettings {
        width: 50,
        height: 50,
        ..settings()
    };
    process_image(&mut container, &settings, &mut encoder).unwrap();

    assert!(encoder.committed);
    let out = &encoder.frames[0];
    assert_eq!((out.format, out.width, out.height), (PixelFormat::Bgr24, 50, 50));
    assert!(out.data.iter().all(|&b| b == 0x80), "constant input must survive a normalized kernel");
}

#[test]
fn alpha_flatten_on_white() {
    // half-alpha saturated channels matted onto white in linear light: the
    // saturated channel stays 255, empty channels blend to sRGB(0.498) = 187
    let data = vec![255u8, 0, 0, 128, 0, 255, 0, 128];
    let frame = MemoryFrame::new(PixelFormat::Bgra32, 2, 1, data);
    let mut container = MemoryImageContainer::new("image/png", vec![frame]);
    let mut encoder = MemoryEncoder::new(vec![PixelFormat::Bgr24]);

    let settings = ProcessImageSettings {
        matte_color: Some([255, 255, 255, 255]),
        ..settings()
    };
    process_image(&mut container, &settings, &mut encoder).unwrap();

    let out = &encoder.frames[0];
    assert_eq!(out.format, PixelFormat::Bgr24, "opaque matte drops alpha");
    let expected = [255u8, 187, 187, 187, 255, 187];
    for (got, want) in out.data.iter().zip(expected.iter()) {
        assert!((*got as i32 - *want as i32).abs() <= 1, "{:?}", out.data);
    }
}

#[test]
fn planar_bt601_red() {
    // one (Y=76, Cb=85, Cr=255) color over a 2x2 frame with 4:2:0 chroma
    let mut frame = MemoryFrame::new(PixelFormat::Y8, 2, 2, vec![76; 4]);
    frame.chroma_planes = Some((vec![85], vec![255], ChromaSubsampling::Subsample420));
    frame.ycc = Some(YccDescription::default());
    let mut container = MemoryImageContainer::new("image/jpeg", vec![frame]);
    let mut encoder = MemoryEncoder::new(vec![PixelFormat::Bgr24]);

    process_image(&mut container, &settings(), &mut encoder).unwrap();

    let out = &encoder.frames[0];
    assert_eq!(out.format, PixelFormat::Bgr24);
    for bgr in out.data.chunks_exact(3) {
        assert!(bgr[0] <= 1 && bgr[1] <= 1 && bgr[2] >= 254, "{bgr:?}");
    }
}

#[test]
fn indexed_greyscale_palette() {
    let mut frame = MemoryFrame::new(PixelFormat::Indexed8, 2, 2, vec![0, 1, 1, 0]);
    frame.palette = Some(vec![0xFF000000, 0xFFFFFFFF]);
    let mut container = MemoryImageContainer::new("image/gif", vec![frame]);
    let mut encoder = MemoryEncoder::new(vec![PixelFormat::Grey8, PixelFormat::Bgr24]);

    process_image(&mut container, &settings(), &mut encoder).unwrap();

    let out = &encoder.frames[0];
    assert_eq!(out.format, PixelFormat::Grey8);
    assert_eq!(out.data, vec![0, 255, 255, 0]);
}

#[test]
fn crop_with_rotate90() {
    // storage rows [1,2,3,4] / [5,6,7,8]; presentation (rotated CW) is
    // 2x4 = [[5,1],[6,2],[7,3],[8,4]]; cropping (0,1,2,2) leaves
    // [[6,2],[7,3]]
    let data: Vec<u8> = (1..=8).flat_map(|v| [v, v, v]).collect();
    let mut frame = MemoryFrame::new(PixelFormat::Bgr24, 4, 2, data);
    frame.orientation = Orientation::Rotate90;
    let mut container = MemoryImageContainer::new("image/jpeg", vec![frame]);
    let mut encoder = MemoryEncoder::new(vec![PixelFormat::Bgr24]);

    let settings = ProcessImageSettings {
        crop: Some(PixelArea::new(0, 1, 2, 2)),
        ..settings()
    };
    process_image(&mut container, &settings, &mut encoder).unwrap();

    let out = &encoder.frames[0];
    assert_eq!((out.width, out.height), (2, 2));
    let expected: Vec<u8> = [6u8, 2, 7, 3].iter().flat_map(|&v| [v, v, v]).collect();
    assert_eq!(out.data, expected);
}

#[test]
fn pad_to_canvas() {
    // 2x2 red padded to 4x4 with a green matte, content centered
    let data = vec![255u8, 0, 0].repeat(4);
    let frame = MemoryFrame::new(PixelFormat::Bgr24, 2, 2, data);
    let mut container = MemoryImageContainer::new("image/png", vec![frame]);
    let mut encoder = MemoryEncoder::new(vec![PixelFormat::Bgr24]);

    let settings = ProcessImageSettings {
        width: 4,
        height: 4,
        resize_mode: ResizeMode::Crop,
        matte_color: Some([0, 255, 0, 255]),
        ..settings()
    };
    process_image(&mut container, &settings, &mut encoder).unwrap();

    let out = &encoder.frames[0];
    assert_eq!((out.width, out.height), (4, 4));
    for y in 0..4u32 {
        for x in 0..4u32 {
            let p = &out.data[(y * 4 + x) as usize * 3..][..3];
            let interior = (1..3).contains(&x) && (1..3).contains(&y);
            let expected: &[u8] = if interior { &[255, 0, 0] } else { &[0, 255, 0] };
            assert_eq!(p, expected, "{x},{y}");
        }
    }
}

#[test]
fn quantized_output_for_indexed_encoder() {
    let data = vec![0u8, 0, 255, 255].repeat(16);
    let frame = MemoryFrame::new(PixelFormat::Bgra32, 4, 4, data);
    let mut container = MemoryImageContainer::new("image/png", vec![frame]);
    let mut encoder = MemoryEncoder::new(vec![PixelFormat::Bgra32]);
    encoder.indexed = true;

    process_image(&mut container, &settings(), &mut encoder).unwrap();

    let out = &encoder.frames[0];
    assert_eq!(out.format, PixelFormat::Indexed8);
    let palette = out.palette.as_ref().unwrap();
    assert_eq!(palette.len(), 1);
    assert_eq!(palette[0], 0xFFFF0000);
    assert!(out.data.iter().all(|&i| i == 0));
}

fn animation_frame(disposal: FrameDisposal, x: u32, y: u32) -> AnimationFrame {
    AnimationFrame {
        offset_left: x,
        offset_top: y,
        duration: Rational64::new(1, 20),
        has_alpha: false,
        blend: FrameBlend::Source,
        disposal,
    }
}

#[test]
fn animation_composites_frames() {
    let _ = env_logger::builder().is_test(true).try_init();

    let red = vec![0u8, 0, 255, 255].repeat(16);
    let blue = vec![255u8, 0, 0, 255];

    let mut container = MemoryImageContainer::new(
        "image/gif",
        vec![
            MemoryFrame::new(PixelFormat::Bgra32, 4, 4, red),
            MemoryFrame::new(PixelFormat::Bgra32, 1, 1, blue),
        ],
    );
    container.animation = Some(AnimationContainer {
        screen_width: 4,
        screen_height: 4,
        frame_count: 2,
        loop_count: 0,
        background_color: 0,
        requires_screen_buffer: true,
    });
    container.animation_frames = vec![
        animation_frame(FrameDisposal::Preserve, 0, 0),
        animation_frame(FrameDisposal::None, 3, 3),
    ];

    let mut encoder = MemoryEncoder::new(vec![PixelFormat::Bgra32]);
    process_animation(&mut container, &settings(), &mut encoder).unwrap();

    assert!(encoder.committed);
    assert_eq!(encoder.frames.len(), 2);
    assert_eq!(encoder.animation.unwrap().frame_count, 2);

    // second frame: red screen preserved, blue pixel at (3,3)
    let out = &encoder.frames[1];
    assert_eq!((out.width, out.height), (4, 4));
    let pixel = |x: u32, y: u32| &out.data[(y * 4 + x) as usize * 4..][..4];
    assert_eq!(pixel(0, 0), &[0, 0, 255, 255]);
    assert_eq!(pixel(3, 3), &[255, 0, 0, 255]);
    assert_eq!(out.animation.unwrap().duration, Rational64::new(1, 20));
}

#[test]
fn corrupt_container_rejected() {
    let mut container = MemoryImageContainer::new("image/png", vec![]);
    let mut encoder = MemoryEncoder::new(vec![PixelFormat::Bgr24]);
    assert!(process_image(&mut container, &settings(), &mut encoder).is_err());
    assert!(!encoder.committed);
}
