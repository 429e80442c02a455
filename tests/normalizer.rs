use ecg_image_reader::config::{CANONICAL_HEIGHT, CANONICAL_WIDTH};
use ecg_image_reader::error::EcgError;
use ecg_image_reader::kornia::greyscale::{ChannelLayout, RawImage, normalize};
use ecg_image_reader::kornia::raster_shape;
use ecg_image_reader::synthetic::{ecg_sheet, to_raw, to_rgba};
use image::DynamicImage;

fn gradient(height: usize, width: usize, layout: ChannelLayout) -> RawImage {
    let channels = layout.samples_per_pixel();
    let data = (0..height * width)
        .flat_map(|i| {
            let v = i as f32 / (height * width - 1) as f32;
            std::iter::repeat_n(v, channels)
        })
        .collect();
    RawImage::new(height, width, layout, data).expect("raw image")
}

#[test]
fn every_layout_normalizes_to_canonical_unit_range() {
    let layouts = [
        ChannelLayout::Planar,
        ChannelLayout::Channels(1),
        ChannelLayout::Channels(2),
        ChannelLayout::Channels(3),
        ChannelLayout::Channels(4),
    ];
    for layout in layouts {
        let canonical = normalize(&gradient(40, 60, layout)).expect("normalize");
        assert_eq!(raster_shape(&canonical), (CANONICAL_HEIGHT, CANONICAL_WIDTH), "{layout:?}");
        assert!(
            canonical.as_slice().iter().all(|v| (0.0..=1.0).contains(v)),
            "{layout:?} left the unit range"
        );
    }
}

#[test]
fn alpha_channel_does_not_change_the_canonical_image() {
    let sheet = ecg_sheet(300, 420);
    let rgb = RawImage::from_dynamic(&DynamicImage::ImageRgb8(
        DynamicImage::ImageLuma8(sheet.clone()).to_rgb8(),
    ));
    let opaque = RawImage::from_dynamic(&DynamicImage::ImageRgba8(to_rgba(&sheet, 255)));
    let translucent = RawImage::from_dynamic(&DynamicImage::ImageRgba8(to_rgba(&sheet, 40)));
    assert_eq!(rgb.layout(), ChannelLayout::Channels(3));
    assert_eq!(opaque.layout(), ChannelLayout::Channels(4));

    let from_rgb = normalize(&rgb).expect("rgb");
    let from_opaque = normalize(&opaque).expect("rgba");
    let from_translucent = normalize(&translucent).expect("rgba");
    assert_eq!(from_rgb.as_slice(), from_opaque.as_slice());
    assert_eq!(from_rgb.as_slice(), from_translucent.as_slice());
}

#[test]
fn planar_and_replicated_gray_agree() {
    let sheet = ecg_sheet(200, 280);
    let planar = normalize(&to_raw(&sheet)).expect("planar");
    let replicated = RawImage::new(
        200,
        280,
        ChannelLayout::Channels(1),
        sheet.as_raw().iter().map(|&v| v as f32 / 255.0).collect(),
    )
    .expect("raw");
    let replicated = normalize(&replicated).expect("replicated");
    for (a, b) in planar.as_slice().iter().zip(replicated.as_slice()) {
        assert!((a - b).abs() < 1e-5);
    }
}

#[test]
fn canonical_input_passes_through_unchanged() {
    let sheet = ecg_sheet(CANONICAL_HEIGHT as u32, CANONICAL_WIDTH as u32);
    let canonical = normalize(&to_raw(&sheet)).expect("normalize");
    let expected: Vec<f32> = sheet.as_raw().iter().map(|&v| v as f32 / 255.0).collect();
    assert_eq!(canonical.as_slice(), expected.as_slice());
}

#[test]
fn unreadable_file_is_an_image_load_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("scan.png");
    std::fs::write(&path, b"definitely not a png").expect("write");
    assert!(matches!(RawImage::open(&path), Err(EcgError::ImageLoad { .. })));
    assert!(matches!(
        RawImage::open(&dir.path().join("missing.jpg")),
        Err(EcgError::ImageLoad { .. })
    ));
}

#[test]
fn saved_png_round_trips_through_open() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("sheet.png");
    let sheet = ecg_sheet(120, 160);
    sheet.save(&path).expect("save");
    let raw = RawImage::open(&path).expect("open");
    assert_eq!((raw.height(), raw.width()), (120, 160));
    assert_eq!(raw.layout(), ChannelLayout::Planar);
}
