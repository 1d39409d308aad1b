mod common;

use pero_processing_client::raster::PageImage;

#[test]
fn decodes_to_bgr_with_dimensions() {
    let img = PageImage::decode(&common::png(4, 3, [200, 10, 30])).unwrap();
    assert_eq!((img.width, img.height), (4, 3));
    assert_eq!(img.bgr.len(), 4 * 3 * 3);
    assert_eq!(&img.bgr[..3], &[30, 10, 200]);
}

#[test]
fn grayscale_expands_to_three_channels() {
    let gray = image::GrayImage::from_pixel(2, 2, image::Luma([77]));
    let mut out = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageLuma8(gray)
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    let img = PageImage::decode(&out.into_inner()).unwrap();
    assert_eq!(img.bgr, vec![77; 12]);
}

#[test]
fn garbage_is_an_error() {
    assert!(PageImage::decode(b"not an image").is_err());
}
