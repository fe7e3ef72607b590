use crate::models::ContentKind;
use image::imageops::FilterType;
use image::{DynamicImage, ImageResult};
use std::io::Cursor;

/// Resized image re-encoded in its original format.
#[derive(Debug, Clone)]
pub struct TransformOutput {
    pub data: Vec<u8>,
    pub source_width: u32,
    pub source_height: u32,
    pub width: u32,
    pub height: u32,
}

/// Half of each dimension, never below one pixel.
pub fn target_dimensions(width: u32, height: u32) -> (u32, u32) {
    ((width / 2).max(1), (height / 2).max(1))
}

/// Decodes `data` as `kind`, halves both dimensions and re-encodes as `kind`.
pub fn halve_image(data: &[u8], kind: ContentKind) -> ImageResult<TransformOutput> {
    let img = image::load_from_memory_with_format(data, kind.image_format())?;
    let (source_width, source_height) = (img.width(), img.height());
    let (width, height) = target_dimensions(source_width, source_height);

    let resized = img.resize_exact(width, height, FilterType::Triangle);
    let data = encode(&resized, kind)?;

    Ok(TransformOutput {
        data,
        source_width,
        source_height,
        width,
        height,
    })
}

fn encode(img: &DynamicImage, kind: ContentKind) -> ImageResult<Vec<u8>> {
    // Most encoders only take 8-bit samples, and JPEG has no alpha channel.
    let img = match (kind, img.color()) {
        (ContentKind::Jpeg, _) => DynamicImage::ImageRgb8(img.to_rgb8()),
        (_, image::ColorType::Rgba16 | image::ColorType::La16 | image::ColorType::Rgba32F) => {
            DynamicImage::ImageRgba8(img.to_rgba8())
        }
        (_, image::ColorType::Rgb16 | image::ColorType::L16 | image::ColorType::Rgb32F) => {
            DynamicImage::ImageRgb8(img.to_rgb8())
        }
        _ => img.clone(),
    };

    let mut out_data = Vec::new();
    img.write_to(&mut Cursor::new(&mut out_data), kind.image_format())?;
    Ok(out_data)
}
