//! Raster image helpers used by the image strategy and transformers.
//!
//! All functions here are CPU-bound and synchronous. Callers run them off the
//! async runtime.

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat, ImageReader};
use img_parts::{jpeg::Jpeg, png::Png, ImageEXIF};
use std::io::Cursor;

/// Pixel dimensions from the image header, without decoding the pixel data.
pub fn dimensions(data: &[u8]) -> Result<(u32, u32), anyhow::Error> {
    let reader = ImageReader::new(Cursor::new(data)).with_guessed_format()?;
    Ok(reader.into_dimensions()?)
}

pub fn decode(data: &[u8]) -> Result<DynamicImage, anyhow::Error> {
    let reader = ImageReader::new(Cursor::new(data)).with_guessed_format()?;
    Ok(reader.decode()?)
}

/// Drop EXIF data from JPEG and PNG content. Other formats come back unchanged.
pub fn remove_exif(data: &[u8]) -> Vec<u8> {
    if let Ok(mut jpeg) = Jpeg::from_bytes(data.to_vec().into()) {
        jpeg.set_exif(None);
        return jpeg.encoder().bytes().to_vec();
    }
    if let Ok(mut png) = Png::from_bytes(data.to_vec().into()) {
        png.set_exif(None);
        return png.encoder().bytes().to_vec();
    }
    data.to_vec()
}

/// Encoder output format for a media type: `(format, media type, extension)`.
/// Anything else falls back to PNG.
pub fn output_format(media_type: &str) -> (ImageFormat, &'static str, &'static str) {
    match media_type {
        "image/jpeg" => (ImageFormat::Jpeg, "image/jpeg", "jpg"),
        "image/gif" => (ImageFormat::Gif, "image/gif", "gif"),
        "image/webp" => (ImageFormat::WebP, "image/webp", "webp"),
        _ => (ImageFormat::Png, "image/png", "png"),
    }
}

pub fn encode(img: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>, anyhow::Error> {
    let mut buffer = Vec::new();
    match format {
        // The JPEG encoder rejects alpha channels
        ImageFormat::Jpeg => {
            DynamicImage::ImageRgb8(img.to_rgb8()).write_to(&mut Cursor::new(&mut buffer), format)?
        }
        // Lossless WebP only takes 8-bit RGB(A)
        ImageFormat::WebP => DynamicImage::ImageRgba8(img.to_rgba8())
            .write_to(&mut Cursor::new(&mut buffer), format)?,
        _ => img.write_to(&mut Cursor::new(&mut buffer), format)?,
    }
    Ok(buffer)
}

pub fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, anyhow::Error> {
    let mut buffer = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100));
    DynamicImage::ImageRgb8(img.to_rgb8()).write_with_encoder(encoder)?;
    Ok(buffer)
}
