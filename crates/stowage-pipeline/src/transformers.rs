//! Built-in transformers over proved contexts.
//!
//! Image transformers need materialized bytes and are only available with the
//! `image` feature.

use stowage_core::{MetaValue, ProvedContext};

use crate::evaluator::Transformer;

/// Attach a fixed metadata entry.
pub fn set_metadata(
    key: impl Into<String>,
    value: impl Into<MetaValue>,
) -> Transformer<ProvedContext> {
    let key = key.into();
    let value = value.into();
    Transformer::new(format!("set_metadata:{}", key), move |ctx: ProvedContext| {
        Ok(ctx.with_metadata(key.clone(), value.clone()))
    })
}

/// Fill the content hash if a previous stage cleared it.
pub fn ensure_hash() -> Transformer<ProvedContext> {
    Transformer::new("ensure_hash", |ctx: ProvedContext| ctx.ensure_hash())
}

#[cfg(feature = "image")]
pub use self::raster::{
    inspect_dimensions, normalize_jpeg, strip_exif, thumbnail, thumbnail_extension,
};

#[cfg(feature = "image")]
mod raster {
    use bytes::Bytes;
    use stowage_core::constants::{META_HEIGHT, META_WIDTH};
    use stowage_core::{FileError, FileResult, ProvedContext};

    use crate::evaluator::Transformer;
    use crate::image as imaging;

    fn content(ctx: &ProvedContext) -> FileResult<Bytes> {
        ctx.bytes().cloned().ok_or_else(|| {
            FileError::invalid_state(format!(
                "'{}': byte stream is not materialized",
                ctx.filename()
            ))
        })
    }

    fn is_raster(ctx: &ProvedContext) -> bool {
        ctx.mime().starts_with("image/") && ctx.mime() != "image/svg+xml"
    }

    /// Record `width`/`height` metadata for raster images. Other content
    /// passes through unchanged.
    pub fn inspect_dimensions() -> Transformer<ProvedContext> {
        Transformer::new("inspect_dimensions", |ctx: ProvedContext| {
            if !is_raster(&ctx) {
                return Ok(ctx);
            }
            let data = content(&ctx)?;
            let (width, height) = imaging::dimensions(&data).map_err(|e| {
                FileError::validation(format!("'{}': {}", ctx.filename(), e))
            })?;
            Ok(ctx
                .with_metadata(META_WIDTH, width)
                .with_metadata(META_HEIGHT, height))
        })
    }

    /// Remove EXIF blocks from JPEG and PNG content.
    pub fn strip_exif() -> Transformer<ProvedContext> {
        Transformer::new("strip_exif", |ctx: ProvedContext| {
            if !matches!(ctx.mime(), "image/jpeg" | "image/png") {
                return Ok(ctx);
            }
            let data = content(&ctx)?;
            let stripped = imaging::remove_exif(&data);
            if stripped.as_slice() == &data[..] {
                return Ok(ctx);
            }
            tracing::debug!(name = %ctx.filename(), "EXIF metadata removed");
            let mime = ctx.mime().to_string();
            let extension = ctx.extension().unwrap_or_default().to_string();
            Ok(ctx.with_content(stripped, mime, extension))
        })
    }

    /// Downscale to fit within `width` x `height`, keeping the aspect ratio.
    /// JPEG, PNG, GIF and WebP keep their format; anything else becomes PNG.
    pub fn thumbnail(width: u32, height: u32) -> Transformer<ProvedContext> {
        Transformer::new(
            format!("thumbnail:{}x{}", width, height),
            move |ctx: ProvedContext| {
                let data = content(&ctx)?;
                let img = imaging::decode(&data).map_err(|e| {
                    FileError::validation(format!("'{}': {}", ctx.filename(), e))
                })?;
                let thumb = img.thumbnail(width, height);
                let (format, mime, _) = imaging::output_format(ctx.mime());
                let encoded = imaging::encode(&thumb, format)?;
                let extension =
                    thumbnail_extension(ctx.mime(), ctx.extension().unwrap_or_default());

                tracing::debug!(
                    name = %ctx.filename(),
                    width = thumb.width(),
                    height = thumb.height(),
                    size_bytes = encoded.len(),
                    "Thumbnail generated"
                );
                Ok(ctx
                    .with_content(encoded, mime, extension)
                    .with_metadata(META_WIDTH, thumb.width())
                    .with_metadata(META_HEIGHT, thumb.height()))
            },
        )
    }

    /// Extension a [`thumbnail`] of `media_type` content is stored with. The
    /// source's own extension is kept while it still names the output type.
    pub fn thumbnail_extension(media_type: &str, extension: &str) -> String {
        let (_, mime, canonical) = imaging::output_format(media_type);
        if stowage_core::mime::for_extension(extension) == Some(mime) {
            extension.to_string()
        } else {
            canonical.to_string()
        }
    }

    /// Re-encode any decodable raster image as baseline JPEG.
    pub fn normalize_jpeg(quality: u8) -> Transformer<ProvedContext> {
        Transformer::new(
            format!("normalize_jpeg:{}", quality),
            move |ctx: ProvedContext| {
                if !is_raster(&ctx) {
                    return Ok(ctx);
                }
                let data = content(&ctx)?;
                let img = imaging::decode(&data).map_err(|e| {
                    FileError::validation(format!("'{}': {}", ctx.filename(), e))
                })?;
                let encoded = imaging::encode_jpeg(&img, quality)?;
                let extension =
                    keep_extension(&ctx, "image/jpeg").unwrap_or_else(|| "jpg".to_string());
                Ok(ctx
                    .with_content(encoded, "image/jpeg", extension)
                    .with_metadata(META_WIDTH, img.width())
                    .with_metadata(META_HEIGHT, img.height()))
            },
        )
    }

    /// The context's own extension if it already names `mime` (`jpeg` stays `jpeg`).
    fn keep_extension(ctx: &ProvedContext, mime: &str) -> Option<String> {
        ctx.extension()
            .filter(|ext| stowage_core::mime::for_extension(ext) == Some(mime))
            .map(str::to_string)
    }
}
