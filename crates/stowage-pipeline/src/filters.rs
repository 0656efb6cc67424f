//! Built-in filters over proved contexts.

use stowage_core::constants::{META_HEIGHT, META_WIDTH};
use stowage_core::{mime, FileError, FileResult, ProvedContext};

use crate::evaluator::Filter;
use crate::strategy::matches_pattern;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Reject files larger than `max_bytes`.
pub fn max_size(max_bytes: u64) -> Filter<ProvedContext> {
    Filter::new(
        "max_size",
        format!("File exceeds {}", human_size(max_bytes)),
        move |ctx: &ProvedContext| ctx.size() <= max_bytes,
    )
}

/// Reject files smaller than `min_bytes`. `min_size(1)` rejects empty files.
pub fn min_size(min_bytes: u64) -> Filter<ProvedContext> {
    let message = if min_bytes <= 1 {
        "File is empty".to_string()
    } else {
        format!("File is smaller than {} bytes", min_bytes)
    };
    Filter::new("min_size", message, move |ctx: &ProvedContext| {
        ctx.size() >= min_bytes
    })
}

/// Accept only the listed media types; `type/*` and `*/*` wildcards allowed.
pub fn allowed_media_types<I, S>(media_types: I) -> Filter<ProvedContext>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let allowed: Vec<String> = media_types
        .into_iter()
        .map(|m| mime::normalize(m.as_ref()))
        .collect();
    let message = format!("File type is not allowed (allowed: {})", allowed.join(", "));
    Filter::new("allowed_media_types", message, move |ctx: &ProvedContext| {
        allowed.iter().any(|pattern| matches_pattern(pattern, ctx.mime()))
    })
}

/// Accept only the listed extensions (case-insensitive, leading dot optional).
pub fn allowed_extensions<I, S>(extensions: I) -> Filter<ProvedContext>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let allowed: Vec<String> = extensions
        .into_iter()
        .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
        .collect();
    let message = format!(
        "File extension is not allowed (allowed: {})",
        allowed.join(", ")
    );
    Filter::new("allowed_extensions", message, move |ctx: &ProvedContext| {
        ctx.extension()
            .map(|ext| allowed.iter().any(|a| a.eq_ignore_ascii_case(ext)))
            .unwrap_or(false)
    })
}

pub fn binary_only() -> Filter<ProvedContext> {
    Filter::new("binary_only", "File must be binary", |ctx: &ProvedContext| {
        ctx.binary()
    })
}

pub fn text_only() -> Filter<ProvedContext> {
    Filter::new("text_only", "File must be text", |ctx: &ProvedContext| {
        !ctx.binary()
    })
}

/// Reject images wider or taller than the given bounds. Needs `width`/`height`
/// metadata from an image strategy or `inspect_dimensions`.
pub fn max_dimensions(max_width: u32, max_height: u32) -> Filter<ProvedContext> {
    Filter::try_new(
        "max_dimensions",
        format!("Image exceeds {}x{} pixels", max_width, max_height),
        move |ctx: &ProvedContext| {
            let (width, height) = dimensions(ctx)?;
            Ok(width <= i64::from(max_width) && height <= i64::from(max_height))
        },
    )
}

pub fn min_dimensions(min_width: u32, min_height: u32) -> Filter<ProvedContext> {
    Filter::try_new(
        "min_dimensions",
        format!("Image is smaller than {}x{} pixels", min_width, min_height),
        move |ctx: &ProvedContext| {
            let (width, height) = dimensions(ctx)?;
            Ok(width >= i64::from(min_width) && height >= i64::from(min_height))
        },
    )
}

fn dimensions(ctx: &ProvedContext) -> FileResult<(i64, i64)> {
    let read = |key: &str| ctx.meta(key).and_then(|v| v.as_i64());
    match (read(META_WIDTH), read(META_HEIGHT)) {
        (Some(w), Some(h)) => Ok((w, h)),
        _ => Err(FileError::validation(format!(
            "Image dimensions of '{}' are unknown",
            ctx.filename()
        ))),
    }
}

fn human_size(bytes: u64) -> String {
    if bytes >= BYTES_PER_MB && bytes % BYTES_PER_MB == 0 {
        format!("{} MB", bytes / BYTES_PER_MB)
    } else {
        format!("{} bytes", bytes)
    }
}
