//! Media type helpers: normalization, signature sniffing, binary detection
//! and the extension table.
//!
//! Sniffing looks at real bytes only. Claimed types are never consulted here;
//! comparing claims against these results is the proving strategies' job.

use crate::constants::SNIFF_WINDOW;

/// Normalize a media type: lower-case, parameters stripped, common aliases folded.
///
/// `"Image/JPG; charset=binary"` becomes `"image/jpeg"`.
pub fn normalize(media_type: &str) -> String {
    let essence = media_type
        .split(';')
        .next()
        .unwrap_or(media_type)
        .trim()
        .to_ascii_lowercase();

    match essence.as_str() {
        "image/jpg" | "image/pjpeg" => "image/jpeg".to_string(),
        "image/x-png" => "image/png".to_string(),
        "image/x-ms-bmp" => "image/bmp".to_string(),
        "image/vnd.microsoft.icon" => "image/x-icon".to_string(),
        "audio/mp3" => "audio/mpeg".to_string(),
        "audio/wave" | "audio/x-wav" => "audio/wav".to_string(),
        "application/x-pdf" => "application/pdf".to_string(),
        "application/x-zip-compressed" => "application/zip".to_string(),
        "application/x-gzip" => "application/gzip".to_string(),
        _ => essence,
    }
}

/// Split a media type into `(type, subtype)`. Returns `None` unless both parts
/// are present and non-empty.
pub fn split(media_type: &str) -> Option<(&str, &str)> {
    let (kind, subtype) = media_type.split_once('/')?;
    if kind.is_empty() || subtype.is_empty() || subtype.contains('/') {
        return None;
    }
    Some((kind, subtype))
}

/// Detect a media type from the leading bytes of a file.
pub fn sniff(data: &[u8]) -> Option<&'static str> {
    let head = &data[..data.len().min(SNIFF_WINDOW)];

    if head.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some("image/jpeg");
    }
    if head.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        return Some("image/png");
    }
    if head.starts_with(b"GIF87a") || head.starts_with(b"GIF89a") {
        return Some("image/gif");
    }
    if head.len() >= 12 && &head[0..4] == b"RIFF" {
        match &head[8..12] {
            b"WEBP" => return Some("image/webp"),
            b"WAVE" => return Some("audio/wav"),
            b"AVI " => return Some("video/x-msvideo"),
            _ => {}
        }
    }
    if head.len() >= 12 && &head[4..8] == b"ftyp" {
        return Some(match &head[8..12] {
            b"avif" | b"avis" => "image/avif",
            b"heic" | b"heix" | b"mif1" => "image/heic",
            b"qt  " => "video/quicktime",
            b"M4A " => "audio/mp4",
            b"M4V " => "video/x-m4v",
            _ => "video/mp4",
        });
    }
    if head.starts_with(b"II*\0") || head.starts_with(b"MM\0*") {
        return Some("image/tiff");
    }
    if head.starts_with(&[0x00, 0x00, 0x01, 0x00]) {
        return Some("image/x-icon");
    }
    if head.starts_with(b"BM") && head.len() >= 14 {
        return Some("image/bmp");
    }
    if head.starts_with(b"%PDF-") {
        return Some("application/pdf");
    }
    if head.starts_with(b"PK\x03\x04") || head.starts_with(b"PK\x05\x06") {
        return Some("application/zip");
    }
    if head.starts_with(&[0x1F, 0x8B]) {
        return Some("application/gzip");
    }
    if head.starts_with(&[b'7', b'z', 0xBC, 0xAF, 0x27, 0x1C]) {
        return Some("application/x-7z-compressed");
    }
    if head.starts_with(b"ID3")
        || head.starts_with(&[0xFF, 0xFB])
        || head.starts_with(&[0xFF, 0xF3])
    {
        return Some("audio/mpeg");
    }
    if head.starts_with(b"OggS") {
        return Some("audio/ogg");
    }
    if head.starts_with(b"fLaC") {
        return Some("audio/flac");
    }
    if head.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
        return Some("video/webm");
    }

    None
}

const SNIFFABLE: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "image/avif",
    "image/heic",
    "image/tiff",
    "image/x-icon",
    "image/bmp",
    "audio/wav",
    "audio/mp4",
    "audio/mpeg",
    "audio/ogg",
    "audio/flac",
    "video/x-msvideo",
    "video/quicktime",
    "video/x-m4v",
    "video/mp4",
    "video/webm",
    "application/pdf",
    "application/zip",
    "application/gzip",
    "application/x-7z-compressed",
];

/// Zip-based container formats. Their bytes sniff as `application/zip`.
const ZIP_CONTAINERS: &[&str] = &[
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    "application/vnd.oasis.opendocument.text",
    "application/vnd.oasis.opendocument.spreadsheet",
    "application/epub+zip",
    "application/java-archive",
];

/// Whether [`sniff`] can recognize this media type from its bytes.
pub fn has_signature(media_type: &str) -> bool {
    SNIFFABLE.contains(&normalize(media_type).as_str())
}

/// Whether a claimed media type is consistent with the sniffed one.
pub fn is_compatible(claimed: &str, detected: &str) -> bool {
    let claimed = normalize(claimed);
    let detected = normalize(detected);
    if claimed == detected {
        return true;
    }
    match detected.as_str() {
        "application/zip" => ZIP_CONTAINERS.contains(&claimed.as_str()),
        // ftyp brands overlap between audio and video containers
        "video/mp4" => matches!(claimed.as_str(), "audio/mp4" | "video/x-m4v" | "video/quicktime"),
        _ => false,
    }
}

/// Whether content looks binary: a NUL byte or invalid UTF-8 within the sniff window.
///
/// A multi-byte sequence cut off by the window edge does not count as invalid.
pub fn is_binary(data: &[u8]) -> bool {
    let head = &data[..data.len().min(SNIFF_WINDOW)];
    if head.contains(&0) {
        return true;
    }
    match std::str::from_utf8(head) {
        Ok(_) => false,
        Err(e) => e.error_len().is_some() || head.len() == data.len(),
    }
}

/// Whether a media type describes textual content.
pub fn is_textual(media_type: &str) -> bool {
    let media_type = normalize(media_type);
    media_type.starts_with("text/")
        || matches!(
            media_type.as_str(),
            "application/json"
                | "application/xml"
                | "application/javascript"
                | "application/x-yaml"
                | "image/svg+xml"
        )
}

/// Canonical extension for a media type.
pub fn extension_for(media_type: &str) -> Option<&'static str> {
    let ext = match normalize(media_type).as_str() {
        // Images
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/avif" => "avif",
        "image/heic" => "heic",
        "image/svg+xml" => "svg",
        "image/bmp" => "bmp",
        "image/tiff" => "tiff",
        "image/x-icon" => "ico",
        // Videos
        "video/mp4" => "mp4",
        "video/webm" => "webm",
        "video/quicktime" => "mov",
        "video/x-msvideo" => "avi",
        "video/x-matroska" => "mkv",
        "video/x-m4v" => "m4v",
        // Audio
        "audio/mpeg" => "mp3",
        "audio/wav" => "wav",
        "audio/ogg" => "ogg",
        "audio/mp4" => "m4a",
        "audio/flac" => "flac",
        "audio/aac" => "aac",
        // Documents
        "application/pdf" => "pdf",
        "application/msword" => "doc",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => "docx",
        "application/vnd.ms-excel" => "xls",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => "xlsx",
        "application/vnd.ms-powerpoint" => "ppt",
        "application/vnd.openxmlformats-officedocument.presentationml.presentation" => "pptx",
        "text/plain" => "txt",
        "text/csv" => "csv",
        "text/markdown" => "md",
        "text/html" => "html",
        "application/json" => "json",
        "application/xml" => "xml",
        // Archives
        "application/zip" => "zip",
        "application/x-tar" => "tar",
        "application/gzip" => "gz",
        "application/x-7z-compressed" => "7z",
        _ => return None,
    };
    Some(ext)
}

/// Media type registered for an extension (case-insensitive, leading dot allowed).
pub fn for_extension(extension: &str) -> Option<&'static str> {
    let ext = extension.trim_start_matches('.').to_ascii_lowercase();
    let media_type = match ext.as_str() {
        "jpg" | "jpeg" | "jpe" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "avif" => "image/avif",
        "heic" => "image/heic",
        "svg" => "image/svg+xml",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "ico" => "image/x-icon",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "mkv" => "video/x-matroska",
        "m4v" => "video/x-m4v",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "m4a" => "audio/mp4",
        "flac" => "audio/flac",
        "aac" => "audio/aac",
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "ppt" => "application/vnd.ms-powerpoint",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "txt" | "text" | "log" => "text/plain",
        "csv" => "text/csv",
        "md" | "markdown" => "text/markdown",
        "htm" | "html" => "text/html",
        "json" => "application/json",
        "xml" => "application/xml",
        "zip" => "application/zip",
        "tar" => "application/x-tar",
        "gz" => "application/gzip",
        "7z" => "application/x-7z-compressed",
        _ => return None,
    };
    Some(media_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_parameters_and_aliases() {
        assert_eq!(normalize("Image/JPG; charset=binary"), "image/jpeg");
        assert_eq!(normalize("audio/mp3"), "audio/mpeg");
        assert_eq!(normalize(" text/plain ; charset=utf-8"), "text/plain");
        assert_eq!(normalize("application/x-unknown"), "application/x-unknown");
    }

    #[test]
    fn test_split() {
        assert_eq!(split("image/png"), Some(("image", "png")));
        assert_eq!(split("image/*"), Some(("image", "*")));
        assert_eq!(split("image"), None);
        assert_eq!(split("/png"), None);
        assert_eq!(split("a/b/c"), None);
    }

    #[test]
    fn test_sniff_images() {
        assert_eq!(sniff(&[0xFF, 0xD8, 0xFF, 0xE0, 0, 0]), Some("image/jpeg"));
        assert_eq!(
            sniff(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0]),
            Some("image/png")
        );
        assert_eq!(sniff(b"GIF89a......"), Some("image/gif"));
        assert_eq!(sniff(b"RIFF\0\0\0\0WEBPVP8 "), Some("image/webp"));
        assert_eq!(sniff(b"\0\0\0\x1cftypavif\0\0\0\0"), Some("image/avif"));
    }

    #[test]
    fn test_sniff_documents_and_archives() {
        assert_eq!(sniff(b"%PDF-1.7\n"), Some("application/pdf"));
        assert_eq!(sniff(b"PK\x03\x04rest"), Some("application/zip"));
        assert_eq!(sniff(&[0x1F, 0x8B, 0x08]), Some("application/gzip"));
    }

    #[test]
    fn test_sniff_unknown() {
        assert_eq!(sniff(b"hello world"), None);
        assert_eq!(sniff(&[]), None);
    }

    #[test]
    fn test_is_binary() {
        assert!(!is_binary(b"plain text\nwith lines"));
        assert!(!is_binary("héllo wörld".as_bytes()));
        assert!(is_binary(&[0x89, b'P', b'N', b'G', 0x00]));
        assert!(is_binary(&[0xC3, 0x28]));
        assert!(!is_binary(&[]));
    }

    #[test]
    fn test_is_binary_ignores_sequence_cut_at_window() {
        let mut data = vec![b'a'; SNIFF_WINDOW - 1];
        data.extend_from_slice("é".as_bytes());
        assert!(!is_binary(&data));
    }

    #[test]
    fn test_extension_table_round_trip() {
        assert_eq!(extension_for("image/jpeg"), Some("jpg"));
        assert_eq!(for_extension("JPG"), Some("image/jpeg"));
        assert_eq!(for_extension(".jpeg"), Some("image/jpeg"));
        assert_eq!(extension_for("image/jpg"), Some("jpg"));
        assert_eq!(extension_for("application/x-unknown"), None);
        assert_eq!(for_extension("xyz"), None);
    }

    #[test]
    fn test_compatibility() {
        assert!(is_compatible("image/jpg", "image/jpeg"));
        assert!(is_compatible(
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            "application/zip"
        ));
        assert!(!is_compatible("image/png", "image/jpeg"));
        assert!(has_signature("image/png"));
        assert!(!has_signature("text/plain"));
    }

    #[test]
    fn test_is_textual() {
        assert!(is_textual("text/csv"));
        assert!(is_textual("application/json; charset=utf-8"));
        assert!(!is_textual("image/png"));
    }
}
