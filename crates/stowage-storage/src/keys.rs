//! Shared key validation for storage backends.
//!
//! Keys are store-relative paths. Backslashes are folded to `/` and empty or
//! `.` segments dropped before the safety rules apply.

use crate::traits::{StorageError, StorageResult};

const RESERVED_NAMES: &[&str] = &["CON", "PRN", "AUX", "NUL"];

/// Normalize a key and check it cannot escape the store root.
///
/// Rejects null bytes, absolute paths, UNC and drive-letter paths, `..`
/// segments and reserved device names (`CON`, `PRN`, `AUX`, `NUL`,
/// `COM1`-`COM9`, `LPT1`-`LPT9`, with or without an extension).
pub fn validate_key(key: &str) -> StorageResult<String> {
    if key.contains('\0') {
        return Err(invalid(key, "contains a null byte"));
    }

    let folded = key.replace('\\', "/");
    if folded.starts_with('/') {
        return Err(invalid(key, "is absolute"));
    }
    if has_drive_prefix(&folded) {
        return Err(invalid(key, "has a drive prefix"));
    }

    let mut segments = Vec::new();
    for segment in folded.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return Err(invalid(key, "contains a '..' segment")),
            s if is_reserved_name(s) => {
                return Err(invalid(key, &format!("uses reserved name '{}'", s)))
            }
            s => segments.push(s),
        }
    }

    if segments.is_empty() {
        return Err(invalid(key, "is empty"));
    }
    Ok(segments.join("/"))
}

fn invalid(key: &str, reason: &str) -> StorageError {
    StorageError::InvalidKey(format!("'{}' {}", key.escape_default(), reason))
}

fn has_drive_prefix(key: &str) -> bool {
    let bytes = key.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Whether a path segment is a reserved device name, ignoring any extension.
pub fn is_reserved_name(segment: &str) -> bool {
    let base = segment
        .split('.')
        .next()
        .unwrap_or(segment)
        .trim_end()
        .to_ascii_uppercase();
    if RESERVED_NAMES.contains(&base.as_str()) {
        return true;
    }
    match base.as_bytes() {
        [b'C', b'O', b'M', d] | [b'L', b'P', b'T', d] => (b'1'..=b'9').contains(d),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalizes_separators() {
        assert_eq!(validate_key("images\\2024\\a.jpg").unwrap(), "images/2024/a.jpg");
        assert_eq!(validate_key("images//./a.jpg").unwrap(), "images/a.jpg");
    }

    #[test]
    fn test_rejects_traversal_and_absolute_paths() {
        for key in [
            "../etc/passwd",
            "images/../../x",
            "/etc/passwd",
            "\\\\server\\share\\x",
            "C:\\Windows\\x",
            "c:/x",
            "a\0b",
            "",
            "./",
        ] {
            assert!(
                matches!(validate_key(key), Err(StorageError::InvalidKey(_))),
                "expected '{}' to be rejected",
                key.escape_default()
            );
        }
    }

    #[test]
    fn test_rejects_reserved_names() {
        assert!(validate_key("CON").is_err());
        assert!(validate_key("docs/nul.txt").is_err());
        assert!(validate_key("com1.jpg").is_err());
        assert!(validate_key("LPT9").is_err());
        assert!(validate_key("com10.jpg").is_ok());
        assert!(validate_key("console.log").is_ok());
    }

    #[test]
    fn test_dots_inside_names_are_fine() {
        assert_eq!(validate_key("a..b.txt").unwrap(), "a..b.txt");
    }
}
