//! Application-wide constants.

/// Group tag matching any group. Policies without a group register under it.
pub const WILDCARD_GROUP: &str = "*";

/// Separates the scheme from the path in a file URI (`store://group/name`).
pub const SCHEME_SEPARATOR: &str = "://";

/// Separates a base name from its variant tag in a file URI (`name~thumb`).
/// Only the first occurrence is significant, so tags cannot contain it.
pub const VARIANT_SEPARATOR: char = '~';

/// Joins a source file stem and a variant suffix in derived file names.
pub const VARIANT_SUFFIX_JOINER: char = '_';

/// Bytes inspected for signature sniffing and binary detection.
pub const SNIFF_WINDOW: usize = 8192;

/// Media type used when nothing better can be determined.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Longest file name kept after sanitization.
pub const MAX_FILENAME_LEN: usize = 255;

/// Metadata keys written by inspection transformers.
pub const META_WIDTH: &str = "width";
pub const META_HEIGHT: &str = "height";
