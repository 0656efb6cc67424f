//! File URIs: `store://group/name` and `store://group/name~variant`
//!
//! The group may span several path segments and is omitted entirely when
//! blank. The first `~` of the last segment separates the base name from the
//! variant tag; a second `~` is rejected rather than folded into the tag.

use std::fmt;
use std::str::FromStr;

use crate::constants::{SCHEME_SEPARATOR, VARIANT_SEPARATOR};
use crate::error::{FileError, FileResult};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileUri {
    store: String,
    group: Option<String>,
    name: String,
    variant: Option<String>,
}

impl FileUri {
    /// Build a URI for a stored file. `store` is case-folded, `group` loses
    /// empty and `.` segments the same way storage keys do; `..` is rejected.
    pub fn new(store: &str, group: Option<&str>, name: &str) -> FileResult<Self> {
        let store = normalize_scheme(store)?;
        let group = match group {
            Some(group) => normalize_group(group)?,
            None => None,
        };
        validate_name(name)?;
        Ok(Self {
            store,
            group,
            name: name.to_string(),
            variant: None,
        })
    }

    pub fn store(&self) -> &str {
        &self.store
    }

    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    /// Last path segment, extension included, variant tag excluded.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn variant(&self) -> Option<&str> {
        self.variant.as_deref()
    }

    /// Base name without extension.
    pub fn stem(&self) -> &str {
        split_extension(&self.name).0
    }

    pub fn extension(&self) -> Option<&str> {
        split_extension(&self.name).1
    }

    /// Tag this URI as a reference to one of the file's variants.
    pub fn with_variant(&self, variant: &str) -> FileResult<Self> {
        validate_variant(variant)?;
        Ok(Self {
            variant: Some(variant.to_string()),
            ..self.clone()
        })
    }

    pub fn without_variant(&self) -> Self {
        Self {
            variant: None,
            ..self.clone()
        }
    }

    /// Store-relative key: `group/name`, or `group/stem~variant.ext` for a
    /// tagged URI.
    pub fn key(&self) -> String {
        let file = match &self.variant {
            None => self.name.clone(),
            Some(tag) => match self.extension() {
                Some(ext) => format!("{}{}{}.{}", self.stem(), VARIANT_SEPARATOR, tag, ext),
                None => format!("{}{}{}", self.name, VARIANT_SEPARATOR, tag),
            },
        };
        match &self.group {
            Some(group) => format!("{}/{}", group, file),
            None => file,
        }
    }
}

/// Anything that names a stored file: a parsed [`FileUri`] or its string form.
pub trait IntoFileUri {
    fn into_file_uri(self) -> FileResult<FileUri>;
}

impl IntoFileUri for FileUri {
    fn into_file_uri(self) -> FileResult<FileUri> {
        Ok(self)
    }
}

impl IntoFileUri for &FileUri {
    fn into_file_uri(self) -> FileResult<FileUri> {
        Ok(self.clone())
    }
}

impl IntoFileUri for &str {
    fn into_file_uri(self) -> FileResult<FileUri> {
        self.parse()
    }
}

impl IntoFileUri for String {
    fn into_file_uri(self) -> FileResult<FileUri> {
        self.parse()
    }
}

impl IntoFileUri for &String {
    fn into_file_uri(self) -> FileResult<FileUri> {
        self.parse()
    }
}

/// Join path fragments into a group tag, skipping blank and `.` segments.
/// Backslashes separate segments like slashes.
pub fn join_group<'a>(parts: impl IntoIterator<Item = &'a str>) -> Option<String> {
    let joined = parts
        .into_iter()
        .flat_map(|p| p.split(|c: char| c == '/' || c == '\\'))
        .map(str::trim)
        .filter(|s| !s.is_empty() && *s != ".")
        .collect::<Vec<_>>()
        .join("/");
    if joined.is_empty() {
        None
    } else {
        Some(joined)
    }
}

fn normalize_group(group: &str) -> FileResult<Option<String>> {
    let group = join_group([group]);
    if let Some(g) = &group {
        if g.split('/').any(|segment| segment == "..") {
            return Err(FileError::invalid_uri(format!(
                "group '{}' may not contain '..'",
                g
            )));
        }
    }
    Ok(group)
}

fn normalize_scheme(scheme: &str) -> FileResult<String> {
    let scheme = scheme.trim().to_ascii_lowercase();
    let mut chars = scheme.chars();
    match chars.next() {
        None => return Err(FileError::invalid_uri("missing scheme")),
        Some(c) if !c.is_ascii_alphabetic() => {
            return Err(FileError::invalid_uri(format!(
                "scheme '{}' must start with a letter",
                scheme
            )))
        }
        _ => {}
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.' | '_')) {
        return Err(FileError::invalid_uri(format!(
            "scheme '{}' contains invalid characters",
            scheme
        )));
    }
    Ok(scheme)
}

fn validate_name(name: &str) -> FileResult<()> {
    if name.is_empty() {
        return Err(FileError::invalid_uri("missing path segment"));
    }
    if name.contains('/') || name.contains(VARIANT_SEPARATOR) {
        return Err(FileError::invalid_uri(format!(
            "name '{}' may not contain '/' or '{}'",
            name, VARIANT_SEPARATOR
        )));
    }
    Ok(())
}

fn validate_variant(variant: &str) -> FileResult<()> {
    if variant.is_empty() {
        return Err(FileError::invalid_uri("empty variant tag"));
    }
    if variant.contains('/') || variant.contains(VARIANT_SEPARATOR) {
        return Err(FileError::invalid_uri(format!(
            "variant tag '{}' may not contain '/' or '{}'",
            variant, VARIANT_SEPARATOR
        )));
    }
    Ok(())
}

fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => (stem, Some(ext)),
        _ => (name, None),
    }
}

impl fmt::Display for FileUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.store, SCHEME_SEPARATOR)?;
        if let Some(group) = &self.group {
            write!(f, "{}/", group)?;
        }
        f.write_str(&self.name)?;
        if let Some(tag) = &self.variant {
            write!(f, "{}{}", VARIANT_SEPARATOR, tag)?;
        }
        Ok(())
    }
}

impl FromStr for FileUri {
    type Err = FileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (scheme, path) = s
            .split_once(SCHEME_SEPARATOR)
            .ok_or_else(|| FileError::invalid_uri(format!("missing scheme in '{}'", s)))?;

        let path = path.trim_matches('/');
        let (group, last) = match path.rsplit_once('/') {
            Some((group, last)) => (Some(group), last),
            None => (None, path),
        };
        if last.is_empty() {
            return Err(FileError::invalid_uri(format!(
                "missing path segment in '{}'",
                s
            )));
        }

        let uri = match last.split_once(VARIANT_SEPARATOR) {
            Some((name, tag)) => FileUri::new(scheme, group, name)?.with_variant(tag)?,
            None => FileUri::new(scheme, group, last)?,
        };
        Ok(uri)
    }
}

impl TryFrom<&str> for FileUri {
    type Error = FileError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain() {
        let uri: FileUri = "uploads://photo.jpg".parse().unwrap();
        assert_eq!(uri.store(), "uploads");
        assert_eq!(uri.group(), None);
        assert_eq!(uri.name(), "photo.jpg");
        assert_eq!(uri.variant(), None);
        assert_eq!(uri.stem(), "photo");
        assert_eq!(uri.extension(), Some("jpg"));
    }

    #[test]
    fn test_parse_group_and_variant() {
        let uri: FileUri = "Media://images/2024/photo.jpg~thumb".parse().unwrap();
        assert_eq!(uri.store(), "media");
        assert_eq!(uri.group(), Some("images/2024"));
        assert_eq!(uri.name(), "photo.jpg");
        assert_eq!(uri.variant(), Some("thumb"));
        assert_eq!(uri.to_string(), "media://images/2024/photo.jpg~thumb");
    }

    #[test]
    fn test_display_omits_blank_group() {
        let uri = FileUri::new("uploads", Some(" / "), "a.txt").unwrap();
        assert_eq!(uri.to_string(), "uploads://a.txt");

        let uri = FileUri::new("uploads", Some("/docs//2024/"), "a.txt").unwrap();
        assert_eq!(uri.to_string(), "uploads://docs/2024/a.txt");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(matches!(
            "photo.jpg".parse::<FileUri>(),
            Err(FileError::InvalidUri(_))
        ));
        assert!("://photo.jpg".parse::<FileUri>().is_err());
        assert!("uploads://".parse::<FileUri>().is_err());
        assert!("uploads:///".parse::<FileUri>().is_err());
        assert!("uploads://~thumb".parse::<FileUri>().is_err());
        assert!("uploads://photo.jpg~".parse::<FileUri>().is_err());
        assert!("1up://photo.jpg".parse::<FileUri>().is_err());
    }

    #[test]
    fn test_first_tilde_separates_variant() {
        let uri: FileUri = "uploads://backup~old".parse().unwrap();
        assert_eq!(uri.name(), "backup");
        assert_eq!(uri.variant(), Some("old"));

        // Tags cannot carry a second separator.
        assert!("uploads://a~b~c".parse::<FileUri>().is_err());
    }

    #[test]
    fn test_key_layout() {
        let uri: FileUri = "uploads://images/photo.jpg".parse().unwrap();
        assert_eq!(uri.key(), "images/photo.jpg");

        let tagged = uri.with_variant("thumb").unwrap();
        assert_eq!(tagged.key(), "images/photo~thumb.jpg");
        assert_eq!(tagged.without_variant(), uri);

        let bare: FileUri = "uploads://README~v2".parse().unwrap();
        assert_eq!(bare.key(), "README~v2");
    }

    #[test]
    fn test_join_group() {
        assert_eq!(join_group(["images", "thumbs"]), Some("images/thumbs".to_string()));
        assert_eq!(join_group(["", "thumbs/"]), Some("thumbs".to_string()));
        assert_eq!(join_group(["", ""]), None);
        assert_eq!(join_group(["./albums", "."]), Some("albums".to_string()));
        assert_eq!(join_group(["a\\b"]), Some("a/b".to_string()));
    }

    #[test]
    fn test_group_matches_storage_key() {
        let uri = FileUri::new("uploads", Some("./albums/./2024"), "photo.jpg").unwrap();
        assert_eq!(uri.group(), Some("albums/2024"));
        assert_eq!(uri.key(), "albums/2024/photo.jpg");
        assert_eq!(uri.to_string(), "uploads://albums/2024/photo.jpg");

        let parsed: FileUri = "uploads://./albums/photo.jpg".parse().unwrap();
        assert_eq!(parsed, FileUri::new("uploads", Some("albums"), "photo.jpg").unwrap());

        assert!(matches!(
            FileUri::new("uploads", Some("albums/../secrets"), "a.txt"),
            Err(FileError::InvalidUri(ref m)) if m.contains("..")
        ));
    }

    #[test]
    fn test_dotfile_has_no_extension() {
        let uri = FileUri::new("uploads", None, ".env").unwrap();
        assert_eq!(uri.stem(), ".env");
        assert_eq!(uri.extension(), None);
    }
}
