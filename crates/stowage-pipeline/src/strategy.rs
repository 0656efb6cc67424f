//! Proving strategies: verify an unproved context's claims against its bytes.
//!
//! A strategy is the only way an inbound file becomes proved. Detected values
//! always win over claims; a claim that contradicts the content is rejected.

use stowage_core::constants::OCTET_STREAM;
use stowage_core::mime;
use stowage_core::{
    content_hash, Evidence, FileError, FileResult, ProvedContext, UnprovedContext,
};

pub trait ProvingStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Verify `context` and return its proved form. Requires materialized bytes.
    fn prove(&self, context: UnprovedContext) -> FileResult<ProvedContext>;
}

/// Proves by content signature and byte inspection.
///
/// Size and the binary flag are measured. The media type is sniffed from the
/// leading bytes; when nothing matches, a textual claim is accepted for text
/// content and any non-textual claim for binary content, provided the claimed
/// type is not one that would have been recognized.
#[derive(Debug, Clone, Default)]
pub struct SignatureStrategy {
    allowed: Option<Vec<String>>,
}

impl SignatureStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only accept these media types (normalized; `type/*` wildcards allowed).
    pub fn with_allowed<I, S>(mut self, media_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.allowed = Some(
            media_types
                .into_iter()
                .map(|m| mime::normalize(m.as_ref()))
                .collect(),
        );
        self
    }

    fn detect_mime(
        &self,
        name: &str,
        claimed: Option<&str>,
        data: &[u8],
        binary: bool,
    ) -> FileResult<String> {
        if let Some(detected) = mime::sniff(data) {
            return match claimed {
                Some(claim) if mime::is_compatible(claim, detected) => Ok(claim.to_string()),
                Some(claim) if claim != OCTET_STREAM => Err(FileError::validation(format!(
                    "'{}': declared media type {} does not match detected {}",
                    name, claim, detected
                ))),
                _ => Ok(detected.to_string()),
            };
        }

        match claimed {
            Some(claim) if mime::has_signature(claim) => Err(FileError::validation(format!(
                "'{}': content is not valid {}",
                name, claim
            ))),
            Some(claim) if !binary && mime::is_textual(claim) => Ok(claim.to_string()),
            Some(claim) if binary && mime::is_textual(claim) => Err(FileError::validation(format!(
                "'{}': declared media type {} but content is binary",
                name, claim
            ))),
            Some(claim) if binary => Ok(claim.to_string()),
            _ if binary => Ok(OCTET_STREAM.to_string()),
            _ => Ok("text/plain".to_string()),
        }
    }

    fn is_allowed(&self, media_type: &str) -> bool {
        match &self.allowed {
            None => true,
            Some(allowed) => allowed.iter().any(|pattern| matches_pattern(pattern, media_type)),
        }
    }

    pub(crate) fn evidence(&self, context: &UnprovedContext) -> FileResult<Evidence> {
        let data = context.bytes().ok_or_else(|| {
            FileError::invalid_state(format!(
                "cannot prove '{}': byte stream is not materialized",
                context.name()
            ))
        })?;

        let size = data.len() as u64;
        if let Some(claimed) = context.claimed_size() {
            if claimed != size {
                return Err(FileError::validation(format!(
                    "'{}': declared size {} bytes does not match actual size {} bytes",
                    context.filename(),
                    claimed,
                    size
                )));
            }
        }

        let binary = mime::is_binary(data);
        let media_type =
            self.detect_mime(&context.filename(), context.claimed_mime(), data, binary)?;
        if !self.is_allowed(&media_type) {
            return Err(FileError::validation(format!(
                "media type {} is not allowed",
                media_type
            )));
        }

        let extension = match context.extension() {
            Some(ext) if mime::for_extension(ext) == Some(media_type.as_str()) => ext.to_string(),
            own => mime::extension_for(&media_type)
                .map(str::to_string)
                .or_else(|| own.map(str::to_string))
                .unwrap_or_default(),
        };

        let mut evidence = Evidence::new()
            .with_mime(media_type)
            .with_size(size)
            .with_binary(binary)
            .with_hash(content_hash(data));
        if !extension.is_empty() {
            evidence = evidence.with_extension(extension);
        }
        Ok(evidence)
    }
}

impl ProvingStrategy for SignatureStrategy {
    fn name(&self) -> &'static str {
        "signature"
    }

    fn prove(&self, context: UnprovedContext) -> FileResult<ProvedContext> {
        let evidence = self.evidence(&context)?;
        context.prove(evidence)
    }
}

/// `pattern` is an exact media type or a `type/*` wildcard.
pub(crate) fn matches_pattern(pattern: &str, media_type: &str) -> bool {
    match pattern.strip_suffix("/*") {
        Some("*") => true,
        Some(kind) => media_type
            .split_once('/')
            .is_some_and(|(k, _)| k == kind),
        None => pattern == media_type,
    }
}

/// Signature proving plus image decoding: the content must be a decodable
/// raster image. Records `width` and `height` metadata.
#[cfg(feature = "image")]
#[derive(Debug, Clone, Default)]
pub struct ImageStrategy {
    signature: SignatureStrategy,
}

#[cfg(feature = "image")]
impl ImageStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_allowed<I, S>(mut self, media_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.signature = self.signature.with_allowed(media_types);
        self
    }
}

#[cfg(feature = "image")]
impl ProvingStrategy for ImageStrategy {
    fn name(&self) -> &'static str {
        "image"
    }

    fn prove(&self, context: UnprovedContext) -> FileResult<ProvedContext> {
        use stowage_core::constants::{META_HEIGHT, META_WIDTH};

        let evidence = self.signature.evidence(&context)?;
        let media_type = evidence.mime.as_deref().unwrap_or(OCTET_STREAM);
        if !media_type.starts_with("image/") {
            return Err(FileError::validation(format!(
                "'{}' is not an image ({})",
                context.filename(),
                media_type
            )));
        }

        let data = context.bytes().map(|b| b.as_ref()).unwrap_or_default();
        let (width, height) = crate::image::dimensions(data).map_err(|e| {
            tracing::debug!(error = %e, name = %context.filename(), "Image decode failed");
            FileError::validation(format!("'{}': image could not be decoded", context.filename()))
        })?;

        context.prove(
            evidence
                .with_metadata(META_WIDTH, width)
                .with_metadata(META_HEIGHT, height),
        )
    }
}
