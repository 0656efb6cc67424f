//! Configuration module
//!
//! Settings for the storage collaborator and the built-in policies, read from
//! the process environment. `from_vars` takes any lookup function so tests do
//! not have to touch the real environment.

use std::env;
use std::path::PathBuf;

use crate::storage_types::StorageBackend;

const MAX_FILE_SIZE_MB: u64 = 10;
const MAX_DOCUMENT_SIZE_MB: u64 = 50;
const THUMBNAIL_SIZE: (u32, u32) = (256, 256);
const BYTES_PER_MB: u64 = 1024 * 1024;

/// Storage collaborator settings
#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub local_storage_path: String,
    pub local_storage_base_url: Option<String>,
    /// One store is mounted per scheme
    pub schemes: Vec<String>,
    /// Where `ensure_path` materializes in-memory payloads
    pub tmp_dir: Option<PathBuf>,
    /// Hard cap on inbound content, checked before it is buffered
    pub max_upload_size_bytes: u64,
}

/// Settings of the built-in `image` policy
#[derive(Clone, Debug)]
pub struct ImagePolicyConfig {
    pub max_file_size_bytes: u64,
    pub allowed_content_types: Vec<String>,
    pub remove_exif: bool,
    pub path: String,
    pub thumbnail_width: u32,
    pub thumbnail_height: u32,
    pub thumbnail_path: String,
}

/// Settings of the built-in `document` policy
#[derive(Clone, Debug)]
pub struct DocumentPolicyConfig {
    pub max_file_size_bytes: u64,
    pub allowed_content_types: Vec<String>,
    pub path: String,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub environment: String,
    pub storage: StorageConfig,
    /// Names of the built-in policies to register
    pub policies: Vec<String>,
    pub image: ImagePolicyConfig,
    pub document: DocumentPolicyConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        Self::from_vars(|key| env::var(key).ok())
    }

    pub fn from_vars<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = lookup("ENVIRONMENT").unwrap_or_else(|| "development".to_string());

        let backend = match lookup("STORAGE_BACKEND") {
            Some(value) => value.parse::<StorageBackend>()?,
            None => StorageBackend::Local,
        };

        let max_file_size_mb = lookup("MAX_FILE_SIZE_MB")
            .unwrap_or_else(|| MAX_FILE_SIZE_MB.to_string())
            .parse::<u64>()
            .unwrap_or(MAX_FILE_SIZE_MB);

        let (thumbnail_width, thumbnail_height) = match lookup("THUMBNAIL_SIZE") {
            Some(value) => parse_dimensions(&value).ok_or_else(|| {
                anyhow::anyhow!("THUMBNAIL_SIZE must look like WIDTHxHEIGHT, got '{}'", value)
            })?,
            None => THUMBNAIL_SIZE,
        };

        let image = ImagePolicyConfig {
            max_file_size_bytes: max_file_size_mb * BYTES_PER_MB,
            allowed_content_types: split_list(
                &lookup("ALLOWED_CONTENT_TYPES")
                    .unwrap_or_else(|| "image/jpeg,image/png,image/gif,image/webp".to_string()),
            ),
            remove_exif: lookup("REMOVE_EXIF")
                .map(|v| v.parse::<bool>().unwrap_or(true))
                .unwrap_or(true),
            path: lookup("IMAGE_PATH").unwrap_or_default(),
            thumbnail_width,
            thumbnail_height,
            thumbnail_path: lookup("THUMBNAIL_PATH").unwrap_or_default(),
        };

        let max_document_size_mb = lookup("MAX_DOCUMENT_SIZE_MB")
            .unwrap_or_else(|| MAX_DOCUMENT_SIZE_MB.to_string())
            .parse::<u64>()
            .unwrap_or(MAX_DOCUMENT_SIZE_MB);

        let document = DocumentPolicyConfig {
            max_file_size_bytes: max_document_size_mb * BYTES_PER_MB,
            allowed_content_types: split_list(
                &lookup("DOCUMENT_ALLOWED_CONTENT_TYPES").unwrap_or_else(|| {
                    "application/pdf,text/plain,text/csv,text/markdown,application/json".to_string()
                }),
            ),
            path: lookup("DOCUMENT_PATH").unwrap_or_else(|| "documents".to_string()),
        };

        // Defaults to the largest per-policy limit
        let max_upload_size_mb = lookup("MAX_UPLOAD_SIZE_MB")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or_else(|| max_file_size_mb.max(max_document_size_mb));
        let storage = StorageConfig {
            backend,
            local_storage_path: lookup("LOCAL_STORAGE_PATH")
                .unwrap_or_else(|| "./storage".to_string()),
            local_storage_base_url: lookup("LOCAL_STORAGE_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .filter(|url| !url.is_empty()),
            schemes: split_list(
                &lookup("STORAGE_SCHEMES").unwrap_or_else(|| "uploads".to_string()),
            ),
            tmp_dir: lookup("UPLOAD_TMP_DIR")
                .filter(|dir| !dir.trim().is_empty())
                .map(PathBuf::from),
            max_upload_size_bytes: max_upload_size_mb * BYTES_PER_MB,
        };

        let config = Config {
            environment,
            storage,
            policies: split_list(
                &lookup("POLICIES").unwrap_or_else(|| "image,document".to_string()),
            ),
            image,
            document,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn is_production(&self) -> bool {
        matches!(
            self.environment.to_lowercase().as_str(),
            "production" | "prod"
        )
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.storage.schemes.is_empty() {
            return Err(anyhow::anyhow!("STORAGE_SCHEMES must name at least one scheme"));
        }
        for (i, scheme) in self.storage.schemes.iter().enumerate() {
            if self.storage.schemes[..i].contains(scheme) {
                return Err(anyhow::anyhow!(
                    "STORAGE_SCHEMES lists '{}' more than once",
                    scheme
                ));
            }
        }

        if self.storage.backend == StorageBackend::Local
            && self.storage.local_storage_path.trim().is_empty()
        {
            return Err(anyhow::anyhow!(
                "LOCAL_STORAGE_PATH must be set when using local storage backend"
            ));
        }

        if self.image.max_file_size_bytes == 0 {
            return Err(anyhow::anyhow!("MAX_FILE_SIZE_MB must be greater than zero"));
        }
        if self.document.max_file_size_bytes == 0 {
            return Err(anyhow::anyhow!(
                "MAX_DOCUMENT_SIZE_MB must be greater than zero"
            ));
        }
        if self.storage.max_upload_size_bytes == 0 {
            return Err(anyhow::anyhow!("MAX_UPLOAD_SIZE_MB must be greater than zero"));
        }
        if self.image.thumbnail_width == 0 || self.image.thumbnail_height == 0 {
            return Err(anyhow::anyhow!("THUMBNAIL_SIZE dimensions must be non-zero"));
        }

        Ok(())
    }
}

/// Comma-separated list, trimmed and lower-cased, blanks dropped.
fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_dimensions(value: &str) -> Option<(u32, u32)> {
    let (w, h) = value.trim().to_lowercase().split_once('x').map(|(w, h)| {
        (w.trim().parse::<u32>(), h.trim().parse::<u32>())
    })?;
    Some((w.ok()?, h.ok()?))
}
