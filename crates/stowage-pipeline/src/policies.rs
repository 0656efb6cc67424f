//! Built-in policies configured from [`Config`].
//!
//! - `image`: raster images proved by decoding, size and type limits, optional
//!   EXIF removal, one `thumb` variant.
//! - `document`: documents and text proved by signature, size and type limits.

use std::sync::Arc;
use stowage_core::{Config, DocumentPolicyConfig, FileResult};

use crate::catalog::PolicyCatalog;
use crate::evaluator::Pipeline;
use crate::filters;
use crate::policy::{Policy, StaticIngress, StaticPolicy};
use crate::strategy::SignatureStrategy;

pub const IMAGE_POLICY: &str = "image";
pub const DOCUMENT_POLICY: &str = "document";
pub const THUMBNAIL_SUFFIX: &str = "thumb";

#[cfg(feature = "image")]
pub fn image_policy(config: &stowage_core::ImagePolicyConfig) -> StaticPolicy {
    use crate::policy::{StaticVariants, VariantExtension, VariantProfile};
    use crate::strategy::ImageStrategy;
    use crate::transformers;

    let mut pipeline = Pipeline::new()
        .filter(filters::max_size(config.max_file_size_bytes))
        .filter(filters::allowed_media_types(&config.allowed_content_types));
    if config.remove_exif {
        pipeline = pipeline.transform(transformers::strip_exif());
    }

    let thumb = VariantProfile::new(THUMBNAIL_SUFFIX)
        .with_path(config.thumbnail_path.clone())
        .with_extension_rule(VariantExtension::Derived(transformers::thumbnail_extension))
        .with_pipeline(
            Pipeline::new()
                .filter(filters::allowed_media_types(&config.allowed_content_types))
                .transform(transformers::thumbnail(
                    config.thumbnail_width,
                    config.thumbnail_height,
                ))
                .transform(transformers::ensure_hash()),
        );

    StaticPolicy::new(IMAGE_POLICY)
        .with_media_types(config.allowed_content_types.iter().cloned())
        .with_ingress(
            StaticIngress::new(ImageStrategy::new().with_allowed(&config.allowed_content_types))
                .with_path(config.path.clone())
                .with_pipeline(pipeline),
        )
        .with_variants(StaticVariants::new().with_path(config.path.clone()).with_profile(thumb))
}

pub fn document_policy(config: &DocumentPolicyConfig) -> StaticPolicy {
    let pipeline = Pipeline::new()
        .filter(filters::min_size(1))
        .filter(filters::max_size(config.max_file_size_bytes))
        .filter(filters::allowed_media_types(&config.allowed_content_types));

    StaticPolicy::new(DOCUMENT_POLICY)
        .with_media_types(config.allowed_content_types.iter().cloned())
        .with_ingress(
            StaticIngress::new(SignatureStrategy::new().with_allowed(&config.allowed_content_types))
                .with_path(config.path.clone())
                .with_pipeline(pipeline),
        )
}

/// Catalog with factories for the built-in policies and the ones named in
/// `config.policies` registered.
pub fn builtin_catalog(config: &Config) -> FileResult<PolicyCatalog> {
    let mut catalog = PolicyCatalog::new();

    #[cfg(feature = "image")]
    {
        let image = config.image.clone();
        catalog.register_factory(IMAGE_POLICY, move || {
            Ok(Arc::new(image_policy(&image)) as Arc<dyn Policy>)
        });
    }
    let document = config.document.clone();
    catalog.register_factory(DOCUMENT_POLICY, move || {
        Ok(Arc::new(document_policy(&document)) as Arc<dyn Policy>)
    });

    catalog.register_policies(config.policies.iter().map(String::as_str))?;
    tracing::info!(
        policies = ?config.policies,
        "Policy catalog ready"
    );
    Ok(catalog)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{Capability, PolicyOptions};
    use stowage_core::FileError;

    fn config(vars: &[(&str, &str)]) -> Config {
        let vars: std::collections::HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_vars(|key| vars.get(key).cloned()).unwrap()
    }

    #[test]
    fn test_document_policy_resolves() {
        let catalog = builtin_catalog(&config(&[("POLICIES", "document")])).unwrap();
        let resolved = catalog
            .resolve(Capability::Ingress, "uploads", "application/pdf", PolicyOptions::new())
            .unwrap();
        assert_eq!(resolved.name(), DOCUMENT_POLICY);
        assert_eq!(resolved.ingress().unwrap().path(resolved.options()), "documents");
        assert!(resolved.variants().is_err());
    }

    #[test]
    fn test_unknown_policy_name() {
        let err = builtin_catalog(&config(&[("POLICIES", "document,video")])).unwrap_err();
        assert!(matches!(
            err,
            FileError::Configuration(ref m) if m.contains("'video' does not exist")
        ));
    }

    #[cfg(feature = "image")]
    #[test]
    fn test_default_catalog_has_image_variants() {
        let catalog = builtin_catalog(&config(&[])).unwrap();
        assert_eq!(catalog.len(), 2);

        let resolved = catalog
            .resolve(Capability::Variants, "uploads", "image/jpeg", PolicyOptions::new())
            .unwrap();
        let profiles = resolved.variants().unwrap().profiles(resolved.options());
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].suffix, THUMBNAIL_SUFFIX);
    }

    #[cfg(feature = "image")]
    #[test]
    fn test_image_pipeline_honours_exif_setting() {
        let with = image_policy(&config(&[]).image);
        let without = image_policy(&config(&[("REMOVE_EXIF", "false")]).image);
        let opts = PolicyOptions::new();
        assert_eq!(with.ingress().unwrap().pipeline(&opts).transformers().len(), 1);
        assert!(without.ingress().unwrap().pipeline(&opts).transformers().is_empty());
    }
}
