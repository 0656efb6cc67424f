//! Variant derivation for files already held by a store.
//!
//! Every profile starts from the same source context, so one profile's output
//! never feeds another. Variants are stored as `{stem}_{suffix}.{ext}` under
//! the policy path joined with the profile's own path. `ext` comes from the
//! profile's [`VariantExtension`](crate::policy::VariantExtension) rule.
//! Regenerating replaces the stored variant.

use std::sync::Arc;
use std::time::Instant;
use stowage_core::constants::VARIANT_SUFFIX_JOINER;
use stowage_core::uri::join_group;
use stowage_core::{
    FileError, FileResult, FileSource, FileUri, IntoFileUri, ProvedContext, VariantRecord,
};
use stowage_storage::StorageRegistry;

use crate::catalog::{PolicyCatalog, ResolvedPolicy};
use crate::evaluator::Evaluator;
use crate::hydrator::{stored_extension, Hydrator};
use crate::persist::persist;
use crate::policy::{Capability, PolicyOptions, VariantProfile};

#[derive(Debug, Clone)]
pub struct Variator {
    catalog: Arc<PolicyCatalog>,
    storage: Arc<StorageRegistry>,
    hydrator: Hydrator,
}

impl Variator {
    pub fn new(
        catalog: Arc<PolicyCatalog>,
        storage: Arc<StorageRegistry>,
        hydrator: Hydrator,
    ) -> Self {
        Self {
            catalog,
            storage,
            hydrator,
        }
    }

    /// Derive every variant the resolved policy declares for the file at `uri`.
    ///
    /// Returns one record per profile, in declaration order. The first failing
    /// profile aborts the call; variants already written stay in the store.
    #[tracing::instrument(skip(self, uri, options))]
    pub async fn generate(
        &self,
        uri: impl IntoFileUri + Send,
        options: PolicyOptions,
    ) -> FileResult<Vec<VariantRecord>> {
        let start = Instant::now();

        // 1. Proved context from what the store holds
        let uri = self.storage.normalize_uri(uri)?;
        if let Some(tag) = uri.variant() {
            return Err(FileError::invalid_uri(format!(
                "{} refers to variant '{}'; variants are derived from source files only",
                uri, tag
            )));
        }
        let source = self.load(&uri).await?;

        // 2. Variants policy for the store and the stored media type
        let resolved = self.resolve(&uri, &source, options)?;
        let variants = resolved.variants()?;
        let base_path = variants.path(resolved.options());
        let profiles = variants.profiles(resolved.options());

        // 3 + 4. Each profile: evaluate from the source, then persist
        let source_extension = source.extension().unwrap_or_default().to_string();
        let mut records = Vec::with_capacity(profiles.len());
        for profile in profiles {
            // The suffix must be usable as a URI variant tag
            uri.with_variant(&profile.suffix)?;
            let suffix = profile.suffix.clone();
            let extension = profile.extension.resolve(source.mime(), &source_extension);
            let group = join_group([
                base_path.as_str(),
                profile.path.as_deref().unwrap_or(""),
            ]);

            let derived = self.derive(&source, profile).await?;
            // `locate` finds variants by the profile's rule, not by content
            if derived.extension().unwrap_or_default() != extension {
                return Err(FileError::invalid_state(format!(
                    "variant '{}' of {} came out as '{}' but its profile stores '.{}'",
                    suffix,
                    uri,
                    derived.filename(),
                    extension
                )));
            }
            let filename = variant_filename(source.name(), &suffix, Some(&extension));
            let target = FileUri::new(uri.store(), group.as_deref(), &filename)?;
            let record = persist(&self.storage, &self.hydrator, derived, &target).await?;

            tracing::debug!(variant = %suffix, uri = %record.uri, "Variant stored");
            records.push(VariantRecord {
                file: record,
                variant: suffix,
            });
        }

        tracing::info!(
            uri = %uri,
            policy = %resolved.name(),
            variants = records.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Variants generated"
        );
        Ok(records)
    }

    /// Resolve a variant reference (`store://group/name~suffix`) to the URI
    /// the variant is stored under. A plain URI is returned as is.
    ///
    /// Fails with `NotFound` when the policy declares no such profile or the
    /// variant has not been generated.
    pub async fn locate(
        &self,
        uri: impl IntoFileUri + Send,
        options: PolicyOptions,
    ) -> FileResult<FileUri> {
        let uri = self.storage.normalize_uri(uri)?;
        let Some(tag) = uri.variant().map(str::to_string) else {
            return Ok(uri);
        };

        let source_uri = uri.without_variant();
        let stats = self.storage.stats(&source_uri).await?;
        let resolved = self
            .catalog
            .resolve(Capability::Variants, uri.store(), &stats.mime, options)?;
        let variants = resolved.variants()?;
        let profile = variants
            .profiles(resolved.options())
            .into_iter()
            .find(|p| p.suffix == tag)
            .ok_or_else(|| {
                FileError::NotFound(format!(
                    "policy '{}' declares no variant '{}'",
                    resolved.name(),
                    tag
                ))
            })?;

        let extension = profile
            .extension
            .resolve(&stats.mime, &stored_extension(&stats)?);
        let group = join_group([
            variants.path(resolved.options()).as_str(),
            profile.path.as_deref().unwrap_or(""),
        ]);
        let target = FileUri::new(
            uri.store(),
            group.as_deref(),
            &variant_filename(&stats.name, &tag, Some(&extension)),
        )?;

        if !self.storage.exists(&target).await? {
            return Err(FileError::NotFound(format!(
                "variant '{}' of {} has not been generated",
                tag, source_uri
            )));
        }
        Ok(target)
    }

    async fn load(&self, uri: &FileUri) -> FileResult<ProvedContext> {
        let stats = self.storage.stats(uri).await?;
        let data = self.storage.read(uri).await?;
        self.hydrator.from_stats(&stats, FileSource::from_bytes(data))
    }

    fn resolve(
        &self,
        uri: &FileUri,
        source: &ProvedContext,
        options: PolicyOptions,
    ) -> FileResult<ResolvedPolicy> {
        self.catalog
            .resolve(Capability::Variants, uri.store(), source.mime(), options)
    }

    /// Run one profile's stages against a fresh clone of the source.
    async fn derive(
        &self,
        source: &ProvedContext,
        profile: VariantProfile,
    ) -> FileResult<ProvedContext> {
        let context = source.clone();
        tokio::task::spawn_blocking(move || Evaluator::evaluate(&profile.pipeline, context))
            .await
            .map_err(|e| FileError::from(anyhow::anyhow!("variant task failed: {}", e)))?
    }
}

/// `{stem}_{suffix}.{ext}`, or `{stem}_{suffix}` without an extension.
fn variant_filename(stem: &str, suffix: &str, extension: Option<&str>) -> String {
    match extension.filter(|ext| !ext.is_empty()) {
        Some(ext) => format!("{}{}{}.{}", stem, VARIANT_SUFFIX_JOINER, suffix, ext),
        None => format!("{}{}{}", stem, VARIANT_SUFFIX_JOINER, suffix),
    }
}
