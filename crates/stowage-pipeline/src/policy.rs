//! Policy capability traits and the in-code policy builder.
//!
//! A policy declares the media types it handles, an optional group tag and
//! one or more capabilities. The ingress capability governs how new files are
//! proved, filtered, transformed, named and placed. The variants capability
//! declares the profiles derived from an already stored file.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use stowage_core::constants::WILDCARD_GROUP;
use stowage_core::ProvedContext;

use crate::evaluator::Pipeline;
use crate::filters;
use crate::strategy::{ProvingStrategy, SignatureStrategy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Ingress,
    Variants,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Ingress => f.write_str("ingress"),
            Capability::Variants => f.write_str("variants"),
        }
    }
}

/// Per-call options passed to `save`/`generate` and carried by a resolved
/// policy.
///
/// Understood keys: `path` (base path override), `max_size` (extra size
/// filter, bytes), `name` (stored base name), `group` (policy group tag),
/// `overwrite` (let `save` replace an existing key).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicyOptions(BTreeMap<String, serde_json::Value>);

impl PolicyOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(|v| v.as_str())
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(|v| v.as_u64())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| v.as_bool())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// How the Filer names a stored file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Naming {
    /// The sanitized declared name
    #[default]
    Original,
    /// A random UUID v4 base name
    Unique,
}

pub trait Policy: Send + Sync {
    fn name(&self) -> &str;

    /// Group tag; `*` matches any group.
    fn group(&self) -> &str {
        WILDCARD_GROUP
    }

    /// Media types handled, as `type/subtype`, `type/*` or `*/*`.
    fn media_types(&self) -> &[String];

    fn ingress(&self) -> Option<&dyn IngressPolicy> {
        None
    }

    fn variants(&self) -> Option<&dyn VariantsPolicy> {
        None
    }

    fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::Ingress => self.ingress().is_some(),
            Capability::Variants => self.variants().is_some(),
        }
    }
}

pub trait IngressPolicy: Send + Sync {
    /// Target path under the store, before any `path` option override.
    fn path(&self, options: &PolicyOptions) -> String;

    /// Strategy used to prove a file claiming `media_type`.
    fn strategy(&self, media_type: &str) -> Arc<dyn ProvingStrategy>;

    fn pipeline(&self, options: &PolicyOptions) -> Pipeline<ProvedContext>;

    fn naming(&self) -> Naming {
        Naming::Original
    }
}

pub trait VariantsPolicy: Send + Sync {
    /// Base path of every variant; each profile may append its own.
    fn path(&self, options: &PolicyOptions) -> String;

    fn profiles(&self, options: &PolicyOptions) -> Vec<VariantProfile>;
}

/// Extension a profile's output is stored with, as a function of the
/// source. `generate` and `locate` both name variants by it.
#[derive(Clone, Default)]
pub enum VariantExtension {
    /// The source's extension; derived from its media type when the stored
    /// name has none
    #[default]
    Source,
    Fixed(String),
    /// Computed from the source media type and extension
    Derived(fn(&str, &str) -> String),
}

impl fmt::Debug for VariantExtension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariantExtension::Source => f.write_str("Source"),
            VariantExtension::Fixed(ext) => f.debug_tuple("Fixed").field(ext).finish(),
            VariantExtension::Derived(_) => f.write_str("Derived"),
        }
    }
}

impl VariantExtension {
    pub fn resolve(&self, media_type: &str, extension: &str) -> String {
        match self {
            VariantExtension::Source => extension.to_string(),
            VariantExtension::Fixed(fixed) => fixed.clone(),
            VariantExtension::Derived(derive) => derive(media_type, extension),
        }
    }
}

/// One derived artifact: own suffix, sub-path and stages.
#[derive(Debug, Clone)]
pub struct VariantProfile {
    pub suffix: String,
    pub path: Option<String>,
    pub pipeline: Pipeline<ProvedContext>,
    /// Must agree with what the pipeline produces; `generate` rejects an
    /// output whose extension differs.
    pub extension: VariantExtension,
}

impl VariantProfile {
    pub fn new(suffix: impl Into<String>) -> Self {
        Self {
            suffix: suffix.into(),
            path: None,
            pipeline: Pipeline::new(),
            extension: VariantExtension::Source,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_pipeline(mut self, pipeline: Pipeline<ProvedContext>) -> Self {
        self.pipeline = pipeline;
        self
    }

    /// Output always stored as `.{extension}`.
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = VariantExtension::Fixed(extension.into());
        self
    }

    pub fn with_extension_rule(mut self, rule: VariantExtension) -> Self {
        self.extension = rule;
        self
    }
}

/// Ingress capability declared in code.
#[derive(Clone)]
pub struct StaticIngress {
    strategy: Arc<dyn ProvingStrategy>,
    path: String,
    pipeline: Pipeline<ProvedContext>,
    naming: Naming,
}

impl StaticIngress {
    pub fn new(strategy: impl ProvingStrategy + 'static) -> Self {
        Self {
            strategy: Arc::new(strategy),
            path: String::new(),
            pipeline: Pipeline::new(),
            naming: Naming::Original,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_pipeline(mut self, pipeline: Pipeline<ProvedContext>) -> Self {
        self.pipeline = pipeline;
        self
    }

    pub fn with_naming(mut self, naming: Naming) -> Self {
        self.naming = naming;
        self
    }
}

impl Default for StaticIngress {
    fn default() -> Self {
        Self::new(SignatureStrategy::new())
    }
}

impl IngressPolicy for StaticIngress {
    fn path(&self, options: &PolicyOptions) -> String {
        options
            .get_str("path")
            .map(str::to_string)
            .unwrap_or_else(|| self.path.clone())
    }

    fn strategy(&self, _media_type: &str) -> Arc<dyn ProvingStrategy> {
        Arc::clone(&self.strategy)
    }

    fn pipeline(&self, options: &PolicyOptions) -> Pipeline<ProvedContext> {
        match options.get_u64("max_size") {
            Some(max) => self.pipeline.clone().prepend_filter(filters::max_size(max)),
            None => self.pipeline.clone(),
        }
    }

    fn naming(&self) -> Naming {
        self.naming
    }
}

/// Variants capability declared in code.
#[derive(Debug, Clone, Default)]
pub struct StaticVariants {
    path: String,
    profiles: Vec<VariantProfile>,
}

impl StaticVariants {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_profile(mut self, profile: VariantProfile) -> Self {
        self.profiles.push(profile);
        self
    }
}

impl VariantsPolicy for StaticVariants {
    fn path(&self, options: &PolicyOptions) -> String {
        options
            .get_str("path")
            .map(str::to_string)
            .unwrap_or_else(|| self.path.clone())
    }

    fn profiles(&self, _options: &PolicyOptions) -> Vec<VariantProfile> {
        self.profiles.clone()
    }
}

/// A policy assembled from parts.
///
/// ```
/// use stowage_pipeline::{filters, Pipeline, StaticIngress, StaticPolicy, SignatureStrategy};
///
/// let policy = StaticPolicy::new("avatars")
///     .with_group("profiles")
///     .with_media_types(["image/jpeg", "image/png"])
///     .with_ingress(
///         StaticIngress::new(SignatureStrategy::new())
///             .with_path("avatars")
///             .with_pipeline(Pipeline::new().filter(filters::max_size(1024 * 1024))),
///     );
/// ```
#[derive(Clone)]
pub struct StaticPolicy {
    name: String,
    group: String,
    media_types: Vec<String>,
    ingress: Option<StaticIngress>,
    variants: Option<StaticVariants>,
}

impl StaticPolicy {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            group: WILDCARD_GROUP.to_string(),
            media_types: Vec::new(),
            ingress: None,
            variants: None,
        }
    }

    /// Empty means the wildcard group.
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        let group = group.into().trim().to_lowercase();
        self.group = if group.is_empty() {
            WILDCARD_GROUP.to_string()
        } else {
            group
        };
        self
    }

    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_types.push(media_type.into());
        self
    }

    pub fn with_media_types<I, S>(mut self, media_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.media_types
            .extend(media_types.into_iter().map(Into::into));
        self
    }

    pub fn with_ingress(mut self, ingress: StaticIngress) -> Self {
        self.ingress = Some(ingress);
        self
    }

    pub fn with_variants(mut self, variants: StaticVariants) -> Self {
        self.variants = Some(variants);
        self
    }
}

impl fmt::Debug for StaticPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticPolicy")
            .field("name", &self.name)
            .field("group", &self.group)
            .field("media_types", &self.media_types)
            .field("ingress", &self.ingress.is_some())
            .field("variants", &self.variants.is_some())
            .finish()
    }
}

impl Policy for StaticPolicy {
    fn name(&self) -> &str {
        &self.name
    }

    fn group(&self) -> &str {
        &self.group
    }

    fn media_types(&self) -> &[String] {
        &self.media_types
    }

    fn ingress(&self) -> Option<&dyn IngressPolicy> {
        self.ingress.as_ref().map(|i| i as &dyn IngressPolicy)
    }

    fn variants(&self) -> Option<&dyn VariantsPolicy> {
        self.variants.as_ref().map(|v| v as &dyn VariantsPolicy)
    }
}
