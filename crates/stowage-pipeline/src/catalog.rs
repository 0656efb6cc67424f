//! Policy registry keyed by `(group, media type)`.
//!
//! The catalog is filled once at startup and only read afterwards;
//! registration takes `&mut self`, so sharing it behind an `Arc` freezes it.
//! Every ambiguity is a registration error: duplicate names, duplicate
//! non-wildcard group tags and duplicate keys are all rejected.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use stowage_core::constants::WILDCARD_GROUP;
use stowage_core::{mime, FileError, FileResult};

use crate::policy::{Capability, IngressPolicy, Policy, PolicyOptions, VariantsPolicy};

/// Builds a policy instance by name.
pub type PolicyFactory = Arc<dyn Fn() -> FileResult<Arc<dyn Policy>> + Send + Sync>;

/// What to register: a factory name or a ready instance.
#[derive(Clone)]
pub enum PolicyRef {
    Named(String),
    Instance(Arc<dyn Policy>),
}

impl fmt::Debug for PolicyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyRef::Named(name) => f.debug_tuple("Named").field(name).finish(),
            PolicyRef::Instance(policy) => f.debug_tuple("Instance").field(&policy.name()).finish(),
        }
    }
}

impl From<&str> for PolicyRef {
    fn from(name: &str) -> Self {
        PolicyRef::Named(name.to_string())
    }
}

impl From<String> for PolicyRef {
    fn from(name: String) -> Self {
        PolicyRef::Named(name)
    }
}

impl From<Arc<dyn Policy>> for PolicyRef {
    fn from(policy: Arc<dyn Policy>) -> Self {
        PolicyRef::Instance(policy)
    }
}

/// A registered policy together with the options of one call.
///
/// The policy itself is shared with the catalog; only the options belong to
/// this value.
#[derive(Clone)]
pub struct ResolvedPolicy {
    policy: Arc<dyn Policy>,
    options: PolicyOptions,
    capability: Capability,
}

impl ResolvedPolicy {
    pub fn policy(&self) -> &Arc<dyn Policy> {
        &self.policy
    }

    pub fn name(&self) -> &str {
        self.policy.name()
    }

    pub fn options(&self) -> &PolicyOptions {
        &self.options
    }

    pub fn capability(&self) -> Capability {
        self.capability
    }

    pub fn ingress(&self) -> FileResult<&dyn IngressPolicy> {
        self.policy.ingress().ok_or_else(|| self.missing(Capability::Ingress))
    }

    pub fn variants(&self) -> FileResult<&dyn VariantsPolicy> {
        self.policy.variants().ok_or_else(|| self.missing(Capability::Variants))
    }

    fn missing(&self, capability: Capability) -> FileError {
        FileError::configuration(format!(
            "policy '{}' has no {} capability",
            self.policy.name(),
            capability
        ))
    }
}

impl fmt::Debug for ResolvedPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedPolicy")
            .field("policy", &self.policy.name())
            .field("options", &self.options)
            .field("capability", &self.capability)
            .finish()
    }
}

#[derive(Default)]
pub struct PolicyCatalog {
    factories: BTreeMap<String, PolicyFactory>,
    policies: BTreeMap<String, Arc<dyn Policy>>,
    /// Non-wildcard group tag -> owning policy name
    groups: BTreeMap<String, String>,
    /// (group, media type) -> policy name
    keys: BTreeMap<(String, String), String>,
}

impl PolicyCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a policy available to [`PolicyRef::Named`] registration.
    pub fn register_factory<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> FileResult<Arc<dyn Policy>> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    /// Register one policy. All checks run before anything is inserted, so a
    /// failed registration leaves the catalog unchanged.
    pub fn register_policy(&mut self, policy: impl Into<PolicyRef>) -> FileResult<()> {
        let policy = match policy.into() {
            PolicyRef::Instance(policy) => policy,
            PolicyRef::Named(name) => {
                let factory = self.factories.get(&name).ok_or_else(|| {
                    FileError::configuration(format!("policy class '{}' does not exist", name))
                })?;
                factory()?
            }
        };

        let name = policy.name().to_string();
        if name.trim().is_empty() {
            return Err(FileError::configuration("policy name must not be empty"));
        }
        if self.policies.contains_key(&name) {
            return Err(FileError::configuration(format!(
                "policy '{}' is already registered",
                name
            )));
        }
        if !policy.supports(Capability::Ingress) && !policy.supports(Capability::Variants) {
            return Err(FileError::configuration(format!(
                "policy '{}' declares neither the ingress nor the variants capability",
                name
            )));
        }

        let group = normalize_group(policy.group());
        if group != WILDCARD_GROUP {
            if let Some(owner) = self.groups.get(&group) {
                return Err(FileError::configuration(format!(
                    "group tag '{}' of policy '{}' is already used by policy '{}'",
                    group, name, owner
                )));
            }
        }

        if policy.media_types().is_empty() {
            return Err(FileError::configuration(format!(
                "policy '{}' declares no media types",
                name
            )));
        }
        let mut keys = Vec::with_capacity(policy.media_types().len());
        for declared in policy.media_types() {
            let media_type = normalize_pattern(declared).ok_or_else(|| {
                FileError::configuration(format!(
                    "policy '{}' declares malformed media type '{}'",
                    name, declared
                ))
            })?;
            let key = (group.clone(), media_type);
            if let Some(owner) = self.keys.get(&key) {
                return Err(FileError::configuration(format!(
                    "policy '{}' key '{}/{}' is already registered by policy '{}'",
                    name, key.0, key.1, owner
                )));
            }
            if keys.contains(&key) {
                return Err(FileError::configuration(format!(
                    "policy '{}' declares '{}' twice",
                    name, key.1
                )));
            }
            keys.push(key);
        }

        tracing::debug!(
            policy = %name,
            group = %group,
            media_types = ?policy.media_types(),
            ingress = policy.supports(Capability::Ingress),
            variants = policy.supports(Capability::Variants),
            "Policy registered"
        );

        if group != WILDCARD_GROUP {
            self.groups.insert(group, name.clone());
        }
        for key in keys {
            self.keys.insert(key, name.clone());
        }
        self.policies.insert(name, policy);
        Ok(())
    }

    /// Register several policies in order, stopping at the first failure.
    pub fn register_policies<I, P>(&mut self, policies: I) -> FileResult<()>
    where
        I: IntoIterator<Item = P>,
        P: Into<PolicyRef>,
    {
        for policy in policies {
            self.register_policy(policy)?;
        }
        Ok(())
    }

    /// Resolve the policy for a scheme and a (claimed) media type.
    ///
    /// The group is the `group` option when given, else the scheme. Keys are
    /// tried exactly, in order: `(group, type/subtype)`, `(group, type/*)`,
    /// `(group, */*)`, then the same three under the wildcard group. The
    /// first hit must support `capability`.
    pub fn resolve(
        &self,
        capability: Capability,
        scheme: &str,
        media_type: &str,
        options: PolicyOptions,
    ) -> FileResult<ResolvedPolicy> {
        let group = options
            .get_str("group")
            .map(normalize_group)
            .unwrap_or_else(|| normalize_group(scheme));
        self.resolve_key(capability, &group, media_type, options)
    }

    /// Resolve a selector: `group/type/subtype`, or `type/subtype` for the
    /// wildcard group.
    pub fn resolve_selector(
        &self,
        capability: Capability,
        selector: &str,
        options: PolicyOptions,
    ) -> FileResult<ResolvedPolicy> {
        let parts: Vec<&str> = selector.split('/').collect();
        let (group, media_type) = match parts.as_slice() {
            [kind, subtype] => (WILDCARD_GROUP.to_string(), format!("{}/{}", kind, subtype)),
            [group, kind, subtype] => (normalize_group(group), format!("{}/{}", kind, subtype)),
            _ => {
                return Err(FileError::configuration(format!(
                    "malformed policy selector '{}'",
                    selector
                )))
            }
        };
        self.resolve_key(capability, &group, &media_type, options)
    }

    fn resolve_key(
        &self,
        capability: Capability,
        group: &str,
        media_type: &str,
        options: PolicyOptions,
    ) -> FileResult<ResolvedPolicy> {
        let media_type = mime::normalize(media_type);
        let selector = format!("{}/{}", group, media_type);

        let name = candidates(group, &media_type)
            .into_iter()
            .find_map(|key| self.keys.get(&key))
            .ok_or_else(|| FileError::PolicyNotFound(selector.clone()))?;
        let policy = self.policies.get(name).cloned().ok_or_else(|| {
            FileError::invalid_state(format!("policy '{}' is keyed but not registered", name))
        })?;

        if !policy.supports(capability) {
            return Err(FileError::configuration(format!(
                "policy '{}' resolved for '{}' has no {} capability",
                name, selector, capability
            )));
        }

        tracing::debug!(
            policy = %name,
            selector = %selector,
            capability = %capability,
            "Policy resolved"
        );
        Ok(ResolvedPolicy {
            policy,
            options,
            capability,
        })
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Policy>> {
        self.policies.get(name)
    }

    pub fn policies(&self) -> impl Iterator<Item = &Arc<dyn Policy>> {
        self.policies.values()
    }

    /// Registered keys with their owning policy name, in key order.
    pub fn keys(&self) -> impl Iterator<Item = (&str, &str, &str)> {
        self.keys.iter().map(|((group, media_type), name)| {
            (group.as_str(), media_type.as_str(), name.as_str())
        })
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

impl fmt::Debug for PolicyCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyCatalog")
            .field("factories", &self.factories.keys().collect::<Vec<_>>())
            .field("keys", &self.keys)
            .finish()
    }
}

fn normalize_group(group: &str) -> String {
    let group = group.trim().to_lowercase();
    if group.is_empty() {
        WILDCARD_GROUP.to_string()
    } else {
        group
    }
}

/// Normalize a declared media type pattern; `None` when malformed.
fn normalize_pattern(pattern: &str) -> Option<String> {
    let pattern = mime::normalize(pattern);
    let (kind, subtype) = mime::split(&pattern)?;
    if kind == "*" && subtype != "*" {
        return None;
    }
    Some(pattern)
}

fn candidates(group: &str, media_type: &str) -> Vec<(String, String)> {
    let kind = media_type.split('/').next().unwrap_or(media_type);
    let patterns = [
        media_type.to_string(),
        format!("{}/*", kind),
        "*/*".to_string(),
    ];

    let mut groups = vec![group.to_string()];
    if group != WILDCARD_GROUP {
        groups.push(WILDCARD_GROUP.to_string());
    }

    let mut keys = Vec::with_capacity(groups.len() * patterns.len());
    for g in &groups {
        for p in &patterns {
            let key = (g.clone(), p.clone());
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
    }
    keys
}
