//! Wiring shared by the `stowage` binary: configuration to a ready Filer and
//! Variator.

use serde::Serialize;
use std::sync::Arc;
use stowage_core::Config;
use stowage_pipeline::{builtin_catalog, Filer, Hydrator, PolicyCatalog, Variator};
use stowage_storage::{create_storage, StorageRegistry};

/// Initialize tracing for CLI binaries.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

pub struct App {
    pub catalog: Arc<PolicyCatalog>,
    pub storage: Arc<StorageRegistry>,
    pub filer: Filer,
    pub variator: Variator,
}

impl App {
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let storage = Arc::new(create_storage(config).await?);
        let catalog = Arc::new(builtin_catalog(config)?);
        let hydrator = Hydrator::new(config.storage.tmp_dir.clone())
            .with_max_bytes(config.storage.max_upload_size_bytes);

        Ok(Self {
            filer: Filer::new(catalog.clone(), storage.clone(), hydrator.clone()),
            variator: Variator::new(catalog.clone(), storage.clone(), hydrator),
            catalog,
            storage,
        })
    }

    /// One row per catalog key, in resolution key order.
    pub fn policy_rows(&self) -> Vec<PolicyRow> {
        self.catalog
            .keys()
            .map(|(group, media_type, name)| {
                let policy = self.catalog.get(name);
                PolicyRow {
                    group: group.to_string(),
                    media_type: media_type.to_string(),
                    policy: name.to_string(),
                    ingress: policy.map_or(false, |p| p.ingress().is_some()),
                    variants: policy.map_or(false, |p| p.variants().is_some()),
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyRow {
    pub group: String,
    pub media_type: String,
    pub policy: String,
    pub ingress: bool,
    pub variants: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_vars(|key| vars.get(key).cloned()).unwrap()
    }

    #[tokio::test]
    async fn test_policy_rows() {
        let app = App::from_config(&config(&[
            ("STORAGE_BACKEND", "memory"),
            ("POLICIES", "document"),
            ("DOCUMENT_ALLOWED_CONTENT_TYPES", "application/pdf,text/plain"),
        ]))
        .await
        .unwrap();

        let rows = app.policy_rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].group, "*");
        assert_eq!(rows[0].media_type, "application/pdf");
        assert_eq!(rows[0].policy, "document");
        assert!(rows[0].ingress);
        assert!(!rows[0].variants);
        assert_eq!(rows[1].media_type, "text/plain");
    }

    #[tokio::test]
    async fn test_unknown_policy_fails_startup() {
        let result = App::from_config(&config(&[
            ("STORAGE_BACKEND", "memory"),
            ("POLICIES", "audio"),
        ]))
        .await;
        assert!(result.is_err());
    }
}
