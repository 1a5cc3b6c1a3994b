//! Installed-plugin persistence.
//!
//! The remote collection holds `{manifest, code}` records. Builtin plugins
//! are never written to it.

use async_trait::async_trait;
use nimbus_config::PersistenceConfig;
use nimbus_core::{NimbusError, NimbusResult, PluginId};
use nimbus_plugin_api::StoredPlugin;
use parking_lot::RwLock;
use reqwest::{Client, StatusCode};
use std::collections::BTreeMap;
use tracing::debug;

const SERVICE: &str = "plugin-store";

/// Backing store for installed plugins.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PluginStore: Send + Sync {
    /// Lists every stored plugin, in install order where the store keeps one.
    async fn list(&self) -> NimbusResult<Vec<StoredPlugin>>;

    /// Stores a plugin, replacing any record with the same id.
    async fn save(&self, plugin: &StoredPlugin) -> NimbusResult<()>;

    /// Deletes a stored plugin. Deleting an unknown id is not an error.
    async fn delete(&self, id: &PluginId) -> NimbusResult<()>;
}

/// [`PluginStore`] backed by a REST collection:
/// `GET {base}`, `POST {base}` and `DELETE {base}/{id}`.
pub struct HttpPluginStore {
    client: Client,
    base_url: String,
}

impl HttpPluginStore {
    pub fn new(config: &PersistenceConfig) -> NimbusResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| NimbusError::Internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self::with_client(client, &config.base_url))
    }

    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, id: &PluginId) -> String {
        format!("{}/{}", self.base_url, id)
    }
}

#[async_trait]
impl PluginStore for HttpPluginStore {
    async fn list(&self) -> NimbusResult<Vec<StoredPlugin>> {
        debug!(url = %self.base_url, "Fetching installed plugins");

        let response = self
            .client
            .get(&self.base_url)
            .send()
            .await
            .map_err(|e| NimbusError::external(SERVICE, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_http_error(status, &body));
        }

        response
            .json()
            .await
            .map_err(|e| NimbusError::Internal(format!("JSON parse error: {e}")))
    }

    async fn save(&self, plugin: &StoredPlugin) -> NimbusResult<()> {
        debug!(plugin_id = %plugin.manifest.id, "Persisting plugin");

        let response = self
            .client
            .post(&self.base_url)
            .json(plugin)
            .send()
            .await
            .map_err(|e| NimbusError::external(SERVICE, e))?;

        ensure_success(response).await
    }

    async fn delete(&self, id: &PluginId) -> NimbusResult<()> {
        debug!(plugin_id = %id, "Deleting persisted plugin");

        let response = self
            .client
            .delete(self.url(id))
            .send()
            .await
            .map_err(|e| NimbusError::external(SERVICE, e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        ensure_success(response).await
    }
}

async fn ensure_success(response: reqwest::Response) -> NimbusResult<()> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    Err(map_http_error(status, &body))
}

fn map_http_error(status: StatusCode, body: &str) -> NimbusError {
    match status {
        StatusCode::BAD_REQUEST => NimbusError::Validation(body.to_string()),
        StatusCode::CONFLICT => NimbusError::Conflict(body.to_string()),
        _ => NimbusError::external(SERVICE, format!("HTTP error {status}: {body}")),
    }
}

/// In-process [`PluginStore`] used when remote persistence is disabled.
#[derive(Debug, Default)]
pub struct MemoryPluginStore {
    plugins: RwLock<BTreeMap<u64, StoredPlugin>>,
}

impl MemoryPluginStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populates the store, keeping the given order.
    #[must_use]
    pub fn with_plugins(plugins: impl IntoIterator<Item = StoredPlugin>) -> Self {
        let store = Self::new();
        {
            let mut map = store.plugins.write();
            for (seq, plugin) in plugins.into_iter().enumerate() {
                map.insert(seq as u64, plugin);
            }
        }
        store
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.plugins.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plugins.read().is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.plugins.read().values().any(|p| p.manifest.id == id)
    }
}

#[async_trait]
impl PluginStore for MemoryPluginStore {
    async fn list(&self) -> NimbusResult<Vec<StoredPlugin>> {
        Ok(self.plugins.read().values().cloned().collect())
    }

    async fn save(&self, plugin: &StoredPlugin) -> NimbusResult<()> {
        let mut map = self.plugins.write();
        let existing = map
            .iter()
            .find(|(_, p)| p.manifest.id == plugin.manifest.id)
            .map(|(seq, _)| *seq);
        let seq = existing.unwrap_or_else(|| map.keys().next_back().map_or(0, |last| last + 1));
        map.insert(seq, plugin.clone());
        Ok(())
    }

    async fn delete(&self, id: &PluginId) -> NimbusResult<()> {
        self.plugins.write().retain(|_, p| p.manifest.id != id.as_str());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nimbus_plugin_api::PluginManifest;

    fn stored(id: &str) -> StoredPlugin {
        StoredPlugin {
            manifest: PluginManifest::new(id, id, "1.0.0"),
            code: "(module)".to_string(),
        }
    }

    #[test]
    fn test_url_construction() {
        let store = HttpPluginStore::with_client(Client::new(), "http://localhost:3000/api/plugins/");
        assert_eq!(
            store.url(&PluginId::new("p1")),
            "http://localhost:3000/api/plugins/p1"
        );
    }

    #[test]
    fn test_map_http_error() {
        assert!(matches!(
            map_http_error(StatusCode::BAD_REQUEST, "bad"),
            NimbusError::Validation(_)
        ));
        assert!(matches!(
            map_http_error(StatusCode::INTERNAL_SERVER_ERROR, "down"),
            NimbusError::ExternalService { .. }
        ));
    }

    #[tokio::test]
    async fn test_memory_store_keeps_order_and_replaces() {
        let store = MemoryPluginStore::with_plugins([stored("b"), stored("a")]);
        store.save(&stored("c")).await.unwrap();

        let mut replacement = stored("b");
        replacement.code = "(module $v2)".to_string();
        store.save(&replacement).await.unwrap();

        let ids: Vec<_> = store.list().await.unwrap().into_iter().map(|p| p.manifest.id).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
        assert_eq!(store.list().await.unwrap()[0].code, "(module $v2)");

        store.delete(&PluginId::new("a")).await.unwrap();
        store.delete(&PluginId::new("missing")).await.unwrap();
        assert_eq!(store.len(), 2);
        assert!(!store.contains("a"));
    }
}
