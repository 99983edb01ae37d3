pub mod api;
pub mod auth;
pub mod backend;
pub mod cli;
pub mod clock;
pub mod config;
pub mod editor;
pub mod models;
pub mod storage;
pub mod utils;

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::warn;

use crate::api::assets::extract_file_id;
use crate::api::{ApiError, AssetGateway, ContentGateway};
use crate::auth::{SessionStore, TokenManager};
use crate::backend::{create_backend, Backend};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::editor::{CollectionEditor, SingletonEditor};
use crate::models::{Project, Record};
use crate::storage::{ClientStore, FileStore};

/// Everything the admin screens need, wired around one token manager.
pub struct AdminClient {
    config: Config,
    session: SessionStore,
    content: ContentGateway,
    assets: AssetGateway,
}

impl AdminClient {
    /// Build the client for `config` with the system clock and file storage
    pub fn from_config(config: Config) -> Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store = FileStore::in_dir(&config.session.data_dir)
            .context("Failed to open session storage")?;
        let backend = create_backend(&config, clock.clone())?;

        Ok(Self::with_parts(config, backend, Arc::new(store), clock))
    }

    pub fn with_parts(
        config: Config,
        backend: Arc<dyn Backend>,
        store: Arc<dyn ClientStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let tokens = TokenManager::new(store, backend, clock, config.session.refresh_buffer_ms);
        let content = ContentGateway::new(tokens.clone());
        let assets = AssetGateway::new(tokens.clone(), &config.backend, &config.storage);

        Self {
            session: SessionStore::new(tokens),
            content,
            assets,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn tokens(&self) -> &TokenManager {
        self.session.tokens()
    }

    pub fn content(&self) -> &ContentGateway {
        &self.content
    }

    pub fn assets(&self) -> &AssetGateway {
        &self.assets
    }

    pub fn collection_editor<T: Record>(&self) -> CollectionEditor<T> {
        CollectionEditor::new(self.content.clone())
    }

    pub fn singleton_editor<T: Record>(&self) -> SingletonEditor<T> {
        SingletonEditor::new(self.content.clone())
    }

    /// Delete a project together with the uploaded screenshots it links to.
    ///
    /// Image cleanup is best-effort and skips external URLs. Returns how many
    /// images were removed.
    pub async fn delete_project(&self, id: &str) -> Result<usize, ApiError> {
        let project = self.content.get::<Project>(id).await?;
        self.content.delete::<Project>(id).await?;

        let mut removed = 0;
        for url in project.record.image_urls() {
            if extract_file_id(url).is_none() {
                continue;
            }
            match self.assets.delete_by_url(url).await {
                Ok(()) => removed += 1,
                Err(e) => warn!(project = id, url, error = %e, "Failed to delete project image"),
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Upload;
    use crate::backend::MemoryBackend;
    use crate::clock::ManualClock;
    use crate::models::{About, Collection};
    use crate::storage::MemoryStore;

    #[tokio::test]
    async fn test_client_end_to_end() {
        let config = Config::default();
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let backend = Arc::new(MemoryBackend::from_config(&config.backend.memory, clock.clone()));
        let store = Arc::new(MemoryStore::new());
        let client = AdminClient::with_parts(config, backend.clone(), store, clock.clone());

        client.session().login("admin@localhost", "admin").await.unwrap();

        let mut about = client.singleton_editor::<About>();
        about.load().await.unwrap();
        about.edit(|a| a.title = "About me".to_string());
        about.save().await.unwrap();

        // Outlive the access token; the next call refreshes transparently
        clock.advance(16 * 60 * 1000);
        let mut projects = client.collection_editor::<Project>();
        projects.load().await.unwrap();
        let id = projects
            .add(Project {
                title: "Folio".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(backend.calls().refresh(), 1);
        assert_eq!(projects.selected_id(), Some(id.as_str()));

        client.session().logout().await;
        let err = client.content().list::<Project>().await.unwrap_err();
        assert_eq!(err.code(), crate::api::ErrorCode::Unauthenticated);
    }

    #[tokio::test]
    async fn test_delete_project_removes_its_images() {
        let config = Config::default();
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let backend = Arc::new(MemoryBackend::from_config(&config.backend.memory, clock.clone()));
        let store = Arc::new(MemoryStore::new());
        let client = AdminClient::with_parts(config, backend.clone(), store, clock);
        client.session().login("admin@localhost", "admin").await.unwrap();

        let screenshot = Upload::new("desktop.png", "image/png", &b"png"[..]);
        let asset = client.assets().upload(&screenshot).await.unwrap();
        let project = client
            .content()
            .create(&Project {
                title: "Atlas".to_string(),
                image_pc: asset.url,
                image_mobile: "https://cdn.example.com/mobile.png".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        let removed = client.delete_project(project.id().unwrap()).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(backend.file_count(), 0);
        assert_eq!(backend.document_count(Collection::Projects), 0);
    }
}
