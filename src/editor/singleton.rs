use tracing::info;

use crate::api::{ApiError, ContentGateway};
use crate::models::{Document, Record};

/// Editor for a collection that holds one document (hero, about).
///
/// All edits are staged until [`save`](SingletonEditor::save).
pub struct SingletonEditor<T: Record> {
    gateway: ContentGateway,
    original: Document<T>,
    draft: Document<T>,
    last_error: Option<ApiError>,
}

impl<T: Record> SingletonEditor<T> {
    pub fn new(gateway: ContentGateway) -> Self {
        Self {
            gateway,
            original: Document::default(),
            draft: Document::default(),
            last_error: None,
        }
    }

    /// Load the first document, or start from defaults if there is none
    pub async fn load(&mut self) -> Result<(), ApiError> {
        let result = self.gateway.list::<T>().await;
        let documents = self.track(result)?;

        let document = documents.into_iter().next().unwrap_or_default();
        self.original = document.clone();
        self.draft = document;
        Ok(())
    }

    pub fn draft(&self) -> &Document<T> {
        &self.draft
    }

    pub fn original(&self) -> &Document<T> {
        &self.original
    }

    pub fn edit(&mut self, edit: impl FnOnce(&mut T)) {
        edit(&mut self.draft.record);
    }

    pub fn has_changes(&self) -> bool {
        self.original != self.draft
    }

    /// Create the document on first save, update it afterwards
    pub async fn save(&mut self) -> Result<(), ApiError> {
        let result = match self.draft.id() {
            Some(id) => self.gateway.update(id, &self.draft.record).await,
            None => self.gateway.create(&self.draft.record).await,
        };
        let saved = self.track(result)?;

        info!(collection = %T::COLLECTION, id = saved.id().unwrap_or_default(), "Saved");
        self.original = saved.clone();
        self.draft = saved;
        Ok(())
    }

    pub fn discard(&mut self) {
        self.draft = self.original.clone();
    }

    pub fn last_error(&self) -> Option<&ApiError> {
        self.last_error.as_ref()
    }

    fn track<R>(&mut self, result: Result<R, ApiError>) -> Result<R, ApiError> {
        match &result {
            Ok(_) => self.last_error = None,
            Err(e) => self.last_error = Some(e.clone()),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenManager;
    use crate::backend::MemoryBackend;
    use crate::clock::ManualClock;
    use crate::config::MemoryBackendConfig;
    use crate::models::{Collection, Hero};
    use crate::storage::MemoryStore;
    use std::sync::Arc;

    fn setup() -> (SingletonEditor<Hero>, Arc<MemoryBackend>) {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let backend = Arc::new(MemoryBackend::from_config(
            &MemoryBackendConfig::default(),
            clock.clone(),
        ));
        let store = Arc::new(MemoryStore::new());
        let tokens = TokenManager::new(store, backend.clone(), clock, 10_000);
        tokens.set_access_token(Some(backend.issue_access_token(600_000).unwrap()));
        (SingletonEditor::new(ContentGateway::new(tokens)), backend)
    }

    #[tokio::test]
    async fn test_first_save_creates_then_updates() {
        let (mut editor, backend) = setup();
        editor.load().await.unwrap();
        assert!(!editor.draft().is_persisted());
        assert!(!editor.has_changes());

        editor.edit(|hero| hero.title = "Hi, I'm Ada".to_string());
        assert!(editor.has_changes());
        editor.save().await.unwrap();

        let id = editor.draft().id().unwrap().to_string();
        assert!(!editor.has_changes());
        assert_eq!(backend.document_count(Collection::Hero), 1);

        editor.edit(|hero| hero.subtitle = "Engineer".to_string());
        editor.save().await.unwrap();
        assert_eq!(editor.draft().id(), Some(id.as_str()));
        assert_eq!(backend.document_count(Collection::Hero), 1);

        let mut reloaded = SingletonEditor::<Hero>::new(editor.gateway.clone());
        reloaded.load().await.unwrap();
        assert_eq!(reloaded.draft().record.subtitle, "Engineer");
        assert_eq!(reloaded.draft().record.title, "Hi, I'm Ada");
    }

    #[tokio::test]
    async fn test_discard_reverts_draft() {
        let (mut editor, _) = setup();
        editor.load().await.unwrap();

        editor.edit(|hero| hero.cta_text = "Contact".to_string());
        editor.discard();

        assert!(!editor.has_changes());
        assert_eq!(editor.draft().record, Hero::default());
    }
}
