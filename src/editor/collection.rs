use tracing::{debug, info};

use crate::api::{ApiError, ContentGateway};
use crate::models::{Document, Record};

/// List-style editor: a loaded collection, a working copy and a selection.
///
/// Field edits on existing items are staged in the draft until [`save`].
/// Adding and removing items is persisted immediately and applied to both
/// the draft and the snapshot, so it never counts as an unsaved change.
///
/// [`save`]: CollectionEditor::save
pub struct CollectionEditor<T: Record> {
    gateway: ContentGateway,
    original: Vec<Document<T>>,
    draft: Vec<Document<T>>,
    selected: Option<String>,
    last_error: Option<ApiError>,
}

impl<T: Record> CollectionEditor<T> {
    pub fn new(gateway: ContentGateway) -> Self {
        Self {
            gateway,
            original: Vec::new(),
            draft: Vec::new(),
            selected: None,
            last_error: None,
        }
    }

    /// Replace both snapshot and draft with the remote collection
    pub async fn load(&mut self) -> Result<(), ApiError> {
        let result = self.gateway.list::<T>().await;
        let documents = self.track(result)?;

        debug!(collection = %T::COLLECTION, count = documents.len(), "Loaded collection");
        self.original = documents.clone();
        self.draft = documents;
        if let Some(id) = self.selected.take() {
            if self.position(&id).is_some() {
                self.selected = Some(id);
            }
        }
        Ok(())
    }

    /// The working copy
    pub fn items(&self) -> &[Document<T>] {
        &self.draft
    }

    /// The last loaded or saved state
    pub fn original(&self) -> &[Document<T>] {
        &self.original
    }

    pub fn len(&self) -> usize {
        self.draft.len()
    }

    pub fn is_empty(&self) -> bool {
        self.draft.is_empty()
    }

    pub fn has_changes(&self) -> bool {
        self.original != self.draft
    }

    /// Select the item with `id`; returns false if there is none
    pub fn select(&mut self, id: &str) -> bool {
        let found = self.position(id).is_some();
        if found {
            self.selected = Some(id.to_string());
        }
        found
    }

    pub fn selected_id(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn selected(&self) -> Option<&Document<T>> {
        let id = self.selected.as_deref()?;
        self.draft.iter().find(|doc| doc.id() == Some(id))
    }

    /// Apply `edit` to the selected draft item; returns false with no selection
    pub fn edit_selected(&mut self, edit: impl FnOnce(&mut T)) -> bool {
        let Some(index) = self.selected.as_deref().and_then(|id| self.position(id)) else {
            return false;
        };
        edit(&mut self.draft[index].record);
        true
    }

    /// Persist every item whose draft differs from the snapshot.
    ///
    /// Returns how many items were written.
    pub async fn save(&mut self) -> Result<usize, ApiError> {
        let changed: Vec<(String, T)> = self
            .draft
            .iter()
            .filter_map(|doc| {
                let id = doc.id()?;
                let unchanged = self
                    .original
                    .iter()
                    .any(|orig| orig.id() == Some(id) && orig.record == doc.record);
                (!unchanged).then(|| (id.to_string(), doc.record.clone()))
            })
            .collect();

        for (id, record) in &changed {
            let result = self.gateway.update(id, record).await;
            let saved = self.track(result)?;

            if let Some(index) = self.position(id) {
                self.draft[index] = saved.clone();
            }
            if let Some(orig) = self.original.iter_mut().find(|doc| doc.id() == Some(id.as_str())) {
                *orig = saved;
            }
        }

        self.original = self.draft.clone();
        info!(collection = %T::COLLECTION, saved = changed.len(), "Saved changes");
        Ok(changed.len())
    }

    /// Throw away staged edits
    pub fn discard(&mut self) {
        self.draft = self.original.clone();
    }

    /// Create `record` remotely and select it. Returns the new id.
    pub async fn add(&mut self, record: T) -> Result<String, ApiError> {
        let result = self.gateway.create(&record).await;
        let created = self.track(result)?;
        let Some(id) = created.id().map(str::to_string) else {
            return self.track(Err(ApiError::backend("Created document has no id")));
        };

        self.original.push(created.clone());
        self.draft.push(created);
        self.selected = Some(id.clone());
        Ok(id)
    }

    /// Delete item `id` remotely and drop it from the editor
    pub async fn remove(&mut self, id: &str) -> Result<(), ApiError> {
        let result = self.gateway.delete::<T>(id).await;
        self.track(result)?;

        self.original.retain(|doc| doc.id() != Some(id));
        self.draft.retain(|doc| doc.id() != Some(id));
        if self.selected.as_deref() == Some(id) {
            self.selected = None;
        }
        Ok(())
    }

    /// The error of the last failed operation, for display
    pub fn last_error(&self) -> Option<&ApiError> {
        self.last_error.as_ref()
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.draft.iter().position(|doc| doc.id() == Some(id))
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
    use crate::api::ErrorCode;
    use crate::auth::TokenManager;
    use crate::backend::MemoryBackend;
    use crate::clock::ManualClock;
    use crate::config::MemoryBackendConfig;
    use crate::models::{Collection, Skill};
    use crate::storage::MemoryStore;
    use serde_json::json;
    use std::sync::Arc;

    async fn editor() -> (CollectionEditor<Skill>, Arc<MemoryBackend>, ContentGateway) {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let backend = Arc::new(MemoryBackend::from_config(
            &MemoryBackendConfig::default(),
            clock.clone(),
        ));
        backend.seed(Collection::Skills, json!({"name": "Rust", "category": "tech", "icon": ""}));
        backend.seed(Collection::Skills, json!({"name": "Ink", "category": "art", "icon": ""}));

        let store = Arc::new(MemoryStore::new());
        let tokens = TokenManager::new(store, backend.clone(), clock, 10_000);
        tokens.set_access_token(Some(backend.issue_access_token(600_000).unwrap()));
        let gateway = ContentGateway::new(tokens);

        let mut editor = CollectionEditor::new(gateway.clone());
        editor.load().await.unwrap();
        (editor, backend, gateway)
    }

    #[tokio::test]
    async fn test_discard_restores_snapshot() {
        let (mut editor, _, _) = editor().await;
        let id = editor.items()[0].id().unwrap().to_string();

        assert!(editor.select(&id));
        assert!(editor.edit_selected(|skill| skill.name = "Go".to_string()));
        assert!(editor.has_changes());

        editor.discard();
        assert!(!editor.has_changes());
        assert_eq!(editor.selected().unwrap().record.name, "Rust");
    }

    #[tokio::test]
    async fn test_save_persists_edits() {
        let (mut editor, _, gateway) = editor().await;
        let id = editor.items()[1].id().unwrap().to_string();

        editor.select(&id);
        editor.edit_selected(|skill| skill.name = "Watercolour".to_string());
        assert_eq!(editor.save().await.unwrap(), 1);
        assert!(!editor.has_changes());

        let stored: Document<Skill> = gateway.get(&id).await.unwrap();
        assert_eq!(stored.record.name, "Watercolour");

        // Nothing left to write
        assert_eq!(editor.save().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_add_and_remove_are_not_staged() {
        let (mut editor, backend, _) = editor().await;

        let id = editor.add(Skill::new("Figma", "tech")).await.unwrap();
        assert_eq!(editor.selected_id(), Some(id.as_str()));
        assert_eq!(editor.len(), 3);
        assert!(!editor.has_changes());
        assert_eq!(backend.document_count(Collection::Skills), 3);

        editor.remove(&id).await.unwrap();
        assert!(editor.selected_id().is_none());
        assert_eq!(editor.len(), 2);
        assert!(!editor.has_changes());
        assert_eq!(backend.document_count(Collection::Skills), 2);
    }

    #[tokio::test]
    async fn test_failure_is_kept_for_display() {
        let (mut editor, _, _) = editor().await;

        let err = editor.remove("missing").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Backend);
        assert_eq!(editor.last_error(), Some(&err));
        assert_eq!(editor.len(), 2);

        editor.clear_error();
        assert!(editor.last_error().is_none());
    }

    #[tokio::test]
    async fn test_edit_without_selection_is_ignored() {
        let (mut editor, _, _) = editor().await;

        assert!(!editor.select("missing"));
        assert!(!editor.edit_selected(|skill| skill.name.clear()));
        assert!(!editor.has_changes());
    }
}
