//! CRUD over the content collections.

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use super::error::{ApiError, ErrorDetails};
use super::transport_error;
use crate::auth::TokenManager;
use crate::backend::{ContentAction, ContentReply, ContentRequest};
use crate::models::{Collection, ContentRecord, Document, Record};

/// Typed access to every content collection.
///
/// Each call resolves a valid access token first; without one the call
/// fails with [`ApiError::unauthenticated`] and the backend is never asked.
#[derive(Clone)]
pub struct ContentGateway {
    tokens: TokenManager,
}

impl ContentGateway {
    pub fn new(tokens: TokenManager) -> Self {
        Self { tokens }
    }

    async fn execute(
        &self,
        action: ContentAction,
        collection: Collection,
        document_id: Option<&str>,
        data: Option<Value>,
    ) -> Result<ContentReply, ApiError> {
        let Some(access_token) = self.tokens.ensure_valid_token().await else {
            return Err(ApiError::unauthenticated());
        };

        let request = ContentRequest {
            action,
            collection,
            document_id: document_id.map(str::to_string),
            data,
            access_token,
        };

        debug!(%action, %collection, document_id, "Content request");
        let reply = self
            .tokens
            .backend()
            .content(&request)
            .await
            .map_err(transport_error)?;

        if !reply.success {
            let message = reply.error_text().unwrap_or("Request failed");
            warn!(%action, %collection, error = message, "Content request rejected");
            let err = ApiError::backend(message);
            return Err(match (&reply.message, &reply.error) {
                (Some(_), Some(raw)) => err.with_details(ErrorDetails::Backend(raw.clone())),
                _ => err,
            });
        }
        Ok(reply)
    }

    pub async fn list<T: Record>(&self) -> Result<Vec<Document<T>>, ApiError> {
        let reply = self
            .execute(ContentAction::List, T::COLLECTION, None, None)
            .await?;
        reply
            .documents
            .unwrap_or_default()
            .into_iter()
            .map(|value| decode(T::COLLECTION, value))
            .collect()
    }

    pub async fn get<T: Record>(&self, id: &str) -> Result<Document<T>, ApiError> {
        let value = self.get_raw(T::COLLECTION, id).await?;
        decode(T::COLLECTION, value)
    }

    pub async fn create<T: Record>(&self, record: &T) -> Result<Document<T>, ApiError> {
        ensure_writable(T::COLLECTION)?;
        let data = encode(record)?;

        let reply = self
            .execute(ContentAction::Create, T::COLLECTION, None, Some(data))
            .await?;
        match reply.document {
            Some(document) => decode(T::COLLECTION, document),
            None => Err(ApiError::backend("Create returned no document")),
        }
    }

    /// Replace the fields of document `id`.
    ///
    /// When the backend does not echo the document back, the submitted
    /// record is returned under the given id.
    pub async fn update<T: Record>(&self, id: &str, record: &T) -> Result<Document<T>, ApiError> {
        ensure_writable(T::COLLECTION)?;
        let data = encode(record)?;

        let reply = self
            .execute(ContentAction::Update, T::COLLECTION, Some(id), Some(data))
            .await?;
        match reply.document {
            Some(document) => decode(T::COLLECTION, document),
            None => Ok(Document::new(record.clone()).with_id(id)),
        }
    }

    pub async fn delete<T: Record>(&self, id: &str) -> Result<(), ApiError> {
        self.delete_raw(T::COLLECTION, id).await
    }

    /// Every document of `collection`, tagged by record type
    pub async fn list_raw(&self, collection: Collection) -> Result<Vec<ContentRecord>, ApiError> {
        let reply = self
            .execute(ContentAction::List, collection, None, None)
            .await?;
        reply
            .documents
            .unwrap_or_default()
            .into_iter()
            .map(|value| {
                ContentRecord::from_value(collection, value).map_err(|e| malformed(collection, e))
            })
            .collect()
    }

    /// One document as the backend returned it
    pub async fn get_raw(&self, collection: Collection, id: &str) -> Result<Value, ApiError> {
        let reply = self
            .execute(ContentAction::Get, collection, Some(id), None)
            .await?;
        reply
            .document
            .ok_or_else(|| ApiError::not_found(format!("Document {} not found", id)))
    }

    pub async fn delete_raw(&self, collection: Collection, id: &str) -> Result<(), ApiError> {
        self.execute(ContentAction::Delete, collection, Some(id), None)
            .await?;
        Ok(())
    }
}

fn ensure_writable(collection: Collection) -> Result<(), ApiError> {
    if collection.is_read_only() {
        return Err(ApiError::validation_field(
            "collection",
            format!("{} are read-only", collection.label()),
        ));
    }
    Ok(())
}

fn encode<T: Record>(record: &T) -> Result<Value, ApiError> {
    serde_json::to_value(record).map_err(|e| {
        warn!(collection = %T::COLLECTION, error = %e, "Failed to encode record");
        ApiError::backend("Could not encode document")
    })
}

fn decode<T: DeserializeOwned>(collection: Collection, value: Value) -> Result<T, ApiError> {
    serde_json::from_value(value).map_err(|e| malformed(collection, e))
}

fn malformed(collection: Collection, err: serde_json::Error) -> ApiError {
    warn!(%collection, error = %err, "Backend returned a malformed document");
    ApiError::backend(format!("Unexpected {} document format", collection))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::error::ErrorCode;
    use crate::backend::{
        AssetReply, AssetRequest, AuthReply, Backend, BackendError, MemoryBackend,
    };
    use crate::clock::ManualClock;
    use crate::config::MemoryBackendConfig;
    use crate::models::{skills_in_bucket, Message, Service, Skill, SocialLink};
    use crate::storage::{ClientStore, MemoryStore, REFRESH_TOKEN_KEY};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Arc;

    const NOW: i64 = 1_700_000_000_000;

    fn signed_in() -> (ContentGateway, Arc<MemoryBackend>) {
        let clock = Arc::new(ManualClock::new(NOW));
        let backend = Arc::new(MemoryBackend::from_config(
            &MemoryBackendConfig::default(),
            clock.clone(),
        ));
        let store = Arc::new(MemoryStore::new());
        let tokens = TokenManager::new(store, backend.clone(), clock, 10_000);
        tokens.set_access_token(Some(backend.issue_access_token(600_000).unwrap()));
        (ContentGateway::new(tokens), backend)
    }

    /// Answers every content request with a fixed outcome
    struct FixedContent(fn() -> anyhow::Result<ContentReply>);

    #[async_trait]
    impl Backend for FixedContent {
        fn name(&self) -> &'static str {
            "fixed"
        }
        async fn login(&self, _: &str, _: &str) -> anyhow::Result<AuthReply> {
            Ok(AuthReply::rejected("unsupported"))
        }
        async fn verify(&self, _: &str) -> anyhow::Result<AuthReply> {
            Ok(AuthReply::rejected("unsupported"))
        }
        async fn refresh(&self, _: &str) -> anyhow::Result<AuthReply> {
            Ok(AuthReply::rejected("unsupported"))
        }
        async fn logout(&self, _: Option<&str>) -> anyhow::Result<()> {
            Ok(())
        }
        async fn content(&self, _: &ContentRequest) -> anyhow::Result<ContentReply> {
            (self.0)()
        }
        async fn asset(&self, _: &AssetRequest) -> anyhow::Result<AssetReply> {
            Ok(AssetReply::rejected("unsupported"))
        }
    }

    fn fixed(reply: fn() -> anyhow::Result<ContentReply>) -> ContentGateway {
        let clock = Arc::new(ManualClock::new(NOW));
        let signer = MemoryBackend::from_config(&MemoryBackendConfig::default(), clock.clone());
        let tokens = TokenManager::new(
            Arc::new(MemoryStore::new()),
            Arc::new(FixedContent(reply)),
            clock,
            10_000,
        );
        tokens.set_access_token(Some(signer.issue_access_token(600_000).unwrap()));
        ContentGateway::new(tokens)
    }

    #[tokio::test]
    async fn test_unauthenticated_call_never_reaches_backend() {
        let clock = Arc::new(ManualClock::new(NOW));
        let backend = Arc::new(MemoryBackend::from_config(
            &MemoryBackendConfig::default(),
            clock.clone(),
        ));
        let store = Arc::new(MemoryStore::new());
        let tokens = TokenManager::new(store.clone(), backend.clone(), clock, 10_000);
        let gateway = ContentGateway::new(tokens);

        let err = gateway.list::<Service>().await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Unauthenticated);
        assert_eq!(err.message(), "Not authenticated");
        assert_eq!(backend.calls().content(), 0);

        // A refresh token the backend rejects ends the same way
        store.set(REFRESH_TOKEN_KEY, "stale").unwrap();
        let err = gateway.list::<Service>().await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Unauthenticated);
        assert_eq!(backend.calls().refresh(), 1);
        assert_eq!(backend.calls().content(), 0);
    }

    #[tokio::test]
    async fn test_typed_crud() {
        let (gateway, backend) = signed_in();

        let created = gateway
            .create(&Service {
                title: "Web development".to_string(),
                description: "Sites and apps".to_string(),
                icon: "code".to_string(),
            })
            .await
            .unwrap();
        let id = created.id().unwrap().to_string();
        assert!(created.created_at.is_some());

        let mut record = created.record.clone();
        record.description = "Fast sites".to_string();
        let updated = gateway.update(&id, &record).await.unwrap();
        assert_eq!(updated.record.description, "Fast sites");

        let listed = gateway.list::<Service>().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].record, record);

        let fetched: Document<Service> = gateway.get(&id).await.unwrap();
        assert_eq!(fetched.id(), Some(id.as_str()));

        gateway.delete::<Service>(&id).await.unwrap();
        assert_eq!(backend.document_count(Collection::Services), 0);
    }

    #[tokio::test]
    async fn test_null_attributes_do_not_break_listing() {
        let (gateway, backend) = signed_in();
        backend.seed(Collection::Skills, json!({"name": "Rust", "category": "tech", "icon": null}));
        backend.seed(Collection::Skills, json!({"name": "Figma", "category": null}));

        let skills = gateway.list::<Skill>().await.unwrap();
        assert_eq!(skills.len(), 2);
        assert!(skills.iter().all(|doc| doc.record.icon.is_empty()));
        assert_eq!(skills_in_bucket(&skills, "tech"), vec!["Rust"]);

        let records = gateway.list_raw(Collection::Skills).await.unwrap();
        assert_eq!(records.len(), 2);
    }

    #[tokio::test]
    async fn test_backend_rejection_carries_message() {
        let (gateway, _) = signed_in();
        let err = gateway.get::<SocialLink>("missing").await.unwrap_err();

        assert_eq!(err.code(), ErrorCode::Backend);
        assert_eq!(err.message(), "Document not found");
    }

    #[tokio::test]
    async fn test_messages_are_read_only() {
        let (gateway, backend) = signed_in();
        backend.seed(
            Collection::Messages,
            json!({"name": "Ada", "email": "ada@example.com", "subject": "Hi", "message": "Hello"}),
        );

        let err = gateway.create(&Message::default()).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Validation);
        assert_eq!(backend.calls().content(), 0);

        let records = gateway.list_raw(Collection::Messages).await.unwrap();
        assert_eq!(records.len(), 1);
        assert!(matches!(records[0], ContentRecord::Message(_)));

        let id = records[0].id().unwrap().to_string();
        gateway.delete_raw(Collection::Messages, &id).await.unwrap();
        assert_eq!(backend.document_count(Collection::Messages), 0);
    }

    #[tokio::test]
    async fn test_update_without_echo_returns_submitted_record() {
        let gateway = fixed(|| Ok(ContentReply::ok()));
        let link = SocialLink {
            platform: "GitHub".to_string(),
            url: "https://github.com/example".to_string(),
            icon: "github".to_string(),
        };

        let updated = gateway.update("d1", &link).await.unwrap();
        assert_eq!(updated.id(), Some("d1"));
        assert_eq!(updated.record, link);
    }

    #[tokio::test]
    async fn test_transport_failures() {
        let gateway = fixed(|| Err(BackendError::EmptyResponse("function".to_string()).into()));
        let err = gateway.list::<Service>().await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::EmptyResponse);
        assert_eq!(err.message(), "Empty response from server");

        let gateway = fixed(|| Err(anyhow::anyhow!("connection reset")));
        let err = gateway.list::<Service>().await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Network);
        assert_eq!(err.message(), "Network error");
    }
}
