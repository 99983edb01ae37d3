//! In-process backend.
//!
//! Holds the admin account, refresh tokens, documents and files in memory and
//! signs real HS256 access tokens against the injected clock, so expiry and
//! refresh behave exactly as they do against the remote service.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, SecondsFormat};
use dashmap::DashMap;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use super::{
    AssetAction, AssetReply, AssetRequest, AuthReply, Backend, ContentAction, ContentReply,
    ContentRequest, INVALID_CREDENTIALS,
};
use crate::clock::Clock;
use crate::config::MemoryBackendConfig;
use crate::models::{AdminUser, Collection};

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    email: String,
    iat: i64,
    exp: i64,
    jti: String,
}

/// Number of calls each backend operation has received
#[derive(Debug, Default)]
pub struct CallCounts {
    login: AtomicUsize,
    verify: AtomicUsize,
    refresh: AtomicUsize,
    logout: AtomicUsize,
    content: AtomicUsize,
    asset: AtomicUsize,
}

impl CallCounts {
    pub fn login(&self) -> usize {
        self.login.load(Ordering::SeqCst)
    }

    pub fn verify(&self) -> usize {
        self.verify.load(Ordering::SeqCst)
    }

    pub fn refresh(&self) -> usize {
        self.refresh.load(Ordering::SeqCst)
    }

    pub fn logout(&self) -> usize {
        self.logout.load(Ordering::SeqCst)
    }

    pub fn content(&self) -> usize {
        self.content.load(Ordering::SeqCst)
    }

    pub fn asset(&self) -> usize {
        self.asset.load(Ordering::SeqCst)
    }

    /// Calls of any kind
    pub fn total(&self) -> usize {
        self.login()
            + self.verify()
            + self.refresh()
            + self.logout()
            + self.content()
            + self.asset()
    }
}

#[derive(Debug, Clone)]
struct StoredFile {
    name: String,
    mime_type: String,
    data: Vec<u8>,
}

pub struct MemoryBackend {
    clock: Arc<dyn Clock>,
    secret: Vec<u8>,
    access_ttl_ms: i64,
    admin: AdminUser,
    password: String,
    /// refresh token -> user id
    refresh_tokens: DashMap<String, String>,
    collections: DashMap<Collection, Vec<Value>>,
    files: DashMap<String, StoredFile>,
    latency: Option<Duration>,
    offline: AtomicBool,
    calls: CallCounts,
}

impl MemoryBackend {
    pub fn new(admin: AdminUser, password: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            secret: Uuid::new_v4().as_bytes().to_vec(),
            access_ttl_ms: 15 * 60 * 1000,
            admin,
            password: password.into(),
            refresh_tokens: DashMap::new(),
            collections: DashMap::new(),
            files: DashMap::new(),
            latency: None,
            offline: AtomicBool::new(false),
            calls: CallCounts::default(),
        }
    }

    pub fn from_config(config: &MemoryBackendConfig, clock: Arc<dyn Clock>) -> Self {
        let admin = AdminUser {
            id: "admin".to_string(),
            email: config.admin_email.clone(),
            name: Some(config.admin_name.clone()),
            role: Some("admin".to_string()),
        };
        Self::new(admin, config.admin_password.clone(), clock)
            .with_access_ttl(Duration::from_secs(config.access_token_ttl_secs))
    }

    pub fn with_access_ttl(mut self, ttl: Duration) -> Self {
        self.access_ttl_ms = ttl.as_millis() as i64;
        self
    }

    /// Delay every call by `latency` before answering
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// While offline every call fails as a transport error
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn calls(&self) -> &CallCounts {
        &self.calls
    }

    /// Invalidate every refresh token handed out so far
    pub fn revoke_refresh_tokens(&self) {
        self.refresh_tokens.clear();
    }

    /// Insert a document directly, bypassing authentication. Returns its id.
    pub fn seed(&self, collection: Collection, data: Value) -> String {
        let id = Uuid::new_v4().simple().to_string();
        let document = self.stamp_new(&id, data);
        self.collections.entry(collection).or_default().push(document);
        id
    }

    pub fn document_count(&self, collection: Collection) -> usize {
        self.collections.get(&collection).map(|docs| docs.len()).unwrap_or(0)
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Raw bytes of an uploaded file
    pub fn file_data(&self, file_id: &str) -> Option<Vec<u8>> {
        self.files.get(file_id).map(|file| file.data.clone())
    }

    /// Sign an access token for the admin that expires `ttl_ms` from now
    pub fn issue_access_token(&self, ttl_ms: i64) -> Result<String> {
        let now = self.clock.now_ms();
        let claims = Claims {
            sub: self.admin.id.clone(),
            email: self.admin.email.clone(),
            iat: now / 1000,
            exp: (now + ttl_ms) / 1000,
            jti: Uuid::new_v4().simple().to_string(),
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(&self.secret))
            .context("Failed to sign access token")
    }

    async fn enter(&self, counter: &AtomicUsize) -> Result<()> {
        counter.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(anyhow!("Memory backend is offline"));
        }
        Ok(())
    }

    /// The user an access token was issued to, if it is genuine and unexpired
    fn authorize(&self, access_token: &str) -> Option<AdminUser> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;

        let claims = decode::<Claims>(
            access_token,
            &DecodingKey::from_secret(&self.secret),
            &validation,
        )
        .ok()?
        .claims;

        if claims.exp * 1000 <= self.clock.now_ms() || claims.sub != self.admin.id {
            return None;
        }
        Some(self.admin.clone())
    }

    fn timestamp(&self) -> Value {
        DateTime::from_timestamp_millis(self.clock.now_ms())
            .map(|at| Value::String(at.to_rfc3339_opts(SecondsFormat::Millis, true)))
            .unwrap_or(Value::Null)
    }

    fn stamp_new(&self, id: &str, data: Value) -> Value {
        let mut fields = into_fields(data);
        let now = self.timestamp();
        fields.insert("$id".to_string(), Value::String(id.to_string()));
        fields.insert("$createdAt".to_string(), now.clone());
        fields.insert("$updatedAt".to_string(), now);
        Value::Object(fields)
    }

    fn handle_content(&self, request: &ContentRequest) -> ContentReply {
        let collection = request.collection;
        let data = request.data.clone().unwrap_or(Value::Null);

        match request.action {
            ContentAction::List => {
                let documents = self
                    .collections
                    .get(&collection)
                    .map(|docs| docs.value().clone())
                    .unwrap_or_default();
                ContentReply::with_documents(documents)
            }
            ContentAction::Create => {
                let id = Uuid::new_v4().simple().to_string();
                let document = self.stamp_new(&id, data);
                self.collections
                    .entry(collection)
                    .or_default()
                    .push(document.clone());
                debug!(%collection, id = %id, "Created document");
                ContentReply::with_document(document)
            }
            ContentAction::Get | ContentAction::Update | ContentAction::Delete => {
                let Some(id) = request.document_id.as_deref() else {
                    return ContentReply::rejected("Document id is required");
                };
                let mut docs = self.collections.entry(collection).or_default();
                let Some(index) = docs.iter().position(|doc| document_id(doc) == Some(id)) else {
                    return ContentReply::rejected("Document not found");
                };

                match request.action {
                    ContentAction::Get => ContentReply::with_document(docs[index].clone()),
                    ContentAction::Delete => {
                        docs.remove(index);
                        ContentReply::ok()
                    }
                    _ => {
                        let updated_at = self.timestamp();
                        if let Value::Object(existing) = &mut docs[index] {
                            for (key, value) in into_fields(data) {
                                if !key.starts_with('$') {
                                    existing.insert(key, value);
                                }
                            }
                            existing.insert("$updatedAt".to_string(), updated_at);
                        }
                        ContentReply::with_document(docs[index].clone())
                    }
                }
            }
        }
    }

    fn handle_asset(&self, request: &AssetRequest) -> AssetReply {
        match request.action {
            AssetAction::Upload => {
                let Some(encoded) = request.file_data.as_deref() else {
                    return AssetReply::rejected("File data is required");
                };
                let Ok(data) = BASE64.decode(encoded) else {
                    return AssetReply::rejected("Invalid file data");
                };
                let id = Uuid::new_v4().simple().to_string();
                let file = StoredFile {
                    name: request.file_name.clone().unwrap_or_default(),
                    mime_type: request.mime_type.clone().unwrap_or_default(),
                    data,
                };
                debug!(id = %id, name = %file.name, mime = %file.mime_type, "Stored file");
                self.files.insert(id.clone(), file);
                AssetReply::uploaded(id)
            }
            AssetAction::DeleteFile => match request.file_id.as_deref() {
                Some(id) if self.files.remove(id).is_some() => AssetReply::ok(),
                Some(_) => AssetReply::rejected("File not found"),
                None => AssetReply::rejected("File id is required"),
            },
        }
    }
}

fn into_fields(data: Value) -> Map<String, Value> {
    match data {
        Value::Object(fields) => fields,
        _ => Map::new(),
    }
}

fn document_id(document: &Value) -> Option<&str> {
    document.get("$id").and_then(Value::as_str)
}

#[async_trait]
impl Backend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn login(&self, email: &str, password: &str) -> Result<AuthReply> {
        self.enter(&self.calls.login).await?;

        if !email.eq_ignore_ascii_case(&self.admin.email) || password != self.password {
            return Ok(
                AuthReply::rejected("Invalid credentials").with_error_type(INVALID_CREDENTIALS)
            );
        }

        let access_token = self.issue_access_token(self.access_ttl_ms)?;
        let refresh_token = Uuid::new_v4().simple().to_string();
        self.refresh_tokens
            .insert(refresh_token.clone(), self.admin.id.clone());

        Ok(AuthReply {
            success: true,
            user: Some(self.admin.clone()),
            access_token: Some(access_token),
            refresh_token: Some(refresh_token),
            ..Default::default()
        })
    }

    async fn verify(&self, access_token: &str) -> Result<AuthReply> {
        self.enter(&self.calls.verify).await?;

        Ok(match self.authorize(access_token) {
            Some(user) => AuthReply {
                success: true,
                user: Some(user),
                ..Default::default()
            },
            None => AuthReply::rejected("Invalid or expired token"),
        })
    }

    async fn refresh(&self, refresh_token: &str) -> Result<AuthReply> {
        self.enter(&self.calls.refresh).await?;

        if self.refresh_tokens.remove(refresh_token).is_none() {
            return Ok(AuthReply::rejected("Invalid refresh token"));
        }

        let access_token = self.issue_access_token(self.access_ttl_ms)?;
        let rotated = Uuid::new_v4().simple().to_string();
        self.refresh_tokens.insert(rotated.clone(), self.admin.id.clone());

        Ok(AuthReply {
            success: true,
            access_token: Some(access_token),
            refresh_token: Some(rotated),
            ..Default::default()
        })
    }

    async fn logout(&self, refresh_token: Option<&str>) -> Result<()> {
        self.enter(&self.calls.logout).await?;

        if let Some(token) = refresh_token {
            self.refresh_tokens.remove(token);
        }
        Ok(())
    }

    async fn content(&self, request: &ContentRequest) -> Result<ContentReply> {
        self.enter(&self.calls.content).await?;

        if self.authorize(&request.access_token).is_none() {
            return Ok(ContentReply::rejected("Unauthorized"));
        }
        Ok(self.handle_content(request))
    }

    async fn asset(&self, request: &AssetRequest) -> Result<AssetReply> {
        self.enter(&self.calls.asset).await?;

        if self.authorize(&request.access_token).is_none() {
            return Ok(AssetReply::rejected("Unauthorized"));
        }
        Ok(self.handle_asset(request))
    }
}
