//! Direct REST backend.
//!
//! Uses the account session itself as the refresh credential: the session
//! secret is persisted and exchanged for short-lived JWTs on demand.

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use reqwest::multipart::{Form, Part};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::client::{RemoteError, RestClient, RestOutcome};
use super::{
    AssetAction, AssetReply, AssetRequest, AuthReply, Backend, ContentAction, ContentReply,
    ContentRequest,
};
use crate::models::AdminUser;

/// Account label that marks an admin
const ADMIN_LABEL: &str = "admin";

/// Documents fetched per list request
const PAGE_SIZE: u64 = 100;

#[derive(Debug, Deserialize)]
struct Jwt {
    jwt: String,
}

#[derive(Debug, Deserialize)]
struct Account {
    #[serde(rename = "$id")]
    id: String,
    email: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    labels: Vec<String>,
}

impl From<Account> for AdminUser {
    fn from(account: Account) -> Self {
        let role = account
            .labels
            .iter()
            .any(|label| label == ADMIN_LABEL)
            .then(|| ADMIN_LABEL.to_string());
        Self {
            id: account.id,
            email: account.email,
            name: (!account.name.is_empty()).then_some(account.name),
            role,
        }
    }
}

#[derive(Debug, Deserialize)]
struct DocumentList {
    #[serde(default)]
    total: u64,
    #[serde(default)]
    documents: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct FileInfo {
    #[serde(rename = "$id")]
    id: String,
}

fn auth_refusal(error: RemoteError) -> AuthReply {
    let mut reply = AuthReply::rejected(error.message);
    reply.error_type = error.error_type;
    reply
}

pub struct DirectBackend {
    rest: RestClient,
    database_id: String,
    bucket_id: String,
}

impl DirectBackend {
    pub fn new(rest: RestClient, database_id: String, bucket_id: String) -> Self {
        Self {
            rest,
            database_id,
            bucket_id,
        }
    }

    async fn mint_jwt(&self, secret: &str) -> Result<RestOutcome<Jwt>> {
        self.rest
            .send(self.rest.with_session(Method::POST, "/account/jwt", secret))
            .await
    }

    async fn account(&self, jwt: &str) -> Result<RestOutcome<Account>> {
        self.rest
            .send(self.rest.with_jwt(Method::GET, "/account", jwt))
            .await
    }

    fn documents_path(&self, request: &ContentRequest) -> String {
        format!(
            "/databases/{}/collections/{}/documents",
            self.database_id, request.collection
        )
    }

    /// Fetch every page of a collection
    async fn list_documents(&self, base: &str, jwt: &str) -> Result<ContentReply> {
        let mut documents = Vec::new();
        loop {
            let offset = documents.len() as u64;
            let queries = [
                ("queries[]", json!({ "method": "limit", "values": [PAGE_SIZE] }).to_string()),
                ("queries[]", json!({ "method": "offset", "values": [offset] }).to_string()),
            ];
            let builder = self.rest.with_jwt(Method::GET, base, jwt).query(&queries);

            let page = match self.rest.send::<DocumentList>(builder).await? {
                RestOutcome::Ok(page) => page,
                RestOutcome::Refused(e) => return Ok(ContentReply::rejected(e.message)),
            };
            let fetched = page.documents.len() as u64;
            documents.extend(page.documents);

            if fetched == 0 || documents.len() as u64 >= page.total {
                debug!(total = page.total, offset, "Listed documents");
                return Ok(ContentReply::with_documents(documents));
            }
        }
    }

    async fn upload(&self, request: &AssetRequest) -> Result<AssetReply> {
        let Some(encoded) = request.file_data.as_deref() else {
            return Ok(AssetReply::rejected("File data is required"));
        };
        let Ok(bytes) = BASE64.decode(encoded) else {
            return Ok(AssetReply::rejected("Invalid file data"));
        };

        let file_name = request.file_name.clone().unwrap_or_else(|| "upload".to_string());
        let mime_type = request
            .mime_type
            .as_deref()
            .unwrap_or("application/octet-stream");
        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(mime_type)
            .context("Invalid mime type")?;
        let form = Form::new().text("fileId", "unique()").part("file", part);

        let path = format!("/storage/buckets/{}/files", self.bucket_id);
        let builder = self
            .rest
            .with_jwt(Method::POST, &path, &request.access_token)
            .multipart(form);

        Ok(match self.rest.send::<FileInfo>(builder).await? {
            RestOutcome::Ok(file) => AssetReply::uploaded(file.id),
            RestOutcome::Refused(e) => AssetReply::rejected(e.message),
        })
    }

    async fn delete_file(&self, request: &AssetRequest) -> Result<AssetReply> {
        let Some(file_id) = request.file_id.as_deref() else {
            return Ok(AssetReply::rejected("File id is required"));
        };

        let path = format!("/storage/buckets/{}/files/{}", self.bucket_id, file_id);
        let builder = self
            .rest
            .with_jwt(Method::DELETE, &path, &request.access_token);

        Ok(match self.rest.send::<Value>(builder).await? {
            RestOutcome::Ok(_) => AssetReply::ok(),
            RestOutcome::Refused(e) => AssetReply::rejected(e.message),
        })
    }
}

#[async_trait]
impl Backend for DirectBackend {
    fn name(&self) -> &'static str {
        "direct"
    }

    async fn login(&self, email: &str, password: &str) -> Result<AuthReply> {
        let session = match self.rest.open_session(email, password).await? {
            RestOutcome::Ok(session) => session,
            RestOutcome::Refused(e) => return Ok(auth_refusal(e)),
        };

        let jwt = match self.mint_jwt(&session.secret).await? {
            RestOutcome::Ok(jwt) => jwt.jwt,
            RestOutcome::Refused(e) => return Ok(auth_refusal(e)),
        };

        let user = match self.account(&jwt).await? {
            RestOutcome::Ok(account) => AdminUser::from(account),
            RestOutcome::Refused(e) => return Ok(auth_refusal(e)),
        };

        Ok(AuthReply {
            success: true,
            user: Some(user),
            access_token: Some(jwt),
            refresh_token: Some(session.secret),
            ..Default::default()
        })
    }

    async fn verify(&self, access_token: &str) -> Result<AuthReply> {
        Ok(match self.account(access_token).await? {
            RestOutcome::Ok(account) => AuthReply {
                success: true,
                user: Some(account.into()),
                ..Default::default()
            },
            RestOutcome::Refused(e) => auth_refusal(e),
        })
    }

    async fn refresh(&self, refresh_token: &str) -> Result<AuthReply> {
        Ok(match self.mint_jwt(refresh_token).await? {
            RestOutcome::Ok(jwt) => AuthReply {
                success: true,
                access_token: Some(jwt.jwt),
                ..Default::default()
            },
            RestOutcome::Refused(e) => auth_refusal(e),
        })
    }

    async fn logout(&self, refresh_token: Option<&str>) -> Result<()> {
        let Some(secret) = refresh_token else {
            return Ok(());
        };

        let builder = self
            .rest
            .with_session(Method::DELETE, "/account/sessions/current", secret);
        if let RestOutcome::Refused(e) = self.rest.send::<Value>(builder).await? {
            debug!(error = %e.message, "Session was already closed");
        }
        Ok(())
    }

    async fn content(&self, request: &ContentRequest) -> Result<ContentReply> {
        let base = self.documents_path(request);
        let jwt = request.access_token.as_str();

        if request.action == ContentAction::List {
            return self.list_documents(&base, jwt).await;
        }

        if request.action == ContentAction::Create {
            let body = json!({ "documentId": "unique()", "data": request.data });
            let builder = self.rest.with_jwt(Method::POST, &base, jwt).json(&body);
            return Ok(match self.rest.send::<Value>(builder).await? {
                RestOutcome::Ok(doc) => ContentReply::with_document(doc),
                RestOutcome::Refused(e) => ContentReply::rejected(e.message),
            });
        }

        let Some(document_id) = request.document_id.as_deref() else {
            return Ok(ContentReply::rejected("Document id is required"));
        };
        let path = format!("{}/{}", base, document_id);

        let builder = match request.action {
            ContentAction::Get => self.rest.with_jwt(Method::GET, &path, jwt),
            ContentAction::Update => self
                .rest
                .with_jwt(Method::PATCH, &path, jwt)
                .json(&json!({ "data": request.data })),
            _ => self.rest.with_jwt(Method::DELETE, &path, jwt),
        };

        Ok(match self.rest.send::<Value>(builder).await? {
            RestOutcome::Ok(_) if request.action == ContentAction::Delete => ContentReply::ok(),
            RestOutcome::Ok(doc) => ContentReply::with_document(doc),
            RestOutcome::Refused(e) => ContentReply::rejected(e.message),
        })
    }

    async fn asset(&self, request: &AssetRequest) -> Result<AssetReply> {
        match request.action {
            AssetAction::Upload => self.upload(request).await,
            AssetAction::DeleteFile => self.delete_file(request).await,
        }
    }
}
