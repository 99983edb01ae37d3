//! Function-mediated JWT backend.
//!
//! The password is checked by opening a short-lived account session, which is
//! exchanged for an access/refresh token pair by the auth function and then
//! deleted. From then on every request carries the access token in its body.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use super::client::{RestClient, RestOutcome};
use super::{
    AssetReply, AssetRequest, AuthReply, Backend, BackendError, ContentReply, ContentRequest,
    NOT_ADMIN,
};

#[derive(Debug, Serialize)]
struct ExecutionRequest<'a> {
    body: String,
    #[serde(rename = "async")]
    is_async: bool,
    path: &'a str,
    method: &'a str,
}

#[derive(Debug, Deserialize)]
struct Execution {
    #[serde(rename = "responseBody", alias = "response", default)]
    response_body: String,
}

pub struct FunctionsBackend {
    rest: RestClient,
    auth_function: String,
    content_function: String,
}

impl FunctionsBackend {
    pub fn new(rest: RestClient, auth_function: String, content_function: String) -> Self {
        Self {
            rest,
            auth_function,
            content_function,
        }
    }

    /// Run a function synchronously and decode the JSON it responded with
    async fn execute<P, T>(
        &self,
        function_id: &str,
        payload: &P,
        session: Option<&str>,
    ) -> Result<T>
    where
        P: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let path = format!("/functions/{}/executions", function_id);
        let execution = ExecutionRequest {
            body: serde_json::to_string(payload).context("Failed to encode function payload")?,
            is_async: false,
            path: "/",
            method: "POST",
        };

        let builder = match session {
            Some(secret) => self.rest.with_session(Method::POST, &path, secret),
            None => self.rest.request(Method::POST, &path),
        }
        .json(&execution);

        debug!(function = function_id, "Executing function");
        match self.rest.send::<Execution>(builder).await? {
            RestOutcome::Ok(execution) => {
                if execution.response_body.trim().is_empty() {
                    let source = format!("function {}", function_id);
                    return Err(BackendError::EmptyResponse(source).into());
                }
                serde_json::from_str(&execution.response_body)
                    .with_context(|| format!("Function {} returned invalid JSON", function_id))
            }
            RestOutcome::Refused(e) => {
                anyhow::bail!("Function {} execution refused: {}", function_id, e.message)
            }
        }
    }
}

#[async_trait]
impl Backend for FunctionsBackend {
    fn name(&self) -> &'static str {
        "functions"
    }

    async fn login(&self, email: &str, password: &str) -> Result<AuthReply> {
        let session = match self.rest.open_session(email, password).await? {
            RestOutcome::Ok(session) => session,
            RestOutcome::Refused(e) => {
                let mut reply = AuthReply::rejected(e.message);
                reply.error_type = e.error_type;
                return Ok(reply);
            }
        };

        let tokens: Result<AuthReply> = self
            .execute(
                &self.auth_function,
                &json!({ "action": "getTokens", "email": email, "userId": session.user_id }),
                Some(&session.secret),
            )
            .await;

        // Tokens replace the account session whatever the outcome
        if let Err(e) = self.rest.close_sessions(&session.secret).await {
            warn!(error = %e, "Failed to delete temporary login session");
        }

        let mut reply = tokens?;
        if !reply.success {
            reply.error.get_or_insert_with(|| "Not authorized as admin".to_string());
            reply.error_type.get_or_insert_with(|| NOT_ADMIN.to_string());
        }
        Ok(reply)
    }

    async fn verify(&self, access_token: &str) -> Result<AuthReply> {
        self.execute(
            &self.auth_function,
            &json!({ "action": "verify", "accessToken": access_token }),
            None,
        )
        .await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<AuthReply> {
        self.execute(
            &self.auth_function,
            &json!({ "action": "refresh", "refreshToken": refresh_token }),
            None,
        )
        .await
    }

    async fn logout(&self, _refresh_token: Option<&str>) -> Result<()> {
        // Token pairs are stateless on this backend; dropping them locally is enough
        Ok(())
    }

    async fn content(&self, request: &ContentRequest) -> Result<ContentReply> {
        self.execute(&self.content_function, request, None).await
    }

    async fn asset(&self, request: &AssetRequest) -> Result<AssetReply> {
        self.execute(&self.content_function, request, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ContentAction, INVALID_CREDENTIALS};
    use crate::config::{BackendConfig, HttpConfig};
    use crate::models::Collection;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn backend(server: &MockServer) -> FunctionsBackend {
        let config = BackendConfig {
            endpoint: server.uri(),
            project_id: "folio".to_string(),
            ..Default::default()
        };
        let rest = RestClient::new(&config, &HttpConfig::default()).unwrap();
        FunctionsBackend::new(rest, "auth".to_string(), "content".to_string())
    }

    fn execution(body: serde_json::Value) -> ResponseTemplate {
        ResponseTemplate::new(201).set_body_json(json!({ "responseBody": body.to_string() }))
    }

    fn list_request() -> ContentRequest {
        ContentRequest {
            action: ContentAction::List,
            collection: Collection::Skills,
            document_id: None,
            data: None,
            access_token: "jwt".to_string(),
        }
    }

    async fn mount_session(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/account/sessions/email"))
            .and(header("X-Appwrite-Project", "folio"))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(json!({"userId": "u1", "secret": "s1"})),
            )
            .expect(1)
            .mount(server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/account/sessions"))
            .and(header("X-Appwrite-Session", "s1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_content_reply_is_read_from_response_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/functions/content/executions"))
            .respond_with(execution(json!({
                "success": true,
                "documents": [{"$id": "d1", "name": "Rust"}],
                "total": 1
            })))
            .expect(1)
            .mount(&server)
            .await;

        let reply = backend(&server).await.content(&list_request()).await.unwrap();
        assert!(reply.success);
        assert_eq!(reply.total, Some(1));
        assert_eq!(reply.documents.unwrap()[0]["$id"], "d1");
    }

    #[tokio::test]
    async fn test_empty_response_body_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/functions/content/executions"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"responseBody": ""})))
            .mount(&server)
            .await;

        let err = backend(&server).await.content(&list_request()).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BackendError>(),
            Some(BackendError::EmptyResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_server_error_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/functions/auth/executions"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let err = backend(&server).await.refresh("r1").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BackendError>(),
            Some(BackendError::Status { status: 503, .. })
        ));
    }

    #[tokio::test]
    async fn test_login_exchanges_and_closes_session() {
        let server = MockServer::start().await;
        mount_session(&server).await;
        Mock::given(method("POST"))
            .and(path("/functions/auth/executions"))
            .and(header("X-Appwrite-Session", "s1"))
            .respond_with(execution(json!({
                "success": true,
                "accessToken": "access",
                "refreshToken": "refresh",
                "user": {"id": "u1", "email": "admin@example.com"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let reply = backend(&server)
            .await
            .login("admin@example.com", "secret")
            .await
            .unwrap();
        assert!(reply.success);
        assert_eq!(reply.access_token.as_deref(), Some("access"));
        assert_eq!(reply.refresh_token.as_deref(), Some("refresh"));
    }

    #[tokio::test]
    async fn test_non_admin_login_closes_session_and_is_typed() {
        let server = MockServer::start().await;
        mount_session(&server).await;
        Mock::given(method("POST"))
            .and(path("/functions/auth/executions"))
            .respond_with(execution(json!({"success": false})))
            .expect(1)
            .mount(&server)
            .await;

        let reply = backend(&server)
            .await
            .login("editor@example.com", "secret")
            .await
            .unwrap();
        assert!(!reply.success);
        assert_eq!(reply.error.as_deref(), Some("Not authorized as admin"));
        assert_eq!(reply.error_type.as_deref(), Some(NOT_ADMIN));
    }

    #[tokio::test]
    async fn test_refused_credentials_skip_token_exchange() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/account/sessions/email"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "message": "Invalid credentials. Please check the email and password.",
                "code": 401,
                "type": INVALID_CREDENTIALS
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/functions/auth/executions"))
            .respond_with(execution(json!({"success": true})))
            .expect(0)
            .mount(&server)
            .await;

        let reply = backend(&server)
            .await
            .login("admin@example.com", "wrong")
            .await
            .unwrap();
        assert!(!reply.success);
        assert_eq!(reply.error_type.as_deref(), Some(INVALID_CREDENTIALS));
    }
}
