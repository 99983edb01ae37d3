//! Thin REST client shared by the functions and direct backends.

use anyhow::{Context, Result};
use reqwest::header::SET_COOKIE;
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::BackendError;
use crate::config::{BackendConfig, HttpConfig};

const PROJECT_HEADER: &str = "X-Appwrite-Project";
const SESSION_HEADER: &str = "X-Appwrite-Session";
const JWT_HEADER: &str = "X-Appwrite-JWT";

/// Error body the backend sends with a 4xx status
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RemoteError {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub code: u16,
    #[serde(rename = "type", default)]
    pub error_type: Option<String>,
}

/// A processed request: either the decoded body or the backend's refusal
#[derive(Debug)]
pub enum RestOutcome<T> {
    Ok(T),
    Refused(RemoteError),
}

/// Email/password session opened against the account API
#[derive(Debug, Clone)]
pub struct OpenedSession {
    pub user_id: String,
    pub secret: String,
}

#[derive(Debug, Deserialize)]
struct SessionBody {
    #[serde(rename = "userId")]
    user_id: String,
    #[serde(default)]
    secret: String,
}

/// REST client bound to one backend project
pub struct RestClient {
    endpoint: String,
    project_id: String,
    client: reqwest::Client,
}

impl RestClient {
    pub fn new(backend: &BackendConfig, http: &HttpConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(http.timeout_secs))
            .user_agent(concat!("folio-admin/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            endpoint: backend.endpoint.trim_end_matches('/').to_string(),
            project_id: backend.project_id.clone(),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Start a request to `path` (relative to the endpoint) with the project header set
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.endpoint, path))
            .header(PROJECT_HEADER, &self.project_id)
    }

    /// Start a request authenticated with a session secret
    pub fn with_session(&self, method: Method, path: &str, secret: &str) -> RequestBuilder {
        self.request(method, path).header(SESSION_HEADER, secret)
    }

    /// Start a request authenticated with a short-lived JWT
    pub fn with_jwt(&self, method: Method, path: &str, jwt: &str) -> RequestBuilder {
        self.request(method, path).header(JWT_HEADER, jwt)
    }

    /// Send a request and decode its JSON body.
    ///
    /// 4xx replies come back as [`RestOutcome::Refused`]; 5xx replies and
    /// transport failures are errors. An empty success body decodes as `null`.
    pub async fn send<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> Result<RestOutcome<T>> {
        let response = builder.send().await.context("Failed to reach backend")?;
        let status = response.status();

        if !status.is_success() {
            return refusal(response).await;
        }

        let body = response
            .text()
            .await
            .context("Failed to read backend response")?;
        let value = if body.trim().is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_str(&body).context("Backend returned invalid JSON")?
        };
        let decoded = serde_json::from_value(value).context("Unexpected backend response")?;
        Ok(RestOutcome::Ok(decoded))
    }

    /// Open an email/password session, returning its secret
    pub async fn open_session(
        &self,
        email: &str,
        password: &str,
    ) -> Result<RestOutcome<OpenedSession>> {
        let response = self
            .request(Method::POST, "/account/sessions/email")
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await
            .context("Failed to reach backend")?;

        if !response.status().is_success() {
            return refusal(response).await;
        }

        let cookie_secret = self.session_cookie(&response);
        let body: SessionBody = response
            .json()
            .await
            .context("Failed to parse session response")?;

        let secret = if body.secret.is_empty() {
            cookie_secret.unwrap_or_default()
        } else {
            body.secret
        };
        if secret.is_empty() {
            anyhow::bail!("Backend did not return a session secret");
        }

        debug!(user_id = %body.user_id, "Opened backend session");
        Ok(RestOutcome::Ok(OpenedSession {
            user_id: body.user_id,
            secret,
        }))
    }

    /// Delete every session of the account behind `secret`
    pub async fn close_sessions(&self, secret: &str) -> Result<()> {
        let builder = self.with_session(Method::DELETE, "/account/sessions", secret);
        match self.send::<serde_json::Value>(builder).await? {
            RestOutcome::Ok(_) => Ok(()),
            RestOutcome::Refused(e) => anyhow::bail!("Failed to close sessions: {}", e.message),
        }
    }

    fn session_cookie(&self, response: &Response) -> Option<String> {
        let name = format!("a_session_{}=", self.project_id.to_lowercase());
        response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .find_map(|cookie| {
                cookie
                    .strip_prefix(&name)
                    .map(|rest| rest.split(';').next().unwrap_or_default().to_string())
            })
    }
}

async fn refusal<T>(response: Response) -> Result<RestOutcome<T>> {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    if status.is_server_error() {
        return Err(BackendError::Status {
            status: status.as_u16(),
            body,
        }
        .into());
    }

    let error = serde_json::from_str::<RemoteError>(&body).unwrap_or_else(|_| RemoteError {
        message: if body.is_empty() {
            status.to_string()
        } else {
            body
        },
        code: status.as_u16(),
        error_type: None,
    });
    debug!(status = status.as_u16(), error_type = ?error.error_type, "Backend refused request");
    Ok(RestOutcome::Refused(error))
}
