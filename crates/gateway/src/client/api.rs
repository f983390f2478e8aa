//! Typed client for the gateway's HTTP surface

use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use super::consumer::{StreamConsumer, StreamObserver, StreamOutcome};
use super::error::{ClientError, ClientResult};
use crate::auth::AuthContext;

/// Account creation payload for `POST /api/user/register`
#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub password_confirmation: String,
}

/// Credentials for `POST /api/user/login`
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Token issued by the user service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Lifetime in seconds
    #[serde(default)]
    pub expires_in: Option<u64>,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

/// The caller's identity as reported by the user service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    #[serde(default)]
    pub id: Option<u64>,
    pub name: String,
    pub email: String,
    /// Any further fields the user service returns
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Acknowledgement from the user service, e.g. after logout
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageResponse {
    pub message: String,
}

/// Response to a successful registration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegisterResponse {
    pub message: String,
    pub user: UserProfile,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    message: &'a str,
}

/// Gateway API client.
///
/// Holds no credentials of its own; every authenticated call takes an
/// explicit [`AuthContext`].
#[derive(Debug, Clone)]
pub struct GatewayClient {
    base: Url,
    http: Client,
}

impl GatewayClient {
    pub fn new(base: Url) -> Self {
        Self::with_client(base, Client::new())
    }

    pub fn with_client(base: Url, http: Client) -> Self {
        Self { base, http }
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base.as_str().trim_end_matches('/'))
    }

    /// Create an account
    pub async fn register(&self, request: &RegisterRequest) -> ClientResult<RegisterResponse> {
        let builder = self.http.post(self.endpoint("/api/user/register")).json(request);
        read_json(builder).await
    }

    /// Exchange credentials for a token
    pub async fn login(&self, request: &LoginRequest) -> ClientResult<TokenResponse> {
        let builder = self.http.post(self.endpoint("/api/user/login")).json(request);
        read_json(builder).await
    }

    /// Ask the user service who the token belongs to
    pub async fn me(&self, auth: &AuthContext) -> ClientResult<UserProfile> {
        let builder = auth.attach(self.http.get(self.endpoint("/api/user/me")));
        read_json(builder).await
    }

    /// Invalidate the token on the user service
    pub async fn logout(&self, auth: &AuthContext) -> ClientResult<MessageResponse> {
        let builder = auth.attach(self.http.post(self.endpoint("/api/user/logout")));
        read_json(builder).await
    }

    /// Send a chat message and stream the reply into `observer`
    pub async fn stream_chat<O>(
        &self,
        message: &str,
        auth: &AuthContext,
        observer: &mut O,
    ) -> StreamOutcome
    where
        O: StreamObserver + ?Sized,
    {
        let builder = self
            .http
            .post(self.endpoint("/api/chatbot"))
            .json(&ChatRequest { message });
        StreamConsumer::stream(auth.attach(builder), observer).await
    }
}

async fn read_json<T: DeserializeOwned>(builder: RequestBuilder) -> ClientResult<T> {
    let response = check_status(builder.send().await?).await?;
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| ClientError::Decode(e.to_string()))
}

async fn check_status(response: Response) -> ClientResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ClientError::Status { status, body })
}
