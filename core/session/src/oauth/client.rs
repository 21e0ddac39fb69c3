//! Identity service client.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use fsgate_common::{Error, RemoteError, Result, User};

use super::config::OAuthConfig;

/// User id as reported by the identity service, number or string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserId {
    Number(u64),
    Text(String),
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UserId::Number(id) => write!(f, "{}", id),
            UserId::Text(id) => f.write_str(id),
        }
    }
}

/// The logged-in user's profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub uid: UserId,
    pub uname: String,
    #[serde(default)]
    pub portrait: Option<String>,
}

impl UserInfo {
    /// Build the session user for this profile, validated now.
    pub fn into_user(self, token: &str, config: &OAuthConfig) -> User {
        let mut user = User::new(self.uid.to_string(), self.uname).with_token(token);
        if let Some(portrait) = self.portrait {
            user.small_image = Some(format!("{}{}", config.small_portrait_url, portrait));
            user.large_image = Some(format!("{}{}", config.large_portrait_url, portrait));
        }
        user
    }
}

/// Looks up the user an access token belongs to.
#[async_trait]
pub trait UserInfoClient: Send + Sync {
    /// # Errors
    /// - [`Error::InvalidSession`] when the service rejects the token
    /// - [`Error::Network`] or [`Error::Remote`] for failures worth retrying
    async fn fetch(&self, endpoint: &str, access_token: &str) -> Result<UserInfo>;
}

/// [`UserInfoClient`] over HTTPS.
pub struct PassportClient {
    http: Client,
}

impl PassportClient {
    pub fn new() -> Result<Self> {
        let http = Client::builder()
            .user_agent("fsgate/0.1")
            .build()
            .map_err(|e| Error::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { http })
    }

    fn parse(body: Value, status: u16) -> Result<UserInfo> {
        if let Some(code) = body.get("error_code").filter(|code| !code.is_null()) {
            let message = body
                .get("error_msg")
                .and_then(Value::as_str)
                .unwrap_or("rejected");
            return Err(Error::InvalidSession(format!(
                "Token rejected ({}): {}",
                code, message
            )));
        }
        if !(200..300).contains(&status) {
            return Err(Error::Remote(RemoteError {
                status: Some(status),
                code: None,
                message: body.to_string(),
            }));
        }
        serde_json::from_value(body).map_err(Error::from)
    }
}

#[async_trait]
impl UserInfoClient for PassportClient {
    async fn fetch(&self, endpoint: &str, access_token: &str) -> Result<UserInfo> {
        debug!("Fetching logged-in user from {}", endpoint);

        let response = self
            .http
            .get(endpoint)
            .query(&[("access_token", access_token)])
            .send()
            .await
            .map_err(|e| Error::Network(format!("User info request failed: {}", e)))?;

        let status = response.status().as_u16();
        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::Network(format!("Failed to parse user info: {}", e)))?;

        Self::parse(body, status)
    }
}
