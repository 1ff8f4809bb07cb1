//! FCM HTTP v1 client.
//!
//! Authenticates with a Google service account: a short-lived RS256 JWT is
//! exchanged for an OAuth2 access token at the account's token endpoint, and
//! the token is cached until shortly before expiry. Message sends post to
//! the v1 `messages:send` endpoint with an android channel, APNs badge and
//! optional data payload.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::backend::server::config::PushConfig;

/// OAuth2 scope for Firebase Cloud Messaging.
pub const FCM_SCOPE: &str = "https://www.googleapis.com/auth/firebase.messaging";

#[derive(Debug, Error)]
pub enum PushError {
    #[error("failed to read service account key: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid service account key: {0}")]
    Key(#[from] serde_json::Error),

    #[error("failed to sign token request: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("push request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Rejected(String),
}

#[derive(Debug, Clone, Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    token_uri: String,
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// A notification to deliver to one device
#[derive(Debug, Clone)]
pub struct PushMessage {
    pub title: String,
    pub body: String,
    pub data: serde_json::Value,
    /// Badge count shown on iOS, forwarded to APNs
    pub badge: i32,
}

/// FCM client bound to one project
#[derive(Clone)]
pub struct FcmClient {
    http: reqwest::Client,
    key: Arc<ServiceAccountKey>,
    project_id: String,
    token: Arc<Mutex<Option<CachedToken>>>,
}

impl FcmClient {
    /// Load the service account key from disk and build the client.
    pub fn load(config: &PushConfig) -> Result<Self, PushError> {
        let raw = std::fs::read_to_string(&config.key_path)?;
        let key: ServiceAccountKey = serde_json::from_str(&raw)?;
        Ok(Self {
            http: reqwest::Client::new(),
            key: Arc::new(key),
            project_id: config.project_id.clone(),
            token: Arc::new(Mutex::new(None)),
        })
    }

    fn send_url(&self) -> String {
        format!(
            "https://fcm.googleapis.com/v1/projects/{}/messages:send",
            self.project_id
        )
    }

    /// OAuth2 access token, cached until a minute before expiry.
    async fn access_token(&self) -> Result<String, PushError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Utc::now() + Duration::seconds(60) {
                return Ok(token.token.clone());
            }
        }

        let now = Utc::now().timestamp();
        let claims = serde_json::json!({
            "iss": self.key.client_email,
            "scope": FCM_SCOPE,
            "aud": self.key.token_uri,
            "iat": now,
            "exp": now + 3600,
        });
        let assertion = encode(
            &Header::new(Algorithm::RS256),
            &claims,
            &EncodingKey::from_rsa_pem(self.key.private_key.as_bytes())?,
        )?;

        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: String,
            expires_in: i64,
        }

        let response = self
            .http
            .post(&self.key.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PushError::Rejected(format!(
                "token endpoint responded {}: {}",
                status, body
            )));
        }

        let token: TokenResponse = response.json().await?;
        let expires_at = Utc::now() + Duration::seconds(token.expires_in);
        *cached = Some(CachedToken {
            token: token.access_token.clone(),
            expires_at,
        });
        Ok(token.access_token)
    }

    /// Send a notification to one registration token. Returns the FCM
    /// response body.
    pub async fn send_to_token(
        &self,
        token: &str,
        message: &PushMessage,
    ) -> Result<serde_json::Value, PushError> {
        let access_token = self.access_token().await?;
        let body = message_body(token, message);

        let response = self
            .http
            .post(self.send_url())
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let json: serde_json::Value = response.json().await.unwrap_or(serde_json::Value::Null);
        if !status.is_success() {
            return Err(PushError::Rejected(format!(
                "fcm responded {}: {}",
                status, json
            )));
        }
        Ok(json)
    }
}

/// FCM v1 request body for one device.
fn message_body(token: &str, message: &PushMessage) -> serde_json::Value {
    serde_json::json!({
        "message": {
            "token": token,
            "notification": {
                "title": message.title,
                "body": message.body,
            },
            "android": {
                "priority": "HIGH",
                "notification": {
                    "channel_id": "default",
                    "sound": "default",
                },
            },
            "apns": {
                "payload": {
                    "aps": {
                        "badge": message.badge,
                        "sound": "default",
                    },
                },
            },
            "data": message.data,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_body_shape() {
        let message = PushMessage {
            title: "New payment".to_string(),
            body: "A receipt was uploaded".to_string(),
            data: serde_json::json!({"payment_id": "123"}),
            badge: 4,
        };
        let body = message_body("device-token", &message);

        assert_eq!(body["message"]["token"], "device-token");
        assert_eq!(body["message"]["notification"]["title"], "New payment");
        assert_eq!(body["message"]["android"]["priority"], "HIGH");
        assert_eq!(
            body["message"]["android"]["notification"]["channel_id"],
            "default"
        );
        assert_eq!(body["message"]["apns"]["payload"]["aps"]["badge"], 4);
        assert_eq!(body["message"]["data"]["payment_id"], "123");
    }
}
