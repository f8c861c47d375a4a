use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::domain::auth_client::{
    check_frame_count, AuthAccepted, AuthError, Credentials, RemoteAuthClient,
};
use crate::capture::domain::captured_frame::CapturedFrame;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
    image_base64: String,
}

#[derive(Serialize)]
struct RegisterRequest<'a> {
    username: &'a str,
    password: &'a str,
    images: Vec<String>,
}

#[derive(Deserialize)]
struct AuthResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: String,
    similarity: Option<f64>,
}

/// JSON-over-HTTP client for the FaceGate auth service.
pub struct HttpAuthClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpAuthClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AuthError::Network(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
        default_failure: &str,
    ) -> Result<AuthAccepted, AuthError> {
        let url = format!("{}/{endpoint}", self.base_url);
        log::debug!("POST {url}");

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        if !status.is_success() {
            let message = rejection_message(&bytes, default_failure);
            log::warn!("{url} answered {status}: {message}");
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: AuthResponse =
            serde_json::from_slice(&bytes).map_err(|e| AuthError::Decode(e.to_string()))?;
        Ok(AuthAccepted {
            status: parsed.status,
            message: parsed.message,
            similarity: parsed.similarity,
        })
    }
}

/// Picks the most specific explanation out of an error body: `detail`, then
/// `message`, then `default`.
fn rejection_message(body: &[u8], default: &str) -> String {
    let Ok(value) = serde_json::from_slice::<Value>(body) else {
        return default.to_string();
    };
    ["detail", "message"]
        .iter()
        .filter_map(|key| value.get(key))
        .find_map(|field| match field {
            Value::Null => None,
            Value::String(s) if s.is_empty() => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        })
        .unwrap_or_else(|| default.to_string())
}

#[async_trait]
impl RemoteAuthClient for HttpAuthClient {
    async fn verify(
        &self,
        credentials: &Credentials,
        frame: &CapturedFrame,
    ) -> Result<AuthAccepted, AuthError> {
        let body = LoginRequest {
            username: &credentials.username,
            password: &credentials.password,
            image_base64: frame.to_data_url(),
        };
        self.post("login", &body, "Login failed").await
    }

    async fn enroll(
        &self,
        credentials: &Credentials,
        frames: &[CapturedFrame],
    ) -> Result<AuthAccepted, AuthError> {
        check_frame_count(frames)?;
        let body = RegisterRequest {
            username: &credentials.username,
            password: &credentials.password,
            images: frames.iter().map(CapturedFrame::to_data_url).collect(),
        };
        self.post("register", &body, "Registration failed").await
    }
}
