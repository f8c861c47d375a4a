use async_trait::async_trait;
use thiserror::Error;

use crate::capture::domain::captured_frame::CapturedFrame;
use crate::shared::constants::REQUIRED_FRAME_COUNT;

/// Username and password as typed by the user.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// A username with something besides whitespace and a non-empty password.
    pub fn is_complete(&self) -> bool {
        !self.username.trim().is_empty() && !self.password.is_empty()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A 2xx answer from the auth service.
#[derive(Clone, Debug, PartialEq)]
pub struct AuthAccepted {
    pub status: String,
    pub message: String,
    pub similarity: Option<f64>,
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("{message} (HTTP {status})")]
    Rejected { status: u16, message: String },
    #[error("auth service unreachable: {0}")]
    Network(String),
    #[error("unreadable auth response: {0}")]
    Decode(String),
    #[error("enrollment needs exactly {expected} frames, got {actual}")]
    FrameCount { expected: usize, actual: usize },
}

impl AuthError {
    /// Text suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            AuthError::Rejected { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Checks the enrollment frame count before anything leaves the machine.
pub fn check_frame_count(frames: &[CapturedFrame]) -> Result<(), AuthError> {
    if frames.len() == REQUIRED_FRAME_COUNT {
        Ok(())
    } else {
        Err(AuthError::FrameCount {
            expected: REQUIRED_FRAME_COUNT,
            actual: frames.len(),
        })
    }
}

/// Remote face verification and enrollment.
///
/// Shared between the controller's in-flight verify future and the page,
/// hence `Send + Sync` and `&self`.
#[async_trait]
pub trait RemoteAuthClient: Send + Sync {
    async fn verify(
        &self,
        credentials: &Credentials,
        frame: &CapturedFrame,
    ) -> Result<AuthAccepted, AuthError>;

    async fn enroll(
        &self,
        credentials: &Credentials,
        frames: &[CapturedFrame],
    ) -> Result<AuthAccepted, AuthError>;
}
