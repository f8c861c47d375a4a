use std::sync::Arc;

use thiserror::Error;

use crate::auth::domain::auth_client::{AuthError, Credentials, RemoteAuthClient};
use crate::binding::forms::{FormError, RegistrationForm};
use crate::binding::navigation::Navigation;
use crate::capture::domain::captured_frame::CapturedFrame;
use crate::session::capture_controller::{CancelHandle, CaptureController};
use crate::session::capture_session::{SessionMode, SessionOutcome};
use crate::shared::constants::REQUIRED_FRAME_COUNT;

#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("face data incomplete: {captured} of {required} frames collected")]
    NotEnoughFrames { captured: usize, required: usize },
    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl SubmitError {
    /// Text suitable for showing to the user; server rejections carry their
    /// own wording.
    pub fn user_message(&self) -> String {
        match self {
            SubmitError::Auth(e) => e.user_message(),
            other => other.to_string(),
        }
    }
}

/// Server acknowledgement of a finished enrollment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Enrolled {
    pub message: String,
    pub navigation: Navigation,
}

/// Registration page logic: collect five frames, then enroll them on
/// submit.
pub struct RegisterPage {
    controller: CaptureController,
    auth: Arc<dyn RemoteAuthClient>,
    credentials: Option<Credentials>,
    frames: Vec<CapturedFrame>,
}

impl RegisterPage {
    pub fn new(controller: CaptureController) -> Self {
        let auth = controller.auth_client();
        Self {
            controller,
            auth,
            credentials: None,
            frames: Vec::new(),
        }
    }

    /// Collects a fresh set of frames. Frames from an earlier run are
    /// discarded before the camera starts.
    pub async fn begin(&mut self, form: &RegistrationForm) -> Result<SessionOutcome, FormError> {
        let credentials = form.validate()?;
        self.frames.clear();
        self.credentials = Some(credentials);

        let outcome = self.controller.run(SessionMode::Register).await;
        if let SessionOutcome::Collected(frames) = &outcome {
            self.frames = frames.clone();
        }
        Ok(outcome)
    }

    pub fn captured(&self) -> usize {
        self.frames.len()
    }

    pub fn submit_enabled(&self) -> bool {
        self.frames.len() >= REQUIRED_FRAME_COUNT
    }

    /// Enrolls the collected frames. On failure the frames are kept so the
    /// user can submit again without re-scanning.
    pub async fn submit(&mut self) -> Result<Enrolled, SubmitError> {
        let credentials = match &self.credentials {
            Some(credentials) if self.submit_enabled() => credentials,
            _ => {
                return Err(SubmitError::NotEnoughFrames {
                    captured: self.frames.len(),
                    required: REQUIRED_FRAME_COUNT,
                })
            }
        };

        let accepted = self.auth.enroll(credentials, &self.frames).await?;
        log::info!("Enrolled {}: {}", credentials.username, accepted.message);
        Ok(Enrolled {
            message: accepted.message,
            navigation: Navigation::Login,
        })
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.controller.cancel_handle()
    }
}
