use crate::auth::domain::auth_client::Credentials;
use crate::binding::forms::{validate_login, FormError};
use crate::binding::navigation::Navigation;
use crate::session::capture_controller::{CancelHandle, CaptureController};
use crate::session::capture_session::{SessionMode, SessionOutcome};

/// Login page logic: one face-gated session, then a submit that only
/// proceeds once the face has been verified.
pub struct LoginPage {
    controller: CaptureController,
    authenticated: bool,
}

impl LoginPage {
    pub fn new(controller: CaptureController) -> Self {
        Self {
            controller,
            authenticated: false,
        }
    }

    pub fn can_begin(credentials: &Credentials) -> bool {
        validate_login(credentials).is_ok()
    }

    /// Starts a fresh login session. Any earlier verification is forgotten.
    pub async fn begin(&mut self, credentials: Credentials) -> Result<SessionOutcome, FormError> {
        validate_login(&credentials)?;
        self.authenticated = false;

        let outcome = self.controller.run(SessionMode::Login { credentials }).await;
        self.authenticated = matches!(outcome, SessionOutcome::Authenticated { .. });
        Ok(outcome)
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn submit_enabled(&self) -> bool {
        self.authenticated
    }

    pub fn submit(&self) -> Navigation {
        if self.authenticated {
            Navigation::Dashboard
        } else {
            Navigation::Stay
        }
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.controller.cancel_handle()
    }
}
