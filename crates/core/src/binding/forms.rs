use thiserror::Error;

use crate::auth::domain::auth_client::Credentials;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormError {
    #[error("username and password are required")]
    Incomplete,
    #[error("passwords do not match")]
    PasswordMismatch,
}

/// Login form: the start button stays disabled until this passes.
pub fn validate_login(credentials: &Credentials) -> Result<(), FormError> {
    if credentials.is_complete() {
        Ok(())
    } else {
        Err(FormError::Incomplete)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RegistrationForm {
    pub username: String,
    pub password: String,
    pub confirm_password: String,
}

impl RegistrationForm {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        confirm_password: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            confirm_password: confirm_password.into(),
        }
    }

    /// Whether to show the mismatch hint. Stays hidden until the user has
    /// typed something into the confirmation field.
    pub fn shows_mismatch(&self) -> bool {
        !self.confirm_password.is_empty() && self.password != self.confirm_password
    }

    pub fn validate(&self) -> Result<Credentials, FormError> {
        let credentials = Credentials::new(self.username.clone(), self.password.clone());
        validate_login(&credentials)?;
        if self.password != self.confirm_password {
            return Err(FormError::PasswordMismatch);
        }
        Ok(credentials)
    }
}
