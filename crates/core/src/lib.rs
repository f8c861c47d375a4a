//! Face-gated capture sessions for biometric login and registration.
//!
//! A [`session::capture_controller::CaptureController`] polls a camera
//! through a face probe and either verifies one snapshot remotely (login)
//! or collects five for enrollment (registration).

pub mod auth;
pub mod binding;
pub mod capture;
pub mod detection;
pub mod session;
pub mod shared;
