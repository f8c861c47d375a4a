pub mod capture_controller;
pub mod capture_session;
pub mod session_config;
pub mod session_signals;

#[cfg(test)]
pub(crate) mod test_stubs;
