use std::fmt;

use tokio::sync::mpsc;

use crate::session::capture_session::{FailureReason, SessionOutcome};

/// User-facing progress of a session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionStatus {
    Starting,
    Searching,
    Verifying,
    Retrying { failures: u32, limit: u32 },
    Collecting { captured: usize, required: usize },
    Authenticated,
    Collected,
    Failed(FailureReason),
    TimedOut,
}

impl SessionStatus {
    pub fn from_outcome(outcome: &SessionOutcome) -> Self {
        match outcome {
            SessionOutcome::Authenticated { .. } => SessionStatus::Authenticated,
            SessionOutcome::Collected(_) => SessionStatus::Collected,
            SessionOutcome::Failed(reason) => SessionStatus::Failed(reason.clone()),
            SessionOutcome::TimedOut => SessionStatus::TimedOut,
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Starting => write!(f, "Starting camera..."),
            SessionStatus::Searching => write!(f, "Please hold still and look straight ahead..."),
            SessionStatus::Verifying => write!(f, "Verifying..."),
            SessionStatus::Retrying { failures, limit } => {
                write!(f, "Verifying... (attempt {failures}/{limit} failed)")
            }
            SessionStatus::Collecting { captured, required } => {
                write!(f, "Scanning face data ({captured}/{required})...")
            }
            SessionStatus::Authenticated => write!(f, "Face verified"),
            SessionStatus::Collected => write!(f, "Face data collected"),
            SessionStatus::Failed(FailureReason::NotRecognized) => {
                write!(f, "Could not recognize you. Please try again.")
            }
            SessionStatus::Failed(FailureReason::Cancelled) => write!(f, "Cancelled"),
            SessionStatus::Failed(reason) => write!(f, "Error: {reason}"),
            SessionStatus::TimedOut => write!(f, "Timed out. Try again?"),
        }
    }
}

/// Push notifications from a running session to whatever hosts it.
pub trait SessionSignals: Send {
    fn status(&mut self, status: &SessionStatus);
    fn submit_enabled(&mut self, enabled: bool);
    fn finished(&mut self, outcome: &SessionOutcome);
}

pub struct NullSignals;

impl SessionSignals for NullSignals {
    fn status(&mut self, _status: &SessionStatus) {}
    fn submit_enabled(&mut self, _enabled: bool) {}
    fn finished(&mut self, _outcome: &SessionOutcome) {}
}

/// Forwards signals to the `log` facade.
pub struct LogSignals;

impl SessionSignals for LogSignals {
    fn status(&mut self, status: &SessionStatus) {
        log::info!("{status}");
    }

    fn submit_enabled(&mut self, enabled: bool) {
        log::debug!("Submit {}", if enabled { "enabled" } else { "disabled" });
    }

    fn finished(&mut self, outcome: &SessionOutcome) {
        if outcome.is_success() {
            log::info!("{}", summarize(outcome));
        } else {
            log::warn!("{}", summarize(outcome));
        }
    }
}

fn summarize(outcome: &SessionOutcome) -> String {
    match outcome {
        SessionOutcome::Authenticated {
            similarity: Some(similarity),
        } => format!("Session authenticated (similarity {similarity:.2})"),
        SessionOutcome::Authenticated { similarity: None } => "Session authenticated".to_string(),
        SessionOutcome::Collected(frames) => format!("Session collected {} frames", frames.len()),
        SessionOutcome::Failed(reason) => format!("Session failed: {reason}"),
        SessionOutcome::TimedOut => "Session timed out".to_string(),
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    Status(SessionStatus),
    SubmitEnabled(bool),
    Finished(SessionOutcome),
}

/// Queues every signal as a [`SessionEvent`] for a UI running elsewhere.
pub struct ChannelSignals {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl ChannelSignals {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: SessionEvent) {
        // A closed receiver just means nobody is watching.
        let _ = self.tx.send(event);
    }
}

impl SessionSignals for ChannelSignals {
    fn status(&mut self, status: &SessionStatus) {
        self.send(SessionEvent::Status(status.clone()));
    }

    fn submit_enabled(&mut self, enabled: bool) {
        self.send(SessionEvent::SubmitEnabled(enabled));
    }

    fn finished(&mut self, outcome: &SessionOutcome) {
        self.send(SessionEvent::Finished(outcome.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_signals_preserve_order() {
        let (mut signals, mut rx) = ChannelSignals::new();

        signals.status(&SessionStatus::Searching);
        signals.submit_enabled(true);
        signals.finished(&SessionOutcome::TimedOut);

        assert_eq!(
            rx.try_recv().unwrap(),
            SessionEvent::Status(SessionStatus::Searching)
        );
        assert_eq!(rx.try_recv().unwrap(), SessionEvent::SubmitEnabled(true));
        assert_eq!(
            rx.try_recv().unwrap(),
            SessionEvent::Finished(SessionOutcome::TimedOut)
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_channel_signals_tolerate_dropped_receiver() {
        let (mut signals, rx) = ChannelSignals::new();
        drop(rx);
        signals.status(&SessionStatus::Starting);
    }

    #[test]
    fn test_log_summary_per_outcome() {
        assert_eq!(
            summarize(&SessionOutcome::Authenticated {
                similarity: Some(0.914)
            }),
            "Session authenticated (similarity 0.91)"
        );
        assert_eq!(
            summarize(&SessionOutcome::Failed(FailureReason::Cancelled)),
            "Session failed: cancelled"
        );
        assert_eq!(summarize(&SessionOutcome::TimedOut), "Session timed out");
    }

    #[test]
    fn test_status_from_outcome() {
        assert_eq!(
            SessionStatus::from_outcome(&SessionOutcome::Failed(FailureReason::NotRecognized)),
            SessionStatus::Failed(FailureReason::NotRecognized)
        );
        assert_eq!(
            SessionStatus::from_outcome(&SessionOutcome::Collected(Vec::new())),
            SessionStatus::Collected
        );
    }

    #[test]
    fn test_status_text() {
        assert_eq!(
            SessionStatus::Collecting {
                captured: 2,
                required: 5
            }
            .to_string(),
            "Scanning face data (2/5)..."
        );
        assert_eq!(SessionStatus::TimedOut.to_string(), "Timed out. Try again?");
    }
}
