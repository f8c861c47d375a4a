use std::fmt;

use tokio::time::Instant;

use crate::auth::domain::auth_client::{AuthAccepted, AuthError, Credentials};
use crate::capture::domain::captured_frame::CapturedFrame;
use crate::detection::domain::face_probe::DetectionSample;
use crate::session::session_config::SessionConfig;

/// What a session is for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionMode {
    /// One frame, verified remotely with these credentials.
    Login { credentials: Credentials },
    /// Five frames, collected locally for a later enrollment.
    Register,
}

impl SessionMode {
    pub fn kind(&self) -> ModeKind {
        match self {
            SessionMode::Login { .. } => ModeKind::Login,
            SessionMode::Register => ModeKind::Register,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModeKind {
    Login,
    Register,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Starting,
    Polling,
    /// Login only: a verify call is outstanding.
    Submitting,
    Authenticated,
    Collected,
    Failed,
    TimedOut,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Authenticated
                | SessionState::Collected
                | SessionState::Failed
                | SessionState::TimedOut
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FailureReason {
    Device(String),
    ModelLoad(String),
    NotRecognized,
    Cancelled,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Device(msg) => write!(f, "camera error: {msg}"),
            FailureReason::ModelLoad(msg) => write!(f, "face model failed to load: {msg}"),
            FailureReason::NotRecognized => write!(f, "not recognized"),
            FailureReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum SessionOutcome {
    Authenticated { similarity: Option<f64> },
    /// Frames in capture order.
    Collected(Vec<CapturedFrame>),
    Failed(FailureReason),
    TimedOut,
}

impl SessionOutcome {
    pub fn state(&self) -> SessionState {
        match self {
            SessionOutcome::Authenticated { .. } => SessionState::Authenticated,
            SessionOutcome::Collected(_) => SessionState::Collected,
            SessionOutcome::Failed(_) => SessionState::Failed,
            SessionOutcome::TimedOut => SessionState::TimedOut,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(
            self,
            SessionOutcome::Authenticated { .. } | SessionOutcome::Collected(_)
        )
    }
}

/// What a tick should do after seeing a detection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickDecision {
    /// No face, or not confident enough.
    Searching,
    /// Login: snapshot and verify. The in-flight guard is now set.
    Verify,
    /// Register: snapshot and keep it.
    Capture,
    /// Register: confident face, but too soon after the previous capture.
    Throttled,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickStats {
    pub ticks: u64,
    pub skipped: u64,
    pub probes: u64,
}

/// One run of the capture state machine. Pure bookkeeping: the driver owns
/// the timers and the I/O and reports what happened.
#[derive(Debug)]
pub struct CaptureSession {
    mode: ModeKind,
    config: SessionConfig,
    state: SessionState,
    deadline: Option<Instant>,
    failures: u32,
    in_flight: bool,
    frames: Vec<CapturedFrame>,
    last_capture: Option<Instant>,
    stats: TickStats,
    outcome: Option<SessionOutcome>,
}

impl CaptureSession {
    pub fn new(mode: ModeKind, config: SessionConfig) -> Self {
        Self {
            mode,
            config,
            state: SessionState::Idle,
            deadline: None,
            failures: 0,
            in_flight: false,
            frames: Vec::new(),
            last_capture: None,
            stats: TickStats::default(),
            outcome: None,
        }
    }

    pub fn mode(&self) -> ModeKind {
        self.mode
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn captured(&self) -> usize {
        self.frames.len()
    }

    pub fn stats(&self) -> TickStats {
        self.stats
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn outcome(&self) -> Option<&SessionOutcome> {
        self.outcome.as_ref()
    }

    pub fn begin_start(&mut self) {
        if self.state == SessionState::Idle {
            self.state = SessionState::Starting;
        }
    }

    /// Device and model are ready; the deadline runs from `now`.
    pub fn begin_polling(&mut self, now: Instant) -> Instant {
        let deadline = now + self.config.session_timeout;
        if self.state == SessionState::Starting {
            self.state = SessionState::Polling;
            self.deadline = Some(deadline);
        }
        deadline
    }

    /// Counts a tick and says whether it may probe for a face. Ticks during
    /// an outstanding verify or after termination are skipped whole.
    pub fn on_tick(&mut self) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.stats.ticks += 1;
        if self.in_flight || self.state != SessionState::Polling {
            self.stats.skipped += 1;
            return false;
        }
        self.stats.probes += 1;
        true
    }

    pub fn on_detection(&mut self, sample: &DetectionSample, now: Instant) -> TickDecision {
        if self.state != SessionState::Polling || self.in_flight {
            return TickDecision::Searching;
        }
        if !sample.passes(self.config.confidence_threshold) {
            return TickDecision::Searching;
        }
        match self.mode {
            ModeKind::Login => {
                self.in_flight = true;
                self.state = SessionState::Submitting;
                TickDecision::Verify
            }
            ModeKind::Register => match self.last_capture {
                Some(last) if now.duration_since(last) < self.config.min_capture_gap => {
                    TickDecision::Throttled
                }
                _ => TickDecision::Capture,
            },
        }
    }

    /// Register: keeps a snapshot. The capture gap is measured from its
    /// `captured_at`. Returns the outcome once the last required frame has
    /// arrived.
    pub fn record_capture(&mut self, frame: CapturedFrame) -> Option<&SessionOutcome> {
        if self.is_terminal() || self.mode != ModeKind::Register {
            return None;
        }
        if self.frames.len() < self.config.required_frame_count {
            self.last_capture = Some(frame.captured_at());
            self.frames.push(frame);
        }
        if self.frames.len() >= self.config.required_frame_count {
            let frames = std::mem::take(&mut self.frames);
            return self.finish(SessionOutcome::Collected(frames));
        }
        None
    }

    /// Login: settles the outstanding verify.
    pub fn on_verify_result(
        &mut self,
        result: Result<AuthAccepted, AuthError>,
    ) -> Option<&SessionOutcome> {
        if self.is_terminal() {
            return None;
        }
        match result {
            Ok(accepted) => self.finish(SessionOutcome::Authenticated {
                similarity: accepted.similarity,
            }),
            Err(_) => self.on_attempt_failed(),
        }
    }

    /// Login: a verify was rejected or its snapshot could not be taken.
    /// The count never resets within a session.
    pub fn on_attempt_failed(&mut self) -> Option<&SessionOutcome> {
        if self.is_terminal() {
            return None;
        }
        self.failures += 1;
        self.in_flight = false;
        if self.failures >= self.config.max_consecutive_failures {
            return self.finish(SessionOutcome::Failed(FailureReason::NotRecognized));
        }
        self.state = SessionState::Polling;
        None
    }

    pub fn time_out(&mut self) -> Option<&SessionOutcome> {
        self.finish(SessionOutcome::TimedOut)
    }

    pub fn fail(&mut self, reason: FailureReason) -> Option<&SessionOutcome> {
        self.finish(SessionOutcome::Failed(reason))
    }

    /// Moves to a terminal state. The first outcome wins; later calls are
    /// ignored and return `None`.
    pub fn finish(&mut self, outcome: SessionOutcome) -> Option<&SessionOutcome> {
        if self.is_terminal() {
            return None;
        }
        self.state = outcome.state();
        self.in_flight = false;
        self.outcome = Some(outcome);
        self.outcome.as_ref()
    }

    pub fn take_outcome(&mut self) -> Option<SessionOutcome> {
        self.outcome.take()
    }
}
