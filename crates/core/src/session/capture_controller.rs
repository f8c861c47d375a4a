use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::Notify;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::auth::domain::auth_client::{AuthAccepted, AuthError, Credentials, RemoteAuthClient};
use crate::capture::domain::media_source::MediaSource;
use crate::detection::domain::face_probe::FaceProbe;
use crate::session::capture_session::{
    CaptureSession, FailureReason, ModeKind, SessionMode, SessionOutcome, TickDecision,
};
use crate::session::session_config::{SessionConfig, MIN_TICK_INTERVAL};
use crate::session::session_signals::{NullSignals, SessionSignals, SessionStatus};

type VerifyFuture = Pin<Box<dyn Future<Output = Result<AuthAccepted, AuthError>> + Send>>;

/// Ends the running session of the controller it came from.
///
/// Cancelling while no session is running has no effect on later ones.
#[derive(Clone, Debug, Default)]
pub struct CancelHandle {
    notify: Arc<Notify>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.notify.notify_waiters();
    }
}

/// Drives one [`CaptureSession`] at a time against live collaborators.
///
/// The media source and probe are kept between runs so the model loads once.
pub struct CaptureController {
    media: Box<dyn MediaSource>,
    probe: Box<dyn FaceProbe>,
    auth: Arc<dyn RemoteAuthClient>,
    signals: Box<dyn SessionSignals>,
    login_config: SessionConfig,
    register_config: SessionConfig,
    cancel: CancelHandle,
    last_status: Option<SessionStatus>,
}

impl CaptureController {
    pub fn new(
        media: Box<dyn MediaSource>,
        probe: Box<dyn FaceProbe>,
        auth: Arc<dyn RemoteAuthClient>,
    ) -> Self {
        Self {
            media,
            probe,
            auth,
            signals: Box::new(NullSignals),
            login_config: SessionConfig::login(),
            register_config: SessionConfig::register(),
            cancel: CancelHandle::default(),
            last_status: None,
        }
    }

    pub fn with_signals(mut self, signals: Box<dyn SessionSignals>) -> Self {
        self.signals = signals;
        self
    }

    pub fn with_login_config(mut self, config: SessionConfig) -> Self {
        self.login_config = config;
        self
    }

    pub fn with_register_config(mut self, config: SessionConfig) -> Self {
        self.register_config = config;
        self
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn auth_client(&self) -> Arc<dyn RemoteAuthClient> {
        Arc::clone(&self.auth)
    }

    /// Runs a session to its terminal outcome. The media source is stopped
    /// on every path out, including a failed start.
    pub async fn run(&mut self, mode: SessionMode) -> SessionOutcome {
        let config = match mode.kind() {
            ModeKind::Login => self.login_config.clone(),
            ModeKind::Register => self.register_config.clone(),
        };
        let credentials = match &mode {
            SessionMode::Login { credentials } => Some(credentials.clone()),
            SessionMode::Register => None,
        };

        let cancel = self.cancel.clone();
        let cancelled = cancel.notify.notified();
        tokio::pin!(cancelled);

        let mut session = CaptureSession::new(mode.kind(), config);
        self.last_status = None;
        self.signals.submit_enabled(false);
        self.emit(SessionStatus::Starting);
        session.begin_start();
        log::info!("Starting {:?} session", session.mode());

        let started = tokio::select! {
            biased;
            _ = &mut cancelled => Err(FailureReason::Cancelled),
            result = Self::start_collaborators(self.media.as_mut(), self.probe.as_mut()) => result,
        };
        if let Err(reason) = started {
            log::error!("Session could not start: {reason}");
            session.fail(reason);
            return self.conclude(session);
        }

        let now = Instant::now();
        let deadline = tokio::time::sleep_until(session.begin_polling(now));
        tokio::pin!(deadline);

        let period = session.config().tick_interval.max(MIN_TICK_INTERVAL);
        let mut ticker = interval_at(now + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut in_flight: Option<VerifyFuture> = None;
        self.emit(SessionStatus::Searching);

        while !session.is_terminal() {
            tokio::select! {
                biased;
                _ = &mut cancelled => {
                    session.fail(FailureReason::Cancelled);
                }
                _ = &mut deadline => {
                    if in_flight.is_some() {
                        log::debug!("Abandoning outstanding verify at deadline");
                    }
                    session.time_out();
                }
                result = pending_verify(&mut in_flight), if in_flight.is_some() => {
                    in_flight = None;
                    self.settle_verify(&mut session, result);
                }
                _ = ticker.tick() => {
                    self.tick(&mut session, credentials.as_ref(), &mut in_flight).await;
                }
            }
        }

        drop(in_flight);
        self.conclude(session)
    }

    async fn start_collaborators(
        media: &mut dyn MediaSource,
        probe: &mut dyn FaceProbe,
    ) -> Result<(), FailureReason> {
        let info = media
            .start()
            .await
            .map_err(|e| FailureReason::Device(e.to_string()))?;
        log::debug!("Media source ready at {}x{}", info.width, info.height);
        probe
            .load_model()
            .await
            .map_err(|e| FailureReason::ModelLoad(e.to_string()))
    }

    async fn tick(
        &mut self,
        session: &mut CaptureSession,
        credentials: Option<&Credentials>,
        in_flight: &mut Option<VerifyFuture>,
    ) {
        if !session.on_tick() {
            log::debug!("Tick skipped while a verify is outstanding");
            return;
        }

        let Some(frame) = self.media.current_frame() else {
            self.emit(SessionStatus::Searching);
            return;
        };
        let sample = self.probe.detect(&frame).await;
        let now = Instant::now();
        let decision = session.on_detection(&sample, now);
        log::debug!(
            "Frame {} confidence {:?}: {decision:?}",
            frame.sequence(),
            sample.confidence()
        );

        match decision {
            TickDecision::Searching => self.emit(SessionStatus::Searching),
            TickDecision::Throttled => {}
            TickDecision::Verify => match (self.media.capture(), credentials) {
                (Ok(snapshot), Some(credentials)) => {
                    let auth = Arc::clone(&self.auth);
                    let credentials = credentials.clone();
                    let verify = async move { auth.verify(&credentials, &snapshot).await };
                    *in_flight = Some(Box::pin(verify));
                    self.emit(SessionStatus::Verifying);
                }
                (Err(e), _) => {
                    log::warn!("Snapshot for verification failed: {e}");
                    self.record_failed_attempt(session);
                }
                (Ok(_), None) => {
                    log::warn!("Login session has no credentials");
                    self.record_failed_attempt(session);
                }
            },
            TickDecision::Capture => match self.media.capture() {
                Ok(snapshot) => {
                    let required = session.config().required_frame_count;
                    if session.record_capture(snapshot).is_none() {
                        self.emit(SessionStatus::Collecting {
                            captured: session.captured(),
                            required,
                        });
                    }
                }
                Err(e) => log::warn!("Snapshot for registration failed: {e}"),
            },
        }
    }

    fn settle_verify(
        &mut self,
        session: &mut CaptureSession,
        result: Result<AuthAccepted, AuthError>,
    ) {
        match &result {
            Ok(accepted) => log::info!("Verified: {}", accepted.message),
            Err(e) => log::warn!("Verification rejected: {e}"),
        }
        if session.on_verify_result(result).is_none() {
            self.emit_retrying(session);
        }
    }

    fn record_failed_attempt(&mut self, session: &mut CaptureSession) {
        if session.on_attempt_failed().is_none() {
            self.emit_retrying(session);
        }
    }

    fn emit_retrying(&mut self, session: &CaptureSession) {
        self.emit(SessionStatus::Retrying {
            failures: session.failures(),
            limit: session.config().max_consecutive_failures,
        });
    }

    fn emit(&mut self, status: SessionStatus) {
        if self.last_status.as_ref() != Some(&status) {
            self.signals.status(&status);
            self.last_status = Some(status);
        }
    }

    /// Stops the media source and reports the outcome exactly once.
    fn conclude(&mut self, mut session: CaptureSession) -> SessionOutcome {
        self.media.stop();

        let outcome = session
            .take_outcome()
            .unwrap_or(SessionOutcome::Failed(FailureReason::Cancelled));
        let stats = session.stats();
        log::info!(
            "Session ended {:?} after {} ticks ({} skipped, {} probed)",
            outcome.state(),
            stats.ticks,
            stats.skipped,
            stats.probes
        );

        self.emit(SessionStatus::from_outcome(&outcome));
        self.signals.submit_enabled(outcome.is_success());
        self.signals.finished(&outcome);
        outcome
    }
}

/// Resolves with the outstanding verify, or never if there is none.
async fn pending_verify(slot: &mut Option<VerifyFuture>) -> Result<AuthAccepted, AuthError> {
    match slot.as_mut() {
        Some(verify) => verify.await,
        None => std::future::pending().await,
    }
}
