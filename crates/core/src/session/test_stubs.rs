//! Scripted collaborators for driving sessions under paused tokio time.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::auth::domain::auth_client::{
    check_frame_count, AuthAccepted, AuthError, Credentials, RemoteAuthClient,
};
use crate::capture::domain::captured_frame::CapturedFrame;
use crate::capture::domain::media_source::{MediaError, MediaSource, StreamInfo};
use crate::detection::domain::face_probe::{DetectionSample, FaceProbe, ModelLoadError};
use crate::shared::frame::Frame;
use crate::shared::region::Region;

#[derive(Default)]
pub struct Counters {
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
    pub captures: AtomicUsize,
    pub detects: AtomicUsize,
    pub verifies: AtomicUsize,
    pub enrolls: AtomicUsize,
    pub outstanding: AtomicUsize,
    pub max_outstanding: AtomicUsize,
}

impl Counters {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

// --- Media ---

pub struct StubMedia {
    counters: Arc<Counters>,
    start_error: Option<String>,
    fail_captures: bool,
    active: bool,
    sequence: u64,
}

impl StubMedia {
    pub fn new(counters: Arc<Counters>) -> Self {
        Self {
            counters,
            start_error: None,
            fail_captures: false,
            active: false,
            sequence: 0,
        }
    }

    pub fn failing_start(mut self, message: &str) -> Self {
        self.start_error = Some(message.to_string());
        self
    }

    pub fn failing_captures(mut self) -> Self {
        self.fail_captures = true;
        self
    }
}

#[async_trait]
impl MediaSource for StubMedia {
    async fn start(&mut self) -> Result<StreamInfo, MediaError> {
        self.counters.starts.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.start_error {
            return Err(MediaError::Device(message.clone()));
        }
        self.active = true;
        Ok(StreamInfo {
            width: 4,
            height: 4,
        })
    }

    fn stop(&mut self) {
        self.counters.stops.fetch_add(1, Ordering::SeqCst);
        self.active = false;
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn current_frame(&mut self) -> Option<Frame> {
        if !self.active {
            return None;
        }
        self.sequence += 1;
        Some(Frame::new(vec![128; 4 * 4 * 3], 4, 4, 3, self.sequence))
    }

    fn capture(&mut self) -> Result<CapturedFrame, MediaError> {
        if self.fail_captures || !self.active {
            return Err(MediaError::Capture("source has no active frame".to_string()));
        }
        self.counters.captures.fetch_add(1, Ordering::SeqCst);
        Ok(CapturedFrame::new(
            self.sequence.to_be_bytes().to_vec(),
            4,
            4,
            Instant::now(),
        ))
    }
}

// --- Probe ---

/// Plays back one confidence per `detect`, then repeats `fallback`.
pub struct StubProbe {
    counters: Arc<Counters>,
    script: VecDeque<Option<f64>>,
    fallback: Option<f64>,
    load_error: Option<String>,
    loaded: bool,
}

impl StubProbe {
    pub fn new(counters: Arc<Counters>, fallback: Option<f64>) -> Self {
        Self {
            counters,
            script: VecDeque::new(),
            fallback,
            load_error: None,
            loaded: false,
        }
    }

    pub fn scripted(mut self, script: &[Option<f64>]) -> Self {
        self.script = script.iter().copied().collect();
        self
    }

    pub fn failing_load(mut self, message: &str) -> Self {
        self.load_error = Some(message.to_string());
        self
    }
}

#[async_trait]
impl FaceProbe for StubProbe {
    async fn load_model(&mut self) -> Result<(), ModelLoadError> {
        if let Some(message) = &self.load_error {
            return Err(ModelLoadError::Session(message.clone()));
        }
        self.loaded = true;
        Ok(())
    }

    async fn detect(&mut self, _frame: &Frame) -> DetectionSample {
        self.counters.detects.fetch_add(1, Ordering::SeqCst);
        let confidence = self.script.pop_front().unwrap_or(self.fallback);
        match confidence {
            Some(confidence) => DetectionSample::Present {
                confidence,
                region: Region::new(0, 0, 4, 4),
            },
            None => DetectionSample::Absent,
        }
    }

    fn is_loaded(&self) -> bool {
        self.loaded
    }
}

// --- Auth ---

pub struct StubAuth {
    counters: Arc<Counters>,
    verify_results: Mutex<VecDeque<Result<AuthAccepted, AuthError>>>,
    enroll_result: Mutex<Option<Result<AuthAccepted, AuthError>>>,
    latency: Duration,
}

impl StubAuth {
    /// Rejects every verify unless told otherwise.
    pub fn new(counters: Arc<Counters>) -> Self {
        Self {
            counters,
            verify_results: Mutex::new(VecDeque::new()),
            enroll_result: Mutex::new(None),
            latency: Duration::ZERO,
        }
    }

    pub fn verifying(self, results: Vec<Result<AuthAccepted, AuthError>>) -> Self {
        *self.verify_results.lock().unwrap() = results.into();
        self
    }

    pub fn enrolling(self, result: Result<AuthAccepted, AuthError>) -> Self {
        *self.enroll_result.lock().unwrap() = Some(result);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

pub fn accepted(similarity: Option<f64>) -> Result<AuthAccepted, AuthError> {
    Ok(AuthAccepted {
        status: "success".to_string(),
        message: "Welcome".to_string(),
        similarity,
    })
}

pub fn rejected() -> Result<AuthAccepted, AuthError> {
    Err(AuthError::Rejected {
        status: 401,
        message: "Face does not match".to_string(),
    })
}

#[async_trait]
impl RemoteAuthClient for StubAuth {
    async fn verify(
        &self,
        _credentials: &Credentials,
        _frame: &CapturedFrame,
    ) -> Result<AuthAccepted, AuthError> {
        self.counters.verifies.fetch_add(1, Ordering::SeqCst);
        let now = self.counters.outstanding.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.max_outstanding.fetch_max(now, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        self.counters.outstanding.fetch_sub(1, Ordering::SeqCst);
        self.verify_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(rejected)
    }

    async fn enroll(
        &self,
        _credentials: &Credentials,
        frames: &[CapturedFrame],
    ) -> Result<AuthAccepted, AuthError> {
        self.counters.enrolls.fetch_add(1, Ordering::SeqCst);
        check_frame_count(frames)?;
        self.enroll_result
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| accepted(None))
    }
}

pub fn alice() -> Credentials {
    Credentials::new("alice", "secret")
}
