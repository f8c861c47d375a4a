use async_trait::async_trait;
use thiserror::Error;

use crate::capture::domain::captured_frame::CapturedFrame;
use crate::shared::frame::Frame;

#[derive(Error, Debug)]
pub enum MediaError {
    /// The device could not be opened or never produced a frame.
    #[error("camera unavailable: {0}")]
    Device(String),
    /// A snapshot was requested without an active frame, or encoding failed.
    #[error("capture failed: {0}")]
    Capture(String),
}

/// Negotiated stream geometry, known once the first frame has arrived.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamInfo {
    pub width: u32,
    pub height: u32,
}

/// A live video source that can be polled for its current frame and
/// snapshotted into an encoded still.
#[async_trait]
pub trait MediaSource: Send {
    /// Opens the device and resolves once the first frame's dimensions are
    /// known.
    async fn start(&mut self) -> Result<StreamInfo, MediaError>;

    /// Releases the device. Safe to call any number of times, including
    /// when `start` failed or was never called.
    fn stop(&mut self);

    fn is_active(&self) -> bool;

    /// The most recent frame, if the source is producing any.
    fn current_frame(&mut self) -> Option<Frame>;

    /// Mirrors and encodes the current frame.
    fn capture(&mut self) -> Result<CapturedFrame, MediaError>;
}
