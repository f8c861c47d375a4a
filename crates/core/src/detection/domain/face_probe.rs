use async_trait::async_trait;
use thiserror::Error;

use crate::shared::frame::Frame;
use crate::shared::model_resolver::ModelResolveError;
use crate::shared::region::Region;

#[derive(Error, Debug)]
pub enum ModelLoadError {
    #[error(transparent)]
    Resolve(#[from] ModelResolveError),
    #[error("failed to build inference session: {0}")]
    Session(String),
    #[error("model loading task failed: {0}")]
    Task(String),
}

/// Result of probing one frame: the single most confident face, if any.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DetectionSample {
    Absent,
    Present { confidence: f64, region: Region },
}

impl DetectionSample {
    pub fn confidence(&self) -> Option<f64> {
        match self {
            DetectionSample::Absent => None,
            DetectionSample::Present { confidence, .. } => Some(*confidence),
        }
    }

    pub fn region(&self) -> Option<Region> {
        match self {
            DetectionSample::Absent => None,
            DetectionSample::Present { region, .. } => Some(*region),
        }
    }

    /// Strictly above `threshold`; a score equal to it does not pass.
    pub fn passes(&self, threshold: f64) -> bool {
        self.confidence().is_some_and(|c| c > threshold)
    }
}

/// Domain interface for the face gate.
///
/// `detect` never fails: an unloaded model or a broken inference both read
/// as "no face".
#[async_trait]
pub trait FaceProbe: Send {
    /// Loads the model once. Later calls return immediately.
    async fn load_model(&mut self) -> Result<(), ModelLoadError>;

    async fn detect(&mut self, frame: &Frame) -> DetectionSample;

    fn is_loaded(&self) -> bool;
}
