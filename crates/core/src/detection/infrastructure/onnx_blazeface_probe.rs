/// BlazeFace face probe using ONNX Runtime via `ort`.
///
/// Reports only the single most confident face per frame. Candidates below
/// `MIN_SCORE` are discarded before selection; the caller applies its own,
/// stricter gate.
use std::path::Path;

use async_trait::async_trait;

use crate::detection::domain::detection_overlay::DetectionOverlay;
use crate::detection::domain::face_probe::{DetectionSample, FaceProbe, ModelLoadError};
use crate::shared::frame::Frame;
use crate::shared::model_resolver::{self, ModelLocation};
use crate::shared::region::Region;

/// BlazeFace model input resolution.
const INPUT_SIZE: u32 = 128;

/// Minimum score for a candidate box.
pub const MIN_SCORE: f64 = 0.5;

/// Number of BlazeFace anchors (short-range model).
const NUM_ANCHORS: usize = 896;

/// Values per anchor in the regressor output (box + 6 keypoints).
const REGRESSOR_STRIDE: usize = 16;

pub struct OnnxBlazefaceProbe {
    location: ModelLocation,
    session: Option<ort::session::Session>,
    anchors: Vec<[f32; 2]>,
    overlay: Option<DetectionOverlay>,
}

impl OnnxBlazefaceProbe {
    pub fn new(location: ModelLocation) -> Self {
        Self {
            location,
            session: None,
            anchors: generate_anchors(),
            overlay: None,
        }
    }

    /// Keeps a detection overlay in sync with every `detect` call.
    pub fn with_overlay(mut self) -> Self {
        self.overlay = Some(DetectionOverlay::new(0, 0));
        self
    }

    pub fn overlay(&self) -> Option<&DetectionOverlay> {
        self.overlay.as_ref()
    }

    fn infer(&mut self, frame: &Frame) -> Result<Option<Candidate>, Box<dyn std::error::Error>> {
        let Some(session) = self.session.as_mut() else {
            return Ok(None);
        };

        let input_value = ort::value::Tensor::from_array(preprocess(frame, INPUT_SIZE))?;
        let outputs = session.run(ort::inputs![input_value])?;

        // regressors: [1, 896, 16], classificators: [1, 896, 1]
        if outputs.len() < 2 {
            return Err(
                format!("BlazeFace model expected 2 outputs, got {}", outputs.len()).into(),
            );
        }
        let regressors = outputs[0].try_extract_array::<f32>()?;
        let scores = outputs[1].try_extract_array::<f32>()?;
        let reg_data = regressors.as_slice().ok_or("Cannot get regressor slice")?;
        let score_data = scores.as_slice().ok_or("Cannot get score slice")?;

        Ok(best_candidate(
            reg_data,
            score_data,
            &self.anchors,
            (frame.width(), frame.height()),
        ))
    }

    fn update_overlay(&mut self, frame: &Frame, sample: &DetectionSample) {
        if let Some(overlay) = self.overlay.as_mut() {
            overlay.resize(frame.width(), frame.height());
            overlay.redraw(sample.region().zip(sample.confidence()));
        }
    }
}

#[async_trait]
impl FaceProbe for OnnxBlazefaceProbe {
    async fn load_model(&mut self) -> Result<(), ModelLoadError> {
        if self.session.is_some() {
            return Ok(());
        }

        let location = self.location.clone();
        let session = tokio::task::spawn_blocking(move || -> Result<_, ModelLoadError> {
            let path = model_resolver::resolve(&location)?;
            log::info!("Loading face model from {}", path.display());
            build_session(&path).map_err(|e| ModelLoadError::Session(e.to_string()))
        })
        .await
        .map_err(|e| ModelLoadError::Task(e.to_string()))??;

        self.session = Some(session);
        Ok(())
    }

    async fn detect(&mut self, frame: &Frame) -> DetectionSample {
        let sample = if frame.is_blank() || frame.channels() != 3 {
            DetectionSample::Absent
        } else {
            match self.infer(frame) {
                Ok(Some(c)) => DetectionSample::Present {
                    confidence: c.score,
                    region: c.region,
                },
                Ok(None) => DetectionSample::Absent,
                Err(e) => {
                    log::warn!("Face inference failed on frame {}: {e}", frame.sequence());
                    DetectionSample::Absent
                }
            }
        };
        self.update_overlay(frame, &sample);
        sample
    }

    fn is_loaded(&self) -> bool {
        self.session.is_some()
    }
}

fn build_session(path: &Path) -> Result<ort::session::Session, Box<dyn std::error::Error>> {
    Ok(ort::session::Session::builder()?.commit_from_file(path)?)
}

/// Resize frame to `size × size` and normalize to [0,1] NCHW float32.
fn preprocess(frame: &Frame, size: u32) -> ndarray::Array4<f32> {
    let src = frame.as_ndarray();
    let src_h = frame.height() as usize;
    let src_w = frame.width() as usize;
    let s = size as usize;

    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, s, s));
    for y in 0..s {
        let src_y = (((y as f64 + 0.5) * src_h as f64 / s as f64) as usize).min(src_h - 1);
        for x in 0..s {
            let src_x = (((x as f64 + 0.5) * src_w as f64 / s as f64) as usize).min(src_w - 1);
            for c in 0..3 {
                tensor[[0, c, y, x]] = src[[src_y, src_x, c]] as f32 / 255.0;
            }
        }
    }
    tensor
}

/// BlazeFace short-range anchors: a 16×16 grid with 2 anchors per cell,
/// then an 8×8 grid with 6.
fn generate_anchors() -> Vec<[f32; 2]> {
    let strides = [(8, 2), (16, 6)];
    let mut anchors = Vec::with_capacity(NUM_ANCHORS);

    for &(stride, num) in &strides {
        let grid_size = INPUT_SIZE as usize / stride;
        for y in 0..grid_size {
            for x in 0..grid_size {
                let cx = (x as f32 + 0.5) / grid_size as f32;
                let cy = (y as f32 + 0.5) / grid_size as f32;
                for _ in 0..num {
                    anchors.push([cx, cy]);
                }
            }
        }
    }
    anchors
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Candidate {
    region: Region,
    score: f64,
}

/// Decodes the highest-scoring anchor at or above `MIN_SCORE` into a
/// region in frame coordinates.
fn best_candidate(
    reg_data: &[f32],
    score_data: &[f32],
    anchors: &[[f32; 2]],
    (fw, fh): (u32, u32),
) -> Option<Candidate> {
    let (index, score) = score_data
        .iter()
        .take(anchors.len().min(NUM_ANCHORS))
        .enumerate()
        .map(|(i, &raw)| (i, sigmoid(raw) as f64))
        .filter(|&(i, score)| {
            score >= MIN_SCORE && (i + 1) * REGRESSOR_STRIDE <= reg_data.len()
        })
        .max_by(|a, b| a.1.total_cmp(&b.1))?;

    let anchor = anchors[index];
    let offset = index * REGRESSOR_STRIDE;
    let scale = INPUT_SIZE as f32;
    let cx = anchor[0] + reg_data[offset] / scale;
    let cy = anchor[1] + reg_data[offset + 1] / scale;
    let w = reg_data[offset + 2] / scale;
    let h = reg_data[offset + 3] / scale;

    let x1 = ((cx - w / 2.0) * fw as f32).round() as i32;
    let y1 = ((cy - h / 2.0) * fh as f32).round() as i32;
    let region = Region::new(
        x1,
        y1,
        (w * fw as f32).round() as i32,
        (h * fh as f32).round() as i32,
    )
    .clamp_to(fw, fh);

    Some(Candidate { region, score })
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use tempfile::TempDir;

    fn uniform_frame(w: u32, h: u32, value: u8) -> Frame {
        Frame::new(vec![value; (w * h * 3) as usize], w, h, 3, 0)
    }

    /// Logit that maps to `p` after the sigmoid.
    fn logit(p: f32) -> f32 {
        (p / (1.0 - p)).ln()
    }

    #[test]
    fn test_preprocess_shape_and_range() {
        let tensor = preprocess(&uniform_frame(200, 100, 255), 128);
        assert_eq!(tensor.shape(), &[1, 3, 128, 128]);
        assert_relative_eq!(tensor[[0, 0, 0, 0]], 1.0, epsilon = 0.01);
    }

    #[test]
    fn test_generate_anchors_count_and_range() {
        let anchors = generate_anchors();
        assert_eq!(anchors.len(), NUM_ANCHORS);
        assert!(anchors
            .iter()
            .all(|a| a[0] > 0.0 && a[0] < 1.0 && a[1] > 0.0 && a[1] < 1.0));
    }

    #[test]
    fn test_sigmoid() {
        assert_relative_eq!(sigmoid(0.0), 0.5, epsilon = 1e-6);
        assert!(sigmoid(10.0) > 0.999);
        assert!(sigmoid(-10.0) < 0.001);
    }

    #[test]
    fn test_best_candidate_picks_highest_score() {
        let anchors = generate_anchors();
        let mut scores = vec![-10.0f32; NUM_ANCHORS];
        let mut regs = vec![0.0f32; NUM_ANCHORS * REGRESSOR_STRIDE];
        scores[3] = logit(0.6);
        scores[100] = logit(0.9);
        regs[100 * REGRESSOR_STRIDE + 2] = 32.0;
        regs[100 * REGRESSOR_STRIDE + 3] = 32.0;

        let best = best_candidate(&regs, &scores, &anchors, (640, 480)).unwrap();

        assert_relative_eq!(best.score, 0.9, epsilon = 1e-4);
        // 32/128 of the frame on each axis
        assert_eq!((best.region.width, best.region.height), (160, 120));
    }

    #[test]
    fn test_best_candidate_ignores_scores_below_minimum() {
        let anchors = generate_anchors();
        let mut scores = vec![-10.0f32; NUM_ANCHORS];
        scores[7] = logit(0.45);
        let regs = vec![0.0f32; NUM_ANCHORS * REGRESSOR_STRIDE];

        assert!(best_candidate(&regs, &scores, &anchors, (640, 480)).is_none());
    }

    #[test]
    fn test_best_candidate_clamps_to_frame() {
        let anchors = generate_anchors();
        let mut scores = vec![-10.0f32; NUM_ANCHORS];
        let mut regs = vec![0.0f32; NUM_ANCHORS * REGRESSOR_STRIDE];
        // Anchor 0 sits in the top-left cell; a wide box spills off the edge.
        scores[0] = logit(0.8);
        regs[2] = 64.0;
        regs[3] = 64.0;

        let best = best_candidate(&regs, &scores, &anchors, (640, 480)).unwrap();

        assert_eq!((best.region.x, best.region.y), (0, 0));
        assert!(best.region.width < 320);
    }

    #[tokio::test]
    async fn test_unloaded_probe_reports_absent() {
        let mut probe = OnnxBlazefaceProbe::new(ModelLocation::default()).with_overlay();
        assert!(!probe.is_loaded());

        let sample = probe.detect(&uniform_frame(64, 48, 128)).await;

        assert_eq!(sample, DetectionSample::Absent);
        assert_eq!(probe.overlay().unwrap().image().dimensions(), (64, 48));
    }

    #[tokio::test]
    async fn test_corrupt_model_is_session_error() {
        let tmp = TempDir::new().unwrap();
        let name = "facegate-test-corrupt-model.onnx";
        std::fs::write(tmp.path().join(name), b"not an onnx model").unwrap();
        let mut probe = OnnxBlazefaceProbe::new(ModelLocation {
            name: name.to_string(),
            url: "http://127.0.0.1:9/unreachable.onnx".to_string(),
            bundled_dir: Some(tmp.path().to_path_buf()),
        });

        let result = probe.load_model().await;

        assert!(matches!(result, Err(ModelLoadError::Session(_))));
        assert!(!probe.is_loaded());
    }
}
