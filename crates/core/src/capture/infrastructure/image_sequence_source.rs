use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::capture::domain::captured_frame::CapturedFrame;
use crate::capture::domain::media_source::{MediaError, MediaSource, StreamInfo};
use crate::capture::infrastructure::jpeg_snapshot::encode_snapshot;
use crate::shared::constants::{IMAGE_EXTENSIONS, SNAPSHOT_QUALITY};
use crate::shared::frame::Frame;

/// Replays a directory of still images as if it were a live camera.
///
/// Images are decoded on `start` and served in file-name order; every call
/// to `current_frame` advances to the next image, wrapping around at the end.
pub struct ImageSequenceSource {
    dir: PathBuf,
    quality: u8,
    frames: Vec<Frame>,
    cursor: usize,
    current: Option<usize>,
}

impl ImageSequenceSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            quality: SNAPSHOT_QUALITY,
            frames: Vec::new(),
            cursor: 0,
            current: None,
        }
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality;
        self
    }

    fn load_frames(dir: &Path) -> Result<Vec<Frame>, MediaError> {
        let entries = std::fs::read_dir(dir)
            .map_err(|e| MediaError::Device(format!("{}: {e}", dir.display())))?;

        let mut paths: Vec<PathBuf> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| is_image(path))
            .collect();
        paths.sort();

        let mut frames = Vec::with_capacity(paths.len());
        for (sequence, path) in paths.iter().enumerate() {
            match image::open(path) {
                Ok(img) => {
                    let rgb = img.to_rgb8();
                    let (w, h) = rgb.dimensions();
                    frames.push(Frame::new(rgb.into_raw(), w, h, 3, sequence as u64));
                }
                Err(e) => log::warn!("Skipping {}: {e}", path.display()),
            }
        }
        Ok(frames)
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

#[async_trait]
impl MediaSource for ImageSequenceSource {
    async fn start(&mut self) -> Result<StreamInfo, MediaError> {
        let frames = Self::load_frames(&self.dir)?;
        let first = frames.first().ok_or_else(|| {
            MediaError::Device(format!("no readable images in {}", self.dir.display()))
        })?;
        let info = StreamInfo {
            width: first.width(),
            height: first.height(),
        };

        log::info!(
            "Replaying {} images from {}",
            frames.len(),
            self.dir.display()
        );
        self.frames = frames;
        self.cursor = 0;
        self.current = None;
        Ok(info)
    }

    fn stop(&mut self) {
        self.frames.clear();
        self.cursor = 0;
        self.current = None;
    }

    fn is_active(&self) -> bool {
        !self.frames.is_empty()
    }

    fn current_frame(&mut self) -> Option<Frame> {
        if self.frames.is_empty() {
            return None;
        }
        let index = self.cursor % self.frames.len();
        self.cursor = self.cursor.wrapping_add(1);
        self.current = Some(index);
        Some(self.frames[index].clone())
    }

    /// Snapshots the image most recently handed out by `current_frame`.
    fn capture(&mut self) -> Result<CapturedFrame, MediaError> {
        let frame = self
            .current
            .and_then(|i| self.frames.get(i))
            .ok_or_else(|| MediaError::Capture("source has no active frame".to_string()))?;
        encode_snapshot(frame, self.quality)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_image(dir: &Path, name: &str, w: u32, h: u32, shade: u8) {
        let img = image::RgbImage::from_pixel(w, h, image::Rgb([shade, shade, shade]));
        img.save(dir.join(name)).unwrap();
    }

    #[tokio::test]
    async fn test_start_reports_first_image_dimensions() {
        let tmp = TempDir::new().unwrap();
        write_image(tmp.path(), "a.png", 32, 24, 10);
        write_image(tmp.path(), "b.png", 32, 24, 200);
        let mut source = ImageSequenceSource::new(tmp.path());

        let info = source.start().await.unwrap();

        assert_eq!(info, StreamInfo { width: 32, height: 24 });
        assert!(source.is_active());
    }

    #[tokio::test]
    async fn test_frames_cycle_in_name_order() {
        let tmp = TempDir::new().unwrap();
        write_image(tmp.path(), "02.png", 4, 4, 200);
        write_image(tmp.path(), "01.png", 4, 4, 10);
        std::fs::write(tmp.path().join("notes.txt"), "ignored").unwrap();
        let mut source = ImageSequenceSource::new(tmp.path());
        source.start().await.unwrap();

        let shades: Vec<u8> = (0..3)
            .map(|_| source.current_frame().unwrap().data()[0])
            .collect();

        assert_eq!(shades, vec![10, 200, 10]);
    }

    #[tokio::test]
    async fn test_empty_directory_is_device_error() {
        let tmp = TempDir::new().unwrap();
        let mut source = ImageSequenceSource::new(tmp.path());
        assert!(matches!(source.start().await, Err(MediaError::Device(_))));
        assert!(!source.is_active());
    }

    #[tokio::test]
    async fn test_missing_directory_is_device_error() {
        let mut source = ImageSequenceSource::new("/nonexistent/frames");
        assert!(matches!(source.start().await, Err(MediaError::Device(_))));
    }

    #[tokio::test]
    async fn test_capture_requires_a_polled_frame() {
        let tmp = TempDir::new().unwrap();
        write_image(tmp.path(), "a.png", 16, 16, 128);
        let mut source = ImageSequenceSource::new(tmp.path());
        source.start().await.unwrap();

        assert!(matches!(source.capture(), Err(MediaError::Capture(_))));
        source.current_frame();
        let snapshot = source.capture().unwrap();
        assert_eq!((snapshot.width(), snapshot.height()), (16, 16));
    }

    #[tokio::test]
    async fn test_stop_releases_frames_and_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        write_image(tmp.path(), "a.png", 8, 8, 1);
        let mut source = ImageSequenceSource::new(tmp.path());
        source.start().await.unwrap();

        source.stop();
        source.stop();

        assert!(!source.is_active());
        assert!(source.current_frame().is_none());
    }
}
