use image::codecs::jpeg::JpegEncoder;
use tokio::time::Instant;

use crate::capture::domain::captured_frame::CapturedFrame;
use crate::capture::domain::media_source::MediaError;
use crate::shared::frame::Frame;

/// Mirrors a frame horizontally and encodes it as JPEG.
///
/// The mirror makes the still match the selfie-style preview the user sees.
pub fn encode_snapshot(frame: &Frame, quality: u8) -> Result<CapturedFrame, MediaError> {
    if frame.is_blank() {
        return Err(MediaError::Capture("source has no active frame".to_string()));
    }
    if frame.channels() != 3 {
        return Err(MediaError::Capture(format!(
            "expected RGB frame, got {} channels",
            frame.channels()
        )));
    }

    let img = image::RgbImage::from_raw(frame.width(), frame.height(), frame.data().to_vec())
        .ok_or_else(|| MediaError::Capture("frame data does not match dimensions".to_string()))?;
    let mirrored = image::imageops::flip_horizontal(&img);

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, quality.clamp(1, 100))
        .encode(
            mirrored.as_raw(),
            mirrored.width(),
            mirrored.height(),
            image::ExtendedColorType::Rgb8,
        )
        .map_err(|e| MediaError::Capture(e.to_string()))?;

    Ok(CapturedFrame::new(
        jpeg,
        frame.width(),
        frame.height(),
        Instant::now(),
    ))
}
