use base64::{engine::general_purpose, Engine as _};
use tokio::time::Instant;

/// An encoded JPEG still taken from the live source.
#[derive(Clone, Debug, PartialEq)]
pub struct CapturedFrame {
    jpeg: Vec<u8>,
    width: u32,
    height: u32,
    captured_at: Instant,
}

impl CapturedFrame {
    pub fn new(jpeg: Vec<u8>, width: u32, height: u32, captured_at: Instant) -> Self {
        Self {
            jpeg,
            width,
            height,
            captured_at,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.jpeg
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    /// `data:image/jpeg;base64,...`, the form the auth service expects.
    pub fn to_data_url(&self) -> String {
        format!(
            "data:image/jpeg;base64,{}",
            general_purpose::STANDARD.encode(&self.jpeg)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_url_has_jpeg_prefix_and_base64_payload() {
        let frame = CapturedFrame::new(vec![0xFF, 0xD8, 0xFF], 1, 1, Instant::now());
        assert_eq!(frame.to_data_url(), "data:image/jpeg;base64,/9j/");
    }

    #[test]
    fn test_accessors() {
        let at = Instant::now();
        let frame = CapturedFrame::new(vec![1, 2, 3], 640, 480, at);
        assert_eq!(frame.bytes(), &[1, 2, 3]);
        assert_eq!((frame.width(), frame.height()), (640, 480));
        assert_eq!(frame.captured_at(), at);
    }
}
