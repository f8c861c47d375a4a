use image::{Rgba, RgbaImage};

use crate::shared::constants::CONFIDENCE_THRESHOLD;
use crate::shared::region::Region;

const AFFIRMATIVE: Rgba<u8> = Rgba([0x10, 0xB9, 0x81, 0xFF]);
const CAUTIONARY: Rgba<u8> = Rgba([0xEF, 0x44, 0x44, 0xFF]);
const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

const STROKE: u32 = 2;

/// Transparent raster laid over the preview, showing the current face box.
///
/// Every redraw starts from a cleared canvas so a box never outlives the
/// detection that produced it.
pub struct DetectionOverlay {
    canvas: RgbaImage,
}

impl DetectionOverlay {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            canvas: RgbaImage::from_pixel(width, height, TRANSPARENT),
        }
    }

    /// Matches the canvas to the video resolution. A size change discards
    /// the current contents.
    pub fn resize(&mut self, width: u32, height: u32) {
        if self.canvas.dimensions() != (width, height) {
            self.canvas = RgbaImage::from_pixel(width, height, TRANSPARENT);
        }
    }

    pub fn clear(&mut self) {
        for pixel in self.canvas.pixels_mut() {
            *pixel = TRANSPARENT;
        }
    }

    /// Clears, then outlines `detection` if there is one.
    pub fn redraw(&mut self, detection: Option<(Region, f64)>) {
        self.clear();
        let Some((region, confidence)) = detection else {
            return;
        };
        let (w, h) = self.canvas.dimensions();
        let region = region.clamp_to(w, h);
        if region.is_empty() {
            return;
        }
        self.outline(&region, box_color(confidence));
    }

    pub fn image(&self) -> &RgbaImage {
        &self.canvas
    }

    fn outline(&mut self, region: &Region, color: Rgba<u8>) {
        let x0 = region.x as u32;
        let y0 = region.y as u32;
        let x1 = x0 + region.width as u32;
        let y1 = y0 + region.height as u32;

        for y in y0..y1 {
            for x in x0..x1 {
                let on_edge = x < x0 + STROKE
                    || x + STROKE >= x1
                    || y < y0 + STROKE
                    || y + STROKE >= y1;
                if on_edge {
                    self.canvas.put_pixel(x, y, color);
                }
            }
        }
    }
}

fn box_color(confidence: f64) -> Rgba<u8> {
    if confidence >= CONFIDENCE_THRESHOLD {
        AFFIRMATIVE
    } else {
        CAUTIONARY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn painted(overlay: &DetectionOverlay) -> usize {
        overlay.image().pixels().filter(|p| p.0[3] != 0).count()
    }

    #[test]
    fn test_confident_box_is_affirmative() {
        let mut overlay = DetectionOverlay::new(100, 80);
        overlay.redraw(Some((Region::new(10, 10, 40, 30), 0.9)));
        assert_eq!(*overlay.image().get_pixel(10, 10), AFFIRMATIVE);
        assert_eq!(*overlay.image().get_pixel(30, 25), TRANSPARENT);
    }

    #[test]
    fn test_threshold_score_is_affirmative() {
        let mut overlay = DetectionOverlay::new(100, 80);
        overlay.redraw(Some((Region::new(10, 10, 40, 30), 0.7)));
        assert_eq!(*overlay.image().get_pixel(10, 10), AFFIRMATIVE);
    }

    #[test]
    fn test_weak_box_is_cautionary() {
        let mut overlay = DetectionOverlay::new(100, 80);
        overlay.redraw(Some((Region::new(10, 10, 40, 30), 0.55)));
        assert_eq!(*overlay.image().get_pixel(49, 39), CAUTIONARY);
    }

    #[test]
    fn test_redraw_without_detection_clears_stale_box() {
        let mut overlay = DetectionOverlay::new(100, 80);
        overlay.redraw(Some((Region::new(10, 10, 40, 30), 0.9)));
        assert!(painted(&overlay) > 0);

        overlay.redraw(None);

        assert_eq!(painted(&overlay), 0);
    }

    #[test]
    fn test_box_outside_canvas_is_clipped() {
        let mut overlay = DetectionOverlay::new(50, 50);
        overlay.redraw(Some((Region::new(40, 40, 30, 30), 0.9)));
        assert!(painted(&overlay) > 0);

        overlay.redraw(Some((Region::new(60, 60, 10, 10), 0.9)));
        assert_eq!(painted(&overlay), 0);
    }

    #[test]
    fn test_resize_matches_video() {
        let mut overlay = DetectionOverlay::new(1, 1);
        overlay.resize(640, 480);
        assert_eq!(overlay.image().dimensions(), (640, 480));
    }
}
