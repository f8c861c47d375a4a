pub mod detection_overlay;
pub mod face_probe;
