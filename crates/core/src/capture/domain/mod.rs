pub mod captured_frame;
pub mod media_source;
