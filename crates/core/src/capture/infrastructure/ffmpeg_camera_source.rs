use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::capture::domain::captured_frame::CapturedFrame;
use crate::capture::domain::media_source::{MediaError, MediaSource, StreamInfo};
use crate::capture::infrastructure::jpeg_snapshot::encode_snapshot;
use crate::shared::constants::{IDEAL_HEIGHT, IDEAL_WIDTH, SNAPSHOT_QUALITY};
use crate::shared::frame::Frame;

#[cfg(target_os = "macos")]
const DEVICE_FORMAT: &str = "avfoundation";
#[cfg(target_os = "windows")]
const DEVICE_FORMAT: &str = "dshow";
#[cfg(not(any(target_os = "macos", target_os = "windows")))]
const DEVICE_FORMAT: &str = "video4linux2";

/// How long `start` waits for the device to deliver its first frame.
const FIRST_FRAME_TIMEOUT: Duration = Duration::from_secs(10);
/// How long `stop` waits for the reader to let go of the device.
const RELEASE_GRACE: Duration = Duration::from_millis(500);

type LatestFrame = Arc<Mutex<Option<Frame>>>;
type ReadyReceiver = oneshot::Receiver<Result<StreamInfo, MediaError>>;

/// Live camera capture through ffmpeg's device layer.
///
/// A reader thread owns the ffmpeg input context, decodes every frame to
/// RGB24 and publishes only the latest one. Polling never blocks on the
/// device. Each `start` gets its own frame slot and run flag, so a reader
/// that outlives `stop` cannot feed a later session.
pub struct FfmpegCameraSource {
    device: String,
    ideal_size: (u32, u32),
    quality: u8,
    first_frame_timeout: Duration,
    latest: LatestFrame,
    running: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

impl FfmpegCameraSource {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            ideal_size: (IDEAL_WIDTH, IDEAL_HEIGHT),
            quality: SNAPSHOT_QUALITY,
            first_frame_timeout: FIRST_FRAME_TIMEOUT,
            latest: Arc::new(Mutex::new(None)),
            running: Arc::new(AtomicBool::new(false)),
            reader: None,
        }
    }

    pub fn with_ideal_size(mut self, width: u32, height: u32) -> Self {
        self.ideal_size = (width, height);
        self
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_first_frame_timeout(mut self, timeout: Duration) -> Self {
        self.first_frame_timeout = timeout;
        self
    }
}

/// Waits for the reader's first-frame report, giving up after `timeout`.
async fn await_first_frame(
    ready_rx: ReadyReceiver,
    timeout: Duration,
) -> Result<StreamInfo, MediaError> {
    match tokio::time::timeout(timeout, ready_rx).await {
        Ok(Ok(result)) => result,
        Ok(Err(_)) => Err(MediaError::Device(
            "camera reader exited before the first frame".to_string(),
        )),
        Err(_) => Err(MediaError::Device(format!(
            "no frame from the camera within {}s",
            timeout.as_secs_f32()
        ))),
    }
}

/// Joins the reader if it exits within `grace`; otherwise detaches it. The
/// reader notices its cleared run flag at the next packet.
fn release_reader(handle: JoinHandle<()>, grace: Duration) -> bool {
    let started = Instant::now();
    while !handle.is_finished() {
        if started.elapsed() >= grace {
            log::warn!("Camera reader still busy after {grace:?}; detaching it");
            return false;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    if handle.join().is_err() {
        log::warn!("Camera reader thread panicked");
    }
    true
}

#[async_trait]
impl MediaSource for FfmpegCameraSource {
    async fn start(&mut self) -> Result<StreamInfo, MediaError> {
        self.stop();

        ffmpeg_next::init().map_err(|e| MediaError::Device(e.to_string()))?;
        ffmpeg_next::device::register_all();

        let (ready_tx, ready_rx) = oneshot::channel();
        self.latest = Arc::new(Mutex::new(None));
        self.running = Arc::new(AtomicBool::new(true));

        let device = self.device.clone();
        let ideal_size = self.ideal_size;
        let latest = Arc::clone(&self.latest);
        let running = Arc::clone(&self.running);
        let handle = std::thread::Builder::new()
            .name("camera-reader".to_string())
            .spawn(move || run_reader(&device, ideal_size, latest, running, ready_tx))
            .map_err(|e| MediaError::Device(e.to_string()))?;
        self.reader = Some(handle);

        match await_first_frame(ready_rx, self.first_frame_timeout).await {
            Ok(info) => {
                log::info!(
                    "Camera {} streaming at {}x{}",
                    self.device,
                    info.width,
                    info.height
                );
                Ok(info)
            }
            Err(e) => {
                self.stop();
                Err(e)
            }
        }
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.reader.take() {
            if release_reader(handle, RELEASE_GRACE) {
                log::debug!("Camera {} released", self.device);
            }
        }
        if let Ok(mut latest) = self.latest.lock() {
            *latest = None;
        }
    }

    fn is_active(&self) -> bool {
        self.reader.is_some() && self.running.load(Ordering::SeqCst)
    }

    fn current_frame(&mut self) -> Option<Frame> {
        self.latest.lock().ok().and_then(|latest| latest.clone())
    }

    fn capture(&mut self) -> Result<CapturedFrame, MediaError> {
        let frame = self
            .current_frame()
            .ok_or_else(|| MediaError::Capture("source has no active frame".to_string()))?;
        encode_snapshot(&frame, self.quality)
    }
}

impl Drop for FfmpegCameraSource {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_reader(
    device: &str,
    ideal_size: (u32, u32),
    latest: LatestFrame,
    running: Arc<AtomicBool>,
    ready_tx: oneshot::Sender<Result<StreamInfo, MediaError>>,
) {
    let mut ready_tx = Some(ready_tx);
    let fail = |ready_tx: &mut Option<oneshot::Sender<_>>, message: String| {
        log::error!("Camera {device}: {message}");
        if let Some(tx) = ready_tx.take() {
            let _ = tx.send(Err(MediaError::Device(message)));
        }
    };

    let mut ictx = match open_device(device, ideal_size) {
        Ok(ictx) => ictx,
        Err(e) => return fail(&mut ready_tx, e),
    };

    let (stream_index, mut decoder) = match video_decoder(&ictx) {
        Ok(found) => found,
        Err(e) => return fail(&mut ready_tx, e),
    };

    let width = decoder.width();
    let height = decoder.height();
    let mut scaler = match ffmpeg_next::software::scaling::Context::get(
        decoder.format(),
        width,
        height,
        ffmpeg_next::format::Pixel::RGB24,
        width,
        height,
        ffmpeg_next::software::scaling::Flags::BILINEAR,
    ) {
        Ok(scaler) => scaler,
        Err(e) => return fail(&mut ready_tx, e.to_string()),
    };

    let mut sequence: u64 = 0;
    let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
    let mut rgb_frame = ffmpeg_next::util::frame::video::Video::empty();

    for (stream, packet) in ictx.packets() {
        if !running.load(Ordering::SeqCst) {
            break;
        }
        if stream.index() != stream_index || decoder.send_packet(&packet).is_err() {
            continue;
        }
        while decoder.receive_frame(&mut decoded).is_ok() {
            if scaler.run(&decoded, &mut rgb_frame).is_err() {
                continue;
            }
            let pixels = extract_rgb_pixels(&rgb_frame, width, height);
            if let Ok(mut slot) = latest.lock() {
                *slot = Some(Frame::new(pixels, width, height, 3, sequence));
            }
            sequence += 1;
            if let Some(tx) = ready_tx.take() {
                let _ = tx.send(Ok(StreamInfo { width, height }));
            }
        }
    }

    if ready_tx.is_some() {
        fail(&mut ready_tx, "device produced no frames".to_string());
    }
    running.store(false, Ordering::SeqCst);
    log::debug!("Camera reader for {device} stopped after {sequence} frames");
}

/// Opens the device at the ideal size, retrying with the device default
/// when the size is rejected.
fn open_device(
    device: &str,
    ideal_size: (u32, u32),
) -> Result<ffmpeg_next::format::context::Input, String> {
    let format = ffmpeg_next::device::input::video()
        .find(|f| f.name() == DEVICE_FORMAT)
        .ok_or_else(|| format!("ffmpeg was built without the {DEVICE_FORMAT} input device"))?;

    let mut options = ffmpeg_next::Dictionary::new();
    options.set("video_size", &format!("{}x{}", ideal_size.0, ideal_size.1));

    let context = match ffmpeg_next::format::open_with(device, &format, options) {
        Ok(context) => context,
        Err(e) => {
            log::warn!(
                "Camera {device} rejected {}x{} ({e}); using device default",
                ideal_size.0,
                ideal_size.1
            );
            ffmpeg_next::format::open_with(device, &format, ffmpeg_next::Dictionary::new())
                .map_err(|e| format!("cannot open {device}: {e}"))?
        }
    };

    match context {
        ffmpeg_next::format::context::Context::Input(input) => Ok(input),
        ffmpeg_next::format::context::Context::Output(_) => {
            Err(format!("{device} opened as an output"))
        }
    }
}

fn video_decoder(
    ictx: &ffmpeg_next::format::context::Input,
) -> Result<(usize, ffmpeg_next::decoder::Video), String> {
    let stream = ictx
        .streams()
        .best(ffmpeg_next::media::Type::Video)
        .ok_or("device has no video stream")?;
    let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())
        .map_err(|e| e.to_string())?;
    let decoder = codec_ctx.decoder().video().map_err(|e| e.to_string())?;
    Ok((stream.index(), decoder))
}

/// Copies pixel data from an ffmpeg frame into a contiguous RGB buffer.
///
/// ffmpeg frames may have padding bytes at the end of each row (stride > width*3).
fn extract_rgb_pixels(
    rgb_frame: &ffmpeg_next::util::frame::video::Video,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let stride = rgb_frame.stride(0);
    let data = rgb_frame.data(0);
    let w = width as usize;
    let h = height as usize;

    let mut pixels = Vec::with_capacity(w * h * 3);
    for row in 0..h {
        let row_start = row * stride;
        pixels.extend_from_slice(&data[row_start..row_start + w * 3]);
    }
    pixels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_source_is_inactive_without_frame() {
        let mut source = FfmpegCameraSource::new("/dev/video-does-not-exist");
        assert!(!source.is_active());
        assert!(source.current_frame().is_none());
    }

    #[test]
    fn test_capture_without_frame_is_capture_error() {
        let mut source = FfmpegCameraSource::new("/dev/video-does-not-exist");
        assert!(matches!(source.capture(), Err(MediaError::Capture(_))));
    }

    #[test]
    fn test_stop_is_idempotent_before_start() {
        let mut source = FfmpegCameraSource::new("/dev/video-does-not-exist");
        source.stop();
        source.stop();
        assert!(!source.is_active());
    }

    #[tokio::test]
    async fn test_start_on_missing_device_is_device_error_and_releases() {
        let mut source = FfmpegCameraSource::new("/dev/video-does-not-exist");

        let result = source.start().await;

        assert!(matches!(result, Err(MediaError::Device(_))));
        assert!(!source.is_active());
        assert!(source.reader.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_device_times_out_waiting_for_first_frame() {
        let (_ready_tx, ready_rx) = oneshot::channel();

        let result = await_first_frame(ready_rx, Duration::from_secs(3)).await;

        assert!(matches!(result, Err(MediaError::Device(m)) if m.contains("within 3s")));
    }

    #[tokio::test]
    async fn test_first_frame_report_is_passed_through() {
        let (ready_tx, ready_rx) = oneshot::channel();
        ready_tx
            .send(Ok(StreamInfo {
                width: 640,
                height: 480,
            }))
            .unwrap();

        let info = await_first_frame(ready_rx, FIRST_FRAME_TIMEOUT).await.unwrap();

        assert_eq!((info.width, info.height), (640, 480));
    }

    #[tokio::test]
    async fn test_reader_dropping_sender_is_device_error() {
        let (ready_tx, ready_rx) = oneshot::channel::<Result<StreamInfo, MediaError>>();
        drop(ready_tx);

        let result = await_first_frame(ready_rx, FIRST_FRAME_TIMEOUT).await;

        assert!(matches!(result, Err(MediaError::Device(_))));
    }

    #[test]
    fn test_release_joins_a_finished_reader() {
        let handle = std::thread::spawn(|| {});
        assert!(release_reader(handle, Duration::from_secs(5)));
    }

    #[test]
    fn test_release_detaches_a_stalled_reader() {
        let handle = std::thread::spawn(|| std::thread::sleep(Duration::from_secs(5)));
        let started = Instant::now();

        assert!(!release_reader(handle, Duration::from_millis(50)));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_builders() {
        let source = FfmpegCameraSource::new("/dev/video2")
            .with_ideal_size(1280, 720)
            .with_quality(75)
            .with_first_frame_timeout(Duration::from_secs(2));
        assert_eq!(source.ideal_size, (1280, 720));
        assert_eq!(source.quality, 75);
        assert_eq!(source.first_frame_timeout, Duration::from_secs(2));
        assert_eq!(source.device, "/dev/video2");
    }
}
