//! Screen-Recording Session Manager
//!
//! Records a live UI-automation session (or any other frame source) into one
//! or more video segment files, one directory per session.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  RecordingSession                                                   │
//! │                                                                     │
//! │  ┌───────────────┐   latest frame   ┌───────────────┐               │
//! │  │ capture worker│ ───────────────► │ encode worker │──► segment_N  │
//! │  │ 25 Hz         │    FrameCell     │ 20 fps MJPEG  │    segment_N+1│
//! │  └───────┬───────┘   (lossy slot)   └───────────────┘               │
//! │          │ frame.png scratch                                        │
//! │  ┌───────▼───────┐                                                  │
//! │  │  FrameSource  │  (driver screenshot or desktop grab)             │
//! │  └───────────────┘                                                  │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The hand-off between the workers is a single latest-value slot, not a
//! queue: the capture side overwrites, the encode side reads whatever is
//! newest. Frames may be skipped or repeated relative to the capture
//! cadence. That loss is acceptable for a debugging recording and keeps both
//! loops free of backpressure.
//!
//! When the captured surface changes size mid-session (rotation, window
//! resize), the open segment rejects the new geometry and the encoder rolls
//! over to a fresh segment file in the same directory, so the session
//! continues with no information lost beyond the rollover instant.

mod segment;
mod source;

pub use segment::SegmentWriter;
pub use source::{DriverFrameSource, FrameSource};

use crate::capabilities::Capabilities;
use crate::result::{EnsayarError, EnsayarResult};
use chrono::Local;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{info, warn};

/// Name of the per-session capture scratch file
const FRAME_SCRATCH: &str = "frame.png";

/// Timestamp format for session directory names
const SESSION_TIMESTAMP: &str = "%d-%m-%Y_%H-%M-%S";

/// Video container format for recording output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VideoFormat {
    /// MJPEG frames in an MP4 container
    #[default]
    Mp4,
}

impl VideoFormat {
    /// File extension for segment files
    #[must_use]
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
        }
    }
}

/// Recording session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No workers running, no writer open
    Idle,
    /// Both workers running
    Recording,
}

/// Configuration for a recording session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecorderConfig {
    /// Directory under which session directories are created
    pub output_root: PathBuf,
    /// Container format for segment files
    pub format: VideoFormat,
    /// Worker loop cadence in Hz. Runs faster than the container rate so
    /// processing time inside the loop does not starve the encoder.
    pub cadence_hz: u8,
    /// Nominal container frame rate
    pub container_fps: u8,
    /// JPEG quality for encoded frames (1-100)
    pub jpeg_quality: u8,
}

impl RecorderConfig {
    /// Create a configuration writing sessions under `output_root`
    #[must_use]
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
            format: VideoFormat::Mp4,
            cadence_hz: 25,
            container_fps: 20,
            jpeg_quality: 85,
        }
    }

    /// Set the container format
    #[must_use]
    pub fn with_format(mut self, format: VideoFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the worker loop cadence (clamped to 1-60 Hz)
    #[must_use]
    pub fn with_cadence_hz(mut self, hz: u8) -> Self {
        self.cadence_hz = hz.clamp(1, 60);
        self
    }

    /// Set the container frame rate (clamped to 1-60 fps)
    #[must_use]
    pub fn with_container_fps(mut self, fps: u8) -> Self {
        self.container_fps = fps.clamp(1, 60);
        self
    }

    /// Set the JPEG quality (clamped to 1-100)
    #[must_use]
    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.clamp(1, 100);
        self
    }

    /// Sleep interval between worker loop iterations
    #[must_use]
    pub fn cycle_interval(&self) -> Duration {
        Duration::from_millis(1000 / u64::from(self.cadence_hz.max(1)))
    }
}

/// Device metadata baked into the session directory name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionMetadata {
    /// Device platform, blank when unknown
    pub platform: String,
    /// Device name, blank when unknown
    pub device_name: String,
    /// App activity under test, blank when unknown
    pub app_activity: String,
}

impl SessionMetadata {
    /// Extract metadata from a capability map, blanking absent fields
    #[must_use]
    pub fn from_capabilities(capabilities: &Capabilities) -> Self {
        Self {
            platform: capabilities.platform_name().to_string(),
            device_name: capabilities.device_name().to_string(),
            app_activity: capabilities.app_activity().to_string(),
        }
    }

    /// Session directory name for the given timestamp
    #[must_use]
    fn dir_name(&self, timestamp: &str) -> String {
        format!(
            "{timestamp}_{}_{}_{}",
            self.platform, self.device_name, self.app_activity
        )
    }
}

/// Latest-value hand-off slot between the capture and encode workers.
///
/// Deliberately lossy: there is no queue and no backpressure. A store
/// replaces whatever was there; a load clones the `Arc` of the newest frame
/// (or `None` before the first capture lands). The mutex is held only for
/// the pointer swap; the decoded image behind the `Arc` is immutable, so
/// the encoder can keep using a frame after it has been replaced.
#[derive(Debug, Default)]
pub struct FrameCell {
    slot: Mutex<Option<Arc<DynamicImage>>>,
}

impl FrameCell {
    /// Create an empty cell
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the latest frame
    pub fn store(&self, frame: DynamicImage) {
        *self.lock() = Some(Arc::new(frame));
    }

    /// Get the most recent frame, if any has been captured yet
    #[must_use]
    pub fn latest(&self) -> Option<Arc<DynamicImage>> {
        self.lock().clone()
    }

    /// Drop the held frame
    pub fn clear(&self) {
        let _ = self.lock().take();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Arc<DynamicImage>>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Owns the full lifecycle of one screen-recording session.
///
/// A session is either [`SessionState::Idle`] or [`SessionState::Recording`];
/// it can be restarted after a stop, with each start creating a fresh session
/// directory. `start()` and `stop()` are synchronous control operations; the
/// only background work is the two workers themselves.
pub struct RecordingSession {
    config: RecorderConfig,
    metadata: SessionMetadata,
    source: Arc<dyn FrameSource>,
    state: SessionState,
    keep_recording: Arc<AtomicBool>,
    frame: Arc<FrameCell>,
    session_dir: Option<PathBuf>,
    capture_worker: Option<JoinHandle<()>>,
    encode_worker: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for RecordingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingSession")
            .field("config", &self.config)
            .field("metadata", &self.metadata)
            .field("state", &self.state)
            .field("session_dir", &self.session_dir)
            .finish_non_exhaustive()
    }
}

impl RecordingSession {
    /// Create an idle session reading frames from `source`.
    ///
    /// `capabilities` only contributes naming metadata; absent fields end up
    /// blank in the directory name.
    #[must_use]
    pub fn new(
        config: RecorderConfig,
        source: Arc<dyn FrameSource>,
        capabilities: &Capabilities,
    ) -> Self {
        Self {
            config,
            metadata: SessionMetadata::from_capabilities(capabilities),
            source,
            state: SessionState::Idle,
            keep_recording: Arc::new(AtomicBool::new(false)),
            frame: Arc::new(FrameCell::new()),
            session_dir: None,
            capture_worker: None,
            encode_worker: None,
        }
    }

    /// Create an idle session recording a driver's screen
    #[must_use]
    pub fn for_driver(config: RecorderConfig, driver: Arc<dyn crate::driver::UiDriver>) -> Self {
        let capabilities = driver.capabilities().clone();
        Self::new(
            config,
            Arc::new(DriverFrameSource::new(driver)),
            &capabilities,
        )
    }

    /// Current session state
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// True while workers are running
    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.state == SessionState::Recording
    }

    /// Directory of the current (or most recent) session
    #[must_use]
    pub fn session_dir(&self) -> Option<&Path> {
        self.session_dir.as_deref()
    }

    /// Start the recording session.
    ///
    /// Creates the session directory, then spawns the capture and encode
    /// workers. Directory creation failure is logged and the session
    /// proceeds best-effort (every later file operation will log its own
    /// failure rather than abort the run).
    ///
    /// # Errors
    ///
    /// [`EnsayarError::AlreadyRecording`] when the session is already
    /// active; state is left unchanged.
    pub fn start(&mut self) -> EnsayarResult<()> {
        if self.state == SessionState::Recording {
            return Err(EnsayarError::AlreadyRecording);
        }

        let timestamp = Local::now().format(SESSION_TIMESTAMP).to_string();
        let dir = self
            .config
            .output_root
            .join(self.metadata.dir_name(&timestamp));
        if let Err(e) = fs::create_dir_all(&dir) {
            warn!(dir = %dir.display(), "could not create session directory: {e}");
        }

        self.frame.clear();
        self.keep_recording.store(true, Ordering::SeqCst);

        let interval = self.config.cycle_interval();
        let scratch = dir.join(FRAME_SCRATCH);

        let capture = {
            let keep = Arc::clone(&self.keep_recording);
            let source = Arc::clone(&self.source);
            let cell = Arc::clone(&self.frame);
            thread::Builder::new()
                .name("ensayar-capture".to_string())
                .spawn(move || capture_loop(&keep, source.as_ref(), &cell, &scratch, interval))?
        };

        let encode = {
            let keep = Arc::clone(&self.keep_recording);
            let cell = Arc::clone(&self.frame);
            let dir = dir.clone();
            let format = self.config.format;
            let fps = self.config.container_fps;
            let quality = self.config.jpeg_quality;
            let spawned = thread::Builder::new()
                .name("ensayar-encode".to_string())
                .spawn(move || encode_loop(&keep, &cell, &dir, format, fps, quality, interval));
            match spawned {
                Ok(handle) => handle,
                Err(e) => {
                    // unwind: stop the capture worker we already started
                    self.keep_recording.store(false, Ordering::SeqCst);
                    if capture.join().is_err() {
                        warn!("capture worker panicked during start rollback");
                    }
                    return Err(e.into());
                }
            }
        };

        self.session_dir = Some(dir.clone());
        self.capture_worker = Some(capture);
        self.encode_worker = Some(encode);
        self.state = SessionState::Recording;
        info!(dir = %dir.display(), "recording session started");
        Ok(())
    }

    /// Stop the recording session.
    ///
    /// Signals both workers, blocks until they have exited (the encode
    /// worker closes the open segment on its way out), then deletes the
    /// capture scratch file best-effort. Always returns the session to
    /// [`SessionState::Idle`] on success.
    ///
    /// # Errors
    ///
    /// [`EnsayarError::NotRecording`] when no session is active; state is
    /// left unchanged.
    pub fn stop(&mut self) -> EnsayarResult<()> {
        if self.state != SessionState::Recording {
            return Err(EnsayarError::NotRecording);
        }

        self.keep_recording.store(false, Ordering::SeqCst);
        if let Some(worker) = self.capture_worker.take() {
            if worker.join().is_err() {
                warn!("capture worker panicked");
            }
        }
        if let Some(worker) = self.encode_worker.take() {
            if worker.join().is_err() {
                warn!("encode worker panicked");
            }
        }

        if let Some(dir) = &self.session_dir {
            let scratch = dir.join(FRAME_SCRATCH);
            if scratch.exists() {
                if let Err(e) = fs::remove_file(&scratch) {
                    warn!(path = %scratch.display(), "could not delete capture scratch file: {e}");
                }
            }
        }

        self.state = SessionState::Idle;
        info!("recording session ended");
        Ok(())
    }
}

/// Capture worker body.
///
/// Writes the current visual state into the scratch file and decodes it into
/// the shared cell, once per cycle. Every failure is logged and the cycle
/// skipped; a secure-surface refusal or a half-written file must not end
/// the recording.
fn capture_loop(
    keep: &AtomicBool,
    source: &dyn FrameSource,
    cell: &FrameCell,
    scratch: &Path,
    interval: Duration,
) {
    while keep.load(Ordering::SeqCst) {
        match source.capture_to(scratch) {
            Err(e) if e.is_capture_denied() => {
                warn!("capture refused, skipping this cycle: {e}");
            }
            Err(e) => {
                warn!("frame capture failed, skipping this cycle: {e}");
            }
            Ok(()) => match image::open(scratch) {
                Ok(frame) => cell.store(frame),
                Err(e) => warn!("frame decode failed, skipping this cycle: {e}"),
            },
        }
        thread::sleep(interval);
    }
}

/// Encode worker body.
///
/// Appends the latest captured frame to the open segment once per cycle.
/// An append rejected by the segment (geometry change) closes it and rolls
/// over to a new one, retrying the same frame once; if the retry fails too,
/// the frame is dropped and logged. The writer is `None` only while segment
/// creation itself is failing, in which case creation is retried on the next
/// cycle with a frame.
fn encode_loop(
    keep: &AtomicBool,
    cell: &FrameCell,
    dir: &Path,
    format: VideoFormat,
    fps: u8,
    quality: u8,
    interval: Duration,
) {
    let mut writer = open_segment(dir, format, fps, quality);

    while keep.load(Ordering::SeqCst) {
        if let Some(frame) = cell.latest() {
            writer = append_or_roll_over(writer, &frame, dir, format, fps, quality);
        }
        thread::sleep(interval);
    }

    if let Some(active) = writer {
        match active.close() {
            Ok(path) => info!(path = %path.display(), "segment closed"),
            Err(e) => warn!("closing final segment failed: {e}"),
        }
    }
}

fn open_segment(dir: &Path, format: VideoFormat, fps: u8, quality: u8) -> Option<SegmentWriter> {
    match SegmentWriter::create(dir, format, fps, quality) {
        Ok(writer) => Some(writer),
        Err(e) => {
            warn!(dir = %dir.display(), "could not open segment writer: {e}");
            None
        }
    }
}

fn append_or_roll_over(
    writer: Option<SegmentWriter>,
    frame: &DynamicImage,
    dir: &Path,
    format: VideoFormat,
    fps: u8,
    quality: u8,
) -> Option<SegmentWriter> {
    let Some(mut active) = writer.or_else(|| open_segment(dir, format, fps, quality)) else {
        return None;
    };

    match active.append(frame) {
        Ok(()) => Some(active),
        Err(reason) => {
            info!("segment rejected frame ({reason}), rolling over to a new segment");
            match active.close() {
                Ok(path) => info!(path = %path.display(), "segment closed"),
                Err(e) => warn!("closing rolled-over segment failed: {e}"),
            }
            let mut next = open_segment(dir, format, fps, quality)?;
            if let Err(e) = next.append(frame) {
                // retry on the fresh segment failed as well: drop the frame
                warn!("frame dropped after segment rollover: {e}");
            }
            Some(next)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::capabilities::{keys, Capabilities};
    use crate::driver::FakeDriver;
    use tempfile::TempDir;

    /// A source that never manages to produce a frame
    struct RefusingSource;

    impl FrameSource for RefusingSource {
        fn capture_to(&self, _path: &Path) -> EnsayarResult<()> {
            Err(EnsayarError::CaptureDenied {
                message: "FLAG_SECURE".to_string(),
            })
        }
    }

    fn device_caps() -> Capabilities {
        Capabilities::new()
            .with(keys::PLATFORM_NAME, "Android")
            .with(keys::DEVICE_NAME, "sargo")
            .with(keys::APP_ACTIVITY, ".MainActivity")
    }

    fn quick_config(root: &Path) -> RecorderConfig {
        // fast cadence keeps the tests short
        RecorderConfig::new(root).with_cadence_hz(50)
    }

    fn session_dirs(root: &Path) -> Vec<PathBuf> {
        fs::read_dir(root)
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.is_dir())
            .collect()
    }

    fn segment_files(dir: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.extension().is_some_and(|e| e == "mp4"))
            .collect();
        files.sort();
        files
    }

    mod config_tests {
        use super::*;

        #[test]
        fn test_defaults() {
            let config = RecorderConfig::new("/tmp/videos");
            assert_eq!(config.cadence_hz, 25);
            assert_eq!(config.container_fps, 20);
            assert_eq!(config.format, VideoFormat::Mp4);
            assert_eq!(config.cycle_interval(), Duration::from_millis(40));
        }

        #[test]
        fn test_builder_clamping() {
            let config = RecorderConfig::new("/tmp/videos")
                .with_cadence_hz(0)
                .with_container_fps(200)
                .with_jpeg_quality(0);
            assert_eq!(config.cadence_hz, 1);
            assert_eq!(config.container_fps, 60);
            assert_eq!(config.jpeg_quality, 1);
        }
    }

    mod metadata_tests {
        use super::*;

        #[test]
        fn test_dir_name_with_full_metadata() {
            let meta = SessionMetadata::from_capabilities(&device_caps());
            assert_eq!(
                meta.dir_name("01-01-2026_10-00-00"),
                "01-01-2026_10-00-00_Android_sargo_.MainActivity"
            );
        }

        #[test]
        fn test_missing_fields_stay_blank() {
            let meta = SessionMetadata::from_capabilities(&Capabilities::new());
            assert_eq!(meta.dir_name("ts"), "ts___");
        }
    }

    mod frame_cell_tests {
        use super::*;

        fn frame(w: u32, h: u32) -> DynamicImage {
            DynamicImage::ImageRgb8(image::RgbImage::new(w, h))
        }

        #[test]
        fn test_empty_cell_reads_none() {
            let cell = FrameCell::new();
            assert!(cell.latest().is_none());
        }

        #[test]
        fn test_store_overwrites() {
            let cell = FrameCell::new();
            cell.store(frame(10, 10));
            cell.store(frame(20, 20));

            let latest = cell.latest().unwrap();
            assert_eq!((latest.width(), latest.height()), (20, 20));
        }

        #[test]
        fn test_reader_keeps_frame_after_overwrite() {
            let cell = FrameCell::new();
            cell.store(frame(10, 10));
            let held = cell.latest().unwrap();
            cell.store(frame(20, 20));

            // the old Arc stays valid for whoever already loaded it
            assert_eq!((held.width(), held.height()), (10, 10));
        }

        #[test]
        fn test_clear() {
            let cell = FrameCell::new();
            cell.store(frame(10, 10));
            cell.clear();
            assert!(cell.latest().is_none());
        }
    }

    mod state_machine_tests {
        use super::*;

        #[test]
        fn test_double_start_fails_and_keeps_recording() {
            let root = TempDir::new().unwrap();
            let driver = Arc::new(FakeDriver::new(device_caps(), 40, 40));
            let mut session = RecordingSession::for_driver(quick_config(root.path()), driver);

            session.start().unwrap();
            let err = session.start().unwrap_err();
            assert!(matches!(err, EnsayarError::AlreadyRecording));
            assert!(session.is_recording());

            session.stop().unwrap();
        }

        #[test]
        fn test_stop_when_idle_fails() {
            let root = TempDir::new().unwrap();
            let driver = Arc::new(FakeDriver::new(device_caps(), 40, 40));
            let mut session = RecordingSession::for_driver(quick_config(root.path()), driver);

            let err = session.stop().unwrap_err();
            assert!(matches!(err, EnsayarError::NotRecording));
            assert_eq!(session.state(), SessionState::Idle);
        }

        #[test]
        fn test_start_stop_returns_to_idle() {
            let root = TempDir::new().unwrap();
            let driver = Arc::new(FakeDriver::new(device_caps(), 40, 40));
            let mut session = RecordingSession::for_driver(quick_config(root.path()), driver);

            session.start().unwrap();
            thread::sleep(Duration::from_millis(120));
            session.stop().unwrap();

            assert_eq!(session.state(), SessionState::Idle);
            assert!(session.session_dir().is_some());
        }

        #[test]
        fn test_session_is_restartable() {
            let root = TempDir::new().unwrap();
            let driver = Arc::new(FakeDriver::new(device_caps(), 40, 40));
            let mut session = RecordingSession::for_driver(quick_config(root.path()), driver);

            session.start().unwrap();
            thread::sleep(Duration::from_millis(60));
            session.stop().unwrap();

            // second session must start cleanly after the first fully reset
            thread::sleep(Duration::from_millis(1100));
            session.start().unwrap();
            thread::sleep(Duration::from_millis(60));
            session.stop().unwrap();

            assert_eq!(session_dirs(root.path()).len(), 2);
        }
    }

    mod lifecycle_tests {
        use super::*;

        #[test]
        fn test_session_dir_name_includes_metadata() {
            let root = TempDir::new().unwrap();
            let driver = Arc::new(FakeDriver::new(device_caps(), 40, 40));
            let mut session = RecordingSession::for_driver(quick_config(root.path()), driver);

            session.start().unwrap();
            session.stop().unwrap();

            let dir = session.session_dir().unwrap();
            let name = dir.file_name().unwrap().to_string_lossy();
            assert!(name.ends_with("_Android_sargo_.MainActivity"));
        }

        #[test]
        fn test_scratch_file_removed_on_stop() {
            let root = TempDir::new().unwrap();
            let driver = Arc::new(FakeDriver::new(device_caps(), 40, 40));
            let mut session = RecordingSession::for_driver(quick_config(root.path()), driver);

            session.start().unwrap();
            thread::sleep(Duration::from_millis(150));
            session.stop().unwrap();

            let scratch = session.session_dir().unwrap().join(FRAME_SCRATCH);
            assert!(!scratch.exists());
        }

        #[test]
        fn test_sourceless_session_stops_cleanly() {
            let root = TempDir::new().unwrap();
            let mut session = RecordingSession::new(
                quick_config(root.path()),
                Arc::new(RefusingSource),
                &device_caps(),
            );

            session.start().unwrap();
            thread::sleep(Duration::from_millis(150));
            session.stop().unwrap();

            // no frame ever landed: one zero-frame segment, no scratch file
            let dir = session.session_dir().unwrap();
            let segments = segment_files(dir);
            assert_eq!(segments.len(), 1);
            assert!(!dir.join(FRAME_SCRATCH).exists());
        }
    }
}
