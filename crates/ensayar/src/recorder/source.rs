//! Frame source contract for the recording subsystem.
//!
//! The capture worker only needs one capability from the outside world:
//! "write the current visual state to this path". A live automation session
//! provides it through [`UiDriver::save_screenshot`]; a full-desktop grabber
//! or a test fake can provide it just as well.

use crate::driver::UiDriver;
use crate::result::EnsayarResult;
use std::path::Path;
use std::sync::Arc;

/// Anything that can capture the current visual state to a file.
pub trait FrameSource: Send + Sync {
    /// Write the current frame to `path` as a PNG.
    ///
    /// A refusal from a secure surface must surface as
    /// [`crate::result::EnsayarError::CaptureDenied`]; the capture worker
    /// tolerates it and skips the cycle.
    fn capture_to(&self, path: &Path) -> EnsayarResult<()>;
}

/// Every driver is a frame source through its screenshot method.
impl<D: UiDriver> FrameSource for D {
    fn capture_to(&self, path: &Path) -> EnsayarResult<()> {
        self.save_screenshot(path)
    }
}

/// Adapter making a shared driver handle usable as a [`FrameSource`].
///
/// Needed because a `dyn UiDriver` behind an `Arc` cannot be coerced into a
/// `dyn FrameSource` directly.
pub struct DriverFrameSource {
    driver: Arc<dyn UiDriver>,
}

impl DriverFrameSource {
    /// Wrap a shared driver handle
    #[must_use]
    pub fn new(driver: Arc<dyn UiDriver>) -> Self {
        Self { driver }
    }
}

impl std::fmt::Debug for DriverFrameSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverFrameSource").finish_non_exhaustive()
    }
}

impl FrameSource for DriverFrameSource {
    fn capture_to(&self, path: &Path) -> EnsayarResult<()> {
        self.driver.save_screenshot(path)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::capabilities::Capabilities;
    use crate::driver::FakeDriver;
    use tempfile::TempDir;

    #[test]
    fn test_driver_is_a_frame_source() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("frame.png");
        let driver = FakeDriver::new(Capabilities::new(), 32, 32);

        FrameSource::capture_to(&driver, &path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_shared_driver_adapter() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("frame.png");
        let driver: Arc<dyn UiDriver> = Arc::new(FakeDriver::new(Capabilities::new(), 32, 32));
        let source = DriverFrameSource::new(driver);

        source.capture_to(&path).unwrap();
        assert!(path.exists());
    }
}
