//! UiDriver - Abstract Device-Automation Driver Trait
//!
//! Ensayar never talks to a concrete automation backend directly. Screens,
//! screenshots, and the recording subsystem all go through this trait, so an
//! Appium HTTP client, a uiautomator bridge, or a test double can be swapped
//! in without touching the framework.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  UiDriver (abstract trait)                                   │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌────────────────┐  ┌────────────────┐  ┌───────────────┐  │
//! │  │ Appium client  │  │ uiautomator    │  │ FakeDriver    │  │
//! │  │ (user crate)   │  │ bridge         │  │ (unit tests)  │  │
//! │  └────────────────┘  └────────────────┘  └───────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```

use crate::capabilities::Capabilities;
use crate::result::{EnsayarError, EnsayarResult};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Abstract handle to a live device-automation session.
///
/// Implementations must be shareable across the recorder's worker threads.
pub trait UiDriver: Send + Sync {
    /// Capability map the session was created with
    fn capabilities(&self) -> &Capabilities;

    /// Write the current visual state of the device to `path` as a PNG.
    ///
    /// A view flagged as secure by the app developer refuses capture; that
    /// case must surface as [`EnsayarError::CaptureDenied`] so callers can
    /// skip the cycle instead of aborting.
    fn save_screenshot(&self, path: &Path) -> EnsayarResult<()>;

    /// End the automation session
    fn quit(&self) -> EnsayarResult<()>;
}

/// In-memory driver double for unit and integration tests.
///
/// Renders a solid-color PNG at a configurable size. The size can be changed
/// while a recording session is live, which is how the segment-rollover tests
/// simulate a resized capture surface. `deny_capture` makes every screenshot
/// fail the way a secure view does.
#[derive(Debug)]
pub struct FakeDriver {
    capabilities: Capabilities,
    width: AtomicU32,
    height: AtomicU32,
    deny_capture: AtomicBool,
}

impl FakeDriver {
    /// Create a fake driver producing `width`x`height` frames
    #[must_use]
    pub fn new(capabilities: Capabilities, width: u32, height: u32) -> Self {
        Self {
            capabilities,
            width: AtomicU32::new(width),
            height: AtomicU32::new(height),
            deny_capture: AtomicBool::new(false),
        }
    }

    /// Change the frame size for subsequent captures
    pub fn resize(&self, width: u32, height: u32) {
        self.width.store(width, Ordering::SeqCst);
        self.height.store(height, Ordering::SeqCst);
    }

    /// Make subsequent captures fail like a secure surface
    pub fn set_deny_capture(&self, deny: bool) {
        self.deny_capture.store(deny, Ordering::SeqCst);
    }

    /// Current frame size
    #[must_use]
    pub fn size(&self) -> (u32, u32) {
        (
            self.width.load(Ordering::SeqCst),
            self.height.load(Ordering::SeqCst),
        )
    }
}

impl UiDriver for FakeDriver {
    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    fn save_screenshot(&self, path: &Path) -> EnsayarResult<()> {
        if self.deny_capture.load(Ordering::SeqCst) {
            return Err(EnsayarError::CaptureDenied {
                message: "the developer set the flag 'LayoutParams.FLAG_SECURE'".to_string(),
            });
        }
        let (width, height) = self.size();
        let pixel = image::Rgb([0x2e_u8, 0x86_u8, 0xab_u8]);
        let frame = image::RgbImage::from_pixel(width, height, pixel);
        frame
            .save_with_format(path, image::ImageFormat::Png)
            .map_err(|e| EnsayarError::Screenshot {
                message: format!("fake frame write failed: {e}"),
            })
    }

    fn quit(&self) -> EnsayarResult<()> {
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_fake_driver_writes_png_of_configured_size() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("frame.png");
        let driver = FakeDriver::new(Capabilities::new(), 64, 48);

        driver.save_screenshot(&path).unwrap();

        let img = image::open(&path).unwrap();
        assert_eq!((img.width(), img.height()), (64, 48));
    }

    #[test]
    fn test_fake_driver_resize() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("frame.png");
        let driver = FakeDriver::new(Capabilities::new(), 64, 48);
        driver.resize(120, 90);

        driver.save_screenshot(&path).unwrap();

        let img = image::open(&path).unwrap();
        assert_eq!((img.width(), img.height()), (120, 90));
    }

    #[test]
    fn test_fake_driver_secure_surface() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("frame.png");
        let driver = FakeDriver::new(Capabilities::new(), 64, 48);
        driver.set_deny_capture(true);

        let err = driver.save_screenshot(&path).unwrap_err();
        assert!(err.is_capture_denied());
        assert!(!path.exists());
    }
}
