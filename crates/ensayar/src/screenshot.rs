//! Per-test screenshot folders.
//!
//! Every test flow gets one folder, named from the screen under test and the
//! device metadata, and drops timestamped PNGs into it on demand. A capture
//! refused by a secure view is reported as a skipped shot, never an error,
//! same tolerance as the recorder's capture worker.

use crate::capabilities::Capabilities;
use crate::driver::UiDriver;
use crate::result::EnsayarResult;
use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Timestamp format for folder names
const FOLDER_TIMESTAMP: &str = "%Y_%m_%d-%H_%M_%S";

/// Timestamp format for individual shots (microseconds keep names unique)
const SHOT_TIMESTAMP: &str = "%Y_%m_%d-%H_%M_%S_%f";

/// A screenshot destination folder for one test flow.
#[derive(Debug, Clone)]
pub struct ScreenshotFolder {
    dir: PathBuf,
}

impl ScreenshotFolder {
    /// Create `<root>/<timestamp>_<screen>_<platform>_<device>`.
    ///
    /// Missing capability fields end up blank in the name, mirroring the
    /// recording session directory naming.
    pub fn create(
        root: &Path,
        screen_name: &str,
        capabilities: &Capabilities,
    ) -> EnsayarResult<Self> {
        let timestamp = Local::now().format(FOLDER_TIMESTAMP);
        let dir = root.join(format!(
            "{timestamp}_{screen_name}_{}_{}",
            capabilities.platform_name(),
            capabilities.device_name()
        ));
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Open an existing folder as a screenshot destination
    #[must_use]
    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The folder path
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Take one screenshot into the folder.
    ///
    /// Returns the path of the written file, or `None` when the current view
    /// refused capture (logged and skipped).
    pub fn take(&self, driver: &dyn UiDriver) -> EnsayarResult<Option<PathBuf>> {
        let name = format!("{}.png", Local::now().format(SHOT_TIMESTAMP));
        let path = self.dir.join(name);
        match driver.save_screenshot(&path) {
            Ok(()) => Ok(Some(path)),
            Err(e) if e.is_capture_denied() => {
                warn!("screenshot refused by the current view, skipping: {e}");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::capabilities::keys;
    use crate::driver::FakeDriver;
    use tempfile::TempDir;

    fn caps() -> Capabilities {
        Capabilities::new()
            .with(keys::PLATFORM_NAME, "Android")
            .with(keys::DEVICE_NAME, "sargo")
    }

    #[test]
    fn test_folder_name_includes_metadata() {
        let root = TempDir::new().unwrap();
        let folder = ScreenshotFolder::create(root.path(), "loginscreen", &caps()).unwrap();

        let name = folder.dir().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.ends_with("_loginscreen_Android_sargo"));
        assert!(folder.dir().is_dir());
    }

    #[test]
    fn test_take_writes_png() {
        let root = TempDir::new().unwrap();
        let folder = ScreenshotFolder::create(root.path(), "loginscreen", &caps()).unwrap();
        let driver = FakeDriver::new(caps(), 32, 32);

        let shot = folder.take(&driver).unwrap().unwrap();
        assert!(shot.exists());
        assert!(shot.extension().is_some_and(|e| e == "png"));
    }

    #[test]
    fn test_secure_surface_is_skipped_not_fatal() {
        let root = TempDir::new().unwrap();
        let folder = ScreenshotFolder::create(root.path(), "dmscreen", &caps()).unwrap();
        let driver = FakeDriver::new(caps(), 32, 32);
        driver.set_deny_capture(true);

        let shot = folder.take(&driver).unwrap();
        assert!(shot.is_none());
    }
}
