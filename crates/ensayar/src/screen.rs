//! Screen Object Model support.
//!
//! A screen object encapsulates one screen of the app under test: its
//! launch activity and its element selectors. Selectors are plain data
//! loaded from a JSON file per screen; how they are turned into element
//! lookups is the automation backend's business, not the framework's.
//!
//! [`ScreenContext`] is the per-test bundle the first screen of a flow
//! creates: it owns the driver handle, starts the session recording, and
//! opens the screenshot folder; `destroy()` tears all of it down. There are
//! no process-wide driver singletons: every screen receives its context
//! explicitly.

use crate::capabilities::Capabilities;
use crate::driver::UiDriver;
use crate::recorder::{RecorderConfig, RecordingSession};
use crate::result::{EnsayarError, EnsayarResult};
use crate::screenshot::ScreenshotFolder;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

/// Trait for screen objects representing one screen of the app under test.
pub trait ScreenObject {
    /// Name of the screen, used for selector files and screenshot folders
    fn screen_name(&self) -> &str;

    /// Activity this screen belongs to (blank for platform-agnostic screens)
    fn activity(&self) -> &str {
        ""
    }

    /// Check if the screen is ready for interaction
    fn is_loaded(&self) -> bool {
        true
    }
}

/// Named element selectors for one screen, as data.
///
/// Loaded from `<selectors_dir>/<screen_name>.json`:
///
/// ```json
/// { "id": { "login_button": "com.app:id/login" },
///   "xpath": { "error_banner": "//android.widget.TextView[@text='Error']" } }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorMap {
    /// Selectors addressed by resource id
    #[serde(default)]
    pub id: BTreeMap<String, String>,
    /// Selectors addressed by XPath
    #[serde(default)]
    pub xpath: BTreeMap<String, String>,
}

impl SelectorMap {
    /// Create an empty selector map
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the selector file for `screen_name` from a selectors directory
    pub fn load(selectors_dir: &Path, screen_name: &str) -> EnsayarResult<Self> {
        let path = selectors_dir.join(format!("{screen_name}.json"));
        let raw = fs::read_to_string(&path).map_err(|e| EnsayarError::Selector {
            message: format!("cannot read {}: {e}", path.display()),
        })?;
        serde_json::from_str(&raw).map_err(|e| EnsayarError::Selector {
            message: format!("cannot parse {}: {e}", path.display()),
        })
    }

    /// Save the selector map for `screen_name` into a selectors directory
    pub fn save(&self, selectors_dir: &Path, screen_name: &str) -> EnsayarResult<()> {
        fs::create_dir_all(selectors_dir)?;
        let path = selectors_dir.join(format!("{screen_name}.json"));
        fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Look up an id selector
    #[must_use]
    pub fn id(&self, name: &str) -> Option<&str> {
        self.id.get(name).map(String::as_str)
    }

    /// Look up an xpath selector
    #[must_use]
    pub fn xpath(&self, name: &str) -> Option<&str> {
        self.xpath.get(name).map(String::as_str)
    }

    /// True when the map holds no selectors
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.id.is_empty() && self.xpath.is_empty()
    }
}

/// Registry of screen objects for a test suite
#[derive(Default)]
pub struct ScreenRegistry {
    screens: HashMap<String, Box<dyn ScreenObject + Send + Sync>>,
}

impl std::fmt::Debug for ScreenRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScreenRegistry")
            .field("screens", &self.screens.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ScreenRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a screen object under its own name
    pub fn register<S: ScreenObject + Send + Sync + 'static>(&mut self, screen: S) {
        let _ = self
            .screens
            .insert(screen.screen_name().to_string(), Box::new(screen));
    }

    /// Get a screen by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&(dyn ScreenObject + Send + Sync)> {
        self.screens.get(name).map(|s| s.as_ref())
    }

    /// Number of registered screens
    #[must_use]
    pub fn count(&self) -> usize {
        self.screens.len()
    }
}

/// Where a test flow keeps its recordings and screenshots
#[derive(Debug, Clone)]
pub struct ContextConfig {
    /// Recorder configuration (including the videos root directory)
    pub recorder: RecorderConfig,
    /// Root directory for screenshot folders
    pub screenshots_root: PathBuf,
}

impl ContextConfig {
    /// Create a configuration with the given output roots
    #[must_use]
    pub fn new(videos_root: impl Into<PathBuf>, screenshots_root: impl Into<PathBuf>) -> Self {
        Self {
            recorder: RecorderConfig::new(videos_root),
            screenshots_root: screenshots_root.into(),
        }
    }

    /// Override the recorder configuration
    #[must_use]
    pub fn with_recorder(mut self, recorder: RecorderConfig) -> Self {
        self.recorder = recorder;
        self
    }
}

/// Per-test bundle owned by the first screen of a flow.
///
/// Starts the recording session and screenshot folder on launch; later
/// screens in the same flow share the context instead of creating their own.
pub struct ScreenContext {
    driver: Arc<dyn UiDriver>,
    recorder: RecordingSession,
    screenshots: ScreenshotFolder,
}

impl std::fmt::Debug for ScreenContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScreenContext")
            .field("recorder", &self.recorder)
            .field("screenshots", &self.screenshots)
            .finish_non_exhaustive()
    }
}

impl ScreenContext {
    /// Start a test flow: begin recording and open the screenshot folder.
    pub fn launch(
        driver: Arc<dyn UiDriver>,
        screen_name: &str,
        config: &ContextConfig,
    ) -> EnsayarResult<Self> {
        let capabilities = driver.capabilities().clone();
        let mut recorder =
            RecordingSession::for_driver(config.recorder.clone(), Arc::clone(&driver));
        recorder.start()?;
        let screenshots =
            ScreenshotFolder::create(&config.screenshots_root, screen_name, &capabilities)?;
        Ok(Self {
            driver,
            recorder,
            screenshots,
        })
    }

    /// The shared driver handle
    #[must_use]
    pub fn driver(&self) -> &Arc<dyn UiDriver> {
        &self.driver
    }

    /// The capability map of the underlying session
    #[must_use]
    pub fn capabilities(&self) -> &Capabilities {
        self.driver.capabilities()
    }

    /// The recording session
    #[must_use]
    pub fn recorder(&self) -> &RecordingSession {
        &self.recorder
    }

    /// Take a screenshot into the flow's folder
    pub fn take_screenshot(&self) -> EnsayarResult<Option<PathBuf>> {
        self.screenshots.take(self.driver.as_ref())
    }

    /// End the flow: stop the recording and quit the driver.
    ///
    /// A recording that was already stopped by hand is logged, not an error;
    /// failing to quit the driver is.
    pub fn destroy(mut self) -> EnsayarResult<()> {
        if let Err(e) = self.recorder.stop() {
            warn!("recording session did not stop cleanly: {e}");
        }
        self.driver.quit()
    }
}
