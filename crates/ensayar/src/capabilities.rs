//! Driver capability map and JSON capability profiles.
//!
//! A capability profile is the JSON file that tells the automation driver
//! which device to talk to and which app activity to launch. Profiles live in
//! a `profiles/` directory and are usually produced once per device/app pair
//! (see [`crate::device::adb::basic_capabilities`]) and then reused by every
//! scheduled run that targets that device.

use crate::result::{EnsayarError, EnsayarResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Well-known capability keys
pub mod keys {
    /// Device platform, e.g. "Android"
    pub const PLATFORM_NAME: &str = "platformName";
    /// Platform version, e.g. "11"
    pub const PLATFORM_VERSION: &str = "platformVersion";
    /// Device name reported by adb
    pub const DEVICE_NAME: &str = "deviceName";
    /// Package of the app under test
    pub const APP_PACKAGE: &str = "appPackage";
    /// Launch activity of the app under test
    pub const APP_ACTIVITY: &str = "appActivity";
    /// Automation backend name
    pub const AUTOMATION_NAME: &str = "automationName";
    /// adb command timeout in milliseconds
    pub const ADB_EXEC_TIMEOUT: &str = "adbExecTimeout";
}

/// An ordered string-keyed capability map.
///
/// Ordering is stable (`BTreeMap`) so saved profiles diff cleanly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Capabilities {
    #[serde(flatten)]
    entries: BTreeMap<String, Value>,
}

impl Capabilities {
    /// Create an empty capability map
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a capability, replacing any previous value
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let _ = self.entries.insert(key.into(), value.into());
    }

    /// Builder-style insert
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    /// Get a capability value
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Get a capability as a string slice (non-string values return None)
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.entries.get(key).and_then(Value::as_str)
    }

    /// Check whether a capability is present
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of capabilities in the map
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no capabilities are set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Platform name, empty string when absent
    #[must_use]
    pub fn platform_name(&self) -> &str {
        self.get_str(keys::PLATFORM_NAME).unwrap_or("")
    }

    /// Device name, empty string when absent
    #[must_use]
    pub fn device_name(&self) -> &str {
        self.get_str(keys::DEVICE_NAME).unwrap_or("")
    }

    /// App activity, empty string when absent
    #[must_use]
    pub fn app_activity(&self) -> &str {
        self.get_str(keys::APP_ACTIVITY).unwrap_or("")
    }

    /// App package, empty string when absent
    #[must_use]
    pub fn app_package(&self) -> &str {
        self.get_str(keys::APP_PACKAGE).unwrap_or("")
    }

    /// Save this map as a JSON profile file.
    ///
    /// The parent directory is created if needed.
    pub fn save_profile(&self, path: &Path) -> EnsayarResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Load a capability profile from a JSON file
    pub fn load_profile(path: &Path) -> EnsayarResult<Self> {
        if !path.exists() {
            return Err(EnsayarError::ProfileNotFound {
                path: path.to_path_buf(),
            });
        }
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

/// Resolve a profile name to its path inside a profiles directory.
///
/// A bare name gets the `.json` extension appended; names that already carry
/// it are used as-is, so both `pixelphone` and `pixelphone.json` work.
#[must_use]
pub fn profile_path(profiles_dir: &Path, name: &str) -> PathBuf {
    if Path::new(name).extension().is_some() {
        profiles_dir.join(name)
    } else {
        profiles_dir.join(format!("{name}.json"))
    }
}
