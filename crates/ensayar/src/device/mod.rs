//! Device targets and the environment broker used by the scheduler.
//!
//! A scheduled run names its device as `real` (USB-connected), `remote`
//! (device farm), or the name of an installed virtual device. The broker
//! puts the matching environment in place around the run: automation server
//! and adb server for local targets, plus emulator boot/teardown for
//! virtual ones. Remote targets need nothing locally.

pub mod adb;

use crate::result::{EnsayarError, EnsayarResult};
use serde::{Deserialize, Serialize};
use std::process::{Child, Command, Stdio};
use std::time::Duration;
use tracing::{info, warn};

/// Where a scheduled run executes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DeviceTarget {
    /// USB-connected physical device
    Real,
    /// Installed virtual device (AVD name)
    Virtual(String),
    /// Remote device farm; no local environment needed
    Remote,
}

impl From<String> for DeviceTarget {
    fn from(value: String) -> Self {
        match value.as_str() {
            "real" => Self::Real,
            "remote" => Self::Remote,
            _ => Self::Virtual(value),
        }
    }
}

impl From<DeviceTarget> for String {
    fn from(target: DeviceTarget) -> Self {
        match target {
            DeviceTarget::Real => "real".to_string(),
            DeviceTarget::Remote => "remote".to_string(),
            DeviceTarget::Virtual(name) => name,
        }
    }
}

impl std::fmt::Display for DeviceTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Real => write!(f, "real"),
            Self::Remote => write!(f, "remote"),
            Self::Virtual(name) => write!(f, "{name}"),
        }
    }
}

impl DeviceTarget {
    /// True when the run needs a local automation server
    #[must_use]
    pub const fn needs_local_server(&self) -> bool {
        !matches!(self, Self::Remote)
    }

    /// True when the run needs an emulator booted first
    #[must_use]
    pub const fn needs_emulator(&self) -> bool {
        matches!(self, Self::Virtual(_))
    }
}

/// Puts the device environment in place around a scheduled run.
///
/// A trait seam so the scheduler can be exercised without spawning real
/// processes.
pub trait DeviceBroker {
    /// Bring up everything the target needs before the suite runs
    fn prepare(&mut self, target: &DeviceTarget) -> EnsayarResult<()>;

    /// Tear the environment back down after the suite finished
    fn release(&mut self, target: &DeviceTarget) -> EnsayarResult<()>;
}

/// Configuration for [`LocalDeviceBroker`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Command that starts the automation server (e.g. `appium`)
    pub server_command: String,
    /// How long to wait for a virtual device to finish booting
    pub boot_timeout_secs: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            server_command: "appium".to_string(),
            boot_timeout_secs: 180,
        }
    }
}

/// Broker managing local processes: automation server, adb server, emulator.
#[derive(Debug, Default)]
pub struct LocalDeviceBroker {
    config: BrokerConfig,
    server: Option<Child>,
    emulator: Option<Child>,
}

impl LocalDeviceBroker {
    /// Create a broker with the given configuration
    #[must_use]
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            config,
            server: None,
            emulator: None,
        }
    }

    fn start_server(&mut self) -> EnsayarResult<()> {
        if self.server.is_some() {
            return Ok(());
        }
        info!(command = %self.config.server_command, "starting automation server");
        let child = Command::new(&self.config.server_command)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| EnsayarError::Device {
                message: format!(
                    "could not start automation server '{}': {e}",
                    self.config.server_command
                ),
            })?;
        self.server = Some(child);
        Ok(())
    }

    fn stop_server(&mut self) {
        if let Some(mut child) = self.server.take() {
            if let Err(e) = child.kill() {
                warn!("could not stop automation server: {e}");
            }
            let _ = child.wait();
        }
    }
}

impl DeviceBroker for LocalDeviceBroker {
    fn prepare(&mut self, target: &DeviceTarget) -> EnsayarResult<()> {
        if target.needs_local_server() {
            self.start_server()?;
            adb::start_server()?;
        }
        if let DeviceTarget::Virtual(name) = target {
            self.emulator = Some(adb::start_avd(name)?);
            adb::wait_for_boot(Duration::from_secs(self.config.boot_timeout_secs))?;
        }
        Ok(())
    }

    fn release(&mut self, target: &DeviceTarget) -> EnsayarResult<()> {
        if target.needs_emulator() {
            if let Err(e) = adb::kill_avd() {
                warn!("could not kill virtual device: {e}");
            }
            if let Some(mut child) = self.emulator.take() {
                let _ = child.kill();
                let _ = child.wait();
            }
        }
        if target.needs_local_server() {
            self.stop_server();
            if let Err(e) = adb::kill_server() {
                warn!("could not stop adb server: {e}");
            }
        }
        Ok(())
    }
}

impl Drop for LocalDeviceBroker {
    fn drop(&mut self) {
        self.stop_server();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    mod target_tests {
        use super::*;

        #[test]
        fn test_parse_from_schedule_strings() {
            assert_eq!(DeviceTarget::from("real".to_string()), DeviceTarget::Real);
            assert_eq!(
                DeviceTarget::from("remote".to_string()),
                DeviceTarget::Remote
            );
            assert_eq!(
                DeviceTarget::from("Pixel_2_API_28".to_string()),
                DeviceTarget::Virtual("Pixel_2_API_28".to_string())
            );
        }

        #[test]
        fn test_round_trip_through_string() {
            for target in [
                DeviceTarget::Real,
                DeviceTarget::Remote,
                DeviceTarget::Virtual("Pixel_2_API_28".to_string()),
            ] {
                let text: String = target.clone().into();
                assert_eq!(DeviceTarget::from(text), target);
            }
        }

        #[test]
        fn test_environment_needs() {
            assert!(DeviceTarget::Real.needs_local_server());
            assert!(!DeviceTarget::Real.needs_emulator());
            assert!(!DeviceTarget::Remote.needs_local_server());
            let virtual_target = DeviceTarget::Virtual("avd".to_string());
            assert!(virtual_target.needs_local_server());
            assert!(virtual_target.needs_emulator());
        }
    }

    mod broker_config_tests {
        use super::*;

        #[test]
        fn test_defaults() {
            let config = BrokerConfig::default();
            assert_eq!(config.server_command, "appium");
            assert_eq!(config.boot_timeout_secs, 180);
        }
    }
}
