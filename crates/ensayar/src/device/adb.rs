//! adb helpers: property discovery, foreground-app lookup, server and
//! emulator process control.
//!
//! The parsing functions are pure and separately testable; the thin runners
//! around `adb`/`emulator` shell out with `std::process::Command`. All of
//! this expects a device connected (or an emulator running) with the app
//! under test open and the screen unlocked.

use crate::capabilities::{keys, Capabilities};
use crate::result::{EnsayarError, EnsayarResult};
use regex::Regex;
use std::collections::BTreeMap;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Automation backend written into discovered capability sets.
///
/// UiAutomator1 is the safe default; some devices need UiAutomator2 instead
/// (the CLI prints that hint after capturing a profile).
pub const DEFAULT_AUTOMATION_NAME: &str = "UiAutomator1";

/// adb command timeout written into discovered capability sets, in ms
pub const DEFAULT_ADB_EXEC_TIMEOUT: &str = "200000";

/// Serial adb assigns to the first local emulator
const EMULATOR_SERIAL: &str = "emulator-5554";

/// Parse `adb shell getprop` output into a property map.
///
/// Lines look like `[ro.product.device]: [sargo]`; anything else is skipped.
#[must_use]
pub fn parse_properties(output: &str) -> BTreeMap<String, String> {
    let line_re = Regex::new(r"\[([^\]]+)\]:\s*\[([^\]]*)\]").unwrap();
    let mut properties = BTreeMap::new();
    for line in output.lines() {
        if let Some(captures) = line_re.captures(line) {
            let _ = properties.insert(captures[1].to_string(), captures[2].to_string());
        }
    }
    properties
}

/// Derive the device capabilities from a getprop map.
///
/// Prefers `ro.build.software.version` (split at the first digit run into
/// platform name and version); falls back to `gsm.operator.alpha` +
/// `ro.build.version.release` the way vendor builds require.
pub fn device_capabilities(
    properties: &BTreeMap<String, String>,
) -> EnsayarResult<Capabilities> {
    let mut capabilities = Capabilities::new();

    if let Some(software) = properties.get("ro.build.software.version") {
        let compact: String = software.chars().filter(|c| !c.is_whitespace()).collect();
        let split_re = Regex::new(r"^([^0-9]+)(\d+)").unwrap();
        let captures = split_re
            .captures(&compact)
            .ok_or_else(|| EnsayarError::Capability {
                message: format!("cannot split software version '{compact}'"),
            })?;
        capabilities.set(keys::PLATFORM_NAME, &captures[1]);
        capabilities.set(keys::PLATFORM_VERSION, &captures[2]);
    } else if let Some(release) = properties.get("ro.build.version.release") {
        let operator = properties
            .get("gsm.operator.alpha")
            .ok_or_else(|| EnsayarError::Capability {
                message: "gsm.operator.alpha missing from device properties".to_string(),
            })?;
        let platform: String = operator.chars().filter(|c| !c.is_whitespace()).collect();
        let version: String = release.chars().filter(|c| !c.is_whitespace()).collect();
        capabilities.set(keys::PLATFORM_NAME, platform);
        capabilities.set(keys::PLATFORM_VERSION, version);
    }

    let device = properties
        .get("ro.product.device")
        .ok_or_else(|| EnsayarError::Capability {
            message: "ro.product.device missing from device properties".to_string(),
        })?;
    capabilities.set(keys::DEVICE_NAME, device.as_str());
    Ok(capabilities)
}

/// Extract the foreground `package`/`activity` pair from `dumpsys window`
/// output (the `mCurrentFocus` line, falling back to `mObscuringWindow`).
pub fn foreground_app(dumpsys: &str) -> EnsayarResult<(String, String)> {
    let line = dumpsys
        .lines()
        .find(|l| l.contains("mCurrentFocus"))
        .or_else(|| dumpsys.lines().find(|l| l.contains("mObscuringWindow")))
        .ok_or_else(|| EnsayarError::Capability {
            message: "no focused window in dumpsys output".to_string(),
        })?;

    let pair_re = Regex::new(r"[a-zA-Z.0-9]+/[a-zA-Z.0-9]+").unwrap();
    let pair = pair_re
        .find(line)
        .ok_or_else(|| EnsayarError::Capability {
            message: format!("no package/activity pair in '{}'", line.trim()),
        })?
        .as_str();
    let (package, activity) = pair
        .split_once('/')
        .ok_or_else(|| EnsayarError::Capability {
            message: format!("malformed package/activity pair '{pair}'"),
        })?;
    Ok((package.to_string(), activity.to_string()))
}

/// Run an adb command and return its stdout as UTF-8
fn run_adb(args: &[&str]) -> EnsayarResult<String> {
    debug!(?args, "running adb");
    let output = Command::new("adb")
        .args(args)
        .output()
        .map_err(|e| EnsayarError::Device {
            message: format!("adb {args:?} failed to run: {e}"),
        })?;
    if !output.status.success() {
        return Err(EnsayarError::Device {
            message: format!("adb {args:?} exited with {}", output.status),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Property map of the connected device
pub fn adb_properties() -> EnsayarResult<BTreeMap<String, String>> {
    let output = run_adb(&["shell", "getprop"])?;
    Ok(parse_properties(&output))
}

/// Assemble the full capability set for the connected device and the app
/// currently in the foreground.
pub fn basic_capabilities() -> EnsayarResult<Capabilities> {
    let properties = adb_properties()?;
    let mut capabilities = device_capabilities(&properties)?;

    let dumpsys = run_adb(&["shell", "dumpsys", "window", "windows"])?;
    let (package, activity) = foreground_app(&dumpsys)?;
    capabilities.set(keys::APP_PACKAGE, package);
    capabilities.set(keys::APP_ACTIVITY, activity);
    capabilities.set(keys::AUTOMATION_NAME, DEFAULT_AUTOMATION_NAME);
    capabilities.set(keys::ADB_EXEC_TIMEOUT, DEFAULT_ADB_EXEC_TIMEOUT);
    Ok(capabilities)
}

/// Connected devices as `(serial, state)` pairs from `adb devices`
pub fn devices() -> EnsayarResult<Vec<(String, String)>> {
    let output = run_adb(&["devices"])?;
    Ok(parse_device_list(&output))
}

/// Parse `adb devices` output, skipping the banner line
#[must_use]
pub fn parse_device_list(output: &str) -> Vec<(String, String)> {
    output
        .lines()
        .skip(1)
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            match (parts.next(), parts.next()) {
                (Some(serial), Some(state)) => Some((serial.to_string(), state.to_string())),
                _ => None,
            }
        })
        .collect()
}

/// Start the adb server
pub fn start_server() -> EnsayarResult<()> {
    let _ = run_adb(&["start-server"])?;
    Ok(())
}

/// Kill the adb server
pub fn kill_server() -> EnsayarResult<()> {
    let _ = run_adb(&["kill-server"])?;
    Ok(())
}

/// Launch an installed virtual device.
///
/// Returns the emulator process handle; readiness is a separate concern,
/// see [`wait_for_boot`].
pub fn start_avd(name: &str) -> EnsayarResult<Child> {
    info!(avd = name, "starting virtual device");
    Command::new("emulator")
        .args(["-avd", name])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| EnsayarError::Device {
            message: format!("could not start virtual device '{name}': {e}"),
        })
}

/// Poll `sys.boot_completed` until the emulator reports ready.
pub fn wait_for_boot(timeout: Duration) -> EnsayarResult<()> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Ok(output) = run_adb(&["shell", "getprop", "sys.boot_completed"]) {
            if output.trim() == "1" {
                info!("virtual device finished booting");
                return Ok(());
            }
        }
        if Instant::now() >= deadline {
            return Err(EnsayarError::Device {
                message: format!("virtual device did not boot within {timeout:?}"),
            });
        }
        std::thread::sleep(Duration::from_secs(2));
    }
}

/// Kill the running local emulator
pub fn kill_avd() -> EnsayarResult<()> {
    let _ = run_adb(&["-s", EMULATOR_SERIAL, "emu", "kill"])?;
    Ok(())
}
