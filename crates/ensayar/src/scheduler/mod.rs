//! Sequential test-suite scheduler.
//!
//! Runs a list of scheduled suites one after the other, each against its own
//! device target and capability profile. The schedule file is a YAML list:
//!
//! ```yaml
//! - profile: calculatormainapp
//!   suite: calculator
//!   device: real
//! - profile: instagramloginapp
//!   suite: instagram
//!   device: Pixel_2_API_28
//! ```
//!
//! `device` is `real`, `remote`, or the name of an installed virtual device.
//! A run that cannot be set up (broken profile, unknown suite, device
//! preparation failure) is reported and skipped; the remaining schedule
//! still executes, and the one report file covers the lot.

mod suite;

pub use suite::{CaseFailure, SuiteContext, SuiteOutcome, SuiteRegistry, TestCase, TestSuite};

use crate::capabilities::{profile_path, Capabilities};
use crate::device::{DeviceBroker, DeviceTarget};
use crate::report::ReportFile;
use crate::result::EnsayarResult;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// One entry of the schedule file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledRun {
    /// Capability profile name (resolved inside the profiles directory)
    pub profile: String,
    /// Registered suite name
    pub suite: String,
    /// Device the suite runs against
    pub device: DeviceTarget,
}

/// The parsed schedule
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScheduleConfig {
    /// Scheduled runs, executed in order
    pub runs: Vec<ScheduledRun>,
}

impl ScheduleConfig {
    /// Load a schedule from a YAML file
    pub fn load(path: &Path) -> EnsayarResult<Self> {
        let raw = fs::read_to_string(path)?;
        let schedule: Self = serde_yaml_ng::from_str(&raw)?;
        Ok(schedule)
    }

    /// Number of scheduled runs
    #[must_use]
    pub fn len(&self) -> usize {
        self.runs.len()
    }

    /// True when nothing is scheduled
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

/// Executes a schedule sequentially.
#[derive(Debug, Clone)]
pub struct Scheduler {
    profiles_dir: PathBuf,
    reports_dir: PathBuf,
}

impl Scheduler {
    /// Create a scheduler resolving profiles and writing reports in the
    /// given directories.
    #[must_use]
    pub fn new(profiles_dir: impl Into<PathBuf>, reports_dir: impl Into<PathBuf>) -> Self {
        Self {
            profiles_dir: profiles_dir.into(),
            reports_dir: reports_dir.into(),
        }
    }

    /// Run every scheduled suite in order.
    ///
    /// For each run: broker `prepare`, resolve suite and profile, execute,
    /// write the outcome to the report, broker `release`. Setup problems
    /// skip the run (logged + reported); only creating the report file
    /// itself is fatal, since without it the execution leaves no trace.
    pub fn run(
        &self,
        schedule: &ScheduleConfig,
        registry: &SuiteRegistry,
        broker: &mut dyn DeviceBroker,
    ) -> EnsayarResult<Vec<SuiteOutcome>> {
        let mut report = ReportFile::create(&self.reports_dir)?;
        let mut outcomes = Vec::new();

        for scheduled in &schedule.runs {
            info!(
                suite = %scheduled.suite,
                device = %scheduled.device,
                "starting scheduled run"
            );
            if let Err(e) = broker.prepare(&scheduled.device) {
                warn!("device preparation failed, skipping run: {e}");
                report.write_line(&format!("Suite '{}' skipped: {e}", scheduled.suite));
                self.release(broker, &scheduled.device);
                continue;
            }

            match self.execute(scheduled, registry, &mut report) {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    warn!("scheduled run could not be executed: {e}");
                    report.write_line(&format!("Suite '{}' skipped: {e}", scheduled.suite));
                }
            }

            self.release(broker, &scheduled.device);
        }

        Ok(outcomes)
    }

    fn execute(
        &self,
        scheduled: &ScheduledRun,
        registry: &SuiteRegistry,
        report: &mut ReportFile,
    ) -> EnsayarResult<SuiteOutcome> {
        let suite = registry.create(&scheduled.suite)?;
        let capabilities =
            Capabilities::load_profile(&profile_path(&self.profiles_dir, &scheduled.profile))?;

        report.suite_started(suite.name(), &suite.case_names());
        let mut context = SuiteContext::new(capabilities);
        let outcome = suite.run(&mut context);
        for line in outcome.summary_lines() {
            report.write_line(&line);
        }
        Ok(outcome)
    }

    fn release(&self, broker: &mut dyn DeviceBroker, target: &DeviceTarget) {
        if let Err(e) = broker.release(target) {
            warn!("device release failed: {e}");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::capabilities::keys;
    use crate::result::EnsayarError;
    use tempfile::TempDir;

    /// Broker double recording its calls
    #[derive(Debug, Default)]
    struct RecordingBroker {
        calls: Vec<String>,
        fail_prepare: bool,
    }

    impl DeviceBroker for RecordingBroker {
        fn prepare(&mut self, target: &DeviceTarget) -> EnsayarResult<()> {
            self.calls.push(format!("prepare {target}"));
            if self.fail_prepare {
                return Err(EnsayarError::Device {
                    message: "no device".to_string(),
                });
            }
            Ok(())
        }

        fn release(&mut self, target: &DeviceTarget) -> EnsayarResult<()> {
            self.calls.push(format!("release {target}"));
            Ok(())
        }
    }

    fn write_profile(dir: &Path, name: &str) {
        let caps = Capabilities::new()
            .with(keys::PLATFORM_NAME, "Android")
            .with(keys::DEVICE_NAME, "sargo");
        caps.save_profile(&profile_path(dir, name)).unwrap();
    }

    fn registry_with_calculator() -> SuiteRegistry {
        let mut registry = SuiteRegistry::new();
        registry.register("calculator", || {
            TestSuite::new("calculator")
                .with_case("test_add", |_| Ok(()))
                .with_case("test_subtract", |_| {
                    Err(EnsayarError::Capability {
                        message: "wrong result".to_string(),
                    })
                })
        });
        registry
    }

    fn schedule_yaml() -> &'static str {
        "\
- profile: calculatormainapp
  suite: calculator
  device: real
- profile: instagramloginapp
  suite: instagram
  device: Pixel_2_API_28
"
    }

    mod config_tests {
        use super::*;

        #[test]
        fn test_load_schedule() {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("scheduled-tests.yaml");
            fs::write(&path, schedule_yaml()).unwrap();

            let schedule = ScheduleConfig::load(&path).unwrap();
            assert_eq!(schedule.len(), 2);
            assert_eq!(schedule.runs[0].device, DeviceTarget::Real);
            assert_eq!(
                schedule.runs[1].device,
                DeviceTarget::Virtual("Pixel_2_API_28".to_string())
            );
        }

        #[test]
        fn test_malformed_schedule_errors() {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("broken.yaml");
            fs::write(&path, "- profile: only-a-profile\n").unwrap();

            let err = ScheduleConfig::load(&path).unwrap_err();
            assert!(matches!(err, EnsayarError::Yaml(_)));
        }
    }

    mod run_tests {
        use super::*;

        #[test]
        fn test_happy_path_writes_report_and_releases_device() {
            let dir = TempDir::new().unwrap();
            let profiles = dir.path().join("profiles");
            let reports = dir.path().join("test_reports");
            write_profile(&profiles, "calculatormainapp");

            let schedule = ScheduleConfig {
                runs: vec![ScheduledRun {
                    profile: "calculatormainapp".to_string(),
                    suite: "calculator".to_string(),
                    device: DeviceTarget::Real,
                }],
            };
            let mut broker = RecordingBroker::default();

            let scheduler = Scheduler::new(&profiles, &reports);
            let outcomes = scheduler
                .run(&schedule, &registry_with_calculator(), &mut broker)
                .unwrap();

            assert_eq!(outcomes.len(), 1);
            assert_eq!(outcomes[0].cases_run, 2);
            assert_eq!(outcomes[0].passed(), 1);
            assert_eq!(broker.calls, vec!["prepare real", "release real"]);

            let report = fs::read_dir(&reports)
                .unwrap()
                .next()
                .unwrap()
                .unwrap()
                .path();
            let contents = fs::read_to_string(report).unwrap();
            assert!(contents.contains("test suite 'calculator'"));
            assert!(contents.contains("We run 2 tests"));
            assert!(contents.contains("test_subtract"));
        }

        #[test]
        fn test_unknown_suite_is_skipped_but_schedule_continues() {
            let dir = TempDir::new().unwrap();
            let profiles = dir.path().join("profiles");
            let reports = dir.path().join("test_reports");
            write_profile(&profiles, "calculatormainapp");

            let schedule = ScheduleConfig {
                runs: vec![
                    ScheduledRun {
                        profile: "calculatormainapp".to_string(),
                        suite: "ghost".to_string(),
                        device: DeviceTarget::Real,
                    },
                    ScheduledRun {
                        profile: "calculatormainapp".to_string(),
                        suite: "calculator".to_string(),
                        device: DeviceTarget::Real,
                    },
                ],
            };
            let mut broker = RecordingBroker::default();

            let scheduler = Scheduler::new(&profiles, &reports);
            let outcomes = scheduler
                .run(&schedule, &registry_with_calculator(), &mut broker)
                .unwrap();

            // the ghost suite produced no outcome but did not kill the run
            assert_eq!(outcomes.len(), 1);
            assert_eq!(
                broker.calls,
                vec![
                    "prepare real",
                    "release real",
                    "prepare real",
                    "release real"
                ]
            );

            let report = fs::read_dir(&reports)
                .unwrap()
                .next()
                .unwrap()
                .unwrap()
                .path();
            let contents = fs::read_to_string(report).unwrap();
            assert!(contents.contains("Suite 'ghost' skipped"));
        }

        #[test]
        fn test_failed_preparation_skips_suite() {
            let dir = TempDir::new().unwrap();
            let profiles = dir.path().join("profiles");
            let reports = dir.path().join("test_reports");
            write_profile(&profiles, "calculatormainapp");

            let schedule = ScheduleConfig {
                runs: vec![ScheduledRun {
                    profile: "calculatormainapp".to_string(),
                    suite: "calculator".to_string(),
                    device: DeviceTarget::Real,
                }],
            };
            let mut broker = RecordingBroker {
                fail_prepare: true,
                ..RecordingBroker::default()
            };

            let scheduler = Scheduler::new(&profiles, &reports);
            let outcomes = scheduler
                .run(&schedule, &registry_with_calculator(), &mut broker)
                .unwrap();

            assert!(outcomes.is_empty());
            // release still ran as best-effort cleanup
            assert_eq!(broker.calls, vec!["prepare real", "release real"]);
        }

        #[test]
        fn test_missing_profile_is_skipped() {
            let dir = TempDir::new().unwrap();
            let profiles = dir.path().join("profiles");
            let reports = dir.path().join("test_reports");

            let schedule = ScheduleConfig {
                runs: vec![ScheduledRun {
                    profile: "nope".to_string(),
                    suite: "calculator".to_string(),
                    device: DeviceTarget::Real,
                }],
            };
            let mut broker = RecordingBroker::default();

            let scheduler = Scheduler::new(&profiles, &reports);
            let outcomes = scheduler
                .run(&schedule, &registry_with_calculator(), &mut broker)
                .unwrap();

            assert!(outcomes.is_empty());
        }
    }
}
