//! Ensayar: Mobile UI-Automation Test Framework
//!
//! Ensayar (Spanish: "to rehearse") wraps a device-automation driver with
//! reusable screen objects, schedules test suites sequentially across local,
//! virtual, or remote devices, and records every session on video.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                     ENSAYAR Architecture                         │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌───────────┐   ┌───────────┐   ┌──────────────┐                │
//! │  │ Schedule  │──►│ Scheduler │──►│ Test Suites  │                │
//! │  │ (YAML)    │   │ + Broker  │   │ (screens)    │                │
//! │  └───────────┘   └─────┬─────┘   └──────┬───────┘                │
//! │                        │                │                        │
//! │              device/adb/emulator    UiDriver seam                │
//! │                                         │                        │
//! │                        ┌────────────────┼────────────────┐       │
//! │                        ▼                ▼                ▼       │
//! │                  RecordingSession  Screenshots   Capabilities    │
//! │                  (capture+encode)  (per flow)    (JSON profiles) │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]

/// Capability maps and JSON capability profiles
pub mod capabilities;

/// Device targets, adb discovery, emulator and server management
pub mod device;

/// Abstract device-automation driver seam
pub mod driver;

/// Screen-recording session manager (capture + encode workers)
pub mod recorder;

/// Plain-text run reports
pub mod report;

/// Result and error types
pub mod result;

/// Sequential suite scheduler
pub mod scheduler;

/// Screen Object Model support
pub mod screen;

/// Per-test screenshot folders
pub mod screenshot;

pub use capabilities::Capabilities;
pub use device::{BrokerConfig, DeviceBroker, DeviceTarget, LocalDeviceBroker};
pub use driver::{FakeDriver, UiDriver};
pub use recorder::{
    FrameCell, FrameSource, RecorderConfig, RecordingSession, SessionState, VideoFormat,
};
pub use report::ReportFile;
pub use result::{EnsayarError, EnsayarResult};
pub use scheduler::{
    ScheduleConfig, ScheduledRun, Scheduler, SuiteContext, SuiteOutcome, SuiteRegistry, TestSuite,
};
pub use screen::{ScreenContext, ScreenObject, ScreenRegistry, SelectorMap};
pub use screenshot::ScreenshotFolder;
