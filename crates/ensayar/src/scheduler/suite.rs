//! Test suites and their execution results.
//!
//! A suite is an ordered list of named cases. Cases receive a
//! [`SuiteContext`] carrying the capability profile the scheduler resolved
//! for the run; how a case turns those capabilities into a live driver is up
//! to the test crate. A failing (or panicking) case is recorded and the
//! suite keeps going; collecting everything is what the report is for.

use crate::capabilities::Capabilities;
use crate::result::{EnsayarError, EnsayarResult};
use chrono::{DateTime, Local};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{error, info};

/// Shared state handed to every case of a scheduled run
#[derive(Debug, Clone)]
pub struct SuiteContext {
    capabilities: Capabilities,
}

impl SuiteContext {
    /// Create a context around the run's capability profile
    #[must_use]
    pub fn new(capabilities: Capabilities) -> Self {
        Self { capabilities }
    }

    /// The capability profile for this run
    #[must_use]
    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }
}

type CaseFn = Box<dyn Fn(&mut SuiteContext) -> EnsayarResult<()> + Send + Sync>;

/// One named test case
pub struct TestCase {
    name: String,
    run: CaseFn,
}

impl std::fmt::Debug for TestCase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestCase").field("name", &self.name).finish()
    }
}

/// An ordered collection of test cases
#[derive(Debug)]
pub struct TestSuite {
    name: String,
    cases: Vec<TestCase>,
}

impl TestSuite {
    /// Create an empty suite
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cases: Vec::new(),
        }
    }

    /// Add a case; cases run in insertion order
    #[must_use]
    pub fn with_case(
        mut self,
        name: impl Into<String>,
        case: impl Fn(&mut SuiteContext) -> EnsayarResult<()> + Send + Sync + 'static,
    ) -> Self {
        self.cases.push(TestCase {
            name: name.into(),
            run: Box::new(case),
        });
        self
    }

    /// Suite name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Names of all cases, in run order
    #[must_use]
    pub fn case_names(&self) -> Vec<&str> {
        self.cases.iter().map(|c| c.name.as_str()).collect()
    }

    /// Number of cases
    #[must_use]
    pub fn len(&self) -> usize {
        self.cases.len()
    }

    /// True when the suite holds no cases
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    /// Run every case in order, collecting failures.
    ///
    /// A panic inside a case is caught and recorded as a failure so the
    /// rest of the suite (and the rest of the schedule) still runs.
    pub fn run(&self, context: &mut SuiteContext) -> SuiteOutcome {
        let started = Local::now();
        let mut failures = Vec::new();

        for case in &self.cases {
            info!(suite = %self.name, case = %case.name, "running test case");
            let result = catch_unwind(AssertUnwindSafe(|| (case.run)(context)));
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(case = %case.name, "test case failed: {e}");
                    failures.push(CaseFailure {
                        case: case.name.clone(),
                        error: e.to_string(),
                    });
                }
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    error!(case = %case.name, "test case panicked: {message}");
                    failures.push(CaseFailure {
                        case: case.name.clone(),
                        error: format!("panicked: {message}"),
                    });
                }
            }
        }

        SuiteOutcome {
            suite: self.name.clone(),
            started,
            finished: Local::now(),
            cases_run: self.cases.len(),
            failures,
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// A failed case and why
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseFailure {
    /// Case name
    pub case: String,
    /// Failure description
    pub error: String,
}

/// Result of running one suite
#[derive(Debug, Clone)]
pub struct SuiteOutcome {
    /// Suite name
    pub suite: String,
    /// When the suite started
    pub started: DateTime<Local>,
    /// When the suite finished
    pub finished: DateTime<Local>,
    /// Number of cases executed
    pub cases_run: usize,
    /// Cases that failed
    pub failures: Vec<CaseFailure>,
}

impl SuiteOutcome {
    /// True when every case passed
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Number of cases that passed
    #[must_use]
    pub fn passed(&self) -> usize {
        self.cases_run - self.failures.len()
    }

    /// Report lines summarizing the outcome
    #[must_use]
    pub fn summary_lines(&self) -> Vec<String> {
        let failed: Vec<String> = self
            .failures
            .iter()
            .map(|f| format!("{} ({})", f.case, f.error))
            .collect();
        vec![
            format!("We run {} tests", self.cases_run),
            format!(
                "The execution finished at {}",
                self.finished.format("%d-%m-%Y_%H-%M-%S")
            ),
            format!("The following failed {failed:?}"),
        ]
    }
}

type SuiteFactory = Box<dyn Fn() -> TestSuite + Send + Sync>;

/// Registry resolving schedule suite names to suite factories
#[derive(Default)]
pub struct SuiteRegistry {
    factories: HashMap<String, SuiteFactory>,
}

impl std::fmt::Debug for SuiteRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuiteRegistry")
            .field("suites", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl SuiteRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a suite factory under a schedule name
    pub fn register(
        &mut self,
        name: impl Into<String>,
        factory: impl Fn() -> TestSuite + Send + Sync + 'static,
    ) {
        let _ = self.factories.insert(name.into(), Box::new(factory));
    }

    /// Build the suite registered under `name`
    pub fn create(&self, name: &str) -> EnsayarResult<TestSuite> {
        self.factories
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| EnsayarError::SuiteNotFound {
                name: name.to_string(),
            })
    }

    /// Registered suite names
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }
}
