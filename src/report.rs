//! Progress and result reporting.
//!
//! Reporters are purely observational: the runner calls them at each
//! step but never consults them for control flow or the exit status.

use std::io::Write;

use tracing::{info, warn};

use crate::models::{LanguageTarget, TestCase};
use crate::runner::{CaseFailure, LanguageReport};
use crate::Result;

/// Hooks invoked by [`TestRunner`](crate::runner::TestRunner) as a run
/// progresses. Every hook defaults to a no-op.
pub trait Reporter {
    /// A language target is about to be built and tested.
    fn language_started(&self, _target: &LanguageTarget) {}

    /// The build command is about to run.
    fn build_started(&self, _target: &LanguageTarget) {}

    /// The build command finished.
    fn build_finished(&self, _target: &LanguageTarget, _result: &Result<()>) {}

    /// A test case is about to run.
    fn case_started(&self, _target: &LanguageTarget, _case: &TestCase) {}

    /// A test case finished; `failure` is `None` when it passed.
    fn case_finished(
        &self,
        _target: &LanguageTarget,
        _case: &TestCase,
        _failure: Option<&CaseFailure>,
    ) {
    }

    /// A language target finished, successfully or not.
    fn language_finished(&self, _report: &LanguageReport) {}
}

/// Reporter that writes human-readable progress to stdout.
///
/// The per-language header and result lines are always printed; build
/// and per-case progress only when `verbose` is set.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleReporter {
    verbose: bool,
}

impl ConsoleReporter {
    /// Create a console reporter.
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    fn progress(&self, text: &str) {
        if self.verbose {
            let mut out = std::io::stdout().lock();
            let _ = write!(out, "{text}");
            let _ = out.flush();
        }
    }

    fn progress_line(&self, text: &str) {
        if self.verbose {
            println!("{text}");
        }
    }
}

impl Reporter for ConsoleReporter {
    fn language_started(&self, target: &LanguageTarget) {
        info!(language = %target.name, "running language tests");
        println!("Running {} tests...", target.name);
    }

    fn build_started(&self, target: &LanguageTarget) {
        info!(language = %target.name, "building server");
        self.progress("Building the Server...");
    }

    fn build_finished(&self, target: &LanguageTarget, result: &Result<()>) {
        match result {
            Ok(()) => self.progress_line("Built"),
            Err(err) => {
                warn!(language = %target.name, %err, "build failed");
                self.progress_line("FAILED");
            }
        }
    }

    fn case_started(&self, target: &LanguageTarget, case: &TestCase) {
        info!(language = %target.name, case = %case.name, "running test case");
        self.progress(&format!("\tRunning test: {}...", case.name));
    }

    fn case_finished(
        &self,
        target: &LanguageTarget,
        case: &TestCase,
        failure: Option<&CaseFailure>,
    ) {
        match failure {
            None => {
                info!(language = %target.name, case = %case.name, "test case passed");
                self.progress_line("Passed");
            }
            Some(failure) => {
                warn!(language = %target.name, case = %case.name, %failure, "test case failed");
                self.progress_line("FAILED");
            }
        }
    }

    fn language_finished(&self, report: &LanguageReport) {
        info!(
            language = %report.language,
            passed = report.passed(),
            "language finished"
        );
        println!("{}: {}", report.language, report.message());
    }
}
