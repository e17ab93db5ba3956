//! Sequential, fail-fast test runner.
//!
//! Languages run one after another. Within a language the server is
//! built once, then every selected test case gets a fresh server
//! process and connection. The first failing case ends that language;
//! the runner always moves on to the next one.

use std::fmt::{Display, Formatter};

use regex::Regex;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::client::Connection;
use crate::models::{
    LanguageTarget, LifecycleState, ServerAddress, Settings, TestCase, TestSuite,
};
use crate::orchestrator::{Launcher, ServerHandle};
use crate::report::Reporter;
use crate::{AppError, Result};

/// Which languages and test cases a run includes.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    /// Language names to run; empty means all.
    pub languages: Vec<String>,
    /// Pattern a test case name must match; `None` means all.
    pub test_filter: Option<Regex>,
}

impl Selection {
    /// Build a selection, compiling `test_filter` as a regular expression.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the pattern is not a valid regex.
    pub fn new(languages: Vec<String>, test_filter: Option<&str>) -> Result<Self> {
        let test_filter = test_filter
            .map(Regex::new)
            .transpose()
            .map_err(|err| AppError::Config(format!("invalid test filter: {err}")))?;
        Ok(Self {
            languages,
            test_filter,
        })
    }

    /// Whether the language named `name` is included.
    #[must_use]
    pub fn includes_language(&self, name: &str) -> bool {
        self.languages.is_empty() || self.languages.iter().any(|lang| lang == name)
    }

    /// Whether the test case named `name` is included.
    #[must_use]
    pub fn includes_case(&self, name: &str) -> bool {
        match &self.test_filter {
            Some(pattern) => pattern.is_match(name),
            None => true,
        }
    }
}

/// The test case that ended a language run, and why.
#[derive(Debug)]
pub struct CaseFailure {
    /// Name of the failing test case.
    pub case: String,
    /// 1-based exchange index, when the failure happened mid-exchange.
    pub index: Option<usize>,
    /// Underlying error.
    pub error: AppError,
}

impl Display for CaseFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.index {
            Some(index) => write!(f, "Test {} failed on cmd {index}: {}", self.case, self.error),
            None => write!(f, "Test {} failed: {}", self.case, self.error),
        }
    }
}

/// Result of one language target.
#[derive(Debug)]
pub enum LanguageOutcome {
    /// Every selected test case passed.
    Passed {
        /// Number of test cases that ran.
        cases_run: usize,
    },
    /// The build failed; no test case ran.
    BuildFailed {
        /// Captured build output explaining the failure.
        stderr: String,
    },
    /// A test case failed; later cases were skipped.
    CaseFailed(CaseFailure),
}

/// Per-language entry in a [`RunSummary`].
#[derive(Debug)]
pub struct LanguageReport {
    /// Language target name.
    pub language: String,
    /// What happened.
    pub outcome: LanguageOutcome,
}

impl LanguageReport {
    /// Whether the language passed.
    #[must_use]
    pub fn passed(&self) -> bool {
        matches!(self.outcome, LanguageOutcome::Passed { .. })
    }

    /// One-line (or, for build failures, multi-line) result message.
    #[must_use]
    pub fn message(&self) -> String {
        match &self.outcome {
            LanguageOutcome::Passed { .. } => "Passed!".to_owned(),
            LanguageOutcome::BuildFailed { stderr } => format!("Build failed:\n{stderr}"),
            LanguageOutcome::CaseFailed(failure) => failure.to_string(),
        }
    }
}

/// Aggregated result of a run.
#[derive(Debug, Default)]
pub struct RunSummary {
    /// One report per included language, in execution order.
    pub languages: Vec<LanguageReport>,
}

impl RunSummary {
    /// `true` when every included language passed.
    #[must_use]
    pub fn success(&self) -> bool {
        self.languages.iter().all(LanguageReport::passed)
    }

    /// Number of languages that failed.
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.languages.iter().filter(|lang| !lang.passed()).count()
    }
}

/// Drives builds, servers, and clients for a [`TestSuite`].
#[derive(Debug)]
pub struct TestRunner<L, R> {
    launcher: L,
    reporter: R,
}

impl<L, R> TestRunner<L, R>
where
    L: Launcher,
    R: Reporter,
{
    /// Create a runner.
    #[must_use]
    pub fn new(launcher: L, reporter: R) -> Self {
        Self { launcher, reporter }
    }

    /// The reporter this runner notifies.
    #[must_use]
    pub fn reporter(&self) -> &R {
        &self.reporter
    }

    /// The launcher this runner builds and spawns with.
    #[must_use]
    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    /// Run every selected language against every selected test case.
    pub async fn run(&self, suite: &TestSuite, selection: &Selection) -> RunSummary {
        for name in &selection.languages {
            if !suite.languages.iter().any(|lang| &lang.name == name) {
                warn!(language = %name, "selected language is not configured");
            }
        }

        let cases: Vec<&TestCase> = suite
            .test_cases
            .iter()
            .filter(|case| selection.includes_case(&case.name))
            .collect();

        let mut summary = RunSummary::default();
        for target in suite
            .languages
            .iter()
            .filter(|lang| selection.includes_language(&lang.name))
        {
            let span = info_span!("language", language = %target.name);
            let outcome = self
                .run_language(target, &cases, &suite.settings)
                .instrument(span)
                .await;

            let report = LanguageReport {
                language: target.name.clone(),
                outcome,
            };
            self.reporter.language_finished(&report);
            summary.languages.push(report);
        }

        info!(
            languages = summary.languages.len(),
            failed = summary.failed_count(),
            "run finished"
        );
        summary
    }

    async fn run_language(
        &self,
        target: &LanguageTarget,
        cases: &[&TestCase],
        settings: &Settings,
    ) -> LanguageOutcome {
        self.reporter.language_started(target);

        self.reporter.build_started(target);
        let built = self.launcher.build(target).await;
        self.reporter.build_finished(target, &built);
        if let Err(err) = built {
            let stderr = match err {
                AppError::Build(stderr) => stderr,
                other => other.to_string(),
            };
            return LanguageOutcome::BuildFailed { stderr };
        }
        debug!("server built");

        for case in cases {
            self.reporter.case_started(target, case);
            let result = self.run_case(target, case, settings).await;
            self.reporter.case_finished(target, case, result.as_ref().err());
            if let Err(failure) = result {
                return LanguageOutcome::CaseFailed(failure);
            }
        }

        LanguageOutcome::Passed {
            cases_run: cases.len(),
        }
    }

    /// Spawn a fresh server, replay `case` against it, and always stop it.
    async fn run_case(
        &self,
        target: &LanguageTarget,
        case: &TestCase,
        settings: &Settings,
    ) -> std::result::Result<(), CaseFailure> {
        let mut server = self
            .launcher
            .spawn(target)
            .await
            .map_err(|error| CaseFailure {
                case: case.name.clone(),
                index: None,
                error,
            })?;

        debug!(state = ?server.state(), address = %server.address(), "server spawned");

        let result = exercise(server.address(), case, settings).await;
        server.terminate().await;
        if server.state() == LifecycleState::Terminated {
            debug!(state = ?server.state(), "server stopped");
        } else {
            warn!(state = ?server.state(), "server did not reach terminated state");
        }
        result
    }
}

/// Connect to a running server and replay `case` over one connection.
async fn exercise(
    address: &ServerAddress,
    case: &TestCase,
    settings: &Settings,
) -> std::result::Result<(), CaseFailure> {
    let mut connection = Connection::connect(address, settings.read_timeout)
        .await
        .map_err(|error| CaseFailure {
            case: case.name.clone(),
            index: None,
            error,
        })?;

    connection
        .run_exchanges(&case.exchanges)
        .await
        .map_err(|err| CaseFailure {
            case: case.name.clone(),
            index: Some(err.index),
            error: err.error,
        })
}
