//! Scripted exchanges, test cases, and the suite.

use std::time::Duration;

use bytes::Bytes;

use super::target::LanguageTarget;

/// Default bound on each socket read.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Default bound on the wait for a dynamic server's address line.
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(10);

/// One request payload paired with the response it must produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    /// Bytes written to the server.
    pub request: Bytes,
    /// Bytes the server must answer with (modulo line order).
    pub expected_response: Bytes,
}

impl Exchange {
    /// Build an exchange from anything convertible into [`Bytes`].
    pub fn new(request: impl Into<Bytes>, expected_response: impl Into<Bytes>) -> Self {
        Self {
            request: request.into(),
            expected_response: expected_response.into(),
        }
    }
}

/// Ordered exchanges replayed over a single connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCase {
    /// Name used in reports and by the `--filter` pattern.
    pub name: String,
    /// Exchanges in execution order.
    pub exchanges: Vec<Exchange>,
}

/// Suite-wide runtime settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    /// Bound on each socket read.
    pub read_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

/// Every language target plus the test cases shared across them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestSuite {
    /// Targets in execution order.
    pub languages: Vec<LanguageTarget>,
    /// Test cases in execution order.
    pub test_cases: Vec<TestCase>,
    /// Runtime settings.
    pub settings: Settings,
}
