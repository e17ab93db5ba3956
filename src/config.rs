//! Suite configuration parsing and validation.
//!
//! The configuration document enumerates the language targets and the
//! test cases shared across them. JSON is the primary format; a file
//! ending in `.toml` is parsed as TOML with the same schema.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use serde::Deserialize;

use crate::models::suite::{DEFAULT_READ_TIMEOUT, DEFAULT_STARTUP_TIMEOUT};
use crate::models::{DiscoveryMode, Exchange, LanguageTarget, Settings, TestCase, TestSuite};
use crate::{AppError, Result};

/// Suite-wide timeout settings, in seconds.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SettingsConfig {
    /// Bound on each socket read.
    #[serde(default = "default_read_timeout_seconds")]
    pub read_timeout_seconds: u64,
    /// Default bound on the wait for a dynamic server's address line.
    #[serde(default = "default_startup_timeout_seconds")]
    pub startup_timeout_seconds: u64,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            read_timeout_seconds: default_read_timeout_seconds(),
            startup_timeout_seconds: default_startup_timeout_seconds(),
        }
    }
}

fn default_read_timeout_seconds() -> u64 {
    DEFAULT_READ_TIMEOUT.as_secs()
}

fn default_startup_timeout_seconds() -> u64 {
    DEFAULT_STARTUP_TIMEOUT.as_secs()
}

fn default_startup_delay_ms() -> u64 {
    1000
}

fn default_build_command() -> Vec<String> {
    vec!["make".into(), "test_server".into()]
}

fn default_server_binary() -> PathBuf {
    PathBuf::from("./chat_server")
}

/// Address-discovery policy as written in the document.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DiscoveryConfig {
    /// Server prints its bound address as the first stdout line.
    Dynamic {
        /// Overrides `settings.startup_timeout_seconds` for this target.
        #[serde(default)]
        startup_timeout_seconds: Option<u64>,
    },
    /// Server listens on a fixed port after a startup delay.
    Fixed {
        /// Port passed to the server.
        port: u16,
        /// Milliseconds to wait before connecting.
        #[serde(default = "default_startup_delay_ms")]
        startup_delay_ms: u64,
    },
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self::Dynamic {
            startup_timeout_seconds: None,
        }
    }
}

/// One implementation under test.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct LanguageConfig {
    /// Display name.
    pub name: String,
    /// Working directory, relative to the configuration file.
    pub dir: PathBuf,
    /// Address-discovery policy; dynamic when omitted.
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    /// Build program and arguments.
    #[serde(default = "default_build_command")]
    pub build: Vec<String>,
    /// Server executable, relative to `dir`.
    #[serde(default = "default_server_binary")]
    pub server: PathBuf,
}

/// One scripted test case.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TestConfig {
    /// Test case name.
    pub name: String,
    /// Send-and-receive pairs: `[request, expected_response]`.
    #[serde(default)]
    pub snr: Vec<(String, String)>,
}

/// Configuration document parsed from `test_config.json`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SuiteConfig {
    /// Timeout settings.
    #[serde(default)]
    pub settings: SettingsConfig,
    /// Language targets in execution order.
    pub languages: Vec<LanguageConfig>,
    /// Test cases shared by every language.
    #[serde(default)]
    pub tests: Vec<TestConfig>,
    /// Directory that relative `dir` entries resolve against.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl SuiteConfig {
    /// Load and validate configuration from a file path.
    ///
    /// Relative language directories resolve against the file's parent.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read, does not
    /// parse, or fails validation.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|err| {
            AppError::Config(format!("failed to read config {}: {err}", path.display()))
        })?;

        let is_toml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
        let mut config = if is_toml {
            Self::from_toml_str(&raw)?
        } else {
            Self::from_json_str(&raw)?
        };

        config.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(config)
    }

    /// Parse configuration from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Convert the document into the runtime suite model.
    #[must_use]
    pub fn to_suite(&self) -> TestSuite {
        let default_startup = Duration::from_secs(self.settings.startup_timeout_seconds);

        let languages = self
            .languages
            .iter()
            .map(|lang| LanguageTarget {
                name: lang.name.clone(),
                working_directory: self.base_dir.join(&lang.dir),
                discovery: match lang.discovery {
                    DiscoveryConfig::Dynamic {
                        startup_timeout_seconds,
                    } => DiscoveryMode::Dynamic {
                        startup_timeout: startup_timeout_seconds
                            .map_or(default_startup, Duration::from_secs),
                    },
                    DiscoveryConfig::Fixed {
                        port,
                        startup_delay_ms,
                    } => DiscoveryMode::Fixed {
                        port,
                        startup_delay: Duration::from_millis(startup_delay_ms),
                    },
                },
                build_command: lang.build.clone(),
                server_binary: lang.server.clone(),
            })
            .collect();

        let test_cases = self
            .tests
            .iter()
            .map(|test| TestCase {
                name: test.name.clone(),
                exchanges: test
                    .snr
                    .iter()
                    .map(|(send, recv)| {
                        Exchange::new(Bytes::from(send.clone()), Bytes::from(recv.clone()))
                    })
                    .collect(),
            })
            .collect();

        TestSuite {
            languages,
            test_cases,
            settings: Settings {
                read_timeout: Duration::from_secs(self.settings.read_timeout_seconds),
            },
        }
    }

    fn validate(&self) -> Result<()> {
        if self.languages.is_empty() {
            return Err(AppError::Config("languages must not be empty".into()));
        }

        if self.settings.read_timeout_seconds == 0 {
            return Err(AppError::Config(
                "read_timeout_seconds must be greater than zero".into(),
            ));
        }

        if self.settings.startup_timeout_seconds == 0 {
            return Err(AppError::Config(
                "startup_timeout_seconds must be greater than zero".into(),
            ));
        }

        let mut names = HashSet::new();
        for lang in &self.languages {
            if lang.name.trim().is_empty() {
                return Err(AppError::Config("language name must not be empty".into()));
            }
            if !names.insert(lang.name.as_str()) {
                return Err(AppError::Config(format!(
                    "duplicate language name: {}",
                    lang.name
                )));
            }
            if lang.build.is_empty() {
                return Err(AppError::Config(format!(
                    "language {}: build command must not be empty",
                    lang.name
                )));
            }
            if let DiscoveryConfig::Dynamic {
                startup_timeout_seconds: Some(0),
            } = lang.discovery
            {
                return Err(AppError::Config(format!(
                    "language {}: startup_timeout_seconds must be greater than zero",
                    lang.name
                )));
            }
            if let DiscoveryConfig::Fixed { port: 0, .. } = lang.discovery {
                return Err(AppError::Config(format!(
                    "language {}: fixed discovery requires a nonzero port",
                    lang.name
                )));
            }
        }

        if let Some(index) = self.tests.iter().position(|t| t.name.trim().is_empty()) {
            return Err(AppError::Config(format!(
                "test #{} has an empty name",
                index + 1
            )));
        }

        Ok(())
    }
}
