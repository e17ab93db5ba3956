//! Domain models for the conformance harness.
//!
//! Covers language targets and their address-discovery policy, scripted
//! exchanges and test cases, and the suite that ties them together.

pub mod suite;
pub mod target;

pub use suite::{Exchange, Settings, TestCase, TestSuite};
pub use target::{DiscoveryMode, LanguageTarget, LifecycleState, ServerAddress};
