//! Server-under-test lifecycle: build, spawn, address discovery, and
//! termination.
//!
//! The runner reaches the orchestrator through the [`Launcher`] and
//! [`ServerHandle`] traits; [`ProcessLauncher`] is the real
//! implementation backed by OS processes.

pub mod builder;
pub mod spawner;

use std::future::Future;
use std::pin::Pin;

use crate::models::{LanguageTarget, LifecycleState, ServerAddress};
use crate::Result;

pub use spawner::ServerProcess;

/// A started server that the runner can talk to and stop.
pub trait ServerHandle: Send {
    /// Address the server is listening on.
    fn address(&self) -> &ServerAddress;

    /// `Spawned` until [`ServerHandle::terminate`] completes, then
    /// `Terminated`.
    fn state(&self) -> LifecycleState;

    /// Stop the server. Must be idempotent.
    fn terminate(&mut self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// Builds and starts servers for language targets.
pub trait Launcher: Send + Sync {
    /// Handle type returned by [`Launcher::spawn`].
    type Server: ServerHandle;

    /// Build the target's server.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Build`](crate::AppError::Build) on failure.
    fn build<'a>(
        &'a self,
        target: &'a LanguageTarget,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

    /// Start the target's server and discover its address.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Spawn`](crate::AppError::Spawn) or
    /// [`AppError::AddressDiscovery`](crate::AppError::AddressDiscovery).
    fn spawn<'a>(
        &'a self,
        target: &'a LanguageTarget,
    ) -> Pin<Box<dyn Future<Output = Result<Self::Server>> + Send + 'a>>;
}

/// [`Launcher`] that runs real build commands and server processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessLauncher;

impl Launcher for ProcessLauncher {
    type Server = ServerProcess;

    fn build<'a>(
        &'a self,
        target: &'a LanguageTarget,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(builder::build_server(target))
    }

    fn spawn<'a>(
        &'a self,
        target: &'a LanguageTarget,
    ) -> Pin<Box<dyn Future<Output = Result<Self::Server>> + Send + 'a>> {
        Box::pin(spawner::spawn_server(target))
    }
}

impl ServerHandle for ServerProcess {
    fn address(&self) -> &ServerAddress {
        ServerProcess::address(self)
    }

    fn state(&self) -> LifecycleState {
        ServerProcess::state(self)
    }

    fn terminate(&mut self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(ServerProcess::terminate(self))
    }
}
