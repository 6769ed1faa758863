//! The packet engine seam.
//!
//! The lifecycle controller never talks to a concrete engine: it asks an
//! [`EngineFactory`] for a fresh [`Engine`] per session, handing it the
//! resolved profile content and a [`PlatformCallbacks`] bound to that session.

pub mod process;

pub use process::{ProcessEngine, ProcessEngineFactory};

use crate::control::CommandChannel;
use crate::diagnostics::DiagnosticSink;
use crate::error::control::ControlError;
use crate::error::engine::EngineError;
use crate::protocol::ControlRequest;

use std::future::Future;
use std::path::{Path, PathBuf};

/// One engine instance. Started at most once, closed at most once.
pub trait Engine: Send + Sync + 'static {
    fn start(&mut self) -> impl Future<Output = Result<(), EngineError>> + Send;

    fn close(&mut self) -> impl Future<Output = Result<(), EngineError>> + Send;
}

pub trait EngineFactory: Send + Sync + 'static {
    type Engine: Engine;

    /// Build an engine for `config`. Rejecting the config here means the
    /// engine is never started.
    fn create(&self, config: String, callbacks: PlatformCallbacks)
    -> Result<Self::Engine, EngineError>;
}

/// What an engine may ask of its host.
///
/// Requests made after the session was superseded by a reload are rejected
/// with [`ControlError::StaleSession`].
#[derive(Clone)]
pub struct PlatformCallbacks {
    session: u64,
    commands: CommandChannel,
    diagnostics: DiagnosticSink,
    working_dir: PathBuf,
}

impl PlatformCallbacks {
    pub(crate) fn new(
        session: u64,
        commands: CommandChannel,
        diagnostics: DiagnosticSink,
        working_dir: PathBuf,
    ) -> Self {
        Self {
            session,
            commands,
            diagnostics,
            working_dir,
        }
    }

    pub fn session(&self) -> u64 {
        self.session
    }

    /// Directory the engine may use for its own files.
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Ask the controller to reload. Returns immediately.
    #[track_caller]
    pub fn request_reload(&self) -> Result<(), ControlError> {
        self.commands
            .submit_from_session(self.session, ControlRequest::Reload)
    }

    /// Ask the controller to stop. Returns immediately.
    #[track_caller]
    pub fn request_stop(&self) -> Result<(), ControlError> {
        self.commands
            .submit_from_session(self.session, ControlRequest::Stop)
    }

    pub async fn write_diagnostic(&self, message: &str) {
        self.diagnostics.write(message).await;
    }
}
