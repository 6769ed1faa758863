use crate::config::{ConfigState, ExtensionConfig, ExtensionPaths};
use crate::control::{CommandChannel, ControlServer};
use crate::diagnostics::{DiagnosticChannel, DiagnosticSink};
use crate::engine::{Engine, EngineFactory, PlatformCallbacks};
use crate::error::lifecycle::LifecycleError;
use crate::lifecycle::host::HostPlatform;
use crate::lifecycle::state::LifecycleState;
use crate::lifecycle::workdir;
use crate::store::{self, ProfileStore};

use common::ErrorLocation;

use std::panic::Location;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::timeout;

const COMMAND_QUEUE_DEPTH: usize = 32;

type Reply = oneshot::Sender<Result<(), LifecycleError>>;

/// What the controller can be asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleRequest {
    Start,
    Stop,
    Reload,
    /// The host is going away: release everything regardless of state.
    Teardown,
}

pub(crate) struct LifecycleCommand {
    request: LifecycleRequest,
    reply: Option<Reply>,
}

impl LifecycleCommand {
    /// Fire-and-forget; the outcome is only logged.
    pub(crate) fn detached(request: LifecycleRequest) -> Self {
        Self {
            request,
            reply: None,
        }
    }

    pub(crate) fn with_reply(request: LifecycleRequest, reply: Reply) -> Self {
        Self {
            request,
            reply: Some(reply),
        }
    }
}

/// Keeps the host's reasserting marker raised until dropped.
struct ReassertingGuard {
    host: Arc<dyn HostPlatform>,
    flag: Arc<AtomicBool>,
}

impl ReassertingGuard {
    fn engage(host: Arc<dyn HostPlatform>, flag: Arc<AtomicBool>) -> Self {
        flag.store(true, Ordering::SeqCst);
        host.set_reasserting(true);
        Self { host, flag }
    }
}

impl Drop for ReassertingGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
        self.host.set_reasserting(false);
    }
}

/// Owner of the engine.
///
/// Never used directly: [`LifecycleController::spawn`] moves it into its own
/// task and hands back a [`ControllerHandle`].
pub struct LifecycleController<F: EngineFactory> {
    config: ConfigState,
    store: Arc<dyn ProfileStore>,
    factory: F,
    host: Arc<dyn HostPlatform>,
    state_tx: watch::Sender<LifecycleState>,
    reasserting: Arc<AtomicBool>,
    engine: Option<F::Engine>,
    session: u64,
    commands: CommandChannel,
    diagnostics: DiagnosticSink,
    control: Option<ControlServer>,
}

impl<F: EngineFactory> LifecycleController<F> {
    /// Spawn the controller task. It runs until every handle is dropped, then
    /// tears down whatever is still running.
    pub fn spawn(
        config: ConfigState,
        store: Arc<dyn ProfileStore>,
        factory: F,
        host: Arc<dyn HostPlatform>,
    ) -> ControllerHandle {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let (state_tx, state_rx) = watch::channel(LifecycleState::default());
        let reasserting = Arc::new(AtomicBool::new(false));
        let commands = CommandChannel::new(command_tx.downgrade());
        let diagnostics = DiagnosticSink::new();

        let controller = Self {
            config,
            store,
            factory,
            host,
            state_tx,
            reasserting: Arc::clone(&reasserting),
            engine: None,
            session: 0,
            commands: commands.clone(),
            diagnostics: diagnostics.clone(),
            control: None,
        };
        tokio::spawn(controller.run(command_rx));

        ControllerHandle {
            command_tx,
            state_rx,
            reasserting,
            commands,
            diagnostics,
        }
    }

    async fn run(mut self, mut command_rx: mpsc::Receiver<LifecycleCommand>) {
        info!("Lifecycle controller started");

        while let Some(LifecycleCommand { request, reply }) = command_rx.recv().await {
            debug!("Lifecycle request {request:?} in state {}", self.current());
            let result = match request {
                LifecycleRequest::Start => self.start().await,
                LifecycleRequest::Stop => self.stop().await,
                LifecycleRequest::Reload => self.reload().await,
                LifecycleRequest::Teardown => {
                    self.teardown().await;
                    Ok(())
                }
            };

            match reply {
                Some(reply) => {
                    if reply.send(result).is_err() {
                        warn!("Caller of {request:?} went away before the reply");
                    }
                }
                None => {
                    if let Err(e) = result {
                        warn!("Queued {request:?} failed: {e}");
                    }
                }
            }
        }

        self.teardown().await;
        info!("Lifecycle controller stopped");
    }

    fn current(&self) -> LifecycleState {
        self.state_tx.borrow().clone()
    }

    fn set_state(&self, state: LifecycleState) {
        debug!("Lifecycle state -> {state}");
        self.state_tx.send_replace(state);
    }

    async fn start(&mut self) -> Result<(), LifecycleError> {
        let current = self.current();
        if !current.is_stopped() {
            return Err(LifecycleError::InvalidTransition {
                message: format!("Cannot start while {current}"),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        self.set_state(LifecycleState::Starting);
        let config = self.config.get_config().await;
        let paths = config.paths();

        if let Err(e) = self.prepare(&config, &paths).await {
            return Err(self.abort_fatal(e).await);
        }

        match self.launch(&config, &paths).await {
            Ok(()) => Ok(()),
            Err(e @ LifecycleError::EngineRuntime { .. }) => Err(self.abort_engine_failure(e).await),
            Err(e) => Err(self.abort_fatal(e).await),
        }
    }

    async fn stop(&mut self) -> Result<(), LifecycleError> {
        match self.current() {
            LifecycleState::Stopped { .. } => {
                debug!("Stop requested while already stopped");
                return Ok(());
            }
            LifecycleState::Running => {}
            other => {
                return Err(LifecycleError::InvalidTransition {
                    message: format!("Cannot stop while {other}"),
                    location: ErrorLocation::from(Location::caller()),
                });
            }
        }

        self.set_state(LifecycleState::Stopping);
        self.commands.unbind();
        let stop_timeout = self.config.get_config().await.engine_stop_timeout();
        self.close_engine(stop_timeout).await;
        self.release().await;
        self.set_state(LifecycleState::Stopped { error: None });
        info!("Engine stopped");
        Ok(())
    }

    async fn reload(&mut self) -> Result<(), LifecycleError> {
        let current = self.current();
        if !current.is_running() {
            return Err(LifecycleError::InvalidTransition {
                message: format!("Cannot reload while {current}"),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        let reasserting =
            ReassertingGuard::engage(Arc::clone(&self.host), Arc::clone(&self.reasserting));
        self.set_state(LifecycleState::Reloading);
        self.commands.unbind();

        // Fresh snapshot: a reload exists to pick up changed settings.
        let config = self.config.get_config().await;
        let paths = config.paths();
        self.close_engine(config.engine_stop_timeout()).await;

        let restarted = match workdir::prepare(&paths).await {
            Ok(()) => self.launch(&config, &paths).await,
            Err(e) => Err(e),
        };

        // The marker comes down before the host hears about a failure.
        drop(reasserting);
        match restarted {
            Ok(()) => {
                info!("Engine reloaded (session {})", self.session);
                Ok(())
            }
            Err(e) => Err(self.abort_fatal(e).await),
        }
    }

    async fn teardown(&mut self) {
        if self.current().is_stopped() && self.control.is_none() && self.engine.is_none() {
            return;
        }
        info!("Tearing down lifecycle controller");
        self.commands.unbind();
        let stop_timeout = self.config.get_config().await.engine_stop_timeout();
        self.close_engine(stop_timeout).await;
        self.release().await;
        self.set_state(LifecycleState::Stopped { error: None });
    }

    /// Directories, diagnostic channel and control socket.
    async fn prepare(
        &mut self,
        config: &ExtensionConfig,
        paths: &ExtensionPaths,
    ) -> Result<(), LifecycleError> {
        workdir::prepare(paths).await?;

        if !self.diagnostics.is_open().await {
            let channel = DiagnosticChannel::open(&paths.stderr_log).await?;
            self.diagnostics.attach(channel).await;
        }

        if config.control_enabled && self.control.is_none() {
            let server = ControlServer::start(&paths.command_socket, self.commands.clone())
                .map_err(|e| LifecycleError::Setup {
                    message: format!("Failed to open control channel: {e}"),
                    location: ErrorLocation::from(Location::caller()),
                })?;
            self.control = Some(server);
        }

        Ok(())
    }

    /// Resolve the selected profile, build an engine for it and start it.
    ///
    /// Engine construction and start failures come back as `EngineRuntime`;
    /// anything before that is a config problem.
    async fn launch(
        &mut self,
        config: &ExtensionConfig,
        paths: &ExtensionPaths,
    ) -> Result<(), LifecycleError> {
        let profile_id = config
            .selected_profile()
            .ok_or_else(|| LifecycleError::Config {
                message: "No profile is selected".to_string(),
                location: ErrorLocation::from(Location::caller()),
            })?;
        let content = resolve_profile(&self.store, profile_id).await?;

        self.session += 1;
        let session = self.session;
        let callbacks = PlatformCallbacks::new(
            session,
            self.commands.clone(),
            self.diagnostics.clone(),
            paths.working.clone(),
        );

        let mut engine = self.factory.create(content, callbacks).map_err(|e| {
            LifecycleError::EngineRuntime {
                message: format!("Engine rejected profile {profile_id}"),
                location: ErrorLocation::from(Location::caller()),
                source: e,
            }
        })?;

        engine
            .start()
            .await
            .map_err(|e| LifecycleError::EngineRuntime {
                message: format!("Engine failed to start with profile {profile_id}"),
                location: ErrorLocation::from(Location::caller()),
                source: e,
            })?;

        self.engine = Some(engine);
        self.commands.bind(session);
        self.set_state(LifecycleState::Running);
        info!("Engine running with profile {profile_id} (session {session})");
        Ok(())
    }

    async fn close_engine(&mut self, limit: Duration) {
        let Some(mut engine) = self.engine.take() else {
            return;
        };

        match timeout(limit, engine.close()).await {
            Ok(Ok(())) => debug!("Engine closed"),
            Ok(Err(e)) => {
                self.diagnostics
                    .write(&format!("Engine close failed: {e}"))
                    .await;
            }
            Err(_) => {
                self.diagnostics
                    .write(&format!("Engine did not close within {limit:?}, abandoning it"))
                    .await;
            }
        }
    }

    /// Close everything a start attempt may have opened.
    async fn release(&mut self) {
        self.commands.unbind();
        if let Some(control) = self.control.take() {
            control.close().await;
        }
        self.diagnostics.close().await;
    }

    /// Diagnostic write, user notification, then cancel the host session.
    async fn abort_fatal(&mut self, error: LifecycleError) -> LifecycleError {
        let message = error.to_string();
        error!("Lifecycle failure: {message}");
        self.diagnostics.write(&message).await;
        self.host.notify_user(&message);
        self.host.cancel_tunnel_with_error(&message);

        let stop_timeout = self.config.get_config().await.engine_stop_timeout();
        self.close_engine(stop_timeout).await;
        self.release().await;
        self.set_state(LifecycleState::Stopped {
            error: Some(message),
        });
        error
    }

    /// Engine construction and start failures are reported but left to the
    /// host to retry.
    async fn abort_engine_failure(&mut self, error: LifecycleError) -> LifecycleError {
        let message = match &error {
            LifecycleError::EngineRuntime { message, source, .. } => format!("{message}: {source}"),
            other => other.to_string(),
        };
        warn!("{message}");
        self.diagnostics.write(&message).await;
        self.release().await;
        self.set_state(LifecycleState::Stopped {
            error: Some(message),
        });
        error
    }
}

async fn resolve_profile(
    store: &Arc<dyn ProfileStore>,
    profile_id: i64,
) -> Result<String, LifecycleError> {
    let profile = store::blocking(store, move |s| s.get(profile_id))
        .await
        .map_err(|e| LifecycleError::Config {
            message: format!("Failed to look up profile {profile_id}: {e}"),
            location: ErrorLocation::from(Location::caller()),
        })?
        .ok_or_else(|| LifecycleError::Config {
            message: format!("Selected profile {profile_id} not found"),
            location: ErrorLocation::from(Location::caller()),
        })?;

    store::blocking(store, move |s| s.read_content(&profile))
        .await
        .map_err(|e| LifecycleError::Config {
            message: format!("Failed to read profile {profile_id}: {e}"),
            location: ErrorLocation::from(Location::caller()),
        })
}

/// Clonable front door to the controller task.
#[derive(Clone)]
pub struct ControllerHandle {
    command_tx: mpsc::Sender<LifecycleCommand>,
    state_rx: watch::Receiver<LifecycleState>,
    reasserting: Arc<AtomicBool>,
    commands: CommandChannel,
    diagnostics: DiagnosticSink,
}

impl ControllerHandle {
    pub async fn start(&self) -> Result<(), LifecycleError> {
        self.submit(LifecycleRequest::Start).await
    }

    pub async fn stop(&self) -> Result<(), LifecycleError> {
        self.submit(LifecycleRequest::Stop).await
    }

    /// Returns once the new engine is running or the reload has failed.
    pub async fn reload(&self) -> Result<(), LifecycleError> {
        self.submit(LifecycleRequest::Reload).await
    }

    pub async fn teardown(&self) -> Result<(), LifecycleError> {
        self.submit(LifecycleRequest::Teardown).await
    }

    /// Queue a request and wait for the controller to finish acting on it.
    pub async fn submit(&self, request: LifecycleRequest) -> Result<(), LifecycleError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(LifecycleCommand::with_reply(request, reply_tx))
            .await
            .map_err(|e| LifecycleError::Unavailable {
                message: format!("Controller task is gone: {e}"),
                location: ErrorLocation::from(Location::caller()),
            })?;

        reply_rx.await.map_err(|e| LifecycleError::Unavailable {
            message: format!("Controller dropped the reply: {e}"),
            location: ErrorLocation::from(Location::caller()),
        })?
    }

    pub fn state(&self) -> LifecycleState {
        self.state_rx.borrow().clone()
    }

    /// Receiver that sees every state the controller settles in.
    pub fn watch_state(&self) -> watch::Receiver<LifecycleState> {
        self.state_rx.clone()
    }

    pub fn is_reasserting(&self) -> bool {
        self.reasserting.load(Ordering::SeqCst)
    }

    pub fn command_channel(&self) -> CommandChannel {
        self.commands.clone()
    }

    pub fn diagnostics(&self) -> DiagnosticSink {
        self.diagnostics.clone()
    }
}
