use crate::error::control::ControlError;
use crate::lifecycle::controller::{LifecycleCommand, LifecycleRequest};
use crate::protocol::ControlRequest;

use common::ErrorLocation;

use std::panic::Location;
use std::sync::{Arc, RwLock};

use log::{debug, info, warn};
use tokio::sync::{mpsc, oneshot};

struct ChannelInner {
    /// Engine session the channel currently serves. `None` while stopped or
    /// in the middle of a reload.
    active_session: RwLock<Option<u64>>,
    controller: mpsc::WeakSender<LifecycleCommand>,
}

/// Control-channel handler owned by the lifecycle controller.
///
/// Holds only a weak sender so it never keeps the controller alive.
#[derive(Clone)]
pub struct CommandChannel {
    inner: Arc<ChannelInner>,
}

impl CommandChannel {
    pub(crate) fn new(controller: mpsc::WeakSender<LifecycleCommand>) -> Self {
        Self {
            inner: Arc::new(ChannelInner {
                active_session: RwLock::new(None),
                controller,
            }),
        }
    }

    pub(crate) fn bind(&self, session: u64) {
        if let Ok(mut active) = self.inner.active_session.write() {
            *active = Some(session);
            debug!("Command channel bound to session {session}");
        }
    }

    pub(crate) fn unbind(&self) {
        if let Ok(mut active) = self.inner.active_session.write()
            && let Some(session) = active.take()
        {
            debug!("Command channel released session {session}");
        }
    }

    pub fn active_session(&self) -> Option<u64> {
        self.inner.active_session.read().ok().and_then(|s| *s)
    }

    /// Queue a request on behalf of engine session `session` without waiting.
    ///
    /// Safe to call from the engine's own event path: it never blocks and
    /// never waits for the controller.
    #[track_caller]
    pub(crate) fn submit_from_session(
        &self,
        session: u64,
        request: ControlRequest,
    ) -> Result<(), ControlError> {
        if self.active_session() != Some(session) {
            return Err(ControlError::StaleSession {
                session,
                location: ErrorLocation::from(Location::caller()),
            });
        }

        let sender = self.sender()?;
        sender
            .try_send(LifecycleCommand::detached(request.into()))
            .map_err(|e| ControlError::RequestFailed {
                message: format!("Could not queue {request:?}: {e}"),
                location: ErrorLocation::from(Location::caller()),
            })?;

        info!("Session {session} queued {request:?}");
        Ok(())
    }

    /// Forward a peer request and wait for the controller's answer.
    pub async fn request(&self, request: ControlRequest) -> Result<(), ControlError> {
        if self.active_session().is_none() {
            return Err(ControlError::NoActiveSession {
                message: format!("{request:?} rejected: no engine is running"),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        let sender = self.sender()?;
        let (reply_tx, reply_rx) = oneshot::channel();
        sender
            .send(LifecycleCommand::with_reply(request.into(), reply_tx))
            .await
            .map_err(|e| ControlError::ControllerUnavailable {
                message: format!("Controller queue closed: {e}"),
                location: ErrorLocation::from(Location::caller()),
            })?;

        let outcome = reply_rx.await.map_err(|e| ControlError::ControllerUnavailable {
            message: format!("Controller dropped the reply: {e}"),
            location: ErrorLocation::from(Location::caller()),
        })?;

        outcome.map_err(|e| {
            warn!("Control request {request:?} failed: {e}");
            ControlError::RequestFailed {
                message: e.to_string(),
                location: ErrorLocation::from(Location::caller()),
            }
        })
    }

    #[track_caller]
    fn sender(&self) -> Result<mpsc::Sender<LifecycleCommand>, ControlError> {
        self.inner
            .controller
            .upgrade()
            .ok_or_else(|| ControlError::ControllerUnavailable {
                message: "Lifecycle controller has shut down".to_string(),
                location: ErrorLocation::from(Location::caller()),
            })
    }
}

impl From<ControlRequest> for LifecycleRequest {
    fn from(request: ControlRequest) -> Self {
        match request {
            ControlRequest::Reload => LifecycleRequest::Reload,
            ControlRequest::Stop => LifecycleRequest::Stop,
        }
    }
}
