use std::fmt::{Display, Formatter, Result as FmtResult};

/// Where the controller is. `Starting`, `Reloading` and `Stopping` are only
/// observable while the controller is acting on a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleState {
    /// Idle. `error` holds the reason the last attempt ended, if it failed.
    Stopped { error: Option<String> },
    Starting,
    Running,
    Reloading,
    Stopping,
}

impl Default for LifecycleState {
    fn default() -> Self {
        LifecycleState::Stopped { error: None }
    }
}

impl LifecycleState {
    pub fn is_stopped(&self) -> bool {
        matches!(self, LifecycleState::Stopped { .. })
    }

    pub fn is_running(&self) -> bool {
        matches!(self, LifecycleState::Running)
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            LifecycleState::Stopped { error } => error.as_deref(),
            _ => None,
        }
    }
}

impl Display for LifecycleState {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            LifecycleState::Stopped { error: None } => write!(f, "stopped"),
            LifecycleState::Stopped { error: Some(_) } => write!(f, "stopped (failed)"),
            LifecycleState::Starting => write!(f, "starting"),
            LifecycleState::Running => write!(f, "running"),
            LifecycleState::Reloading => write!(f, "reloading"),
            LifecycleState::Stopping => write!(f, "stopping"),
        }
    }
}
