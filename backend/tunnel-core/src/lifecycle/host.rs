/// Host-platform side of the tunnel session.
///
/// This is the only piece that differs per platform; the controller talks to
/// the host exclusively through it. Calls must return quickly.
pub trait HostPlatform: Send + Sync + 'static {
    /// Show or clear the "temporarily unavailable" marker during reloads.
    fn set_reasserting(&self, reasserting: bool);

    /// Surface a message to the user (notification, banner, ...).
    fn notify_user(&self, message: &str);

    /// End the host's tunnel session with an error payload.
    fn cancel_tunnel_with_error(&self, message: &str);
}
