//! Network association on a host.

use datalogger_osal_api::net::{NetError, NetworkLink};

/// The host's own network, which is up whenever the process runs.
///
/// Joining succeeds immediately; leaving only marks the link as down until the next join.
#[derive(Debug, Default)]
pub struct HostLink {
    joined: bool,
}

impl HostLink {
    /// Creates a link that is not joined yet.
    pub fn new() -> Self {
        Self::default()
    }
}

impl NetworkLink for HostLink {
    fn begin_join(&mut self) -> Result<(), NetError> {
        self.joined = true;
        Ok(())
    }

    fn is_joined(&mut self) -> bool {
        self.joined
    }

    fn leave(&mut self) {
        self.joined = false;
    }
}
