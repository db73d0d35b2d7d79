//! Network association.

use super::NetError;

/// The link a network service runs over, for example a WiFi station association.
///
/// Joining is split into a non-blocking start and a status query so the caller owns the join timeout.
pub trait NetworkLink {
    /// Starts associating with the network.
    fn begin_join(&mut self) -> Result<(), NetError>;

    /// Returns `true` once the link is associated and has an address.
    fn is_joined(&mut self) -> bool;

    /// Drops the association.
    fn leave(&mut self);
}
