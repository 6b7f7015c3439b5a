//! Error types for the rampart-interfaces crate.

use thiserror::Error;

/// Transport construction and configuration failures.
///
/// Steady-state send/receive problems are not errors at this layer: UDP
/// gives no delivery guarantee, so undeliverable packets are logged and
/// dropped, and the protocol's resend machinery absorbs the loss.
#[derive(Debug, Error)]
pub enum InterfaceError {
    #[error("failed to bind udp socket: {0}")]
    Bind(#[source] std::io::Error),

    #[error("socket error: {0}")]
    Socket(#[from] std::io::Error),
}
