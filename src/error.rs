//! Error taxonomy for the protocol.
//!
//! Framing failures are fatal to a [`crate::Connection`] and are broadcast to every
//! waiting consumer as a shared [`NetworkError`]; everything else is local to the
//! consumer that observed it.

use std::sync::Arc;

use crate::identifier::Identifier;

/// Errors arising from the transport or the wire codec. Fatal to the connection.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection closed before a complete packet was read")]
    UnexpectedEof,

    #[error("connection closed by peer")]
    PeerClosed,

    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("malformed packet: {0}")]
    MalformedPacket(String),

    #[error("malformed field: {0}")]
    MalformedField(String),

    #[error("malformed parameter value: {0}")]
    MalformedValue(String),
}

/// The top-level error type returned to library callers.
#[derive(Debug, Clone, thiserror::Error)]
pub enum NcpError {
    /// The transport failed, or a peer sent bytes that do not parse as NCP.
    /// Poisons the connection: every other consumer observes the same error.
    #[error(transparent)]
    Network(Arc<NetworkError>),

    /// The authentication handshake failed or did not complete before the deadline.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// An inbound `ERRO`/`ERRC` pair was auto-converted into an error at the
    /// consumer whose Response (or the primary stream) the field targeted.
    #[error("command error {code} on {packet_type}/{field_name}: {detail}")]
    Command {
        code: i32,
        detail: String,
        packet_type: Identifier,
        field_name: Identifier,
    },

    /// A `recv` call observed the connection closed by the local side: a clean
    /// end-of-stream, not a fault.
    #[error("connection closed")]
    Closed,
}

impl From<NetworkError> for NcpError {
    fn from(e: NetworkError) -> Self {
        NcpError::Network(Arc::new(e))
    }
}

impl From<Arc<NetworkError>> for NcpError {
    fn from(e: Arc<NetworkError>) -> Self {
        NcpError::Network(e)
    }
}

pub type Result<T, E = NcpError> = std::result::Result<T, E>;
