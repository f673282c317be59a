//! Dial a transport, wrap it in a [`Connection`], and run the client-side handshake.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::connection::{Connection, Role};
use crate::error::NcpError;
use crate::options::ConnectionOptions;
use crate::warning::WarnSink;

/// Wrap an already-dialed transport in a [`Connection`]. Unless
/// `options.auto_auth` is false, runs the client handshake before returning,
/// bounded by `handshake_deadline` if given.
pub async fn connect<T>(
    transport: T,
    options: ConnectionOptions,
    warn_sink: WarnSink,
    handshake_deadline: Option<Duration>,
) -> Result<Connection, NcpError>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let conn = Connection::from_transport(transport, options.clone(), warn_sink);
    if options.auto_auth {
        conn.run_handshake(Role::Client, handshake_deadline).await?;
    }
    Ok(conn)
}
