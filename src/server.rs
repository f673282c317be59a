//! Accept loop: one independent, handshaked [`Connection`] per accepted transport.

use std::future::Future;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::connection::{Connection, Role};
use crate::options::ConnectionOptions;
use crate::warning::WarnSink;

/// Run the accept loop against `accept`, a caller-supplied async function
/// producing the next accepted transport (the library has no opinion on
/// sockets, listeners, or TLS — wrap e.g. `TcpListener::accept` yourself).
///
/// Each accepted transport becomes its own [`Connection`]: it runs the
/// server-side handshake (unless `options.auto_auth` is false) and is then
/// handed to `handler`. A failed accept is logged and does not stop the
/// loop; a failed per-connection handshake is likewise isolated to that
/// connection.
pub async fn serve<T, F, Fut, H, HFut>(
    mut accept: F,
    options: ConnectionOptions,
    warn_sink: WarnSink,
    handshake_deadline: Option<Duration>,
    handler: H,
) where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<T>>,
    H: Fn(Connection) -> HFut + Clone + Send + 'static,
    HFut: Future<Output = ()> + Send + 'static,
{
    const MIN_BACKOFF: Duration = Duration::from_millis(10);
    const MAX_BACKOFF: Duration = Duration::from_secs(1);
    let mut backoff = MIN_BACKOFF;

    loop {
        let transport = match accept().await {
            Ok(t) => {
                backoff = MIN_BACKOFF;
                t
            }
            Err(e) => {
                tracing::warn!(error = %e, backoff_ms = backoff.as_millis() as u64, "accept failed");
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(MAX_BACKOFF);
                continue;
            }
        };
        let options = options.clone();
        let warn_sink = warn_sink.clone();
        let handler = handler.clone();
        tokio::spawn(async move {
            let conn = Connection::from_transport(transport, options.clone(), warn_sink);
            if options.auto_auth {
                if let Err(e) = conn.run_handshake(Role::Server, handshake_deadline).await {
                    tracing::warn!(error = %e, "server handshake failed");
                    return;
                }
            }
            handler(conn).await;
        });
    }
}
