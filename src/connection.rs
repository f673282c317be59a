//! Per-peer connection state machine: send, receive, demux, handshake, close.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, Weak};

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;

use crate::error::{NcpError, NetworkError};
use crate::field::Field;
use crate::handshake;
use crate::identifier::Identifier;
use crate::options::ConnectionOptions;
use crate::packet::{Packet, PacketMeta};
use crate::response::{FieldQueue, FieldResult, Response};
use crate::stream_reader::FieldStream;
use crate::timestamp::Timestamp;
use crate::value::ParamValue;
use crate::warning::{CommandWarning, WarnSink};

const PRIMARY_QUEUE_CAPACITY: usize = 256;
const RESPONSE_QUEUE_CAPACITY: usize = 64;

/// Which side of the handshake a connection plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

fn tag(s: &str) -> Identifier {
    Identifier::new(s).expect("well-known protocol identifiers are always valid")
}

struct ConnState {
    writer: Box<dyn AsyncWrite + Unpin + Send>,
    next_id: u32,
    responses: HashMap<u32, mpsc::Sender<FieldResult>>,
}

/// Internal, reference-counted connection state. [`Field::reply`] holds a
/// non-owning [`Weak`] to this so replies keep working after the [`Connection`]
/// handle itself is dropped, as long as the connection hasn't closed.
pub(crate) struct ConnectionInner {
    state: AsyncMutex<ConnState>,
    primary_tx: StdMutex<Option<mpsc::Sender<FieldResult>>>,
    primary: AsyncMutex<FieldQueue>,
    closed: AtomicBool,
    options: ConnectionOptions,
    warn_sink: WarnSink,
    reader_task: StdMutex<Option<JoinHandle<()>>>,
    self_weak: Weak<ConnectionInner>,
}

impl ConnectionInner {
    fn spawn<R, W>(read_half: R, write_half: W, options: ConnectionOptions, warn_sink: WarnSink) -> Arc<ConnectionInner>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (primary_tx, primary_rx) = mpsc::channel(PRIMARY_QUEUE_CAPACITY);
        // `self_weak` only needs to be *stored*, not upgraded, inside the
        // new_cyclic closure, so it's unaffected by the zero-strong-count
        // window. The reader task is spawned only after `inner` below holds a
        // real, live Arc: spawning it from inside the closure would let
        // another worker poll the task and call `Weak::upgrade` before
        // construction finished, permanently killing the reader.
        let inner = Arc::new_cyclic(|weak| ConnectionInner {
            state: AsyncMutex::new(ConnState {
                writer: Box::new(write_half),
                next_id: 1,
                responses: HashMap::new(),
            }),
            primary_tx: StdMutex::new(Some(primary_tx)),
            primary: AsyncMutex::new(FieldQueue::new(primary_rx)),
            closed: AtomicBool::new(false),
            options,
            warn_sink,
            reader_task: StdMutex::new(None),
            self_weak: weak.clone(),
        });

        let stream = FieldStream::new(read_half);
        let task_weak = Arc::downgrade(&inner);
        let handle = tokio::spawn(async move {
            reader_loop(task_weak, stream).await;
        });
        *inner.reader_task.lock().unwrap() = Some(handle);
        inner
    }

    pub(crate) fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Send a reply packet whose header id is `reply_id` (used by `Field::reply`
    /// and the keepalive auto-reply). Not correlated with any Response.
    pub(crate) async fn reply_to(
        self: &Arc<Self>,
        reply_id: u32,
        packet_type: Identifier,
        mut field: Field,
    ) -> Result<(), NcpError> {
        if self.is_closed() {
            return Err(NcpError::Closed);
        }
        field.set_id(reply_id);
        let packet = Packet {
            packet_type,
            id: reply_id,
            info: 0,
            timestamp: Timestamp::now(),
            fields: vec![field],
        };
        let mut state = self.state.lock().await;
        state
            .writer
            .write_all(&packet.encode())
            .await
            .map_err(|e| NcpError::from(NetworkError::Io(e)))
    }

    /// Allocate a fresh connection-unique id per field, writing one packet per
    /// field (so each field's reply can be correlated independently), and
    /// return a Response tracking the full id set. See `DESIGN.md` for why
    /// outbound multi-field sends are framed this way.
    pub(crate) async fn send_fields(
        self: &Arc<Self>,
        packet_type: Identifier,
        fields: Vec<Field>,
    ) -> Result<Response, NcpError> {
        if self.is_closed() {
            return Err(NcpError::Closed);
        }
        let (tx, rx) = mpsc::channel(RESPONSE_QUEUE_CAPACITY);
        let mut ids = std::collections::HashSet::with_capacity(fields.len());

        let mut state = self.state.lock().await;
        if self.is_closed() {
            return Err(NcpError::Closed);
        }
        for mut field in fields {
            let id = state.next_id;
            state.next_id = state.next_id.wrapping_add(1);
            field.set_id(id);
            let packet = Packet {
                packet_type,
                id,
                info: 0,
                timestamp: Timestamp::now(),
                fields: vec![field],
            };
            state
                .writer
                .write_all(&packet.encode())
                .await
                .map_err(|e| NcpError::from(NetworkError::Io(e)))?;
            state.responses.insert(id, tx.clone());
            ids.insert(id);
        }
        drop(state);

        Ok(Response::new(ids, rx))
    }

    pub(crate) async fn recv_primary(&self) -> Result<Field, NcpError> {
        self.primary.lock().await.recv().await
    }

    pub(crate) async fn recv_primary_matching(
        &self,
        packet_type: Option<Identifier>,
        field_name: Identifier,
    ) -> Result<Field, NcpError> {
        self.primary
            .lock()
            .await
            .recv_matching(|f| f.name() == field_name && packet_type.map_or(true, |t| f.packet_type() == Some(t)))
            .await
    }

    /// Demultiplex one inbound field: keepalive, auto-filters, or route to the
    /// matching Response / the primary queue.
    async fn dispatch(self: &Arc<Self>, meta: PacketMeta, mut field: Field) {
        if meta.packet_type == tag("LINK") && field.name() == tag("LINK") {
            let empty = Field::new(tag("LINK"), tag("LINK"));
            if let Err(e) = self.reply_to(meta.id, tag("LINK"), empty).await {
                tracing::debug!(error = %e, "keepalive reply failed");
            }
            return;
        }

        if self.options.auto_erro {
            if let (Some(ParamValue::Str(detail)), Some(ParamValue::I32(code))) =
                (field.get(tag("ERRO")), field.get(tag("ERRC")))
            {
                if *code != 0 {
                    let err = NcpError::Command {
                        code: *code,
                        detail: detail.clone(),
                        packet_type: meta.packet_type,
                        field_name: field.name(),
                    };
                    self.deliver(meta.id, Err(err)).await;
                    return;
                }
            }
        }

        if self.options.auto_warn {
            if let Some(ParamValue::Str(detail)) = field.get(tag("WARN")) {
                let code = match field.get(tag("WARC")) {
                    Some(ParamValue::I32(c)) => *c,
                    _ => 0,
                };
                self.warn_sink.emit(CommandWarning {
                    detail: detail.clone(),
                    code,
                    packet_type: meta.packet_type,
                    field_name: field.name(),
                });
                return;
            }
        }

        if self.options.auto_ackn && field.contains(tag("ACKN")) {
            return;
        }

        field.set_inbound_context(meta.packet_type, meta.timestamp, self.self_weak.clone());
        self.deliver(meta.id, Ok(field)).await;
    }

    /// Route one result to the Response owning `id`, or the primary queue.
    ///
    /// A matched Response may have already been dropped by its owner without
    /// removing its stale map entry; in that case the send fails and the
    /// field must still reach the primary queue rather than vanish, so every
    /// inbound field lands on exactly one consumer (never neither).
    async fn deliver(self: &Arc<Self>, id: u32, item: FieldResult) {
        let target = {
            let state = self.state.lock().await;
            state.responses.get(&id).cloned()
        };
        let item = match target {
            Some(tx) => match tx.send(item).await {
                Ok(()) => return,
                Err(mpsc::error::SendError(item)) => {
                    let mut state = self.state.lock().await;
                    state.responses.remove(&id);
                    item
                }
            },
            None => item,
        };
        let tx = self.primary_tx.lock().unwrap().clone();
        if let Some(tx) = tx {
            let _ = tx.send(item).await;
        }
    }

    /// Peer-initiated or fault shutdown: observed from the reader task itself.
    async fn fault_close(self: &Arc<Self>, fault: NetworkError) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::debug!(error = %fault, "connection faulted, closing");
        let err = NcpError::from(Arc::new(fault));
        let responses = {
            let mut state = self.state.lock().await;
            std::mem::take(&mut state.responses)
        };
        let primary_tx = self.primary_tx.lock().unwrap().take();
        if let Some(tx) = &primary_tx {
            let _ = tx.send(Err(err.clone())).await;
        }
        for tx in responses.into_values() {
            let _ = tx.send(Err(err.clone())).await;
        }
    }

    /// Caller-initiated close: aborts the reader task and releases all queues
    /// with a clean end rather than an error.
    async fn initiate_close(self: &Arc<Self>) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = self.reader_task.lock().unwrap().take() {
            handle.abort();
        }
        let mut state = self.state.lock().await;
        let _ = state.writer.shutdown().await;
        state.responses.clear();
        drop(state);
        self.primary_tx.lock().unwrap().take();
    }

    async fn wait_reader_done(&self) {
        let handle = self.reader_task.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

async fn reader_loop<R: AsyncRead + Unpin>(inner: Weak<ConnectionInner>, mut stream: FieldStream<R>) {
    loop {
        let Some(conn) = inner.upgrade() else { return };
        match stream.next_field().await {
            Ok(Some((meta, field))) => conn.dispatch(meta, field).await,
            Ok(None) => {
                conn.fault_close(NetworkError::PeerClosed).await;
                return;
            }
            Err(e) => {
                conn.fault_close(e).await;
                return;
            }
        }
    }
}

/// A live connection to one peer: codec, demux, and handshake state folded
/// into a single handle that can be cloned cheaply and shared across tasks.
#[derive(Clone)]
pub struct Connection {
    pub(crate) inner: Arc<ConnectionInner>,
}

impl Connection {
    /// Wrap an already-established, bidirectional byte stream. Splits it into
    /// independent read/write halves and spawns the demux reader task; does
    /// not run the handshake (see [`crate::client::connect`] /
    /// [`crate::server::Server`] for that).
    pub fn from_transport<T>(transport: T, options: ConnectionOptions, warn_sink: WarnSink) -> Connection
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(transport);
        Connection {
            inner: ConnectionInner::spawn(read_half, write_half, options, warn_sink),
        }
    }

    pub(crate) async fn run_handshake(&self, role: Role, deadline: Option<std::time::Duration>) -> Result<(), NcpError> {
        handshake::run(self, role, deadline).await
    }

    /// Encode a single-field packet and write it atomically, returning a
    /// [`Response`] tracking that field's id.
    pub async fn send(
        &self,
        packet_type: Identifier,
        field_name: Identifier,
        params: impl IntoIterator<Item = (Identifier, ParamValue)>,
    ) -> Result<Response, NcpError> {
        let mut field = Field::new(field_name, packet_type);
        for (name, value) in params {
            field.insert(name, value);
        }
        self.send_packet(packet_type, vec![field]).await
    }

    /// Same as [`Connection::send`] but for several fields at once; the
    /// returned Response tracks the union of their ids.
    pub async fn send_packet(&self, packet_type: Identifier, fields: Vec<Field>) -> Result<Response, NcpError> {
        self.inner.send_fields(packet_type, fields).await
    }

    /// Wait for the next inbound field not claimed by any Response and not
    /// consumed by an auto-filter.
    pub async fn recv(&self) -> Result<Field, NcpError> {
        self.inner.recv_primary().await
    }

    /// As [`Connection::recv`], but skip fields that don't match; non-matching
    /// fields stay queued for later `recv`/`recv_field` calls.
    pub async fn recv_field(&self, packet_type: Option<Identifier>, field_name: Identifier) -> Result<Field, NcpError> {
        self.inner.recv_primary_matching(packet_type, field_name).await
    }

    /// Idempotent, cooperative shutdown: cancels pending awaits with a clean
    /// end, drains the in-flight write, and shuts the transport.
    pub async fn close(&self) {
        self.inner.initiate_close().await;
    }

    /// Wait for the reader task to fully stop (after a local or remote close).
    pub async fn wait_closed(&self) {
        self.inner.wait_reader_done().await;
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    pub(crate) fn options(&self) -> &ConnectionOptions {
        self.inner.options()
    }
}
