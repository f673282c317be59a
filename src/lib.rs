//! `ncplib`: client and server library for the Node Communication Protocol
//! (NCP), a binary request/response and publish/subscribe wire protocol used
//! to control and stream data between CRFS radio-frequency nodes and client
//! applications.
//!
//! This crate is transport-agnostic: it implements the framing codec, the
//! per-connection state machine (handshake, auto-replies, demultiplexing),
//! and the request/response correlation model over any `AsyncRead +
//! AsyncWrite` byte stream. Dialing sockets, accepting listeners, and TLS
//! are left to the caller — see [`client::connect`] and [`server::serve`].

mod client;
mod connection;
mod error;
mod field;
mod handshake;
mod identifier;
mod options;
mod packet;
mod response;
mod server;
mod stream_reader;
mod timestamp;
mod value;
mod warning;

pub use client::connect;
pub use connection::{Connection, Role};
pub use error::{NcpError, NetworkError, Result};
pub use field::Field;
pub use identifier::Identifier;
pub use options::ConnectionOptions;
pub use packet::{Packet, PacketMeta};
pub use response::Response;
pub use server::serve;
pub use timestamp::Timestamp;
pub use value::{ArrayKind, ArrayValue, ParamValue};
pub use warning::{CommandWarning, WarnSink};
