//! Demux, correlation, and auto-filter behavior, driven directly against a
//! `Connection` wrapping an in-memory duplex transport (handshake skipped
//! via `auto_auth(false)` so tests can script the wire traffic exactly).

use ncplib::{Connection, ConnectionOptions, Field, Identifier, NcpError, ParamValue, Packet, Timestamp, WarnSink};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

fn id(s: &str) -> Identifier {
    Identifier::new(s).unwrap()
}

fn no_handshake() -> ConnectionOptions {
    ConnectionOptions::default().auto_auth(false)
}

async fn read_one_packet<R: tokio::io::AsyncRead + Unpin>(reader: &mut R) -> Packet {
    let mut header = [0u8; 32];
    reader.read_exact(&mut header).await.unwrap();
    let size_words = u32::from_le_bytes(header[8..12].try_into().unwrap());
    let mut rest = vec![0u8; size_words as usize * 4 - 32];
    reader.read_exact(&mut rest).await.unwrap();
    let mut full = header.to_vec();
    full.extend(rest);
    Packet::decode(&full).unwrap()
}

fn reply_packet(packet_type: Identifier, reply_id: u32, field: Field) -> Packet {
    Packet {
        packet_type,
        id: reply_id,
        info: 0,
        timestamp: Timestamp::ZERO,
        fields: vec![field],
    }
}

#[tokio::test]
async fn reply_correlation_excludes_primary_stream() {
    let (client_side, mut peer) = tokio::io::duplex(4096);
    let conn = Connection::from_transport(client_side, no_handshake(), WarnSink::default());

    let mut response = conn.send(id("DSPC"), id("REQ"), []).await.unwrap();
    let sent_id = *response.ids().iter().next().unwrap();

    let sent = read_one_packet(&mut peer).await;
    assert_eq!(sent.id, sent_id);

    let reply = reply_packet(id("DSPC"), sent_id, Field::new(id("TIME"), id("DSPC")));
    peer.write_all(&reply.encode()).await.unwrap();
    let field = response.recv().await.unwrap();
    assert_eq!(field.name(), id("TIME"));

    // An unrelated, unsolicited packet id lands on the primary stream instead.
    let unsolicited = reply_packet(id("DSPC"), 9999, Field::new(id("EVT"), id("DSPC")));
    peer.write_all(&unsolicited.encode()).await.unwrap();
    let primary_field = conn.recv().await.unwrap();
    assert_eq!(primary_field.name(), id("EVT"));
}

#[tokio::test]
async fn concurrent_fan_out_is_one_packet_per_field_with_distinct_ids() {
    let (client_side, mut peer) = tokio::io::duplex(8192);
    let conn = Connection::from_transport(client_side, no_handshake(), WarnSink::default());

    let fields = vec![
        Field::new(id("X"), id("DSPC")),
        Field::new(id("X"), id("DSPC")),
        Field::new(id("X"), id("DSPC")),
    ];
    let mut response = conn.send_packet(id("DSPC"), fields).await.unwrap();
    let mut ids: Vec<u32> = response.ids().iter().copied().collect();
    ids.sort();
    assert_eq!(ids.len(), 3);
    assert_eq!(ids[1], ids[0] + 1);
    assert_eq!(ids[2], ids[1] + 1);

    let mut observed = Vec::new();
    for _ in 0..3 {
        observed.push(read_one_packet(&mut peer).await.id);
    }
    observed.sort();
    assert_eq!(observed, ids);

    // Peer replies out of order: id[2] (field B) before id[0] (field A).
    peer.write_all(&reply_packet(id("DSPC"), ids[2], Field::new(id("B"), id("DSPC"))).encode())
        .await
        .unwrap();
    peer.write_all(&reply_packet(id("DSPC"), ids[0], Field::new(id("A"), id("DSPC"))).encode())
        .await
        .unwrap();

    let a = response.recv_field(id("A")).await.unwrap();
    assert_eq!(a.name(), id("A"));
    let b = response.recv_field(id("B")).await.unwrap();
    assert_eq!(b.name(), id("B"));
}

#[tokio::test]
async fn keepalive_gets_auto_reply_and_never_surfaces() {
    let (client_side, mut peer) = tokio::io::duplex(4096);
    let conn = Connection::from_transport(client_side, no_handshake(), WarnSink::default());

    let link = reply_packet(id("LINK"), 5, Field::new(id("LINK"), id("LINK")));
    peer.write_all(&link.encode()).await.unwrap();

    let reply = read_one_packet(&mut peer).await;
    assert_eq!(reply.packet_type, id("LINK"));
    assert_eq!(reply.fields[0].name(), id("LINK"));

    let evt = reply_packet(id("DSPC"), 77, Field::new(id("EVT"), id("DSPC")));
    peer.write_all(&evt.encode()).await.unwrap();
    let field = conn.recv().await.unwrap();
    assert_eq!(field.name(), id("EVT"));
}

#[tokio::test]
async fn ackn_only_field_is_silently_dropped() {
    let (client_side, mut peer) = tokio::io::duplex(4096);
    let conn = Connection::from_transport(client_side, no_handshake(), WarnSink::default());

    let mut ackn_field = Field::new(id("ACK"), id("DSPC"));
    ackn_field.insert(id("ACKN"), ParamValue::I32(0));
    peer.write_all(&reply_packet(id("DSPC"), 1, ackn_field).encode())
        .await
        .unwrap();

    let evt = reply_packet(id("DSPC"), 2, Field::new(id("EVT"), id("DSPC")));
    peer.write_all(&evt.encode()).await.unwrap();

    let field = conn.recv().await.unwrap();
    assert_eq!(field.name(), id("EVT"));
}

#[tokio::test]
async fn erro_converts_to_command_error_on_the_matching_response() {
    let (client_side, mut peer) = tokio::io::duplex(4096);
    let conn = Connection::from_transport(client_side, no_handshake(), WarnSink::default());

    let mut response = conn.send(id("DSPC"), id("REQ"), []).await.unwrap();
    let sent_id = *response.ids().iter().next().unwrap();
    let _ = read_one_packet(&mut peer).await;

    let mut err_field = Field::new(id("ERR"), id("DSPC"));
    err_field.insert(id("ERRO"), ParamValue::Str("boom".into()));
    err_field.insert(id("ERRC"), ParamValue::I32(42));
    peer.write_all(&reply_packet(id("DSPC"), sent_id, err_field).encode())
        .await
        .unwrap();

    let err = response.recv().await.unwrap_err();
    match err {
        NcpError::Command { code, detail, .. } => {
            assert_eq!(code, 42);
            assert_eq!(detail, "boom");
        }
        other => panic!("expected Command error, got {other:?}"),
    }
}

#[tokio::test]
async fn peer_disconnect_faults_every_pending_consumer() {
    let (client_side, peer) = tokio::io::duplex(4096);
    let conn = Connection::from_transport(client_side, no_handshake(), WarnSink::default());
    drop(peer);

    let err = conn.recv().await.unwrap_err();
    assert!(matches!(err, NcpError::Network(_)));
}
