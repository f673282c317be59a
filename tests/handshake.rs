//! Client/server handshake over an in-memory duplex transport.

use ncplib::{connect, serve, ConnectionOptions, Identifier, ParamValue, WarnSink};

fn id(s: &str) -> Identifier {
    Identifier::new(s).unwrap()
}

#[tokio::test]
async fn client_and_server_complete_handshake() {
    let (client_side, server_side) = tokio::io::duplex(4096);

    let server_task = tokio::spawn(async move {
        let mut once = Some(server_side);
        serve(
            move || {
                let transport = once.take();
                async move { transport.ok_or_else(|| std::io::Error::other("no more transports")) }
            },
            ConnectionOptions::default(),
            WarnSink::default(),
            None,
            |conn| async move {
                let field = conn.recv().await.unwrap();
                assert_eq!(field.name(), id("PING"));
                field
                    .reply(id("DSPC"), id("PONG"), [(id("ECHO"), ParamValue::I32(42))])
                    .await
                    .unwrap();
            },
        )
        .await;
    });

    let conn = connect(client_side, ConnectionOptions::default(), WarnSink::default(), None)
        .await
        .expect("handshake should succeed");

    let mut response = conn
        .send(id("DSPC"), id("PING"), [])
        .await
        .unwrap();
    let reply = response.recv().await.unwrap();
    assert_eq!(reply.name(), id("PONG"));
    assert_eq!(reply.get(id("ECHO")), Some(&ParamValue::I32(42)));

    conn.close().await;
    server_task.abort();
}

async fn read_one_packet<R: tokio::io::AsyncRead + Unpin>(reader: &mut R) -> Vec<u8> {
    use tokio::io::AsyncReadExt;
    let mut header = [0u8; 32];
    reader.read_exact(&mut header).await.unwrap();
    let size_words = u32::from_le_bytes(header[8..12].try_into().unwrap());
    let mut rest = vec![0u8; size_words as usize * 4 - 32];
    reader.read_exact(&mut rest).await.unwrap();
    let mut full = header.to_vec();
    full.extend(rest);
    full
}

/// Scenario 6: the peer issues the challenge but never confirms it, so the
/// client's handshake must fail with an authentication error and the
/// connection must not be left usable.
#[tokio::test]
async fn auth_failure_closes_client_connection() {
    use tokio::io::AsyncWriteExt;

    let (client_side, mut server_side) = tokio::io::duplex(4096);

    let server_task = tokio::spawn(async move {
        let hello = ncplib::Packet {
            packet_type: id("LINK"),
            id: 1,
            info: 0,
            timestamp: ncplib::Timestamp::ZERO,
            fields: vec![],
        };
        server_side.write_all(&hello.encode()).await.unwrap();

        let ccre_bytes = read_one_packet(&mut server_side).await;
        let ccre = ncplib::Packet::decode(&ccre_bytes).unwrap();
        let ccre_field_id = ccre.fields[0].id();

        let scar = ncplib::Packet {
            packet_type: id("LINK"),
            id: ccre_field_id,
            info: 0,
            timestamp: ncplib::Timestamp::ZERO,
            fields: vec![ncplib::Field::new(id("SCAR"), id("LINK"))],
        };
        server_side.write_all(&scar.encode()).await.unwrap();

        // Never send SCON: close instead.
        server_side.shutdown().await.unwrap();
    });

    let result = connect(client_side, ConnectionOptions::default(), WarnSink::default(), None).await;
    assert!(result.is_err());
    server_task.await.unwrap();
}
