//! Lazily decode packets off a byte stream and hand out their fields one at a time.

use std::collections::VecDeque;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::NetworkError;
use crate::field::Field;
use crate::packet::{decode_header, verify_footer, Packet, PacketMeta, PACKET_HEADER_LEN};

/// Wraps a byte stream and yields `(PacketMeta, Field)` pairs in wire order,
/// reading one whole packet at a time and buffering its fields.
///
/// A transport close between packets ends the stream cleanly (`Ok(None)`); a
/// close in the middle of a packet surfaces [`NetworkError::UnexpectedEof`].
pub struct FieldStream<R> {
    inner: R,
    pending: VecDeque<(PacketMeta, Field)>,
}

impl<R: AsyncRead + Unpin> FieldStream<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, pending: VecDeque::new() }
    }

    /// Produce the next field, reading and decoding further packets as needed.
    pub async fn next_field(&mut self) -> Result<Option<(PacketMeta, Field)>, NetworkError> {
        loop {
            if let Some(item) = self.pending.pop_front() {
                return Ok(Some(item));
            }
            match self.read_packet().await? {
                Some(packet) => self.buffer_packet(packet),
                None => return Ok(None),
            }
        }
    }

    fn buffer_packet(&mut self, packet: Packet) {
        let meta = PacketMeta {
            packet_type: packet.packet_type,
            id: packet.id,
            info: packet.info,
            timestamp: packet.timestamp,
            total_len: 0,
        };
        for field in packet.fields {
            self.pending.push_back((meta, field));
        }
    }

    async fn read_packet(&mut self) -> Result<Option<Packet>, NetworkError> {
        let mut header = [0u8; PACKET_HEADER_LEN];
        match read_exact_or_clean_eof(&mut self.inner, &mut header).await? {
            None => return Ok(None),
            Some(()) => {}
        }
        let meta = decode_header(&header)?;
        let rest_len = meta.total_len - PACKET_HEADER_LEN;
        let mut rest = vec![0u8; rest_len];
        self.inner
            .read_exact(&mut rest)
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::UnexpectedEof {
                    NetworkError::UnexpectedEof
                } else {
                    NetworkError::Io(e)
                }
            })?;

        let mut full = Vec::with_capacity(meta.total_len);
        full.extend(header);
        full.extend(rest);
        let body_end = full.len() - 8;
        verify_footer(&full[..body_end], &full[body_end..])?;
        Packet::decode(&full)
    }
}

/// Read exactly `buf.len()` bytes, but treat EOF on the *first* byte as a
/// clean end of stream rather than an error.
async fn read_exact_or_clean_eof<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut [u8],
) -> Result<Option<()>, NetworkError> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await.map_err(NetworkError::Io)?;
        if n == 0 {
            return if filled == 0 {
                Ok(None)
            } else {
                Err(NetworkError::UnexpectedEof)
            };
        }
        filled += n;
    }
    Ok(Some(()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Field;
    use crate::identifier::Identifier;
    use crate::packet::Packet;
    use crate::timestamp::Timestamp;
    use crate::value::ParamValue;

    fn id(s: &str) -> Identifier {
        Identifier::new(s).unwrap()
    }

    #[tokio::test]
    async fn yields_fields_across_packets_in_order() {
        let mut field_a = Field::new(id("A"), id("TIME"));
        field_a.insert(id("SAMP"), ParamValue::I32(1));
        let packet1 = Packet {
            packet_type: id("DSPC"),
            id: 1,
            info: 0,
            timestamp: Timestamp::ZERO,
            fields: vec![field_a],
        };
        let field_b = Field::new(id("B"), id("TIME"));
        let packet2 = Packet {
            packet_type: id("DSPC"),
            id: 2,
            info: 0,
            timestamp: Timestamp::ZERO,
            fields: vec![field_b],
        };
        let mut bytes = packet1.encode();
        bytes.extend(packet2.encode());

        let mut stream = FieldStream::new(std::io::Cursor::new(bytes));
        let (meta1, f1) = stream.next_field().await.unwrap().unwrap();
        assert_eq!(meta1.id, 1);
        assert_eq!(f1.name(), id("A"));
        let (meta2, f2) = stream.next_field().await.unwrap().unwrap();
        assert_eq!(meta2.id, 2);
        assert_eq!(f2.name(), id("B"));
        assert!(stream.next_field().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn clean_close_after_fieldless_packet_ends_stream() {
        let packet = Packet::new(id("LINK"), 1);
        let bytes = packet.encode();
        let mut stream = FieldStream::new(std::io::Cursor::new(bytes));
        assert!(stream.next_field().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn partial_packet_is_unexpected_eof() {
        let packet = Packet::new(id("LINK"), 1);
        let mut bytes = packet.encode();
        bytes.truncate(bytes.len() - 2);
        let mut stream = FieldStream::new(std::io::Cursor::new(bytes));
        let err = stream.next_field().await.unwrap_err();
        assert!(matches!(err, NetworkError::UnexpectedEof));
    }
}
