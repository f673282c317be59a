//! Packet framing: fixed 32-byte header, a body of concatenated fields, and
//! an 8-byte CRC-32'd footer.

use crate::error::NetworkError;
use crate::field::{decode_field, encode_field, Field};
use crate::identifier::Identifier;
use crate::timestamp::Timestamp;

const HEADER_MAGIC: [u8; 4] = [0xDD, 0xCC, 0xBB, 0xAA];
const FOOTER_MAGIC: [u8; 4] = [0xAA, 0xBB, 0xCC, 0xDD];
const FORMAT_ID: [u8; 4] = *b"NCPL";

pub(crate) const PACKET_HEADER_LEN: usize = 32;
const PACKET_FOOTER_LEN: usize = 8;

/// The fixed packet header fields, decoded ahead of the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketMeta {
    pub packet_type: Identifier,
    pub id: u32,
    pub info: u32,
    pub timestamp: Timestamp,
    /// Total packet size in bytes (header + body + footer), as declared on the wire.
    pub total_len: usize,
}

/// A full packet: header fields plus its ordered fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub packet_type: Identifier,
    pub id: u32,
    pub info: u32,
    pub timestamp: Timestamp,
    pub fields: Vec<Field>,
}

impl Packet {
    pub fn new(packet_type: Identifier, id: u32) -> Self {
        Self {
            packet_type,
            id,
            info: 0,
            timestamp: Timestamp::now(),
            fields: Vec::new(),
        }
    }

    /// Encode header, fields (in order), and footer with a valid CRC-32.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(PACKET_HEADER_LEN + 64);
        out.extend(HEADER_MAGIC);
        out.extend(self.packet_type.as_bytes());
        out.extend([0u8; 4]); // size placeholder
        out.extend(self.id.to_le_bytes());
        out.extend(self.info.to_le_bytes());
        out.extend(self.timestamp.seconds.to_le_bytes());
        out.extend(self.timestamp.nanoseconds.to_le_bytes());
        out.extend(FORMAT_ID);
        debug_assert_eq!(out.len(), PACKET_HEADER_LEN);

        for field in &self.fields {
            encode_field(field, &mut out);
        }

        let body_end = out.len();
        out.extend(FOOTER_MAGIC);

        let total = out.len() + 4; // + crc word
        debug_assert_eq!(total % 4, 0);
        let size_words = (total / 4) as u32;
        out[8..12].copy_from_slice(&size_words.to_le_bytes());

        let crc = crc32fast::hash(&out[..body_end]);
        out.extend(crc.to_le_bytes());
        out
    }

    /// Decode a full packet from an exact byte slice (header through footer).
    pub fn decode(buf: &[u8]) -> Result<Self, NetworkError> {
        let meta = decode_header(buf)?;
        if meta.total_len != buf.len() {
            return Err(NetworkError::MalformedPacket(format!(
                "header declares {} bytes, have {}",
                meta.total_len,
                buf.len()
            )));
        }
        let body_end = buf.len() - PACKET_FOOTER_LEN;
        verify_footer(&buf[..body_end], &buf[body_end..])?;

        let mut fields = Vec::new();
        let mut pos = PACKET_HEADER_LEN;
        while pos < body_end {
            let (field, consumed) = decode_field(&buf[pos..body_end])?;
            fields.push(field);
            pos += consumed;
        }
        if pos != body_end {
            return Err(NetworkError::MalformedPacket(
                "fields did not exactly fill the packet body".into(),
            ));
        }

        Ok(Packet {
            packet_type: meta.packet_type,
            id: meta.id,
            info: meta.info,
            timestamp: meta.timestamp,
            fields,
        })
    }
}

/// Decode and validate the fixed 32-byte header, yielding the declared total
/// packet length in bytes (`size_words * 4`) without reading the body.
pub(crate) fn decode_header(buf: &[u8]) -> Result<PacketMeta, NetworkError> {
    if buf.len() < PACKET_HEADER_LEN {
        return Err(NetworkError::UnexpectedEof);
    }
    if buf[0..4] != HEADER_MAGIC {
        return Err(NetworkError::MalformedPacket("bad header magic".into()));
    }
    let packet_type = Identifier::from_bytes(buf[4..8].try_into().unwrap())?;
    let size_words = u32::from_le_bytes(buf[8..12].try_into().unwrap());
    let id = u32::from_le_bytes(buf[12..16].try_into().unwrap());
    let info = u32::from_le_bytes(buf[16..20].try_into().unwrap());
    let seconds = i32::from_le_bytes(buf[20..24].try_into().unwrap());
    let nanoseconds = i32::from_le_bytes(buf[24..28].try_into().unwrap());
    if buf[28..32] != FORMAT_ID {
        return Err(NetworkError::MalformedPacket("bad format_id".into()));
    }
    let total_len = size_words as usize * 4;
    if total_len < PACKET_HEADER_LEN + PACKET_FOOTER_LEN {
        return Err(NetworkError::MalformedPacket(format!(
            "declared size {total_len} smaller than header+footer"
        )));
    }
    Ok(PacketMeta {
        packet_type,
        id,
        info,
        timestamp: Timestamp { seconds, nanoseconds },
        total_len,
    })
}

/// Validate the 8-byte footer (`body` is everything from offset 0 through the
/// end of the packet body, i.e. everything the CRC covers).
pub(crate) fn verify_footer(body: &[u8], footer: &[u8]) -> Result<(), NetworkError> {
    if footer.len() != PACKET_FOOTER_LEN || footer[0..4] != FOOTER_MAGIC {
        return Err(NetworkError::MalformedPacket("bad footer magic".into()));
    }
    let declared_crc = u32::from_le_bytes(footer[4..8].try_into().unwrap());
    if declared_crc != 0 {
        let actual = crc32fast::hash(body);
        if actual != declared_crc {
            return Err(NetworkError::MalformedPacket(format!(
                "crc mismatch: declared {declared_crc:#010x}, computed {actual:#010x}"
            )));
        }
    }
    Ok(())
}
