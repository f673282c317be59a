//! Fields: a named, ordered bag of typed parameters.

use std::sync::Weak;

use indexmap::IndexMap;

use crate::connection::ConnectionInner;
use crate::error::{NcpError, NetworkError};
use crate::identifier::{Identifier, IDENTIFIER_LEN};
use crate::timestamp::Timestamp;
use crate::value::{decode_param, encode_param, ParamValue};

const FIELD_HEADER_LEN: usize = IDENTIFIER_LEN + 4 + IDENTIFIER_LEN + 4 + 4;
const FIELD_FOOTER_LEN: usize = 4;

/// One logical message: a name, a sender-assigned id, and an ordered map of
/// parameters. Parameter names are unique within a field; insertion order is
/// preserved on the wire.
#[derive(Debug, Clone)]
pub struct Field {
    name: Identifier,
    id: u32,
    type_id: Identifier,
    params: IndexMap<Identifier, ParamValue>,
    /// Set when this field was delivered inbound: the enclosing packet's type.
    packet_type: Option<Identifier>,
    /// Set when this field was delivered inbound: the enclosing packet's timestamp.
    timestamp: Option<Timestamp>,
    /// Non-owning back reference to the connection that delivered this field,
    /// used only by [`Field::reply`].
    connection: Option<Weak<ConnectionInner>>,
}

impl Field {
    /// Construct a new, outbound field. `id` is normally allocated by
    /// [`crate::Connection::send_packet`]; construct with `0` and let the
    /// connection overwrite it if building fields ahead of time.
    pub fn new(name: Identifier, type_id: Identifier) -> Self {
        Self {
            name,
            id: 0,
            type_id,
            params: IndexMap::new(),
            packet_type: None,
            timestamp: None,
            connection: None,
        }
    }

    /// Builder-style parameter insertion.
    pub fn with(mut self, name: Identifier, value: ParamValue) -> Self {
        self.params.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: Identifier, value: ParamValue) {
        self.params.insert(name, value);
    }

    pub fn name(&self) -> Identifier {
        self.name
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn type_id(&self) -> Identifier {
        self.type_id
    }

    /// The packet `type` this field arrived in, if it was delivered inbound.
    pub fn packet_type(&self) -> Option<Identifier> {
        self.packet_type
    }

    /// The timestamp of the packet this field arrived in, if delivered inbound.
    pub fn timestamp(&self) -> Option<Timestamp> {
        self.timestamp
    }

    pub fn get(&self, name: Identifier) -> Option<&ParamValue> {
        self.params.get(&name)
    }

    pub fn contains(&self, name: Identifier) -> bool {
        self.params.contains_key(&name)
    }

    /// Parameters in wire order.
    pub fn params(&self) -> impl Iterator<Item = (&Identifier, &ParamValue)> {
        self.params.iter()
    }

    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    pub(crate) fn set_id(&mut self, id: u32) {
        self.id = id;
    }

    pub(crate) fn set_inbound_context(
        &mut self,
        packet_type: Identifier,
        timestamp: Timestamp,
        connection: Weak<ConnectionInner>,
    ) {
        self.packet_type = Some(packet_type);
        self.timestamp = Some(timestamp);
        self.connection = Some(connection);
    }

    /// Reply to this field: sends a new single-field packet whose `id` is set
    /// to this field's id, so the peer's demux matches it as a reply.
    ///
    /// Fails with [`NcpError::Closed`] if the owning connection has already
    /// closed; never panics on a stale back reference.
    pub async fn reply(
        &self,
        packet_type: Identifier,
        field_name: Identifier,
        params: impl IntoIterator<Item = (Identifier, ParamValue)>,
    ) -> Result<(), NcpError> {
        let connection = self
            .connection
            .as_ref()
            .and_then(Weak::upgrade)
            .ok_or(NcpError::Closed)?;
        let mut field = Field::new(field_name, packet_type);
        for (name, value) in params {
            field.insert(name, value);
        }
        ConnectionInner::reply_to(&connection, self.id, packet_type, field).await
    }
}

/// Encode a field (header, parameters, footer) and append it to `out`.
pub(crate) fn encode_field(field: &Field, out: &mut Vec<u8>) {
    let start = out.len();
    out.extend(field.name.as_bytes());
    out.extend([0u8; 4]); // size placeholder
    out.extend(field.type_id.as_bytes());
    out.extend(field.id.to_le_bytes());
    out.extend((field.params.len() as u32).to_le_bytes());
    for (name, value) in &field.params {
        encode_param(*name, value, out);
    }
    out.extend([0u8; FIELD_FOOTER_LEN]); // checksum: always 0 (unchecked)

    let total = out.len() - start;
    debug_assert_eq!(total % 4, 0);
    let size_words = (total / 4) as u32;
    out[start + IDENTIFIER_LEN..start + IDENTIFIER_LEN + 4].copy_from_slice(&size_words.to_le_bytes());
}

/// Decode one field from the front of `buf`. Returns the field and the number
/// of bytes consumed.
pub(crate) fn decode_field(buf: &[u8]) -> Result<(Field, usize), NetworkError> {
    if buf.len() < FIELD_HEADER_LEN + FIELD_FOOTER_LEN {
        return Err(NetworkError::MalformedField("buffer shorter than a field header+footer".into()));
    }
    let name = Identifier::from_bytes(buf[0..4].try_into().unwrap())?;
    let size_words = u32::from_le_bytes(buf[4..8].try_into().unwrap());
    let type_id = Identifier::from_bytes(buf[8..12].try_into().unwrap())?;
    let field_id = u32::from_le_bytes(buf[12..16].try_into().unwrap());
    let param_count = u32::from_le_bytes(buf[16..20].try_into().unwrap()) as usize;

    let total = size_words as usize * 4;
    if total < FIELD_HEADER_LEN + FIELD_FOOTER_LEN || total > buf.len() {
        return Err(NetworkError::MalformedField(format!(
            "field {name} declares size {total} bytes, have {}",
            buf.len()
        )));
    }
    let body_end = total - FIELD_FOOTER_LEN;
    let mut pos = FIELD_HEADER_LEN;
    let mut params = IndexMap::with_capacity(param_count);
    for _ in 0..param_count {
        let (param_name, value, consumed) = decode_param(&buf[pos..body_end])
            .map_err(|e| NetworkError::MalformedField(format!("field {name}: {e}")))?;
        if params.insert(param_name, value).is_some() {
            return Err(NetworkError::MalformedField(format!(
                "field {name}: duplicate parameter {param_name}"
            )));
        }
        pos += consumed;
    }
    if pos != body_end {
        return Err(NetworkError::MalformedField(format!(
            "field {name}: declared size does not match {param_count} decoded parameters"
        )));
    }

    Ok((
        Field {
            name,
            id: field_id,
            type_id,
            params,
            packet_type: None,
            timestamp: None,
            connection: None,
        },
        total,
    ))
}
