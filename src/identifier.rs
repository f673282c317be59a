//! Four-character identifiers used for packet types, field names, and
//! parameter names.

use std::fmt;

use crate::error::NetworkError;

/// Number of bytes in an on-wire identifier.
pub const IDENTIFIER_LEN: usize = 4;

/// A 4-byte `[A-Z0-9 ]` tag.
///
/// The raw 4-byte form (space-padded) is the equality key; [`Identifier::as_str`]
/// strips trailing padding for display.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Identifier([u8; IDENTIFIER_LEN]);

fn is_valid_byte(b: u8) -> bool {
    b.is_ascii_uppercase() || b.is_ascii_digit() || b == b' '
}

impl Identifier {
    /// Build an identifier from a short string, right-padding with spaces.
    ///
    /// Fails if any byte is outside `[A-Z0-9 ]` or the string is longer than
    /// [`IDENTIFIER_LEN`] bytes.
    pub fn new(s: &str) -> Result<Self, NetworkError> {
        let bytes = s.as_bytes();
        if bytes.len() > IDENTIFIER_LEN {
            return Err(NetworkError::InvalidIdentifier(format!(
                "{s:?} is longer than {IDENTIFIER_LEN} bytes"
            )));
        }
        let mut buf = [b' '; IDENTIFIER_LEN];
        for (dst, &src) in buf.iter_mut().zip(bytes) {
            if !is_valid_byte(src) {
                return Err(NetworkError::InvalidIdentifier(format!(
                    "{s:?} contains invalid byte {src:#04x}"
                )));
            }
            *dst = src;
        }
        Ok(Self(buf))
    }

    /// Build an identifier from the raw 4-byte wire form, validating each byte.
    pub fn from_bytes(bytes: [u8; IDENTIFIER_LEN]) -> Result<Self, NetworkError> {
        if let Some(&bad) = bytes.iter().find(|&&b| !is_valid_byte(b)) {
            return Err(NetworkError::InvalidIdentifier(format!(
                "invalid identifier byte {bad:#04x}"
            )));
        }
        Ok(Self(bytes))
    }

    /// The raw 4-byte wire form.
    pub fn as_bytes(&self) -> [u8; IDENTIFIER_LEN] {
        self.0
    }

    /// Canonical string form with trailing spaces stripped.
    pub fn as_str(&self) -> &str {
        let end = self
            .0
            .iter()
            .rposition(|&b| b != b' ')
            .map(|i| i + 1)
            .unwrap_or(0);
        // Safe: every byte is ASCII by construction.
        std::str::from_utf8(&self.0[..end]).unwrap_or("")
    }
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identifier({:?})", self.as_str())
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Identifier {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Identifier::new(s)
    }
}

impl TryFrom<&str> for Identifier {
    type Error = NetworkError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Identifier::new(s)
    }
}
