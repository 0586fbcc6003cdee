//! ---
//! pb_section: "02-messaging-ipc-data-model"
//! pb_subsection: "module"
//! pb_type: "source"
//! pb_scope: "code"
//! pb_description: "Raw bus message, checksums and wire encoding."
//! pb_version: "v0.0.0-prealpha"
//! pb_owner: "tbd"
//! ---
use std::fmt;

use crate::actions::chlorinator;
use crate::parser::FrameParser;
use crate::{ProtocolError, Result};

/// First header byte of every primary message.
pub const PRIMARY_MARKER: u8 = 0xA5;
/// Marker, preamble echo, destination, source, action, length.
pub const PRIMARY_HEADER_LEN: usize = 6;
/// Largest declared data length accepted on the primary framing.
pub const PRIMARY_MAX_DATA: usize = 50;
/// Bytes sent ahead of the marker on the primary framing.
pub const PRIMARY_LEAD: [u8; 3] = [0xFF, 0x00, 0xFF];

/// Data-link escape opening and closing secondary messages.
pub const SECONDARY_DLE: u8 = 0x10;
/// Start-of-text after the opening escape.
pub const SECONDARY_STX: u8 = 0x02;
/// End-of-text after the closing escape.
pub const SECONDARY_ETX: u8 = 0x03;
/// Escape, start-of-text, destination, action.
pub const SECONDARY_HEADER_LEN: usize = 4;

/// Address reported for secondary messages, which carry no source byte.
pub const CHLORINATOR_ADDRESS: u8 = 0x00;

const DEST: usize = 2;
const SOURCE: usize = 3;
const ACTION: usize = 4;
const LENGTH: usize = 5;
const SECONDARY_DEST: usize = 2;
const SECONDARY_ACTION: usize = 3;

/// Which framing convention produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// `FF 00 FF A5 ..` framing with a self-declared length.
    Primary,
    /// `10 02 .. 10 03` framing with table-driven length.
    Secondary,
}

impl FrameKind {
    /// Short lowercase name for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            FrameKind::Primary => "primary",
            FrameKind::Secondary => "secondary",
        }
    }
}

/// Data length implied by a secondary action code.
pub fn secondary_data_len(action: u8) -> Option<usize> {
    match action {
        chlorinator::GET_STATUS => Some(1),
        chlorinator::STATUS => Some(2),
        chlorinator::VERSION => Some(17),
        chlorinator::SET_OUTPUT => Some(1),
        chlorinator::SALINITY => Some(2),
        chlorinator::GET_VERSION => Some(1),
        _ => None,
    }
}

/// Additive checksum of a delimited region: 16 bits for primary, 8 for secondary.
pub fn checksum(kind: FrameKind, bytes: &[u8]) -> u16 {
    let sum = bytes
        .iter()
        .fold(0u16, |acc, byte| acc.wrapping_add(u16::from(*byte)));
    match kind {
        FrameKind::Primary => sum,
        FrameKind::Secondary => sum & 0x00FF,
    }
}

/// Decode a hex dump such as `"A5 00 10 60"` into bytes.
pub fn parse_hex(text: &str) -> Result<Vec<u8>> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    Ok(hex::decode(compact)?)
}

/// A delimited, checksum-validated message.
///
/// `bytes` holds the header and data exactly as seen on the wire, without the
/// lead-in, checksum or trailer. For primary messages this starts at the `A5`
/// marker; for secondary messages it starts at the `10 02` escape so that the
/// checksum is the sum over `bytes` for both kinds.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RawMessage {
    kind: FrameKind,
    bytes: Vec<u8>,
}

impl RawMessage {
    /// Build a primary message from semantic fields.
    pub fn primary(preamble: u8, dest: u8, source: u8, action: u8, data: &[u8]) -> Result<Self> {
        if data.len() > PRIMARY_MAX_DATA {
            return Err(ProtocolError::LengthExceeded {
                declared: data.len(),
                max: PRIMARY_MAX_DATA,
            });
        }
        let mut bytes = Vec::with_capacity(PRIMARY_HEADER_LEN + data.len());
        bytes.extend_from_slice(&[
            PRIMARY_MARKER,
            preamble,
            dest,
            source,
            action,
            data.len() as u8,
        ]);
        bytes.extend_from_slice(data);
        Ok(Self {
            kind: FrameKind::Primary,
            bytes,
        })
    }

    /// Build a secondary message; the data length must match the action table.
    pub fn secondary(dest: u8, action: u8, data: &[u8]) -> Result<Self> {
        let mut bytes = Vec::with_capacity(SECONDARY_HEADER_LEN + data.len());
        bytes.extend_from_slice(&[SECONDARY_DLE, SECONDARY_STX, dest, action]);
        bytes.extend_from_slice(data);
        Self::from_bytes(FrameKind::Secondary, bytes)
    }

    /// Wrap already delimited bytes, validating the header against the length.
    pub fn from_bytes(kind: FrameKind, bytes: Vec<u8>) -> Result<Self> {
        match kind {
            FrameKind::Primary => {
                if bytes.len() < PRIMARY_HEADER_LEN {
                    return Err(ProtocolError::Length {
                        expected: PRIMARY_HEADER_LEN,
                        actual: bytes.len(),
                    });
                }
                if bytes[0] != PRIMARY_MARKER {
                    return Err(ProtocolError::Framing("primary marker must be 0xA5"));
                }
                let declared = usize::from(bytes[LENGTH]);
                if declared > PRIMARY_MAX_DATA {
                    return Err(ProtocolError::LengthExceeded {
                        declared,
                        max: PRIMARY_MAX_DATA,
                    });
                }
                if bytes.len() != PRIMARY_HEADER_LEN + declared {
                    return Err(ProtocolError::Length {
                        expected: PRIMARY_HEADER_LEN + declared,
                        actual: bytes.len(),
                    });
                }
            }
            FrameKind::Secondary => {
                if bytes.len() < SECONDARY_HEADER_LEN {
                    return Err(ProtocolError::Length {
                        expected: SECONDARY_HEADER_LEN,
                        actual: bytes.len(),
                    });
                }
                if bytes[0] != SECONDARY_DLE || bytes[1] != SECONDARY_STX {
                    return Err(ProtocolError::Framing("secondary start must be 0x10 0x02"));
                }
                let action = bytes[SECONDARY_ACTION];
                let expected = secondary_data_len(action)
                    .ok_or(ProtocolError::UnknownAction(action))?;
                if bytes.len() != SECONDARY_HEADER_LEN + expected {
                    return Err(ProtocolError::Length {
                        expected: SECONDARY_HEADER_LEN + expected,
                        actual: bytes.len(),
                    });
                }
            }
        }
        Ok(Self { kind, bytes })
    }

    /// Decode exactly one message from its on-wire form.
    pub fn from_wire(wire: &[u8]) -> Result<Self> {
        let mut parser = FrameParser::new();
        let mut last_error = None;
        for byte in wire {
            match parser.feed(*byte) {
                Ok(Some(message)) => return Ok(message),
                Ok(None) => {}
                Err(err) => last_error = Some(err),
            }
            if let Some(message) = parser.next_ready() {
                return Ok(message);
            }
        }
        Err(last_error.unwrap_or(ProtocolError::Framing("incomplete message")))
    }

    /// Framing that produced this message.
    pub fn kind(&self) -> FrameKind {
        self.kind
    }

    /// Header and data bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Destination address.
    pub fn dest(&self) -> u8 {
        match self.kind {
            FrameKind::Primary => self.bytes[DEST],
            FrameKind::Secondary => self.bytes[SECONDARY_DEST],
        }
    }

    /// Source address; secondary messages report [`CHLORINATOR_ADDRESS`].
    pub fn source(&self) -> u8 {
        match self.kind {
            FrameKind::Primary => self.bytes[SOURCE],
            FrameKind::Secondary => CHLORINATOR_ADDRESS,
        }
    }

    /// Action code.
    pub fn action(&self) -> u8 {
        match self.kind {
            FrameKind::Primary => self.bytes[ACTION],
            FrameKind::Secondary => self.bytes[SECONDARY_ACTION],
        }
    }

    /// Preamble echo byte following the primary marker.
    pub fn preamble(&self) -> Option<u8> {
        match self.kind {
            FrameKind::Primary => Some(self.bytes[1]),
            FrameKind::Secondary => None,
        }
    }

    /// Number of data bytes.
    pub fn data_len(&self) -> usize {
        self.data().len()
    }

    /// Data bytes following the header.
    pub fn data(&self) -> &[u8] {
        match self.kind {
            FrameKind::Primary => &self.bytes[PRIMARY_HEADER_LEN..],
            FrameKind::Secondary => &self.bytes[SECONDARY_HEADER_LEN..],
        }
    }

    /// Bounds-checked access to one data byte.
    pub fn data_byte(&self, index: usize) -> Result<u8> {
        let data = self.data();
        data.get(index).copied().ok_or(ProtocolError::DataIndex {
            index,
            len: data.len(),
        })
    }

    /// Big-endian 16-bit quantity stored at `index` and `index + 1`.
    pub fn data_word(&self, index: usize) -> Result<u16> {
        let hi = self.data_byte(index)?;
        let lo = self.data_byte(index + 1)?;
        Ok(u16::from_be_bytes([hi, lo]))
    }

    /// Checksum over header and data.
    pub fn checksum(&self) -> u16 {
        checksum(self.kind, &self.bytes)
    }

    /// Replace the source byte of a primary message. Secondary messages are returned unchanged.
    pub fn with_source(mut self, source: u8) -> Self {
        if self.kind == FrameKind::Primary {
            self.bytes[SOURCE] = source;
        }
        self
    }

    /// Full transmission form including lead-in, checksum and trailer.
    pub fn to_wire(&self) -> Vec<u8> {
        let sum = self.checksum();
        match self.kind {
            FrameKind::Primary => {
                let mut wire = Vec::with_capacity(PRIMARY_LEAD.len() + self.bytes.len() + 2);
                wire.extend_from_slice(&PRIMARY_LEAD);
                wire.extend_from_slice(&self.bytes);
                wire.extend_from_slice(&sum.to_be_bytes());
                wire
            }
            FrameKind::Secondary => {
                let mut wire = Vec::with_capacity(self.bytes.len() + 3);
                wire.extend_from_slice(&self.bytes);
                wire.extend_from_slice(&[sum as u8, SECONDARY_DLE, SECONDARY_ETX]);
                wire
            }
        }
    }
}

impl fmt::Display for RawMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, byte) in self.bytes.iter().enumerate() {
            if idx > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{:02X}", byte)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_fields_and_checksum() {
        let msg = RawMessage::primary(0x10, 0x10, 0x22, 0x86, &[0x0B, 0x01]).expect("valid");
        assert_eq!(msg.dest(), 0x10);
        assert_eq!(msg.source(), 0x22);
        assert_eq!(msg.action(), 0x86);
        assert_eq!(msg.data_len(), 2);
        assert_eq!(msg.preamble(), Some(0x10));
        assert_eq!(msg.checksum(), 0x017B);
        assert_eq!(
            msg.to_wire(),
            parse_hex("FF 00 FF A5 10 10 22 86 02 0B 01 01 7B").expect("hex")
        );
    }

    #[test]
    fn secondary_checksum_is_eight_bits() {
        let msg = RawMessage::secondary(0x50, 0x11, &[0x50]).expect("valid");
        assert_eq!(msg.checksum(), 0xC3);
        assert_eq!(msg.source(), CHLORINATOR_ADDRESS);
        assert_eq!(msg.preamble(), None);
        assert_eq!(
            msg.to_wire(),
            parse_hex("10 02 50 11 50 C3 10 03").expect("hex")
        );
    }

    #[test]
    fn secondary_rejects_unknown_action_and_wrong_length() {
        assert_eq!(
            RawMessage::secondary(0x50, 0x42, &[0x00]),
            Err(ProtocolError::UnknownAction(0x42))
        );
        assert!(matches!(
            RawMessage::secondary(0x00, 0x12, &[0x67]),
            Err(ProtocolError::Length {
                expected: 6,
                actual: 5
            })
        ));
    }

    #[test]
    fn primary_rejects_oversized_payload() {
        let data = [0u8; PRIMARY_MAX_DATA + 1];
        assert!(matches!(
            RawMessage::primary(0, 0x60, 0x10, 0x01, &data),
            Err(ProtocolError::LengthExceeded { declared: 51, .. })
        ));
    }

    #[test]
    fn from_bytes_checks_declared_length() {
        let bytes = parse_hex("A5 00 60 10 07 02 01").expect("hex");
        assert!(matches!(
            RawMessage::from_bytes(FrameKind::Primary, bytes),
            Err(ProtocolError::Length {
                expected: 8,
                actual: 7
            })
        ));
    }

    #[test]
    fn data_accessors_are_bounds_checked() {
        let msg = RawMessage::primary(0, 0x10, 0x60, 0x07, &[0x08, 0xAC]).expect("valid");
        assert_eq!(msg.data_word(0), Ok(0x08AC));
        assert_eq!(
            msg.data_byte(2),
            Err(ProtocolError::DataIndex { index: 2, len: 2 })
        );
        assert!(msg.data_word(1).is_err());
    }

    #[test]
    fn with_source_only_touches_primary() {
        let msg = RawMessage::primary(0x01, 0x10, 0x00, 0x02, &[0x00])
            .expect("valid")
            .with_source(0x22);
        assert_eq!(msg.source(), 0x22);
        let chlor = RawMessage::secondary(0x50, 0x11, &[0x10])
            .expect("valid")
            .with_source(0x22);
        assert_eq!(chlor.source(), CHLORINATOR_ADDRESS);
    }

    #[test]
    fn wire_round_trip_through_parser() {
        let wire = parse_hex("FF 00 FF A5 00 60 10 07 00 01 1C").expect("hex");
        let msg = RawMessage::from_wire(&wire).expect("decodes");
        assert_eq!(msg.to_wire(), wire);
        assert_eq!(msg.to_string(), "A5 00 60 10 07 00");
    }

    #[test]
    fn from_wire_reports_failure() {
        let wire = parse_hex("FF 00 FF A5 00 60 10 07 00 01 1D").expect("hex");
        assert!(matches!(
            RawMessage::from_wire(&wire),
            Err(ProtocolError::Checksum { .. })
        ));
        assert_eq!(
            RawMessage::from_wire(&[0xFF, 0x00]),
            Err(ProtocolError::Framing("incomplete message"))
        );
    }

    #[test]
    fn parse_hex_ignores_whitespace() {
        assert_eq!(parse_hex(" a5 00\n10 ").expect("hex"), vec![0xA5, 0x00, 0x10]);
        assert!(parse_hex("A5 0").is_err());
    }
}
