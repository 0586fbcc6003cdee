//! ---
//! pb_section: "02-messaging-ipc-data-model"
//! pb_subsection: "module"
//! pb_type: "source"
//! pb_scope: "code"
//! pb_description: "Resynchronising byte-at-a-time frame parser."
//! pb_version: "v0.0.0-prealpha"
//! pb_owner: "tbd"
//! ---
use std::collections::VecDeque;

use tracing::{debug, trace};

use crate::message::{
    checksum, secondary_data_len, FrameKind, RawMessage, PRIMARY_HEADER_LEN, PRIMARY_MARKER,
    PRIMARY_MAX_DATA, SECONDARY_DLE, SECONDARY_ETX, SECONDARY_STX,
};
use crate::{ProtocolError, Result};

const PREAMBLE: u8 = 0xFF;
const PRIMARY_SYNC: u8 = 0x00;

/// State machine recovering messages of both framings from a lossy byte stream.
///
/// A rejected candidate is not lost wholesale: every byte after its first
/// start byte is fed back through the machine, so a stray `10` or a truncated
/// message running straight into a valid one does not swallow the valid one.
/// Messages recovered that way are queued and handed out by
/// [`FrameParser::feed`] and [`FrameParser::next_ready`].
#[derive(Debug, Clone)]
pub struct FrameParser {
    state: ParseState,
    buffer: Vec<u8>,
    expected: usize,
    /// Bytes consumed since the current candidate's first start byte.
    window: Vec<u8>,
    ready: VecDeque<RawMessage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    /// Discarding bytes until a start sequence appears.
    WaitStart,
    /// One or more `FF` seen.
    Preamble,
    /// `FF .. 00` seen, expecting the `FF` preceding the marker.
    PrimaryLead,
    /// Collecting the six header bytes.
    PrimaryHeader,
    /// Collecting declared data bytes.
    PrimaryData,
    /// Waiting for the checksum high byte.
    PrimaryChecksumHi,
    /// Waiting for the checksum low byte.
    PrimaryChecksumLo { hi: u8 },
    /// `10` seen, expecting `02`.
    SecondaryStart,
    /// Collecting destination and action.
    SecondaryHeader,
    /// Collecting table-sized data bytes.
    SecondaryData,
    /// Waiting for the single checksum byte.
    SecondaryChecksum,
    /// Expecting the `10` of the trailer.
    SecondaryTrailer { checksum: u8 },
    /// Expecting the `03` of the trailer.
    SecondaryEnd { checksum: u8 },
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameParser {
    /// Create a parser waiting for a start sequence.
    pub fn new() -> Self {
        Self {
            state: ParseState::WaitStart,
            buffer: Vec::with_capacity(PRIMARY_HEADER_LEN + PRIMARY_MAX_DATA),
            expected: 0,
            window: Vec::new(),
            ready: VecDeque::new(),
        }
    }

    /// Drop any partial message and wait for the next start sequence.
    ///
    /// Messages already recovered stay queued for [`FrameParser::next_ready`].
    pub fn reset(&mut self) {
        self.restart();
        self.window.clear();
    }

    fn restart(&mut self) {
        self.state = ParseState::WaitStart;
        self.buffer.clear();
        self.expected = 0;
    }

    /// True when no partial message is held.
    pub fn is_idle(&self) -> bool {
        matches!(self.state, ParseState::WaitStart | ParseState::Preamble)
    }

    /// Feed a single byte.
    ///
    /// Returns `Ok(Some(message))` when a message completes, `Ok(None)` when
    /// more bytes are needed, or `Err` when the current message was rejected.
    /// A rejection may still recover later messages from the rejected bytes;
    /// drain them with [`FrameParser::next_ready`].
    pub fn feed(&mut self, byte: u8) -> Result<Option<RawMessage>> {
        match self.step(byte) {
            Ok(Some(message)) => self.ready.push_back(message),
            Ok(None) => {}
            Err(err) => {
                self.replay();
                return Err(err);
            }
        }
        Ok(self.ready.pop_front())
    }

    /// Next message recovered while resynchronising after a rejection.
    pub fn next_ready(&mut self) -> Option<RawMessage> {
        self.ready.pop_front()
    }

    fn replay(&mut self) {
        let mut pending: VecDeque<u8> = self.window.drain(..).skip(1).collect();
        while let Some(byte) = pending.pop_front() {
            match self.step(byte) {
                Ok(Some(message)) => self.ready.push_back(message),
                Ok(None) => {}
                Err(err) => {
                    trace!(error = %err, "rejected while resynchronising");
                    for byte in self.window.drain(..).skip(1).rev() {
                        pending.push_front(byte);
                    }
                }
            }
        }
    }

    fn step(&mut self, byte: u8) -> Result<Option<RawMessage>> {
        if self.state == ParseState::WaitStart {
            self.window.clear();
        }
        self.window.push(byte);
        match self.state {
            ParseState::WaitStart => {
                match byte {
                    PREAMBLE => self.state = ParseState::Preamble,
                    SECONDARY_DLE => self.begin_secondary(),
                    _ => {}
                }
                Ok(None)
            }
            ParseState::Preamble => {
                match byte {
                    PREAMBLE => {
                        self.window.clear();
                        self.window.push(byte);
                    }
                    PRIMARY_SYNC => self.state = ParseState::PrimaryLead,
                    SECONDARY_DLE => self.begin_secondary(),
                    _ => self.state = ParseState::WaitStart,
                }
                Ok(None)
            }
            ParseState::PrimaryLead => {
                if byte != PREAMBLE {
                    return self.reject(ProtocolError::Framing("missing 0xFF before marker"));
                }
                self.buffer.clear();
                self.state = ParseState::PrimaryHeader;
                Ok(None)
            }
            ParseState::PrimaryHeader => {
                if self.buffer.is_empty() && byte != PRIMARY_MARKER {
                    return self.reject(ProtocolError::Framing("primary marker must be 0xA5"));
                }
                self.buffer.push(byte);
                if self.buffer.len() == PRIMARY_HEADER_LEN {
                    let declared = usize::from(byte);
                    if declared > PRIMARY_MAX_DATA {
                        return self.reject(ProtocolError::LengthExceeded {
                            declared,
                            max: PRIMARY_MAX_DATA,
                        });
                    }
                    self.expected = PRIMARY_HEADER_LEN + declared;
                    self.state = if declared == 0 {
                        ParseState::PrimaryChecksumHi
                    } else {
                        ParseState::PrimaryData
                    };
                }
                Ok(None)
            }
            ParseState::PrimaryData => {
                self.buffer.push(byte);
                if self.buffer.len() == self.expected {
                    self.state = ParseState::PrimaryChecksumHi;
                }
                Ok(None)
            }
            ParseState::PrimaryChecksumHi => {
                self.state = ParseState::PrimaryChecksumLo { hi: byte };
                Ok(None)
            }
            ParseState::PrimaryChecksumLo { hi } => {
                let transmitted = u16::from_be_bytes([hi, byte]);
                self.finish(FrameKind::Primary, transmitted)
            }
            ParseState::SecondaryStart => {
                if byte != SECONDARY_STX {
                    return self.reject(ProtocolError::Framing("missing 0x02 after 0x10"));
                }
                self.buffer.push(byte);
                self.state = ParseState::SecondaryHeader;
                Ok(None)
            }
            ParseState::SecondaryHeader => {
                self.buffer.push(byte);
                if self.buffer.len() == 4 {
                    let Some(len) = secondary_data_len(byte) else {
                        return self.reject(ProtocolError::UnknownAction(byte));
                    };
                    self.expected = self.buffer.len() + len;
                    self.state = if len == 0 {
                        ParseState::SecondaryChecksum
                    } else {
                        ParseState::SecondaryData
                    };
                }
                Ok(None)
            }
            ParseState::SecondaryData => {
                self.buffer.push(byte);
                if self.buffer.len() == self.expected {
                    self.state = ParseState::SecondaryChecksum;
                }
                Ok(None)
            }
            ParseState::SecondaryChecksum => {
                self.state = ParseState::SecondaryTrailer { checksum: byte };
                Ok(None)
            }
            ParseState::SecondaryTrailer { checksum } => {
                if byte != SECONDARY_DLE {
                    return self.reject(ProtocolError::Framing("missing 0x10 in trailer"));
                }
                self.state = ParseState::SecondaryEnd { checksum };
                Ok(None)
            }
            ParseState::SecondaryEnd { checksum } => {
                if byte != SECONDARY_ETX {
                    return self.reject(ProtocolError::Framing("missing 0x03 in trailer"));
                }
                self.finish(FrameKind::Secondary, u16::from(checksum))
            }
        }
    }

    /// Feed a slice, collecting every completed message and dropping rejects.
    pub fn feed_all(&mut self, bytes: &[u8]) -> Vec<RawMessage> {
        let mut messages = Vec::new();
        for byte in bytes {
            match self.feed(*byte) {
                Ok(Some(message)) => messages.push(message),
                Ok(None) => {}
                Err(err) => debug!(error = %err, "discarding malformed message"),
            }
            messages.extend(self.ready.drain(..));
        }
        messages
    }

    fn begin_secondary(&mut self) {
        self.buffer.clear();
        self.buffer.push(SECONDARY_DLE);
        self.state = ParseState::SecondaryStart;
    }

    fn finish(&mut self, kind: FrameKind, transmitted: u16) -> Result<Option<RawMessage>> {
        let computed = checksum(kind, &self.buffer);
        if computed != transmitted {
            return self.reject(ProtocolError::Checksum {
                computed,
                transmitted,
            });
        }
        let bytes = std::mem::take(&mut self.buffer);
        self.restart();
        let message = RawMessage::from_bytes(kind, bytes)?;
        trace!(kind = kind.as_str(), action = message.action(), "message decoded");
        Ok(Some(message))
    }

    /// Abandon the candidate, leaving the window for the replay in `feed`.
    fn reject(&mut self, err: ProtocolError) -> Result<Option<RawMessage>> {
        self.restart();
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::parse_hex;

    fn decode(hex: &str) -> Vec<RawMessage> {
        FrameParser::new().feed_all(&parse_hex(hex).expect("hex"))
    }

    #[test]
    fn accepts_long_preamble_run() {
        let messages = decode("FF FF FF FF FF FF FF FF 00 FF A5 10 22 10 01 01 86 01 6F");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].dest(), 0x22);
        assert_eq!(messages[0].source(), 0x10);
        assert_eq!(messages[0].action(), 0x01);
        assert_eq!(messages[0].data(), &[0x86]);
    }

    #[test]
    fn zero_length_primary() {
        let messages = decode("FF 00 FF A5 00 60 10 07 00 01 1C");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].data_len(), 0);
    }

    #[test]
    fn secondary_after_preamble_bytes() {
        let messages = decode("FF 10 02 50 11 50 C3 10 03");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].kind(), FrameKind::Secondary);
        assert_eq!(messages[0].data(), &[0x50]);
    }

    #[test]
    fn reports_each_rejection_kind() {
        let mut parser = FrameParser::new();
        let feed = |parser: &mut FrameParser, hex: &str| -> Vec<ProtocolError> {
            parse_hex(hex)
                .expect("hex")
                .into_iter()
                .filter_map(|b| parser.feed(b).err())
                .collect()
        };

        assert_eq!(
            feed(&mut parser, "FF 00 01"),
            vec![ProtocolError::Framing("missing 0xFF before marker")]
        );
        assert_eq!(
            feed(&mut parser, "FF 00 FF A4"),
            vec![ProtocolError::Framing("primary marker must be 0xA5")]
        );
        assert_eq!(
            feed(&mut parser, "FF 00 FF A5 00 60 10 07 33"),
            vec![ProtocolError::LengthExceeded {
                declared: 0x33,
                max: PRIMARY_MAX_DATA
            }]
        );
        assert_eq!(
            feed(&mut parser, "10 05"),
            vec![ProtocolError::Framing("missing 0x02 after 0x10")]
        );
        assert_eq!(
            feed(&mut parser, "10 02 50 42"),
            vec![ProtocolError::UnknownAction(0x42)]
        );
        assert_eq!(
            feed(&mut parser, "10 02 50 11 00 73 10 04"),
            vec![ProtocolError::Framing("missing 0x03 in trailer")]
        );
        assert_eq!(
            feed(&mut parser, "10 02 50 11 00 74 10 03"),
            vec![ProtocolError::Checksum {
                computed: 0x73,
                transmitted: 0x74
            }]
        );
        assert!(parser.is_idle());
    }

    #[test]
    fn stray_start_byte_does_not_swallow_next_message() {
        let messages = decode("10 FF 00 FF A5 00 60 10 07 00 01 1C");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].action(), 0x07);

        let messages = decode("10 02 10 02 50 11 50 C3 10 03");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].kind(), FrameKind::Secondary);
    }

    #[test]
    fn message_inside_rejected_candidate_is_queued() {
        let mut parser = FrameParser::new();
        let bytes =
            parse_hex("FF 00 FF A5 00 10 60 07 0C 10 02 50 11 50 C3 10 03 00 00 00 00 00 00")
                .expect("hex");
        let (last, head) = bytes.split_last().expect("bytes");
        for byte in head {
            assert_eq!(parser.feed(*byte), Ok(None));
        }
        assert!(matches!(
            parser.feed(*last),
            Err(ProtocolError::Checksum { .. })
        ));
        let recovered = parser.next_ready().expect("recovered message");
        assert_eq!(recovered.kind(), FrameKind::Secondary);
        assert_eq!(recovered.data(), &[0x50]);
        assert_eq!(parser.next_ready(), None);
        assert!(parser.is_idle());
    }

    #[test]
    fn reset_discards_partial_message() {
        let mut parser = FrameParser::new();
        for byte in parse_hex("FF 00 FF A5 00 60").expect("hex") {
            assert_eq!(parser.feed(byte), Ok(None));
        }
        assert!(!parser.is_idle());
        parser.reset();
        let tail = parse_hex("10 07 00 01 1C").expect("hex");
        assert!(parser.feed_all(&tail).is_empty());
    }
}
