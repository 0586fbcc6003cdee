//! ---
//! pb_section: "02-messaging-ipc-data-model"
//! pb_subsection: "module"
//! pb_type: "source"
//! pb_scope: "code"
//! pb_description: "Drives the frame parser from a byte source."
//! pb_version: "v0.0.0-prealpha"
//! pb_owner: "tbd"
//! ---
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use poolbus_proto::{FrameParser, RawMessage};
use tracing::{debug, trace};

use crate::io::{ByteSource, ReadOutcome};
use crate::metrics::BusMetrics;
use crate::{BusError, Result};

/// Pulls bytes from a [`ByteSource`] until a whole message is decoded.
pub struct FrameReader {
    source: Box<dyn ByteSource>,
    parser: FrameParser,
    idle_backoff: Duration,
    metrics: Arc<BusMetrics>,
}

impl FrameReader {
    /// Reader over `source` sleeping `idle_backoff` whenever no byte is available.
    pub fn new(source: Box<dyn ByteSource>, idle_backoff: Duration, metrics: Arc<BusMetrics>) -> Self {
        Self {
            source,
            parser: FrameParser::new(),
            idle_backoff,
            metrics,
        }
    }

    /// Next decoded message.
    ///
    /// Returns `Ok(None)` once `stop` is raised, [`BusError::StreamClosed`] on
    /// end of input and [`BusError::Io`] on a read failure. Malformed messages
    /// are counted and skipped.
    pub fn next_message(&mut self, stop: &AtomicBool) -> Result<Option<RawMessage>> {
        loop {
            if stop.load(Ordering::Acquire) {
                return Ok(None);
            }
            if let Some(message) = self.parser.next_ready() {
                return Ok(Some(self.decoded(message)));
            }
            match self.source.read_byte()? {
                ReadOutcome::Byte(byte) => match self.parser.feed(byte) {
                    Ok(Some(message)) => return Ok(Some(self.decoded(message))),
                    Ok(None) => {}
                    Err(err) => {
                        self.metrics.rejected();
                        debug!(error = %err, "discarding malformed message");
                    }
                },
                ReadOutcome::WouldBlock => {
                    if !self.parser.is_idle() {
                        debug!("input stalled mid-message, discarding partial message");
                        self.parser.reset();
                    }
                    std::thread::sleep(self.idle_backoff);
                }
                ReadOutcome::Eof => return Err(BusError::StreamClosed),
            }
        }
    }

    fn decoded(&self, message: RawMessage) -> RawMessage {
        self.metrics.frame(message.kind());
        trace!(message = %message, "frame decoded");
        message
    }
}
