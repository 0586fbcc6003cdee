//! ---
//! pb_section: "02-messaging-ipc-data-model"
//! pb_subsection: "module"
//! pb_type: "source"
//! pb_scope: "code"
//! pb_description: "Serial, TCP and in-memory links producing byte sources and sinks."
//! pb_version: "v0.0.0-prealpha"
//! pb_owner: "tbd"
//! ---
use std::collections::VecDeque;
use std::io;
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use poolbus_common::LinkConfig;
use poolbus_proto::RawMessage;
use tracing::debug;

use crate::io::{ByteSink, ByteSource, ReadOutcome, ReaderSource, WriterSink};

/// Read timeout applied to serial and TCP links so the reader can observe stop requests.
pub const LINK_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Something that can be opened into a byte source and sink pair.
pub trait Link: Send + Sync {
    /// Open the link.
    fn open(&self) -> io::Result<(Box<dyn ByteSource>, Box<dyn ByteSink>)>;
    /// Endpoint description for logs.
    fn name(&self) -> String;
}

/// Build the link described by configuration.
pub fn link_from_config(config: &LinkConfig) -> Box<dyn Link> {
    match config {
        LinkConfig::Serial { port, baud_rate } => Box::new(SerialLink::new(port.clone(), *baud_rate)),
        LinkConfig::Tcp { host, tcp_port } => Box::new(TcpLink::new(host.clone(), *tcp_port)),
    }
}

/// RS-485 adapter, 8N1.
#[derive(Debug, Clone)]
pub struct SerialLink {
    port: String,
    baud_rate: u32,
}

impl SerialLink {
    /// Link for `port` at `baud_rate`.
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
        }
    }
}

impl Link for SerialLink {
    fn open(&self) -> io::Result<(Box<dyn ByteSource>, Box<dyn ByteSink>)> {
        let port = serialport::new(&self.port, self.baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .timeout(LINK_READ_TIMEOUT)
            .open()
            .map_err(io::Error::from)?;
        let writer = port.try_clone().map_err(io::Error::from)?;
        debug!(port = %self.port, baud = self.baud_rate, "serial link opened");
        Ok((
            Box::new(ReaderSource::new(port)),
            Box::new(WriterSink::new(writer)),
        ))
    }

    fn name(&self) -> String {
        format!("{}@{}", self.port, self.baud_rate)
    }
}

/// Serial-over-TCP bridge.
#[derive(Debug, Clone)]
pub struct TcpLink {
    host: String,
    port: u16,
}

impl TcpLink {
    /// Link to `host:port`.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl Link for TcpLink {
    fn open(&self) -> io::Result<(Box<dyn ByteSource>, Box<dyn ByteSink>)> {
        let stream = TcpStream::connect((self.host.as_str(), self.port))?;
        stream.set_read_timeout(Some(LINK_READ_TIMEOUT))?;
        stream.set_nodelay(true)?;
        let writer = stream.try_clone()?;
        debug!(host = %self.host, port = self.port, "tcp link opened");
        Ok((
            Box::new(ReaderSource::new(stream)),
            Box::new(WriterSink::new(writer)),
        ))
    }

    fn name(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

type Responder = Box<dyn FnMut(&[u8]) -> Option<Vec<u8>> + Send>;

#[derive(Default)]
struct MemoryState {
    inbound: VecDeque<u8>,
    written: Vec<Vec<u8>>,
    closed: bool,
    fail_open: Option<io::ErrorKind>,
    responder: Option<Responder>,
}

/// In-process link used by tests and offline tooling.
///
/// Bytes pushed with [`MemoryLink::push_bytes`] are read by the bus; every
/// write is captured and may be answered by a responder closure.
#[derive(Clone, Default)]
pub struct MemoryLink {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryLink {
    /// Empty, open link.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue raw bytes for the reader.
    pub fn push_bytes(&self, bytes: &[u8]) {
        self.state.lock().inbound.extend(bytes.iter().copied());
    }

    /// Queue the wire form of a message.
    pub fn push_message(&self, message: &RawMessage) {
        self.push_bytes(&message.to_wire());
    }

    /// Mark the stream ended; readers see [`ReadOutcome::Eof`] once drained.
    pub fn close(&self) {
        self.state.lock().closed = true;
    }

    /// Make the next `open` fail with `kind`.
    pub fn fail_next_open(&self, kind: io::ErrorKind) {
        self.state.lock().fail_open = Some(kind);
    }

    /// Answer each write with the bytes the closure returns.
    pub fn set_responder<F>(&self, responder: F)
    where
        F: FnMut(&[u8]) -> Option<Vec<u8>> + Send + 'static,
    {
        self.state.lock().responder = Some(Box::new(responder));
    }

    /// Every write seen so far, one entry per send.
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.state.lock().written.clone()
    }

    /// Number of bytes still waiting to be read.
    pub fn pending(&self) -> usize {
        self.state.lock().inbound.len()
    }
}

impl Link for MemoryLink {
    fn open(&self) -> io::Result<(Box<dyn ByteSource>, Box<dyn ByteSink>)> {
        let mut state = self.state.lock();
        if let Some(kind) = state.fail_open.take() {
            return Err(io::Error::new(kind, "memory link refused to open"));
        }
        state.closed = false;
        Ok((
            Box::new(MemorySource {
                state: Arc::clone(&self.state),
            }),
            Box::new(MemorySink {
                state: Arc::clone(&self.state),
            }),
        ))
    }

    fn name(&self) -> String {
        "memory".to_owned()
    }
}

struct MemorySource {
    state: Arc<Mutex<MemoryState>>,
}

impl ByteSource for MemorySource {
    fn read_byte(&mut self) -> io::Result<ReadOutcome> {
        let mut state = self.state.lock();
        match state.inbound.pop_front() {
            Some(byte) => Ok(ReadOutcome::Byte(byte)),
            None if state.closed => Ok(ReadOutcome::Eof),
            None => Ok(ReadOutcome::WouldBlock),
        }
    }
}

struct MemorySink {
    state: Arc<Mutex<MemoryState>>,
}

impl ByteSink for MemorySink {
    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "memory link closed"));
        }
        state.written.push(bytes.to_vec());
        let reply = state.responder.as_mut().and_then(|respond| respond(bytes));
        if let Some(reply) = reply {
            state.inbound.extend(reply);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_link_round_trip() {
        let link = MemoryLink::new();
        let (mut source, mut sink) = link.open().expect("open");
        assert_eq!(source.read_byte().expect("read"), ReadOutcome::WouldBlock);

        link.push_bytes(&[0x10, 0x02]);
        assert_eq!(source.read_byte().expect("read"), ReadOutcome::Byte(0x10));
        assert_eq!(source.read_byte().expect("read"), ReadOutcome::Byte(0x02));

        sink.send(&[0xFF, 0x00]).expect("send");
        assert_eq!(link.written(), vec![vec![0xFF, 0x00]]);

        link.close();
        assert_eq!(source.read_byte().expect("read"), ReadOutcome::Eof);
        assert!(sink.send(&[0x01]).is_err());
    }

    #[test]
    fn responder_feeds_reader() {
        let link = MemoryLink::new();
        link.set_responder(|written| Some(written.iter().rev().copied().collect()));
        let (mut source, mut sink) = link.open().expect("open");
        sink.send(&[1, 2]).expect("send");
        assert_eq!(source.read_byte().expect("read"), ReadOutcome::Byte(2));
        assert_eq!(link.pending(), 1);
    }

    #[test]
    fn open_failure_is_one_shot() {
        let link = MemoryLink::new();
        link.fail_next_open(io::ErrorKind::NotFound);
        assert_eq!(
            link.open().err().map(|err| err.kind()),
            Some(io::ErrorKind::NotFound)
        );
        assert!(link.open().is_ok());
    }

    #[test]
    fn config_selects_link() {
        let serial = link_from_config(&LinkConfig::Serial {
            port: "/dev/ttyS1".into(),
            baud_rate: 9600,
        });
        assert_eq!(serial.name(), "/dev/ttyS1@9600");
        let tcp = link_from_config(&LinkConfig::Tcp {
            host: "bridge.local".into(),
            tcp_port: 10000,
        });
        assert_eq!(tcp.name(), "bridge.local:10000");
    }
}
