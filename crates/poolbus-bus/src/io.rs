//! ---
//! pb_section: "02-messaging-ipc-data-model"
//! pb_subsection: "module"
//! pb_type: "source"
//! pb_scope: "code"
//! pb_description: "Byte source and sink abstractions at the link boundary."
//! pb_version: "v0.0.0-prealpha"
//! pb_owner: "tbd"
//! ---
use std::io::{self, Read, Write};

/// Result of a single byte read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// One byte arrived.
    Byte(u8),
    /// Nothing buffered right now; try again later.
    WouldBlock,
    /// The source is exhausted and will never yield more bytes.
    Eof,
}

/// Ordered inbound bytes.
pub trait ByteSource: Send {
    /// Read the next byte without blocking indefinitely.
    fn read_byte(&mut self) -> io::Result<ReadOutcome>;
}

/// Ordered outbound bytes.
pub trait ByteSink: Send {
    /// Write the whole buffer.
    fn send(&mut self, bytes: &[u8]) -> io::Result<()>;
}

/// [`ByteSource`] over any reader configured with a read timeout.
pub struct ReaderSource<R> {
    reader: R,
}

impl<R: Read + Send> ReaderSource<R> {
    /// Wrap `reader`.
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl<R: Read + Send> ByteSource for ReaderSource<R> {
    fn read_byte(&mut self) -> io::Result<ReadOutcome> {
        let mut byte = [0u8; 1];
        match self.reader.read(&mut byte) {
            Ok(0) => Ok(ReadOutcome::Eof),
            Ok(_) => Ok(ReadOutcome::Byte(byte[0])),
            Err(err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                Ok(ReadOutcome::WouldBlock)
            }
            Err(err) => Err(err),
        }
    }
}

/// [`ByteSink`] over any writer; flushes after each message.
pub struct WriterSink<W> {
    writer: W,
}

impl<W: Write + Send> WriterSink<W> {
    /// Wrap `writer`.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl<W: Write + Send> ByteSink for WriterSink<W> {
    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.writer.write_all(bytes)?;
        self.writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Scripted(Vec<io::Result<u8>>);

    impl Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.0.is_empty() {
                return Ok(0);
            }
            match self.0.remove(0) {
                Ok(byte) => {
                    buf[0] = byte;
                    Ok(1)
                }
                Err(err) => Err(err),
            }
        }
    }

    #[test]
    fn reader_source_maps_timeouts_and_eof() {
        let mut source = ReaderSource::new(Scripted(vec![
            Ok(0xA5),
            Err(io::Error::from(io::ErrorKind::TimedOut)),
            Err(io::Error::from(io::ErrorKind::WouldBlock)),
            Err(io::Error::from(io::ErrorKind::BrokenPipe)),
        ]));
        assert_eq!(source.read_byte().expect("byte"), ReadOutcome::Byte(0xA5));
        assert_eq!(source.read_byte().expect("timeout"), ReadOutcome::WouldBlock);
        assert_eq!(source.read_byte().expect("would block"), ReadOutcome::WouldBlock);
        assert_eq!(
            source.read_byte().expect_err("broken pipe").kind(),
            io::ErrorKind::BrokenPipe
        );
        assert_eq!(source.read_byte().expect("eof"), ReadOutcome::Eof);
    }

    #[test]
    fn writer_sink_writes_everything() {
        let mut sink = WriterSink::new(Vec::new());
        sink.send(&[0xFF, 0x00, 0xFF]).expect("write");
        sink.send(&[0xA5]).expect("write");
        assert_eq!(sink.writer, vec![0xFF, 0x00, 0xFF, 0xA5]);
    }
}
