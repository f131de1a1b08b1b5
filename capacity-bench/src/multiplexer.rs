// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Non-blocking multiplexing of subprocess output.
//!
//! A [LogMultiplexer] owns the read ends of any number of output streams.
//! Each call to [LogMultiplexer::poll] performs a single bounded `poll(2)`
//! across all open streams, then reads every ready stream in [CHUNK_SIZE]
//! chunks until it would block or reaches end of file, and returns the lines
//! that were completed. Nothing already written is left in the pipe, so a
//! poll after the writer has exited sees all of its output. Partial lines are
//! kept per stream until their terminator arrives.

use std::fmt;
use std::io::{ErrorKind, Read};
use std::time::Duration;

use filedescriptor::{
    AsRawSocketDescriptor, FileDescriptor, POLLERR, POLLHUP, POLLIN, poll, pollfd,
};
use log::{debug, warn};

use crate::telemetry::{LineBuffer, decode_line};
use crate::types::{BenchError, BenchResult};

/// Size of each read from a stream
pub const CHUNK_SIZE: usize = 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// Identifies where a line of output came from
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamLabel {
    pub source: String,
    pub kind: StreamKind,
}

impl fmt::Display for StreamLabel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.kind {
            StreamKind::Stdout => write!(f, "{}", self.source),
            StreamKind::Stderr => write!(f, "{}(stderr)", self.source),
        }
    }
}

/// Handle returned by [LogMultiplexer::add_stream]
pub type StreamId = usize;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputLine {
    pub stream: StreamId,
    pub label: StreamLabel,
    pub text: String,
}

struct Stream {
    label: StreamLabel,
    fd: Option<FileDescriptor>,
    buffer: LineBuffer,
}

impl Stream {
    fn flush_remainder(&mut self, id: StreamId, lines: &mut Vec<OutputLine>) {
        if let Some(bytes) = self.buffer.finish() {
            push_decoded(id, &self.label, bytes, lines);
        }
    }

    fn close(&mut self, id: StreamId, lines: &mut Vec<OutputLine>) {
        self.flush_remainder(id, lines);
        if self.fd.take().is_some() {
            debug!("{} closed", self.label);
        }
    }
}

fn push_decoded(id: StreamId, label: &StreamLabel, bytes: Vec<u8>, lines: &mut Vec<OutputLine>) {
    match decode_line(&label.to_string(), bytes) {
        Ok(text) => lines.push(OutputLine {
            stream: id,
            label: label.clone(),
            text,
        }),
        Err(e) => warn!("Skipping line: {e}"),
    }
}

#[derive(Default)]
pub struct LogMultiplexer {
    streams: Vec<Stream>,
}

impl LogMultiplexer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a stream and switch it to non-blocking mode.
    pub fn add_stream(
        &mut self,
        source: &str,
        kind: StreamKind,
        mut fd: FileDescriptor,
    ) -> BenchResult<StreamId> {
        let label = StreamLabel {
            source: source.to_string(),
            kind,
        };
        fd.set_non_blocking(true)
            .map_err(|e| BenchError::StreamIo {
                reason: format!("{label}: {e}"),
            })?;
        self.streams.push(Stream {
            label,
            fd: Some(fd),
            buffer: LineBuffer::new(),
        });
        Ok(self.streams.len() - 1)
    }

    #[must_use]
    pub fn is_open(&self, id: StreamId) -> bool {
        self.streams.get(id).is_some_and(|s| s.fd.is_some())
    }

    #[must_use]
    pub fn open_streams(&self) -> usize {
        self.streams.iter().filter(|s| s.fd.is_some()).count()
    }

    /// Wait at most `timeout` for output on any open stream and return the
    /// complete lines read.
    ///
    /// Returns immediately when no stream is open.
    pub fn poll(&mut self, timeout: Duration) -> BenchResult<Vec<OutputLine>> {
        let mut ids = Vec::with_capacity(self.streams.len());
        let mut pfds = Vec::with_capacity(self.streams.len());
        for (id, stream) in self.streams.iter().enumerate() {
            if let Some(fd) = &stream.fd {
                ids.push(id);
                pfds.push(pollfd {
                    fd: fd.as_socket_descriptor(),
                    events: POLLIN,
                    revents: 0,
                });
            }
        }

        let mut lines = Vec::new();
        if pfds.is_empty() {
            return Ok(lines);
        }

        match poll(&mut pfds, Some(timeout)) {
            Ok(0) => return Ok(lines),
            Ok(_) => {}
            Err(filedescriptor::Error::Poll(e)) if e.kind() == ErrorKind::Interrupted => {
                return Ok(lines);
            }
            Err(e) => {
                return Err(BenchError::StreamIo {
                    reason: format!("poll failed: {e}"),
                });
            }
        }

        let mut chunk = [0u8; CHUNK_SIZE];
        for (pfd, id) in pfds.iter().zip(ids) {
            if pfd.revents & (POLLIN | POLLHUP | POLLERR) == 0 {
                continue;
            }
            let stream = &mut self.streams[id];
            let Some(fd) = stream.fd.as_mut() else {
                continue;
            };
            loop {
                match fd.read(&mut chunk) {
                    Ok(0) => {
                        stream.close(id, &mut lines);
                        break;
                    }
                    Ok(n) => {
                        for bytes in stream.buffer.push(&chunk[..n]) {
                            push_decoded(id, &stream.label, bytes, &mut lines);
                        }
                    }
                    Err(e) if e.kind() == ErrorKind::Interrupted => {}
                    Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                    Err(e) => {
                        warn!("Read from {} failed: {e}", stream.label);
                        stream.close(id, &mut lines);
                        break;
                    }
                }
            }
        }
        Ok(lines)
    }

    /// Close every stream, returning any unterminated output still buffered.
    pub fn close_all(&mut self) -> Vec<OutputLine> {
        let mut lines = Vec::new();
        for (id, stream) in self.streams.iter_mut().enumerate() {
            stream.close(id, &mut lines);
        }
        lines
    }
}
