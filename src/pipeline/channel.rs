//! Byte channels connecting neighbouring stages.
//!
//! Async stages use [`Outlet::send`] and [`Inlet::recv`] directly. Blocking
//! stages get the same ends wrapped as `std::io::Write` / `std::io::Read`,
//! which must only be used from a blocking thread.
//!
//! A clean end of stream is an explicit frame sent by the runner once the
//! producing stage has returned `Ok`. An outlet dropped without it reads as
//! an aborted upstream, never as end of stream.

use crate::error::{Error, Result};
use bytes::{Buf, Bytes, BytesMut};
use std::io::{self, Read, Write};
use tokio::sync::mpsc;

/// Number of chunks buffered between two stages.
pub(crate) const CHANNEL_DEPTH: usize = 8;
/// Size of the chunks blocking writers hand to the channel.
pub const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug)]
enum Frame {
    Data(Bytes),
    End,
}

/// Creates a connected outlet/inlet pair.
pub fn channel() -> (Outlet, Inlet) {
    let (tx, rx) = mpsc::channel(CHANNEL_DEPTH);
    (
        Outlet { tx },
        Inlet {
            rx,
            finished: false,
        },
    )
}

fn downstream_closed() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "downstream stage closed its input")
}

fn upstream_aborted() -> io::Error {
    io::Error::new(io::ErrorKind::ConnectionAborted, "upstream stage aborted")
}

/// Output end of a stage.
#[derive(Debug)]
pub struct Outlet {
    tx: mpsc::Sender<Frame>,
}

impl Outlet {
    /// Sends one chunk, waiting while the downstream buffer is full.
    pub async fn send(&self, chunk: Bytes) -> Result<()> {
        if chunk.is_empty() {
            return Ok(());
        }
        self.tx
            .send(Frame::Data(chunk))
            .await
            .map_err(|_| Error::Io(downstream_closed()))
    }

    pub fn into_writer(self) -> OutletWriter {
        OutletWriter {
            tx: self.tx,
            buf: BytesMut::with_capacity(CHUNK_SIZE),
        }
    }

    /// Handle that closes this channel cleanly once the stage succeeded.
    pub(crate) fn end_of_stream(&self) -> EndOfStream {
        EndOfStream {
            tx: self.tx.clone(),
        }
    }
}

/// Held by the runner for the lifetime of a producing stage.
pub(crate) struct EndOfStream {
    tx: mpsc::Sender<Frame>,
}

impl EndOfStream {
    /// Marks the stream as complete. A consumer that already hung up is
    /// left alone.
    pub(crate) async fn send(self) {
        let _ = self.tx.send(Frame::End).await;
    }
}

/// Input end of a stage.
#[derive(Debug)]
pub struct Inlet {
    rx: mpsc::Receiver<Frame>,
    finished: bool,
}

impl Inlet {
    /// Next chunk, `Ok(None)` once upstream completed cleanly, or an error
    /// when upstream stopped without completing.
    pub async fn recv(&mut self) -> Result<Option<Bytes>> {
        if self.finished {
            return Ok(None);
        }
        match self.rx.recv().await {
            Some(Frame::Data(chunk)) => Ok(Some(chunk)),
            Some(Frame::End) => {
                self.finished = true;
                Ok(None)
            }
            None => Err(Error::Io(upstream_aborted())),
        }
    }

    pub fn into_reader(self) -> InletReader {
        InletReader {
            rx: self.rx,
            pending: Bytes::new(),
            finished: self.finished,
        }
    }
}

/// Blocking `Write` over an [`Outlet`].
///
/// Writes are coalesced into chunks of [`CHUNK_SIZE`]; `flush` pushes out
/// whatever is buffered.
#[derive(Debug)]
pub struct OutletWriter {
    tx: mpsc::Sender<Frame>,
    buf: BytesMut,
}

impl OutletWriter {
    fn send_buffered(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let chunk = self.buf.split().freeze();
        self.tx
            .blocking_send(Frame::Data(chunk))
            .map_err(|_| downstream_closed())
    }
}

impl Write for OutletWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        if self.buf.len() >= CHUNK_SIZE {
            self.send_buffered()?;
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.send_buffered()
    }
}

/// Blocking `Read` over an [`Inlet`].
///
/// Reads fail with `ConnectionAborted` when upstream stopped without
/// completing.
#[derive(Debug)]
pub struct InletReader {
    rx: mpsc::Receiver<Frame>,
    pending: Bytes,
    finished: bool,
}

impl Read for InletReader {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }
        while self.pending.is_empty() {
            if self.finished {
                return Ok(0);
            }
            match self.rx.blocking_recv() {
                Some(Frame::Data(chunk)) => self.pending = chunk,
                Some(Frame::End) => self.finished = true,
                None => return Err(upstream_aborted()),
            }
        }
        let n = out.len().min(self.pending.len());
        out[..n].copy_from_slice(&self.pending[..n]);
        self.pending.advance(n);
        Ok(n)
    }
}
