//! IPC transport implementations
//!
//! Messages travel as one JSON envelope per line. [`StreamTransport`] works
//! over any async byte stream pair; stdio, child process pipes and
//! in-memory duplex streams are aliases of it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, DuplexStream, ReadHalf,
    WriteHalf,
};
use tracing::trace;

use crate::error::IpcError;
use crate::protocol::{MessageEnvelope, IPC_PROTOCOL_VERSION};

/// IPC transport trait for different communication mechanisms
#[async_trait]
pub trait IpcTransport: Send + Sync {
    /// Send a message to the other end
    async fn send<T: Serialize + Send + Sync>(
        &mut self,
        message: &MessageEnvelope<T>,
    ) -> Result<(), IpcError>;

    /// Receive a message from the other end.
    ///
    /// Cancel safe: a partially read line is kept for the next call.
    async fn receive<T: for<'de> Deserialize<'de> + Send>(
        &mut self,
    ) -> Result<MessageEnvelope<T>, IpcError>;

    /// Close the transport
    async fn close(&mut self) -> Result<(), IpcError>;
}

/// Newline-delimited JSON transport over a reader/writer pair
pub struct StreamTransport<R, W> {
    reader: Option<BufReader<R>>,
    writer: Option<W>,
    pending: Vec<u8>,
}

/// Stdin/Stdout transport, used by a spawned installer to talk to its parent
pub type StdioTransport = StreamTransport<tokio::io::Stdin, tokio::io::Stdout>;

/// Parent side of a spawned child process
pub type ChildProcessTransport =
    StreamTransport<tokio::process::ChildStdout, tokio::process::ChildStdin>;

/// In-process transport over a tokio duplex pipe
pub type DuplexTransport = StreamTransport<ReadHalf<DuplexStream>, WriteHalf<DuplexStream>>;

impl<R, W> StreamTransport<R, W>
where
    R: AsyncRead + Unpin + Send + Sync,
    W: AsyncWrite + Unpin + Send + Sync,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: Some(BufReader::new(reader)),
            writer: Some(writer),
            pending: Vec::new(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.reader.is_some() && self.writer.is_some()
    }
}

impl StdioTransport {
    /// Create a transport over this process's stdin/stdout
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout())
    }
}

impl ChildProcessTransport {
    /// Take the piped stdio handles of a spawned child
    pub fn from_child(child: &mut tokio::process::Child) -> Result<Self, IpcError> {
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| IpcError::IoError("child stdin is not piped".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| IpcError::IoError("child stdout is not piped".to_string()))?;
        Ok(Self::new(stdout, stdin))
    }
}

/// Two connected in-memory transports
pub fn duplex_pair(max_buf_size: usize) -> (DuplexTransport, DuplexTransport) {
    let (left, right) = tokio::io::duplex(max_buf_size);
    let (left_read, left_write) = tokio::io::split(left);
    let (right_read, right_write) = tokio::io::split(right);
    (
        StreamTransport::new(left_read, left_write),
        StreamTransport::new(right_read, right_write),
    )
}

#[async_trait]
impl<R, W> IpcTransport for StreamTransport<R, W>
where
    R: AsyncRead + Unpin + Send + Sync,
    W: AsyncWrite + Unpin + Send + Sync,
{
    async fn send<T: Serialize + Send + Sync>(
        &mut self,
        message: &MessageEnvelope<T>,
    ) -> Result<(), IpcError> {
        let writer = self.writer.as_mut().ok_or(IpcError::NotConnected)?;

        let mut line = serde_json::to_vec(message)
            .map_err(|e| IpcError::SerializationError(e.to_string()))?;
        line.push(b'\n');

        writer.write_all(&line).await?;
        writer.flush().await?;

        trace!(bytes = line.len(), "Sent envelope");
        Ok(())
    }

    async fn receive<T: for<'de> Deserialize<'de> + Send>(
        &mut self,
    ) -> Result<MessageEnvelope<T>, IpcError> {
        let Self {
            reader, pending, ..
        } = self;
        let reader = reader.as_mut().ok_or(IpcError::NotConnected)?;

        loop {
            let read = reader.read_until(b'\n', pending).await?;
            if read == 0 || pending.last() != Some(&b'\n') {
                // EOF, possibly in the middle of a line
                pending.clear();
                return Err(IpcError::ConnectionClosed);
            }

            let line = std::mem::take(pending);
            let text = std::str::from_utf8(&line)
                .map_err(|e| IpcError::InvalidMessage(e.to_string()))?
                .trim();
            if text.is_empty() {
                continue;
            }

            let envelope: MessageEnvelope<T> = serde_json::from_str(text)
                .map_err(|e| IpcError::DeserializationError(e.to_string()))?;

            if envelope.protocol_version != IPC_PROTOCOL_VERSION {
                return Err(IpcError::ProtocolVersionMismatch {
                    expected: IPC_PROTOCOL_VERSION,
                    actual: envelope.protocol_version,
                });
            }

            return Ok(envelope);
        }
    }

    async fn close(&mut self) -> Result<(), IpcError> {
        if let Some(mut writer) = self.writer.take() {
            // The peer may already be gone
            let _ = writer.shutdown().await;
        }
        self.reader = None;
        self.pending.clear();
        Ok(())
    }
}
