//! [`Connection`] over any tokio byte stream.

use tokio::io::{
    AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf,
};
use tokio::sync::Mutex;

use crate::{Connection, ConnectionId, TransportError};

/// Default number of bytes requested per `recv()` call.
pub const DEFAULT_READ_CHUNK: usize = 8 * 1024;

/// A connection over an already-established byte stream.
///
/// The stream is split into halves, each behind its own lock, so a task
/// blocked in [`recv`](Connection::recv) never holds up a sender.
pub struct StreamConnection<S> {
    id: ConnectionId,
    reader: Mutex<ReadHalf<S>>,
    /// `None` once the connection has been closed.
    writer: Mutex<Option<WriteHalf<S>>>,
    read_chunk: usize,
}

impl<S> StreamConnection<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Wraps `stream` and assigns it a fresh [`ConnectionId`].
    pub fn new(stream: S) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        let id = ConnectionId::next();
        tracing::debug!(%id, "stream connection opened");
        Self {
            id,
            reader: Mutex::new(reader),
            writer: Mutex::new(Some(writer)),
            read_chunk: DEFAULT_READ_CHUNK,
        }
    }

    /// Sets how many bytes a single `recv()` asks the stream for.
    pub fn with_read_chunk(mut self, bytes: usize) -> Self {
        self.read_chunk = bytes.max(1);
        self
    }
}

impl<S> Connection for StreamConnection<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    type Error = TransportError;

    async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
        let mut guard = self.writer.lock().await;
        let writer = guard
            .as_mut()
            .ok_or_else(|| TransportError::closed(self.id))?;
        writer
            .write_all(data)
            .await
            .map_err(TransportError::SendFailed)?;
        writer.flush().await.map_err(TransportError::SendFailed)
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
        let mut buf = vec![0u8; self.read_chunk];
        let n = self
            .reader
            .lock()
            .await
            .read(&mut buf)
            .await
            .map_err(TransportError::ReceiveFailed)?;
        if n == 0 {
            tracing::debug!(id = %self.id, "peer closed the stream");
            return Ok(None);
        }
        buf.truncate(n);
        Ok(Some(buf))
    }

    async fn close(&self) -> Result<(), Self::Error> {
        if let Some(mut writer) = self.writer.lock().await.take() {
            writer
                .shutdown()
                .await
                .map_err(TransportError::SendFailed)?;
            tracing::debug!(id = %self.id, "stream connection closed");
        }
        Ok(())
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}
