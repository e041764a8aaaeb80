//! TCP transport: listener wrapper and framed stream halves.
//!
//! The runtime splits each accepted stream: the read half lives in the
//! connection's reader loop, the write half in its writer task. Framing
//! is the protocol's fixed header followed by the declared payload.

use std::net::SocketAddr;

use bytes::BytesMut;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpListener, TcpStream,
    },
};

use tether_proto::{Frame, FrameHeader};

use crate::error::ServerError;

/// TCP listener wrapper.
pub struct TcpTransport {
    listener: TcpListener,
}

impl TcpTransport {
    /// Bind to `address` (`host:port`).
    pub async fn bind(address: &str) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(address)
            .await
            .map_err(|e| ServerError::Config(format!("failed to bind '{address}': {e}")))?;

        tracing::info!(%address, "transport bound");

        Ok(Self { listener })
    }

    /// Accept the next connection.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr), ServerError> {
        let (stream, addr) =
            self.listener.accept().await.map_err(|e| ServerError::Transport(e.to_string()))?;

        stream.set_nodelay(true).map_err(|e| ServerError::Transport(e.to_string()))?;

        Ok((stream, addr))
    }

    /// Local address the listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener.local_addr().map_err(|e| ServerError::Transport(e.to_string()))
    }
}

/// Framed reader over the read half of a connection.
///
/// Buffers partial reads internally so `read_frame` is safe to poll
/// inside `select!` without losing bytes across cancellation.
pub struct FrameReader {
    read_half: OwnedReadHalf,
    buffer: BytesMut,
}

impl FrameReader {
    /// Wrap the read half of an accepted stream.
    #[must_use]
    pub fn new(read_half: OwnedReadHalf) -> Self {
        Self { read_half, buffer: BytesMut::with_capacity(4096) }
    }

    /// Read the next complete frame.
    ///
    /// # Errors
    ///
    /// - `UnexpectedEof` on a clean peer close
    /// - `InvalidData` on structurally invalid framing
    /// - any underlying socket error
    pub async fn read_frame(&mut self) -> std::io::Result<Frame> {
        loop {
            if let Some(frame) = take_frame(&mut self.buffer)? {
                return Ok(frame);
            }

            let n = self.read_half.read_buf(&mut self.buffer).await?;
            if n == 0 {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "connection closed by peer",
                ));
            }
        }
    }
}

/// Framed writer over the write half of a connection.
pub struct FrameWriter {
    write_half: OwnedWriteHalf,
}

impl FrameWriter {
    /// Wrap the write half of an accepted stream.
    #[must_use]
    pub fn new(write_half: OwnedWriteHalf) -> Self {
        Self { write_half }
    }

    /// Send one frame.
    pub async fn write_frame(&mut self, frame: &Frame) -> std::io::Result<()> {
        let mut wire = BytesMut::with_capacity(frame.wire_len());
        frame
            .encode(&mut wire)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        self.write_half.write_all(&wire).await
    }

    /// Flush and close the write direction.
    pub async fn shutdown(&mut self) -> std::io::Result<()> {
        self.write_half.shutdown().await
    }
}

/// Extract one complete frame from the front of `buffer`, if present.
fn take_frame(buffer: &mut BytesMut) -> std::io::Result<Option<Frame>> {
    if buffer.len() < FrameHeader::SIZE {
        return Ok(None);
    }

    let header = FrameHeader::from_bytes(buffer)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    let total = FrameHeader::SIZE + header.payload_size() as usize;

    if buffer.len() < total {
        return Ok(None);
    }

    let wire = buffer.split_to(total);
    let frame = Frame::decode(&wire)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    Ok(Some(frame))
}

#[cfg(test)]
mod tests {
    use tether_proto::{Opcode, Payload};

    use super::*;

    #[test]
    fn take_frame_waits_for_complete_frames() {
        let frame = Frame::new(FrameHeader::new(Opcode::AppMessage), vec![3u8; 20]);
        let mut wire = BytesMut::new();
        frame.encode(&mut wire).unwrap();

        let mut buffer = BytesMut::new();
        buffer.extend_from_slice(&wire[..FrameHeader::SIZE + 5]);
        assert!(take_frame(&mut buffer).unwrap().is_none());

        buffer.extend_from_slice(&wire[FrameHeader::SIZE + 5..]);
        assert_eq!(take_frame(&mut buffer).unwrap(), Some(frame));
        assert!(buffer.is_empty());
    }

    #[test]
    fn take_frame_rejects_garbage() {
        let mut buffer = BytesMut::from(&[0xABu8; 32][..]);
        assert!(take_frame(&mut buffer).is_err());
    }

    #[tokio::test]
    async fn frames_round_trip_over_loopback() {
        let transport = TcpTransport::bind("127.0.0.1:0").await.unwrap();
        let addr = transport.local_addr().unwrap();

        let client = tokio::spawn(async move {
            let stream = TcpStream::connect(addr).await.unwrap();
            let (_, write_half) = stream.into_split();
            let mut writer = FrameWriter::new(write_half);
            writer.write_frame(&Payload::Ping.into_frame().unwrap()).await.unwrap();
            writer.write_frame(&Payload::HealthRequest.into_frame().unwrap()).await.unwrap();
            writer.shutdown().await.unwrap();
        });

        let (stream, _) = transport.accept().await.unwrap();
        let (read_half, _) = stream.into_split();
        let mut reader = FrameReader::new(read_half);

        let first = reader.read_frame().await.unwrap();
        assert_eq!(first.header.opcode_enum(), Some(Opcode::Ping));
        let second = reader.read_frame().await.unwrap();
        assert_eq!(second.header.opcode_enum(), Some(Opcode::HealthRequest));

        let eof = reader.read_frame().await;
        assert_eq!(eof.unwrap_err().kind(), std::io::ErrorKind::UnexpectedEof);

        client.await.unwrap();
    }
}
