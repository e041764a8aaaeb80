//! Client transport: dialing, framing, out-of-band key fetch.
//!
//! The supervisor only knows the [`Dialer`] and [`SessionLink`] traits;
//! [`TcpDialer`] is the production implementation, and tests substitute
//! scripted fakes to drive the reconnect loop deterministically.

use std::{future::Future, io};

use bytes::BytesMut;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};

use tether_crypto::ServerPublicKey;
use tether_proto::{Frame, FrameHeader, Payload};

/// One established bidirectional transport connection.
///
/// `recv_frame` MUST be cancellation-safe: the supervisor polls it
/// inside `select!` and drops the future when another branch fires, so
/// an implementation must not lose partially received bytes across
/// cancellation.
pub trait SessionLink: Send + 'static {
    /// Send one frame.
    fn send_frame(&mut self, frame: Frame) -> impl Future<Output = io::Result<()>> + Send;

    /// Receive the next frame. Cancellation-safe (see trait docs).
    fn recv_frame(&mut self) -> impl Future<Output = io::Result<Frame>> + Send;
}

/// Factory for transport connections and the out-of-band key lookup.
pub trait Dialer: Send + Sync + 'static {
    /// Connection type produced by [`Dialer::dial`].
    type Link: SessionLink;

    /// Open a new transport connection to the server.
    fn dial(&self) -> impl Future<Output = io::Result<Self::Link>> + Send;

    /// Fetch the server's current public key over a throwaway
    /// connection. Works before any session exists.
    fn fetch_server_key(&self) -> impl Future<Output = io::Result<ServerPublicKey>> + Send;
}

/// TCP implementation of [`Dialer`].
#[derive(Debug, Clone)]
pub struct TcpDialer {
    addr: String,
}

impl TcpDialer {
    /// Dialer targeting `addr` (`host:port`).
    #[must_use]
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }
}

impl Dialer for TcpDialer {
    type Link = TcpLink;

    async fn dial(&self) -> io::Result<TcpLink> {
        let stream = TcpStream::connect(&self.addr).await?;
        stream.set_nodelay(true)?;
        Ok(TcpLink { stream, buffer: BytesMut::with_capacity(4096) })
    }

    async fn fetch_server_key(&self) -> io::Result<ServerPublicKey> {
        let mut link = self.dial().await?;

        let request = Payload::KeyRequest.into_frame().map_err(invalid_data)?;
        link.send_frame(request).await?;

        let reply = link.recv_frame().await?;
        match Payload::from_frame(&reply) {
            Ok(Payload::KeyResponse(response)) => {
                ServerPublicKey::from_base64(&response.public_key).map_err(invalid_data)
            },
            Ok(_) => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "unexpected reply to key request",
            )),
            Err(e) => Err(invalid_data(e)),
        }
    }
}

/// Framed TCP connection.
///
/// Receives through an internal buffer so that a cancelled
/// `recv_frame` never loses partially read bytes.
#[derive(Debug)]
pub struct TcpLink {
    stream: TcpStream,
    buffer: BytesMut,
}

impl SessionLink for TcpLink {
    async fn send_frame(&mut self, frame: Frame) -> io::Result<()> {
        let mut wire = BytesMut::with_capacity(frame.wire_len());
        frame.encode(&mut wire).map_err(invalid_data)?;
        self.stream.write_all(&wire).await
    }

    async fn recv_frame(&mut self) -> io::Result<Frame> {
        loop {
            if let Some(frame) = try_parse(&mut self.buffer)? {
                return Ok(frame);
            }

            // read_buf either appends bytes or does nothing when
            // cancelled, so buffered progress survives select! drops.
            let n = self.stream.read_buf(&mut self.buffer).await?;
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed by server",
                ));
            }
        }
    }
}

/// Extract one complete frame from the front of `buffer`, if present.
fn try_parse(buffer: &mut BytesMut) -> io::Result<Option<Frame>> {
    if buffer.len() < FrameHeader::SIZE {
        return Ok(None);
    }

    let header = FrameHeader::from_bytes(buffer).map_err(invalid_data)?;
    let total = FrameHeader::SIZE + header.payload_size() as usize;

    if buffer.len() < total {
        return Ok(None);
    }

    let wire = buffer.split_to(total);
    let frame = Frame::decode(&wire).map_err(invalid_data)?;
    Ok(Some(frame))
}

fn invalid_data(error: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_proto::Opcode;

    #[test]
    fn try_parse_waits_for_complete_frames() {
        let frame = Frame::new(FrameHeader::new(Opcode::AppMessage), vec![7u8; 32]);
        let mut wire = BytesMut::new();
        frame.encode(&mut wire).unwrap();

        let mut buffer = BytesMut::new();

        // Header only: no frame yet.
        buffer.extend_from_slice(&wire[..FrameHeader::SIZE]);
        assert!(try_parse(&mut buffer).unwrap().is_none());

        // Partial payload: still no frame.
        buffer.extend_from_slice(&wire[FrameHeader::SIZE..FrameHeader::SIZE + 10]);
        assert!(try_parse(&mut buffer).unwrap().is_none());

        // Remainder plus the start of a second frame.
        buffer.extend_from_slice(&wire[FrameHeader::SIZE + 10..]);
        buffer.extend_from_slice(&wire[..6]);

        let parsed = try_parse(&mut buffer).unwrap().unwrap();
        assert_eq!(parsed, frame);

        // The second frame's prefix is preserved for the next read.
        assert_eq!(buffer.len(), 6);
    }

    #[test]
    fn try_parse_rejects_garbage() {
        let mut buffer = BytesMut::from(&[0xFFu8; 64][..]);
        assert!(try_parse(&mut buffer).is_err());
    }
}
