//! TCP transport implementation
//!
//! The stream is split into read and write halves guarded by separate locks
//! so that an out-of-band marker can be written while a receive is parked on
//! the read half. Only one call is ever in flight per connection, so the
//! write lock is uncontended except during cancellation.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::constants::{connection, PACKET_HEADER_SIZE};
use crate::error::{Error, Result};
use crate::packet::{Packet, PacketHeader};

use super::tls::TlsConfig;
use super::Transport;

/// Stream type that can be either plain TCP or TLS-wrapped
pub(crate) enum NetStream {
    Plain(TcpStream),
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
}

impl AsyncRead for NetStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            NetStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            NetStream::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for NetStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            NetStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            NetStream::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            NetStream::Plain(s) => Pin::new(s).poll_flush(cx),
            NetStream::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            NetStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            NetStream::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

/// TCP transport for database connections
pub struct TcpTransport {
    reader: Mutex<Option<ReadHalf<NetStream>>>,
    writer: Mutex<Option<WriteHalf<NetStream>>>,
    sdu: AtomicU32,
    large_sdu: AtomicBool,
    round_trips: AtomicU64,
    sent_since_receive: AtomicBool,
}

impl TcpTransport {
    /// Connect to `host:port`, optionally wrapping the stream in TLS
    pub async fn connect(
        host: &str,
        port: u16,
        tls: Option<&TlsConfig>,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let addr = format!("{}:{}", host, port);
        let stream = timeout(connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| Error::ConnectionTimeout(connect_timeout))?
            .map_err(Error::Io)?;
        stream.set_nodelay(true).map_err(Error::Io)?;

        let stream = match tls {
            Some(config) => {
                let tls_stream = config.wrap(stream, host).await?;
                NetStream::Tls(Box::new(tls_stream))
            }
            None => NetStream::Plain(stream),
        };

        let (reader, writer) = tokio::io::split(stream);
        tracing::debug!(addr = %addr, tls = tls.is_some(), "transport connected");

        Ok(Self {
            reader: Mutex::new(Some(reader)),
            writer: Mutex::new(Some(writer)),
            sdu: AtomicU32::new(connection::DEFAULT_SDU),
            large_sdu: AtomicBool::new(false),
            round_trips: AtomicU64::new(0),
            sent_since_receive: AtomicBool::new(false),
        })
    }

    async fn write_all(&self, data: &[u8]) -> Result<()> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(Error::ConnectionClosed)?;
        writer.write_all(data).await.map_err(Error::Io)?;
        writer.flush().await.map_err(Error::Io)
    }

    async fn read_exact(reader: &mut ReadHalf<NetStream>, n: usize) -> Result<Bytes> {
        let mut buf = vec![0u8; n];
        reader.read_exact(&mut buf).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                Error::ConnectionClosed
            } else {
                Error::Io(e)
            }
        })?;
        Ok(Bytes::from(buf))
    }
}

#[async_trait::async_trait]
impl Transport for TcpTransport {
    async fn send_packet(&self, packet: Bytes) -> Result<()> {
        self.write_all(&packet).await?;
        self.sent_since_receive.store(true, Ordering::Release);
        Ok(())
    }

    async fn receive_packet(&self) -> Result<Packet> {
        let mut guard = self.reader.lock().await;
        let reader = guard.as_mut().ok_or(Error::ConnectionClosed)?;

        let header_bytes = Self::read_exact(reader, PACKET_HEADER_SIZE).await?;
        let header = PacketHeader::parse(&header_bytes, self.uses_large_sdu())?;

        let sanity_bound = self.sdu() as usize + connection::MAX_PACKET_SLACK;
        if (header.length as usize) < PACKET_HEADER_SIZE || header.length as usize > sanity_bound {
            return Err(Error::ProtocolViolation(format!(
                "declared packet length {} outside sane range",
                header.length
            )));
        }

        let payload_len = header.payload_length();
        let payload = if payload_len > 0 {
            Self::read_exact(reader, payload_len).await?
        } else {
            Bytes::new()
        };

        if self.sent_since_receive.swap(false, Ordering::AcqRel) {
            self.round_trips.fetch_add(1, Ordering::Relaxed);
        }

        Ok(Packet::new(header, payload))
    }

    async fn send_out_of_band(&self, packet: Bytes) -> Result<()> {
        // deliberately bypasses the round-trip accounting: a break marker is
        // not a request/response cycle
        self.write_all(&packet).await
    }

    async fn close(&self) -> Result<()> {
        let mut writer_guard = self.writer.lock().await;
        if let Some(mut writer) = writer_guard.take() {
            let _ = writer.shutdown().await;
        }
        let mut reader_guard = self.reader.lock().await;
        reader_guard.take();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.writer.try_lock().map(|g| g.is_some()).unwrap_or(true)
    }

    fn sdu(&self) -> u32 {
        self.sdu.load(Ordering::Relaxed)
    }

    fn set_sdu(&self, sdu: u32) {
        self.sdu.store(sdu, Ordering::Relaxed);
    }

    fn uses_large_sdu(&self) -> bool {
        self.large_sdu.load(Ordering::Relaxed)
    }

    fn set_large_sdu(&self, large_sdu: bool) {
        self.large_sdu.store(large_sdu, Ordering::Relaxed);
    }

    fn round_trips(&self) -> u64 {
        self.round_trips.load(Ordering::Relaxed)
    }
}
