//! Transport layer
//!
//! Handles framed packet I/O against the database server. The [`Transport`]
//! trait is the seam between the protocol engine and the network: production
//! code uses [`TcpTransport`] (plain TCP or TLS), tests substitute scripted
//! in-memory implementations.
//!
//! Round trips are counted here: one round trip is one burst of sends
//! followed by the first receive. The counter is test-visible through
//! [`Transport::round_trips`].

mod tcp;
pub mod tls;

pub use tcp::TcpTransport;
pub use tls::TlsConfig;

use bytes::Bytes;

use crate::error::Result;
use crate::packet::Packet;

/// Trait for transport implementations
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Send one complete, pre-framed packet
    async fn send_packet(&self, packet: Bytes) -> Result<()>;

    /// Receive the next packet, blocking until the full declared length has
    /// arrived
    async fn receive_packet(&self) -> Result<Packet>;

    /// Send a packet through the write half only, without touching the read
    /// path. Used for out-of-band break markers while a call is in flight.
    async fn send_out_of_band(&self, packet: Bytes) -> Result<()>;

    /// Close the connection
    async fn close(&self) -> Result<()>;

    /// Check if the transport is connected
    fn is_connected(&self) -> bool;

    /// The current SDU size
    fn sdu(&self) -> u32;

    /// Set the SDU size after negotiation
    fn set_sdu(&self, sdu: u32);

    /// Check if using the 4-byte packet length field
    fn uses_large_sdu(&self) -> bool;

    /// Switch to the 4-byte packet length field
    fn set_large_sdu(&self, large_sdu: bool);

    /// Number of completed network round trips on this transport
    fn round_trips(&self) -> u64;
}
